//! Dotted-path access into signal documents (`temporal.time_of_day`)

use serde_json::{Map, Value};

/// Resolve a dotted path
pub fn get<'a>(doc: &'a Map<String, Value>, dotted_path: &str) -> Option<&'a Value> {
    let mut parts = dotted_path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Mutable access to the object holding the leaf of `dotted_path`
fn parent_mut<'a>(
    doc: &'a mut Map<String, Value>,
    dotted_path: &'a str,
) -> Option<(&'a mut Map<String, Value>, &'a str)> {
    let (parents, leaf) = match dotted_path.rsplit_once('.') {
        Some((parents, leaf)) => (Some(parents), leaf),
        None => (None, dotted_path),
    };

    let mut current = doc;
    if let Some(parents) = parents {
        for part in parents.split('.') {
            current = current.get_mut(part)?.as_object_mut()?;
        }
    }
    Some((current, leaf))
}

/// Replace the value at an existing parent; missing parents are left alone
pub fn set(doc: &mut Map<String, Value>, dotted_path: &str, value: Value) -> bool {
    match parent_mut(doc, dotted_path) {
        Some((parent, leaf)) => {
            parent.insert(leaf.to_string(), value);
            true
        }
        None => false,
    }
}

/// Delete the value at a dotted path
pub fn remove(doc: &mut Map<String, Value>, dotted_path: &str) -> Option<Value> {
    let (parent, leaf) = parent_mut(doc, dotted_path)?;
    parent.remove(leaf)
}

/// First segment of a dotted path
pub fn root(dotted_path: &str) -> &str {
    dotted_path.split('.').next().unwrap_or(dotted_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> Map<String, Value> {
        json!({
            "temporal": {"time_of_day": "evening", "nested": {"deep": 1}},
            "memory_echoes": []
        })
        .as_object()
        .cloned()
        .unwrap_or_default()
    }

    #[test]
    fn test_get() {
        let doc = doc();
        assert_eq!(get(&doc, "temporal.time_of_day"), Some(&json!("evening")));
        assert_eq!(get(&doc, "temporal.nested.deep"), Some(&json!(1)));
        assert_eq!(get(&doc, "memory_echoes"), Some(&json!([])));
        assert!(get(&doc, "memory_echoes.first").is_none());
        assert!(get(&doc, "missing.key").is_none());
    }

    #[test]
    fn test_set_requires_existing_parent() {
        let mut doc = doc();
        assert!(set(&mut doc, "temporal.time_of_day", json!("night")));
        assert_eq!(get(&doc, "temporal.time_of_day"), Some(&json!("night")));
        assert!(!set(&mut doc, "nowhere.key", json!(1)));
        assert!(get(&doc, "nowhere").is_none());
    }

    #[test]
    fn test_remove() {
        let mut doc = doc();
        assert_eq!(remove(&mut doc, "temporal.nested.deep"), Some(json!(1)));
        assert!(remove(&mut doc, "temporal.nested.deep").is_none());
        assert_eq!(root("temporal.nested.deep"), "temporal");
    }
}
