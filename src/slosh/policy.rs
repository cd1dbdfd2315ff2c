//! Filter, preference and privacy policies applied to the signal document

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use super::path;
use super::signals::{zero_category, SignalCategory};

/// Which categories an agent sees
///
/// A non-empty `include` wins over `exclude`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SloshFilter {
    #[serde(default)]
    pub include: Vec<SignalCategory>,
    #[serde(default)]
    pub exclude: Vec<SignalCategory>,
}

impl SloshFilter {
    /// Only populate these categories
    pub fn include(categories: impl IntoIterator<Item = SignalCategory>) -> Self {
        Self {
            include: categories.into_iter().collect(),
            exclude: Vec::new(),
        }
    }

    /// Zero these categories
    pub fn exclude(categories: impl IntoIterator<Item = SignalCategory>) -> Self {
        Self {
            include: Vec::new(),
            exclude: categories.into_iter().collect(),
        }
    }

    /// Whether a category is explicitly kept by `include`
    pub fn protects(&self, category: SignalCategory) -> bool {
        self.include.contains(&category)
    }

    /// Zero every category the filter rejects (orientation is never filtered)
    pub fn apply(&self, doc: &mut Map<String, Value>) {
        for category in SignalCategory::FILTERABLE {
            let keep = if !self.include.is_empty() {
                self.include.contains(&category)
            } else {
                !self.exclude.contains(&category)
            };
            if !keep {
                zero_category(doc, category);
            }
        }
    }
}

/// Soft preferences: suppress categories or prioritize one in orientation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SloshPreferences {
    #[serde(default)]
    pub suppress: Vec<SignalCategory>,
    #[serde(default)]
    pub prioritize: Vec<SignalCategory>,
}

impl SloshPreferences {
    pub fn apply(&self, doc: &mut Map<String, Value>) {
        for category in &self.suppress {
            zero_category(doc, *category);
        }

        if self.prioritize.is_empty() {
            return;
        }
        let Some(hints) = doc
            .get_mut(SignalCategory::Orientation.as_str())
            .and_then(|o| o.get_mut("hints"))
            .and_then(|h| h.as_array_mut())
        else {
            return;
        };
        let names: Vec<&str> = self.prioritize.iter().map(|c| c.as_str()).collect();
        hints.insert(0, Value::String(format!("Signal priority: {}", names.join(", "))));
    }
}

/// Privacy transforms applied after filtering
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SloshPrivacy {
    /// Dotted paths deleted outright
    #[serde(default)]
    pub redact: Vec<String>,

    /// Dotted paths replaced with a one-way token
    #[serde(default)]
    pub obfuscate: Vec<String>,

    /// Skip signal gathering entirely
    #[serde(default)]
    pub disabled: bool,
}

impl SloshPrivacy {
    /// Privacy policy that turns slosh off
    pub fn disabled() -> Self {
        Self {
            disabled: true,
            ..Default::default()
        }
    }

    pub fn apply(&self, doc: &mut Map<String, Value>) {
        for dotted in &self.redact {
            path::remove(doc, dotted);
        }
        for dotted in &self.obfuscate {
            if let Some(value) = path::get(doc, dotted) {
                let token = obfuscate_value(value);
                path::set(doc, dotted, Value::String(token));
            }
        }
    }
}

/// Deterministic one-way token: `[obfuscated:<8 hex chars>]`
pub fn obfuscate_value(value: &Value) -> String {
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let digest = Sha256::digest(text.as_bytes());
    format!("[obfuscated:{}]", &hex::encode(digest)[..8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slosh::signals::minimal_signals;
    use serde_json::json;

    fn populated() -> Map<String, Value> {
        let mut doc = minimal_signals("2026-01-01T00:00:00");
        doc.insert(
            "temporal".to_string(),
            json!({"time_of_day": "morning", "day_of_week": "Monday"}),
        );
        doc.insert("priors".to_string(), json!({"crm": {"preferred": "hubspot"}}));
        doc
    }

    #[test]
    fn test_include_wins_over_exclude() {
        let mut doc = populated();
        let filter = SloshFilter {
            include: vec![SignalCategory::Temporal],
            exclude: vec![SignalCategory::Temporal],
        };
        filter.apply(&mut doc);
        assert_eq!(doc["temporal"]["time_of_day"], "morning");
        assert_eq!(doc["priors"], json!({}));
    }

    #[test]
    fn test_orientation_survives_filters() {
        let mut doc = populated();
        doc.insert(
            "orientation".to_string(),
            json!({"confidence": "high", "hints": ["be brief"]}),
        );
        SloshFilter::include([SignalCategory::Temporal]).apply(&mut doc);
        assert_eq!(doc["orientation"]["hints"][0], "be brief");

        SloshFilter::exclude([SignalCategory::Orientation]).apply(&mut doc);
        assert_eq!(doc["orientation"]["confidence"], "high");
    }

    #[test]
    fn test_exclude_zeroes_to_empty_form() {
        let mut doc = populated();
        SloshFilter::exclude([SignalCategory::Temporal]).apply(&mut doc);
        assert_eq!(doc["temporal"], json!({}));
        assert_eq!(doc["priors"]["crm"]["preferred"], "hubspot");
    }

    #[test]
    fn test_preferences() {
        let mut doc = populated();
        SloshPreferences {
            suppress: vec![SignalCategory::Priors],
            prioritize: vec![SignalCategory::Temporal],
        }
        .apply(&mut doc);
        assert_eq!(doc["priors"], json!({}));
        assert_eq!(doc["orientation"]["hints"][0], "Signal priority: temporal");
    }

    #[test]
    fn test_privacy_redact_and_obfuscate() {
        let mut doc = populated();
        SloshPrivacy {
            redact: vec!["temporal.day_of_week".to_string()],
            obfuscate: vec!["temporal.time_of_day".to_string()],
            disabled: false,
        }
        .apply(&mut doc);

        assert!(doc["temporal"].get("day_of_week").is_none());
        let token = doc["temporal"]["time_of_day"].as_str().unwrap().to_string();
        assert!(token.starts_with("[obfuscated:"));
        assert_eq!(token.len(), "[obfuscated:]".len() + 8);
        assert_eq!(token, obfuscate_value(&json!("morning")));
        assert_ne!(token, obfuscate_value(&json!("evening")));
    }
}
