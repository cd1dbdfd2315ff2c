use std::collections::{HashMap, HashSet, VecDeque};

use super::node::GraphNode;

/// Every problem that keeps the nodes from forming a runnable DAG
///
/// Reports missing dependencies and, when all dependencies exist, the nodes
/// caught in cycles. An empty list means the graph is valid.
pub fn validate_nodes(nodes: &[GraphNode]) -> Vec<String> {
    let mut errors = Vec::new();
    let names: HashSet<&str> = nodes.iter().map(|n| n.name.as_str()).collect();

    for node in nodes {
        for dep in &node.depends_on {
            if !names.contains(dep.as_str()) {
                errors.push(format!(
                    "Node '{}' depends on unknown node '{}'",
                    node.name, dep
                ));
            }
        }
    }
    if !errors.is_empty() {
        return errors;
    }

    let mut in_degree: HashMap<&str, usize> =
        nodes.iter().map(|n| (n.name.as_str(), n.depends_on.len())).collect();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for node in nodes {
        for dep in &node.depends_on {
            dependents.entry(dep.as_str()).or_default().push(node.name.as_str());
        }
    }

    let mut queue: VecDeque<&str> = nodes
        .iter()
        .filter(|n| n.depends_on.is_empty())
        .map(|n| n.name.as_str())
        .collect();
    let mut visited = 0usize;

    while let Some(name) = queue.pop_front() {
        visited += 1;
        for dependent in dependents.get(name).into_iter().flatten() {
            if let Some(degree) = in_degree.get_mut(dependent) {
                *degree = degree.saturating_sub(1);
                if *degree == 0 {
                    queue.push_back(*dependent);
                }
            }
        }
    }

    if visited != nodes.len() {
        let stuck: Vec<&str> = nodes
            .iter()
            .map(|n| n.name.as_str())
            .filter(|name| in_degree.get(name).copied().unwrap_or(0) > 0)
            .collect();
        errors.push(format!("Cycle detected involving: {}", stuck.join(", ")));
    }

    errors
}

/// Topological order of the nodes (insertion order among peers)
pub(crate) fn topological_order(nodes: &[GraphNode]) -> Option<Vec<String>> {
    if !validate_nodes(nodes).is_empty() {
        return None;
    }
    let mut done: HashSet<&str> = HashSet::new();
    let mut order = Vec::with_capacity(nodes.len());
    while order.len() < nodes.len() {
        let ready: Vec<&str> = nodes
            .iter()
            .filter(|n| !done.contains(n.name.as_str()))
            .filter(|n| n.depends_on.iter().all(|d| done.contains(d.as_str())))
            .map(|n| n.name.as_str())
            .collect();
        for name in ready {
            done.insert(name);
            order.push(name.to_string());
        }
    }
    Some(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{agent_fn, ArcAgent};
    use crate::core::AgentOutcome;
    use std::sync::Arc;

    fn node(name: &str, deps: &[&str]) -> GraphNode {
        let agent: ArcAgent = Arc::new(agent_fn("noop", |_input, _ctx| async move {
            Ok(AgentOutcome::success("ok"))
        }));
        GraphNode::new(name, agent).depends_on(deps.iter().copied())
    }

    #[test]
    fn test_valid_dag() {
        let nodes = vec![node("a", &[]), node("b", &["a"]), node("c", &["a", "b"])];
        assert!(validate_nodes(&nodes).is_empty());
        assert_eq!(topological_order(&nodes).unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_missing_dependencies_are_all_reported() {
        let nodes = vec![node("a", &["ghost"]), node("b", &["phantom"])];
        let errors = validate_nodes(&nodes);
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("ghost"));
        assert!(errors[1].contains("phantom"));
    }

    #[test]
    fn test_cycle_detected() {
        let nodes = vec![node("root", &[]), node("a", &["b"]), node("b", &["a"])];
        let errors = validate_nodes(&nodes);
        assert_eq!(errors, vec!["Cycle detected involving: a, b".to_string()]);
        assert!(topological_order(&nodes).is_none());
    }
}
