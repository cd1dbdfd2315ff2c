use serde::{Deserialize, Serialize};

/// How a broadcast resolves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BroadcastMode {
    /// Every agent runs; the call returns once all have settled
    #[default]
    All,

    /// Like `All`, but the first successful response is recorded
    Race,

    /// Agents are tried one at a time, in list order, until one succeeds
    Fallback,
}

impl std::fmt::Display for BroadcastMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BroadcastMode::All => write!(f, "all"),
            BroadcastMode::Race => write!(f, "race"),
            BroadcastMode::Fallback => write!(f, "fallback"),
        }
    }
}

/// A fixed set of agents bound to a completion mode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastGroup {
    pub id: String,
    pub agent_ids: Vec<String>,
    #[serde(default)]
    pub mode: BroadcastMode,
}

impl BroadcastGroup {
    pub fn new<I, S>(id: impl Into<String>, agent_ids: I, mode: BroadcastMode) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            agent_ids: agent_ids.into_iter().map(Into::into).collect(),
            mode,
        }
    }

    pub fn len(&self) -> usize {
        self.agent_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agent_ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_group_from_json() {
        let group: BroadcastGroup = serde_json::from_value(json!({
            "id": "reviewers",
            "agentIds": ["a", "b"],
            "mode": "race"
        }))
        .unwrap();
        assert_eq!(group.mode, BroadcastMode::Race);
        assert_eq!(group.len(), 2);

        let group: BroadcastGroup =
            serde_json::from_value(json!({"id": "x", "agentIds": []})).unwrap();
        assert_eq!(group.mode, BroadcastMode::All);
        assert!(group.is_empty());
    }
}
