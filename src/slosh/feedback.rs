//! Signal utility scores and breadcrumbs

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

use super::path;
use super::signals::SignalCategory;

/// Scores below this magnitude are forgotten
const SCORE_EPSILON: f64 = 0.01;

/// Which signals helped an agent and which did not (dotted paths)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalFeedback {
    #[serde(default)]
    pub useful_signals: Vec<String>,
    #[serde(default)]
    pub useless_signals: Vec<String>,
}

impl SignalFeedback {
    pub fn useful(paths: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            useful_signals: paths.into_iter().map(Into::into).collect(),
            useless_signals: Vec::new(),
        }
    }

    pub fn useless(paths: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            useful_signals: Vec::new(),
            useless_signals: paths.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.useful_signals.is_empty() && self.useless_signals.is_empty()
    }
}

/// Accumulated per-field utility, owned by one agent instance
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalUtility {
    scores: BTreeMap<String, f64>,
}

impl SignalUtility {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record feedback: +1 per useful path, -1 per useless path
    pub fn record(&mut self, feedback: &SignalFeedback) {
        for signal in &feedback.useful_signals {
            *self.scores.entry(signal.clone()).or_insert(0.0) += 1.0;
        }
        for signal in &feedback.useless_signals {
            *self.scores.entry(signal.clone()).or_insert(0.0) -= 1.0;
        }
    }

    /// Pull every score toward zero
    pub fn decay(&mut self, factor: f64) {
        for score in self.scores.values_mut() {
            *score *= factor;
        }
        self.scores.retain(|_, score| score.abs() >= SCORE_EPSILON);
    }

    pub fn score(&self, dotted_path: &str) -> f64 {
        self.scores.get(dotted_path).copied().unwrap_or(0.0)
    }

    /// Sum of the scores of every field in a category
    pub fn category_score(&self, category: SignalCategory) -> f64 {
        self.scores
            .iter()
            .filter(|(signal, _)| path::root(signal) == category.as_str())
            .map(|(_, score)| score)
            .sum()
    }

    /// Categories whose score is at or below `threshold`
    ///
    /// Orientation is never suppressed.
    pub fn suppressed(&self, threshold: f64) -> Vec<SignalCategory> {
        SignalCategory::FILTERABLE
            .into_iter()
            .filter(|c| {
                self.scores.keys().any(|k| path::root(k) == c.as_str())
                    && self.category_score(*c) <= threshold
            })
            .collect()
    }

    pub fn scores(&self) -> &BTreeMap<String, f64> {
        &self.scores
    }

    pub fn clear(&mut self) {
        self.scores.clear();
    }
}

/// A remembered past query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Breadcrumb {
    pub query: String,
    pub timestamp: String,
    pub confidence: String,
}

/// Most-recent-first trail of past queries with a fixed capacity
#[derive(Debug, Clone, Default)]
pub struct BreadcrumbTrail {
    crumbs: VecDeque<Breadcrumb>,
    capacity: usize,
}

impl BreadcrumbTrail {
    pub fn new(capacity: usize) -> Self {
        Self {
            crumbs: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push a crumb to the front, dropping the oldest past capacity
    pub fn push(&mut self, crumb: Breadcrumb) {
        self.crumbs.push_front(crumb);
        self.crumbs.truncate(self.capacity);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Breadcrumb> {
        self.crumbs.iter()
    }

    pub fn to_vec(&self) -> Vec<Breadcrumb> {
        self.crumbs.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.crumbs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.crumbs.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crumb(query: &str) -> Breadcrumb {
        Breadcrumb {
            query: query.to_string(),
            timestamp: String::new(),
            confidence: "low".to_string(),
        }
    }

    #[test]
    fn test_breadcrumbs_are_lifo_and_bounded() {
        let mut trail = BreadcrumbTrail::new(2);
        trail.push(crumb("first"));
        trail.push(crumb("second"));
        trail.push(crumb("third"));

        let queries: Vec<&str> = trail.iter().map(|c| c.query.as_str()).collect();
        assert_eq!(queries, vec!["third", "second"]);
    }

    #[test]
    fn test_zero_capacity_keeps_nothing() {
        let mut trail = BreadcrumbTrail::new(0);
        trail.push(crumb("ignored"));
        assert!(trail.is_empty());
    }

    #[test]
    fn test_scores_and_suppression() {
        let mut utility = SignalUtility::new();
        let useless = SignalFeedback::useless(["temporal.time_of_day"]);
        for _ in 0..3 {
            utility.decay(0.9);
            utility.record(&useless);
        }
        utility.decay(0.9);

        assert!(utility.score("temporal.time_of_day") < -2.0);
        assert_eq!(utility.suppressed(-2.0), vec![SignalCategory::Temporal]);
        assert!(utility.suppressed(-3.0).is_empty());
    }

    #[test]
    fn test_orientation_never_suppressed() {
        let mut utility = SignalUtility::new();
        for _ in 0..5 {
            utility.record(&SignalFeedback::useless(["orientation.hints", "priors.crm"]));
        }
        assert_eq!(utility.category_score(SignalCategory::Orientation), -5.0);
        assert_eq!(utility.suppressed(-2.0), vec![SignalCategory::Priors]);
    }

    #[test]
    fn test_useful_offsets_useless() {
        let mut utility = SignalUtility::new();
        utility.record(&SignalFeedback::useless(["priors.crm"]));
        utility.record(&SignalFeedback::useful(["priors.crm", "priors.erp"]));
        assert_eq!(utility.score("priors.crm"), 0.0);
        assert_eq!(utility.category_score(SignalCategory::Priors), 1.0);
    }

    #[test]
    fn test_decay_forgets_tiny_scores() {
        let mut utility = SignalUtility::new();
        utility.record(&SignalFeedback::useful(["behavioral.prefers_brief"]));
        utility.decay(0.001);
        assert!(utility.scores().is_empty());
    }
}
