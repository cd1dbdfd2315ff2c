//! Signal categories and how each one is populated

use chrono::{Datelike, NaiveDateTime, Timelike};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::sync::OnceLock;

use super::memory::MemoryEntry;

/// The fixed set of ambient signal categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalCategory {
    Temporal,
    QuerySignals,
    MemoryEchoes,
    Behavioral,
    Priors,
    Orientation,
}

impl SignalCategory {
    /// All categories, in population order
    pub const ALL: [SignalCategory; 6] = [
        SignalCategory::Temporal,
        SignalCategory::QuerySignals,
        SignalCategory::MemoryEchoes,
        SignalCategory::Behavioral,
        SignalCategory::Priors,
        SignalCategory::Orientation,
    ];

    /// Categories a filter or auto-suppression may zero
    ///
    /// Orientation is synthesized from the others and always stays.
    pub const FILTERABLE: [SignalCategory; 5] = [
        SignalCategory::Temporal,
        SignalCategory::QuerySignals,
        SignalCategory::MemoryEchoes,
        SignalCategory::Behavioral,
        SignalCategory::Priors,
    ];

    /// Key of the category in the signal document
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalCategory::Temporal => "temporal",
            SignalCategory::QuerySignals => "query_signals",
            SignalCategory::MemoryEchoes => "memory_echoes",
            SignalCategory::Behavioral => "behavioral",
            SignalCategory::Priors => "priors",
            SignalCategory::Orientation => "orientation",
        }
    }

    /// Look a category up by its document key
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.as_str() == name)
    }

    /// The zeroed form of this category
    pub fn empty_value(&self) -> Value {
        match self {
            SignalCategory::Temporal | SignalCategory::Priors => json!({}),
            SignalCategory::MemoryEchoes => json!([]),
            SignalCategory::QuerySignals => json!({
                "specificity": "low",
                "hints": [],
                "word_count": 0,
                "is_question": false,
                "has_id_pattern": false,
            }),
            SignalCategory::Behavioral => json!({
                "prefers_brief": false,
                "technical_level": "standard",
                "frequent_entities": [],
            }),
            SignalCategory::Orientation => json!({
                "confidence": "low",
                "approach": "clarify",
                "hints": [],
                "response_style": "standard",
            }),
        }
    }
}

impl std::fmt::Display for SignalCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Zero a category in place
pub fn zero_category(doc: &mut Map<String, Value>, category: SignalCategory) {
    doc.insert(category.as_str().to_string(), category.empty_value());
}

/// A signal document with every category at its empty form
pub fn minimal_signals(timestamp: &str) -> Map<String, Value> {
    let mut doc = Map::new();
    doc.insert("timestamp".to_string(), Value::String(timestamp.to_string()));
    for category in SignalCategory::ALL {
        zero_category(&mut doc, category);
    }
    doc
}

/// Populate all six categories for one invocation
pub fn gather(query: &str, memories: &[MemoryEntry], now: NaiveDateTime) -> Map<String, Value> {
    let mut doc = Map::new();
    doc.insert(
        "timestamp".to_string(),
        Value::String(now.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
    );
    doc.insert("temporal".to_string(), temporal(now));
    doc.insert("query_signals".to_string(), query_signals(query));
    doc.insert("memory_echoes".to_string(), memory_echoes(query, memories));
    doc.insert("behavioral".to_string(), behavioral(memories));
    doc.insert("priors".to_string(), priors(query, memories));
    let orientation = orientation(&doc);
    doc.insert("orientation".to_string(), orientation);
    doc
}

/// Time-of-day, weekday and fiscal period signals
pub fn temporal(now: NaiveDateTime) -> Value {
    let hour = now.hour();
    let (time_of_day, likely_activity) = match hour {
        5..=8 => ("early_morning", "preparing_for_day"),
        9..=11 => ("morning", "active_work"),
        12..=16 => ("afternoon", "follow_ups"),
        17..=20 => ("evening", "wrap_up"),
        _ => ("night", "after_hours"),
    };

    let (month, day) = (now.month(), now.day());
    let fiscal = if matches!(month, 1 | 4 | 7 | 10) && day <= 15 {
        "quarter_start"
    } else if matches!(month, 3 | 6 | 9 | 12) && day >= 15 {
        "quarter_end_push"
    } else if month == 12 {
        "year_end"
    } else {
        "mid_quarter"
    };

    json!({
        "time_of_day": time_of_day,
        "day_of_week": now.format("%A").to_string(),
        "is_weekend": now.weekday().number_from_monday() >= 6,
        "quarter": format!("Q{}", (month - 1) / 3 + 1),
        "fiscal": fiscal,
        "likely_activity": likely_activity,
        "is_urgent_period": matches!(fiscal, "quarter_end_push" | "year_end"),
    })
}

struct QueryPatterns {
    quarterly: Regex,
    ownership_user: Regex,
    ownership_team: Regex,
    id: Regex,
    number: Regex,
}

fn patterns() -> &'static QueryPatterns {
    static PATTERNS: OnceLock<QueryPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| QueryPatterns {
        quarterly: Regex::new(r"q[1-4]").expect("static regex"),
        ownership_user: Regex::new(r"\bmy\b|\bmine\b").expect("static regex"),
        ownership_team: Regex::new(r"\bour\b|\bteam\b").expect("static regex"),
        id: Regex::new(r"[a-f0-9]{8}-").expect("static regex"),
        number: Regex::new(r"\b\d+\b").expect("static regex"),
    })
}

/// Signals extracted from the query text itself
pub fn query_signals(query: &str) -> Value {
    if query.is_empty() {
        return json!({"specificity": "low", "hints": []});
    }

    let lower = query.to_lowercase();
    let p = patterns();
    let mut hints = Vec::new();

    if ["today", "this morning", "now"].iter().any(|w| lower.contains(w)) {
        hints.push("temporal:today");
    }
    if ["latest", "recent", "current", "active"].iter().any(|w| lower.contains(w)) {
        hints.push("temporal:recency");
    }
    if ["yesterday", "last week", "previous"].iter().any(|w| lower.contains(w)) {
        hints.push("temporal:past");
    }
    if p.quarterly.is_match(&lower) {
        hints.push("temporal:quarterly");
    }
    if p.ownership_user.is_match(&lower) {
        hints.push("ownership:user");
    }
    if p.ownership_team.is_match(&lower) {
        hints.push("ownership:team");
    }

    let has_id = p.id.is_match(&lower);
    let has_number = p.number.is_match(&lower);
    let specificity = if has_id {
        "high"
    } else if hints.len() >= 2 || has_number {
        "medium"
    } else {
        "low"
    };

    json!({
        "specificity": specificity,
        "hints": hints,
        "word_count": query.split_whitespace().count(),
        "is_question": query.contains('?'),
        "has_id_pattern": has_id,
    })
}

/// Past messages sharing at least two words with the query (top three)
pub fn memory_echoes(query: &str, memories: &[MemoryEntry]) -> Value {
    if query.is_empty() || memories.is_empty() {
        return json!([]);
    }

    let lower = query.to_lowercase();
    let query_words: HashSet<&str> = lower.split_whitespace().collect();
    let denominator = query_words.len().max(1) as f64;

    let mut echoes: Vec<(f64, Value)> = memories
        .iter()
        .filter_map(|entry| {
            let message_lower = entry.message.to_lowercase();
            let message_words: HashSet<&str> = message_lower.split_whitespace().collect();
            let overlap = query_words.intersection(&message_words).count();
            if overlap < 2 {
                return None;
            }
            let relevance = overlap as f64 / denominator;
            let snippet: String = entry.message.chars().take(80).collect();
            Some((
                relevance,
                json!({"message": snippet, "theme": entry.theme, "relevance": relevance}),
            ))
        })
        .collect();

    echoes.sort_by(|a, b| b.0.total_cmp(&a.0));
    Value::Array(echoes.into_iter().take(3).map(|(_, v)| v).collect())
}

/// Behavioral profile inferred from remembered messages
pub fn behavioral(memories: &[MemoryEntry]) -> Value {
    let mut hints = SignalCategory::Behavioral.empty_value();
    if memories.is_empty() {
        return hints;
    }

    let total_words: usize = memories
        .iter()
        .map(|m| m.message.split_whitespace().count())
        .sum();
    let technical_count = memories
        .iter()
        .filter(|m| {
            let lower = m.message.to_lowercase();
            ["api", "schema", "guid", "crud"].iter().any(|t| lower.contains(t))
        })
        .count();

    hints["prefers_brief"] = json!((total_words as f64 / memories.len() as f64) < 15.0);
    if technical_count > 3 {
        hints["technical_level"] = json!("advanced");
    } else if technical_count > 0 {
        hints["technical_level"] = json!("intermediate");
    }
    hints
}

/// Disambiguation priors from remembered preferences
pub fn priors(query: &str, memories: &[MemoryEntry]) -> Value {
    let mut priors = Map::new();
    if query.is_empty() {
        return Value::Object(priors);
    }

    let query_lower = query.to_lowercase();
    for entry in memories.iter().filter(|m| m.theme == "preference") {
        let message = entry.message.to_lowercase();
        let Some((_, after)) = message.split_once("prefers") else {
            continue;
        };
        let preferred = after.split("for").next().unwrap_or("").trim().to_string();

        if let Some(word) = query_lower
            .split_whitespace()
            .find(|w| w.len() > 3 && message.contains(*w))
        {
            priors.insert(
                word.to_string(),
                json!({"preferred": preferred, "confidence": 0.85}),
            );
        }
    }
    Value::Object(priors)
}

/// Synthesize the other categories into an actionable orientation
pub fn orientation(doc: &Map<String, Value>) -> Value {
    let specificity = doc
        .get("query_signals")
        .and_then(|q| q.get("specificity"))
        .and_then(|s| s.as_str())
        .unwrap_or("low");
    let has_priors = doc
        .get("priors")
        .and_then(|p| p.as_object())
        .map(|p| !p.is_empty())
        .unwrap_or(false);

    let (confidence, approach) = if specificity == "high" {
        ("high", "direct")
    } else if has_priors {
        ("high", "use_preference")
    } else if specificity == "medium" {
        ("medium", "contextual")
    } else {
        ("low", "clarify")
    };

    let mut hints: Vec<&str> = doc
        .get("query_signals")
        .and_then(|q| q.get("hints"))
        .and_then(|h| h.as_array())
        .map(|hints| {
            hints
                .iter()
                .filter_map(|h| match h.as_str() {
                    Some("temporal:recency") => Some("Sort by most recent"),
                    Some("ownership:user") => Some("Filter by current user"),
                    Some("temporal:today") => Some("Focus on today's items"),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();

    let urgent = doc
        .get("temporal")
        .and_then(|t| t.get("is_urgent_period"))
        .and_then(|u| u.as_bool())
        .unwrap_or(false);
    if urgent {
        hints.push("Quarter/year end - prioritize closing activities");
    }

    let prefers_brief = doc
        .get("behavioral")
        .and_then(|b| b.get("prefers_brief"))
        .and_then(|b| b.as_bool())
        .unwrap_or(false);

    json!({
        "confidence": confidence,
        "approach": approach,
        "hints": hints,
        "response_style": if prefers_brief { "concise" } else { "standard" },
    })
}
