//! Test scenarios extracted from document analysis.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Priority classification assigned by the analysis stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioPriority {
    /// Must-pass scenario covering a core business rule.
    Critical,
    /// High-value scenario.
    High,
    /// Medium-value scenario.
    Medium,
    /// Default priority.
    #[default]
    Normal,
}

impl fmt::Display for ScenarioPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Critical => write!(f, "critical"),
            Self::High => write!(f, "high"),
            Self::Medium => write!(f, "medium"),
            Self::Normal => write!(f, "normal"),
        }
    }
}

/// One discrete test scenario extracted from a specification document.
///
/// The id is the fan-out key for generation calls: unique within a run
/// and stable across retries, so partial generation results merge
/// without duplication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioUnit {
    /// Stable scenario identifier.
    pub id: String,
    /// Short human-readable title.
    pub title: String,
    /// Priority classification.
    #[serde(default)]
    pub priority: ScenarioPriority,
    /// Free-form description of the behaviour under test.
    #[serde(default)]
    pub description: String,
    /// Ordered test steps, when the analysis service provides them.
    #[serde(default)]
    pub steps: Vec<String>,
}

impl ScenarioUnit {
    /// Creates a scenario with the given id and title.
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            priority: ScenarioPriority::default(),
            description: String::new(),
            steps: Vec::new(),
        }
    }

    /// Sets the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: ScenarioPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Drops scenarios whose id was already seen, preserving order.
///
/// Duplicate ids would break result merging at the fan-out join, so
/// the first occurrence wins and later ones are discarded.
#[must_use]
pub fn dedup_by_id(scenarios: Vec<ScenarioUnit>) -> Vec<ScenarioUnit> {
    let mut seen = std::collections::HashSet::new();
    scenarios
        .into_iter()
        .filter(|s| seen.insert(s.id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_default() {
        assert_eq!(ScenarioPriority::default(), ScenarioPriority::Normal);
    }

    #[test]
    fn test_scenario_builder() {
        let scenario = ScenarioUnit::new("login-01", "Valid login")
            .with_priority(ScenarioPriority::Critical)
            .with_description("User logs in with valid credentials");

        assert_eq!(scenario.id, "login-01");
        assert_eq!(scenario.priority, ScenarioPriority::Critical);
    }

    #[test]
    fn test_deserialize_defaults() {
        let scenario: ScenarioUnit =
            serde_json::from_str(r#"{"id": "s1", "title": "t"}"#).unwrap();
        assert_eq!(scenario.priority, ScenarioPriority::Normal);
        assert!(scenario.steps.is_empty());
    }

    #[test]
    fn test_dedup_keeps_first() {
        let scenarios = vec![
            ScenarioUnit::new("a", "first"),
            ScenarioUnit::new("b", "second"),
            ScenarioUnit::new("a", "duplicate"),
        ];

        let deduped = dedup_by_id(scenarios);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].title, "first");
        assert_eq!(deduped[1].id, "b");
    }
}
