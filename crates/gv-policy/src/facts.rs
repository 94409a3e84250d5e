// facts.rs — Fact snapshots: the only input an evaluation reads.
//
// A snapshot is a plain map from metric name to value. It is built by the
// caller (from signals, telemetry, a JSON file) before evaluation starts and
// is never consulted again afterwards, so evaluation cannot observe anything
// that was not captured up front.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One observed value.
///
/// JSON shapes: `true`, `12.5`, `"eu"`, `{"duration_ms": 1500}`. Anything
/// else is kept as `Other` and never matches a typed comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FactValue {
    Bool(bool),
    Number(f64),
    Text(String),
    Duration { duration_ms: u64 },
    Other(serde_json::Value),
}

impl FactValue {
    pub fn duration_ms(ms: u64) -> Self {
        FactValue::Duration { duration_ms: ms }
    }

    /// Type name used in evaluation traces.
    pub fn kind(&self) -> &'static str {
        match self {
            FactValue::Bool(_) => "bool",
            FactValue::Number(_) => "number",
            FactValue::Text(_) => "string",
            FactValue::Duration { .. } => "duration",
            FactValue::Other(_) => "other",
        }
    }
}

impl From<bool> for FactValue {
    fn from(v: bool) -> Self {
        FactValue::Bool(v)
    }
}

impl From<f64> for FactValue {
    fn from(v: f64) -> Self {
        FactValue::Number(v)
    }
}

impl From<i64> for FactValue {
    fn from(v: i64) -> Self {
        FactValue::Number(v as f64)
    }
}

impl From<&str> for FactValue {
    fn from(v: &str) -> Self {
        FactValue::Text(v.to_string())
    }
}

impl From<String> for FactValue {
    fn from(v: String) -> Self {
        FactValue::Text(v)
    }
}

/// An immutable-by-convention set of facts keyed by metric name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FactSnapshot {
    facts: BTreeMap<String, FactValue>,
}

impl FactSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, metric: impl Into<String>, value: impl Into<FactValue>) -> Self {
        self.insert(metric, value);
        self
    }

    pub fn insert(&mut self, metric: impl Into<String>, value: impl Into<FactValue>) {
        self.facts.insert(metric.into(), value.into());
    }

    pub fn get(&self, metric: &str) -> Option<&FactValue> {
        self.facts.get(metric)
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FactValue)> {
        self.facts.iter()
    }

    /// Parse a JSON object of facts.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Merge another snapshot in; its values win on conflict.
    pub fn extend(&mut self, other: FactSnapshot) {
        self.facts.extend(other.facts);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_shapes_map_to_fact_values() {
        let snapshot = FactSnapshot::from_json(
            r#"{"ok": true, "cost": 12.5, "region": "eu",
                "latency": {"duration_ms": 1500}, "tags": ["a"]}"#,
        )
        .unwrap();
        assert_eq!(snapshot.get("ok"), Some(&FactValue::Bool(true)));
        assert_eq!(snapshot.get("cost"), Some(&FactValue::Number(12.5)));
        assert_eq!(snapshot.get("region"), Some(&FactValue::from("eu")));
        assert_eq!(snapshot.get("latency"), Some(&FactValue::duration_ms(1500)));
        assert_eq!(snapshot.get("tags").map(FactValue::kind), Some("other"));
        assert_eq!(snapshot.len(), 5);
    }

    #[test]
    fn builder_and_extend() {
        let mut a = FactSnapshot::new().with("x", 1.0).with("y", "old");
        a.extend(FactSnapshot::new().with("y", "new"));
        assert_eq!(a.get("y"), Some(&FactValue::from("new")));
        assert_eq!(a.get("x"), Some(&FactValue::Number(1.0)));
    }
}
