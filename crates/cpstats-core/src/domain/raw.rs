use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Outcome tag carried by a raw adapter payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Success,
    Fail,
}

/// Opaque per-platform field map produced by a source adapter.
///
/// Field names are whatever the adapter chose (`rating`, `maxRating`,
/// `problemsSolved`, ...). Lookups treat JSON `null` as missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSourceRecord {
    pub status: RecordStatus,
    #[serde(default)]
    pub fields: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

impl Default for RawSourceRecord {
    fn default() -> Self {
        Self::success()
    }
}

impl RawSourceRecord {
    pub fn success() -> Self {
        Self {
            status: RecordStatus::Success,
            fields: Map::new(),
            diagnostic: None,
        }
    }

    pub fn failed(diagnostic: impl Into<String>) -> Self {
        Self {
            status: RecordStatus::Fail,
            fields: Map::new(),
            diagnostic: Some(diagnostic.into()),
        }
    }

    /// Builds a successful record from a JSON object; non-object values yield
    /// an empty field map.
    pub fn from_json(value: Value) -> Self {
        let fields = match value {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            status: RecordStatus::Success,
            fields,
            diagnostic: None,
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn with_diagnostic(mut self, diagnostic: impl Into<String>) -> Self {
        self.diagnostic = Some(diagnostic.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn is_success(&self) -> bool {
        self.status == RecordStatus::Success
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).filter(|value| !value.is_null())
    }

    /// Reads a non-negative integer. Floats are rounded, numeric strings such
    /// as `"1,234"` are accepted, negatives are treated as missing.
    pub fn u64_field(&self, name: &str) -> Option<u64> {
        match self.get(name)? {
            Value::Number(number) => number.as_u64().or_else(|| {
                number
                    .as_f64()
                    .filter(|value| value.is_finite() && *value >= 0.0)
                    .map(|value| value.round() as u64)
            }),
            Value::String(text) => parse_count(text),
            _ => None,
        }
    }

    pub fn f64_field(&self, name: &str) -> Option<f64> {
        match self.get(name)? {
            Value::Number(number) => number.as_f64(),
            Value::String(text) => text.trim().trim_end_matches('%').parse().ok(),
            _ => None,
        }
    }

    pub fn str_field(&self, name: &str) -> Option<String> {
        match self.get(name)? {
            Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_owned()),
            Value::Number(number) => Some(number.to_string()),
            _ => None,
        }
    }

    /// First present integer among `names`, in order.
    pub fn first_u64(&self, names: &[&str]) -> Option<u64> {
        names.iter().find_map(|name| self.u64_field(name))
    }

    pub fn first_value(&self, names: &[&str]) -> Option<&Value> {
        names.iter().find_map(|name| self.get(name))
    }
}

fn parse_count(text: &str) -> Option<u64> {
    let digits: String = text
        .trim()
        .chars()
        .filter(|ch| *ch != ',' && *ch != '_')
        .collect();
    digits.parse().ok()
}
