// src/work/data.rs

//! Small key/value payloads passed into and out of work units.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A lightweight, string-keyed container of JSON values.
///
/// `Data` is the job payload, a chain's seed input and every stage's output.
/// It is moved from stage to stage, never shared.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Data(BTreeMap<String, Value>);

impl Data {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Add a value, consuming and returning `self`.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// The value under `key` if it is a JSON string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Short, log-friendly description: `{key=value, ...}` with long values
    /// truncated.
    pub fn summary(&self) -> String {
        const MAX_VALUE_LEN: usize = 32;

        let parts: Vec<String> = self
            .0
            .iter()
            .map(|(k, v)| {
                let rendered = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                if rendered.chars().count() > MAX_VALUE_LEN {
                    let cut: String = rendered.chars().take(MAX_VALUE_LEN).collect();
                    format!("{k}={cut}...")
                } else {
                    format!("{k}={rendered}")
                }
            })
            .collect();

        format!("{{{}}}", parts.join(", "))
    }

    /// Build from a JSON object; any other JSON value is rejected.
    pub fn from_json_object(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map.into_iter().collect())),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.0.clone().into_iter().collect())
    }
}

impl From<BTreeMap<String, Value>> for Data {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, Value)> for Data {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
