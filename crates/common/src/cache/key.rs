//! Hierarchical query keys
//!
//! A key is an ordered tuple of JSON scalars or objects, e.g.
//! `["patients", "list", {"status": "active"}]`. Invalidation works on
//! prefixes: `["patients"]` covers every list and detail key of that entity,
//! while `["patients", "detail", 7]` covers only that one entry.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::mem;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Ordered key identifying one cached query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryKey(Vec<Value>);

impl QueryKey {
    pub fn new<I, V>(segments: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Single-segment key, typically an entity name.
    pub fn root(name: &str) -> Self {
        Self(vec![Value::String(name.to_string())])
    }

    /// Child key with one more segment appended.
    #[must_use]
    pub fn child(&self, segment: impl Into<Value>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }

    pub fn segments(&self) -> &[Value] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `prefix` is a leading subsequence of this key. The empty key
    /// is a prefix of everything.
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl Hash for QueryKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.len().hash(state);
        for segment in &self.0 {
            hash_value(segment, state);
        }
    }
}

/// Structural hash consistent with `Value`'s `PartialEq`: object entries are
/// hashed in key order and `-0.0` hashes like `0.0`.
fn hash_value<H: Hasher>(value: &Value, state: &mut H) {
    mem::discriminant(value).hash(state);
    match value {
        Value::Null => {}
        Value::Bool(flag) => flag.hash(state),
        Value::Number(number) => {
            if let Some(int) = number.as_i64() {
                int.hash(state);
            } else if let Some(uint) = number.as_u64() {
                uint.hash(state);
            } else if let Some(float) = number.as_f64() {
                let float = if float == 0.0 { 0.0_f64 } else { float };
                float.to_bits().hash(state);
            }
        }
        Value::String(text) => text.hash(state),
        Value::Array(items) => {
            items.len().hash(state);
            for item in items {
                hash_value(item, state);
            }
        }
        Value::Object(map) => {
            map.len().hash(state);
            let mut fields: Vec<_> = map.iter().collect();
            fields.sort_unstable_by(|a, b| a.0.cmp(b.0));
            for (name, field) in fields {
                name.hash(state);
                hash_value(field, state);
            }
        }
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = serde_json::to_string(&self.0).map_err(|_| fmt::Error)?;
        f.write_str(&rendered)
    }
}

impl From<Vec<Value>> for QueryKey {
    fn from(segments: Vec<Value>) -> Self {
        Self(segments)
    }
}
