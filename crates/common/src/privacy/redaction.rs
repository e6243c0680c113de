//! Key-based redaction of JSON payloads.
//!
//! A field is masked when its lowercased key contains any rule as a
//! substring, so matching over-includes: `company` is masked because it
//! contains `pan`.

use serde_json::{Map, Value};

/// Mask written in place of any redacted value.
pub const REDACTION_MASK: &str = "***";

/// Lowercase substrings that mark a key as sensitive.
pub const DEFAULT_SENSITIVE_KEYS: &[&str] = &[
    "password",
    "token",
    "authorization",
    "secret",
    "credential",
    "apikey",
    "api_key",
    "cvv",
    "pan",
];

/// Deep-copying JSON redactor.
///
/// The whole subtree under a matching key is replaced by the mask, whatever
/// its type; nothing beneath it is inspected. Inputs are wire payloads and
/// are assumed acyclic.
#[derive(Debug, Clone)]
pub struct Redactor {
    rules: Vec<String>,
    mask: String,
}

impl Default for Redactor {
    fn default() -> Self {
        Self::new(DEFAULT_SENSITIVE_KEYS.iter().copied())
    }
}

impl Redactor {
    /// Build a redactor from a rule list. Rules are lowercased on the way in.
    pub fn new<I, S>(rules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            rules: rules
                .into_iter()
                .map(|rule| rule.as_ref().to_ascii_lowercase())
                .filter(|rule| !rule.is_empty())
                .collect(),
            mask: REDACTION_MASK.to_string(),
        }
    }

    /// Replace the mask token (defaults to `***`).
    #[must_use]
    pub fn with_mask(mut self, mask: impl Into<String>) -> Self {
        self.mask = mask.into();
        self
    }

    /// Add an extra rule on top of the existing ones.
    #[must_use]
    pub fn with_rule(mut self, rule: impl AsRef<str>) -> Self {
        let rule = rule.as_ref().to_ascii_lowercase();
        if !rule.is_empty() && !self.rules.contains(&rule) {
            self.rules.push(rule);
        }
        self
    }

    pub fn mask(&self) -> &str {
        &self.mask
    }

    /// Whether a key would be masked.
    pub fn is_sensitive(&self, key: &str) -> bool {
        let key = key.to_lowercase();
        self.rules.iter().any(|rule| key.contains(rule.as_str()))
    }

    /// Return a redacted deep copy of `value`. The input is never modified.
    pub fn redact(&self, value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut out = Map::with_capacity(map.len());
                for (key, inner) in map {
                    let redacted = if self.is_sensitive(key) {
                        Value::String(self.mask.clone())
                    } else {
                        self.redact(inner)
                    };
                    out.insert(key.clone(), redacted);
                }
                Value::Object(out)
            }
            Value::Array(items) => {
                Value::Array(items.iter().map(|item| self.redact(item)).collect())
            }
            primitive => primitive.clone(),
        }
    }

    /// Redact `(name, value)` pairs such as HTTP headers.
    pub fn redact_pairs<'a, I>(&self, pairs: I) -> Vec<(String, String)>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        pairs
            .into_iter()
            .map(|(name, value)| {
                let value =
                    if self.is_sensitive(name) { self.mask.clone() } else { value.to_string() };
                (name.to_string(), value)
            })
            .collect()
    }
}
