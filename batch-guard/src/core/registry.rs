//! The failure registry shared by every rule engine in a run.

use super::path::AttributePath;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeSet, HashMap};

/// A single rule violation recorded against an attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Rule name, e.g. `unique`
    pub rule: String,
    /// Rule parameters as written (after wildcard substitution)
    pub parameters: Vec<String>,
}

impl Violation {
    /// Creates a violation descriptor.
    pub fn new(rule: impl Into<String>, parameters: Vec<String>) -> Self {
        Self {
            rule: rule.into(),
            parameters,
        }
    }
}

/// Failures keyed by externally visible attribute name (`{index}.{attribute}`).
///
/// The registry is append-only during a run; entries keep insertion order so
/// reports are stable attribute-then-index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FailureRegistry {
    failures: IndexMap<String, Vec<Violation>>,
    // parsed form of keys added through `add_for_path`; a rendered key loses
    // the distinction between a nesting dot and a literal dot in a field name
    paths: HashMap<String, AttributePath>,
}

impl FailureRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a violation under `key`.
    pub fn add(&mut self, key: impl Into<String>, violation: Violation) {
        self.failures.entry(key.into()).or_default().push(violation);
    }

    /// Records a violation under the rendered form of a concrete path.
    pub fn add_for_path(&mut self, path: &AttributePath, violation: Violation) {
        let key = path.to_string();
        self.paths.entry(key.clone()).or_insert_with(|| path.clone());
        self.add(key, violation);
    }

    /// Returns true if nothing has failed.
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Number of failing attribute keys.
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// Total number of violations across all keys.
    pub fn violation_count(&self) -> usize {
        self.failures.values().map(Vec::len).sum()
    }

    /// Returns the violations recorded for `key`.
    pub fn get(&self, key: &str) -> Option<&[Violation]> {
        self.failures.get(key).map(Vec::as_slice)
    }

    /// Returns true if `key` has at least one violation.
    pub fn contains_key(&self, key: &str) -> bool {
        self.failures.contains_key(key)
    }

    /// Failing keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.failures.keys().map(String::as_str)
    }

    /// Iterates `(key, violations)` in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Violation])> {
        self.failures
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Returns true if any failing key is matched by `pattern`.
    pub fn has_failure_matching(&self, pattern: &AttributePath) -> bool {
        self.failures.keys().any(|key| match self.paths.get(key) {
            Some(path) => pattern.matches(path),
            None => pattern.matches(&AttributePath::parse(key)),
        })
    }

    /// Distinct record indices that have at least one failure.
    pub fn failed_record_indices(&self) -> BTreeSet<usize> {
        self.failures
            .keys()
            .filter_map(|key| key.split('.').next()?.parse().ok())
            .collect()
    }
}

impl Serialize for FailureRegistry {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.failures.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FailureRegistry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Ok(Self {
            failures: IndexMap::deserialize(deserializer)?,
            paths: HashMap::new(),
        })
    }
}
