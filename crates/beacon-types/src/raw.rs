use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::{WidgetError, WidgetResult};

/// Raw payloads keyed by query or function name.
///
/// A query that the store rejected is kept as a failure marker so that
/// post-processors reading it report `QueryFailed` instead of treating the
/// entry as absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawResults {
    entries: BTreeMap<String, Value>,
    failures: BTreeMap<String, String>,
}

impl RawResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, payload: Value) -> Self {
        self.insert(key, payload);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, payload: Value) {
        let key = key.into();
        self.failures.remove(&key);
        self.entries.insert(key, payload);
    }

    pub fn insert_failure(&mut self, key: impl Into<String>, reason: impl Into<String>) {
        let key = key.into();
        self.entries.remove(&key);
        self.failures.insert(key, reason.into());
    }

    /// Merges `other` into `self`; entries in `other` win.
    pub fn extend(&mut self, other: RawResults) {
        for (key, payload) in other.entries {
            self.insert(key, payload);
        }
        for (key, reason) in other.failures {
            self.insert_failure(key, reason);
        }
    }

    /// Payload for a required key.
    pub fn require(&self, key: &str) -> WidgetResult<&Value> {
        match self.optional(key)? {
            Some(payload) => Ok(payload),
            None => Err(WidgetError::QueryKeyMissing {
                key: key.to_string(),
            }),
        }
    }

    /// Payload for an optional key such as a past-period query.
    pub fn optional(&self, key: &str) -> WidgetResult<Option<&Value>> {
        if self.failures.contains_key(key) {
            return Err(WidgetError::QueryFailed {
                key: key.to_string(),
            });
        }
        Ok(self.entries.get(key))
    }

    pub fn failures(&self) -> impl Iterator<Item = (&String, &String)> {
        self.failures.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len() + self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
