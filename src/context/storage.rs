//! Client-side storage instructions.
//!
//! Handlers return a [`ClientStorage`] inside their JSON result to ask the
//! front end to set or clear `localStorage`/`sessionStorage` entries.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageAction {
    Set,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageEntry {
    pub action: StorageAction,
    pub data: Value,
    /// Time to live in milliseconds; 0 means no expiry.
    pub ms: u64,
}

impl StorageEntry {
    fn new(data: Value, ms: u64) -> Self {
        let action = if data.is_null() {
            StorageAction::Remove
        } else {
            StorageAction::Set
        };
        Self { action, data, ms }
    }
}

/// Serializes as `{"local": {...}, "session": {...}}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClientStorage {
    local: BTreeMap<String, StorageEntry>,
    session: BTreeMap<String, StorageEntry>,
}

impl ClientStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a `localStorage` entry, or remove it when `data` is null.
    pub fn local(mut self, name: impl Into<String>, data: Value, ms: u64) -> Self {
        self.local.insert(name.into(), StorageEntry::new(data, ms));
        self
    }

    /// Set a `sessionStorage` entry, or remove it when `data` is null.
    pub fn session(mut self, name: impl Into<String>, data: Value, ms: u64) -> Self {
        self.session.insert(name.into(), StorageEntry::new(data, ms));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_set_and_remove() {
        let storage = ClientStorage::new()
            .local("token", json!("abc"), 3_600_000)
            .session("draft", Value::Null, 0);

        assert_eq!(
            serde_json::to_value(&storage).unwrap(),
            json!({
                "local": {"token": {"action": "set", "data": "abc", "ms": 3_600_000}},
                "session": {"draft": {"action": "remove", "data": null, "ms": 0}}
            })
        );
    }
}
