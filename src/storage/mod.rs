//! Persistence capability. The engines only define what they persist; the
//! host decides how a key reaches durable storage.

pub mod anchors;
pub mod placements;

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde::de::DeserializeOwned;
use thiserror::Error;

pub use anchors::{AnchorPersistence, AnchorRecord, ANCHORS_KEY};
pub use placements::{PlacementPersistence, PlacementRecord, PLACEMENTS_KEY};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage key is empty")]
    MissingKey,
    #[error("failed to read {key}: {reason}")]
    Unavailable { key: String, reason: String },
    #[error("store rejected write for {key}: {reason}")]
    Rejected { key: String, reason: String },
    #[error("failed to encode record for {key}: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// `get`/`set` string store supplied by the host.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>>;
    fn set(&mut self, key: &str, value: String) -> StorageResult<()>;
    fn remove(&mut self, key: &str) -> StorageResult<()>;
}

pub type SharedStore = Rc<RefCell<dyn KeyValueStore>>;

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Rc<RefCell<MemoryStore>> {
        Rc::new(RefCell::new(Self::new()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        validate_key(key)?;
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: String) -> StorageResult<()> {
        validate_key(key)?;
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        self.entries.remove(key);
        Ok(())
    }
}

fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::MissingKey);
    }
    Ok(())
}

/// Reads a key as JSON. A store failure is returned; a malformed payload
/// reads as `None`.
pub(crate) fn read_json(store: &SharedStore, key: &str) -> StorageResult<Option<serde_json::Value>> {
    let Some(raw) = store.borrow().get(key)? else {
        return Ok(None);
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Ok(Some(value)),
        Err(err) => {
            tracing::warn!(key, ?err, "persisted record is not valid JSON; ignoring it");
            Ok(None)
        }
    }
}

/// Lenient variant of [`read_json`] for display-only reads. Missing keys,
/// read failures and malformed payloads all come back as `None`.
pub(crate) fn read_json_value(store: &SharedStore, key: &str) -> Option<serde_json::Value> {
    read_json(store, key).unwrap_or_else(|err| {
        tracing::warn!(key, ?err, "failed to read persisted record");
        None
    })
}

pub(crate) fn write_json<T: serde::Serialize>(
    store: &SharedStore,
    key: &str,
    value: &T,
) -> StorageResult<()> {
    let encoded = serde_json::to_string(value).map_err(|source| StorageError::Encode {
        key: key.to_string(),
        source,
    })?;
    store.borrow_mut().set(key, encoded)
}

/// Parses every entry of a JSON object independently, dropping the ones
/// that do not fit `T`.
pub(crate) fn parse_entries<T: DeserializeOwned>(
    key: &str,
    map: serde_json::Map<String, serde_json::Value>,
) -> Vec<(String, T)> {
    map.into_iter()
        .filter_map(|(id, value)| match serde_json::from_value(value) {
            Ok(record) => Some((id, record)),
            Err(err) => {
                tracing::warn!(key, id = %id, ?err, "dropping malformed persisted entry");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Store whose reads can be switched off to simulate a transient outage.
    #[derive(Default)]
    pub(crate) struct ReadFailingStore {
        pub(crate) inner: MemoryStore,
        pub(crate) fail_reads: bool,
    }

    impl KeyValueStore for ReadFailingStore {
        fn get(&self, key: &str) -> StorageResult<Option<String>> {
            if self.fail_reads {
                return Err(StorageError::Unavailable {
                    key: key.to_string(),
                    reason: "backend offline".to_string(),
                });
            }
            self.inner.get(key)
        }

        fn set(&mut self, key: &str, value: String) -> StorageResult<()> {
            self.inner.set(key, value)
        }

        fn remove(&mut self, key: &str) -> StorageResult<()> {
            self.inner.remove(key)
        }
    }

    #[test]
    fn memory_store_round_trips_and_rejects_empty_keys() {
        let mut store = MemoryStore::new();
        store.set("a", "1".to_string()).expect("set should work");
        assert_eq!(store.get("a").expect("get should work"), Some("1".to_string()));
        store.remove("a").expect("remove should work");
        assert!(store.is_empty());
        assert!(matches!(store.get(""), Err(StorageError::MissingKey)));
    }

    #[test]
    fn malformed_json_reads_as_nothing() {
        let store = MemoryStore::shared();
        store
            .borrow_mut()
            .set("broken", "{not json".to_string())
            .expect("set should work");
        let shared: SharedStore = store;
        assert!(read_json_value(&shared, "broken").is_none());
        assert!(read_json_value(&shared, "missing").is_none());
        assert!(matches!(read_json(&shared, "broken"), Ok(None)));
    }

    #[test]
    fn read_failures_propagate_from_strict_reads_only() {
        let store = Rc::new(RefCell::new(ReadFailingStore::default()));
        store
            .borrow_mut()
            .set("record", "{}".to_string())
            .expect("set should work");
        store.borrow_mut().fail_reads = true;
        let shared: SharedStore = store;

        assert!(matches!(
            read_json(&shared, "record"),
            Err(StorageError::Unavailable { .. })
        ));
        assert!(read_json_value(&shared, "record").is_none());
    }

    #[test]
    fn parse_entries_keeps_valid_records_only() {
        let map = serde_json::json!({ "a": 1, "b": "two", "c": 3 });
        let serde_json::Value::Object(map) = map else {
            panic!("fixture is an object");
        };
        let mut parsed: Vec<(String, u32)> = parse_entries("numbers", map);
        parsed.sort();
        assert_eq!(parsed, vec![("a".to_string(), 1), ("c".to_string(), 3)]);
    }
}
