use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::autopin::Anchor;
use crate::element::ElementId;

use super::{parse_entries, read_json, read_json_value, write_json, SharedStore, StorageResult};

pub const ANCHORS_KEY: &str = "autopin-anchors";
const SCHEMA_VERSION: u32 = 1;

const fn default_scale() -> f64 {
    1.0
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnchorRecord {
    pub fx: f64,
    pub fy: f64,
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(default)]
    pub z_index: i32,
}

impl AnchorRecord {
    pub const fn new(anchor: Anchor, scale: f64, z_index: i32) -> Self {
        Self {
            fx: anchor.fx,
            fy: anchor.fy,
            scale,
            z_index,
        }
    }

    pub const fn anchor(&self) -> Anchor {
        Anchor::new(self.fx, self.fy)
    }
}

#[derive(Debug, Serialize)]
struct AnchorFile<'a> {
    version: u32,
    anchors: &'a BTreeMap<ElementId, AnchorRecord>,
}

/// Anchor records under one versioned key.
///
/// Earlier releases stored a bare `{id: record}` map; it is migrated on read
/// and rewritten in the versioned shape on the next save.
#[derive(Clone)]
pub struct AnchorPersistence {
    store: SharedStore,
    key: String,
}

impl AnchorPersistence {
    pub fn new(store: SharedStore) -> Self {
        Self::with_key(store, ANCHORS_KEY)
    }

    pub fn with_key(store: SharedStore, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    pub fn load_all(&self) -> BTreeMap<ElementId, AnchorRecord> {
        read_json_value(&self.store, &self.key)
            .map(|value| migrate(&self.key, value))
            .unwrap_or_default()
    }

    pub fn load(&self, id: &ElementId) -> Option<AnchorRecord> {
        self.load_all().remove(id)
    }

    /// Read-modify-write of the whole map. A failed read aborts the save so
    /// other elements' anchors are never overwritten with a partial map.
    pub fn save(&self, id: &ElementId, record: AnchorRecord) -> StorageResult<()> {
        let mut anchors = self.read_all()?;
        anchors.insert(id.clone(), record);
        self.write(&anchors)?;
        tracing::debug!(element = %id, ?record, "anchor persisted");
        Ok(())
    }

    pub fn remove(&self, id: &ElementId) -> StorageResult<bool> {
        let mut anchors = self.read_all()?;
        if anchors.remove(id).is_none() {
            return Ok(false);
        }
        self.write(&anchors)?;
        Ok(true)
    }

    fn read_all(&self) -> StorageResult<BTreeMap<ElementId, AnchorRecord>> {
        Ok(read_json(&self.store, &self.key)?
            .map(|value| migrate(&self.key, value))
            .unwrap_or_default())
    }

    fn write(&self, anchors: &BTreeMap<ElementId, AnchorRecord>) -> StorageResult<()> {
        write_json(
            &self.store,
            &self.key,
            &AnchorFile {
                version: SCHEMA_VERSION,
                anchors,
            },
        )
    }
}

fn migrate(key: &str, value: serde_json::Value) -> BTreeMap<ElementId, AnchorRecord> {
    let serde_json::Value::Object(mut root) = value else {
        tracing::warn!(key, "anchor record is not an object; ignoring it");
        return BTreeMap::new();
    };

    let entries = match (root.remove("version"), root.remove("anchors")) {
        (Some(version), Some(serde_json::Value::Object(anchors))) => {
            if version.as_u64() != Some(u64::from(SCHEMA_VERSION)) {
                tracing::warn!(key, %version, "unknown anchor schema version; reading best effort");
            }
            anchors
        }
        (None, None) => {
            tracing::info!(key, "migrating unversioned anchor map");
            root
        }
        _ => {
            tracing::warn!(key, "anchor record has an unexpected shape; ignoring it");
            return BTreeMap::new();
        }
    };

    parse_entries::<AnchorRecord>(key, entries)
        .into_iter()
        .filter(|(_, record)| record.anchor().is_finite())
        .map(|(id, record)| (ElementId::from(id), record))
        .collect()
}
