use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::element::ElementId;
use crate::geometry::Bounds;
use crate::registry::{ElementRegistry, PositionOwner, RegistryResult};
use crate::transform::Transform;

use super::{parse_entries, read_json, read_json_value, write_json, SharedStore, StorageResult};

pub const PLACEMENTS_KEY: &str = "spine-positioning-state";
pub const MIRROR_KEY_PREFIX: &str = "bb-position-";
pub const DEFAULT_LEGACY_OWNER: &str = "default";
const SCHEMA_VERSION: u32 = 1;

const fn default_scale() -> f64 {
    1.0
}

/// Committed editing-state placement of one element.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementRecord {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(default)]
    pub z_index: i32,
}

impl PlacementRecord {
    pub const fn from_bounds(bounds: Bounds, scale: f64, z_index: i32) -> Self {
        Self {
            x: bounds.x,
            y: bounds.y,
            width: bounds.width,
            height: bounds.height,
            scale,
            z_index,
        }
    }

    pub const fn bounds(&self) -> Bounds {
        Bounds::new(self.x, self.y, self.width, self.height)
    }
}

#[derive(Serialize)]
struct PlacementFile<'a> {
    version: u32,
    characters: &'a BTreeMap<ElementId, PlacementRecord>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MirrorRecord<'a> {
    node_id: &'a ElementId,
    position: MirrorPosition,
    timestamp: u64,
}

#[derive(Serialize)]
struct MirrorPosition {
    left: f64,
    top: f64,
    width: f64,
    height: f64,
}

/// Editing-state placements under one versioned key.
///
/// Reads accept the versioned shape, an unversioned `{characters: {...}}`
/// map, and the single-character `{character: {...}}` shape, which is
/// attributed to the configured legacy owner. Only the versioned shape is
/// ever written.
#[derive(Clone)]
pub struct PlacementPersistence {
    store: SharedStore,
    key: String,
    legacy_owner: ElementId,
    mirror: bool,
}

impl PlacementPersistence {
    pub fn new(store: SharedStore) -> Self {
        Self {
            store,
            key: PLACEMENTS_KEY.to_string(),
            legacy_owner: ElementId::new(DEFAULT_LEGACY_OWNER),
            mirror: true,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_legacy_owner(mut self, owner: impl Into<ElementId>) -> Self {
        self.legacy_owner = owner.into();
        self
    }

    /// Disables the per-element `bb-position-<id>` compatibility key.
    pub fn without_mirror(mut self) -> Self {
        self.mirror = false;
        self
    }

    pub fn mirror_key(id: &ElementId) -> String {
        format!("{MIRROR_KEY_PREFIX}{id}")
    }

    pub fn load_all(&self) -> BTreeMap<ElementId, PlacementRecord> {
        read_json_value(&self.store, &self.key)
            .map(|value| self.migrate(value))
            .unwrap_or_default()
    }

    pub fn load(&self, id: &ElementId) -> Option<PlacementRecord> {
        self.load_all().remove(id)
    }

    /// Writes the primary record, then the compatibility mirror. A failed
    /// read of the current map aborts the save; a mirror failure is logged
    /// and does not fail it.
    pub fn save(&self, id: &ElementId, record: PlacementRecord) -> StorageResult<()> {
        let mut characters = read_json(&self.store, &self.key)?
            .map(|value| self.migrate(value))
            .unwrap_or_default();
        characters.insert(id.clone(), record);
        write_json(
            &self.store,
            &self.key,
            &PlacementFile {
                version: SCHEMA_VERSION,
                characters: &characters,
            },
        )?;
        tracing::debug!(element = %id, ?record, "placement persisted");

        if self.mirror {
            let mirror_key = Self::mirror_key(id);
            let mirror = MirrorRecord {
                node_id: id,
                position: MirrorPosition {
                    left: record.x,
                    top: record.y,
                    width: record.width,
                    height: record.height,
                },
                timestamp: unix_millis(),
            };
            if let Err(err) = write_json(&self.store, &mirror_key, &mirror) {
                tracing::warn!(element = %id, key = %mirror_key, ?err, "compatibility mirror write failed");
            }
        }
        Ok(())
    }

    /// Applies saved placements to registered, host-owned elements. Returns
    /// how many were restored.
    pub fn restore_into(&self, registry: &mut ElementRegistry) -> usize {
        let mut restored = 0;
        for (id, record) in self.load_all() {
            if !registry.contains(&id) {
                continue;
            }
            if registry.owner(&id).ok() != Some(PositionOwner::Host) {
                tracing::debug!(element = %id, "skipping restore; element is not host-owned");
                continue;
            }
            match restore_one(registry, &id, record.bounds()) {
                Ok(()) => restored += 1,
                Err(err) => tracing::warn!(element = %id, ?err, "failed to restore placement"),
            }
        }
        restored
    }

    fn migrate(&self, value: serde_json::Value) -> BTreeMap<ElementId, PlacementRecord> {
        let serde_json::Value::Object(mut root) = value else {
            tracing::warn!(key = %self.key, "placement record is not an object; ignoring it");
            return BTreeMap::new();
        };

        if let Some(serde_json::Value::Object(characters)) = root.remove("characters") {
            if let Some(version) = root.get("version") {
                if version.as_u64() != Some(u64::from(SCHEMA_VERSION)) {
                    tracing::warn!(key = %self.key, %version, "unknown placement schema version; reading best effort");
                }
            }
            return parse_entries::<PlacementRecord>(&self.key, characters)
                .into_iter()
                .filter(|(_, record)| record.bounds().is_finite())
                .map(|(id, record)| (ElementId::from(id), record))
                .collect();
        }

        if let Some(character) = root.remove("character") {
            return match serde_json::from_value::<PlacementRecord>(character) {
                Ok(record) if record.bounds().is_finite() => {
                    tracing::info!(
                        key = %self.key,
                        owner = %self.legacy_owner,
                        "migrating single-character placement record"
                    );
                    BTreeMap::from([(self.legacy_owner.clone(), record)])
                }
                Ok(_) | Err(_) => {
                    tracing::warn!(key = %self.key, "legacy placement record is malformed; ignoring it");
                    BTreeMap::new()
                }
            };
        }

        tracing::warn!(key = %self.key, "placement record has an unexpected shape; ignoring it");
        BTreeMap::new()
    }
}

fn restore_one(registry: &mut ElementRegistry, id: &ElementId, bounds: Bounds) -> RegistryResult<()> {
    let base_size = registry.base_size(id)?;
    let previous = registry.transform(id)?;
    registry.apply_bounds(id, PositionOwner::Host, bounds)?;
    registry.set_transform(id, Transform::from_bounds(bounds, base_size, previous))
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::element::StyledElement;
    use crate::geometry::Size;
    use crate::storage::{KeyValueStore, MemoryStore, StorageError};

    fn record() -> PlacementRecord {
        PlacementRecord::from_bounds(Bounds::new(10.0, 20.0, 120.0, 80.0), 1.0, 4)
    }

    #[test]
    fn save_writes_versioned_record_and_mirror() {
        let store = MemoryStore::shared();
        let persistence = PlacementPersistence::new(store.clone());
        persistence
            .save(&ElementId::new("hero"), record())
            .expect("save should succeed");

        let raw = store
            .borrow()
            .get(PLACEMENTS_KEY)
            .expect("read should succeed")
            .expect("key should exist");
        let value: serde_json::Value = serde_json::from_str(&raw).expect("valid json");
        assert_eq!(value["version"], 1);
        assert_eq!(value["characters"]["hero"]["width"], 120.0);
        assert!(value.get("character").is_none());

        let mirror = store
            .borrow()
            .get("bb-position-hero")
            .expect("read should succeed")
            .expect("mirror should exist");
        let mirror: serde_json::Value = serde_json::from_str(&mirror).expect("valid json");
        assert_eq!(mirror["nodeId"], "hero");
        assert_eq!(mirror["position"]["left"], 10.0);
    }

    #[test]
    fn legacy_single_character_shape_is_read_under_configured_owner() {
        let store = MemoryStore::shared();
        store
            .borrow_mut()
            .set(
                PLACEMENTS_KEY,
                r#"{"character":{"x":1,"y":2,"width":30,"height":40,"scale":0.5,"zIndex":1}}"#
                    .to_string(),
            )
            .expect("seed should be stored");
        let persistence = PlacementPersistence::new(store.clone()).with_legacy_owner("purattokun");

        let loaded = persistence
            .load(&ElementId::new("purattokun"))
            .expect("legacy record should migrate");
        assert_eq!(loaded.bounds(), Bounds::new(1.0, 2.0, 30.0, 40.0));
        assert_eq!(loaded.scale, 0.5);

        persistence
            .save(&ElementId::new("other"), record())
            .expect("save should succeed");
        let raw = store
            .borrow()
            .get(PLACEMENTS_KEY)
            .expect("read should succeed")
            .expect("key should exist");
        let value: serde_json::Value = serde_json::from_str(&raw).expect("valid json");
        assert!(value.get("character").is_none());
        assert_eq!(value["characters"]["purattokun"]["x"], 1.0);
    }

    #[test]
    fn corrupt_records_degrade_to_nothing_persisted() {
        let store = MemoryStore::shared();
        let persistence = PlacementPersistence::new(store.clone());
        for corrupt in ["not json", "42", r#"{"character":{"x":"left"}}"#, r#"{"other":{}}"#] {
            store
                .borrow_mut()
                .set(PLACEMENTS_KEY, corrupt.to_string())
                .expect("seed should be stored");
            assert!(persistence.load_all().is_empty(), "{corrupt} should read as empty");
        }
    }

    struct MirrorRejectingStore {
        inner: MemoryStore,
    }

    impl KeyValueStore for MirrorRejectingStore {
        fn get(&self, key: &str) -> StorageResult<Option<String>> {
            self.inner.get(key)
        }

        fn set(&mut self, key: &str, value: String) -> StorageResult<()> {
            if key.starts_with(MIRROR_KEY_PREFIX) {
                return Err(StorageError::Rejected {
                    key: key.to_string(),
                    reason: "quota exceeded".to_string(),
                });
            }
            self.inner.set(key, value)
        }

        fn remove(&mut self, key: &str) -> StorageResult<()> {
            self.inner.remove(key)
        }
    }

    #[test]
    fn mirror_failure_does_not_fail_primary_save() {
        let store = Rc::new(RefCell::new(MirrorRejectingStore {
            inner: MemoryStore::new(),
        }));
        let persistence = PlacementPersistence::new(store.clone());
        persistence
            .save(&ElementId::new("hero"), record())
            .expect("primary write should succeed");
        assert_eq!(persistence.load(&ElementId::new("hero")), Some(record()));
        assert!(!store.borrow().inner.contains_key("bb-position-hero"));
    }

    #[test]
    fn read_failure_aborts_save_without_losing_other_placements() {
        use crate::storage::tests::ReadFailingStore;

        let store = Rc::new(RefCell::new(ReadFailingStore::default()));
        let persistence = PlacementPersistence::new(store.clone()).without_mirror();
        persistence
            .save(&ElementId::new("hero"), record())
            .expect("save should succeed");

        store.borrow_mut().fail_reads = true;
        let err = persistence
            .save(&ElementId::new("sidekick"), record())
            .expect_err("save must not proceed without the current map");
        assert!(matches!(err, StorageError::Unavailable { .. }));

        store.borrow_mut().fail_reads = false;
        assert_eq!(persistence.load(&ElementId::new("hero")), Some(record()));
        assert!(persistence.load(&ElementId::new("sidekick")).is_none());
    }

    #[test]
    fn restore_applies_saved_bounds_to_host_owned_elements() {
        let store = MemoryStore::shared();
        let persistence = PlacementPersistence::new(store).without_mirror();
        persistence
            .save(&ElementId::new("hero"), record())
            .expect("save should succeed");
        persistence
            .save(&ElementId::new("unregistered"), record())
            .expect("save should succeed");

        let mut registry = ElementRegistry::new();
        let element = StyledElement::new("hero", Bounds::new(0.0, 0.0, 60.0, 40.0)).into_handle();
        registry
            .register_with(element.clone(), Size::new(60.0, 40.0), Transform::IDENTITY, 0)
            .expect("element should register");

        assert_eq!(persistence.restore_into(&mut registry), 1);
        assert_eq!(
            element.borrow().rendered_box(),
            Ok(Bounds::new(10.0, 20.0, 120.0, 80.0))
        );
        let transform = registry
            .transform(&ElementId::new("hero"))
            .expect("registered");
        assert_eq!(transform.position(), crate::geometry::Point::new(10.0, 20.0));
        assert_eq!(transform.scale_x, 2.0);
    }
}
