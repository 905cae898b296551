//! Named element groupings. Only bookkeeping lives here; nothing schedules
//! or drives a group yet.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::element::ElementId;
use crate::registry::ElementRegistry;
use crate::storage::{read_json_value, write_json, SharedStore, StorageError};

pub const SYNC_GROUPS_KEY: &str = "sync-groups";
const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum SyncGroupError {
    #[error("sync group id is empty")]
    EmptyGroupId,
    #[error("sync group {0} has no registered members")]
    NoMembers(String),
    #[error("sync group {0} already exists")]
    Duplicate(String),
    #[error("sync group {0} does not exist")]
    UnknownGroup(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type SyncGroupResult<T> = std::result::Result<T, SyncGroupError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncGroup {
    pub characters: Vec<ElementId>,
    /// Milliseconds; 0 until the group is first touched.
    #[serde(default)]
    pub last_sync_time: u64,
}

impl SyncGroup {
    pub fn contains(&self, id: &ElementId) -> bool {
        self.characters.contains(id)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SyncGroupFile {
    version: u32,
    groups: BTreeMap<String, SyncGroup>,
}

#[derive(Debug, Clone, Default)]
pub struct SyncGroupRegistry {
    groups: BTreeMap<String, SyncGroup>,
}

impl SyncGroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Members that are not registered are dropped; at least one must
    /// remain.
    pub fn create(
        &mut self,
        group_id: &str,
        members: &[ElementId],
        elements: &ElementRegistry,
    ) -> SyncGroupResult<&SyncGroup> {
        if group_id.is_empty() {
            return Err(SyncGroupError::EmptyGroupId);
        }
        if self.groups.contains_key(group_id) {
            return Err(SyncGroupError::Duplicate(group_id.to_string()));
        }

        let mut characters: Vec<ElementId> = Vec::with_capacity(members.len());
        for member in members {
            if elements.contains(member) && !characters.contains(member) {
                characters.push(member.clone());
            }
        }
        if characters.is_empty() {
            return Err(SyncGroupError::NoMembers(group_id.to_string()));
        }

        tracing::info!(group = group_id, members = characters.len(), "sync group created");
        let group = self.groups.entry(group_id.to_string()).or_insert(SyncGroup {
            characters,
            last_sync_time: 0,
        });
        Ok(group)
    }

    pub fn remove(&mut self, group_id: &str) -> bool {
        let removed = self.groups.remove(group_id).is_some();
        if removed {
            tracing::info!(group = group_id, "sync group removed");
        }
        removed
    }

    pub fn get(&self, group_id: &str) -> Option<&SyncGroup> {
        self.groups.get(group_id)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    pub fn add_member(&mut self, group_id: &str, member: ElementId) -> SyncGroupResult<bool> {
        let group = self.group_mut(group_id)?;
        if group.contains(&member) {
            return Ok(false);
        }
        group.characters.push(member);
        Ok(true)
    }

    /// Removing the last member deletes the group.
    pub fn remove_member(&mut self, group_id: &str, member: &ElementId) -> SyncGroupResult<bool> {
        let group = self.group_mut(group_id)?;
        let before = group.characters.len();
        group.characters.retain(|id| id != member);
        let removed = group.characters.len() != before;
        if group.characters.is_empty() {
            self.remove(group_id);
        }
        Ok(removed)
    }

    pub fn groups_for(&self, member: &ElementId) -> Vec<&str> {
        self.groups
            .iter()
            .filter(|(_, group)| group.contains(member))
            .map(|(id, _)| id.as_str())
            .collect()
    }

    pub fn touch(&mut self, group_id: &str, now_ms: u64) -> SyncGroupResult<()> {
        self.group_mut(group_id)?.last_sync_time = now_ms;
        Ok(())
    }

    /// Drops an unregistered element from every group.
    pub fn forget(&mut self, member: &ElementId) {
        for group in self.groups.values_mut() {
            group.characters.retain(|id| id != member);
        }
        self.groups.retain(|_, group| !group.characters.is_empty());
    }

    pub fn save(&self, store: &SharedStore) -> SyncGroupResult<()> {
        write_json(
            store,
            SYNC_GROUPS_KEY,
            &SyncGroupFile {
                version: SCHEMA_VERSION,
                groups: self.groups.clone(),
            },
        )?;
        Ok(())
    }

    /// Unreadable or foreign-version data loads as an empty registry.
    pub fn load(store: &SharedStore) -> Self {
        let Some(value) = read_json_value(store, SYNC_GROUPS_KEY) else {
            return Self::new();
        };
        match serde_json::from_value::<SyncGroupFile>(value) {
            Ok(file) if file.version == SCHEMA_VERSION => Self { groups: file.groups },
            Ok(file) => {
                tracing::warn!(version = file.version, "unsupported sync group schema; ignoring it");
                Self::new()
            }
            Err(err) => {
                tracing::warn!(?err, "sync group record is malformed; ignoring it");
                Self::new()
            }
        }
    }

    fn group_mut(&mut self, group_id: &str) -> SyncGroupResult<&mut SyncGroup> {
        self.groups
            .get_mut(group_id)
            .ok_or_else(|| SyncGroupError::UnknownGroup(group_id.to_string()))
    }
}
