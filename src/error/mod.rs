use crate::autopin::{AutoPinError, DetectError};
use crate::config::ConfigError;
use crate::editor::SessionError;
use crate::element::ElementError;
use crate::registry::RegistryError;
use crate::state::StateError;
use crate::storage::StorageError;
use crate::sync_group::SyncGroupError;
use thiserror::Error;

pub type PinResult<T> = std::result::Result<T, PinError>;

#[derive(Debug, Error)]
pub enum PinError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Element(#[from] ElementError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Detect(#[from] DetectError),
    #[error(transparent)]
    AutoPin(#[from] AutoPinError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    SyncGroup(#[from] SyncGroupError),
}
