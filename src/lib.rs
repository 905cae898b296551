pub mod autopin;
pub mod config;
pub mod editor;
pub mod element;
pub mod error;
pub mod geometry;
pub mod logging;
pub mod registry;
pub mod state;
pub mod storage;
pub mod sync_group;
pub mod transform;

pub use autopin::{Anchor, AutoPinController, ContentRectDetector, PinState};
pub use config::{load_engine_config, ConfigError, EngineConfig};
pub use editor::{BoundingBox, BoundingBoxBuilder, EditSession, ExecuteOptions, ExecuteResult};
pub use element::{ElementHandle, ElementId, PlacementTarget, StyledElement};
pub use error::{PinError, PinResult};
pub use geometry::{Bounds, Delta, Point, Size};
pub use registry::{ElementRegistry, PositionOwner, SharedRegistry};
pub use storage::{KeyValueStore, MemoryStore, SharedStore};
pub use sync_group::{SyncGroup, SyncGroupRegistry};
pub use transform::{Transform, TransformStore};
