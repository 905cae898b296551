//! Bounding-box edit engine: drag math, session lifecycle, handle overlay
//! and input routing behind the [`BoundingBox`] facade.

pub mod bounds;
pub mod facade;
pub mod handles;
pub mod input;
pub mod session;

pub use bounds::{compute_bounds, DragType, Handle, Modifiers, SizeConstraints};
pub use facade::{BoundingBox, BoundingBoxBuilder, BoundingBoxState, ExecuteOptions, ExecuteResult};
pub use handles::{FrameView, HandleGeometry, HandleLayout, HandleOverlay, ModePoller, OverlayRenderer};
pub use input::{
    normalize_touch, InputRouter, Key, KeyInput, PointerEvent, PointerPhase, RouterAction,
    TouchEvent, TouchPhase, TouchPoint,
};
pub use session::{DragState, EditSession, SessionError, SessionResult};
