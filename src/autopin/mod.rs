//! Responsive anchoring of elements to the visible content of a background.

pub mod anchor;
pub mod content_rect;
pub mod controller;
pub mod signal;

pub use anchor::{from_anchor, to_anchor, Anchor, AnchorGrid, AnchorPoint};
pub use content_rect::{
    BackgroundSurface, ContentRect, ContentRectDetector, DetectError, DetectResult, FitMode,
    ImageFileSurface, MeasuredSurface, ObjectPosition, PositionComponent,
};
pub use controller::{AutoPinController, AutoPinError, AutoPinResult, PinState, PumpReport};
pub use signal::{ResizeSignal, ViewportWatcher};
