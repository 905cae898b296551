//! Pure drag/resize math. Every result is derived from the drag's start
//! snapshot, never from the previous frame.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::geometry::{Bounds, Delta};

pub const DEFAULT_MIN_SIZE: f64 = 20.0;

/// Compass direction of a resize handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Handle {
    N,
    S,
    E,
    W,
    NE,
    NW,
    SE,
    SW,
}

impl Handle {
    pub const ALL: [Handle; 8] = [
        Self::NW,
        Self::N,
        Self::NE,
        Self::E,
        Self::SE,
        Self::S,
        Self::SW,
        Self::W,
    ];

    pub const fn moves_north(self) -> bool {
        matches!(self, Self::N | Self::NE | Self::NW)
    }

    pub const fn moves_south(self) -> bool {
        matches!(self, Self::S | Self::SE | Self::SW)
    }

    pub const fn moves_east(self) -> bool {
        matches!(self, Self::E | Self::NE | Self::SE)
    }

    pub const fn moves_west(self) -> bool {
        matches!(self, Self::W | Self::NW | Self::SW)
    }

    pub const fn is_corner(self) -> bool {
        matches!(self, Self::NE | Self::NW | Self::SE | Self::SW)
    }

    pub const fn code(self) -> &'static str {
        match self {
            Self::N => "n",
            Self::S => "s",
            Self::E => "e",
            Self::W => "w",
            Self::NE => "ne",
            Self::NW => "nw",
            Self::SE => "se",
            Self::SW => "sw",
        }
    }

    pub const fn cursor(self) -> &'static str {
        match self {
            Self::N => "n-resize",
            Self::S => "s-resize",
            Self::E => "e-resize",
            Self::W => "w-resize",
            Self::NE => "ne-resize",
            Self::NW => "nw-resize",
            Self::SE => "se-resize",
            Self::SW => "sw-resize",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|handle| handle.code() == code)
    }

    const fn is_vertical_edge(self) -> bool {
        matches!(self, Self::N | Self::S)
    }

    const fn is_horizontal_edge(self) -> bool {
        matches!(self, Self::E | Self::W)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DragType {
    Move,
    Resize(Handle),
}

impl DragType {
    pub const fn cursor(self) -> &'static str {
        match self {
            Self::Move => "move",
            Self::Resize(handle) => handle.cursor(),
        }
    }
}

impl fmt::Display for DragType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Move => f.write_str("move"),
            Self::Resize(handle) => write!(f, "resize-{}", handle.code()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownDragType(pub String);

impl fmt::Display for UnknownDragType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown drag type: {}", self.0)
    }
}

impl std::error::Error for UnknownDragType {}

impl FromStr for DragType {
    type Err = UnknownDragType;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value == "move" {
            return Ok(Self::Move);
        }
        value
            .strip_prefix("resize-")
            .and_then(Handle::from_code)
            .map(Self::Resize)
            .ok_or_else(|| UnknownDragType(value.to_string()))
    }
}

/// Keyboard modifiers sampled with a pointer event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Modifiers {
    /// Aspect lock.
    pub shift: bool,
    /// Resize around the start center.
    pub alt: bool,
    pub ctrl: bool,
}

impl Modifiers {
    pub const NONE: Modifiers = Modifiers {
        shift: false,
        alt: false,
        ctrl: false,
    };

    pub const fn new(shift: bool, alt: bool, ctrl: bool) -> Self {
        Self { shift, alt, ctrl }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SizeConstraints {
    pub min_width: f64,
    pub min_height: f64,
}

impl Default for SizeConstraints {
    fn default() -> Self {
        Self {
            min_width: DEFAULT_MIN_SIZE,
            min_height: DEFAULT_MIN_SIZE,
        }
    }
}

impl SizeConstraints {
    /// Non-positive or non-finite minimums fall back to one pixel.
    pub fn new(min_width: f64, min_height: f64) -> Self {
        let sanitize = |value: f64| {
            if value.is_finite() && value > 0.0 {
                value
            } else {
                1.0
            }
        };
        Self {
            min_width: sanitize(min_width),
            min_height: sanitize(min_height),
        }
    }
}

/// Which side of an axis stays put while the other moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pin {
    Start,
    End,
    Center,
}

/// Computes the bounds produced by dragging `drag` by `delta` from `start`.
pub fn compute_bounds(
    drag: DragType,
    start: Bounds,
    delta: Delta,
    modifiers: Modifiers,
    constraints: SizeConstraints,
) -> Bounds {
    if !delta.dx.is_finite() || !delta.dy.is_finite() {
        return start;
    }
    match drag {
        DragType::Move => start.translated(delta),
        DragType::Resize(handle) => resize(handle, start, delta, modifiers, constraints),
    }
}

fn resize(
    handle: Handle,
    start: Bounds,
    delta: Delta,
    modifiers: Modifiers,
    constraints: SizeConstraints,
) -> Bounds {
    let factor = if modifiers.alt { 2.0 } else { 1.0 };
    let mut width = start.width;
    let mut height = start.height;

    if handle.moves_east() {
        width += delta.dx * factor;
    } else if handle.moves_west() {
        width -= delta.dx * factor;
    }
    if handle.moves_south() {
        height += delta.dy * factor;
    } else if handle.moves_north() {
        height -= delta.dy * factor;
    }

    let ratio = if modifiers.shift {
        start.size().aspect_ratio()
    } else {
        None
    };
    if let Some(ratio) = ratio {
        (width, height) = lock_aspect(handle, start, width, height, ratio);
    }
    (width, height) = clamp_to_minimum(width, height, ratio, constraints);

    let horizontal = if modifiers.alt || (ratio.is_some() && handle.is_vertical_edge()) {
        Pin::Center
    } else if handle.moves_west() {
        Pin::End
    } else {
        Pin::Start
    };
    let vertical = if modifiers.alt || (ratio.is_some() && handle.is_horizontal_edge()) {
        Pin::Center
    } else if handle.moves_north() {
        Pin::End
    } else {
        Pin::Start
    };

    Bounds::new(
        place(horizontal, start.x, start.width, width),
        place(vertical, start.y, start.height, height),
        width,
        height,
    )
}

fn lock_aspect(handle: Handle, start: Bounds, width: f64, height: f64, ratio: f64) -> (f64, f64) {
    if handle.is_vertical_edge() {
        (height * ratio, height)
    } else if handle.is_horizontal_edge() {
        (width, width / ratio)
    } else if (width - start.width).abs() > (height - start.height).abs() {
        (width, width / ratio)
    } else {
        (height * ratio, height)
    }
}

/// Applied after the drag math so that a shrink past the minimum still
/// tracks the pointer once it grows back.
fn clamp_to_minimum(
    width: f64,
    height: f64,
    ratio: Option<f64>,
    constraints: SizeConstraints,
) -> (f64, f64) {
    match ratio {
        Some(ratio) if width < constraints.min_width || height < constraints.min_height => {
            let width = constraints
                .min_width
                .max(constraints.min_height * ratio);
            (width, width / ratio)
        }
        Some(_) => (width, height),
        None => (
            width.max(constraints.min_width),
            height.max(constraints.min_height),
        ),
    }
}

fn place(pin: Pin, start_origin: f64, start_extent: f64, extent: f64) -> f64 {
    match pin {
        Pin::Start => start_origin,
        Pin::End => start_origin + start_extent - extent,
        Pin::Center => start_origin + start_extent / 2.0 - extent / 2.0,
    }
}
