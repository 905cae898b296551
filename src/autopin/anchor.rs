//! Pixel <-> normalized anchor conversion relative to a content rect.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geometry::Point;

use super::content_rect::ContentRect;

/// Fractional offset inside a content rect. Values outside `0..=1` are
/// legitimate and kept as-is.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Anchor {
    pub fx: f64,
    pub fy: f64,
}

impl Anchor {
    pub const fn new(fx: f64, fy: f64) -> Self {
        Self { fx, fy }
    }

    pub fn is_finite(self) -> bool {
        self.fx.is_finite() && self.fy.is_finite()
    }
}

/// `None` when the rect has no area or the point is not finite.
pub fn to_anchor(point: Point, rect: ContentRect) -> Option<Anchor> {
    if !rect.size().is_positive() || !rect.origin().is_finite() || !point.is_finite() {
        return None;
    }
    Some(Anchor::new(
        (point.x - rect.x) / rect.width,
        (point.y - rect.y) / rect.height,
    ))
}

pub fn from_anchor(anchor: Anchor, rect: ContentRect) -> Point {
    Point::new(
        rect.x + anchor.fx * rect.width,
        rect.y + anchor.fy * rect.height,
    )
}

/// Zone boundaries on both axes, as fractions of the content rect.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnchorGrid {
    pub low: f64,
    pub high: f64,
}

impl Default for AnchorGrid {
    fn default() -> Self {
        Self {
            low: 0.33,
            high: 0.67,
        }
    }
}

impl From<[f64; 2]> for AnchorGrid {
    fn from([low, high]: [f64; 2]) -> Self {
        if low.is_finite() && high.is_finite() && low <= high {
            Self { low, high }
        } else {
            Self::default()
        }
    }
}

/// One of nine named reference points of a content rect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnchorPoint {
    #[serde(rename = "TL")]
    TopLeft,
    #[serde(rename = "TC")]
    TopCenter,
    #[serde(rename = "TR")]
    TopRight,
    #[serde(rename = "ML")]
    MiddleLeft,
    #[serde(rename = "MC")]
    Center,
    #[serde(rename = "MR")]
    MiddleRight,
    #[serde(rename = "BL")]
    BottomLeft,
    #[serde(rename = "BC")]
    BottomCenter,
    #[serde(rename = "BR")]
    BottomRight,
}

impl AnchorPoint {
    pub const ALL: [AnchorPoint; 9] = [
        Self::TopLeft,
        Self::TopCenter,
        Self::TopRight,
        Self::MiddleLeft,
        Self::Center,
        Self::MiddleRight,
        Self::BottomLeft,
        Self::BottomCenter,
        Self::BottomRight,
    ];

    pub const fn code(self) -> &'static str {
        match self {
            Self::TopLeft => "TL",
            Self::TopCenter => "TC",
            Self::TopRight => "TR",
            Self::MiddleLeft => "ML",
            Self::Center => "MC",
            Self::MiddleRight => "MR",
            Self::BottomLeft => "BL",
            Self::BottomCenter => "BC",
            Self::BottomRight => "BR",
        }
    }

    pub fn anchor(self) -> Anchor {
        let (column, row) = self.cell();
        Anchor::new(f64::from(column) * 0.5, f64::from(row) * 0.5)
    }

    /// Classifies an anchor into the grid cell it falls in. Points outside
    /// the rect land in the nearest border cell.
    pub fn zone(anchor: Anchor, grid: AnchorGrid) -> AnchorPoint {
        let band = |value: f64| {
            if value < grid.low {
                0
            } else if value > grid.high {
                2
            } else {
                1
            }
        };
        Self::from_cell(band(anchor.fx), band(anchor.fy))
    }

    pub fn nearest(anchor: Anchor) -> AnchorPoint {
        let distance = |point: AnchorPoint| {
            let target = point.anchor();
            (target.fx - anchor.fx).powi(2) + (target.fy - anchor.fy).powi(2)
        };
        Self::ALL
            .into_iter()
            .min_by(|a, b| distance(*a).total_cmp(&distance(*b)))
            .unwrap_or(Self::Center)
    }

    const fn cell(self) -> (u8, u8) {
        match self {
            Self::TopLeft => (0, 0),
            Self::TopCenter => (1, 0),
            Self::TopRight => (2, 0),
            Self::MiddleLeft => (0, 1),
            Self::Center => (1, 1),
            Self::MiddleRight => (2, 1),
            Self::BottomLeft => (0, 2),
            Self::BottomCenter => (1, 2),
            Self::BottomRight => (2, 2),
        }
    }

    const fn from_cell(column: u8, row: u8) -> Self {
        match (column, row) {
            (0, 0) => Self::TopLeft,
            (1, 0) => Self::TopCenter,
            (2, 0) => Self::TopRight,
            (0, 1) => Self::MiddleLeft,
            (2, 1) => Self::MiddleRight,
            (0, 2) => Self::BottomLeft,
            (1, 2) => Self::BottomCenter,
            (2, 2) => Self::BottomRight,
            _ => Self::Center,
        }
    }
}

impl fmt::Display for AnchorPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
