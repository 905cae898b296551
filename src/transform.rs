//! Rest-state placement of elements.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::element::ElementId;
use crate::geometry::{Bounds, Point, Size};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transform {
    pub x: f64,
    pub y: f64,
    pub scale_x: f64,
    pub scale_y: f64,
    pub rotation: f64,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        x: 0.0,
        y: 0.0,
        scale_x: 1.0,
        scale_y: 1.0,
        rotation: 0.0,
    };

    pub const fn at(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            scale_x: 1.0,
            scale_y: 1.0,
            rotation: 0.0,
        }
    }

    pub const fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// Derives a transform from committed bounds. Scale is relative to
    /// `base_size`; a degenerate base keeps the previous scale.
    pub fn from_bounds(bounds: Bounds, base_size: Size, previous: Transform) -> Self {
        let (scale_x, scale_y) = if base_size.is_positive() {
            (bounds.width / base_size.width, bounds.height / base_size.height)
        } else {
            (previous.scale_x, previous.scale_y)
        };
        Self {
            x: bounds.x,
            y: bounds.y,
            scale_x,
            scale_y,
            rotation: previous.rotation,
        }
    }

    pub fn to_bounds(&self, base_size: Size) -> Bounds {
        Bounds::new(
            self.x,
            self.y,
            base_size.width * self.scale_x,
            base_size.height * self.scale_y,
        )
    }
}

/// Canonical rest-state placement, keyed by element identity.
#[derive(Debug, Clone, Default)]
pub struct TransformStore {
    transforms: HashMap<ElementId, Transform>,
}

impl TransformStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &ElementId) -> Option<Transform> {
        self.transforms.get(id).copied()
    }

    pub fn set(&mut self, id: ElementId, transform: Transform) {
        self.transforms.insert(id, transform);
    }

    pub fn set_position(&mut self, id: &ElementId, position: Point) -> bool {
        match self.transforms.get_mut(id) {
            Some(transform) => {
                transform.x = position.x;
                transform.y = position.y;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: &ElementId) -> Option<Transform> {
        self.transforms.remove(id)
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }
}
