//! Element identity and the positioned-element contract.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::{Bounds, Point};

/// Identity handed to the engines by the host. The core never invents one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(String);

impl ElementId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ElementId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ElementId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

pub type ElementResult<T> = std::result::Result<T, ElementError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ElementError {
    #[error("element {0} is detached from the host document")]
    Detached(ElementId),
    #[error("element {element} reported an invalid rendered box: {bounds:?}")]
    InvalidRenderedBox { element: ElementId, bounds: Bounds },
}

/// A positioned element in the host coordinate space.
pub trait PlacementTarget {
    fn id(&self) -> &ElementId;

    /// Box as currently rendered, not a cached model value.
    fn rendered_box(&self) -> ElementResult<Bounds>;

    /// Writes `left/top/width/height`.
    fn apply_bounds(&mut self, bounds: Bounds) -> ElementResult<()>;

    /// Writes `left/top` only.
    fn apply_position(&mut self, position: Point) -> ElementResult<()>;
}

pub type ElementHandle = Rc<RefCell<dyn PlacementTarget>>;

/// In-memory element that keeps its style values as the rendered box.
#[derive(Debug, Clone, PartialEq)]
pub struct StyledElement {
    id: ElementId,
    style: Bounds,
    attached: bool,
    writes: usize,
}

impl StyledElement {
    pub fn new(id: impl Into<ElementId>, style: Bounds) -> Self {
        Self {
            id: id.into(),
            style,
            attached: true,
            writes: 0,
        }
    }

    pub fn into_handle(self) -> ElementHandle {
        Rc::new(RefCell::new(self))
    }

    pub fn style(&self) -> Bounds {
        self.style
    }

    /// Number of positional writes received so far.
    pub fn write_count(&self) -> usize {
        self.writes
    }

    pub fn detach(&mut self) {
        self.attached = false;
    }

    pub fn attach(&mut self) {
        self.attached = true;
    }

    fn ensure_attached(&self) -> ElementResult<()> {
        if self.attached {
            Ok(())
        } else {
            Err(ElementError::Detached(self.id.clone()))
        }
    }
}

impl PlacementTarget for StyledElement {
    fn id(&self) -> &ElementId {
        &self.id
    }

    fn rendered_box(&self) -> ElementResult<Bounds> {
        self.ensure_attached()?;
        if !self.style.is_finite() {
            return Err(ElementError::InvalidRenderedBox {
                element: self.id.clone(),
                bounds: self.style,
            });
        }
        Ok(self.style)
    }

    fn apply_bounds(&mut self, bounds: Bounds) -> ElementResult<()> {
        self.ensure_attached()?;
        self.style = bounds;
        self.writes += 1;
        Ok(())
    }

    fn apply_position(&mut self, position: Point) -> ElementResult<()> {
        self.ensure_attached()?;
        self.style.x = position.x;
        self.style.y = position.y;
        self.writes += 1;
        Ok(())
    }
}
