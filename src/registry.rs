//! Explicit element registry shared by the editing and pinning engines.
//!
//! Each registered element has exactly one authoritative position writer at a
//! time. Edit sessions pre-empt AutoPin and hand ownership back on exit.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde::Serialize;
use thiserror::Error;

use crate::element::{ElementError, ElementHandle, ElementId};
use crate::geometry::{Bounds, Point, Size};
use crate::transform::{Transform, TransformStore};

pub type SharedRegistry = Rc<RefCell<ElementRegistry>>;

pub type RegistryResult<T> = std::result::Result<T, RegistryError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    #[error("element {0} is not registered")]
    UnknownElement(ElementId),
    #[error("element {0} is already registered")]
    AlreadyRegistered(ElementId),
    #[error("element {element} position is owned by {owner:?}, write from {writer:?} refused")]
    NotOwner {
        element: ElementId,
        owner: PositionOwner,
        writer: PositionOwner,
    },
    #[error(transparent)]
    Element(#[from] ElementError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PositionOwner {
    /// Host layout or any external positioning mechanism.
    Host,
    EditSession,
    AutoPin,
}

struct RegisteredElement {
    handle: ElementHandle,
    base_size: Size,
    z_index: i32,
    owner: PositionOwner,
    resume_owner: PositionOwner,
}

#[derive(Default)]
pub struct ElementRegistry {
    elements: HashMap<ElementId, RegisteredElement>,
    transforms: TransformStore,
    committed: Vec<ElementId>,
}

impl ElementRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedRegistry {
        Rc::new(RefCell::new(Self::new()))
    }

    /// Registers an element using its rendered box as base size and position.
    pub fn register(&mut self, handle: ElementHandle) -> RegistryResult<ElementId> {
        let (id, rendered) = {
            let element = handle.borrow();
            (element.id().clone(), element.rendered_box()?)
        };
        self.register_with(handle, rendered.size(), Transform::at(rendered.x, rendered.y), 0)
            .map(|()| id)
    }

    pub fn register_with(
        &mut self,
        handle: ElementHandle,
        base_size: Size,
        transform: Transform,
        z_index: i32,
    ) -> RegistryResult<()> {
        let id = handle.borrow().id().clone();
        if self.elements.contains_key(&id) {
            return Err(RegistryError::AlreadyRegistered(id));
        }
        tracing::debug!(element = %id, ?base_size, ?transform, "register element");
        self.transforms.set(id.clone(), transform);
        self.elements.insert(
            id,
            RegisteredElement {
                handle,
                base_size,
                z_index,
                owner: PositionOwner::Host,
                resume_owner: PositionOwner::Host,
            },
        );
        Ok(())
    }

    pub fn unregister(&mut self, id: &ElementId) -> Option<ElementHandle> {
        let entry = self.elements.remove(id)?;
        self.transforms.remove(id);
        self.committed.retain(|committed| committed != id);
        tracing::debug!(element = %id, "unregister element");
        Some(entry.handle)
    }

    pub fn contains(&self, id: &ElementId) -> bool {
        self.elements.contains_key(id)
    }

    pub fn ids(&self) -> Vec<ElementId> {
        self.elements.keys().cloned().collect()
    }

    pub fn element(&self, id: &ElementId) -> RegistryResult<ElementHandle> {
        self.entry(id).map(|entry| entry.handle.clone())
    }

    pub fn rendered_box(&self, id: &ElementId) -> RegistryResult<Bounds> {
        let handle = self.element(id)?;
        let rendered = handle.borrow().rendered_box()?;
        Ok(rendered)
    }

    pub fn base_size(&self, id: &ElementId) -> RegistryResult<Size> {
        self.entry(id).map(|entry| entry.base_size)
    }

    pub fn z_index(&self, id: &ElementId) -> RegistryResult<i32> {
        self.entry(id).map(|entry| entry.z_index)
    }

    pub fn set_z_index(&mut self, id: &ElementId, z_index: i32) -> RegistryResult<()> {
        self.entry_mut(id)?.z_index = z_index;
        Ok(())
    }

    pub fn transform(&self, id: &ElementId) -> RegistryResult<Transform> {
        self.transforms
            .get(id)
            .ok_or_else(|| RegistryError::UnknownElement(id.clone()))
    }

    /// Replaces the rest-state transform of a registered element.
    pub fn set_transform(&mut self, id: &ElementId, transform: Transform) -> RegistryResult<()> {
        self.entry(id)?;
        self.transforms.set(id.clone(), transform);
        Ok(())
    }

    pub fn transforms(&self) -> &TransformStore {
        &self.transforms
    }

    pub fn owner(&self, id: &ElementId) -> RegistryResult<PositionOwner> {
        self.entry(id).map(|entry| entry.owner)
    }

    /// Hands position ownership to an edit session. Idempotent.
    pub fn begin_edit(&mut self, id: &ElementId) -> RegistryResult<()> {
        let entry = self.entry_mut(id)?;
        if entry.owner == PositionOwner::EditSession {
            return Ok(());
        }
        entry.resume_owner = entry.owner;
        entry.owner = PositionOwner::EditSession;
        tracing::debug!(element = %id, resume = ?entry.resume_owner, "edit session owns position");
        Ok(())
    }

    /// Returns ownership to whoever held it before the session. A committed
    /// transform on an auto-pinned element is queued for anchor re-derivation.
    pub fn end_edit(&mut self, id: &ElementId, committed: Option<Transform>) -> RegistryResult<()> {
        let entry = self.entry_mut(id)?;
        if entry.owner != PositionOwner::EditSession {
            return Ok(());
        }
        entry.owner = entry.resume_owner;
        entry.resume_owner = PositionOwner::Host;
        let resumed = entry.owner;

        if let Some(transform) = committed {
            self.transforms.set(id.clone(), transform);
            if resumed == PositionOwner::AutoPin && !self.committed.contains(id) {
                self.committed.push(id.clone());
            }
        }
        tracing::debug!(element = %id, owner = ?resumed, "edit session released position");
        Ok(())
    }

    /// Makes AutoPin the sole writer, disengaging host positioning.
    pub fn claim_for_autopin(&mut self, id: &ElementId) -> RegistryResult<()> {
        let entry = self.entry_mut(id)?;
        match entry.owner {
            PositionOwner::AutoPin => Ok(()),
            PositionOwner::EditSession => Err(RegistryError::NotOwner {
                element: id.clone(),
                owner: PositionOwner::EditSession,
                writer: PositionOwner::AutoPin,
            }),
            PositionOwner::Host => {
                tracing::info!(element = %id, "host positioning disengaged for autopin");
                entry.owner = PositionOwner::AutoPin;
                Ok(())
            }
        }
    }

    pub fn release_from_autopin(&mut self, id: &ElementId) -> RegistryResult<()> {
        let entry = self.entry_mut(id)?;
        if entry.owner == PositionOwner::AutoPin {
            entry.owner = PositionOwner::Host;
        }
        if entry.resume_owner == PositionOwner::AutoPin {
            entry.resume_owner = PositionOwner::Host;
        }
        Ok(())
    }

    pub fn apply_bounds(
        &mut self,
        id: &ElementId,
        writer: PositionOwner,
        bounds: Bounds,
    ) -> RegistryResult<()> {
        let handle = self.writable(id, writer)?;
        handle.borrow_mut().apply_bounds(bounds)?;
        Ok(())
    }

    /// Writes a pixel position to the element and mirrors it into the
    /// transform store.
    pub fn apply_position(
        &mut self,
        id: &ElementId,
        writer: PositionOwner,
        position: Point,
    ) -> RegistryResult<()> {
        let handle = self.writable(id, writer)?;
        handle.borrow_mut().apply_position(position)?;
        self.transforms.set_position(id, position);
        Ok(())
    }

    pub fn take_committed(&mut self) -> Vec<ElementId> {
        std::mem::take(&mut self.committed)
    }

    fn writable(&self, id: &ElementId, writer: PositionOwner) -> RegistryResult<ElementHandle> {
        let entry = self.entry(id)?;
        if entry.owner != writer {
            return Err(RegistryError::NotOwner {
                element: id.clone(),
                owner: entry.owner,
                writer,
            });
        }
        Ok(entry.handle.clone())
    }

    fn entry(&self, id: &ElementId) -> RegistryResult<&RegisteredElement> {
        self.elements
            .get(id)
            .ok_or_else(|| RegistryError::UnknownElement(id.clone()))
    }

    fn entry_mut(&mut self, id: &ElementId) -> RegistryResult<&mut RegisteredElement> {
        self.elements
            .get_mut(id)
            .ok_or_else(|| RegistryError::UnknownElement(id.clone()))
    }
}
