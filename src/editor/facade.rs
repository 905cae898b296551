//! Single entry point for hosts that want a ready-wired bounding box.

use std::time::Instant;

use serde::Serialize;

use crate::config::{ConfigError, ConfigResult, EngineConfig};
use crate::element::ElementId;
use crate::geometry::Bounds;
use crate::registry::SharedRegistry;
use crate::state::SessionMode;
use crate::storage::{PlacementPersistence, PlacementRecord};
use crate::transform::Transform;

use super::handles::{HandleOverlay, ModePoller, OverlayRenderer};
use super::input::{InputRouter, KeyInput, PointerEvent, RouterAction, TouchEvent};
use super::session::{EditSession, SessionError, SessionResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecuteOptions {
    /// Whether the handle overlay is drawn right away.
    pub visible: bool,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self { visible: true }
    }
}

/// Outcome of [`BoundingBox::execute`]. Runtime failures are reported here
/// instead of being returned as `Err`.
#[derive(Debug)]
pub enum ExecuteResult {
    Opened {
        element_id: ElementId,
        bounds: Bounds,
    },
    Failed {
        error: SessionError,
    },
}

impl ExecuteResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Opened { .. })
    }
}

/// Serializable snapshot for host diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingBoxState {
    pub element_id: ElementId,
    pub mode: SessionMode,
    pub bounds: Option<Bounds>,
    pub drag_type: Option<String>,
    pub overlay_visible: bool,
    pub transform: Option<Transform>,
}

#[derive(Default)]
pub struct BoundingBoxBuilder {
    registry: Option<SharedRegistry>,
    element: Option<ElementId>,
    renderer: Option<Box<dyn OverlayRenderer>>,
    placements: Option<PlacementPersistence>,
    config: EngineConfig,
}

impl BoundingBoxBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(mut self, registry: SharedRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn element(mut self, element: impl Into<ElementId>) -> Self {
        self.element = Some(element.into());
        self
    }

    pub fn renderer(mut self, renderer: Box<dyn OverlayRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Committed placements are also written here when set.
    pub fn placements(mut self, placements: PlacementPersistence) -> Self {
        self.placements = Some(placements);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> ConfigResult<BoundingBox> {
        let registry = self
            .registry
            .ok_or(ConfigError::MissingComponent("registry"))?;
        let element = self.element.ok_or(ConfigError::MissingComponent("element"))?;
        let renderer = self
            .renderer
            .ok_or(ConfigError::MissingComponent("overlay renderer"))?;
        if !registry.borrow().contains(&element) {
            return Err(ConfigError::UnknownElement(element));
        }

        let layout = self.config.handle_layout();
        let session = EditSession::new(registry.clone(), element, self.config.size_constraints());
        Ok(BoundingBox {
            registry,
            session,
            overlay: HandleOverlay::new(renderer, layout),
            router: InputRouter::new(layout),
            poller: ModePoller::new(self.config.mode_poll_interval()),
            placements: self.placements,
        })
    }
}

/// Session, overlay, and input router wired for one element.
///
/// Dropping an open box abandons the session and restores the entry
/// bounds; nothing is persisted. Call [`BoundingBox::cleanup`] to commit.
pub struct BoundingBox {
    registry: SharedRegistry,
    session: EditSession,
    overlay: HandleOverlay,
    router: InputRouter,
    poller: ModePoller,
    placements: Option<PlacementPersistence>,
}

impl BoundingBox {
    pub fn builder() -> BoundingBoxBuilder {
        BoundingBoxBuilder::new()
    }

    pub fn element_id(&self) -> &ElementId {
        self.session.element_id()
    }

    pub fn session(&self) -> &EditSession {
        &self.session
    }

    pub fn overlay(&self) -> &HandleOverlay {
        &self.overlay
    }

    pub fn on_mode_change(&mut self, listener: impl FnMut(SessionMode) + 'static) {
        self.session.on_mode_change(listener);
    }

    /// Opens the session, mounts the overlay, and attaches input.
    pub fn execute(&mut self, options: ExecuteOptions) -> ExecuteResult {
        match self.session.enter_editing() {
            Ok(bounds) => {
                self.overlay.mount(options.visible);
                self.sync_overlay();
                self.router.attach();
                ExecuteResult::Opened {
                    element_id: self.element_id().clone(),
                    bounds,
                }
            }
            Err(error) => {
                tracing::warn!(element = %self.element_id(), ?error, "bounding box failed to open");
                ExecuteResult::Failed { error }
            }
        }
    }

    pub fn show(&mut self) {
        self.overlay.show();
    }

    pub fn hide(&mut self) {
        self.overlay.hide();
    }

    /// Commits the session and persists the placement when a persistence
    /// layer is configured. Storage failures surface after the commit.
    pub fn commit(&mut self) -> SessionResult<Option<Transform>> {
        let bounds = self.session.bounds();
        let committed = self.session.exit_editing();
        self.sync_overlay();
        let Some(transform) = committed? else {
            return Ok(None);
        };

        if let (Some(placements), Some(bounds)) = (self.placements.as_ref(), bounds) {
            let z_index = self.registry.borrow().z_index(self.element_id())?;
            placements.save(
                self.element_id(),
                PlacementRecord::from_bounds(bounds, transform.scale_x, z_index),
            )?;
        }
        Ok(Some(transform))
    }

    pub fn cancel(&mut self) -> SessionResult<()> {
        let result = self.session.abandon_editing();
        self.sync_overlay();
        result
    }

    /// Tears everything down. An open session is committed first.
    pub fn cleanup(&mut self) {
        self.session.cancel_drag();
        if let Err(err) = self.commit() {
            tracing::warn!(element = %self.element_id(), ?err, "commit during cleanup failed");
        }
        self.router.detach();
        self.overlay.remove();
        tracing::debug!(element = %self.element_id(), "bounding box cleaned up");
    }

    pub fn handle_pointer(&mut self, event: PointerEvent) -> RouterAction {
        let action = self.router.handle_pointer(&mut self.session, event);
        self.after(action)
    }

    pub fn handle_touch(&mut self, event: &TouchEvent) -> RouterAction {
        let action = self.router.handle_touch(&mut self.session, event);
        self.after(action)
    }

    pub fn handle_key(&mut self, input: KeyInput) -> RouterAction {
        let action = self.router.handle_key(&mut self.session, input);
        match action {
            RouterAction::CommitRequested => {
                if let Err(err) = self.commit() {
                    tracing::warn!(element = %self.element_id(), ?err, "keyboard commit failed");
                }
            }
            RouterAction::CancelRequested => {
                if let Err(err) = self.cancel() {
                    tracing::warn!(element = %self.element_id(), ?err, "keyboard cancel failed");
                }
            }
            _ => self.sync_overlay(),
        }
        action
    }

    pub fn handle_focus_lost(&mut self) -> RouterAction {
        let action = self.router.handle_focus_lost(&mut self.session);
        self.after(action)
    }

    /// Fallback visibility toggle for hosts that cannot observe mode
    /// changes. Never touches bounds.
    pub fn poll_overlay_visibility(&mut self, now: Instant) {
        let session = &self.session;
        match self.poller.poll(now, || session.mode()) {
            Some(mode) if mode.is_editing() => self.overlay.show(),
            Some(_) => self.overlay.hide(),
            None => {}
        }
    }

    pub fn get_state(&self) -> BoundingBoxState {
        BoundingBoxState {
            element_id: self.element_id().clone(),
            mode: self.session.mode(),
            bounds: self.session.bounds(),
            drag_type: self.session.drag().map(|drag| drag.drag_type.to_string()),
            overlay_visible: self.overlay.is_visible(),
            transform: self.registry.borrow().transform(self.element_id()).ok(),
        }
    }

    fn after(&mut self, action: RouterAction) -> RouterAction {
        if !matches!(action, RouterAction::Ignored) {
            self.sync_overlay();
        }
        action
    }

    fn sync_overlay(&mut self) {
        self.overlay.sync(self.session.bounds(), self.session.mode());
    }
}

impl Drop for BoundingBox {
    fn drop(&mut self) {
        if !self.overlay.is_mounted() && !self.session.is_editing() {
            return;
        }
        if let Err(err) = self.session.abandon_editing() {
            tracing::warn!(element = %self.element_id(), ?err, "abandon on drop failed");
        }
        self.router.detach();
        self.overlay.remove();
    }
}
