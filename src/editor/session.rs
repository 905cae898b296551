use thiserror::Error;

use crate::element::ElementId;
use crate::geometry::{Bounds, Point};
use crate::registry::{PositionOwner, RegistryError, SharedRegistry};
use crate::state::{SessionEvent, SessionMachine, SessionMode, StateError};
use crate::storage::StorageError;
use crate::transform::Transform;

use super::bounds::{compute_bounds, DragType, Modifiers, SizeConstraints};

pub type SessionResult<T> = std::result::Result<T, SessionError>;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error("element {0} reported a non-finite rendered box")]
    InvalidBounds(ElementId),
    #[error("session for {0} cannot close while a drag is in progress")]
    DragInProgress(ElementId),
    #[error("failed to persist placement: {0}")]
    Storage(#[from] StorageError),
}

/// Snapshot taken on pointer-down. All drag math is relative to it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragState {
    pub drag_type: DragType,
    pub start_mouse: Point,
    pub start_bounds: Bounds,
    pub modifiers: Modifiers,
}

type ModeListener = Box<dyn FnMut(SessionMode)>;

/// Edit session for one registered element.
///
/// While idle the element's [`Transform`] is authoritative; while editing the
/// session [`Bounds`] are.
pub struct EditSession {
    registry: SharedRegistry,
    element: ElementId,
    machine: SessionMachine,
    constraints: SizeConstraints,
    bounds: Option<Bounds>,
    entry_bounds: Option<Bounds>,
    drag: Option<DragState>,
    listeners: Vec<ModeListener>,
}

impl EditSession {
    pub fn new(registry: SharedRegistry, element: ElementId, constraints: SizeConstraints) -> Self {
        Self {
            registry,
            element,
            machine: SessionMachine::new(),
            constraints,
            bounds: None,
            entry_bounds: None,
            drag: None,
            listeners: Vec::new(),
        }
    }

    pub fn element_id(&self) -> &ElementId {
        &self.element
    }

    pub fn mode(&self) -> SessionMode {
        self.machine.state()
    }

    pub fn is_editing(&self) -> bool {
        self.mode().is_editing()
    }

    pub fn bounds(&self) -> Option<Bounds> {
        self.bounds
    }

    pub fn drag(&self) -> Option<&DragState> {
        self.drag.as_ref()
    }

    pub fn constraints(&self) -> SizeConstraints {
        self.constraints
    }

    pub fn machine(&self) -> &SessionMachine {
        &self.machine
    }

    /// Registers a callback fired after every mode change.
    pub fn on_mode_change(&mut self, listener: impl FnMut(SessionMode) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Opens the session seeded from the element's rendered box. Calling it
    /// again while open returns the live bounds unchanged.
    pub fn enter_editing(&mut self) -> SessionResult<Bounds> {
        if let Some(bounds) = self.bounds.filter(|_| self.is_editing()) {
            tracing::debug!(element = %self.element, "enter_editing ignored; session already open");
            return Ok(bounds);
        }

        let seed = {
            let mut registry = self.registry.borrow_mut();
            let seed = registry.rendered_box(&self.element)?;
            if !seed.is_finite() {
                return Err(SessionError::InvalidBounds(self.element.clone()));
            }
            registry.begin_edit(&self.element)?;
            seed
        };

        self.transition(SessionEvent::EnterEditing)?;
        self.bounds = Some(seed);
        self.entry_bounds = Some(seed);
        tracing::info!(element = %self.element, bounds = ?seed, "edit session opened");
        self.notify();
        Ok(seed)
    }

    /// Commits the session bounds into the transform store and the element's
    /// style. The session is closed even when the style write fails; that
    /// failure is returned after the transform has been committed.
    pub fn exit_editing(&mut self) -> SessionResult<Option<Transform>> {
        match self.mode() {
            SessionMode::Idle => return Ok(None),
            SessionMode::Dragging => return Err(SessionError::DragInProgress(self.element.clone())),
            SessionMode::Editing => {}
        }
        let Some(bounds) = self.bounds else {
            return Ok(None);
        };

        let (transform, write_result) = {
            let mut registry = self.registry.borrow_mut();
            let base_size = registry.base_size(&self.element)?;
            let previous = registry.transform(&self.element)?;
            let transform = Transform::from_bounds(bounds, base_size, previous);
            let write_result =
                registry.apply_bounds(&self.element, PositionOwner::EditSession, bounds);
            registry.end_edit(&self.element, Some(transform))?;
            (transform, write_result)
        };

        self.close(SessionEvent::ExitEditing)?;
        tracing::info!(element = %self.element, ?transform, "edit session committed");
        write_result?;
        Ok(Some(transform))
    }

    /// Closes the session without committing, restoring the entry bounds on
    /// the element. An in-progress drag is cancelled first.
    pub fn abandon_editing(&mut self) -> SessionResult<()> {
        if !self.is_editing() {
            return Ok(());
        }
        if self.drag.is_some() {
            self.cancel_drag();
        }

        {
            let mut registry = self.registry.borrow_mut();
            if let Some(entry) = self.entry_bounds {
                if let Err(err) =
                    registry.apply_bounds(&self.element, PositionOwner::EditSession, entry)
                {
                    tracing::warn!(element = %self.element, ?err, "failed to restore entry bounds");
                }
            }
            registry.end_edit(&self.element, None)?;
        }

        self.close(SessionEvent::AbandonEditing)?;
        tracing::info!(element = %self.element, "edit session abandoned");
        Ok(())
    }

    /// Returns `false` when there is no open session or a drag is already
    /// active.
    pub fn start_drag(&mut self, pointer: Point, drag_type: DragType, modifiers: Modifiers) -> bool {
        if self.mode() != SessionMode::Editing || !pointer.is_finite() {
            tracing::debug!(element = %self.element, mode = ?self.mode(), "start_drag ignored");
            return false;
        }
        let Some(start_bounds) = self.bounds else {
            return false;
        };
        if self.transition(SessionEvent::StartDrag).is_err() {
            return false;
        }

        self.drag = Some(DragState {
            drag_type,
            start_mouse: pointer,
            start_bounds,
            modifiers,
        });
        tracing::debug!(element = %self.element, %drag_type, ?pointer, "drag started");
        self.notify();
        true
    }

    /// Recomputes the live bounds from the drag snapshot. Modifiers are
    /// re-sampled on every move.
    pub fn update_drag(&mut self, pointer: Point, modifiers: Modifiers) -> SessionResult<Option<Bounds>> {
        let Some(drag) = self.drag.as_mut() else {
            tracing::trace!(element = %self.element, "update_drag ignored; no active drag");
            return Ok(None);
        };
        if !pointer.is_finite() {
            return Ok(None);
        }
        drag.modifiers = modifiers;

        let next = compute_bounds(
            drag.drag_type,
            drag.start_bounds,
            pointer.delta_from(drag.start_mouse),
            modifiers,
            self.constraints,
        );
        self.registry
            .borrow_mut()
            .apply_bounds(&self.element, PositionOwner::EditSession, next)?;
        self.bounds = Some(next);
        Ok(Some(next))
    }

    pub fn end_drag(&mut self) -> Option<Bounds> {
        let drag = self.drag.take()?;
        if let Err(err) = self.transition(SessionEvent::EndDrag) {
            tracing::warn!(element = %self.element, ?err, "end_drag transition refused");
        }
        tracing::debug!(
            element = %self.element,
            drag_type = %drag.drag_type,
            bounds = ?self.bounds,
            "drag ended"
        );
        self.notify();
        self.bounds
    }

    /// Restores the pre-drag snapshot. Returns `false` when no drag is active.
    pub fn cancel_drag(&mut self) -> bool {
        let Some(drag) = self.drag.take() else {
            return false;
        };
        self.bounds = Some(drag.start_bounds);
        if let Err(err) = self.registry.borrow_mut().apply_bounds(
            &self.element,
            PositionOwner::EditSession,
            drag.start_bounds,
        ) {
            tracing::warn!(element = %self.element, ?err, "failed to restore pre-drag bounds");
        }
        if let Err(err) = self.transition(SessionEvent::CancelDrag) {
            tracing::warn!(element = %self.element, ?err, "cancel_drag transition refused");
        }
        tracing::debug!(element = %self.element, "drag cancelled");
        self.notify();
        true
    }

    fn close(&mut self, event: SessionEvent) -> SessionResult<()> {
        self.transition(event)?;
        self.bounds = None;
        self.entry_bounds = None;
        self.drag = None;
        self.notify();
        Ok(())
    }

    fn transition(&mut self, event: SessionEvent) -> SessionResult<SessionMode> {
        Ok(self.machine.transition(event)?)
    }

    fn notify(&mut self) {
        let mode = self.mode();
        for listener in &mut self.listeners {
            listener(mode);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::editor::bounds::Handle;
    use crate::element::{ElementHandle, StyledElement};
    use crate::geometry::Size;
    use crate::registry::ElementRegistry;

    struct Fixture {
        registry: SharedRegistry,
        element: ElementHandle,
        session: EditSession,
    }

    fn fixture() -> Fixture {
        let registry = ElementRegistry::shared();
        let element = StyledElement::new("hero", Bounds::new(10.0, 10.0, 100.0, 50.0)).into_handle();
        registry
            .borrow_mut()
            .register(element.clone())
            .expect("element should register");
        let session = EditSession::new(
            registry.clone(),
            ElementId::new("hero"),
            SizeConstraints::default(),
        );
        Fixture {
            registry,
            element,
            session,
        }
    }

    fn rendered(fixture: &Fixture) -> Bounds {
        fixture
            .element
            .borrow()
            .rendered_box()
            .expect("element should stay attached")
    }

    #[test]
    fn enter_editing_is_idempotent() {
        let mut fixture = fixture();
        let first = fixture.session.enter_editing().expect("session should open");
        let second = fixture.session.enter_editing().expect("second call is a no-op");

        assert_eq!(first, second);
        assert_eq!(fixture.session.mode(), SessionMode::Editing);
        assert_eq!(fixture.session.machine().history().len(), 1);
    }

    #[test]
    fn enter_editing_seeds_from_rendered_box_not_transform() {
        let mut fixture = fixture();
        fixture
            .registry
            .borrow_mut()
            .set_transform(&ElementId::new("hero"), Transform::at(999.0, 999.0))
            .expect("element is registered");

        let seed = fixture.session.enter_editing().expect("session should open");
        assert_eq!(seed, Bounds::new(10.0, 10.0, 100.0, 50.0));
    }

    #[test]
    fn exit_editing_commits_transform_and_style_once() {
        let mut fixture = fixture();
        fixture.session.enter_editing().expect("session should open");
        assert!(fixture
            .session
            .start_drag(Point::new(110.0, 35.0), DragType::Resize(Handle::E), Modifiers::NONE));
        fixture
            .session
            .update_drag(Point::new(210.0, 35.0), Modifiers::NONE)
            .expect("element accepts writes");
        fixture.session.end_drag();

        let transform = fixture
            .session
            .exit_editing()
            .expect("commit should succeed")
            .expect("an open session commits a transform");
        assert_eq!(transform.x, 10.0);
        assert_eq!(transform.scale_x, 2.0);
        assert_eq!(transform.scale_y, 1.0);
        assert_eq!(rendered(&fixture), Bounds::new(10.0, 10.0, 200.0, 50.0));
        assert_eq!(
            fixture.registry.borrow().transform(&ElementId::new("hero")),
            Ok(transform)
        );
        assert_eq!(
            fixture.registry.borrow().owner(&ElementId::new("hero")),
            Ok(PositionOwner::Host)
        );

        assert!(fixture.session.exit_editing().expect("idle exit").is_none());
        assert_eq!(fixture.session.mode(), SessionMode::Idle);
    }

    #[test]
    fn exit_during_drag_is_refused() {
        let mut fixture = fixture();
        fixture.session.enter_editing().expect("session should open");
        fixture
            .session
            .start_drag(Point::new(0.0, 0.0), DragType::Move, Modifiers::NONE);

        let err = fixture
            .session
            .exit_editing()
            .expect_err("exit is only valid between drags");
        assert!(matches!(err, SessionError::DragInProgress(_)));
        assert_eq!(fixture.session.mode(), SessionMode::Dragging);
    }

    #[test]
    fn drag_without_session_is_ignored() {
        let mut fixture = fixture();
        assert!(!fixture
            .session
            .start_drag(Point::new(0.0, 0.0), DragType::Move, Modifiers::NONE));
        assert!(fixture
            .session
            .update_drag(Point::new(5.0, 5.0), Modifiers::NONE)
            .expect("ignored")
            .is_none());
        assert!(fixture.session.end_drag().is_none());
        assert_eq!(
            fixture.element.borrow().rendered_box(),
            Ok(Bounds::new(10.0, 10.0, 100.0, 50.0))
        );
    }

    #[test]
    fn drag_math_uses_start_snapshot_not_previous_frame() {
        let mut fixture = fixture();
        fixture.session.enter_editing().expect("session should open");
        fixture
            .session
            .start_drag(Point::new(50.0, 50.0), DragType::Move, Modifiers::NONE);
        for step in 1..=10 {
            fixture
                .session
                .update_drag(Point::new(50.0 + f64::from(step) * 0.1, 50.0), Modifiers::NONE)
                .expect("move should apply");
        }
        let bounds = fixture.session.bounds().expect("session open");
        assert!((bounds.x - 11.0).abs() < 1e-9);
    }

    #[test]
    fn modifiers_are_resampled_on_every_move() {
        let mut fixture = fixture();
        fixture.session.enter_editing().expect("session should open");
        fixture.session.start_drag(
            Point::new(110.0, 60.0),
            DragType::Resize(Handle::SE),
            Modifiers::NONE,
        );
        let shift = Modifiers::new(true, false, false);
        let bounds = fixture
            .session
            .update_drag(Point::new(210.0, 65.0), shift)
            .expect("resize should apply")
            .expect("drag is active");
        assert_eq!(bounds.width / bounds.height, 2.0);
        assert_eq!(fixture.session.drag().map(|drag| drag.modifiers), Some(shift));
    }

    #[test]
    fn cancel_drag_restores_pre_drag_snapshot() {
        let mut fixture = fixture();
        fixture.session.enter_editing().expect("session should open");
        fixture
            .session
            .start_drag(Point::new(0.0, 0.0), DragType::Move, Modifiers::NONE);
        fixture
            .session
            .update_drag(Point::new(40.0, 40.0), Modifiers::NONE)
            .expect("move should apply");

        assert!(fixture.session.cancel_drag());
        assert_eq!(fixture.session.mode(), SessionMode::Editing);
        assert_eq!(
            fixture.session.bounds(),
            Some(Bounds::new(10.0, 10.0, 100.0, 50.0))
        );
        assert_eq!(rendered(&fixture), Bounds::new(10.0, 10.0, 100.0, 50.0));
    }

    #[test]
    fn abandon_restores_entry_bounds_without_touching_transform() {
        let mut fixture = fixture();
        let before = fixture
            .registry
            .borrow()
            .transform(&ElementId::new("hero"))
            .expect("registered");
        fixture.session.enter_editing().expect("session should open");
        fixture
            .session
            .start_drag(Point::new(0.0, 0.0), DragType::Move, Modifiers::NONE);
        fixture
            .session
            .update_drag(Point::new(30.0, 0.0), Modifiers::NONE)
            .expect("move should apply");
        fixture.session.end_drag();

        fixture.session.abandon_editing().expect("abandon should succeed");
        assert_eq!(rendered(&fixture), Bounds::new(10.0, 10.0, 100.0, 50.0));
        assert_eq!(
            fixture.registry.borrow().transform(&ElementId::new("hero")),
            Ok(before)
        );
        assert_eq!(fixture.session.mode(), SessionMode::Idle);
    }

    #[test]
    fn detached_element_fails_to_open() {
        let fixture = fixture();
        let mut ghost = StyledElement::new("ghost", Bounds::new(0.0, 0.0, 10.0, 10.0));
        ghost.detach();
        fixture
            .registry
            .borrow_mut()
            .register_with(ghost.into_handle(), Size::new(10.0, 10.0), Transform::IDENTITY, 0)
            .expect("registration does not read the box");

        let mut session = EditSession::new(
            fixture.registry.clone(),
            ElementId::new("ghost"),
            SizeConstraints::default(),
        );
        let err = session.enter_editing().expect_err("detached element cannot open");
        assert!(matches!(err, SessionError::Registry(RegistryError::Element(_))));
        assert_eq!(session.mode(), SessionMode::Idle);
    }

    #[test]
    fn mode_listeners_observe_every_transition() {
        let mut fixture = fixture();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        fixture
            .session
            .on_mode_change(move |mode| sink.borrow_mut().push(mode));

        fixture.session.enter_editing().expect("session should open");
        fixture
            .session
            .start_drag(Point::new(0.0, 0.0), DragType::Move, Modifiers::NONE);
        fixture.session.end_drag();
        fixture.session.exit_editing().expect("commit should succeed");

        assert_eq!(
            *seen.borrow(),
            vec![
                SessionMode::Editing,
                SessionMode::Dragging,
                SessionMode::Editing,
                SessionMode::Idle,
            ]
        );
    }
}
