use crate::geometry::{Bounds, Point};

use super::bounds::{DragType, Modifiers};
use super::handles::HandleLayout;
use super::session::{EditSession, SessionError};

/// Pointer ids at or above this value come from normalized touches.
pub const TOUCH_POINTER_BASE: i64 = 1 << 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerPhase {
    Down,
    Move,
    Up,
    Cancel,
    LostCapture,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    pub pointer_id: i64,
    pub phase: PointerPhase,
    pub position: Point,
    pub modifiers: Modifiers,
}

impl PointerEvent {
    pub const fn new(pointer_id: i64, phase: PointerPhase, position: Point, modifiers: Modifiers) -> Self {
        Self {
            pointer_id,
            phase,
            position,
            modifiers,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchPhase {
    Start,
    Move,
    End,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TouchPoint {
    pub identifier: i64,
    pub position: Point,
}

/// `touches` holds the points that changed in this event.
#[derive(Debug, Clone, PartialEq)]
pub struct TouchEvent {
    pub phase: TouchPhase,
    pub touches: Vec<TouchPoint>,
    pub modifiers: Modifiers,
}

/// Maps a single-touch event onto the pointer model. Multi-touch is ignored.
pub fn normalize_touch(event: &TouchEvent) -> Option<PointerEvent> {
    let [touch] = event.touches.as_slice() else {
        return None;
    };
    let phase = match event.phase {
        TouchPhase::Start => PointerPhase::Down,
        TouchPhase::Move => PointerPhase::Move,
        TouchPhase::End => PointerPhase::Up,
        TouchPhase::Cancel => PointerPhase::Cancel,
    };
    Some(PointerEvent::new(
        TOUCH_POINTER_BASE + touch.identifier,
        phase,
        touch.position,
        event.modifiers,
    ))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Character(char),
    Enter,
    Escape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyInput {
    pub key: Key,
    pub modifiers: Modifiers,
}

impl KeyInput {
    pub const fn new(key: Key, modifiers: Modifiers) -> Self {
        Self { key, modifiers }
    }
}

#[derive(Debug)]
pub enum RouterAction {
    Ignored,
    DragStarted(DragType),
    DragUpdated(Bounds),
    DragEnded(Option<Bounds>),
    DragCancelled,
    /// A live write failed; the drag was cancelled.
    DragFailed(SessionError),
    CommitRequested,
    CancelRequested,
}

/// Translates raw input into session calls. Only the pointer that started a
/// drag may move, end, or cancel it.
#[derive(Debug, Clone, Default)]
pub struct InputRouter {
    layout: HandleLayout,
    attached: bool,
    active_pointer: Option<i64>,
}

impl InputRouter {
    pub fn new(layout: HandleLayout) -> Self {
        Self {
            layout,
            attached: false,
            active_pointer: None,
        }
    }

    pub fn attach(&mut self) {
        self.attached = true;
    }

    pub fn detach(&mut self) {
        self.attached = false;
        self.active_pointer = None;
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn active_pointer(&self) -> Option<i64> {
        self.active_pointer
    }

    pub fn handle_pointer(&mut self, session: &mut EditSession, event: PointerEvent) -> RouterAction {
        if !self.attached {
            return RouterAction::Ignored;
        }
        match event.phase {
            PointerPhase::Down => self.pointer_down(session, event),
            PointerPhase::Move => {
                if !self.owns(event.pointer_id) {
                    return RouterAction::Ignored;
                }
                match session.update_drag(event.position, event.modifiers) {
                    Ok(Some(bounds)) => RouterAction::DragUpdated(bounds),
                    Ok(None) => RouterAction::Ignored,
                    Err(err) => {
                        tracing::warn!(element = %session.element_id(), ?err, "live drag write failed");
                        session.cancel_drag();
                        self.active_pointer = None;
                        RouterAction::DragFailed(err)
                    }
                }
            }
            PointerPhase::Up => {
                if !self.owns(event.pointer_id) {
                    return RouterAction::Ignored;
                }
                self.active_pointer = None;
                RouterAction::DragEnded(session.end_drag())
            }
            PointerPhase::Cancel | PointerPhase::LostCapture => {
                if !self.owns(event.pointer_id) {
                    return RouterAction::Ignored;
                }
                self.cancel_active(session)
            }
        }
    }

    pub fn handle_touch(&mut self, session: &mut EditSession, event: &TouchEvent) -> RouterAction {
        match normalize_touch(event) {
            Some(pointer) => self.handle_pointer(session, pointer),
            None => {
                tracing::trace!(touches = event.touches.len(), "multi-touch ignored");
                RouterAction::Ignored
            }
        }
    }

    /// `Enter` and `Ctrl+S` commit; `Escape` cancels the drag, or the
    /// session when no drag is active.
    pub fn handle_key(&mut self, session: &mut EditSession, input: KeyInput) -> RouterAction {
        if !self.attached || !session.is_editing() {
            return RouterAction::Ignored;
        }
        match (input.key, input.modifiers.ctrl) {
            (Key::Enter, _) | (Key::Character('s' | 'S'), true) => {
                if self.active_pointer.is_some() {
                    RouterAction::Ignored
                } else {
                    RouterAction::CommitRequested
                }
            }
            (Key::Escape, _) => {
                if self.active_pointer.is_some() {
                    self.cancel_active(session)
                } else {
                    RouterAction::CancelRequested
                }
            }
            _ => RouterAction::Ignored,
        }
    }

    /// Focus loss cancels whatever drag is active.
    pub fn handle_focus_lost(&mut self, session: &mut EditSession) -> RouterAction {
        if self.active_pointer.is_none() {
            return RouterAction::Ignored;
        }
        self.cancel_active(session)
    }

    fn pointer_down(&mut self, session: &mut EditSession, event: PointerEvent) -> RouterAction {
        if self.active_pointer.is_some() {
            return RouterAction::Ignored;
        }
        let Some(frame) = session.bounds() else {
            return RouterAction::Ignored;
        };
        let Some(drag_type) = self.layout.hit_test(frame, event.position) else {
            return RouterAction::Ignored;
        };
        if !session.start_drag(event.position, drag_type, event.modifiers) {
            return RouterAction::Ignored;
        }
        self.active_pointer = Some(event.pointer_id);
        RouterAction::DragStarted(drag_type)
    }

    fn cancel_active(&mut self, session: &mut EditSession) -> RouterAction {
        self.active_pointer = None;
        if session.cancel_drag() {
            RouterAction::DragCancelled
        } else {
            RouterAction::Ignored
        }
    }

    fn owns(&self, pointer_id: i64) -> bool {
        self.active_pointer == Some(pointer_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::bounds::{Handle, SizeConstraints};
    use crate::element::{ElementId, StyledElement};
    use crate::registry::ElementRegistry;
    use crate::state::SessionMode;

    fn open_session() -> EditSession {
        let registry = ElementRegistry::shared();
        registry
            .borrow_mut()
            .register(StyledElement::new("hero", Bounds::new(0.0, 0.0, 100.0, 100.0)).into_handle())
            .expect("element should register");
        let mut session = EditSession::new(registry, ElementId::new("hero"), SizeConstraints::default());
        session.enter_editing().expect("session should open");
        session
    }

    fn attached_router() -> InputRouter {
        let mut router = InputRouter::new(HandleLayout::default());
        router.attach();
        router
    }

    fn pointer(id: i64, phase: PointerPhase, x: f64, y: f64) -> PointerEvent {
        PointerEvent::new(id, phase, Point::new(x, y), Modifiers::NONE)
    }

    #[test]
    fn pointer_down_on_handle_starts_resize() {
        let mut session = open_session();
        let mut router = attached_router();

        let action = router.handle_pointer(&mut session, pointer(1, PointerPhase::Down, 100.0, 100.0));
        assert!(matches!(action, RouterAction::DragStarted(DragType::Resize(Handle::SE))));
        assert_eq!(router.active_pointer(), Some(1));

        let action = router.handle_pointer(&mut session, pointer(1, PointerPhase::Move, 130.0, 110.0));
        assert!(matches!(action, RouterAction::DragUpdated(bounds) if bounds == Bounds::new(0.0, 0.0, 130.0, 110.0)));

        let action = router.handle_pointer(&mut session, pointer(1, PointerPhase::Up, 130.0, 110.0));
        assert!(matches!(action, RouterAction::DragEnded(Some(_))));
        assert_eq!(router.active_pointer(), None);
        assert_eq!(session.mode(), SessionMode::Editing);
    }

    #[test]
    fn foreign_pointer_cannot_steer_active_drag() {
        let mut session = open_session();
        let mut router = attached_router();
        router.handle_pointer(&mut session, pointer(1, PointerPhase::Down, 50.0, 50.0));

        let action = router.handle_pointer(&mut session, pointer(2, PointerPhase::Move, 90.0, 90.0));
        assert!(matches!(action, RouterAction::Ignored));
        let action = router.handle_pointer(&mut session, pointer(2, PointerPhase::Down, 50.0, 50.0));
        assert!(matches!(action, RouterAction::Ignored));
        assert_eq!(session.bounds(), Some(Bounds::new(0.0, 0.0, 100.0, 100.0)));
    }

    #[test]
    fn lost_capture_restores_pre_drag_bounds() {
        let mut session = open_session();
        let mut router = attached_router();
        router.handle_pointer(&mut session, pointer(7, PointerPhase::Down, 50.0, 50.0));
        router.handle_pointer(&mut session, pointer(7, PointerPhase::Move, 80.0, 60.0));

        let action = router.handle_pointer(&mut session, pointer(7, PointerPhase::LostCapture, 80.0, 60.0));
        assert!(matches!(action, RouterAction::DragCancelled));
        assert_eq!(session.bounds(), Some(Bounds::new(0.0, 0.0, 100.0, 100.0)));
    }

    #[test]
    fn detached_router_ignores_everything() {
        let mut session = open_session();
        let mut router = InputRouter::new(HandleLayout::default());
        let action = router.handle_pointer(&mut session, pointer(1, PointerPhase::Down, 50.0, 50.0));
        assert!(matches!(action, RouterAction::Ignored));
        assert_eq!(session.mode(), SessionMode::Editing);
    }

    #[test]
    fn touch_normalizes_single_touch_and_ignores_pinch() {
        let single = TouchEvent {
            phase: TouchPhase::Start,
            touches: vec![TouchPoint {
                identifier: 3,
                position: Point::new(10.0, 20.0),
            }],
            modifiers: Modifiers::NONE,
        };
        let normalized = normalize_touch(&single).expect("single touch maps to a pointer");
        assert_eq!(normalized.pointer_id, TOUCH_POINTER_BASE + 3);
        assert_eq!(normalized.phase, PointerPhase::Down);

        let pinch = TouchEvent {
            touches: vec![single.touches[0], single.touches[0]],
            ..single
        };
        assert!(normalize_touch(&pinch).is_none());
    }

    #[test]
    fn keys_map_to_commit_and_cancel() {
        let mut session = open_session();
        let mut router = attached_router();

        let ctrl = Modifiers::new(false, false, true);
        assert!(matches!(
            router.handle_key(&mut session, KeyInput::new(Key::Enter, Modifiers::NONE)),
            RouterAction::CommitRequested
        ));
        assert!(matches!(
            router.handle_key(&mut session, KeyInput::new(Key::Character('s'), ctrl)),
            RouterAction::CommitRequested
        ));
        assert!(matches!(
            router.handle_key(&mut session, KeyInput::new(Key::Character('s'), Modifiers::NONE)),
            RouterAction::Ignored
        ));
        assert!(matches!(
            router.handle_key(&mut session, KeyInput::new(Key::Escape, Modifiers::NONE)),
            RouterAction::CancelRequested
        ));

        router.handle_pointer(&mut session, pointer(1, PointerPhase::Down, 50.0, 50.0));
        assert!(matches!(
            router.handle_key(&mut session, KeyInput::new(Key::Escape, Modifiers::NONE)),
            RouterAction::DragCancelled
        ));
        assert_eq!(session.mode(), SessionMode::Editing);
    }

    #[test]
    fn focus_loss_cancels_active_drag() {
        let mut session = open_session();
        let mut router = attached_router();
        router.handle_pointer(&mut session, pointer(1, PointerPhase::Down, 50.0, 50.0));
        assert!(matches!(
            router.handle_focus_lost(&mut session),
            RouterAction::DragCancelled
        ));
        assert!(matches!(
            router.handle_focus_lost(&mut session),
            RouterAction::Ignored
        ));
    }
}
