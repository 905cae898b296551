use super::model::SessionMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    EnterEditing,
    ExitEditing,
    AbandonEditing,
    StartDrag,
    EndDrag,
    CancelDrag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTransition {
    pub from: SessionMode,
    pub event: SessionEvent,
    pub to: SessionMode,
}

impl StateTransition {
    pub const fn new(from: SessionMode, event: SessionEvent, to: SessionMode) -> Self {
        Self { from, event, to }
    }
}
