use super::error::{StateError, StateResult};
use super::event::{SessionEvent, StateTransition};
use super::model::SessionMode;

const HISTORY_LIMIT: usize = 64;

#[derive(Debug)]
pub struct SessionMachine {
    state: SessionMode,
    transition_history: Vec<StateTransition>,
}

impl SessionMachine {
    pub fn new() -> Self {
        Self {
            state: SessionMode::default(),
            transition_history: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionMode {
        self.state
    }

    pub fn can_transition(&self, event: SessionEvent) -> bool {
        self.next_state(event).is_some()
    }

    pub fn next_state(&self, event: SessionEvent) -> Option<SessionMode> {
        use SessionEvent::*;
        match (self.state, event) {
            (SessionMode::Idle, EnterEditing) => Some(SessionMode::Editing),
            (SessionMode::Editing, ExitEditing | AbandonEditing) => Some(SessionMode::Idle),
            (SessionMode::Editing, StartDrag) => Some(SessionMode::Dragging),
            (SessionMode::Dragging, EndDrag | CancelDrag) => Some(SessionMode::Editing),
            _ => None,
        }
    }

    pub fn transition(&mut self, event: SessionEvent) -> StateResult<SessionMode> {
        tracing::trace!(from = ?self.state, event = ?event, "request session transition");
        let next = self.next_state(event).ok_or_else(|| {
            let from = self.state;
            tracing::debug!(from = ?from, event = ?event, "invalid session transition requested");
            StateError::InvalidStateTransition { from, event }
        })?;

        if self.transition_history.len() == HISTORY_LIMIT {
            self.transition_history.remove(0);
        }
        self.transition_history
            .push(StateTransition::new(self.state, event, next));
        self.state = next;

        Ok(self.state)
    }

    /// Most recent transitions, oldest first.
    pub fn history(&self) -> &[StateTransition] {
        &self.transition_history
    }
}

impl Default for SessionMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SessionMode::{:?}", self.state)
    }
}
