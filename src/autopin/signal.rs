use std::cell::Cell;
use std::rc::Rc;

use crate::element::ElementId;

/// Payload-less "surface resized" signal. Every `notify` bumps a generation
/// counter; the controller compares generations to detect pending work, so
/// bursts collapse into one pass.
#[derive(Debug, Clone, Default)]
pub struct ResizeSignal {
    generation: Rc<Cell<u64>>,
}

impl ResizeSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notify(&self) {
        self.generation.set(self.generation.get().wrapping_add(1));
    }

    pub fn generation(&self) -> u64 {
        self.generation.get()
    }
}

/// Host-side observer of viewport and background-surface size changes.
pub trait ViewportWatcher {
    /// Starts delivering resize notifications for `element` into `signal`.
    fn subscribe(&mut self, element: &ElementId, signal: ResizeSignal);

    fn unsubscribe(&mut self, element: &ElementId);
}
