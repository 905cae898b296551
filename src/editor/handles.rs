//! Handle frame view over the edit session.

use std::time::{Duration, Instant};

use serde::Serialize;

use crate::geometry::{Bounds, Point};
use crate::state::SessionMode;

use super::bounds::{DragType, Handle};

pub const DEFAULT_HANDLE_SIZE: f64 = 8.0;
pub const DEFAULT_HIT_PADDING: f64 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HandleGeometry {
    pub drag_type: DragType,
    pub rect: Bounds,
    pub cursor: &'static str,
}

/// Everything a renderer needs to draw one frame of the overlay.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameView {
    pub frame: Bounds,
    pub mode: SessionMode,
    pub handles: Vec<HandleGeometry>,
}

/// Drawing backend for the overlay. Implemented by the host.
pub trait OverlayRenderer {
    fn render(&mut self, view: &FrameView);
    fn clear(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HandleLayout {
    pub handle_size: f64,
    pub hit_padding: f64,
}

impl Default for HandleLayout {
    fn default() -> Self {
        Self {
            handle_size: DEFAULT_HANDLE_SIZE,
            hit_padding: DEFAULT_HIT_PADDING,
        }
    }
}

impl HandleLayout {
    pub const fn new(handle_size: f64, hit_padding: f64) -> Self {
        Self {
            handle_size,
            hit_padding,
        }
    }

    /// Handle squares centered on the frame corners and edge midpoints.
    pub fn handles(&self, frame: Bounds) -> Vec<HandleGeometry> {
        let half = self.handle_size / 2.0;
        Handle::ALL
            .into_iter()
            .map(|handle| {
                let center = handle_center(handle, frame);
                HandleGeometry {
                    drag_type: DragType::Resize(handle),
                    rect: Bounds::new(
                        center.x - half,
                        center.y - half,
                        self.handle_size,
                        self.handle_size,
                    ),
                    cursor: handle.cursor(),
                }
            })
            .collect()
    }

    /// Resize handles win over the move region; corners win over edges.
    pub fn hit_test(&self, frame: Bounds, point: Point) -> Option<DragType> {
        if !point.is_finite() {
            return None;
        }
        let handles = self.handles(frame);
        let corners = handles.iter().filter(|geometry| is_corner(geometry.drag_type));
        let edges = handles.iter().filter(|geometry| !is_corner(geometry.drag_type));
        if let Some(geometry) = corners
            .chain(edges)
            .find(|geometry| geometry.rect.contains(point, self.hit_padding))
        {
            return Some(geometry.drag_type);
        }
        frame.contains(point, 0.0).then_some(DragType::Move)
    }

    pub fn view(&self, frame: Bounds, mode: SessionMode) -> FrameView {
        FrameView {
            frame,
            mode,
            handles: self.handles(frame),
        }
    }
}

fn is_corner(drag_type: DragType) -> bool {
    matches!(drag_type, DragType::Resize(handle) if handle.is_corner())
}

fn handle_center(handle: Handle, frame: Bounds) -> Point {
    let x = if handle.moves_west() {
        frame.x
    } else if handle.moves_east() {
        frame.right()
    } else {
        frame.center().x
    };
    let y = if handle.moves_north() {
        frame.y
    } else if handle.moves_south() {
        frame.bottom()
    } else {
        frame.center().y
    };
    Point::new(x, y)
}

/// Overlay lifecycle: mounted once per session, redrawn on every bounds
/// change while visible.
pub struct HandleOverlay {
    renderer: Box<dyn OverlayRenderer>,
    layout: HandleLayout,
    mounted: bool,
    visible: bool,
    last_view: Option<FrameView>,
}

impl HandleOverlay {
    pub fn new(renderer: Box<dyn OverlayRenderer>, layout: HandleLayout) -> Self {
        Self {
            renderer,
            layout,
            mounted: false,
            visible: false,
            last_view: None,
        }
    }

    pub fn layout(&self) -> HandleLayout {
        self.layout
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    pub fn is_visible(&self) -> bool {
        self.mounted && self.visible
    }

    pub fn last_view(&self) -> Option<&FrameView> {
        self.last_view.as_ref()
    }

    pub fn mount(&mut self, visible: bool) {
        self.mounted = true;
        self.visible = visible;
    }

    /// Redraws from the session state. Idle sessions clear the overlay.
    pub fn sync(&mut self, bounds: Option<Bounds>, mode: SessionMode) {
        match bounds.filter(|_| mode.is_editing()) {
            Some(frame) => {
                let view = self.layout.view(frame, mode);
                if self.is_visible() {
                    self.renderer.render(&view);
                }
                self.last_view = Some(view);
            }
            None => {
                if self.last_view.take().is_some() && self.mounted {
                    self.renderer.clear();
                }
            }
        }
    }

    pub fn show(&mut self) {
        if !self.mounted || self.visible {
            return;
        }
        self.visible = true;
        if let Some(view) = self.last_view.as_ref() {
            self.renderer.render(view);
        }
    }

    pub fn hide(&mut self) {
        if !self.mounted || !self.visible {
            return;
        }
        self.visible = false;
        self.renderer.clear();
    }

    pub fn remove(&mut self) {
        if !self.mounted {
            return;
        }
        self.renderer.clear();
        self.mounted = false;
        self.visible = false;
        self.last_view = None;
    }

    pub fn hit_test(&self, point: Point) -> Option<DragType> {
        let view = self.last_view.as_ref()?;
        self.layout.hit_test(view.frame, point)
    }
}

/// Interval-gated mode probe for hosts without a mode event source.
/// Only drives overlay visibility.
#[derive(Debug, Clone)]
pub struct ModePoller {
    interval: Duration,
    last_poll: Option<Instant>,
    last_mode: Option<SessionMode>,
}

impl ModePoller {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_poll: None,
            last_mode: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    /// Returns the probed mode when the interval has elapsed and the mode
    /// changed since the last poll.
    pub fn poll(&mut self, now: Instant, probe: impl FnOnce() -> SessionMode) -> Option<SessionMode> {
        if let Some(last) = self.last_poll {
            if now.saturating_duration_since(last) < self.interval {
                return None;
            }
        }
        self.last_poll = Some(now);
        let mode = probe();
        if self.last_mode == Some(mode) {
            return None;
        }
        self.last_mode = Some(mode);
        Some(mode)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    #[derive(Default)]
    struct RecordingRenderer {
        frames: Rc<RefCell<Vec<Bounds>>>,
        clears: Rc<RefCell<usize>>,
    }

    impl OverlayRenderer for RecordingRenderer {
        fn render(&mut self, view: &FrameView) {
            self.frames.borrow_mut().push(view.frame);
        }

        fn clear(&mut self) {
            *self.clears.borrow_mut() += 1;
        }
    }

    fn frame() -> Bounds {
        Bounds::new(100.0, 100.0, 200.0, 100.0)
    }

    #[test]
    fn layout_places_eight_handles_on_corners_and_midpoints() {
        let handles = HandleLayout::default().handles(frame());
        assert_eq!(handles.len(), 8);

        let ne = handles
            .iter()
            .find(|geometry| geometry.drag_type == DragType::Resize(Handle::NE))
            .expect("ne handle should exist");
        assert_eq!(ne.rect, Bounds::new(296.0, 96.0, 8.0, 8.0));
        assert_eq!(ne.cursor, "ne-resize");

        let s = handles
            .iter()
            .find(|geometry| geometry.drag_type == DragType::Resize(Handle::S))
            .expect("s handle should exist");
        assert_eq!(s.rect.center(), Point::new(200.0, 200.0));
    }

    #[test]
    fn hit_test_prefers_handles_over_move_region() {
        let layout = HandleLayout::default();
        assert_eq!(
            layout.hit_test(frame(), Point::new(101.0, 101.0)),
            Some(DragType::Resize(Handle::NW))
        );
        assert_eq!(
            layout.hit_test(frame(), Point::new(306.0, 150.0)),
            Some(DragType::Resize(Handle::E))
        );
        assert_eq!(
            layout.hit_test(frame(), Point::new(150.0, 150.0)),
            Some(DragType::Move)
        );
        assert_eq!(layout.hit_test(frame(), Point::new(20.0, 20.0)), None);
    }

    #[test]
    fn overlay_renders_only_while_visible() {
        let renderer = RecordingRenderer::default();
        let frames = renderer.frames.clone();
        let clears = renderer.clears.clone();
        let mut overlay = HandleOverlay::new(Box::new(renderer), HandleLayout::default());

        overlay.mount(false);
        overlay.sync(Some(frame()), SessionMode::Editing);
        assert!(frames.borrow().is_empty());

        overlay.show();
        assert_eq!(*frames.borrow(), vec![frame()]);

        overlay.hide();
        overlay.sync(Some(frame()), SessionMode::Dragging);
        assert_eq!(frames.borrow().len(), 1);
        assert_eq!(*clears.borrow(), 1);

        overlay.remove();
        assert!(!overlay.is_mounted());
        assert!(overlay.hit_test(Point::new(150.0, 150.0)).is_none());
    }

    #[test]
    fn idle_sync_clears_the_frame() {
        let renderer = RecordingRenderer::default();
        let clears = renderer.clears.clone();
        let mut overlay = HandleOverlay::new(Box::new(renderer), HandleLayout::default());
        overlay.mount(true);
        overlay.sync(Some(frame()), SessionMode::Editing);
        overlay.sync(None, SessionMode::Idle);

        assert_eq!(*clears.borrow(), 1);
        assert!(overlay.last_view().is_none());
    }

    #[test]
    fn mode_poller_respects_interval_and_reports_changes_only() {
        let mut poller = ModePoller::new(Duration::from_millis(250));
        let start = Instant::now();

        assert_eq!(poller.poll(start, || SessionMode::Idle), Some(SessionMode::Idle));
        assert_eq!(
            poller.poll(start + Duration::from_millis(100), || SessionMode::Editing),
            None
        );
        assert_eq!(
            poller.poll(start + Duration::from_millis(300), || SessionMode::Editing),
            Some(SessionMode::Editing)
        );
        assert_eq!(
            poller.poll(start + Duration::from_millis(600), || SessionMode::Editing),
            None
        );
    }
}
