use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::config::EngineConfig;
use crate::element::ElementId;
use crate::geometry::Point;
use crate::registry::{PositionOwner, RegistryError, SharedRegistry};
use crate::storage::{AnchorPersistence, AnchorRecord, StorageError};

use super::anchor::{from_anchor, to_anchor, Anchor, AnchorGrid, AnchorPoint};
use super::content_rect::{BackgroundSurface, ContentRect, ContentRectDetector, DetectError};
use super::signal::{ResizeSignal, ViewportWatcher};

pub const DEFAULT_RESIZE_DEBOUNCE: Duration = Duration::from_millis(100);
const POSITION_EPSILON: f64 = 1e-6;

pub type AutoPinResult<T> = std::result::Result<T, AutoPinError>;

#[derive(Debug, Error)]
pub enum AutoPinError {
    #[error("autopin is not enabled for {0}")]
    NotEnabled(ElementId),
    #[error("element {0} has an open edit session")]
    EditSessionActive(ElementId),
    #[error("content rect {rect:?} cannot anchor element {element}")]
    Unanchorable { element: ElementId, rect: ContentRect },
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Detect(#[from] DetectError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinState {
    Disabled,
    Enabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PumpReport {
    /// Anchors re-derived from committed edits.
    pub rederived: usize,
    /// Elements moved by a resize pass.
    pub repositioned: usize,
}

#[derive(Debug, Clone, Copy)]
struct Pin {
    anchor: Anchor,
}

/// Keeps pinned elements at their anchor inside the background content rect.
/// The anchor tracks the element's center, so a fixed-size element stays on
/// the background feature it was placed over while the content rect scales.
///
/// Resize signals are coalesced with a trailing debounce and processed only
/// from [`AutoPinController::pump`]. Signals raised while a pass is writing
/// are absorbed into that pass.
pub struct AutoPinController {
    registry: SharedRegistry,
    surface: Box<dyn BackgroundSurface>,
    detector: ContentRectDetector,
    persistence: AnchorPersistence,
    watcher: Box<dyn ViewportWatcher>,
    signal: ResizeSignal,
    debounce: Duration,
    grid: AnchorGrid,
    pins: BTreeMap<ElementId, Pin>,
    seen_generation: u64,
    pending_since: Option<Instant>,
}

impl AutoPinController {
    pub fn new(
        registry: SharedRegistry,
        surface: Box<dyn BackgroundSurface>,
        persistence: AnchorPersistence,
        watcher: Box<dyn ViewportWatcher>,
    ) -> Self {
        let signal = ResizeSignal::new();
        Self {
            registry,
            surface,
            detector: ContentRectDetector::default(),
            persistence,
            watcher,
            seen_generation: signal.generation(),
            signal,
            debounce: DEFAULT_RESIZE_DEBOUNCE,
            grid: AnchorGrid::default(),
            pins: BTreeMap::new(),
            pending_since: None,
        }
    }

    pub fn with_config(mut self, config: &EngineConfig) -> Self {
        self.detector = config.detector();
        self.debounce = config.resize_debounce();
        self.grid = config.anchor_grid();
        self
    }

    pub fn with_detector(mut self, detector: ContentRectDetector) -> Self {
        self.detector = detector;
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn set_surface(&mut self, surface: Box<dyn BackgroundSurface>) {
        self.surface = surface;
        self.signal.notify();
    }

    /// Signal handed to watchers; hosts may also notify it directly.
    pub fn signal(&self) -> ResizeSignal {
        self.signal.clone()
    }

    pub fn state(&self, id: &ElementId) -> PinState {
        if self.pins.contains_key(id) {
            PinState::Enabled
        } else {
            PinState::Disabled
        }
    }

    pub fn anchor(&self, id: &ElementId) -> Option<Anchor> {
        self.pins.get(id).map(|pin| pin.anchor)
    }

    pub fn zone(&self, id: &ElementId) -> Option<AnchorPoint> {
        self.anchor(id).map(|anchor| AnchorPoint::zone(anchor, self.grid))
    }

    pub fn pinned(&self) -> impl Iterator<Item = &ElementId> {
        self.pins.keys()
    }

    pub fn content_rect(&self) -> AutoPinResult<ContentRect> {
        Ok(self.detector.detect_in_host(self.surface.as_ref())?)
    }

    /// Makes AutoPin the sole position writer for `id`. A persisted anchor is
    /// resumed; otherwise the current rendered position is snapshotted.
    pub fn enable(&mut self, id: &ElementId) -> AutoPinResult<Anchor> {
        if let Some(pin) = self.pins.get(id) {
            return Ok(pin.anchor);
        }
        self.ensure_not_editing(id)?;

        let anchor = match self.persistence.load(id) {
            Some(record) => {
                tracing::info!(element = %id, anchor = ?record.anchor(), "resuming persisted anchor");
                record.anchor()
            }
            None => {
                let center = self.registry.borrow().rendered_box(id)?.center();
                let anchor = self.anchor_for(id, center)?;
                self.persist(id, anchor)?;
                anchor
            }
        };

        self.registry.borrow_mut().claim_for_autopin(id)?;
        self.watcher.subscribe(id, self.signal.clone());
        self.pins.insert(id.clone(), Pin { anchor });
        tracing::info!(element = %id, ?anchor, "autopin enabled");

        if let Err(err) = self.apply_pin(id, anchor) {
            tracing::warn!(element = %id, ?err, "initial autopin placement failed; keeping position");
        }
        Ok(anchor)
    }

    /// Stops pinning `id`. The persisted anchor is kept.
    pub fn disable(&mut self, id: &ElementId) -> AutoPinResult<bool> {
        if self.pins.remove(id).is_none() {
            return Ok(false);
        }
        self.watcher.unsubscribe(id);
        match self.registry.borrow_mut().release_from_autopin(id) {
            Ok(()) | Err(RegistryError::UnknownElement(_)) => {}
            Err(err) => return Err(err.into()),
        }
        tracing::info!(element = %id, "autopin disabled");
        Ok(true)
    }

    /// Re-snapshots the anchor from the element's current position.
    pub fn reanchor(&mut self, id: &ElementId) -> AutoPinResult<Anchor> {
        self.ensure_enabled(id)?;
        self.ensure_not_editing(id)?;
        let center = self.registry.borrow().rendered_box(id)?.center();
        let anchor = self.anchor_for(id, center)?;
        self.persist(id, anchor)?;
        self.set_anchor(id, anchor);
        Ok(anchor)
    }

    /// Moves a pinned element's top-left corner to `position` and records
    /// the anchor of its new center.
    pub fn reposition(&mut self, id: &ElementId, position: Point) -> AutoPinResult<Anchor> {
        self.ensure_enabled(id)?;
        self.ensure_not_editing(id)?;
        let size = self.registry.borrow().rendered_box(id)?.size();
        let center = Point::new(position.x + size.width / 2.0, position.y + size.height / 2.0);
        let anchor = self.anchor_for(id, center)?;
        self.registry
            .borrow_mut()
            .apply_position(id, PositionOwner::AutoPin, position)?;
        self.persist(id, anchor)?;
        self.set_anchor(id, anchor);
        tracing::debug!(element = %id, ?position, ?anchor, "pinned element repositioned");
        Ok(anchor)
    }

    /// Drives pending work: anchors of freshly committed edits are
    /// re-derived, then a debounced resize pass runs once the signal has
    /// been quiet for the debounce interval.
    pub fn pump(&mut self, now: Instant) -> PumpReport {
        let mut report = PumpReport {
            rederived: self.rederive_committed(),
            repositioned: 0,
        };

        let generation = self.signal.generation();
        if generation != self.seen_generation {
            self.seen_generation = generation;
            self.pending_since = Some(now);
        }

        if let Some(since) = self.pending_since {
            if now.saturating_duration_since(since) >= self.debounce {
                self.pending_since = None;
                report.repositioned = self.recompute_now();
            }
        }
        report
    }

    /// Runs one resize pass immediately. Anchors of committed edits are
    /// re-derived first and any debounced pass is consumed. Returns how many
    /// elements moved.
    pub fn recompute_now(&mut self) -> usize {
        self.rederive_committed();
        self.pending_since = None;
        let rect = match self.content_rect() {
            Ok(rect) => rect,
            Err(err) => {
                tracing::warn!(?err, "content rect unavailable; pinned elements keep their position");
                self.absorb_signals();
                return 0;
            }
        };

        let pins: Vec<(ElementId, Anchor)> = self
            .pins
            .iter()
            .map(|(id, pin)| (id.clone(), pin.anchor))
            .collect();
        let mut moved = 0;
        for (id, anchor) in pins {
            match self.place(&id, anchor, rect) {
                Ok(true) => moved += 1,
                Ok(false) => {}
                Err(err) => tracing::warn!(element = %id, ?err, "autopin placement skipped"),
            }
        }

        self.absorb_signals();
        tracing::debug!(moved, ?rect, "autopin resize pass complete");
        moved
    }

    fn rederive_committed(&mut self) -> usize {
        let committed = self.registry.borrow_mut().take_committed();
        let mut rederived = 0;
        for id in committed {
            if !self.pins.contains_key(&id) {
                continue;
            }
            let result = self
                .committed_center(&id)
                .and_then(|center| self.anchor_for(&id, center));
            match result.and_then(|anchor| self.persist(&id, anchor).map(|()| anchor)) {
                Ok(anchor) => {
                    self.set_anchor(&id, anchor);
                    rederived += 1;
                    tracing::info!(element = %id, ?anchor, "anchor re-derived from committed edit");
                }
                Err(err) => {
                    tracing::warn!(element = %id, ?err, "failed to re-derive anchor; keeping previous");
                }
            }
        }
        rederived
    }

    fn apply_pin(&mut self, id: &ElementId, anchor: Anchor) -> AutoPinResult<bool> {
        let rect = self.content_rect()?;
        self.place(id, anchor, rect)
    }

    /// Writes the anchor's pixel projection unless the element is being
    /// edited or already sits there.
    fn place(&mut self, id: &ElementId, anchor: Anchor, rect: ContentRect) -> AutoPinResult<bool> {
        let mut registry = self.registry.borrow_mut();
        if registry.owner(id)? != PositionOwner::AutoPin {
            tracing::trace!(element = %id, "element not owned by autopin; placement deferred");
            return Ok(false);
        }

        let center = from_anchor(anchor, rect);
        let size = registry.rendered_box(id)?.size();
        let target = Point::new(center.x - size.width / 2.0, center.y - size.height / 2.0);
        if !target.is_finite() {
            return Err(AutoPinError::Unanchorable {
                element: id.clone(),
                rect,
            });
        }
        let current = registry.transform(id)?.position();
        if (current.x - target.x).abs() < POSITION_EPSILON
            && (current.y - target.y).abs() < POSITION_EPSILON
        {
            return Ok(false);
        }
        registry.apply_position(id, PositionOwner::AutoPin, target)?;
        tracing::debug!(element = %id, from = ?current, to = ?target, "pinned element placed");
        Ok(true)
    }

    /// Center of the box described by the committed transform.
    fn committed_center(&self, id: &ElementId) -> AutoPinResult<Point> {
        let registry = self.registry.borrow();
        let base_size = registry.base_size(id)?;
        Ok(registry.transform(id)?.to_bounds(base_size).center())
    }

    fn anchor_for(&self, id: &ElementId, position: Point) -> AutoPinResult<Anchor> {
        let rect = self.content_rect()?;
        to_anchor(position, rect).ok_or_else(|| AutoPinError::Unanchorable {
            element: id.clone(),
            rect,
        })
    }

    fn persist(&self, id: &ElementId, anchor: Anchor) -> AutoPinResult<()> {
        let (scale, z_index) = {
            let registry = self.registry.borrow();
            (registry.transform(id)?.scale_x, registry.z_index(id)?)
        };
        self.persistence
            .save(id, AnchorRecord::new(anchor, scale, z_index))?;
        Ok(())
    }

    fn set_anchor(&mut self, id: &ElementId, anchor: Anchor) {
        if let Some(pin) = self.pins.get_mut(id) {
            pin.anchor = anchor;
        }
    }

    fn ensure_enabled(&self, id: &ElementId) -> AutoPinResult<()> {
        if self.pins.contains_key(id) {
            Ok(())
        } else {
            Err(AutoPinError::NotEnabled(id.clone()))
        }
    }

    fn ensure_not_editing(&self, id: &ElementId) -> AutoPinResult<()> {
        if self.registry.borrow().owner(id)? == PositionOwner::EditSession {
            return Err(AutoPinError::EditSessionActive(id.clone()));
        }
        Ok(())
    }

    fn absorb_signals(&mut self) {
        self.seen_generation = self.signal.generation();
    }
}
