//! Interaction state for a waveform view: a draggable, clamped time
//! selection over `[0, domain_max]` seconds, plus a playback cursor.
//!
//! The controller consumes raw pointer events from the host toolkit and
//! publishes committed bounds to observers on release. Rendering is the
//! host's job; mutations only raise a dirty flag the host polls.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace, warn};

#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("domain length must be positive and finite, got {0}")]
    EmptyDomain(f64),
    #[error("bounds [{left}, {right}] invalid for domain [0, {domain_max}]")]
    InvalidBounds { left: f64, right: f64, domain_max: f64 },
}

/// Monotone counter bumped on every commit. Asynchronous recompute keyed
/// on an older generation can detect that it has been superseded.
pub type Generation = u64;

/// A sub-interval of the time domain, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewRange {
    pub left: f64,
    pub right: f64,
}

impl ViewRange {
    pub fn new(left: f64, right: f64) -> Self {
        Self { left, right }
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn center(&self) -> f64 {
        (self.left + self.right) / 2.0
    }

    pub fn contains(&self, x: f64) -> bool {
        self.left <= x && x <= self.right
    }
}

/// Pointer and zoom events as delivered by the host event loop. A `None`
/// coordinate means the pointer left the plotting area.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    Press(Option<f64>),
    Move(Option<f64>),
    Release,
    ZoomIn,
    ZoomOut,
}

/// Receives committed bounds. Registered once per linked pane; every
/// observer sees every commit, in registration order.
pub trait SelectionObserver: Send {
    fn on_selection_committed(&mut self, range: ViewRange, generation: Generation);
}

const ZOOM_IN_FACTOR: f64 = 0.9;
const ZOOM_OUT_FACTOR: f64 = 1.1;

#[derive(Debug, Clone, Copy)]
struct DragAnchor {
    pointer_start: f64,
    range_at_press: ViewRange,
}

/// Owns the selection interval and translates press/move/release into
/// interval mutations. Invariant after every mutation:
/// `0 <= left <= right <= domain_max`.
pub struct SelectionController {
    domain_max: f64,
    range: ViewRange,
    anchor: Option<DragAnchor>,
    observers: Vec<Box<dyn SelectionObserver>>,
    generation: Generation,
    render_dirty: bool,
}

impl SelectionController {
    /// Starts with the whole domain selected.
    pub fn new(domain_max: f64) -> Result<Self, SelectionError> {
        if !domain_max.is_finite() || domain_max <= 0.0 {
            return Err(SelectionError::EmptyDomain(domain_max));
        }
        Ok(Self {
            domain_max,
            range: ViewRange::new(0.0, domain_max),
            anchor: None,
            observers: Vec::new(),
            generation: 0,
            render_dirty: false,
        })
    }

    pub fn subscribe(&mut self, observer: Box<dyn SelectionObserver>) {
        self.observers.push(observer);
    }

    pub fn bounds(&self) -> ViewRange {
        self.range
    }

    pub fn domain_max(&self) -> f64 {
        self.domain_max
    }

    pub fn is_dragging(&self) -> bool {
        self.anchor.is_some()
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// True if a mutation happened since the last call. The host repaints
    /// the selection overlay when this reads true.
    pub fn take_render_dirty(&mut self) -> bool {
        std::mem::take(&mut self.render_dirty)
    }

    pub fn apply(&mut self, event: InputEvent) {
        match event {
            InputEvent::Press(x) => self.on_press(x),
            InputEvent::Move(x) => self.on_move(x),
            InputEvent::Release => self.on_release(),
            InputEvent::ZoomIn => self.zoom_in(),
            InputEvent::ZoomOut => self.zoom_out(),
        }
    }

    /// Begins a drag when the pointer lands inside the current selection.
    /// Presses outside it, or outside the plot entirely, are ignored.
    pub fn on_press(&mut self, cursor_x: Option<f64>) {
        let Some(x) = cursor_x else { return };
        if !self.range.contains(x) {
            return;
        }
        self.anchor = Some(DragAnchor {
            pointer_start: x,
            range_at_press: self.range,
        });
        debug!(x, "drag gesture started");
    }

    /// Translates the selection by the pointer delta since the press.
    /// Each bound clamps at its own domain edge independently, so a drag
    /// against an edge narrows the window instead of re-centering it.
    pub fn on_move(&mut self, cursor_x: Option<f64>) {
        let Some(anchor) = self.anchor else { return };
        // Stale event, keep the last position.
        let Some(x) = cursor_x else { return };

        let delta = x - anchor.pointer_start;
        let left = (anchor.range_at_press.left + delta).max(0.0);
        let right = (anchor.range_at_press.right + delta).min(self.domain_max);
        // Both candidates past the same edge would invert the interval;
        // collapse onto that edge instead.
        let (left, right) = if left <= right {
            (left, right)
        } else if delta < 0.0 {
            (left, left)
        } else {
            (right, right)
        };

        self.range = ViewRange::new(left, right);
        self.render_dirty = true;
        trace!(left, right, "drag moved");
    }

    /// Ends the gesture and commits the current bounds to observers. This
    /// is the one place downstream recompute is triggered; moves only
    /// repaint the overlay.
    pub fn on_release(&mut self) {
        if self.anchor.take().is_some() {
            debug!(
                left = self.range.left,
                right = self.range.right,
                "drag gesture finished"
            );
        }
        self.commit();
    }

    pub fn zoom_in(&mut self) {
        self.zoom(ZOOM_IN_FACTOR);
    }

    pub fn zoom_out(&mut self) {
        self.zoom(ZOOM_OUT_FACTOR);
    }

    fn zoom(&mut self, factor: f64) {
        let center = self.range.center();
        let left = (center - (center - self.range.left) * factor).max(0.0);
        let right = (center + (self.range.right - center) * factor).min(self.domain_max);
        self.range = ViewRange::new(left, right);
        self.render_dirty = true;
        debug!(factor, left, right, "zoom applied");
        self.commit();
    }

    /// Restores bounds from a persisted session. Does not commit: the
    /// caller already holds the bounds it is setting.
    pub fn set_bounds(&mut self, left: f64, right: f64) -> Result<(), SelectionError> {
        let valid = left.is_finite()
            && right.is_finite()
            && 0.0 <= left
            && left <= right
            && right <= self.domain_max;
        if !valid {
            warn!(left, right, "rejected restore of out-of-domain bounds");
            return Err(SelectionError::InvalidBounds {
                left,
                right,
                domain_max: self.domain_max,
            });
        }
        self.range = ViewRange::new(left, right);
        self.render_dirty = true;
        Ok(())
    }

    fn commit(&mut self) {
        self.generation += 1;
        let range = self.range;
        let generation = self.generation;
        debug!(generation, left = range.left, right = range.right, "selection committed");
        for observer in &mut self.observers {
            observer.on_selection_committed(range, generation);
        }
    }
}

/// Current playback position marker. No drag logic; an external playback
/// clock pushes positions in, the host repaints when dirty.
pub struct PlaybackCursor {
    domain_max: f64,
    position: f64,
    render_dirty: bool,
}

impl PlaybackCursor {
    pub fn new(domain_max: f64) -> Result<Self, SelectionError> {
        if !domain_max.is_finite() || domain_max <= 0.0 {
            return Err(SelectionError::EmptyDomain(domain_max));
        }
        Ok(Self {
            domain_max,
            position: 0.0,
            render_dirty: false,
        })
    }

    pub fn set_position(&mut self, x: f64) {
        self.position = x.clamp(0.0, self.domain_max);
        self.render_dirty = true;
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn take_render_dirty(&mut self) -> bool {
        std::mem::take(&mut self.render_dirty)
    }
}
