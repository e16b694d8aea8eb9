//! Progressive realization of the gallery grid.
//!
//! Only a prefix of the ordered collection is materialized at any time. The
//! prefix grows by a fixed increment whenever an invisible sentinel placed
//! after the last realized image comes within `margin_px` of the viewport.
//! This is batch growth, not virtualization: realized items stay realized.
//! Collections are hundreds of images, not hundreds of thousands, so the
//! off-screen cost is acceptable.
//!
//! ```text
//!            grow (visible + increment < total)
//!           ┌────────┐
//!           ▼        │
//!   load ─▶ Growing ─┴─ grow (clamped to total) ─▶ Complete
//!           ▲                                         │
//!           └────────── load (new collection) ────────┘
//! ```
//!
//! Viewport detection is a subscription: [`WindowController::bind_sentinel`]
//! hands out a [`SentinelBinding`] the host feeds with viewport geometry.
//! Dropping the binding unsubscribes it. Loading a different collection makes
//! existing bindings stale; the host must bind again for the new sentinel.

use crate::config::WindowConfig;
use std::ops::Range;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    Growing,
    Complete,
}

/// The realized prefix of one collection.
#[derive(Debug, Clone)]
pub struct VisibleWindow {
    collection: Option<String>,
    total: usize,
    visible: usize,
    initial: usize,
    increment: usize,
}

impl VisibleWindow {
    pub fn new(config: &WindowConfig) -> Self {
        Self {
            collection: None,
            total: 0,
            visible: 0,
            initial: config.initial.max(1),
            increment: config.increment.max(1),
        }
    }

    /// Point the window at a collection. Resets to the initial increment when
    /// the collection identity or its size changed; returns whether it did.
    pub fn load(&mut self, collection_id: &str, total: usize) -> bool {
        if self.collection.as_deref() == Some(collection_id) && self.total == total {
            return false;
        }
        self.collection = Some(collection_id.to_string());
        self.total = total;
        self.visible = self.initial.min(total);
        true
    }

    /// Sentinel came near: realize the next batch. Returns whether it grew.
    pub fn grow(&mut self) -> bool {
        if self.state() == WindowState::Complete {
            return false;
        }
        self.visible = (self.visible + self.increment).min(self.total);
        true
    }

    pub fn state(&self) -> WindowState {
        if self.visible >= self.total {
            WindowState::Complete
        } else {
            WindowState::Growing
        }
    }

    pub fn visible_count(&self) -> usize {
        self.visible
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn collection(&self) -> Option<&str> {
        self.collection.as_deref()
    }

    /// Indices of the realized images.
    pub fn visible_range(&self) -> Range<usize> {
        0..self.visible
    }

    /// Whether the sentinel is rendered at all (only while growing).
    pub fn has_sentinel(&self) -> bool {
        self.state() == WindowState::Growing
    }
}

/// Vertical geometry of the scroll container, in logical pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub scroll_top: f64,
    pub height: f64,
}

impl Viewport {
    /// Whether an element at `top` lies in the viewport grown by `margin` on both edges.
    pub fn is_near(&self, top: f64, margin: f64) -> bool {
        top >= self.scroll_top - margin && top <= self.scroll_top + self.height + margin
    }
}

/// Outcome of feeding one viewport report into a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentinelSignal {
    /// The window grew to this many visible images.
    Grew(usize),
    /// Sentinel not near the viewport.
    Idle,
    /// Nothing left to realize.
    Complete,
    /// The binding belongs to a previous collection.
    Stale,
}

/// Read-only view of the window for rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSnapshot {
    pub visible: usize,
    pub total: usize,
    pub state: WindowState,
}

#[derive(Debug)]
struct Shared {
    window: VisibleWindow,
    generation: u64,
    bindings: usize,
}

/// Owns the [`VisibleWindow`] of one gallery view and its sentinel bindings.
#[derive(Debug, Clone)]
pub struct WindowController {
    shared: Arc<Mutex<Shared>>,
    margin: f64,
}

impl WindowController {
    pub fn new(config: &WindowConfig) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared {
                window: VisibleWindow::new(config),
                generation: 0,
                bindings: 0,
            })),
            margin: f64::from(config.margin_px),
        }
    }

    /// Load a collection. A reset invalidates every existing binding.
    pub fn load(&self, collection_id: &str, total: usize) {
        let mut shared = lock(&self.shared);
        if shared.window.load(collection_id, total) {
            shared.generation += 1;
            debug!(
                collection = collection_id,
                total,
                visible = shared.window.visible_count(),
                "Window reset"
            );
        }
    }

    /// Subscribe a sentinel for the currently loaded collection.
    pub fn bind_sentinel(&self) -> SentinelBinding {
        let mut shared = lock(&self.shared);
        shared.bindings += 1;
        SentinelBinding {
            shared: Arc::clone(&self.shared),
            generation: shared.generation,
            margin: self.margin,
        }
    }

    pub fn snapshot(&self) -> WindowSnapshot {
        let shared = lock(&self.shared);
        WindowSnapshot {
            visible: shared.window.visible_count(),
            total: shared.window.total(),
            state: shared.window.state(),
        }
    }

    /// Number of bindings not yet dropped, stale ones included.
    pub fn live_bindings(&self) -> usize {
        lock(&self.shared).bindings
    }
}

/// A live viewport-proximity subscription for one sentinel.
///
/// Must be dropped when the view that owns the sentinel goes away.
#[derive(Debug)]
pub struct SentinelBinding {
    shared: Arc<Mutex<Shared>>,
    generation: u64,
    margin: f64,
}

impl SentinelBinding {
    /// Report where the sentinel sits relative to the viewport.
    ///
    /// Each report that finds the sentinel near grows the window once; after
    /// growing, the host re-renders and the sentinel moves down, so the next
    /// report is judged against its new position.
    pub fn observe(&self, viewport: &Viewport, sentinel_top: f64) -> SentinelSignal {
        let mut shared = lock(&self.shared);
        if shared.generation != self.generation {
            return SentinelSignal::Stale;
        }
        if shared.window.state() == WindowState::Complete {
            return SentinelSignal::Complete;
        }
        if !viewport.is_near(sentinel_top, self.margin) {
            trace!(sentinel_top, ?viewport, "Sentinel not near viewport");
            return SentinelSignal::Idle;
        }
        shared.window.grow();
        let visible = shared.window.visible_count();
        debug!(visible, total = shared.window.total(), "Window grew");
        SentinelSignal::Grew(visible)
    }

    pub fn is_stale(&self) -> bool {
        lock(&self.shared).generation != self.generation
    }
}

impl Drop for SentinelBinding {
    fn drop(&mut self) {
        let mut shared = lock(&self.shared);
        shared.bindings = shared.bindings.saturating_sub(1);
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
