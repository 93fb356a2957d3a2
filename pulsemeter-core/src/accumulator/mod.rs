//! Metric Accumulators
//!
//! ## Overview
//!
//! An accumulator turns a stream of amounts into the numbers a meter shows:
//! all-time totals, a trailing "current" rate, a decaying peak, and an
//! activity level that fades after the last event.
//!
//! ```text
//! Observation ──→ AccumulatorState (totals, hits, crits, biggest hit)
//!       │
//!       └──────→ RingBuffer<EventTag> ──→ window_totals(window, now)
//!                                              │
//!                update_current_values(now) ───┴──→ current rate ──→ PeakTracker
//! ```
//!
//! ## Composition
//!
//! The base behavior lives once, in [`RollingAccumulator`]. Kind-specific
//! bookkeeping is a [`MetricExtension`] plugged into it:
//!
//! - [`DamageExtension`]: absorbed, blocked and overkill totals
//! - [`HealingExtension`]: overhealing, absorbed, effective healing
//!
//! Extensions only add fields. The base totals, window sums and rates are
//! identical for every kind.
//!
//! ## Window Semantics
//!
//! Window queries cover `[now - window, now]`, both ends inclusive, and only
//! see what is still in the ring buffer. When the buffer wraps inside a
//! window the oldest samples are gone and the window sum under-reports. The
//! all-time totals in [`AccumulatorState`] never lose events.

mod damage;
mod healing;
mod peak;
mod rolling;

pub use damage::{DamageAccumulator, DamageExtension};
pub use healing::{HealingAccumulator, HealingExtension, HealingTotals};
pub use peak::{activity_level, PeakTracker};
pub use rolling::{EventTag, MetricExtension, NoExtension, RollingAccumulator};

use heapless::Vec as ExtraVec;
use serde::Serialize;

use crate::buffer::BufferStats;
use crate::constants::buffers::MAX_SNAPSHOT_EXTRAS;
use crate::entity::Category;
use crate::events::{MetricExtra, MetricKind};
use crate::time::Timestamp;

/// One event as seen by an accumulator
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation<'a> {
    pub timestamp: Timestamp,
    pub source_id: &'a str,
    pub amount: f64,
    pub category: Category,
    pub is_critical: bool,
    pub extra: MetricExtra,
}

impl Observation<'_> {
    /// Event came from the local player
    pub fn is_self(&self) -> bool {
        self.category == Category::Player
    }

    /// Event came from a pet or guardian
    pub fn is_pet(&self) -> bool {
        self.category.is_minion()
    }
}

/// Sums over a trailing window
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct WindowTotals {
    pub window_secs: f64,
    pub total: f64,
    pub count: usize,
    pub crit_count: usize,
    pub player_total: f64,
    pub pet_total: f64,
    /// `total / window_secs`, zero for an empty window length
    pub rate: f64,
}

/// Running state shared by every accumulator kind
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccumulatorState {
    pub total: f64,
    pub player_total: f64,
    pub pet_total: f64,
    pub hit_count: u64,
    pub crit_count: u64,
    /// Sum of critical amounts
    pub crit_total: f64,
    pub biggest_hit: f64,
    pub current_rate: f64,
    pub peak: PeakTracker,
    pub first_event_time: Option<Timestamp>,
    pub last_event_time: Option<Timestamp>,
}

impl AccumulatorState {
    pub fn new(peak_decay_per_sec: f64) -> Self {
        Self {
            total: 0.0,
            player_total: 0.0,
            pet_total: 0.0,
            hit_count: 0,
            crit_count: 0,
            crit_total: 0.0,
            biggest_hit: 0.0,
            current_rate: 0.0,
            peak: PeakTracker::new(peak_decay_per_sec),
            first_event_time: None,
            last_event_time: None,
        }
    }

    /// Back to the freshly created state, keeping the decay setting
    pub fn reset(&mut self) {
        self.total = 0.0;
        self.player_total = 0.0;
        self.pet_total = 0.0;
        self.hit_count = 0;
        self.crit_count = 0;
        self.crit_total = 0.0;
        self.biggest_hit = 0.0;
        self.current_rate = 0.0;
        self.peak.reset();
        self.first_event_time = None;
        self.last_event_time = None;
    }

    pub fn peak_rate(&self) -> f64 {
        self.peak.peak()
    }

    /// Share of hits that were critical, in percent
    pub fn crit_pct(&self) -> f64 {
        if self.hit_count == 0 {
            0.0
        } else {
            self.crit_count as f64 * 100.0 / self.hit_count as f64
        }
    }

    /// Seconds from the first event to `now`
    pub fn active_secs(&self, now: Timestamp) -> f64 {
        self.first_event_time.map_or(0.0, |first| (now - first).max(0.0))
    }
}

/// Everything a display needs for one metric, at one point in time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSnapshot {
    pub kind: MetricKind,
    pub timestamp: Timestamp,
    pub total: f64,
    pub player_total: f64,
    pub pet_total: f64,
    pub current_rate: f64,
    pub peak_rate: f64,
    /// Total over the time since the first event
    pub average_rate: f64,
    pub activity: f64,
    pub hit_count: u64,
    pub crit_count: u64,
    pub crit_pct: f64,
    pub biggest_hit: f64,
    /// Kind-specific values contributed by the extension
    pub extras: ExtraVec<(&'static str, f64), MAX_SNAPSHOT_EXTRAS>,
}

impl MetricSnapshot {
    /// Attach a kind-specific value; silently dropped once the snapshot is full
    pub fn push_extra(&mut self, name: &'static str, value: f64) {
        if self.extras.push((name, value)).is_err() {
            log::trace!("snapshot extras full, dropped '{name}'");
        }
    }

    pub fn extra(&self, name: &str) -> Option<f64> {
        self.extras
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| *value)
    }
}

/// A per-metric aggregator
///
/// The pipeline stores these as `Box<dyn Accumulator>` keyed by
/// [`MetricKind`], so a host can register its own implementation for a
/// kind.
pub trait Accumulator {
    fn kind(&self) -> MetricKind;

    /// Fold one event into the totals and the window buffer
    ///
    /// Non-finite or negative amounts are ignored.
    fn add_event(&mut self, observation: &Observation<'_>);

    /// Sums over `[now - window_secs, now]`
    fn window_totals(&self, window_secs: f64, now: Timestamp) -> WindowTotals;

    /// Recompute the current rate and fold it into the peak
    fn update_current_values(&mut self, now: Timestamp);

    fn current_rate(&self) -> f64;

    fn peak_rate(&self) -> f64;

    /// 1.0 right after an event, falling linearly to 0.0
    fn activity_level(&self, now: Timestamp) -> f64;

    fn state(&self) -> &AccumulatorState;

    fn snapshot(&self, now: Timestamp) -> MetricSnapshot;

    fn buffer_stats(&self) -> BufferStats;

    /// Clear totals, window history, peak and extension state
    fn reset(&mut self);
}
