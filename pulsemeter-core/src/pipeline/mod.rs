//! Ingestion Pipeline
//!
//! ## Overview
//!
//! The pipeline is the engine's single entry point. It takes normalized
//! [`RawEvent`](crate::events::RawEvent)s from the host and runs each one
//! through the same steps:
//!
//! ```text
//! ingest(raw)
//!    │  unregistered kind? ──→ Err(UnregisteredMetric)
//!    │  new turn? ──→ refill budget, drain pending queue first
//!    │  turn budget spent? ──→ pending queue ──→ next turn
//!    ▼
//! validate ──→ classify ──→ accumulator.add_event ──→ pool.lease ──→ bus.publish ──→ release
//!    │            │
//!    │            └──→ first owned pet/guardian ──→ ENTITY_DETECTED
//!    └──→ malformed: skipped and counted
//! ```
//!
//! `tick(now)` is the host's heartbeat. It grants a fresh turn budget,
//! drains deferred events, recomputes current and peak rates, evicts the
//! spell cache, and publishes a throttled UI refresh.
//!
//! ## Turn Budget
//!
//! At most `events_per_turn` events are processed per turn. A turn is
//! `turn_secs` of event time: the first event stamped that far past the
//! current turn's start opens the next one. `tick` and `begin_turn` open a
//! turn too. Each new turn drains the pending queue before taking new work,
//! so throughput follows event time rather than tick frequency.
//!
//! Events over budget wait in a bounded pending queue; when it is full the configured
//! [`BackpressureStrategy`](crate::config::BackpressureStrategy) decides
//! which event is dropped. Events are always processed in arrival order.
//!
//! ## Failure Handling
//!
//! The only error `ingest` returns is a configuration error: an event for a
//! metric kind with no registered accumulator. Malformed events, exhausted
//! pools, and failing subscribers are absorbed and show up in
//! [`PipelineStats`] and [`Diagnostics`].
//!
//! ## Module Organization
//!
//! - Core types and counters (this file)
//! - `ingest` - The [`IngestionPipeline`] itself
//! - `builder` - [`PipelineBuilder`] for assembling one

mod builder;
mod ingest;

pub use builder::PipelineBuilder;
pub use ingest::IngestionPipeline;

use serde::Serialize;

use crate::accumulator::{Accumulator, MetricSnapshot};
use crate::buffer::BufferStats;
use crate::bus::BusStats;
use crate::errors::SubscriberError;
use crate::pool::PoolStats;
use crate::spell_cache::SpellCacheStats;

/// Downstream consumer of one metric's snapshots, called on every UI refresh
pub type SnapshotSink = Box<dyn FnMut(&MetricSnapshot) -> Result<(), SubscriberError>>;

/// Registry entry for one metric kind
pub(crate) struct MetricRoute {
    pub(crate) accumulator: Box<dyn Accumulator>,
    pub(crate) sink: Option<SnapshotSink>,
}

/// What `ingest` did with an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Handled within this turn's budget
    Processed,
    /// Queued for a later turn
    Deferred,
    /// Dropped because the pending queue was full
    Dropped,
    /// Pipeline is shut down
    Rejected,
}

/// Pipeline counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PipelineStats {
    /// Events accepted by `ingest`
    pub received: u64,
    /// Events that reached an accumulator
    pub processed: u64,
    pub deferred: u64,
    /// Events lost to backpressure
    pub dropped: u64,
    pub malformed: u64,
    /// Events skipped because their source is not owned
    pub unowned: u64,
    /// Deferred events whose metric was unregistered before they ran
    pub unroutable: u64,
    /// Publications skipped because a pool refused a record
    pub publish_skipped: u64,
    pub entities_detected: u64,
    pub refreshes: u64,
    pub sink_failures: u64,
    pub ticks: u64,
    pub max_pending: usize,
    pub rejected_after_shutdown: u64,
}

/// Outcome of one `tick`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickReport {
    /// Deferred events processed this tick
    pub drained: usize,
    /// Events still waiting
    pub pending: usize,
    pub refreshed: bool,
    pub evicted_spells: usize,
}

/// Everything observable about a running pipeline
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostics {
    pub pipeline: PipelineStats,
    pub pools: Vec<PoolStats>,
    pub buffers: Vec<BufferStats>,
    pub bus: BusStats,
    pub spell_cache: SpellCacheStats,
    pub events_per_second: u32,
    pub peak_events_per_second: u32,
    pub clock_regressions: u64,
    pub pending: usize,
    pub in_combat: bool,
    pub tracked_entities: usize,
}
