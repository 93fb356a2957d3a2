//! Core aggregation engine for Pulsemeter
//!
//! Turns a high-rate stream of combat events into live damage and healing
//! meters: rolling-window totals, current and peak rates, and an activity
//! level, all in bounded memory.
//!
//! Key constraints:
//! - Memory stays flat over arbitrarily long sessions (ring buffers, record pools)
//! - One bad event or one broken subscriber never stops ingestion
//! - Per-turn work is capped so the host's frame budget is respected
//!
//! ```rust
//! use pulsemeter_core::{EngineConfig, IngestionPipeline, MetricKind, OwnershipFlags, RawEvent};
//!
//! let mut pipeline = IngestionPipeline::new(EngineConfig::default()).unwrap();
//! pipeline.set_player("Player-1", "Thrall");
//!
//! for (ts, amount, crit) in [(1.0, 100.0, false), (2.0, 200.0, true), (3.0, 300.0, false)] {
//!     let event = RawEvent::damage(ts, "Player-1", amount)
//!         .flags(OwnershipFlags::me())
//!         .critical(crit);
//!     pipeline.ingest(event).unwrap();
//! }
//!
//! let totals = pipeline.window_totals(MetricKind::Damage, 10.0).unwrap();
//! assert_eq!((totals.total, totals.count, totals.crit_count), (600.0, 3, 1));
//! ```

#![deny(unsafe_code)]

pub mod accumulator;
pub mod buffer;
pub mod bus;
pub mod config;
pub mod constants;
pub mod entity;
pub mod errors;
pub mod events;
pub mod pipeline;
pub mod pool;
pub mod spell_cache;
pub mod time;

// Public API
pub use accumulator::{Accumulator, MetricSnapshot, WindowTotals};
pub use buffer::{BufferRegistry, RingBuffer, Sample};
pub use bus::{DispatchReport, EventBus, SubscriptionId};
pub use config::EngineConfig;
pub use entity::{Category, EntityClassifier, OwnershipFlags};
pub use errors::{PulseError, PulseResult, SubscriberError};
pub use events::{BusEvent, MetricExtra, MetricKind, RawEvent, Topic};
pub use pipeline::{Diagnostics, Disposition, IngestionPipeline, PipelineBuilder};
pub use pool::{ExhaustionPolicy, ObjectPool, PoolConfig, Poolable};
pub use time::{Clock, ManualClock, SystemClock, TimeSource, Timestamp};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_exists() {
        assert!(!VERSION.is_empty());
    }
}
