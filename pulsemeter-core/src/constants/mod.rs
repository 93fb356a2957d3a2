//! Constants for Pulsemeter Core
//!
//! Centralized, documented tuning values used throughout the engine. Every
//! default that [`crate::config::EngineConfig`] falls back to lives here.
//!
//! ## Organization
//!
//! Constants are grouped by domain:
//! - **Buffers**: Ring buffer capacities and queue bounds
//! - **Pools**: Object pool sizes and canonical pool names
//! - **Rates**: Rolling-window lengths, peak decay, activity decay
//! - **Time**: Maintenance cadence and refresh throttling
//!
//! ## Usage Guidelines
//!
//! 1. Always use these constants instead of magic numbers
//! 2. Include units in the name (`_SECS`, `_PER_SEC`)
//! 3. Document the sizing rationale next to the value

/// Ring buffer capacities and pending-queue bounds.
pub mod buffers;

/// Object pool sizes and the canonical pool names.
pub mod pools;

/// Rolling-window and decay parameters for accumulators.
pub mod rates;

/// Maintenance cadence and refresh throttling.
pub mod time;

pub use buffers::{
    DAMAGE_BUFFER_CAPACITY, HEALING_BUFFER_CAPACITY,
    DEFAULT_PENDING_QUEUE_BOUND, DEFAULT_EVENTS_PER_TURN, SPELL_CACHE_CAPACITY,
};

pub use pools::{
    DAMAGE_EVENT_POOL, HEALING_EVENT_POOL, COMBAT_STATE_EVENT_POOL,
    DEFAULT_POOL_CAPACITY, KNOWN_POOL_NAMES,
};

pub use rates::{
    CURRENT_RATE_WINDOW_SECS, PEAK_DECAY_PER_SEC, ACTIVITY_WINDOW_SECS,
};

pub use time::{
    UI_REFRESH_INTERVAL_SECS, DEFAULT_TURN_SECS,
};
