//! Maintenance Cadence and Refresh Throttling

/// Minimum interval between UI refresh publications (seconds).
///
/// Caps the display at 4 Hz regardless of how often maintenance runs.
pub const UI_REFRESH_INTERVAL_SECS: f64 = 0.25;

/// Length of one scheduling turn in event time (seconds).
///
/// A host frame at 20 Hz. The per-turn budget refills whenever event
/// timestamps move past the current turn, so throughput does not depend on
/// how often maintenance ticks run.
pub const DEFAULT_TURN_SECS: f64 = 0.05;

/// Number of completed one-second buckets retained by the event-rate meter.
pub const RATE_HISTORY_SECONDS: usize = 60;
