//! Rolling Window and Decay Parameters

/// Trailing window used for the "current" rate (seconds).
///
/// Five seconds smooths over global cooldown gaps while still reacting to
/// burst phases.
pub const CURRENT_RATE_WINDOW_SECS: f64 = 5.0;

/// Multiplicative peak decay applied per elapsed second.
///
/// At 0.98/s a peak halves after ~34 seconds of inactivity.
pub const PEAK_DECAY_PER_SEC: f64 = 0.98;

/// Time after the last event at which activity reaches zero (seconds).
pub const ACTIVITY_WINDOW_SECS: f64 = 3.0;
