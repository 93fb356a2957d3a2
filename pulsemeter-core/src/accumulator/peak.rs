//! Peak decay and activity level

use serde::Serialize;

use crate::time::Timestamp;

/// Decaying maximum of a rate
///
/// Each update computes `peak = max(current, peak * decay^elapsed)`, so a
/// burst stays visible for a while and then fades instead of pinning the
/// display forever.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PeakTracker {
    peak: f64,
    last_update: Option<Timestamp>,
    decay_per_sec: f64,
}

impl PeakTracker {
    pub fn new(decay_per_sec: f64) -> Self {
        Self {
            peak: 0.0,
            last_update: None,
            decay_per_sec,
        }
    }

    /// Fold the current rate into the peak at `now`
    ///
    /// Updates with `now` earlier than the previous one apply no decay.
    pub fn observe(&mut self, current: f64, now: Timestamp) -> f64 {
        let elapsed = match self.last_update {
            Some(last) if now > last => now - last,
            _ => 0.0,
        };
        let decayed = self.peak * self.decay_per_sec.powf(elapsed);
        if current.is_finite() {
            self.peak = current.max(decayed);
        } else {
            self.peak = decayed;
        }
        self.last_update = Some(self.last_update.map_or(now, |last| last.max(now)));
        self.peak
    }

    pub fn peak(&self) -> f64 {
        self.peak
    }

    pub fn last_update(&self) -> Option<Timestamp> {
        self.last_update
    }

    pub fn reset(&mut self) {
        self.peak = 0.0;
        self.last_update = None;
    }
}

/// Linear fade from 1.0 at the last event to 0.0 after `window_secs`
pub fn activity_level(last_event: Option<Timestamp>, now: Timestamp, window_secs: f64) -> f64 {
    let Some(last) = last_event else {
        return 0.0;
    };
    if window_secs <= 0.0 {
        return 0.0;
    }
    (1.0 - (now - last).max(0.0) / window_secs).clamp(0.0, 1.0)
}
