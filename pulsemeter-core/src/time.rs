//! Time management for the aggregation engine
//!
//! All engine timestamps are relative seconds (`f64`) from an arbitrary
//! origin, normally the moment the host started its session. This module
//! provides:
//! - [`TimeSource`]: where "now" comes from (system clock, manual clock)
//! - [`Clock`]: a monotonic view over any source that never goes backwards
//! - [`EventRateMeter`]: per-second event-rate instrumentation
//! - [`MaintenanceTimer`]: a cancellable, frequency-capped tick gate

use std::cell::Cell;
use std::time::Instant;

use heapless::HistoryBuffer;

use crate::constants::time::RATE_HISTORY_SECONDS;

/// Relative timestamp in seconds
pub type Timestamp = f64;

/// Source of time for the engine
pub trait TimeSource {
    /// Current relative time in seconds
    fn now(&self) -> Timestamp;
}

/// Monotonic system time relative to construction
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SystemClock {
    fn now(&self) -> Timestamp {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Manually driven time source for tests and replays
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<Timestamp>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self { now: Cell::new(start) }
    }

    pub fn set(&self, now: Timestamp) {
        self.now.set(now);
    }

    pub fn advance(&self, secs: f64) {
        self.now.set(self.now.get() + secs);
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.get()
    }
}

/// Monotonic engine clock
///
/// Tracks the latest time the engine has seen, either read from its source or
/// observed on an incoming event. Readings earlier than the latest known time
/// are clamped and counted, so downstream window math never sees time run
/// backwards.
pub struct Clock {
    source: Box<dyn TimeSource>,
    last_known: Timestamp,
    regressions: u64,
}

impl Clock {
    pub fn new(source: Box<dyn TimeSource>) -> Self {
        let last_known = source.now();
        Self {
            source,
            last_known,
            regressions: 0,
        }
    }

    /// Clock driven purely by observed timestamps
    pub fn driven() -> Self {
        Self::new(Box::new(ManualClock::new(0.0)))
    }

    /// Read the source and advance the clock
    pub fn now(&mut self) -> Timestamp {
        let reading = self.source.now();
        self.observe(reading)
    }

    /// Advance the clock to an externally observed timestamp
    ///
    /// Returns the clock's time after the observation, which is never less
    /// than before it.
    pub fn observe(&mut self, timestamp: Timestamp) -> Timestamp {
        if !timestamp.is_finite() {
            return self.last_known;
        }
        if timestamp < self.last_known {
            self.regressions += 1;
            log::trace!(
                "clock regression: {timestamp:.3}s < {:.3}s, clamped",
                self.last_known
            );
        } else {
            self.last_known = timestamp;
        }
        self.last_known
    }

    /// Latest known time without reading the source
    pub fn last_known(&self) -> Timestamp {
        self.last_known
    }

    /// Number of readings that would have moved time backwards
    pub fn regressions(&self) -> u64 {
        self.regressions
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new(Box::new(SystemClock::new()))
    }
}

/// Per-second event-rate instrumentation
///
/// Events are counted into whole-second buckets. When time crosses into a
/// new second the finished bucket is pushed into a bounded history; seconds
/// that pass with no events are recorded as zero.
pub struct EventRateMeter {
    current_second: Option<i64>,
    current_count: u32,
    history: HistoryBuffer<u32, RATE_HISTORY_SECONDS>,
    peak_per_second: u32,
    total: u64,
}

impl EventRateMeter {
    pub fn new() -> Self {
        Self {
            current_second: None,
            current_count: 0,
            history: HistoryBuffer::new(),
            peak_per_second: 0,
            total: 0,
        }
    }

    /// Count one event at `now`
    pub fn record(&mut self, now: Timestamp) {
        self.roll_to(now);
        self.current_count = self.current_count.saturating_add(1);
        self.total += 1;
    }

    /// Close out any seconds that ended before `now`
    pub fn roll_to(&mut self, now: Timestamp) {
        if !now.is_finite() {
            return;
        }
        let second = now.floor() as i64;
        let Some(current) = self.current_second else {
            self.current_second = Some(second);
            return;
        };
        if second <= current {
            return;
        }

        self.close_bucket(self.current_count);
        // Seconds with no events at all, capped by what the history can hold
        let gap = ((second - current - 1) as usize).min(RATE_HISTORY_SECONDS);
        for _ in 0..gap {
            self.close_bucket(0);
        }
        self.current_second = Some(second);
        self.current_count = 0;
    }

    fn close_bucket(&mut self, count: u32) {
        self.history.write(count);
        self.peak_per_second = self.peak_per_second.max(count);
    }

    /// Events counted in the last completed second
    pub fn events_per_second(&self) -> u32 {
        self.history.recent().copied().unwrap_or(0)
    }

    /// Highest completed-second count observed
    pub fn peak_events_per_second(&self) -> u32 {
        self.peak_per_second
    }

    /// Events counted so far in the still-open second
    pub fn in_progress(&self) -> u32 {
        self.current_count
    }

    /// Completed-second counts, oldest first
    pub fn history(&self) -> impl Iterator<Item = u32> + '_ {
        self.history.oldest_ordered().copied()
    }

    /// Total events ever recorded
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for EventRateMeter {
    fn default() -> Self {
        Self::new()
    }
}

/// Frequency-capped maintenance gate
///
/// The host polls this from whatever loop it owns; `poll` answers whether a
/// maintenance tick is due. Cancelling stops future ticks and never
/// interrupts one that is already running.
#[derive(Debug, Clone)]
pub struct MaintenanceTimer {
    interval: f64,
    next_due: Option<Timestamp>,
    cancelled: bool,
    fired: u64,
}

impl MaintenanceTimer {
    /// Create a timer firing at most once per `interval` seconds
    pub fn new(interval: f64) -> Self {
        Self {
            interval: interval.max(0.0),
            next_due: None,
            cancelled: false,
            fired: 0,
        }
    }

    /// Returns true when a tick should run at `now`
    pub fn poll(&mut self, now: Timestamp) -> bool {
        if self.cancelled || !now.is_finite() {
            return false;
        }
        match self.next_due {
            Some(due) if now < due => false,
            _ => {
                self.next_due = Some(now + self.interval);
                self.fired += 1;
                true
            }
        }
    }

    /// Stop all future ticks
    pub fn cancel(&mut self) {
        if !self.cancelled {
            log::debug!("maintenance timer cancelled after {} ticks", self.fired);
        }
        self.cancelled = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Ticks granted so far
    pub fn fired(&self) -> u64 {
        self.fired
    }

    pub fn interval(&self) -> f64 {
        self.interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(10.0);
        assert_eq!(clock.now(), 10.0);

        clock.advance(0.5);
        assert_eq!(clock.now(), 10.5);
    }

    #[test]
    fn clock_never_goes_backwards() {
        let mut clock = Clock::driven();
        assert_eq!(clock.observe(5.0), 5.0);
        assert_eq!(clock.observe(3.0), 5.0);
        assert_eq!(clock.regressions(), 1);
        assert_eq!(clock.observe(f64::NAN), 5.0);
        assert_eq!(clock.observe(6.0), 6.0);
    }

    #[test]
    fn rate_meter_buckets_whole_seconds() {
        let mut meter = EventRateMeter::new();
        for t in [0.1, 0.2, 0.9] {
            meter.record(t);
        }
        assert_eq!(meter.in_progress(), 3);
        assert_eq!(meter.events_per_second(), 0);

        meter.record(1.5);
        assert_eq!(meter.events_per_second(), 3);
        assert_eq!(meter.in_progress(), 1);

        // Skip two empty seconds
        meter.record(4.0);
        let history: Vec<u32> = meter.history().collect();
        assert_eq!(history, vec![3, 1, 0, 0]);
        assert_eq!(meter.peak_events_per_second(), 3);
        assert_eq!(meter.total(), 5);
    }

    #[test]
    fn rate_meter_caps_long_gaps() {
        let mut meter = EventRateMeter::new();
        meter.record(0.0);
        meter.record(10_000.0);
        assert_eq!(meter.history().count(), RATE_HISTORY_SECONDS);
    }

    #[test]
    fn maintenance_timer_caps_frequency() {
        let mut timer = MaintenanceTimer::new(0.25);
        assert!(timer.poll(0.0));
        assert!(!timer.poll(0.1));
        assert!(timer.poll(0.25));
        assert!(!timer.poll(0.3));
        assert_eq!(timer.fired(), 2);

        timer.cancel();
        assert!(!timer.poll(10.0));
        assert!(timer.is_cancelled());
    }
}
