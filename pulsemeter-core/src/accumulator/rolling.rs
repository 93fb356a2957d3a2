//! Rolling-window accumulator shared by every metric kind

use crate::buffer::{BufferStats, RingBuffer};
use crate::config::RateConfig;
use crate::entity::Category;
use crate::events::MetricKind;
use crate::time::Timestamp;

use super::peak::activity_level;
use super::{Accumulator, AccumulatorState, MetricSnapshot, Observation, WindowTotals};

/// Per-sample data kept in the window buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventTag {
    pub category: Category,
    pub critical: bool,
}

/// Kind-specific bookkeeping layered on a [`RollingAccumulator`]
pub trait MetricExtension {
    fn on_event(&mut self, _observation: &Observation<'_>) {}

    /// Add kind-specific values to a snapshot taken at `snapshot.timestamp`
    fn decorate(&self, _snapshot: &mut MetricSnapshot) {}

    fn reset(&mut self) {}
}

/// No kind-specific state
#[derive(Debug, Clone, Copy, Default)]
pub struct NoExtension;

impl MetricExtension for NoExtension {}

/// Totals plus a ring buffer of recent events
pub struct RollingAccumulator<E: MetricExtension = NoExtension> {
    kind: MetricKind,
    rates: RateConfig,
    state: AccumulatorState,
    buffer: RingBuffer<EventTag>,
    extension: E,
}

impl<E: MetricExtension> RollingAccumulator<E> {
    pub fn new(kind: MetricKind, capacity: usize, rates: RateConfig, extension: E) -> Self {
        log::debug!(
            "{kind} accumulator: {capacity} samples, {:.1}s current window",
            rates.current_window_secs
        );
        Self {
            kind,
            rates,
            state: AccumulatorState::new(rates.peak_decay_per_sec),
            buffer: RingBuffer::new(capacity, kind.name()),
            extension,
        }
    }

    pub fn extension(&self) -> &E {
        &self.extension
    }

    pub fn buffer(&self) -> &RingBuffer<EventTag> {
        &self.buffer
    }

    pub fn rates(&self) -> &RateConfig {
        &self.rates
    }
}

impl<E: MetricExtension> Accumulator for RollingAccumulator<E> {
    fn kind(&self) -> MetricKind {
        self.kind
    }

    fn add_event(&mut self, observation: &Observation<'_>) {
        let amount = observation.amount;
        if !amount.is_finite() || amount < 0.0 || !observation.timestamp.is_finite() {
            log::warn!(
                "{} accumulator ignored malformed amount {amount} from '{}'",
                self.kind,
                observation.source_id
            );
            return;
        }

        let state = &mut self.state;
        state.total += amount;
        if observation.is_self() {
            state.player_total += amount;
        } else if observation.is_pet() {
            state.pet_total += amount;
        }
        state.hit_count += 1;
        if observation.is_critical {
            state.crit_count += 1;
            state.crit_total += amount;
        }
        state.biggest_hit = state.biggest_hit.max(amount);

        let ts = observation.timestamp;
        state.first_event_time.get_or_insert(ts);
        state.last_event_time = Some(state.last_event_time.map_or(ts, |last| last.max(ts)));

        self.buffer.write(
            ts,
            amount,
            Some(EventTag {
                category: observation.category,
                critical: observation.is_critical,
            }),
        );
        self.extension.on_event(observation);
    }

    fn window_totals(&self, window_secs: f64, now: Timestamp) -> WindowTotals {
        let window = if window_secs.is_finite() { window_secs.max(0.0) } else { 0.0 };
        let mut totals = WindowTotals {
            window_secs: window,
            ..Default::default()
        };
        for sample in self.buffer.query_window(now - window, now) {
            totals.total += sample.value;
            totals.count += 1;
            if let Some(tag) = sample.payload {
                if tag.critical {
                    totals.crit_count += 1;
                }
                match tag.category {
                    Category::Player => totals.player_total += sample.value,
                    Category::Pet | Category::Guardian => totals.pet_total += sample.value,
                    Category::Unknown => {}
                }
            }
        }
        if window > 0.0 {
            totals.rate = totals.total / window;
        }
        totals
    }

    fn update_current_values(&mut self, now: Timestamp) {
        let current = self.window_totals(self.rates.current_window_secs, now).rate;
        self.state.current_rate = current;
        self.state.peak.observe(current, now);
    }

    fn current_rate(&self) -> f64 {
        self.state.current_rate
    }

    fn peak_rate(&self) -> f64 {
        self.state.peak_rate()
    }

    fn activity_level(&self, now: Timestamp) -> f64 {
        activity_level(self.state.last_event_time, now, self.rates.activity_window_secs)
    }

    fn state(&self) -> &AccumulatorState {
        &self.state
    }

    fn snapshot(&self, now: Timestamp) -> MetricSnapshot {
        let state = &self.state;
        let active = state.active_secs(now);
        let mut snapshot = MetricSnapshot {
            kind: self.kind,
            timestamp: now,
            total: state.total,
            player_total: state.player_total,
            pet_total: state.pet_total,
            current_rate: state.current_rate,
            peak_rate: state.peak_rate(),
            average_rate: if active > 0.0 { state.total / active } else { 0.0 },
            activity: self.activity_level(now),
            hit_count: state.hit_count,
            crit_count: state.crit_count,
            crit_pct: state.crit_pct(),
            biggest_hit: state.biggest_hit,
            extras: Default::default(),
        };
        self.extension.decorate(&mut snapshot);
        snapshot
    }

    fn buffer_stats(&self) -> BufferStats {
        self.buffer.stats()
    }

    fn reset(&mut self) {
        log::debug!(
            "{} accumulator reset after {} events ({:.0} total)",
            self.kind,
            self.state.hit_count,
            self.state.total
        );
        self.state.reset();
        self.buffer.clear();
        self.extension.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MetricExtra;
    use proptest::prelude::*;

    fn accumulator(capacity: usize) -> RollingAccumulator {
        RollingAccumulator::new(MetricKind::Damage, capacity, RateConfig::default(), NoExtension)
    }

    fn observe(ts: f64, amount: f64, category: Category, crit: bool) -> Observation<'static> {
        Observation {
            timestamp: ts,
            source_id: "src",
            amount,
            category,
            is_critical: crit,
            extra: MetricExtra::None,
        }
    }

    #[test]
    fn totals_split_by_owner() {
        let mut acc = accumulator(16);
        acc.add_event(&observe(0.0, 100.0, Category::Player, false));
        acc.add_event(&observe(1.0, 40.0, Category::Pet, true));
        acc.add_event(&observe(2.0, 10.0, Category::Guardian, false));
        acc.add_event(&observe(3.0, 5.0, Category::Unknown, false));

        let state = acc.state();
        assert_eq!(state.total, 155.0);
        assert_eq!(state.player_total, 100.0);
        assert_eq!(state.pet_total, 50.0);
        assert_eq!(state.crit_count, 1);
        assert_eq!(state.crit_total, 40.0);
        assert_eq!(state.biggest_hit, 100.0);
        assert_eq!(state.first_event_time, Some(0.0));
        assert_eq!(state.last_event_time, Some(3.0));
    }

    #[test]
    fn window_totals_cover_trailing_window() {
        let mut acc = accumulator(16);
        for t in 0..10 {
            acc.add_event(&observe(t as f64, 100.0, Category::Player, t % 2 == 0));
        }
        let totals = acc.window_totals(4.0, 9.0);
        // Samples at 5, 6, 7, 8, 9
        assert_eq!(totals.count, 5);
        assert_eq!(totals.total, 500.0);
        assert_eq!(totals.crit_count, 2);
        assert_eq!(totals.rate, 125.0);
    }

    #[test]
    fn zero_window_has_zero_rate() {
        let mut acc = accumulator(4);
        acc.add_event(&observe(1.0, 50.0, Category::Player, false));
        let totals = acc.window_totals(0.0, 1.0);
        assert_eq!(totals.count, 1);
        assert_eq!(totals.rate, 0.0);
    }

    #[test]
    fn totals_survive_buffer_wrap() {
        let mut acc = accumulator(3);
        for t in 0..10 {
            acc.add_event(&observe(t as f64, 10.0, Category::Player, false));
        }
        assert_eq!(acc.state().total, 100.0);
        assert_eq!(acc.window_totals(100.0, 9.0).count, 3);
        assert_eq!(acc.buffer_stats().overwrites, 7);
    }

    #[test]
    fn current_rate_feeds_peak() {
        let mut acc = accumulator(64);
        for t in 0..5 {
            acc.add_event(&observe(t as f64, 1000.0, Category::Player, false));
        }
        acc.update_current_values(4.0);
        assert_eq!(acc.current_rate(), 1000.0);
        assert_eq!(acc.peak_rate(), 1000.0);

        // Nothing in the window ten seconds later; peak decays
        acc.update_current_values(14.0);
        assert_eq!(acc.current_rate(), 0.0);
        let expected = 1000.0 * 0.98f64.powf(10.0);
        assert!((acc.peak_rate() - expected).abs() < 1e-9);
    }

    #[test]
    fn malformed_amounts_are_ignored() {
        let mut acc = accumulator(4);
        acc.add_event(&observe(0.0, f64::NAN, Category::Player, false));
        acc.add_event(&observe(0.0, -1.0, Category::Player, false));
        assert_eq!(acc.state().hit_count, 0);
        assert!(acc.buffer().is_empty());
    }

    #[test]
    fn reset_clears_everything() {
        let mut acc = accumulator(4);
        acc.add_event(&observe(0.0, 100.0, Category::Player, true));
        acc.update_current_values(0.0);
        acc.reset();

        assert_eq!(acc.state().total, 0.0);
        assert_eq!(acc.peak_rate(), 0.0);
        assert!(acc.buffer().is_empty());
        assert_eq!(acc.activity_level(0.0), 0.0);

        // Usable again straight away
        acc.add_event(&observe(10.0, 10.0, Category::Player, false));
        acc.update_current_values(10.0);
        assert_eq!(acc.state().total, 10.0);
        assert_eq!(acc.state().hit_count, 1);
        assert_eq!(acc.current_rate(), 2.0);
        assert_eq!(acc.peak_rate(), 2.0);
        assert_eq!(acc.activity_level(10.0), 1.0);
    }

    #[test]
    fn snapshot_reports_averages() {
        let mut acc = accumulator(8);
        acc.add_event(&observe(0.0, 300.0, Category::Player, true));
        acc.add_event(&observe(2.0, 100.0, Category::Player, false));
        let snapshot = acc.snapshot(4.0);
        assert_eq!(snapshot.average_rate, 100.0);
        assert_eq!(snapshot.crit_pct, 50.0);
        assert!((snapshot.activity - (1.0 - 2.0 / 3.0)).abs() < 1e-12);
        assert!(snapshot.extras.is_empty());
    }

    proptest! {
        #[test]
        fn window_never_exceeds_total(
            amounts in prop::collection::vec(0.0f64..10_000.0, 1..100),
            window in 0.0f64..50.0,
        ) {
            let mut acc = accumulator(32);
            for (i, amount) in amounts.iter().enumerate() {
                acc.add_event(&observe(i as f64 * 0.5, *amount, Category::Player, false));
            }
            let now = amounts.len() as f64 * 0.5;
            let totals = acc.window_totals(window, now);
            prop_assert!(totals.total <= acc.state().total + 1e-6);
            prop_assert!(totals.count <= 32);
        }
    }
}
