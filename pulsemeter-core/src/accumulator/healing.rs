//! Healing-specific bookkeeping
//!
//! Healing amounts arrive gross: the overhealed part is included in
//! `amount` and reported separately. Base totals stay gross so the window
//! math is the same as for damage; the effective figures live here.

use serde::Serialize;

use crate::buffer::RingBuffer;
use crate::config::RateConfig;
use crate::events::{MetricExtra, MetricKind};

use super::damage::finite_or_zero;
use super::rolling::{MetricExtension, RollingAccumulator};
use super::{MetricSnapshot, Observation};

/// Overhealing and effective healing
#[derive(Debug, Clone)]
pub struct HealingExtension {
    totals: HealingTotals,
    /// Effective amount per event, for the effective rate
    effective: RingBuffer,
    window_secs: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct HealingTotals {
    pub overhealing: f64,
    pub absorbed: f64,
    pub effective: f64,
    pub gross: f64,
}

impl HealingTotals {
    /// Share of gross healing that was overhealing, in percent
    pub fn overheal_pct(&self) -> f64 {
        if self.gross > 0.0 {
            self.overhealing * 100.0 / self.gross
        } else {
            0.0
        }
    }
}

impl HealingExtension {
    pub fn new(capacity: usize, window_secs: f64) -> Self {
        Self {
            totals: HealingTotals::default(),
            effective: RingBuffer::new(capacity, "healing.effective"),
            window_secs,
        }
    }

    pub fn totals(&self) -> &HealingTotals {
        &self.totals
    }

    /// Effective healing per second over the current-rate window ending at `now`
    pub fn effective_rate(&self, now: f64) -> f64 {
        if self.window_secs <= 0.0 {
            return 0.0;
        }
        self.effective.sum_window(now - self.window_secs, now) / self.window_secs
    }
}

impl MetricExtension for HealingExtension {
    fn on_event(&mut self, observation: &Observation<'_>) {
        let (overhealing, absorbed) = match observation.extra {
            MetricExtra::Healing {
                overhealing,
                absorbed,
            } => (finite_or_zero(overhealing), finite_or_zero(absorbed)),
            _ => (0.0, 0.0),
        };
        let overhealing = overhealing.min(observation.amount);
        let effective = observation.amount - overhealing;

        self.totals.gross += observation.amount;
        self.totals.overhealing += overhealing;
        self.totals.absorbed += absorbed;
        self.totals.effective += effective;
        self.effective.write(observation.timestamp, effective, None);
    }

    fn decorate(&self, snapshot: &mut MetricSnapshot) {
        snapshot.push_extra("overhealing", self.totals.overhealing);
        snapshot.push_extra("absorbed", self.totals.absorbed);
        snapshot.push_extra("effective", self.totals.effective);
        snapshot.push_extra("overheal_pct", self.totals.overheal_pct());
        snapshot.push_extra("effective_rate", self.effective_rate(snapshot.timestamp));
    }

    fn reset(&mut self) {
        self.totals = HealingTotals::default();
        self.effective.clear();
    }
}

pub type HealingAccumulator = RollingAccumulator<HealingExtension>;

impl RollingAccumulator<HealingExtension> {
    pub fn healing(capacity: usize, rates: RateConfig) -> Self {
        Self::new(
            MetricKind::Healing,
            capacity,
            rates,
            HealingExtension::new(capacity, rates.current_window_secs),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::Accumulator;
    use crate::entity::Category;

    fn heal(ts: f64, amount: f64, overhealing: f64) -> Observation<'static> {
        Observation {
            timestamp: ts,
            source_id: "Player-1",
            amount,
            category: Category::Player,
            is_critical: false,
            extra: MetricExtra::Healing {
                overhealing,
                absorbed: 0.0,
            },
        }
    }

    #[test]
    fn effective_excludes_overhealing() {
        let mut acc = HealingAccumulator::healing(32, RateConfig::default());
        acc.add_event(&heal(0.0, 1000.0, 250.0));
        acc.add_event(&heal(1.0, 500.0, 0.0));

        // Base totals stay gross
        assert_eq!(acc.state().total, 1500.0);

        let totals = acc.extension().totals();
        assert_eq!(totals.effective, 1250.0);
        assert!((totals.overheal_pct() - 100.0 / 6.0).abs() < 1e-9);

        let snapshot = acc.snapshot(1.0);
        assert_eq!(snapshot.extra("effective"), Some(1250.0));
        assert_eq!(snapshot.extra("effective_rate"), Some(1250.0 / 5.0));
    }

    #[test]
    fn overhealing_cannot_exceed_amount() {
        let mut acc = HealingAccumulator::healing(8, RateConfig::default());
        acc.add_event(&heal(0.0, 100.0, 400.0));
        assert_eq!(acc.extension().totals().effective, 0.0);
        assert_eq!(acc.extension().totals().overhealing, 100.0);
    }

    #[test]
    fn reset_clears_effective_history() {
        let mut acc = HealingAccumulator::healing(8, RateConfig::default());
        acc.add_event(&heal(0.0, 100.0, 0.0));
        acc.reset();
        assert_eq!(acc.extension().effective_rate(0.0), 0.0);
        assert_eq!(*acc.extension().totals(), HealingTotals::default());
    }
}
