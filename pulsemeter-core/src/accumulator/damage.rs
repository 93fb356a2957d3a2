//! Damage-specific bookkeeping

use serde::Serialize;

use crate::config::RateConfig;
use crate::events::{MetricExtra, MetricKind};

use super::rolling::{MetricExtension, RollingAccumulator};
use super::{MetricSnapshot, Observation};

/// Damage that did not land as health loss
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct DamageExtension {
    pub absorbed: f64,
    pub blocked: f64,
    /// Damage beyond what was needed to kill the target
    pub overkill: f64,
}

impl MetricExtension for DamageExtension {
    fn on_event(&mut self, observation: &Observation<'_>) {
        if let MetricExtra::Damage {
            absorbed,
            blocked,
            overkill,
            ..
        } = observation.extra
        {
            self.absorbed += finite_or_zero(absorbed);
            self.blocked += finite_or_zero(blocked);
            self.overkill += finite_or_zero(overkill);
        }
    }

    fn decorate(&self, snapshot: &mut MetricSnapshot) {
        snapshot.push_extra("absorbed", self.absorbed);
        snapshot.push_extra("blocked", self.blocked);
        snapshot.push_extra("overkill", self.overkill);
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

pub(super) fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

pub type DamageAccumulator = RollingAccumulator<DamageExtension>;

impl RollingAccumulator<DamageExtension> {
    pub fn damage(capacity: usize, rates: RateConfig) -> Self {
        Self::new(MetricKind::Damage, capacity, rates, DamageExtension::default())
    }
}
