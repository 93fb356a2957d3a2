//! Engine Configuration
//!
//! Every knob the engine has, grouped by component. All fields default to
//! the values in [`crate::constants`], so a host only writes the parts it
//! wants to change:
//!
//! ```rust
//! use pulsemeter_core::config::{BackpressureStrategy, EngineConfig};
//!
//! let config = EngineConfig::from_json_str(r#"{
//!     "pipeline": { "events_per_turn": 50, "backpressure": "drop_newest" },
//!     "rates": { "current_window_secs": 3.0 }
//! }"#).unwrap();
//!
//! assert_eq!(config.pipeline.events_per_turn, 50);
//! assert_eq!(config.pipeline.backpressure, BackpressureStrategy::DropNewest);
//! assert_eq!(config.rates.peak_decay_per_sec, 0.98);
//! ```
//!
//! Validation runs once, at load time. Nothing downstream re-checks ranges.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::constants::buffers::{
    DAMAGE_BUFFER_CAPACITY, DEFAULT_EVENTS_PER_TURN, DEFAULT_PENDING_QUEUE_BOUND,
    HEALING_BUFFER_CAPACITY, SPELL_CACHE_CAPACITY,
};
use crate::constants::pools::KNOWN_POOL_NAMES;
use crate::constants::rates::{ACTIVITY_WINDOW_SECS, CURRENT_RATE_WINDOW_SECS, PEAK_DECAY_PER_SEC};
use crate::constants::time::{DEFAULT_TURN_SECS, UI_REFRESH_INTERVAL_SECS};
use crate::errors::{PulseError, PulseResult};
use crate::pool::{default_pool_config, PoolConfig};

/// Top-level engine configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Pool settings keyed by pool name (`damageEvent`, `healingEvent`,
    /// `combatStateEvent`)
    pub pools: BTreeMap<String, PoolConfig>,
    pub buffers: BufferConfig,
    pub rates: RateConfig,
    pub pipeline: PipelineConfig,
    pub spell_cache: SpellCacheConfig,
}

impl EngineConfig {
    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> PulseResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_pretty(&self) -> PulseResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Effective settings for a pool, falling back to its default
    pub fn pool(&self, name: &str) -> PulseResult<PoolConfig> {
        if !KNOWN_POOL_NAMES.contains(&name) {
            return Err(PulseError::UnknownPool(name.to_string()));
        }
        Ok(self
            .pools
            .get(name)
            .copied()
            .unwrap_or_else(|| default_pool_config(name)))
    }

    pub fn validate(&self) -> PulseResult<()> {
        for (name, pool) in &self.pools {
            if !KNOWN_POOL_NAMES.contains(&name.as_str()) {
                return Err(PulseError::UnknownPool(name.clone()));
            }
            if pool.capacity == 0 {
                return Err(PulseError::InvalidConfig {
                    field: "pools.capacity",
                    reason: "must be at least 1",
                });
            }
        }
        self.buffers.validate()?;
        self.rates.validate()?;
        self.pipeline.validate()?;
        self.spell_cache.validate()
    }
}

/// Ring buffer capacities per metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    pub damage_capacity: usize,
    pub healing_capacity: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            damage_capacity: DAMAGE_BUFFER_CAPACITY,
            healing_capacity: HEALING_BUFFER_CAPACITY,
        }
    }
}

impl BufferConfig {
    fn validate(&self) -> PulseResult<()> {
        if self.damage_capacity == 0 || self.healing_capacity == 0 {
            return Err(PulseError::InvalidConfig {
                field: "buffers",
                reason: "capacities must be at least 1",
            });
        }
        Ok(())
    }
}

/// Rolling-window and decay parameters shared by all accumulators
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateConfig {
    /// Trailing window for the current rate
    pub current_window_secs: f64,
    /// Multiplicative peak decay per elapsed second
    pub peak_decay_per_sec: f64,
    /// Seconds after the last event at which activity reaches zero
    pub activity_window_secs: f64,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            current_window_secs: CURRENT_RATE_WINDOW_SECS,
            peak_decay_per_sec: PEAK_DECAY_PER_SEC,
            activity_window_secs: ACTIVITY_WINDOW_SECS,
        }
    }
}

impl RateConfig {
    fn validate(&self) -> PulseResult<()> {
        if !(self.current_window_secs.is_finite() && self.current_window_secs > 0.0) {
            return Err(PulseError::InvalidConfig {
                field: "rates.current_window_secs",
                reason: "must be a positive number of seconds",
            });
        }
        if !(self.peak_decay_per_sec > 0.0 && self.peak_decay_per_sec <= 1.0) {
            return Err(PulseError::InvalidConfig {
                field: "rates.peak_decay_per_sec",
                reason: "must be in (0, 1]",
            });
        }
        if !(self.activity_window_secs.is_finite() && self.activity_window_secs > 0.0) {
            return Err(PulseError::InvalidConfig {
                field: "rates.activity_window_secs",
                reason: "must be a positive number of seconds",
            });
        }
        Ok(())
    }
}

/// What happens when the pending queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackpressureStrategy {
    /// Drop the oldest deferred event to make room
    #[default]
    DropOldest,
    /// Drop the incoming event
    DropNewest,
}

/// When accumulated totals are cleared automatically
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetPolicy {
    /// Totals span the whole session
    Never,
    /// Each encounter starts from zero
    #[default]
    OnCombatStart,
}

/// Ingestion pipeline settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Events processed per turn before the rest are deferred to the next turn
    pub events_per_turn: usize,
    /// Event-time length of a turn; the budget refills once it has passed
    pub turn_secs: f64,
    /// Maximum deferred events
    pub pending_bound: usize,
    pub backpressure: BackpressureStrategy,
    /// Minimum seconds between UI refresh publications
    pub ui_refresh_interval_secs: f64,
    pub reset_policy: ResetPolicy,
    /// Only feed events from the player, pets and guardians into accumulators
    pub owned_only: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            events_per_turn: DEFAULT_EVENTS_PER_TURN,
            turn_secs: DEFAULT_TURN_SECS,
            pending_bound: DEFAULT_PENDING_QUEUE_BOUND,
            backpressure: BackpressureStrategy::DropOldest,
            ui_refresh_interval_secs: UI_REFRESH_INTERVAL_SECS,
            reset_policy: ResetPolicy::OnCombatStart,
            owned_only: true,
        }
    }
}

impl PipelineConfig {
    fn validate(&self) -> PulseResult<()> {
        if self.events_per_turn == 0 {
            return Err(PulseError::InvalidConfig {
                field: "pipeline.events_per_turn",
                reason: "must be at least 1",
            });
        }
        if !(self.turn_secs.is_finite() && self.turn_secs > 0.0) {
            return Err(PulseError::InvalidConfig {
                field: "pipeline.turn_secs",
                reason: "must be a positive number of seconds",
            });
        }
        if self.pending_bound == 0 {
            return Err(PulseError::InvalidConfig {
                field: "pipeline.pending_bound",
                reason: "must be at least 1",
            });
        }
        if !(self.ui_refresh_interval_secs.is_finite() && self.ui_refresh_interval_secs >= 0.0) {
            return Err(PulseError::InvalidConfig {
                field: "pipeline.ui_refresh_interval_secs",
                reason: "must be a non-negative number of seconds",
            });
        }
        Ok(())
    }
}

/// Spell metadata cache settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpellCacheConfig {
    pub capacity: usize,
}

impl Default for SpellCacheConfig {
    fn default() -> Self {
        Self {
            capacity: SPELL_CACHE_CAPACITY,
        }
    }
}

impl SpellCacheConfig {
    fn validate(&self) -> PulseResult<()> {
        if self.capacity == 0 {
            return Err(PulseError::InvalidConfig {
                field: "spell_cache.capacity",
                reason: "must be at least 1",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::pools::{COMBAT_STATE_POOL_CAPACITY, DAMAGE_EVENT_POOL};
    use crate::pool::ExhaustionPolicy;

    #[test]
    fn empty_document_gives_defaults() {
        let config = EngineConfig::from_json_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert!(config.pipeline.owned_only);
    }

    #[test]
    fn pool_overrides_merge_with_defaults() {
        let config = EngineConfig::from_json_str(
            r#"{ "pools": { "damageEvent": { "capacity": 12, "exhaustion": "refuse" } } }"#,
        )
        .unwrap();

        let damage = config.pool(DAMAGE_EVENT_POOL).unwrap();
        assert_eq!(damage.capacity, 12);
        assert_eq!(damage.exhaustion, ExhaustionPolicy::Refuse);
        assert_eq!(
            config.pool("combatStateEvent").unwrap().capacity,
            COMBAT_STATE_POOL_CAPACITY
        );
        assert!(matches!(config.pool("nope"), Err(PulseError::UnknownPool(_))));
    }

    #[test]
    fn unknown_pool_names_are_rejected() {
        let err = EngineConfig::from_json_str(r#"{ "pools": { "lootEvent": {} } }"#).unwrap_err();
        assert_eq!(err, PulseError::UnknownPool("lootEvent".to_string()));
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let err = EngineConfig::from_json_str(r#"{ "rates": { "peak_decay_per_sec": 1.5 } }"#)
            .unwrap_err();
        assert!(matches!(
            err,
            PulseError::InvalidConfig { field: "rates.peak_decay_per_sec", .. }
        ));

        let err = EngineConfig::from_json_str(r#"{ "pipeline": { "events_per_turn": 0 } }"#)
            .unwrap_err();
        assert!(matches!(err, PulseError::InvalidConfig { .. }));

        let err = EngineConfig::from_json_str(r#"{ "pipeline": { "turn_secs": 0.0 } }"#)
            .unwrap_err();
        assert!(matches!(
            err,
            PulseError::InvalidConfig { field: "pipeline.turn_secs", .. }
        ));
    }

    #[test]
    fn malformed_json_is_reported() {
        let err = EngineConfig::from_json_str(r#"{ "pipeline": [ }"#).unwrap_err();
        assert!(matches!(err, PulseError::MalformedConfig(_)));
    }

    #[test]
    fn survives_a_json_round_trip() {
        let mut config = EngineConfig::default();
        config.pipeline.reset_policy = ResetPolicy::Never;
        let json = config.to_json_pretty().unwrap();
        assert_eq!(EngineConfig::from_json_str(&json).unwrap(), config);
    }
}
