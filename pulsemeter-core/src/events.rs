//! Event Types for the Aggregation Engine
//!
//! ## Overview
//!
//! Three families of types live here:
//!
//! - **Input**: [`RawEvent`], the boundary type hosts hand to
//!   [`IngestionPipeline::ingest`](crate::pipeline::IngestionPipeline::ingest)
//! - **Records**: [`DamageRecord`], [`HealingRecord`] and [`CombatStateRecord`],
//!   the pooled payloads the pipeline publishes on the bus
//! - **Bus**: [`Topic`] and [`BusEvent`], the closed set of things subscribers
//!   can listen to
//!
//! ## Data Flow
//!
//! ```text
//! RawEvent ──→ classify ──→ Accumulator::add_event
//!                  │
//!                  └──→ pool.lease() ──→ fill record ──→ bus.publish ──→ release
//! ```
//!
//! ## Borrowed Payloads
//!
//! A [`BusEvent`] only borrows its record. Subscribers receive
//! `&BusEvent<'a>` through a higher-ranked callback, so the compiler rejects
//! any subscriber that tries to keep a pooled record past its callback. Once
//! dispatch returns the record goes back to its pool and is reused.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::accumulator::MetricSnapshot;
use crate::entity::{Category, EntityRecord, OwnershipFlags};
use crate::errors::PulseError;
use crate::pool::Poolable;
use crate::time::Timestamp;

/// Kind of metric an event feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Damage,
    Healing,
}

impl MetricKind {
    pub const ALL: [MetricKind; 2] = [MetricKind::Damage, MetricKind::Healing];

    pub const fn name(&self) -> &'static str {
        match self {
            MetricKind::Damage => "damage",
            MetricKind::Healing => "healing",
        }
    }

    /// Bus topic carrying individual events of this kind
    pub const fn topic(&self) -> Topic {
        match self {
            MetricKind::Damage => Topic::DamageObserved,
            MetricKind::Healing => Topic::HealingObserved,
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

impl FromStr for MetricKind {
    type Err = PulseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetricKind::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| PulseError::UnknownMetric(s.to_string()))
    }
}

/// Kind-specific fields carried alongside the amount
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum MetricExtra {
    #[default]
    None,
    Damage {
        absorbed: f64,
        blocked: f64,
        overkill: f64,
        school: u8,
    },
    Healing {
        /// Portion of the amount that exceeded missing health
        overhealing: f64,
        absorbed: f64,
    },
}

/// One normalized combat event as delivered by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    pub timestamp: Timestamp,
    pub source_id: String,
    /// Display name, used when the source is first detected
    #[serde(default)]
    pub source_name: Option<String>,
    pub amount: f64,
    /// Raw source flag bits
    #[serde(default)]
    pub ownership_flags: u32,
    #[serde(default)]
    pub spell_id: u32,
    #[serde(default)]
    pub is_critical: bool,
    pub kind: MetricKind,
    #[serde(default)]
    pub extra: MetricExtra,
}

impl RawEvent {
    /// Start a damage event
    pub fn damage(timestamp: Timestamp, source_id: impl Into<String>, amount: f64) -> Self {
        Self::new(MetricKind::Damage, timestamp, source_id, amount)
    }

    /// Start a healing event
    pub fn healing(timestamp: Timestamp, source_id: impl Into<String>, amount: f64) -> Self {
        Self::new(MetricKind::Healing, timestamp, source_id, amount)
    }

    pub fn new(
        kind: MetricKind,
        timestamp: Timestamp,
        source_id: impl Into<String>,
        amount: f64,
    ) -> Self {
        Self {
            timestamp,
            source_id: source_id.into(),
            source_name: None,
            amount,
            ownership_flags: 0,
            spell_id: 0,
            is_critical: false,
            kind,
            extra: MetricExtra::None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.source_name = Some(name.into());
        self
    }

    pub fn flags(mut self, flags: OwnershipFlags) -> Self {
        self.ownership_flags = flags.bits();
        self
    }

    pub fn spell(mut self, spell_id: u32) -> Self {
        self.spell_id = spell_id;
        self
    }

    pub fn critical(mut self, is_critical: bool) -> Self {
        self.is_critical = is_critical;
        self
    }

    pub fn extra(mut self, extra: MetricExtra) -> Self {
        self.extra = extra;
        self
    }

    /// Recognized flag bits
    pub fn ownership(&self) -> OwnershipFlags {
        OwnershipFlags::from_bits_truncate(self.ownership_flags)
    }

    /// Reason this event cannot be ingested, if any
    pub fn defect(&self) -> Option<&'static str> {
        if self.source_id.is_empty() {
            Some("empty source id")
        } else if !self.timestamp.is_finite() {
            Some("non-finite timestamp")
        } else if !self.amount.is_finite() {
            Some("non-finite amount")
        } else if self.amount < 0.0 {
            Some("negative amount")
        } else {
            None
        }
    }
}

/// Pooled damage payload
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DamageRecord {
    pub timestamp: Timestamp,
    pub source_id: String,
    pub amount: f64,
    pub spell_id: u32,
    pub spell_name: Option<String>,
    pub school: u8,
    pub category: Category,
    pub is_critical: bool,
    pub absorbed: f64,
    pub blocked: f64,
    pub overkill: f64,
}

impl Poolable for DamageRecord {}

/// Pooled healing payload
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HealingRecord {
    pub timestamp: Timestamp,
    pub source_id: String,
    pub amount: f64,
    pub spell_id: u32,
    pub spell_name: Option<String>,
    pub category: Category,
    pub is_critical: bool,
    pub overhealing: f64,
    pub absorbed: f64,
}

impl HealingRecord {
    /// Healing that actually landed
    pub fn effective(&self) -> f64 {
        (self.amount - self.overhealing).max(0.0)
    }
}

impl Poolable for HealingRecord {}

/// Pooled combat start/end payload
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CombatStateRecord {
    pub timestamp: Timestamp,
    pub in_combat: bool,
    /// Length of the encounter; zero on start
    pub duration: f64,
    /// Number of encounters seen this session, including this one
    pub encounter: u32,
}

impl Poolable for CombatStateRecord {}

/// Payload of the periodic UI refresh
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefreshSnapshot {
    pub timestamp: Timestamp,
    pub in_combat: bool,
    pub metrics: Vec<MetricSnapshot>,
}

impl RefreshSnapshot {
    pub fn metric(&self, kind: MetricKind) -> Option<&MetricSnapshot> {
        self.metrics.iter().find(|m| m.kind == kind)
    }
}

/// Bus topics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Topic {
    CombatStart,
    CombatEnd,
    DamageObserved,
    HealingObserved,
    EntityDetected,
    UiRefreshTick,
}

impl Topic {
    pub const COUNT: usize = 6;

    pub const ALL: [Topic; Topic::COUNT] = [
        Topic::CombatStart,
        Topic::CombatEnd,
        Topic::DamageObserved,
        Topic::HealingObserved,
        Topic::EntityDetected,
        Topic::UiRefreshTick,
    ];

    pub const fn name(&self) -> &'static str {
        match self {
            Topic::CombatStart => "COMBAT_START",
            Topic::CombatEnd => "COMBAT_END",
            Topic::DamageObserved => "DAMAGE_OBSERVED",
            Topic::HealingObserved => "HEALING_OBSERVED",
            Topic::EntityDetected => "ENTITY_DETECTED",
            Topic::UiRefreshTick => "UI_REFRESH_TICK",
        }
    }

    /// Dense index for per-topic tables
    pub const fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Topic {
    type Err = PulseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Topic::ALL
            .into_iter()
            .find(|topic| topic.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| PulseError::UnknownTopic(s.to_string()))
    }
}

/// An event published on the bus
///
/// Payloads are borrowed for the duration of a single dispatch.
#[derive(Debug, Clone, Copy)]
pub enum BusEvent<'a> {
    CombatStart(&'a CombatStateRecord),
    CombatEnd(&'a CombatStateRecord),
    DamageObserved(&'a DamageRecord),
    HealingObserved(&'a HealingRecord),
    EntityDetected(&'a EntityRecord),
    UiRefreshTick(&'a RefreshSnapshot),
}

impl BusEvent<'_> {
    pub fn topic(&self) -> Topic {
        match self {
            BusEvent::CombatStart(_) => Topic::CombatStart,
            BusEvent::CombatEnd(_) => Topic::CombatEnd,
            BusEvent::DamageObserved(_) => Topic::DamageObserved,
            BusEvent::HealingObserved(_) => Topic::HealingObserved,
            BusEvent::EntityDetected(_) => Topic::EntityDetected,
            BusEvent::UiRefreshTick(_) => Topic::UiRefreshTick,
        }
    }

    /// Event time, when the payload carries one
    pub fn timestamp(&self) -> Option<Timestamp> {
        match self {
            BusEvent::CombatStart(r) | BusEvent::CombatEnd(r) => Some(r.timestamp),
            BusEvent::DamageObserved(r) => Some(r.timestamp),
            BusEvent::HealingObserved(r) => Some(r.timestamp),
            BusEvent::UiRefreshTick(r) => Some(r.timestamp),
            BusEvent::EntityDetected(_) => None,
        }
    }
}
