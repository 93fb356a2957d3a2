//! Common test utilities for integration tests
//!
//! This module provides:
//! - A deterministic combat-log generator
//! - Pipeline fixtures with a tracked player
//! - Recording subscribers

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use pulsemeter_core::{
    EngineConfig, IngestionPipeline, MetricExtra, OwnershipFlags, RawEvent,
};

pub const PLAYER_ID: &str = "Player-1-0A1B2C3D";
pub const PLAYER_NAME: &str = "Thrall";
pub const PET_ID: &str = "Pet-0-3771-0-1";

/// Pipeline with the test player tracked
pub fn pipeline_with(config: EngineConfig) -> IngestionPipeline {
    IngestionPipeline::builder()
        .config(config)
        .player(PLAYER_ID, PLAYER_NAME)
        .build()
        .expect("test configuration is valid")
}

pub fn pipeline() -> IngestionPipeline {
    pipeline_with(EngineConfig::default())
}

pub fn player_hit(ts: f64, amount: f64) -> RawEvent {
    RawEvent::damage(ts, PLAYER_ID, amount).flags(OwnershipFlags::me())
}

pub fn pet_hit(ts: f64, amount: f64) -> RawEvent {
    RawEvent::damage(ts, PET_ID, amount)
        .name("Wolf")
        .flags(OwnershipFlags::my_pet())
}

/// Shared log written by a subscriber and read by the test
pub type Recorder<T> = Rc<RefCell<Vec<T>>>;

pub fn recorder<T>() -> Recorder<T> {
    Rc::new(RefCell::new(Vec::new()))
}

/// Deterministic combat log
///
/// Mixes player damage, pet damage, heals and foreign noise at a fixed
/// average rate, using an LCG so every run sees the same stream.
pub struct CombatLogGenerator {
    seed: u32,
    now: f64,
    events_per_second: f64,
}

impl CombatLogGenerator {
    pub fn new(events_per_second: f64) -> Self {
        Self {
            seed: 0x1234_5678,
            now: 0.0,
            events_per_second,
        }
    }

    fn next_random(&mut self) -> f64 {
        self.seed = self.seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        (self.seed >> 8) as f64 / 16_777_216.0
    }

    pub fn now(&self) -> f64 {
        self.now
    }

    pub fn next_event(&mut self) -> RawEvent {
        self.now += 1.0 / self.events_per_second;
        let roll = self.next_random();
        let amount = 200.0 + (self.next_random() * 1800.0).round();
        let crit = self.next_random() < 0.25;

        match roll {
            r if r < 0.55 => player_hit(self.now, amount).critical(crit).extra(MetricExtra::Damage {
                absorbed: 0.0,
                blocked: 0.0,
                overkill: 0.0,
                school: 1,
            }),
            r if r < 0.75 => pet_hit(self.now, amount * 0.4),
            r if r < 0.9 => RawEvent::healing(self.now, PLAYER_ID, amount)
                .flags(OwnershipFlags::me())
                .critical(crit)
                .extra(MetricExtra::Healing {
                    overhealing: amount * 0.1,
                    absorbed: 0.0,
                }),
            _ => RawEvent::damage(self.now, "Creature-0-1", amount)
                .flags(OwnershipFlags::HOSTILE | OwnershipFlags::TYPE_NPC),
        }
    }

    /// Events covering the next `seconds`
    pub fn take_seconds(&mut self, seconds: f64) -> Vec<RawEvent> {
        let count = (seconds * self.events_per_second).round() as usize;
        (0..count).map(|_| self.next_event()).collect()
    }
}
