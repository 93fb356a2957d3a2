//! Pipeline builder
//!
//! ```rust
//! use pulsemeter_core::{EngineConfig, IngestionPipeline, MetricKind, RawEvent, OwnershipFlags};
//!
//! let mut pipeline = IngestionPipeline::builder()
//!     .config(EngineConfig::default())
//!     .player("Player-1", "Jaina")
//!     .build()
//!     .unwrap();
//!
//! pipeline.ingest(RawEvent::damage(1.0, "Player-1", 420.0).flags(OwnershipFlags::me())).unwrap();
//! assert_eq!(pipeline.window_totals(MetricKind::Damage, 5.0).unwrap().total, 420.0);
//! ```

use crate::config::EngineConfig;
use crate::entity::{Category, EntityClassifier};
use crate::errors::PulseResult;
use crate::spell_cache::{NoSpellResolver, SpellResolver};
use crate::time::{Clock, TimeSource};

use super::IngestionPipeline;

/// Assembles an [`IngestionPipeline`]
///
/// Without a time source the engine clock is driven purely by event and
/// tick timestamps.
pub struct PipelineBuilder {
    config: EngineConfig,
    time_source: Option<Box<dyn TimeSource>>,
    spell_resolver: Box<dyn SpellResolver>,
    classifier: EntityClassifier,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            time_source: None,
            spell_resolver: Box::new(NoSpellResolver),
            classifier: EntityClassifier::new(),
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Clock read by [`IngestionPipeline::tick_now`]
    pub fn time_source(mut self, source: impl TimeSource + 'static) -> Self {
        self.time_source = Some(Box::new(source));
        self
    }

    pub fn spell_resolver(mut self, resolver: impl SpellResolver + 'static) -> Self {
        self.spell_resolver = Box::new(resolver);
        self
    }

    /// Track the local player from the start
    pub fn player(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.classifier.set_player(id, name);
        self
    }

    /// Pre-register an entity, such as a permanent pet known from the host
    pub fn entity(mut self, id: impl Into<String>, name: impl Into<String>, category: Category) -> Self {
        self.classifier.register(id, name, category);
        self
    }

    /// Validate the configuration and build
    pub fn build(self) -> PulseResult<IngestionPipeline> {
        let clock = match self.time_source {
            Some(source) => Clock::new(source),
            None => Clock::driven(),
        };
        IngestionPipeline::from_parts(self.config, clock, self.spell_resolver, self.classifier)
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PulseError;
    use crate::events::{BusEvent, MetricKind, RawEvent, Topic};
    use crate::spell_cache::SpellInfo;
    use crate::time::ManualClock;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn invalid_config_fails_build() {
        let mut config = EngineConfig::default();
        config.rates.current_window_secs = -1.0;
        assert!(matches!(
            PipelineBuilder::new().config(config).build(),
            Err(PulseError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn preregistered_entities_are_owned() {
        let mut pipeline = PipelineBuilder::new()
            .entity("Pet-1", "Felhunter", Category::Pet)
            .build()
            .unwrap();
        pipeline.ingest(RawEvent::damage(1.0, "Pet-1", 80.0)).unwrap();
        let state = pipeline.accumulator(MetricKind::Damage).unwrap().state().clone();
        assert_eq!(state.pet_total, 80.0);
    }

    #[test]
    fn resolver_names_published_spells() {
        let resolver = |id: u32| {
            (id == 686).then(|| SpellInfo {
                name: "Shadow Bolt".to_string(),
                icon: "spell_shadow_shadowbolt".to_string(),
                school: 32,
            })
        };
        let mut pipeline = PipelineBuilder::new()
            .player("Player-1", "Gul'dan")
            .spell_resolver(resolver)
            .build()
            .unwrap();

        let names = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&names);
        pipeline.subscribe(Topic::DamageObserved, "names", move |event| {
            if let BusEvent::DamageObserved(record) = event {
                sink.borrow_mut().push((record.spell_name.clone(), record.school));
            }
            Ok(())
        });
        pipeline.ingest(RawEvent::damage(0.0, "Player-1", 500.0).spell(686)).unwrap();
        pipeline.ingest(RawEvent::damage(1.0, "Player-1", 20.0).spell(6603)).unwrap();

        assert_eq!(
            *names.borrow(),
            vec![(Some("Shadow Bolt".to_string()), 32), (None, 0)]
        );
    }

    #[test]
    fn time_source_drives_tick_now() {
        let clock = Rc::new(ManualClock::new(0.0));
        struct Shared(Rc<ManualClock>);
        impl TimeSource for Shared {
            fn now(&self) -> f64 {
                self.0.now()
            }
        }

        let mut pipeline = PipelineBuilder::new()
            .time_source(Shared(Rc::clone(&clock)))
            .build()
            .unwrap();
        clock.set(7.5);
        pipeline.tick_now();
        assert_eq!(pipeline.now(), 7.5);
    }
}
