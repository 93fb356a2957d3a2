//! The ingestion pipeline

use std::collections::{BTreeMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::accumulator::{Accumulator, DamageAccumulator, HealingAccumulator, MetricSnapshot, Observation, WindowTotals};
use crate::buffer::{BufferRegistry, RingBuffer};
use crate::bus::{DispatchReport, EventBus, SubscriptionId};
use crate::config::{BackpressureStrategy, EngineConfig, ResetPolicy};
use crate::constants::time::RATE_HISTORY_SECONDS;
use crate::entity::{Category, EntityClassifier};
use crate::errors::{PulseError, PulseResult, SubscriberError};
use crate::events::{BusEvent, CombatStateRecord, MetricExtra, MetricKind, RawEvent, RefreshSnapshot, Topic};
use crate::pool::RecordPools;
use crate::spell_cache::{SpellCache, SpellResolver};
use crate::time::{Clock, EventRateMeter, MaintenanceTimer, Timestamp};

use super::{Diagnostics, Disposition, MetricRoute, PipelineBuilder, PipelineStats, SnapshotSink, TickReport};

/// Series the pipeline records about itself on every tick
const PENDING_SERIES: &str = "pipeline.pending";

/// Single-threaded ingestion engine
///
/// Owns every component: the clock, record pools, classifier, event bus,
/// accumulators and spell cache. All methods run on the caller's thread.
pub struct IngestionPipeline {
    config: EngineConfig,
    clock: Clock,
    rate_meter: EventRateMeter,
    classifier: EntityClassifier,
    pools: RecordPools,
    bus: EventBus,
    routes: BTreeMap<MetricKind, MetricRoute>,
    spell_cache: SpellCache,
    spell_resolver: Box<dyn SpellResolver>,
    series: BufferRegistry,
    pending: VecDeque<RawEvent>,
    turn_budget: usize,
    turn_started_at: Option<Timestamp>,
    overflowing: bool,
    refresh_timer: MaintenanceTimer,
    in_combat: bool,
    combat_started_at: Option<Timestamp>,
    encounters: u32,
    stats: PipelineStats,
    shut_down: bool,
}

impl IngestionPipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Pipeline with default damage and healing accumulators
    pub fn new(config: EngineConfig) -> PulseResult<Self> {
        PipelineBuilder::new().config(config).build()
    }

    pub(super) fn from_parts(
        config: EngineConfig,
        clock: Clock,
        spell_resolver: Box<dyn SpellResolver>,
        classifier: EntityClassifier,
    ) -> PulseResult<Self> {
        config.validate()?;
        let pools = RecordPools::from_config(&config.pools)?;

        let mut routes = BTreeMap::new();
        let damage = DamageAccumulator::damage(config.buffers.damage_capacity, config.rates);
        let healing = HealingAccumulator::healing(config.buffers.healing_capacity, config.rates);
        routes.insert(
            MetricKind::Damage,
            MetricRoute {
                accumulator: Box::new(damage),
                sink: None,
            },
        );
        routes.insert(
            MetricKind::Healing,
            MetricRoute {
                accumulator: Box::new(healing),
                sink: None,
            },
        );

        let mut series = BufferRegistry::new();
        series.get_or_create(PENDING_SERIES, RATE_HISTORY_SECONDS);

        log::debug!(
            "pipeline ready: {} events/turn, {} pending max, {:?} backpressure",
            config.pipeline.events_per_turn,
            config.pipeline.pending_bound,
            config.pipeline.backpressure
        );

        Ok(Self {
            clock,
            rate_meter: EventRateMeter::new(),
            classifier,
            pools,
            bus: EventBus::new(),
            routes,
            spell_cache: SpellCache::new(config.spell_cache.capacity),
            spell_resolver,
            series,
            pending: VecDeque::new(),
            turn_budget: config.pipeline.events_per_turn,
            turn_started_at: None,
            overflowing: false,
            refresh_timer: MaintenanceTimer::new(config.pipeline.ui_refresh_interval_secs),
            in_combat: false,
            combat_started_at: None,
            encounters: 0,
            stats: PipelineStats::default(),
            shut_down: false,
            config,
        })
    }

    // ---------------------------------------------------------------------
    // Registration
    // ---------------------------------------------------------------------

    /// Register an accumulator under its own kind, replacing any previous one
    pub fn register_metric(&mut self, accumulator: Box<dyn Accumulator>) {
        let kind = accumulator.kind();
        log::debug!("registered {kind} accumulator");
        self.routes.insert(
            kind,
            MetricRoute {
                accumulator,
                sink: None,
            },
        );
    }

    /// Remove a metric kind; its events are rejected from then on
    pub fn unregister_metric(&mut self, kind: MetricKind) -> bool {
        self.routes.remove(&kind).is_some()
    }

    pub fn is_registered(&self, kind: MetricKind) -> bool {
        self.routes.contains_key(&kind)
    }

    /// Attach a consumer that receives this metric's snapshot on every UI refresh
    pub fn set_snapshot_sink<F>(&mut self, kind: MetricKind, sink: F) -> PulseResult<()>
    where
        F: FnMut(&MetricSnapshot) -> Result<(), SubscriberError> + 'static,
    {
        let route = self
            .routes
            .get_mut(&kind)
            .ok_or(PulseError::UnregisteredMetric(kind.name()))?;
        route.sink = Some(Box::new(sink) as SnapshotSink);
        Ok(())
    }

    pub fn subscribe<F>(&mut self, topic: Topic, label: impl Into<String>, callback: F) -> SubscriptionId
    where
        F: for<'a> FnMut(&BusEvent<'a>) -> Result<(), SubscriberError> + 'static,
    {
        self.bus.subscribe(topic, label, callback)
    }

    /// Subscribe by topic name, as written in host configuration
    pub fn subscribe_named<F>(&mut self, topic: &str, label: impl Into<String>, callback: F) -> PulseResult<SubscriptionId>
    where
        F: for<'a> FnMut(&BusEvent<'a>) -> Result<(), SubscriberError> + 'static,
    {
        let topic: Topic = topic.parse()?;
        Ok(self.bus.subscribe(topic, label, callback))
    }

    pub fn unsubscribe(&mut self, topic: Topic, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(topic, id)
    }

    pub fn set_player(&mut self, id: impl Into<String>, name: impl Into<String>) {
        self.classifier.set_player(id, name);
    }

    pub fn classifier(&self) -> &EntityClassifier {
        &self.classifier
    }

    pub fn classifier_mut(&mut self) -> &mut EntityClassifier {
        &mut self.classifier
    }

    // ---------------------------------------------------------------------
    // Ingestion
    // ---------------------------------------------------------------------

    /// Accept one event from the host
    ///
    /// An event whose timestamp lies `turn_secs` or more past the start of
    /// the current turn opens a new turn first. Processed immediately while
    /// the turn's budget lasts and nothing is waiting ahead of it; deferred
    /// to the next turn otherwise.
    pub fn ingest(&mut self, raw: RawEvent) -> PulseResult<Disposition> {
        if self.shut_down {
            self.stats.rejected_after_shutdown += 1;
            return Ok(Disposition::Rejected);
        }
        if !self.routes.contains_key(&raw.kind) {
            return Err(PulseError::UnregisteredMetric(raw.kind.name()));
        }
        self.stats.received += 1;

        if self.turn_has_passed(raw.timestamp) {
            self.open_turn(raw.timestamp);
        }

        if self.pending.is_empty() && self.turn_budget > 0 {
            self.turn_budget -= 1;
            self.process(raw);
            return Ok(Disposition::Processed);
        }
        Ok(self.defer(raw))
    }

    /// Start a new scheduling turn now
    ///
    /// For hosts that know their own frame boundaries. Refills the budget
    /// and drains deferred events into it; returns how many were drained.
    pub fn begin_turn(&mut self) -> usize {
        if self.shut_down {
            return 0;
        }
        let now = self.clock.last_known();
        self.open_turn(now)
    }

    fn turn_has_passed(&self, timestamp: Timestamp) -> bool {
        if !timestamp.is_finite() {
            return false;
        }
        self.turn_started_at
            .map_or(true, |start| timestamp - start >= self.config.pipeline.turn_secs)
    }

    fn open_turn(&mut self, at: Timestamp) -> usize {
        self.turn_budget = self.config.pipeline.events_per_turn;
        self.turn_started_at = Some(at);
        self.drain()
    }

    fn defer(&mut self, raw: RawEvent) -> Disposition {
        if self.pending.len() >= self.config.pipeline.pending_bound {
            self.stats.dropped += 1;
            if !self.overflowing {
                self.overflowing = true;
                log::warn!(
                    "pending queue full ({} events), dropping per {:?}",
                    self.pending.len(),
                    self.config.pipeline.backpressure
                );
            }
            match self.config.pipeline.backpressure {
                BackpressureStrategy::DropOldest => {
                    self.pending.pop_front();
                }
                BackpressureStrategy::DropNewest => return Disposition::Dropped,
            }
        }
        self.pending.push_back(raw);
        self.stats.deferred += 1;
        self.stats.max_pending = self.stats.max_pending.max(self.pending.len());
        Disposition::Deferred
    }

    fn drain(&mut self) -> usize {
        let mut drained = 0;
        while self.turn_budget > 0 {
            let Some(raw) = self.pending.pop_front() else {
                break;
            };
            self.turn_budget -= 1;
            self.process(raw);
            drained += 1;
        }
        if self.pending.is_empty() {
            self.overflowing = false;
        }
        drained
    }

    fn process(&mut self, raw: RawEvent) {
        if let Some(defect) = raw.defect() {
            self.stats.malformed += 1;
            log::warn!(
                "skipping malformed {} event from '{}': {defect}",
                raw.kind,
                raw.source_id
            );
            return;
        }
        let now = self.clock.observe(raw.timestamp);
        self.rate_meter.record(now);

        let classification = self.classifier.classify_event(
            &raw.source_id,
            raw.source_name.as_deref(),
            raw.ownership(),
        );
        if classification.newly_detected {
            self.stats.entities_detected += 1;
            if let Some(entity) = self.classifier.lookup(&raw.source_id) {
                self.bus.publish(&BusEvent::EntityDetected(entity));
            }
        }
        let category = classification.category;
        if self.config.pipeline.owned_only && !category.is_owned() {
            self.stats.unowned += 1;
            return;
        }

        let Some(route) = self.routes.get_mut(&raw.kind) else {
            self.stats.unroutable += 1;
            log::trace!("no accumulator for deferred {} event", raw.kind);
            return;
        };
        route.accumulator.add_event(&Observation {
            timestamp: raw.timestamp,
            source_id: &raw.source_id,
            amount: raw.amount,
            category,
            is_critical: raw.is_critical,
            extra: raw.extra,
        });
        self.stats.processed += 1;
        log::trace!(
            "{} {:.0} from '{}' ({})",
            raw.kind,
            raw.amount,
            raw.source_id,
            category.name()
        );

        self.publish_observed(&raw, category, now);
    }

    /// Fill a pooled record for the event and publish it
    fn publish_observed(&mut self, raw: &RawEvent, category: Category, now: Timestamp) {
        let spell = if raw.spell_id == 0 {
            None
        } else {
            self.spell_cache
                .get_or_resolve(raw.spell_id, now, self.spell_resolver.as_ref())
                .map(|entry| (entry.info.name.clone(), entry.info.school))
        };

        match raw.kind {
            MetricKind::Damage => {
                let Some(mut record) = self.pools.damage.lease() else {
                    self.stats.publish_skipped += 1;
                    return;
                };
                record.timestamp = raw.timestamp;
                record.source_id.push_str(&raw.source_id);
                record.amount = raw.amount;
                record.spell_id = raw.spell_id;
                record.category = category;
                record.is_critical = raw.is_critical;
                if let Some((name, school)) = spell {
                    record.spell_name = Some(name);
                    record.school = school;
                }
                if let MetricExtra::Damage {
                    absorbed,
                    blocked,
                    overkill,
                    school,
                } = raw.extra
                {
                    record.absorbed = absorbed;
                    record.blocked = blocked;
                    record.overkill = overkill;
                    record.school = school;
                }
                self.bus.publish_pooled(record, |r| BusEvent::DamageObserved(r));
            }
            MetricKind::Healing => {
                let Some(mut record) = self.pools.healing.lease() else {
                    self.stats.publish_skipped += 1;
                    return;
                };
                record.timestamp = raw.timestamp;
                record.source_id.push_str(&raw.source_id);
                record.amount = raw.amount;
                record.spell_id = raw.spell_id;
                record.category = category;
                record.is_critical = raw.is_critical;
                record.spell_name = spell.map(|(name, _)| name);
                if let MetricExtra::Healing {
                    overhealing,
                    absorbed,
                } = raw.extra
                {
                    record.overhealing = overhealing;
                    record.absorbed = absorbed;
                }
                self.bus.publish_pooled(record, |r| BusEvent::HealingObserved(r));
            }
        }
    }

    // ---------------------------------------------------------------------
    // Heartbeat
    // ---------------------------------------------------------------------

    /// Periodic maintenance, driven by the host
    pub fn tick(&mut self, now: Timestamp) -> TickReport {
        if self.shut_down {
            return TickReport::default();
        }
        self.clock.observe(now);
        self.stats.ticks += 1;
        let turn_start = self.clock.last_known();
        let drained = self.open_turn(turn_start);

        let now = self.clock.last_known();
        self.rate_meter.roll_to(now);
        for route in self.routes.values_mut() {
            route.accumulator.update_current_values(now);
        }
        self.series
            .get_or_create(PENDING_SERIES, RATE_HISTORY_SECONDS)
            .write(now, self.pending.len() as f64, None);
        let evicted_spells = self.spell_cache.evict_to_capacity();
        let refreshed = self.maybe_refresh(now);

        TickReport {
            drained,
            pending: self.pending.len(),
            refreshed,
            evicted_spells,
        }
    }

    /// Tick at the clock's own reading
    pub fn tick_now(&mut self) -> TickReport {
        let now = self.clock.now();
        self.tick(now)
    }

    fn maybe_refresh(&mut self, now: Timestamp) -> bool {
        if !self.refresh_timer.poll(now) {
            return false;
        }
        let mut metrics = Vec::with_capacity(self.routes.len());
        for (kind, route) in self.routes.iter_mut() {
            let snapshot = route.accumulator.snapshot(now);
            if let Some(sink) = route.sink.as_mut() {
                let outcome = catch_unwind(AssertUnwindSafe(|| sink(&snapshot)))
                    .unwrap_or_else(|_| Err(SubscriberError::Panicked("snapshot sink".into())));
                if let Err(err) = outcome {
                    self.stats.sink_failures += 1;
                    log::warn!("{kind} snapshot sink: {err}");
                }
            }
            metrics.push(snapshot);
        }
        let refresh = RefreshSnapshot {
            timestamp: now,
            in_combat: self.in_combat,
            metrics,
        };
        self.bus.publish(&BusEvent::UiRefreshTick(&refresh));
        self.stats.refreshes += 1;
        true
    }

    // ---------------------------------------------------------------------
    // Combat lifecycle
    // ---------------------------------------------------------------------

    /// Mark the start of an encounter
    ///
    /// Ignored while already in combat.
    pub fn combat_start(&mut self, now: Timestamp) -> Option<DispatchReport> {
        let now = self.clock.observe(now);
        if self.in_combat || self.shut_down {
            return None;
        }
        self.in_combat = true;
        self.combat_started_at = Some(now);
        self.encounters += 1;
        if self.config.pipeline.reset_policy == ResetPolicy::OnCombatStart {
            self.reset_metrics();
        }
        log::debug!("combat {} started at {now:.3}s", self.encounters);
        self.publish_combat_state(now, true, 0.0)
    }

    /// Mark the end of an encounter and forget this encounter's pets and guardians
    ///
    /// Ignored while out of combat.
    pub fn combat_end(&mut self, now: Timestamp) -> Option<DispatchReport> {
        let now = self.clock.observe(now);
        if !self.in_combat || self.shut_down {
            return None;
        }
        self.in_combat = false;
        let duration = self.combat_started_at.take().map_or(0.0, |start| now - start);
        let pets = self.classifier.clear_pets();
        let guardians = self.classifier.clear_guardians();
        log::debug!(
            "combat {} ended after {duration:.1}s, dropped {pets} pets and {guardians} guardians",
            self.encounters
        );
        self.publish_combat_state(now, false, duration)
    }

    fn publish_combat_state(&mut self, now: Timestamp, in_combat: bool, duration: f64) -> Option<DispatchReport> {
        let Some(mut record) = self.pools.combat_state.lease() else {
            self.stats.publish_skipped += 1;
            return None;
        };
        *record = CombatStateRecord {
            timestamp: now,
            in_combat,
            duration,
            encounter: self.encounters,
        };
        let report = if in_combat {
            self.bus.publish_pooled(record, |r| BusEvent::CombatStart(r))
        } else {
            self.bus.publish_pooled(record, |r| BusEvent::CombatEnd(r))
        };
        Some(report)
    }

    pub fn in_combat(&self) -> bool {
        self.in_combat
    }

    /// Clear every accumulator
    pub fn reset_metrics(&mut self) {
        for route in self.routes.values_mut() {
            route.accumulator.reset();
        }
    }

    /// Stop accepting events and release every subscriber
    ///
    /// Deferred events are discarded. Queries keep answering from the last
    /// state.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        let discarded = self.pending.len();
        self.pending.clear();
        self.refresh_timer.cancel();
        self.bus.clear();
        self.shut_down = true;
        log::debug!(
            "pipeline shut down after {} events, {discarded} pending discarded",
            self.stats.processed
        );
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    fn route(&self, kind: MetricKind) -> PulseResult<&MetricRoute> {
        self.routes
            .get(&kind)
            .ok_or(PulseError::UnregisteredMetric(kind.name()))
    }

    pub fn accumulator(&self, kind: MetricKind) -> PulseResult<&dyn Accumulator> {
        Ok(self.route(kind)?.accumulator.as_ref())
    }

    /// Sums over the trailing `window_secs` ending at the latest known time
    pub fn window_totals(&self, kind: MetricKind, window_secs: f64) -> PulseResult<WindowTotals> {
        let now = self.clock.last_known();
        Ok(self.route(kind)?.accumulator.window_totals(window_secs, now))
    }

    pub fn current_rate(&self, kind: MetricKind) -> PulseResult<f64> {
        Ok(self.route(kind)?.accumulator.current_rate())
    }

    pub fn peak_rate(&self, kind: MetricKind) -> PulseResult<f64> {
        Ok(self.route(kind)?.accumulator.peak_rate())
    }

    pub fn activity_level(&self, kind: MetricKind) -> PulseResult<f64> {
        let now = self.clock.last_known();
        Ok(self.route(kind)?.accumulator.activity_level(now))
    }

    pub fn snapshot(&self, kind: MetricKind) -> PulseResult<MetricSnapshot> {
        let now = self.clock.last_known();
        Ok(self.route(kind)?.accumulator.snapshot(now))
    }

    /// Latest known engine time
    pub fn now(&self) -> Timestamp {
        self.clock.last_known()
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn pools(&self) -> &RecordPools {
        &self.pools
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Host-defined series, created on first use
    pub fn series_mut(&mut self, name: &str, capacity: usize) -> &mut RingBuffer {
        self.series.get_or_create(name, capacity)
    }

    pub fn series(&self, name: &str) -> Option<&RingBuffer> {
        self.series.get(name)
    }

    pub fn diagnostics(&self) -> Diagnostics {
        let mut buffers: Vec<_> = self
            .routes
            .values()
            .map(|route| route.accumulator.buffer_stats())
            .collect();
        buffers.extend(self.series.stats());

        Diagnostics {
            pipeline: self.stats,
            pools: self.pools.all_stats(),
            buffers,
            bus: self.bus.stats(),
            spell_cache: self.spell_cache.stats(),
            events_per_second: self.rate_meter.events_per_second(),
            peak_events_per_second: self.rate_meter.peak_events_per_second(),
            clock_regressions: self.clock.regressions(),
            pending: self.pending.len(),
            in_combat: self.in_combat,
            tracked_entities: self.classifier.len(),
        }
    }
}
