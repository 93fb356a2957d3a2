//! Record Pools
//!
//! ## Overview
//!
//! Combat logs produce hundreds of events per second during heavy fights.
//! Each published event needs a record, and allocating a fresh one per event
//! churns the allocator right when the host can least afford it. Pools keep a
//! free list of records per record type and hand them out again after reset.
//!
//! ```text
//!             acquire                     release
//!  free list ─────────→ Pooled<T> ─────────────────→ free list
//!     ↑                    │                          (reset to template)
//!     │  empty?            │ free list full?
//!     └── clone template   └──→ discarded
//! ```
//!
//! ## Accounting
//!
//! Every record a pool ever created is, at any moment, exactly one of:
//! outstanding (handed out, not yet released), free, or discarded (released
//! into a full free list). So `outstanding + free + discarded == created`,
//! and the free list never exceeds `capacity`.
//!
//! A record carries the id of the pool that issued it plus a per-issue
//! ticket. Releasing a record into a different pool, or releasing the same
//! ticket twice, is ignored and counted; it can never corrupt the free list.
//!
//! ## Scoped Use
//!
//! [`ObjectPool::lease`] returns a [`Lease`] that releases its record when
//! dropped, on every exit path. The pipeline leases records and the bus drops
//! the lease once dispatch finishes, so no record can stay checked out.

use std::collections::{BTreeMap, HashSet};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};

use crate::constants::pools::{
    COMBAT_STATE_EVENT_POOL, COMBAT_STATE_POOL_CAPACITY, DAMAGE_EVENT_POOL,
    DEFAULT_POOL_CAPACITY, DEFAULT_POOL_PREALLOCATE, HEALING_EVENT_POOL, KNOWN_POOL_NAMES,
};
use crate::errors::{PulseError, PulseResult};
use crate::events::{CombatStateRecord, DamageRecord, HealingRecord};

/// A record type that can live in an [`ObjectPool`]
///
/// `reset_to` must restore every field to the template's value. The default
/// copies the whole template, which covers every field the type has.
pub trait Poolable: Clone + Default {
    fn reset_to(&mut self, template: &Self) {
        self.clone_from(template);
    }
}

/// What a pool does once it has created `capacity` records and the free list
/// is empty
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustionPolicy {
    /// Allocate a fresh record anyway
    #[default]
    Grow,
    /// Hand out nothing; the caller skips the work that needed a record
    Refuse,
}

/// Per-pool configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum free-list size, and the creation cap under `Refuse`
    pub capacity: usize,
    /// Records created up front
    pub preallocate: usize,
    pub exhaustion: ExhaustionPolicy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_POOL_CAPACITY,
            preallocate: DEFAULT_POOL_PREALLOCATE,
            exhaustion: ExhaustionPolicy::Grow,
        }
    }
}

impl PoolConfig {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            preallocate: DEFAULT_POOL_PREALLOCATE.min(capacity),
            ..Default::default()
        }
    }

    pub fn refusing(mut self) -> Self {
        self.exhaustion = ExhaustionPolicy::Refuse;
        self
    }
}

/// Opaque pool identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolId(u32);

impl PoolId {
    fn next() -> Self {
        static NEXT: AtomicU32 = AtomicU32::new(1);
        PoolId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// A record checked out of a pool
#[derive(Debug)]
pub struct Pooled<T> {
    record: T,
    pool: PoolId,
    ticket: u64,
}

impl<T> Pooled<T> {
    /// Pool that issued this record
    pub fn pool_id(&self) -> PoolId {
        self.pool
    }
}

impl<T> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.record
    }
}

impl<T> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.record
    }
}

/// Result of handing a record back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// Reset and placed on the free list
    Recycled,
    /// Free list was full; the record was dropped
    Discarded,
    /// Record did not come from this pool, or was already released
    Ignored,
}

/// Pool counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub name: String,
    pub capacity: usize,
    pub created: u64,
    pub reused: u64,
    /// Acquisitions that found the free list empty
    pub misses: u64,
    /// Misses that returned nothing under `Refuse`
    pub refused: u64,
    pub discarded: u64,
    pub ignored_releases: u64,
    pub outstanding: usize,
    pub free: usize,
}

impl PoolStats {
    /// `outstanding + free + discarded == created`
    pub fn is_balanced(&self) -> bool {
        (self.outstanding + self.free) as u64 + self.discarded == self.created
    }
}

/// Bounded free list of reusable records
pub struct ObjectPool<T: Poolable> {
    name: String,
    id: PoolId,
    template: T,
    free: Vec<T>,
    outstanding: HashSet<u64>,
    next_ticket: u64,
    config: PoolConfig,
    created: u64,
    reused: u64,
    misses: u64,
    refused: u64,
    discarded: u64,
    ignored: u64,
}

impl<T: Poolable> ObjectPool<T> {
    /// Create a pool whose records start as `T::default()`
    pub fn new(name: impl Into<String>, config: PoolConfig) -> Self {
        Self::with_template(name, T::default(), config)
    }

    /// Create a pool whose records start as, and reset to, `template`
    pub fn with_template(name: impl Into<String>, template: T, config: PoolConfig) -> Self {
        let preallocate = config.preallocate.min(config.capacity);
        let free = (0..preallocate).map(|_| template.clone()).collect();
        let pool = Self {
            name: name.into(),
            id: PoolId::next(),
            template,
            free,
            outstanding: HashSet::new(),
            next_ticket: 0,
            config,
            created: preallocate as u64,
            reused: 0,
            misses: 0,
            refused: 0,
            discarded: 0,
            ignored: 0,
        };
        log::debug!(
            "pool '{}' ready: capacity {}, {} preallocated, {:?} on exhaustion",
            pool.name,
            config.capacity,
            preallocate,
            config.exhaustion
        );
        pool
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> PoolId {
        self.id
    }

    /// Take a record from the free list, or create one
    ///
    /// Returns `None` only under [`ExhaustionPolicy::Refuse`] once the pool
    /// has created `capacity` records and none are free.
    pub fn acquire(&mut self) -> Option<Pooled<T>> {
        let record = match self.free.pop() {
            Some(record) => {
                self.reused += 1;
                record
            }
            None => {
                self.misses += 1;
                if self.created >= self.config.capacity as u64 {
                    if self.config.exhaustion == ExhaustionPolicy::Refuse {
                        self.refused += 1;
                        log::warn!("pool '{}' exhausted, acquisition refused", self.name);
                        return None;
                    }
                    log::trace!("pool '{}' exhausted, growing", self.name);
                }
                self.created += 1;
                self.template.clone()
            }
        };

        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.outstanding.insert(ticket);
        Some(Pooled {
            record,
            pool: self.id,
            ticket,
        })
    }

    /// Hand a record back
    pub fn release(&mut self, pooled: Pooled<T>) -> ReleaseOutcome {
        if pooled.pool != self.id || !self.outstanding.remove(&pooled.ticket) {
            self.ignored += 1;
            log::warn!("pool '{}' ignored a release it did not issue", self.name);
            return ReleaseOutcome::Ignored;
        }
        if self.free.len() >= self.config.capacity {
            self.discarded += 1;
            return ReleaseOutcome::Discarded;
        }
        let mut record = pooled.record;
        record.reset_to(&self.template);
        self.free.push(record);
        ReleaseOutcome::Recycled
    }

    /// Acquire a record that releases itself when dropped
    pub fn lease(&mut self) -> Option<Lease<'_, T>> {
        let pooled = self.acquire()?;
        Some(Lease {
            pool: self,
            record: Some(pooled),
        })
    }

    /// Records currently handed out
    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }

    pub fn free(&self) -> usize {
        self.free.len()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            name: self.name.clone(),
            capacity: self.config.capacity,
            created: self.created,
            reused: self.reused,
            misses: self.misses,
            refused: self.refused,
            discarded: self.discarded,
            ignored_releases: self.ignored,
            outstanding: self.outstanding.len(),
            free: self.free.len(),
        }
    }
}

/// Scoped pool acquisition
///
/// Derefs to the record. Dropping the lease releases the record.
pub struct Lease<'p, T: Poolable> {
    pool: &'p mut ObjectPool<T>,
    record: Option<Pooled<T>>,
}

impl<T: Poolable> Deref for Lease<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Only `Drop` takes the record out
        self.record.as_deref().expect("lease holds its record until dropped")
    }
}

impl<T: Poolable> DerefMut for Lease<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.record
            .as_deref_mut()
            .expect("lease holds its record until dropped")
    }
}

impl<T: Poolable> Drop for Lease<'_, T> {
    fn drop(&mut self) {
        if let Some(record) = self.record.take() {
            self.pool.release(record);
        }
    }
}

/// The engine's three record pools
pub struct RecordPools {
    pub damage: ObjectPool<DamageRecord>,
    pub healing: ObjectPool<HealingRecord>,
    pub combat_state: ObjectPool<CombatStateRecord>,
}

impl RecordPools {
    /// Build the pools from a name-keyed configuration map
    ///
    /// Names missing from the map get their defaults. Any name that is not a
    /// known pool is an error.
    pub fn from_config(configs: &BTreeMap<String, PoolConfig>) -> PulseResult<Self> {
        if let Some(unknown) = configs.keys().find(|name| !KNOWN_POOL_NAMES.contains(&name.as_str())) {
            return Err(PulseError::UnknownPool(unknown.clone()));
        }
        let config_for = |name: &str| configs.get(name).copied().unwrap_or_else(|| default_pool_config(name));
        Ok(Self {
            damage: ObjectPool::new(DAMAGE_EVENT_POOL, config_for(DAMAGE_EVENT_POOL)),
            healing: ObjectPool::new(HEALING_EVENT_POOL, config_for(HEALING_EVENT_POOL)),
            combat_state: ObjectPool::new(
                COMBAT_STATE_EVENT_POOL,
                config_for(COMBAT_STATE_EVENT_POOL),
            ),
        })
    }

    /// Counters for one pool by name
    pub fn stats(&self, name: &str) -> PulseResult<PoolStats> {
        match name {
            DAMAGE_EVENT_POOL => Ok(self.damage.stats()),
            HEALING_EVENT_POOL => Ok(self.healing.stats()),
            COMBAT_STATE_EVENT_POOL => Ok(self.combat_state.stats()),
            other => Err(PulseError::UnknownPool(other.to_string())),
        }
    }

    pub fn all_stats(&self) -> Vec<PoolStats> {
        vec![
            self.damage.stats(),
            self.healing.stats(),
            self.combat_state.stats(),
        ]
    }
}

impl Default for RecordPools {
    fn default() -> Self {
        Self {
            damage: ObjectPool::new(DAMAGE_EVENT_POOL, default_pool_config(DAMAGE_EVENT_POOL)),
            healing: ObjectPool::new(HEALING_EVENT_POOL, default_pool_config(HEALING_EVENT_POOL)),
            combat_state: ObjectPool::new(
                COMBAT_STATE_EVENT_POOL,
                default_pool_config(COMBAT_STATE_EVENT_POOL),
            ),
        }
    }
}

/// Default configuration for a known pool name
pub fn default_pool_config(name: &str) -> PoolConfig {
    match name {
        COMBAT_STATE_EVENT_POOL => PoolConfig::with_capacity(COMBAT_STATE_POOL_CAPACITY),
        _ => PoolConfig::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Scratch {
        value: u32,
        label: String,
    }

    impl Poolable for Scratch {}

    fn pool(capacity: usize, exhaustion: ExhaustionPolicy) -> ObjectPool<Scratch> {
        ObjectPool::new(
            "scratch",
            PoolConfig {
                capacity,
                preallocate: 0,
                exhaustion,
            },
        )
    }

    #[test]
    fn released_records_come_back_reset() {
        let mut pool = pool(4, ExhaustionPolicy::Grow);
        let mut record = pool.acquire().unwrap();
        record.value = 42;
        record.label.push_str("dirty");
        assert_eq!(pool.release(record), ReleaseOutcome::Recycled);

        let again = pool.acquire().unwrap();
        assert_eq!(*again, Scratch::default());
        assert_eq!(pool.stats().reused, 1);
    }

    #[test]
    fn template_defines_reset_state() {
        let template = Scratch {
            value: 7,
            label: "fresh".into(),
        };
        let mut pool = ObjectPool::with_template("templated", template.clone(), PoolConfig::with_capacity(2));
        let mut record = pool.acquire().unwrap();
        record.value = 99;
        pool.release(record);
        assert_eq!(*pool.acquire().unwrap(), template);
    }

    #[test]
    fn double_release_is_ignored() {
        let mut pool = pool(4, ExhaustionPolicy::Grow);
        let record = pool.acquire().unwrap();
        let forged = Pooled {
            record: Scratch::default(),
            pool: record.pool_id(),
            ticket: record.ticket,
        };
        assert_eq!(pool.release(record), ReleaseOutcome::Recycled);
        assert_eq!(pool.release(forged), ReleaseOutcome::Ignored);
        assert_eq!(pool.free(), 1);
        assert_eq!(pool.stats().ignored_releases, 1);
    }

    #[test]
    fn foreign_records_are_ignored() {
        let mut a = pool(4, ExhaustionPolicy::Grow);
        let mut b = pool(4, ExhaustionPolicy::Grow);
        let record = a.acquire().unwrap();
        assert_eq!(b.release(record), ReleaseOutcome::Ignored);
        assert_eq!(b.free(), 0);
        assert_eq!(a.outstanding(), 1);
    }

    #[test]
    fn full_free_list_discards() {
        let mut pool = pool(1, ExhaustionPolicy::Grow);
        let first = pool.acquire().unwrap();
        let second = pool.acquire().unwrap();
        assert_eq!(pool.stats().misses, 2);

        assert_eq!(pool.release(first), ReleaseOutcome::Recycled);
        assert_eq!(pool.release(second), ReleaseOutcome::Discarded);
        let stats = pool.stats();
        assert_eq!(stats.free, 1);
        assert!(stats.is_balanced());
    }

    #[test]
    fn empty_free_list_counts_a_miss_below_capacity() {
        let mut pool = pool(4, ExhaustionPolicy::Grow);
        let first = pool.acquire().unwrap();
        let _second = pool.acquire().unwrap();
        let stats = pool.stats();
        assert_eq!(stats.created, 2);
        assert_eq!(stats.misses, 2);

        pool.release(first);
        pool.acquire().unwrap();
        let stats = pool.stats();
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.reused, 1);
        assert_eq!(stats.refused, 0);
    }

    #[test]
    fn refuse_policy_returns_none_at_capacity() {
        let mut pool = pool(2, ExhaustionPolicy::Refuse);
        let a = pool.acquire().unwrap();
        let _b = pool.acquire().unwrap();
        assert!(pool.acquire().is_none());
        assert_eq!(pool.stats().refused, 1);
        assert_eq!(pool.stats().misses, 3);

        pool.release(a);
        assert!(pool.acquire().is_some());
    }

    #[test]
    fn lease_releases_on_drop() {
        let mut pool = pool(4, ExhaustionPolicy::Grow);
        {
            let mut lease = pool.lease().unwrap();
            lease.value = 3;
        }
        assert_eq!(pool.outstanding(), 0);
        assert_eq!(pool.free(), 1);
        assert_eq!(pool.acquire().unwrap().value, 0);
    }

    #[test]
    fn preallocation_is_capped_by_capacity() {
        let pool: ObjectPool<Scratch> = ObjectPool::new(
            "small",
            PoolConfig {
                capacity: 2,
                preallocate: 10,
                exhaustion: ExhaustionPolicy::Grow,
            },
        );
        assert_eq!(pool.free(), 2);
        assert!(pool.stats().is_balanced());
    }

    #[test]
    fn record_pools_reject_unknown_names() {
        let mut configs = BTreeMap::new();
        configs.insert(DAMAGE_EVENT_POOL.to_string(), PoolConfig::with_capacity(8));
        let pools = RecordPools::from_config(&configs).unwrap();
        assert_eq!(pools.stats(DAMAGE_EVENT_POOL).unwrap().capacity, 8);
        assert_eq!(
            pools.stats(COMBAT_STATE_EVENT_POOL).unwrap().capacity,
            COMBAT_STATE_POOL_CAPACITY
        );
        assert_eq!(
            pools.stats("lootEvent"),
            Err(PulseError::UnknownPool("lootEvent".to_string()))
        );

        configs.insert("lootEvent".to_string(), PoolConfig::default());
        assert!(matches!(
            RecordPools::from_config(&configs),
            Err(PulseError::UnknownPool(name)) if name == "lootEvent"
        ));
    }

    proptest! {
        #[test]
        fn accounting_stays_balanced(
            ops in prop::collection::vec(any::<bool>(), 1..200),
            capacity in 1usize..16,
            refuse in any::<bool>(),
        ) {
            let policy = if refuse { ExhaustionPolicy::Refuse } else { ExhaustionPolicy::Grow };
            let mut pool = pool(capacity, policy);
            let mut held = Vec::new();

            for acquire in ops {
                if acquire {
                    if let Some(record) = pool.acquire() {
                        held.push(record);
                    }
                } else if let Some(record) = held.pop() {
                    pool.release(record);
                }
                let stats = pool.stats();
                prop_assert!(stats.is_balanced());
                prop_assert!(stats.free <= capacity);
                prop_assert_eq!(stats.outstanding, held.len());
            }
        }
    }
}
