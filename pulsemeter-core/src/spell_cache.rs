//! Spell metadata cache
//!
//! Events carry a numeric spell id. Names, icons and schools come from the
//! host, through a [`SpellResolver`], and are cached here so the lookup runs
//! once per spell instead of once per event. The cache is bounded; when it
//! grows past capacity the least recently used entries go first.

use std::collections::HashMap;

use serde::Serialize;

use crate::time::Timestamp;

/// Metadata the host knows about a spell
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpellInfo {
    pub name: String,
    pub icon: String,
    pub school: u8,
}

/// A cached spell
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpellCacheEntry {
    pub id: u32,
    pub info: SpellInfo,
    pub last_access: Timestamp,
}

/// Host-side spell lookup
pub trait SpellResolver {
    fn resolve(&self, spell_id: u32) -> Option<SpellInfo>;
}

/// Resolver that knows nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSpellResolver;

impl SpellResolver for NoSpellResolver {
    fn resolve(&self, _spell_id: u32) -> Option<SpellInfo> {
        None
    }
}

impl<F> SpellResolver for F
where
    F: Fn(u32) -> Option<SpellInfo>,
{
    fn resolve(&self, spell_id: u32) -> Option<SpellInfo> {
        self(spell_id)
    }
}

/// Cache counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SpellCacheStats {
    pub capacity: usize,
    pub len: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Bounded LRU cache of spell metadata
#[derive(Debug)]
pub struct SpellCache {
    capacity: usize,
    entries: HashMap<u32, SpellCacheEntry>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl SpellCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    /// Look up a cached spell, refreshing its access time
    pub fn get(&mut self, spell_id: u32, now: Timestamp) -> Option<&SpellCacheEntry> {
        match self.entries.get_mut(&spell_id) {
            Some(entry) => {
                self.hits += 1;
                entry.last_access = now;
                Some(entry)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Cache a spell
    ///
    /// Trimming back to capacity happens on maintenance through
    /// [`SpellCache::evict_to_capacity`]. Only a cache at twice its capacity
    /// evicts on insert.
    pub fn insert(&mut self, spell_id: u32, info: SpellInfo, now: Timestamp) {
        self.entries.insert(
            spell_id,
            SpellCacheEntry {
                id: spell_id,
                info,
                last_access: now,
            },
        );
        if self.entries.len() > self.hard_limit() {
            self.evict_to_capacity();
        }
    }

    fn hard_limit(&self) -> usize {
        self.capacity.saturating_mul(2)
    }

    /// Cached entry, or ask the resolver and cache its answer
    ///
    /// Spells the resolver does not know are not cached, so a later resolver
    /// answer is still picked up.
    pub fn get_or_resolve(
        &mut self,
        spell_id: u32,
        now: Timestamp,
        resolver: &dyn SpellResolver,
    ) -> Option<&SpellCacheEntry> {
        if self.get(spell_id, now).is_none() {
            let info = resolver.resolve(spell_id)?;
            self.insert(spell_id, info, now);
        }
        self.entries.get(&spell_id)
    }

    /// Drop least recently used entries until within capacity
    ///
    /// Returns how many were evicted.
    pub fn evict_to_capacity(&mut self) -> usize {
        let excess = self.entries.len().saturating_sub(self.capacity);
        if excess == 0 {
            return 0;
        }
        let mut by_age: Vec<(Timestamp, u32)> = self
            .entries
            .values()
            .map(|entry| (entry.last_access, entry.id))
            .collect();
        by_age.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        for (_, id) in by_age.into_iter().take(excess) {
            self.entries.remove(&id);
        }
        self.evictions += excess as u64;
        log::trace!("spell cache evicted {excess} entries");
        excess
    }

    pub fn contains(&self, spell_id: u32) -> bool {
        self.entries.contains_key(&spell_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> SpellCacheStats {
        SpellCacheStats {
            capacity: self.capacity,
            len: self.entries.len(),
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
        }
    }
}
