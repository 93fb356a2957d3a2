//! Entity ownership classification
//!
//! Every combat event carries a bitmask describing its source: who controls
//! it, how it relates to the local player, and what kind of object it is.
//! The classifier turns `(id, flags)` into an ownership [`Category`] so the
//! accumulators can split player damage from pet damage.
//!
//! ## Rules
//!
//! 1. An id equal to the tracked local player id is [`Category::Player`].
//! 2. A cached pet/guardian id returns its cached category, whatever the
//!    flags say now (first classification wins).
//! 3. Pet or guardian type bits together with the "mine" affiliation bit
//!    classify, and cache, as [`Category::Pet`] / [`Category::Guardian`].
//! 4. Everything else is [`Category::Unknown`] and is not cached.
//!
//! Rule 2 can misclassify when the game reuses an id for a different owned
//! entity within a session. That is a known limitation and is kept as is.

use std::collections::HashMap;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

/// Source/target flag bits carried on each raw combat event
///
/// Only the bits below are recognized; anything else is masked off at the
/// boundary by [`OwnershipFlags::from_bits_truncate`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct OwnershipFlags(u32);

impl OwnershipFlags {
    // Affiliation
    pub const MINE: Self = Self(0x0000_0001);
    pub const PARTY: Self = Self(0x0000_0002);
    pub const RAID: Self = Self(0x0000_0004);
    pub const OUTSIDER: Self = Self(0x0000_0008);
    // Reaction
    pub const FRIENDLY: Self = Self(0x0000_0010);
    pub const NEUTRAL: Self = Self(0x0000_0020);
    pub const HOSTILE: Self = Self(0x0000_0040);
    // Controller
    pub const CONTROL_PLAYER: Self = Self(0x0000_0100);
    pub const CONTROL_NPC: Self = Self(0x0000_0200);
    // Object type
    pub const TYPE_PLAYER: Self = Self(0x0000_0400);
    pub const TYPE_NPC: Self = Self(0x0000_0800);
    pub const TYPE_PET: Self = Self(0x0000_1000);
    pub const TYPE_GUARDIAN: Self = Self(0x0000_2000);
    pub const TYPE_OBJECT: Self = Self(0x0000_4000);

    /// Every type bit
    pub const TYPE_MASK: Self = Self(0x0000_FC00);

    const KNOWN_BITS: u32 = 0x0000_7F7F;

    pub const fn empty() -> Self {
        Self(0)
    }

    /// Keep only recognized bits
    pub const fn from_bits_truncate(bits: u32) -> Self {
        Self(bits & Self::KNOWN_BITS)
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// True when `bits` had nothing outside the recognized set
    pub const fn is_recognized(bits: u32) -> bool {
        bits & !Self::KNOWN_BITS == 0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    pub const fn intersects(&self, other: Self) -> bool {
        (self.0 & other.0) != 0
    }

    pub const fn is_mine(&self) -> bool {
        self.contains(Self::MINE)
    }

    pub const fn is_pet(&self) -> bool {
        self.contains(Self::TYPE_PET)
    }

    pub const fn is_guardian(&self) -> bool {
        self.contains(Self::TYPE_GUARDIAN)
    }

    /// Flags for a pet owned by the local player
    pub const fn my_pet() -> Self {
        Self::MINE
            .union(Self::FRIENDLY)
            .union(Self::CONTROL_PLAYER)
            .union(Self::TYPE_PET)
    }

    /// Flags for a guardian owned by the local player
    pub const fn my_guardian() -> Self {
        Self::MINE
            .union(Self::FRIENDLY)
            .union(Self::CONTROL_PLAYER)
            .union(Self::TYPE_GUARDIAN)
    }

    /// Flags for the local player
    pub const fn me() -> Self {
        Self::MINE
            .union(Self::FRIENDLY)
            .union(Self::CONTROL_PLAYER)
            .union(Self::TYPE_PLAYER)
    }
}

impl BitOr for OwnershipFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitOrAssign for OwnershipFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for OwnershipFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OwnershipFlags({:#06x})", self.0)
    }
}

/// Ownership category of an event source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Category {
    /// The local player
    Player,
    /// A pet controlled by the local player
    Pet,
    /// A temporary guardian summoned by the local player
    Guardian,
    /// Anyone else
    #[default]
    Unknown,
}

impl Category {
    pub const fn name(&self) -> &'static str {
        match self {
            Category::Player => "player",
            Category::Pet => "pet",
            Category::Guardian => "guardian",
            Category::Unknown => "unknown",
        }
    }

    /// Player, pet, or guardian
    pub const fn is_owned(&self) -> bool {
        !matches!(self, Category::Unknown)
    }

    /// Pet or guardian; these count toward the pet total
    pub const fn is_minion(&self) -> bool {
        matches!(self, Category::Pet | Category::Guardian)
    }
}

/// A known entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityRecord {
    pub id: String,
    pub display_name: String,
    pub category: Category,
}

/// Result of classifying one event source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub category: Category,
    /// The source was cached for the first time by this call
    pub newly_detected: bool,
}

/// Maps entity ids to ownership categories
#[derive(Debug, Default)]
pub struct EntityClassifier {
    player: Option<EntityRecord>,
    entities: HashMap<String, EntityRecord>,
}

impl EntityClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track the local player
    pub fn set_player(&mut self, id: impl Into<String>, name: impl Into<String>) {
        let record = EntityRecord {
            id: id.into(),
            display_name: name.into(),
            category: Category::Player,
        };
        log::debug!("tracking local player '{}' ({})", record.display_name, record.id);
        self.player = Some(record);
    }

    pub fn player(&self) -> Option<&EntityRecord> {
        self.player.as_ref()
    }

    /// Classify a source from its id and raw flag bits
    pub fn classify(&mut self, id: &str, flags: OwnershipFlags) -> Category {
        self.classify_event(id, None, flags).category
    }

    /// Classify a source, recording its display name on first detection
    ///
    /// An empty id is malformed input and classifies as unknown.
    pub fn classify_event(
        &mut self,
        id: &str,
        name: Option<&str>,
        flags: OwnershipFlags,
    ) -> Classification {
        let unknown = Classification {
            category: Category::Unknown,
            newly_detected: false,
        };
        if id.is_empty() {
            return unknown;
        }
        if self.player.as_ref().is_some_and(|p| p.id == id) {
            return Classification {
                category: Category::Player,
                newly_detected: false,
            };
        }
        if let Some(cached) = self.entities.get(id) {
            return Classification {
                category: cached.category,
                newly_detected: false,
            };
        }

        let category = if !flags.is_mine() {
            Category::Unknown
        } else if flags.is_pet() {
            Category::Pet
        } else if flags.is_guardian() {
            Category::Guardian
        } else {
            Category::Unknown
        };
        if category == Category::Unknown {
            return unknown;
        }

        log::trace!("detected {} '{id}'", category.name());
        self.entities.insert(
            id.to_string(),
            EntityRecord {
                id: id.to_string(),
                display_name: name.unwrap_or(id).to_string(),
                category,
            },
        );
        Classification {
            category,
            newly_detected: true,
        }
    }

    /// Register an entity explicitly, bypassing flag inference
    ///
    /// Replaces any cached entry for the same id.
    pub fn register(&mut self, id: impl Into<String>, name: impl Into<String>, category: Category) {
        let id = id.into();
        if id.is_empty() {
            return;
        }
        let record = EntityRecord {
            id: id.clone(),
            display_name: name.into(),
            category,
        };
        self.entities.insert(id, record);
    }

    pub fn lookup(&self, id: &str) -> Option<&EntityRecord> {
        match &self.player {
            Some(player) if player.id == id => Some(player),
            _ => self.entities.get(id),
        }
    }

    /// True for the player, and for cached pets and guardians
    pub fn is_owned(&self, id: &str) -> bool {
        self.lookup(id).is_some_and(|e| e.category.is_owned())
    }

    /// Drop cached pets, returning how many were removed
    pub fn clear_pets(&mut self) -> usize {
        self.clear_category(Category::Pet)
    }

    /// Drop cached guardians, returning how many were removed
    pub fn clear_guardians(&mut self) -> usize {
        self.clear_category(Category::Guardian)
    }

    fn clear_category(&mut self, category: Category) -> usize {
        let before = self.entities.len();
        self.entities.retain(|_, e| e.category != category);
        before - self.entities.len()
    }

    /// Number of cached entities, not counting the player
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Drop every cached entity; the tracked player is kept
    pub fn clear(&mut self) {
        self.entities.clear();
    }
}
