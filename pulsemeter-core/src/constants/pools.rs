//! Object Pool Sizes and Names
//!
//! Pools are keyed by name in configuration. The names below are the only
//! ones the engine recognizes; any other name is a configuration error.

/// Pool of damage event records.
pub const DAMAGE_EVENT_POOL: &str = "damageEvent";

/// Pool of healing event records.
pub const HEALING_EVENT_POOL: &str = "healingEvent";

/// Pool of combat start/end records.
pub const COMBAT_STATE_EVENT_POOL: &str = "combatStateEvent";

/// Every pool name accepted by configuration.
pub const KNOWN_POOL_NAMES: [&str; 3] = [
    DAMAGE_EVENT_POOL,
    HEALING_EVENT_POOL,
    COMBAT_STATE_EVENT_POOL,
];

/// Default free-list capacity for event pools.
///
/// Records are released as soon as the bus finishes dispatching them, so
/// only a handful are ever checked out at once. 100 covers re-entrant
/// publishes with plenty of headroom.
pub const DEFAULT_POOL_CAPACITY: usize = 100;

/// Default free-list capacity for the combat state pool.
///
/// Combat transitions happen a few times per minute at most.
pub const COMBAT_STATE_POOL_CAPACITY: usize = 10;

/// Records constructed up front when a pool is created.
pub const DEFAULT_POOL_PREALLOCATE: usize = 16;
