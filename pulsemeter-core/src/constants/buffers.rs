//! Buffer Sizes and Queue Bounds
//!
//! Ring buffers are allocated once at construction and never grow, so these
//! values fix the engine's steady-state memory footprint.

// ===== RING BUFFER CAPACITIES =====

/// Sample capacity of the damage ring buffer.
///
/// Sized for sustained heavy combat:
/// - 2000 samples × 32 bytes/sample ≈ 64KB
/// - Covers ~20 seconds at 100 events/second, ~60 seconds at typical raid rates
/// - The longest rolling window queried by the display is 30 seconds
pub const DAMAGE_BUFFER_CAPACITY: usize = 2000;

/// Sample capacity of the healing ring buffer.
///
/// Healing arrives at a lower rate than damage (fewer sources, periodic
/// ticks), so half the damage capacity covers the same time span.
pub const HEALING_BUFFER_CAPACITY: usize = 1000;

/// Capacity used when a buffer is created through the registry without an
/// explicit size.
pub const DEFAULT_BUFFER_CAPACITY: usize = 500;

// ===== INGESTION QUEUE =====

/// Maximum events processed per scheduling turn.
///
/// Circuit breaker against bursts: at ~5µs per event, 200 events bound a
/// single turn to roughly one millisecond. Excess events wait for the next
/// turn. With the default turn length this allows 4000 events per second.
pub const DEFAULT_EVENTS_PER_TURN: usize = 200;

/// Maximum events allowed to wait in the deferred queue.
///
/// Ten full turns of backlog. Beyond this the configured backpressure
/// strategy applies.
pub const DEFAULT_PENDING_QUEUE_BOUND: usize = 2000;

/// Spell metadata entries kept before least-recently-used eviction.
///
/// A long raid session touches a few hundred distinct spells; 256 covers a
/// single class comfortably.
pub const SPELL_CACHE_CAPACITY: usize = 256;

/// Kind-specific values a metric snapshot can carry.
pub const MAX_SNAPSHOT_EXTRAS: usize = 8;
