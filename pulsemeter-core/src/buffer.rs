//! Fixed-Capacity Circular Buffer for Time-Series Samples
//!
//! ## Overview
//!
//! Every rolling statistic in the engine is computed from a [`RingBuffer`]:
//! a fixed-capacity, time-ordered store of `(timestamp, value, payload)`
//! samples. Storage is allocated once at construction and reused forever;
//! when full, each write overwrites the oldest slot.
//!
//! ## Design Rationale
//!
//! Combat produces bursts of tens to hundreds of events per second, but the
//! display only ever asks about the last few seconds. A ring buffer gives:
//! - O(1) writes with no allocation after construction
//! - A hard memory ceiling regardless of fight length
//! - Window queries that scan at most `capacity` slots
//!
//! Capacity is a runtime value (configured per metric) rather than a const
//! generic, so damage and healing buffers can be sized independently from
//! configuration files.
//!
//! ### Memory Layout
//!
//! ```text
//! RingBuffer (capacity 5) after 7 writes:
//! ┌─────┬─────┬─────┬─────┬─────┐
//! │  w5 │  w6 │  w2 │  w3 │  w4 │  ← slots (w = write index)
//! └─────┴─────┴─────┴─────┴─────┘
//!                ↑
//!                └── cursor = 2: next write lands here, oldest sample lives here
//! ```
//!
//! ## Queries
//!
//! Window queries take an inclusive `[start, end]` range and return samples
//! most-recent-first. Timestamps are assumed non-decreasing but this is not
//! enforced, so queries filter every live slot rather than stopping at the
//! first out-of-range sample.
//!
//! ```rust
//! use pulsemeter_core::buffer::RingBuffer;
//!
//! let mut buf: RingBuffer = RingBuffer::new(3, "damage");
//! buf.write(0.0, 100.0, None);
//! buf.write(1.0, 200.0, None);
//! buf.write(2.0, 300.0, None);
//! buf.write(3.0, 400.0, None); // overwrites the t=0 sample
//!
//! assert_eq!(buf.sum_window(1.0, 3.0), 900.0);
//! let recent: Vec<f64> = buf.query_window(0.0, 10.0).map(|s| s.value).collect();
//! assert_eq!(recent, vec![400.0, 300.0, 200.0]);
//! ```

use std::collections::HashMap;

use serde::Serialize;

use crate::constants::buffers::DEFAULT_BUFFER_CAPACITY;
use crate::time::Timestamp;

/// One observation stored in a ring buffer slot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample<P = ()> {
    /// Relative time of the observation in seconds
    pub timestamp: Timestamp,
    /// Observed value
    pub value: f64,
    /// Optional caller data carried with the sample
    pub payload: Option<P>,
}

/// Maximum over a window, with where it happened
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WindowMax {
    /// Largest value in the window (0.0 when the window is empty)
    pub value: f64,
    /// Timestamp of the largest value (0.0 when the window is empty)
    pub timestamp: Timestamp,
    /// Number of samples that fell in the window
    pub count: usize,
}

/// Point-in-time statistics for diagnostics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BufferStats {
    pub label: String,
    pub capacity: usize,
    pub len: usize,
    pub total_writes: u64,
    pub overwrites: u64,
}

/// Fixed-capacity ring buffer of timestamped samples
///
/// ## Internal Invariants
///
/// - `cursor < capacity` (next write position is always valid)
/// - `len <= capacity`
/// - after `k >= capacity` writes, the live samples are exactly writes
///   `k - capacity .. k`
#[derive(Debug, Clone)]
pub struct RingBuffer<P = ()> {
    /// Slot storage; `None` marks slots never written since construction
    slots: Vec<Option<Sample<P>>>,
    label: String,
    /// Index where the next write will occur
    cursor: usize,
    /// Number of live samples
    len: usize,
    total_writes: u64,
    overwrites: u64,
}

impl<P> RingBuffer<P> {
    /// Creates an empty buffer holding at most `capacity` samples
    ///
    /// A zero capacity is bumped to one so writes always have a slot.
    pub fn new(capacity: usize, label: impl Into<String>) -> Self {
        let capacity = capacity.max(1);
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots,
            label: label.into(),
            cursor: 0,
            len: 0,
            total_writes: 0,
            overwrites: 0,
        }
    }

    /// Records a sample, overwriting the oldest one when full
    pub fn write(&mut self, timestamp: Timestamp, value: f64, payload: Option<P>) {
        if self.len == self.capacity() {
            self.overwrites += 1;
        } else {
            self.len += 1;
        }
        self.slots[self.cursor] = Some(Sample { timestamp, value, payload });
        self.cursor = (self.cursor + 1) % self.capacity();
        self.total_writes += 1;
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Writes since construction or the last [`clear`](Self::clear)
    pub fn total_writes(&self) -> u64 {
        self.total_writes
    }

    /// Writes that replaced a live sample
    pub fn overwrites(&self) -> u64 {
        self.overwrites
    }

    /// Write index of the oldest live sample, if any
    pub fn oldest_write_index(&self) -> Option<u64> {
        if self.is_empty() {
            None
        } else {
            Some(self.total_writes - self.len as u64)
        }
    }

    /// The most recent sample
    pub fn latest(&self) -> Option<&Sample<P>> {
        self.get(self.len.checked_sub(1)?)
    }

    /// The oldest live sample
    pub fn oldest(&self) -> Option<&Sample<P>> {
        self.get(0)
    }

    /// Sample by logical index (0 = oldest, len-1 = newest)
    ///
    /// When the buffer has wrapped, the oldest sample sits at the cursor:
    ///
    /// ```text
    /// Physical:  [D, E, A, B, C]  (cursor = 2)
    /// Logical:   [A, B, C, D, E]
    /// logical[i] = physical[(cursor + i) % capacity]
    /// ```
    pub fn get(&self, index: usize) -> Option<&Sample<P>> {
        if index >= self.len {
            return None;
        }
        let start = if self.is_full() { self.cursor } else { 0 };
        self.slots[(start + index) % self.capacity()].as_ref()
    }

    /// Iterate oldest to newest
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Sample<P>> + '_ {
        (0..self.len).filter_map(move |i| self.get(i))
    }

    /// Iterate newest to oldest
    pub fn iter_recent(&self) -> impl Iterator<Item = &Sample<P>> + '_ {
        self.iter().rev()
    }

    /// Samples with `start <= timestamp <= end`, most recent first
    ///
    /// The returned iterator is `Clone`, so a window can be walked more than
    /// once without re-querying.
    pub fn query_window(&self, start: Timestamp, end: Timestamp) -> WindowIter<'_, P> {
        WindowIter {
            buffer: self,
            remaining: self.len,
            start,
            end,
        }
    }

    /// Samples from the trailing `seconds` ending at `now`
    pub fn query_last_seconds(&self, seconds: f64, now: Timestamp) -> WindowIter<'_, P> {
        self.query_window(now - seconds, now)
    }

    /// Sum of values in `[start, end]`; 0.0 for an empty window
    pub fn sum_window(&self, start: Timestamp, end: Timestamp) -> f64 {
        self.query_window(start, end).map(|s| s.value).sum()
    }

    /// Number of samples in `[start, end]`
    pub fn count_window(&self, start: Timestamp, end: Timestamp) -> usize {
        self.query_window(start, end).count()
    }

    /// Mean of values in `[start, end]`; 0.0 for an empty window
    pub fn average_window(&self, start: Timestamp, end: Timestamp) -> f64 {
        let (sum, count) = self
            .query_window(start, end)
            .fold((0.0, 0usize), |(sum, count), s| (sum + s.value, count + 1));
        if count == 0 {
            0.0
        } else {
            sum / count as f64
        }
    }

    /// Largest value in `[start, end]` with its timestamp and the window's sample count
    ///
    /// Ties keep the most recent sample.
    pub fn max_window(&self, start: Timestamp, end: Timestamp) -> WindowMax {
        let mut best: Option<&Sample<P>> = None;
        let mut count = 0;
        for sample in self.query_window(start, end) {
            count += 1;
            if best.map_or(true, |b| sample.value > b.value) {
                best = Some(sample);
            }
        }
        match best {
            Some(sample) => WindowMax {
                value: sample.value,
                timestamp: sample.timestamp,
                count,
            },
            None => WindowMax::default(),
        }
    }

    /// Drop all samples, keeping the allocated storage
    pub fn clear(&mut self) {
        self.cursor = 0;
        self.len = 0;
        self.total_writes = 0;
        self.overwrites = 0;
    }

    pub fn stats(&self) -> BufferStats {
        BufferStats {
            label: self.label.clone(),
            capacity: self.capacity(),
            len: self.len,
            total_writes: self.total_writes,
            overwrites: self.overwrites,
        }
    }
}

/// Iterator over a time window, most recent sample first
pub struct WindowIter<'a, P> {
    buffer: &'a RingBuffer<P>,
    /// Logical indices not yet visited, counting down from the newest
    remaining: usize,
    start: Timestamp,
    end: Timestamp,
}

impl<P> Clone for WindowIter<'_, P> {
    fn clone(&self) -> Self {
        Self {
            buffer: self.buffer,
            remaining: self.remaining,
            start: self.start,
            end: self.end,
        }
    }
}

impl<'a, P> Iterator for WindowIter<'a, P> {
    type Item = &'a Sample<P>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.remaining > 0 {
            self.remaining -= 1;
            let sample = self.buffer.get(self.remaining)?;
            if sample.timestamp >= self.start && sample.timestamp <= self.end {
                return Some(sample);
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}

/// Named ring buffers, created on first request
///
/// Lets each metric own a buffer sized for its own event rate while
/// diagnostics enumerate all of them in one place.
#[derive(Debug)]
pub struct BufferRegistry<P = ()> {
    buffers: HashMap<String, RingBuffer<P>>,
}

impl<P> BufferRegistry<P> {
    pub fn new() -> Self {
        Self { buffers: HashMap::new() }
    }

    /// Returns the buffer named `name`, creating it with `capacity` if absent
    ///
    /// Idempotent: an existing buffer keeps its original capacity.
    pub fn get_or_create(&mut self, name: &str, capacity: usize) -> &mut RingBuffer<P> {
        if let Some(existing) = self.buffers.get(name) {
            if existing.capacity() != capacity.max(1) {
                log::debug!(
                    "buffer '{name}' already exists with capacity {}, ignoring requested {capacity}",
                    existing.capacity()
                );
            }
        }
        self.buffers.entry(name.to_string()).or_insert_with(|| {
            log::debug!("creating ring buffer '{name}' with capacity {capacity}");
            RingBuffer::new(capacity, name)
        })
    }

    /// Same as [`get_or_create`](Self::get_or_create) with the default capacity
    pub fn get_or_default(&mut self, name: &str) -> &mut RingBuffer<P> {
        self.get_or_create(name, DEFAULT_BUFFER_CAPACITY)
    }

    pub fn get(&self, name: &str) -> Option<&RingBuffer<P>> {
        self.buffers.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut RingBuffer<P>> {
        self.buffers.get_mut(name)
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Clear every buffer's samples
    pub fn clear_all(&mut self) {
        for buffer in self.buffers.values_mut() {
            buffer.clear();
        }
    }

    /// Stats for every buffer, sorted by label
    pub fn stats(&self) -> Vec<BufferStats> {
        let mut stats: Vec<_> = self.buffers.values().map(RingBuffer::stats).collect();
        stats.sort_by(|a, b| a.label.cmp(&b.label));
        stats
    }
}

impl<P> Default for BufferRegistry<P> {
    fn default() -> Self {
        Self::new()
    }
}
