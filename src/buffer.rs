//! Fixed-capacity ring buffer with independent write and read cursors.
//!
//! The buffer is the storage core of a capture session: writes advance the
//! `head` cursor and overwrite the oldest slot once the buffer is full, which
//! keeps ingestion O(1) and memory bounded under continuous capture. The
//! `tail` cursor is the live read position and moves independently, so a
//! viewer can scrub backwards through history (`peek`) or replant the read
//! position (`set_tail`) without disturbing ongoing writes.
//!
//! The buffer has no concurrency of its own; the owning session guards it
//! with a single lock.

use crate::error::{ReplayError, ReplayResult};

/// Circular frame store with separate head (write) and tail (read) cursors.
///
/// Generic over the slot type: capture sessions store `SharedFrame`, tests
/// use plain integers. Valid peek/set-tail positions are the half-open range
/// `[0, upper)` where `upper` is `capacity` once full and `head` before that,
/// so a valid position always references a written slot.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    capacity: usize,
    slots: Vec<T>,
    head: usize,
    tail: usize,
}

impl<T: Clone> RingBuffer<T> {
    /// Create an empty buffer. Capacity zero is rejected; larger-than-memory
    /// capacities are the caller's problem, slots are only allocated as
    /// frames arrive.
    pub fn new(capacity: usize) -> ReplayResult<Self> {
        if capacity == 0 {
            return Err(ReplayError::InvalidCapacity { capacity });
        }
        Ok(Self {
            capacity,
            slots: Vec::with_capacity(capacity),
            head: 0,
            tail: 0,
        })
    }

    /// Write a frame at the head position, overwriting the oldest frame when
    /// the buffer is full. Cannot fail for a valid frame.
    pub fn write(&mut self, frame: T) {
        if self.slots.len() < self.capacity {
            // While filling up, head always equals slots.len().
            self.slots.push(frame);
        } else {
            self.slots[self.head] = frame;
        }
        self.head = (self.head + 1) % self.capacity;
    }

    /// Read the frame at the tail and advance the tail cursor.
    ///
    /// This is a destructive-cursor read: storage is untouched (the frame
    /// remains peekable until overwritten), only the cursor moves. Returns
    /// `None` on an empty buffer, or when the tail has caught up with the
    /// head while the buffer is still filling (no frame written there yet).
    pub fn read_at_tail(&mut self) -> Option<T> {
        if self.tail >= self.slots.len() {
            return None;
        }
        let frame = self.slots[self.tail].clone();
        self.tail = (self.tail + 1) % self.capacity;
        Some(frame)
    }

    /// Read the frame at `position` without moving any cursor.
    pub fn peek(&self, position: usize) -> ReplayResult<T> {
        let upper = self.upper();
        if position >= upper {
            return Err(ReplayError::InvalidPosition { position, upper });
        }
        Ok(self.slots[position].clone())
    }

    /// Relocate the read cursor. An out-of-range position falls back to the
    /// head position (defined safe default, never a silent wraparound).
    pub fn set_tail(&mut self, position: usize) {
        let upper = self.upper();
        if position < upper {
            self.tail = position;
        } else {
            log::warn!(
                "[BUFFER] invalid tail position {} (valid range 0..{}), tail set to head",
                position,
                upper
            );
            self.tail = self.head;
        }
    }

    /// Park the tail at the head so the next read returns the next frame
    /// written. Used when returning to live viewing; valid even while the
    /// head slot is still unwritten.
    pub fn snap_tail_to_head(&mut self) {
        self.tail = self.head;
    }

    /// Empty the buffer and reset both cursors.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.head = 0;
        self.tail = 0;
    }

    /// Rebuild the buffer with a new capacity, preserving existing frames in
    /// logical write order and truncating oldest-first when shrinking.
    ///
    /// After a resize the slots are laid out oldest-to-newest from index 0,
    /// the head points at the next write slot and the tail at the oldest
    /// retained frame.
    pub fn resize(&mut self, new_capacity: usize) -> ReplayResult<()> {
        if new_capacity == 0 {
            return Err(ReplayError::InvalidCapacity {
                capacity: new_capacity,
            });
        }
        let mut frames = self.snapshot();
        if frames.len() > new_capacity {
            let excess = frames.len() - new_capacity;
            frames.drain(..excess);
        }
        self.head = frames.len() % new_capacity;
        self.tail = 0;
        self.capacity = new_capacity;
        self.slots = frames;
        Ok(())
    }

    /// Copy of the contents in logical write order, oldest to newest. This is
    /// the frozen view handed to the exporter.
    pub fn snapshot(&self) -> Vec<T> {
        let len = self.slots.len();
        let start = self.oldest_position();
        (0..len)
            .map(|i| self.slots[(start + i) % self.capacity].clone())
            .collect()
    }

    /// Physical index of the logically oldest written slot. Playback starts
    /// here. Zero on an empty buffer.
    pub fn oldest_position(&self) -> usize {
        if self.is_full() {
            self.head
        } else {
            0
        }
    }

    /// The most recently written frame, if any.
    pub fn latest(&self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        let newest = (self.head + self.capacity - 1) % self.capacity;
        Some(self.slots[newest].clone())
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.slots.len() == self.capacity
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn head_position(&self) -> usize {
        self.head
    }

    pub fn tail_position(&self) -> usize {
        self.tail
    }

    /// Exclusive upper bound of valid positions: `capacity` once full, `head`
    /// while still filling. At least 1 whenever the buffer is non-empty.
    fn upper(&self) -> usize {
        if self.is_full() {
            self.capacity
        } else {
            self.head
        }
    }
}
