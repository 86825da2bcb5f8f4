//! Fixed-capacity rolling sample store shared between ingest and presentation.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::parse::Sample;

/// Rolling window of the most recent `capacity` samples.
///
/// Always holds exactly `capacity` slots: each push evicts the oldest one.
/// A single mutex guards the slots, so `snapshot` never observes a
/// half-applied push or clear.
pub struct RingBuffer {
    inner: Mutex<Inner>,
    capacity: usize,
}

struct Inner {
    slots: Vec<Sample>,
    /// Index of the oldest slot (and the next one to be overwritten).
    head: usize,
    /// Total pushes since construction; lets readers skip unchanged frames.
    pushes: u64,
}

impl RingBuffer {
    /// Create a zero-filled buffer.
    ///
    /// # Panics
    /// If `capacity` is zero. Config validation rejects that before we get here.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be non-zero");
        Self {
            inner: Mutex::new(Inner {
                slots: vec![0; capacity],
                head: 0,
                pushes: 0,
            }),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    // Slots are plain integers, so a poisoned lock still holds usable data.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admit `sample` as the newest value, evicting the oldest. O(1).
    pub fn push(&self, sample: Sample) {
        let mut inner = self.lock();
        let head = inner.head;
        inner.slots[head] = sample;
        inner.head = (head + 1) % self.capacity;
        inner.pushes += 1;
    }

    /// Point-in-time copy, oldest first. Length is always `capacity`.
    pub fn snapshot(&self) -> Vec<Sample> {
        self.tagged_snapshot().1
    }

    /// Snapshot together with the push count it reflects.
    pub fn tagged_snapshot(&self) -> (u64, Vec<Sample>) {
        let inner = self.lock();
        let mut out = Vec::with_capacity(self.capacity);
        out.extend_from_slice(&inner.slots[inner.head..]);
        out.extend_from_slice(&inner.slots[..inner.head]);
        (inner.pushes, out)
    }

    /// Newest sample.
    pub fn latest(&self) -> Sample {
        let inner = self.lock();
        inner.slots[(inner.head + self.capacity - 1) % self.capacity]
    }

    /// Reset every slot to zero.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.slots.fill(0);
        inner.head = 0;
        inner.pushes += 1;
    }
}
