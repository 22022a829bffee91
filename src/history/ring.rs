//! Fixed-capacity circular history.

use crate::error::{BufferError, Result};

/// Oldest-first window over the most recent `capacity` values.
///
/// Slots are allocated once at construction; `push` never reallocates.
pub struct HistoryRing<T> {
    /// Value slots, indexed modulo capacity.
    slots: Vec<Option<T>>,
    /// Index of the oldest retained value.
    head: usize,
    /// Number of retained values.
    len: usize,
    /// Values ever pushed.
    total_written: u64,
    /// Values overwritten by newer pushes.
    evicted: u64,
}

impl<T> HistoryRing<T> {
    /// Create an empty ring retaining at most `capacity` values.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(BufferError::InvalidConfiguration(
                "capacity must be at least 1".to_string(),
            ));
        }

        let mut slots = Vec::new();
        slots.try_reserve_exact(capacity).map_err(|e| {
            BufferError::ResourceExhausted(format!("history of {} slots: {}", capacity, e))
        })?;
        slots.resize_with(capacity, || None);

        Ok(Self {
            slots,
            head: 0,
            len: 0,
            total_written: 0,
            evicted: 0,
        })
    }

    /// Append a value, returning the evicted oldest value if the ring was full.
    pub fn push(&mut self, value: T) -> Option<T> {
        let capacity = self.slots.len();
        self.total_written += 1;

        if self.len < capacity {
            let tail = (self.head + self.len) % capacity;
            self.slots[tail] = Some(value);
            self.len += 1;
            return None;
        }

        // Full: the oldest slot is reused for the new value.
        let evicted = self.slots[self.head].replace(value);
        self.head = (self.head + 1) % capacity;
        self.evicted += 1;
        evicted
    }

    /// Iterate retained values oldest-first.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        let capacity = self.slots.len();
        (0..self.len).filter_map(move |i| self.slots[(self.head + i) % capacity].as_ref())
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn total_written(&self) -> u64 {
        self.total_written
    }

    pub fn evicted(&self) -> u64 {
        self.evicted
    }
}

impl<T: Clone> HistoryRing<T> {
    /// Copy the retained values, oldest-first.
    pub fn snapshot(&self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.len);
        out.extend(self.iter().cloned());
        out
    }
}
