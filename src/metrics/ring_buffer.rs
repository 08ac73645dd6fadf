//! Bounded FIFO ring used for histogram windows, the request window and
//! the alert history.
//!
//! Pushing into a full ring evicts the oldest entry, so the ring always
//! holds the most recent `capacity` items in arrival order.

use std::collections::VecDeque;

/// Fixed-capacity ring that evicts its oldest entry on overflow
#[derive(Debug, Clone)]
pub struct BoundedRing<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedRing<T> {
    /// Create a new ring with the specified capacity
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Capacity must be greater than 0");

        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an item, returning the evicted oldest item if the ring was full
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() == self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    /// Get current number of items in the ring
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if the ring is empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Get ring capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterate from oldest to newest
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.items.iter()
    }
}

impl<T: Clone> BoundedRing<T> {
    /// The newest `limit` items, oldest first
    pub fn recent(&self, limit: usize) -> Vec<T> {
        let skip = self.items.len().saturating_sub(limit);
        self.items.iter().skip(skip).cloned().collect()
    }
}
