//! Fixed-capacity FIFO of vertex ids backed by a ring buffer.

use crate::engine::SimulationError;

/// Ring-buffer queue that never reallocates while in use.
#[derive(Debug, Clone)]
pub struct BfsQueue {
    slots: Vec<usize>,
    head: usize,
    len: usize,
}

impl BfsQueue {
    /// Creates an empty queue holding up to `capacity` elements.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![0; capacity],
            head: 0,
            len: 0,
        }
    }

    /// Grows the queue to hold at least `capacity` elements, dropping its
    /// contents.
    pub fn ensure(&mut self, capacity: usize) {
        if capacity > self.slots.len() {
            self.slots = vec![0; capacity];
        }
        self.clear();
    }

    /// Maximum number of elements.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of queued elements.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Drops every queued element.
    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }

    /// Appends `element` at the back.
    ///
    /// # Errors
    ///
    /// - `SimulationError::QueueCapacity` - If the queue is full
    pub fn add_last(&mut self, element: usize) -> Result<(), SimulationError> {
        let capacity = self.capacity();
        if self.len == capacity {
            return Err(SimulationError::QueueCapacity {
                capacity,
                requested: self.len + 1,
            });
        }
        self.slots[(self.head + self.len) % capacity] = element;
        self.len += 1;
        Ok(())
    }

    /// Returns the front element without removing it.
    pub fn peek_first(&self) -> Option<usize> {
        (!self.is_empty()).then(|| self.slots[self.head])
    }

    /// Removes and returns the front element.
    pub fn remove_first(&mut self) -> Option<usize> {
        let element = self.peek_first()?;
        self.head = (self.head + 1) % self.capacity();
        self.len -= 1;
        Some(element)
    }
}
