//! Bounded FIFO buffer.
//!
//! Ports use two of these; components can use them for internal queues.

use std::collections::VecDeque;

/// A first-in first-out queue with a fixed capacity.
#[derive(Clone, Debug)]
pub struct Buffer<T> {
    name: String,
    capacity: usize,
    elements: VecDeque<T>,
}

impl<T> Buffer<T> {
    /// Creates an empty buffer holding at most `capacity` elements.
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            capacity,
            elements: VecDeque::with_capacity(capacity),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn size(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.elements.len() >= self.capacity
    }

    /// Returns true if one more element fits.
    pub fn can_push(&self) -> bool {
        !self.is_full()
    }

    /// Appends `element`, handing it back if the buffer is full.
    pub fn push(&mut self, element: T) -> Result<(), T> {
        if self.is_full() {
            return Err(element);
        }
        self.elements.push_back(element);
        Ok(())
    }

    pub fn pop(&mut self) -> Option<T> {
        self.elements.pop_front()
    }

    pub fn peek(&self) -> Option<&T> {
        self.elements.front()
    }

    pub fn clear(&mut self) {
        self.elements.clear();
    }
}
