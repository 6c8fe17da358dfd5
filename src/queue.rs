//! Thread-safe time-ordered event queue.
//!
//! A min-heap keyed by event time. Entries with equal times come out in no
//! particular order. Each queue carries its own lock so that the parallel
//! engine can operate several shards from different threads.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use parking_lot::Mutex;

use crate::event::Event;
use crate::types::SimTime;

/// Heap entry ordered so that the earliest event sits on top.
struct Entry(Event);

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.0.time() == other.0.time()
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse on time.
        other.0.time().cmp(&self.0.time())
    }
}

/// A mutex-guarded priority queue of events.
#[derive(Default)]
pub struct EventQueue {
    heap: Mutex<BinaryHeap<Entry>>,
}

impl EventQueue {
    /// Creates a new empty queue.
    pub fn new() -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
        }
    }

    /// Inserts an event.
    pub fn push(&self, event: Event) {
        self.heap.lock().push(Entry(event));
    }

    /// Removes and returns the earliest event, or `None` when empty.
    pub fn pop(&self) -> Option<Event> {
        self.heap.lock().pop().map(|entry| entry.0)
    }

    /// Returns a copy of the earliest event without removing it.
    pub fn peek(&self) -> Option<Event> {
        self.heap.lock().peek().map(|entry| entry.0.clone())
    }

    /// Returns the time of the earliest event.
    pub fn peek_time(&self) -> Option<SimTime> {
        self.heap.lock().peek().map(|entry| entry.0.time())
    }

    /// Removes every event scheduled exactly at `time`.
    ///
    /// Events earlier than `time` are left in place; the caller is expected to
    /// have drained them already.
    pub fn drain_at(&self, time: SimTime) -> Vec<Event> {
        let mut heap = self.heap.lock();
        let mut drained = Vec::new();
        while heap.peek().is_some_and(|entry| entry.0.time() == time) {
            if let Some(entry) = heap.pop() {
                drained.push(entry.0);
            }
        }
        drained
    }

    /// Returns the number of pending events.
    pub fn len(&self) -> usize {
        self.heap.lock().len()
    }

    /// Returns true if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.heap.lock().is_empty()
    }
}
