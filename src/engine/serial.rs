//! Single-threaded event engine.
//!
//! `SerialEngine` keeps a primary and a secondary [`EventQueue`] and always
//! dispatches the globally earliest event, taking the primary one when both
//! queues hold an event at the same cycle.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::engine::{dispatch, reject_past, Engine, EngineStats, PauseGate, SimulationEndHandler, StatsCounters};
use crate::error::SimResult;
use crate::event::Event;
use crate::hooking::{HookRegistry, Hookable};
use crate::queue::EventQueue;
use crate::types::SimTime;

/// An engine that dispatches one event at a time, in time order.
///
/// # Example
///
/// ```ignore
/// let engine = Arc::new(SerialEngine::new());
/// engine.schedule(Event::tick(10, handler));
/// engine.run()?;
/// assert_eq!(engine.current_time(), 10);
/// ```
pub struct SerialEngine {
    name: String,
    now: AtomicU64,
    queue: EventQueue,
    secondary_queue: EventQueue,
    gate: PauseGate,
    hooks: HookRegistry,
    end_handlers: Mutex<Vec<Arc<dyn SimulationEndHandler>>>,
    stats: StatsCounters,
}

impl SerialEngine {
    /// Creates an idle engine at cycle 0.
    pub fn new() -> Self {
        Self::with_name("serial_engine")
    }

    /// Creates an idle engine that reports `name` to its hooks.
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            now: AtomicU64::new(0),
            queue: EventQueue::new(),
            secondary_queue: EventQueue::new(),
            gate: PauseGate::default(),
            hooks: HookRegistry::new(),
            end_handlers: Mutex::new(Vec::new()),
            stats: StatsCounters::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of events waiting in both queues.
    pub fn pending(&self) -> usize {
        self.queue.len() + self.secondary_queue.len()
    }

    /// Removes the earliest event, preferring primary over secondary on ties.
    fn next_event(&self) -> Option<Event> {
        match (self.queue.peek_time(), self.secondary_queue.peek_time()) {
            (None, None) => None,
            (Some(_), None) => self.queue.pop(),
            (None, Some(_)) => self.secondary_queue.pop(),
            (Some(primary), Some(secondary)) => {
                if primary <= secondary {
                    self.queue.pop()
                } else {
                    self.secondary_queue.pop()
                }
            }
        }
    }

    fn finish(&self) {
        let now = self.current_time();
        tracing::debug!(engine = %self.name, now, "queues drained");
        let handlers = self.end_handlers.lock().clone();
        for handler in handlers {
            handler.handle(now);
        }
    }
}

impl Default for SerialEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Hookable for SerialEngine {
    fn hook_registry(&self) -> &HookRegistry {
        &self.hooks
    }
}

impl Engine for SerialEngine {
    fn schedule(&self, event: Event) {
        reject_past("schedule", event.time(), self.current_time());

        if event.is_secondary() {
            self.secondary_queue.push(event);
        } else {
            self.queue.push(event);
        }
    }

    fn run(&self) -> SimResult<()> {
        loop {
            let _guard = self.gate.enter();
            let Some(event) = self.next_event() else {
                break;
            };

            reject_past("dispatch", event.time(), self.current_time());
            self.now.store(event.time(), Ordering::SeqCst);
            self.stats.record_round(1, event.is_secondary());

            dispatch(&self.name, &self.hooks, &event)?;
        }

        self.finish();
        Ok(())
    }

    fn pause(&self) {
        self.gate.pause();
    }

    fn resume(&self) {
        self.gate.resume();
    }

    fn current_time(&self) -> SimTime {
        self.now.load(Ordering::SeqCst)
    }

    fn register_simulation_end_handler(&self, handler: Arc<dyn SimulationEndHandler>) {
        self.end_handlers.lock().push(handler);
    }

    fn stats(&self) -> EngineStats {
        self.stats.snapshot()
    }
}
