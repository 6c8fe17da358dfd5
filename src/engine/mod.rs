//! Event-scheduling engines.
//!
//! Two engines implement the [`Engine`] contract:
//!
//! - [`SerialEngine`](serial::SerialEngine) dispatches one event at a time.
//! - [`ParallelEngine`](parallel::ParallelEngine) dispatches every event of
//!   one timestamp and one class concurrently, then waits for all of them
//!   before moving on.
//!
//! Both guarantee a total order across distinct timestamps and run primary
//! events before secondary events at equal timestamps. Neither orders events
//! that share a timestamp and a class.

pub mod parallel;
pub mod serial;

use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex, ReentrantMutex};
use serde::{Deserialize, Serialize};

use crate::error::SimResult;
use crate::event::Event;
use crate::hooking::{HookCtx, HookItem, HookPos, HookRegistry, Hookable};
use crate::types::SimTime;

pub use parallel::ParallelEngine;
pub use serial::SerialEngine;

/// Receives a single notification when an engine's run drains its queues.
pub trait SimulationEndHandler: Send + Sync {
    fn handle(&self, now: SimTime);
}

/// The scheduling contract every engine implements.
///
/// Engines are shared (`Arc<dyn Engine>`) between the code that builds the
/// topology and the components that schedule events from inside handlers,
/// so every method takes `&self`.
pub trait Engine: Hookable + Send + Sync {
    /// Queues an event.
    ///
    /// # Panics
    ///
    /// Panics if `event.time()` precedes [`current_time`](Engine::current_time).
    fn schedule(&self, event: Event);

    /// Dispatches events until every queue is empty.
    fn run(&self) -> SimResult<()>;

    /// Stops dispatching after the event (or round) in flight completes.
    ///
    /// When called from outside a handler this blocks until any in-flight
    /// dispatch has finished.
    fn pause(&self);

    /// Lets a paused engine dispatch again.
    fn resume(&self);

    /// The timestamp of the most recently started dispatch.
    fn current_time(&self) -> SimTime;

    /// Registers a handler notified when `run` finishes.
    fn register_simulation_end_handler(&self, handler: Arc<dyn SimulationEndHandler>);

    /// Snapshot of the engine's counters.
    fn stats(&self) -> EngineStats;

    /// Exports statistics as JSON.
    fn export_stats(&self) -> serde_json::Value {
        let stats = self.stats();
        serde_json::json!({
            "engine": {
                "current_time": self.current_time(),
                "events_dispatched": stats.events_dispatched,
                "primary_events": stats.primary_events,
                "secondary_events": stats.secondary_events,
                "rounds": stats.rounds,
                "max_round_width": stats.max_round_width,
            }
        })
    }
}

/// Statistics collected by an engine.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    /// Total number of events handed to handlers
    pub events_dispatched: u64,
    /// Primary-class events dispatched
    pub primary_events: u64,
    /// Secondary-class events dispatched
    pub secondary_events: u64,
    /// Number of dispatch batches (one per event for the serial engine)
    pub rounds: u64,
    /// Largest number of events dispatched in one batch
    pub max_round_width: u64,
}

/// Lock-free counters behind [`EngineStats`].
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    primary_events: AtomicU64,
    secondary_events: AtomicU64,
    rounds: AtomicU64,
    max_round_width: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn record_round(&self, width: u64, secondary: bool) {
        let counter = if secondary {
            &self.secondary_events
        } else {
            &self.primary_events
        };
        counter.fetch_add(width, Ordering::Relaxed);
        self.rounds.fetch_add(1, Ordering::Relaxed);
        self.max_round_width.fetch_max(width, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> EngineStats {
        let primary_events = self.primary_events.load(Ordering::Relaxed);
        let secondary_events = self.secondary_events.load(Ordering::Relaxed);
        EngineStats {
            events_dispatched: primary_events + secondary_events,
            primary_events,
            secondary_events,
            rounds: self.rounds.load(Ordering::Relaxed),
            max_round_width: self.max_round_width.load(Ordering::Relaxed),
        }
    }
}

thread_local! {
    static IN_DISPATCH: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as running a handler until dropped.
struct DispatchScope {
    previous: bool,
}

impl DispatchScope {
    fn enter() -> Self {
        let previous = IN_DISPATCH.with(|flag| flag.replace(true));
        Self { previous }
    }
}

impl Drop for DispatchScope {
    fn drop(&mut self) {
        IN_DISPATCH.with(|flag| flag.set(self.previous));
    }
}

fn in_dispatch() -> bool {
    IN_DISPATCH.with(Cell::get)
}

/// Cooperative pause support shared by both engines.
///
/// The run loop holds `dispatch` for the duration of one dispatch (serial)
/// or one round (parallel). `pause` raises the flag and, unless it is called
/// from inside a handler, waits on `dispatch` so that it returns only once
/// nothing is in flight.
#[derive(Default)]
pub(crate) struct PauseGate {
    paused: Mutex<bool>,
    resumed: Condvar,
    dispatch: ReentrantMutex<()>,
}

impl PauseGate {
    pub(crate) fn pause(&self) {
        *self.paused.lock() = true;
        if !in_dispatch() {
            drop(self.dispatch.lock());
        }
    }

    pub(crate) fn resume(&self) {
        *self.paused.lock() = false;
        self.resumed.notify_all();
    }

    /// Blocks while paused, then takes the dispatch lock.
    pub(crate) fn enter(&self) -> parking_lot::ReentrantMutexGuard<'_, ()> {
        let mut paused = self.paused.lock();
        while *paused {
            self.resumed.wait(&mut paused);
        }
        drop(paused);
        self.dispatch.lock()
    }
}

/// Aborts on an attempt to move time backwards.
pub(crate) fn reject_past(what: &str, time: SimTime, now: SimTime) {
    if time < now {
        tracing::error!(time, now, "{what} in the past");
        panic!("cannot {what} at cycle {time}: current time is {now}");
    }
}

/// Hands one event to its handler, surrounded by the engine's hooks.
pub(crate) fn dispatch(domain: &str, hooks: &HookRegistry, event: &Event) -> SimResult<()> {
    let _scope = DispatchScope::enter();

    hooks.invoke(&HookCtx {
        domain,
        pos: HookPos::BeforeEvent,
        item: HookItem::Event(event),
    });

    tracing::trace!(time = event.time(), secondary = event.is_secondary(), "dispatch");
    let result = event.handler().handle(event);

    hooks.invoke(&HookCtx {
        domain,
        pos: HookPos::AfterEvent,
        item: HookItem::Event(event),
    });

    result
}
