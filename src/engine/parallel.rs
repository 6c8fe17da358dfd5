//! Barrier-synchronized parallel event engine.
//!
//! The engine advances in rounds. Each round picks the earliest timestamp
//! across all primary shards and all secondary shards, fixes the class of
//! that timestamp (primary wins ties), removes every event of that class at
//! that timestamp from every shard, and runs them concurrently. The round
//! ends only after all of them have returned, so every effect of cycle `T`
//! is complete before anything at a later cycle starts.
//!
//! Nothing orders the events inside a round. Handlers that run in the same
//! round must only touch state owned by their own target, otherwise results
//! depend on thread timing.
//!
//! # Feature Flag
//!
//! Concurrent dispatch requires the `parallel` feature (on by default).
//! Without it a round's events run one after another on the calling thread;
//! round boundaries are unchanged.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;

use crate::engine::{dispatch, reject_past, Engine, EngineStats, PauseGate, SimulationEndHandler, StatsCounters};
use crate::error::SimResult;
use crate::event::Event;
use crate::hooking::{HookRegistry, Hookable};
use crate::queue::EventQueue;
use crate::types::SimTime;

/// Parallel simulation engine.
///
/// # Example
///
/// ```ignore
/// let engine = Arc::new(ParallelEngine::new().with_threads(4)?);
/// engine.schedule(Event::tick(2, core_a));
/// engine.schedule(Event::tick(2, core_b));
/// engine.run()?; // core_a and core_b tick concurrently
/// ```
pub struct ParallelEngine {
    name: String,
    now: AtomicU64,
    /// Primary event shards
    queues: Vec<EventQueue>,
    /// Secondary event shards, same count as `queues`
    secondary_queues: Vec<EventQueue>,
    /// Tokens naming shards nobody is currently pushing into
    free_tx: Sender<usize>,
    free_rx: Receiver<usize>,
    gate: PauseGate,
    hooks: HookRegistry,
    end_handlers: Mutex<Vec<Arc<dyn SimulationEndHandler>>>,
    stats: StatsCounters,
    #[cfg(feature = "parallel")]
    pool: Option<rayon::ThreadPool>,
}

impl ParallelEngine {
    /// Creates an engine with one shard per available hardware thread.
    pub fn new() -> Self {
        let shards = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::with_shards(shards)
    }

    /// Creates an engine with `shards` primary and `shards` secondary queues.
    pub fn with_shards(shards: usize) -> Self {
        let shards = if shards == 0 {
            tracing::warn!("parallel engine requested with 0 shards, using 1");
            1
        } else {
            shards
        };

        let (free_tx, free_rx) = channel::bounded(shards);
        for shard in 0..shards {
            // The channel is sized for exactly this many tokens.
            let _ = free_tx.send(shard);
        }

        Self {
            name: "parallel_engine".to_string(),
            now: AtomicU64::new(0),
            queues: (0..shards).map(|_| EventQueue::new()).collect(),
            secondary_queues: (0..shards).map(|_| EventQueue::new()).collect(),
            free_tx,
            free_rx,
            gate: PauseGate::default(),
            hooks: HookRegistry::new(),
            end_handlers: Mutex::new(Vec::new()),
            stats: StatsCounters::default(),
            #[cfg(feature = "parallel")]
            pool: None,
        }
    }

    /// Sets the name reported to hooks.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Runs rounds on a dedicated pool of `threads` workers.
    ///
    /// Pass 0 to use rayon's global pool.
    #[cfg(feature = "parallel")]
    pub fn with_threads(mut self, threads: usize) -> SimResult<Self> {
        if threads > 0 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .thread_name(|i| format!("chronokern-worker-{i}"))
                .build()
                .map_err(|e| crate::error::SimError::WorkerPool(e.to_string()))?;
            self.pool = Some(pool);
        }
        Ok(self)
    }

    /// Without the `parallel` feature rounds always run on the caller.
    #[cfg(not(feature = "parallel"))]
    pub fn with_threads(self, threads: usize) -> SimResult<Self> {
        if threads > 1 {
            tracing::warn!(threads, "`parallel` feature disabled, rounds run sequentially");
        }
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of primary shards (equal to the number of secondary shards).
    pub fn shard_count(&self) -> usize {
        self.queues.len()
    }

    /// Number of events waiting across all shards.
    pub fn pending(&self) -> usize {
        self.queues
            .iter()
            .chain(self.secondary_queues.iter())
            .map(EventQueue::len)
            .sum()
    }

    fn earliest(shards: &[EventQueue]) -> Option<SimTime> {
        shards.iter().filter_map(EventQueue::peek_time).min()
    }

    /// Picks the timestamp and class of the next round.
    fn next_round(&self) -> Option<(SimTime, bool)> {
        match (Self::earliest(&self.queues), Self::earliest(&self.secondary_queues)) {
            (None, None) => None,
            (Some(primary), None) => Some((primary, false)),
            (None, Some(secondary)) => Some((secondary, true)),
            (Some(primary), Some(secondary)) => {
                if primary <= secondary {
                    Some((primary, false))
                } else {
                    Some((secondary, true))
                }
            }
        }
    }

    #[cfg(feature = "parallel")]
    fn dispatch_round(&self, events: &[Event]) -> SimResult<()> {
        if let [event] = events {
            return dispatch(&self.name, &self.hooks, event);
        }

        let run = || {
            events
                .par_iter()
                .try_for_each(|event| dispatch(&self.name, &self.hooks, event))
        };
        match &self.pool {
            Some(pool) => pool.install(run),
            None => run(),
        }
    }

    #[cfg(not(feature = "parallel"))]
    fn dispatch_round(&self, events: &[Event]) -> SimResult<()> {
        events
            .iter()
            .try_for_each(|event| dispatch(&self.name, &self.hooks, event))
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

impl Default for ParallelEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Hookable for ParallelEngine {
    fn hook_registry(&self) -> &HookRegistry {
        &self.hooks
    }
}

impl Engine for ParallelEngine {
    fn schedule(&self, event: Event) {
        reject_past("schedule", event.time(), self.current_time());

        // Both channel ends live as long as the engine, so recv cannot fail.
        let Ok(shard) = self.free_rx.recv() else {
            unreachable!("free-shard channel disconnected");
        };

        if event.is_secondary() {
            self.secondary_queues[shard].push(event);
        } else {
            self.queues[shard].push(event);
        }

        // Only this engine holds tokens, so the channel always has room.
        let Ok(()) = self.free_tx.send(shard) else {
            unreachable!("free-shard channel disconnected");
        };
    }

    fn run(&self) -> SimResult<()> {
        loop {
            let _guard = self.gate.enter();
            let Some((now, secondary)) = self.next_round() else {
                break;
            };

            reject_past("dispatch", now, self.current_time());
            self.now.store(now, Ordering::SeqCst);

            let shards = if secondary {
                &self.secondary_queues
            } else {
                &self.queues
            };
            let events: Vec<Event> = shards.iter().flat_map(|q| q.drain_at(now)).collect();

            tracing::debug!(now, secondary, width = events.len(), "round");
            self.stats.record_round(events.len() as u64, secondary);

            self.dispatch_round(&events)?;
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
