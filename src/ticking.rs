//! Self-throttling tick scheduling.
//!
//! A ticking component recomputes its state on clock ticks, but only while
//! it has work. Message arrivals, freed buffer slots and its own progress all
//! ask for a tick; [`TickScheduler`] collapses those requests so that at most
//! one tick event per component is ever pending.
//!
//! The scheduler remembers the time of the latest tick it scheduled and
//! whether that tick is still waiting for dispatch. A request is dropped when
//! the waiting tick fires at or after the requester's `now`, since that tick
//! will observe whatever prompted the request. Once the tick is dispatched, a
//! request is dropped only if it asks for a time not after the dispatched
//! tick.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::component::Component;
use crate::engine::Engine;
use crate::error::SimResult;
use crate::event::{Event, Handler};
use crate::freq::FreqDomain;
use crate::hooking::{HookRegistry, Hookable};
use crate::port::Port;
use crate::types::SimTime;

#[derive(Debug, Default)]
struct TickState {
    /// Time of the most recently scheduled tick.
    latest: Option<SimTime>,
    /// Whether that tick has yet to be dispatched.
    pending: bool,
}

/// Schedules tick events for one handler without ever stacking them.
pub struct TickScheduler {
    handler: Weak<dyn Handler>,
    engine: Arc<dyn Engine>,
    domain: Arc<FreqDomain>,
    secondary: bool,
    state: Mutex<TickState>,
}

impl TickScheduler {
    /// Creates a scheduler issuing primary tick events.
    pub fn new(handler: Weak<dyn Handler>, engine: Arc<dyn Engine>, domain: Arc<FreqDomain>) -> Self {
        Self {
            handler,
            engine,
            domain,
            secondary: false,
            state: Mutex::new(TickState::default()),
        }
    }

    /// Creates a scheduler issuing secondary tick events.
    pub fn new_secondary(
        handler: Weak<dyn Handler>,
        engine: Arc<dyn Engine>,
        domain: Arc<FreqDomain>,
    ) -> Self {
        Self {
            secondary: true,
            ..Self::new(handler, engine, domain)
        }
    }

    /// Schedules a tick at exactly `now` unless one at or after `now` is
    /// pending.
    pub fn tick_now(&self, now: SimTime) {
        self.schedule_at(now, now);
    }

    /// Schedules a tick at the domain's next tick boundary after `now`,
    /// unless one at or after `now` is pending.
    pub fn tick_later(&self, now: SimTime) {
        self.schedule_at(now, self.domain.next_tick(now));
    }

    /// Records that the pending tick has been handed to its handler.
    ///
    /// Handlers call this before doing the tick's work, so that requests
    /// raised during or after the work schedule a fresh tick.
    pub fn tick_started(&self) {
        self.state.lock().pending = false;
    }

    /// Returns true while a scheduled tick has not been dispatched.
    pub fn has_pending_tick(&self) -> bool {
        self.state.lock().pending
    }

    pub fn domain(&self) -> &Arc<FreqDomain> {
        &self.domain
    }

    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    /// Time of the most recently scheduled tick.
    pub fn next_tick_time(&self) -> Option<SimTime> {
        self.state.lock().latest
    }

    fn schedule_at(&self, now: SimTime, time: SimTime) {
        let mut state = self.state.lock();
        let covered = match state.latest {
            Some(latest) if state.pending => latest >= now,
            Some(latest) => latest >= time,
            None => false,
        };
        if covered {
            return;
        }

        let Some(handler) = self.handler.upgrade() else {
            tracing::warn!(time, "tick requested for a dropped handler");
            return;
        };

        state.latest = Some(time);
        state.pending = true;
        let event = Event::tick(time, handler);
        let event = if self.secondary {
            event.into_secondary()
        } else {
            event
        };
        self.engine.schedule(event);
    }
}

/// The per-tick behaviour of a [`TickingComponent`].
pub trait Ticker: Send {
    /// Advances the component by one tick. Returns true if anything changed,
    /// in which case another tick is scheduled.
    fn tick(&mut self, now: SimTime) -> bool;
}

/// A component driven by a [`Ticker`].
///
/// Ticks, message arrivals and freed port slots are all routed through one
/// [`TickScheduler`]. The ticker itself sits behind a lock that only tick
/// events take, so its state is reachable only from its own events.
pub struct TickingComponent<T> {
    name: String,
    scheduler: TickScheduler,
    ticker: Mutex<T>,
    hooks: HookRegistry,
}

impl<T: Ticker + 'static> TickingComponent<T> {
    /// Builds a ticking component.
    ///
    /// `build` receives a weak reference to the component so that it can
    /// create ports owned by it (see [`TickingComponent::component_ref`]).
    pub fn new<F>(
        name: impl Into<String>,
        engine: Arc<dyn Engine>,
        domain: Arc<FreqDomain>,
        build: F,
    ) -> Arc<Self>
    where
        F: FnOnce(&Weak<Self>) -> T,
    {
        Self::build(name.into(), engine, domain, false, build)
    }

    /// Like [`new`](Self::new), but ticks as secondary events.
    pub fn new_secondary<F>(
        name: impl Into<String>,
        engine: Arc<dyn Engine>,
        domain: Arc<FreqDomain>,
        build: F,
    ) -> Arc<Self>
    where
        F: FnOnce(&Weak<Self>) -> T,
    {
        Self::build(name.into(), engine, domain, true, build)
    }

    fn build<F>(
        name: String,
        engine: Arc<dyn Engine>,
        domain: Arc<FreqDomain>,
        secondary: bool,
        build: F,
    ) -> Arc<Self>
    where
        F: FnOnce(&Weak<Self>) -> T,
    {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let handler: Weak<dyn Handler> = weak.clone();
            let scheduler = if secondary {
                TickScheduler::new_secondary(handler, engine, domain)
            } else {
                TickScheduler::new(handler, engine, domain)
            };
            Self {
                name,
                scheduler,
                ticker: Mutex::new(build(weak)),
                hooks: HookRegistry::new(),
            }
        })
    }

    /// Converts the weak self-reference handed to `build` into the owner
    /// reference ports expect.
    pub fn component_ref(weak: &Weak<Self>) -> Weak<dyn Component> {
        weak.clone()
    }

    /// Requests a tick at the engine's current time.
    pub fn tick_now(&self) {
        self.scheduler.tick_now(self.scheduler.engine().current_time());
    }

    /// Requests a tick at the next clock edge.
    pub fn tick_later(&self) {
        self.scheduler.tick_later(self.scheduler.engine().current_time());
    }

    pub fn scheduler(&self) -> &TickScheduler {
        &self.scheduler
    }

    /// Runs `f` with exclusive access to the ticker.
    ///
    /// Meant for setup and inspection while the engine is idle.
    pub fn with_ticker<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.ticker.lock())
    }
}

impl<T: Ticker + 'static> Handler for TickingComponent<T> {
    fn handle(&self, event: &Event) -> SimResult<()> {
        if !event.is_tick() {
            tracing::warn!(component = %self.name, payload = ?event.payload(), "ignoring non-tick event");
            return Ok(());
        }

        self.scheduler.tick_started();
        let progress = self.ticker.lock().tick(event.time());
        if progress {
            self.scheduler.tick_later(event.time());
        }
        Ok(())
    }
}

impl<T: Ticker + 'static> Hookable for TickingComponent<T> {
    fn hook_registry(&self) -> &HookRegistry {
        &self.hooks
    }
}

impl<T: Ticker + 'static> Component for TickingComponent<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn notify_recv(&self, _port: &Port) {
        self.tick_later();
    }

    fn notify_port_free(&self, _port: &Port) {
        self.tick_later();
    }
}
