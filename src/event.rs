//! Event definitions for the simulation kernel.
//!
//! Events carry a timestamp, a payload, and the handler that will process
//! them. They are the only way simulated time moves forward.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::SimResult;
use crate::types::SimTime;

/// Processes events addressed to it.
///
/// A handler only receives `&self`. Whatever state it mutates must be owned
/// by the handler itself (typically behind a lock), which keeps every event's
/// side effects confined to its target.
pub trait Handler: Send + Sync {
    /// Handles one event. Returning an error stops the engine's `run`.
    fn handle(&self, event: &Event) -> SimResult<()>;
}

/// The payload of an event.
///
/// Handlers match on the variant instead of inspecting the payload's type
/// at runtime.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum EventPayload {
    /// A clock tick for a ticking component.
    Tick,

    /// A custom event with arbitrary string data.
    Custom(String),

    /// Structured data (JSON value for flexibility).
    Data(serde_json::Value),
}

/// Represents a scheduled event.
#[derive(Clone)]
pub struct Event {
    time: SimTime,
    handler: Arc<dyn Handler>,
    payload: EventPayload,
    secondary: bool,
}

impl Event {
    /// Creates a new primary event.
    pub fn new(time: SimTime, handler: Arc<dyn Handler>, payload: EventPayload) -> Self {
        Self {
            time,
            handler,
            payload,
            secondary: false,
        }
    }

    /// Creates a tick event.
    pub fn tick(time: SimTime, handler: Arc<dyn Handler>) -> Self {
        Self::new(time, handler, EventPayload::Tick)
    }

    /// Creates a custom event.
    pub fn custom(time: SimTime, handler: Arc<dyn Handler>, data: impl Into<String>) -> Self {
        Self::new(time, handler, EventPayload::Custom(data.into()))
    }

    /// Marks this event as secondary.
    ///
    /// Secondary events at a timestamp run only after every primary event at
    /// that timestamp has finished.
    pub fn into_secondary(mut self) -> Self {
        self.secondary = true;
        self
    }

    /// The cycle at which this event fires.
    pub fn time(&self) -> SimTime {
        self.time
    }

    /// The handler that will process this event.
    pub fn handler(&self) -> &Arc<dyn Handler> {
        &self.handler
    }

    /// The event payload.
    pub fn payload(&self) -> &EventPayload {
        &self.payload
    }

    /// Whether this event belongs to the secondary class.
    pub fn is_secondary(&self) -> bool {
        self.secondary
    }

    /// Returns true if this is a tick event.
    pub fn is_tick(&self) -> bool {
        matches!(self.payload, EventPayload::Tick)
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("time", &self.time)
            .field("payload", &self.payload)
            .field("secondary", &self.secondary)
            .finish_non_exhaustive()
    }
}
