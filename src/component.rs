//! The component contract.
//!
//! A component is a handler that owns ports. Ports call back into their
//! component when a message arrives on an empty incoming buffer or when a
//! full outgoing buffer frees a slot.
//!
//! Notifications can arrive while the connection is in the middle of a
//! forwarding pass. Implementations should only record that work exists
//! (typically by requesting a tick) and touch their ports from their own
//! events, never from inside the callback.

use crate::event::Handler;
use crate::hooking::Hookable;
use crate::port::Port;

/// A simulated hardware element.
pub trait Component: Handler + Hookable + Send + Sync {
    /// Unique name within the simulation.
    fn name(&self) -> &str;

    /// One of this component's ports went from no incoming message to one.
    fn notify_recv(&self, port: &Port);

    /// One of this component's ports went from a full outgoing buffer to one
    /// with a free slot.
    fn notify_port_free(&self, port: &Port);
}
