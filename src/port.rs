//! Ports: a component's messaging endpoints.
//!
//! A port holds two bounded FIFOs behind one lock. The owning component
//! pushes into the outgoing buffer with [`Port::send`] and pops the incoming
//! buffer with [`Port::retrieve_incoming`]. The attached connection does the
//! opposite with [`Port::retrieve_outgoing`] and [`Port::deliver`].
//!
//! Notifications are edge-triggered at the capacity boundary:
//!
//! | Operation | Transition | Notified |
//! |-----------|-----------|----------|
//! | `send` | outgoing empty → non-empty | connection (`notify_send`) |
//! | `deliver` | incoming empty → non-empty | component (`notify_recv`) |
//! | `retrieve_outgoing` | outgoing full → not full | component (`notify_port_free`) |
//! | `retrieve_incoming` | incoming full → not full | connection (`notify_available`) |
//!
//! Edge triggering assumes one drainer per buffer: the component drains
//! incoming, the connection drains outgoing.
//!
//! Hooks for `send` and `deliver` run while the port lock is held and must
//! not call back into the port.
//!
//! A port only keeps a weak link to its connection. Connections are owned by
//! the [`Simulation`](crate::simulation::Simulation) they are registered with
//! (or by the caller) and must outlive every send.

use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;
use thiserror::Error;

use crate::buffer::Buffer;
use crate::component::Component;
use crate::connection::Connection;
use crate::hooking::{HookCtx, HookItem, HookPos, HookRegistry, Hookable};
use crate::msg::{Msg, RemotePort};

/// A message was rejected because the target buffer is full.
///
/// The message is handed back so it can be retried once the sender is
/// notified that space is available.
#[derive(Error, Debug)]
#[error("buffer of port {port} is full")]
pub struct SendError {
    port: String,
    msg: Msg,
}

impl SendError {
    /// The port whose buffer was full.
    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn msg(&self) -> &Msg {
        &self.msg
    }

    /// Takes the rejected message back.
    pub fn into_msg(self) -> Msg {
        self.msg
    }
}

struct Buffers {
    incoming: Buffer<Msg>,
    outgoing: Buffer<Msg>,
}

/// A bidirectional, dual-buffered message endpoint.
pub struct Port {
    name: String,
    remote: RemotePort,
    component: Weak<dyn Component>,
    connection: OnceLock<Weak<dyn Connection>>,
    buffers: Mutex<Buffers>,
    hooks: HookRegistry,
}

impl Port {
    /// Creates a port owned by `component`.
    pub fn new(
        component: Weak<dyn Component>,
        incoming_capacity: usize,
        outgoing_capacity: usize,
        name: impl Into<String>,
    ) -> Arc<Self> {
        let name = name.into();
        Arc::new(Self {
            remote: RemotePort::new(name.clone()),
            component,
            connection: OnceLock::new(),
            buffers: Mutex::new(Buffers {
                incoming: Buffer::new(format!("{name}.incoming"), incoming_capacity),
                outgoing: Buffer::new(format!("{name}.outgoing"), outgoing_capacity),
            }),
            hooks: HookRegistry::new(),
            name,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The identity other ports use to address this port.
    pub fn as_remote(&self) -> RemotePort {
        self.remote.clone()
    }

    /// The owning component, if it is still alive.
    pub fn component(&self) -> Option<Arc<dyn Component>> {
        self.component.upgrade()
    }

    /// The attached connection, if any.
    pub fn connection(&self) -> Option<Arc<dyn Connection>> {
        self.connection.get().and_then(Weak::upgrade)
    }

    /// Attaches the connection. Called by the connection's `plug_in`.
    ///
    /// # Panics
    ///
    /// Panics if a connection is already attached.
    pub fn set_connection(&self, connection: Weak<dyn Connection>) {
        if self.connection.set(connection).is_err() {
            tracing::error!(port = %self.name, "connection attached twice");
            panic!("port {} is already connected", self.name);
        }
    }

    /// Returns true if the outgoing buffer has a free slot.
    pub fn can_send(&self) -> bool {
        self.buffers.lock().outgoing.can_push()
    }

    /// Returns true if the incoming buffer has a free slot.
    pub fn can_deliver(&self) -> bool {
        self.buffers.lock().incoming.can_push()
    }

    /// Queues `msg` for the connection.
    ///
    /// # Panics
    ///
    /// Panics if `msg.src` is not this port, `msg.dst` is empty, or the
    /// message is addressed to its own source.
    pub fn send(&self, msg: Msg) -> Result<(), SendError> {
        self.validate(&msg);

        let was_empty = {
            let mut buffers = self.buffers.lock();
            if buffers.outgoing.is_full() {
                return Err(self.full(msg));
            }
            let was_empty = buffers.outgoing.is_empty();
            self.hooks.invoke(&HookCtx {
                domain: &self.name,
                pos: HookPos::PortSend,
                item: HookItem::Msg(&msg),
            });
            if let Err(msg) = buffers.outgoing.push(msg) {
                return Err(self.full(msg));
            }
            was_empty
        };

        if was_empty {
            self.attached_connection().notify_send();
        }
        Ok(())
    }

    /// Places `msg` into the incoming buffer. Called by the connection.
    pub fn deliver(&self, msg: Msg) -> Result<(), SendError> {
        let was_empty = {
            let mut buffers = self.buffers.lock();
            if buffers.incoming.is_full() {
                return Err(self.full(msg));
            }
            let was_empty = buffers.incoming.is_empty();
            self.hooks.invoke(&HookCtx {
                domain: &self.name,
                pos: HookPos::PortDeliver,
                item: HookItem::Msg(&msg),
            });
            if let Err(msg) = buffers.incoming.push(msg) {
                return Err(self.full(msg));
            }
            was_empty
        };

        if was_empty {
            match self.component() {
                Some(component) => component.notify_recv(self),
                None => tracing::warn!(port = %self.name, "delivery to a port without a live component"),
            }
        }
        Ok(())
    }

    /// Pops the oldest incoming message.
    pub fn retrieve_incoming(&self) -> Option<Msg> {
        let (msg, was_full) = {
            let mut buffers = self.buffers.lock();
            let was_full = buffers.incoming.is_full();
            (buffers.incoming.pop()?, was_full)
        };

        self.hooks.invoke(&HookCtx {
            domain: &self.name,
            pos: HookPos::PortRetrieveIncoming,
            item: HookItem::Msg(&msg),
        });

        if was_full {
            if let Some(connection) = self.connection() {
                connection.notify_available(self);
            }
        }
        Some(msg)
    }

    /// Pops the oldest outgoing message. Called by the connection.
    pub fn retrieve_outgoing(&self) -> Option<Msg> {
        let (msg, was_full) = {
            let mut buffers = self.buffers.lock();
            let was_full = buffers.outgoing.is_full();
            (buffers.outgoing.pop()?, was_full)
        };

        self.hooks.invoke(&HookCtx {
            domain: &self.name,
            pos: HookPos::PortRetrieveOutgoing,
            item: HookItem::Msg(&msg),
        });

        if was_full {
            if let Some(component) = self.component() {
                component.notify_port_free(self);
            }
        }
        Some(msg)
    }

    /// Returns a copy of the oldest incoming message.
    pub fn peek_incoming(&self) -> Option<Msg> {
        self.buffers.lock().incoming.peek().cloned()
    }

    /// Returns a copy of the oldest outgoing message.
    pub fn peek_outgoing(&self) -> Option<Msg> {
        self.buffers.lock().outgoing.peek().cloned()
    }

    /// Destination of the oldest outgoing message.
    pub(crate) fn peek_outgoing_dst(&self) -> Option<RemotePort> {
        self.buffers.lock().outgoing.peek().map(|msg| msg.dst.clone())
    }

    pub fn incoming_len(&self) -> usize {
        self.buffers.lock().incoming.size()
    }

    pub fn outgoing_len(&self) -> usize {
        self.buffers.lock().outgoing.size()
    }

    fn full(&self, msg: Msg) -> SendError {
        SendError {
            port: self.name.clone(),
            msg,
        }
    }

    fn validate(&self, msg: &Msg) {
        let problem = if msg.src != self.remote {
            Some("source is not this port")
        } else if msg.dst.is_empty() {
            Some("destination is empty")
        } else if msg.src == msg.dst {
            Some("destination equals source")
        } else {
            None
        };

        if let Some(problem) = problem {
            tracing::error!(port = %self.name, src = %msg.src, dst = %msg.dst, problem, "invalid message");
            panic!("port {} cannot send message {}: {problem}", self.name, msg.id);
        }
    }

    fn attached_connection(&self) -> Arc<dyn Connection> {
        let Some(link) = self.connection.get() else {
            tracing::error!(port = %self.name, "send on unconnected port");
            panic!("port {} is not connected", self.name);
        };
        match link.upgrade() {
            Some(connection) => connection,
            None => {
                tracing::error!(port = %self.name, "send through a dropped connection");
                panic!("connection of port {} was dropped while still plugged in", self.name);
            }
        }
    }
}

impl Hookable for Port {
    fn hook_registry(&self) -> &HookRegistry {
        &self.hooks
    }
}

impl fmt::Debug for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Port")
            .field("name", &self.name)
            .field("incoming", &self.incoming_len())
            .field("outgoing", &self.outgoing_len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SimResult;
    use crate::event::{Event, Handler};

    /// A component that only counts notifications.
    #[derive(Default)]
    struct Owner {
        hooks: HookRegistry,
        recv: Mutex<u32>,
        free: Mutex<u32>,
    }

    impl Handler for Owner {
        fn handle(&self, _event: &Event) -> SimResult<()> {
            Ok(())
        }
    }

    impl Hookable for Owner {
        fn hook_registry(&self) -> &HookRegistry {
            &self.hooks
        }
    }

    impl Component for Owner {
        fn name(&self) -> &str {
            "owner"
        }

        fn notify_recv(&self, _port: &Port) {
            *self.recv.lock() += 1;
        }

        fn notify_port_free(&self, _port: &Port) {
            *self.free.lock() += 1;
        }
    }

    /// A connection that only counts notifications.
    #[derive(Default)]
    struct Wire {
        hooks: HookRegistry,
        sends: Mutex<u32>,
        available: Mutex<u32>,
    }

    impl Hookable for Wire {
        fn hook_registry(&self) -> &HookRegistry {
            &self.hooks
        }
    }

    impl Connection for Wire {
        fn name(&self) -> &str {
            "wire"
        }

        fn plug_in(&self, _port: Arc<Port>) {}

        fn unplug(&self, _port: &Port) {}

        fn notify_available(&self, _port: &Port) {
            *self.available.lock() += 1;
        }

        fn notify_send(&self) {
            *self.sends.lock() += 1;
        }
    }

    fn setup(capacity: usize) -> (Arc<Owner>, Arc<Wire>, Arc<Port>) {
        let owner = Arc::new(Owner::default());
        let wire = Arc::new(Wire::default());
        let component: Weak<dyn Component> = Arc::downgrade(&owner) as Weak<Owner>;
        let port = Port::new(component, capacity, capacity, "a");
        let connection: Weak<dyn Connection> = Arc::downgrade(&wire) as Weak<Wire>;
        port.set_connection(connection);
        (owner, wire, port)
    }

    fn msg(id: u64) -> Msg {
        Msg::new(id, "a", "b", serde_json::json!(id))
    }

    #[test]
    fn test_send_edge_triggers_connection() {
        let (_owner, wire, port) = setup(2);

        port.send(msg(1)).unwrap();
        port.send(msg(2)).unwrap();

        assert_eq!(*wire.sends.lock(), 1);
        assert_eq!(port.outgoing_len(), 2);
        assert!(!port.can_send());
    }

    #[test]
    fn test_send_full_returns_msg() {
        let (_owner, _wire, port) = setup(1);
        port.send(msg(1)).unwrap();

        let err = port.send(msg(2)).unwrap_err();
        assert_eq!(err.port(), "a");
        assert_eq!(err.into_msg().id, 2);
    }

    #[test]
    fn test_retrieve_outgoing_notifies_once_at_boundary() {
        let (owner, _wire, port) = setup(2);
        port.send(msg(1)).unwrap();
        port.send(msg(2)).unwrap();

        assert_eq!(port.retrieve_outgoing().unwrap().id, 1);
        assert_eq!(*owner.free.lock(), 1);
        assert_eq!(port.retrieve_outgoing().unwrap().id, 2);
        assert_eq!(*owner.free.lock(), 1);
        assert!(port.retrieve_outgoing().is_none());
    }

    #[test]
    fn test_deliver_and_retrieve_incoming() {
        let (owner, wire, port) = setup(2);
        let inbound = Msg::new(9, "b", "a", serde_json::json!("hi"));

        port.deliver(inbound.clone()).unwrap();
        port.deliver(Msg::new(10, "b", "a", serde_json::Value::Null)).unwrap();
        assert_eq!(*owner.recv.lock(), 1);
        assert!(!port.can_deliver());
        assert!(port.deliver(Msg::new(11, "b", "a", serde_json::Value::Null)).is_err());

        assert_eq!(port.peek_incoming(), Some(inbound.clone()));
        assert_eq!(port.retrieve_incoming(), Some(inbound));
        assert_eq!(*wire.available.lock(), 1);
        port.retrieve_incoming();
        assert_eq!(*wire.available.lock(), 1);
    }

    #[test]
    #[should_panic(expected = "already connected")]
    fn test_double_connect_panics() {
        let (_owner, wire, port) = setup(1);
        let again: Weak<dyn Connection> = Arc::downgrade(&wire) as Weak<Wire>;
        port.set_connection(again);
    }

    #[test]
    #[should_panic(expected = "was dropped while still plugged in")]
    fn test_send_through_dropped_connection_panics() {
        let (_owner, wire, port) = setup(1);
        drop(wire);
        let _ = port.send(msg(1));
    }

    #[test]
    #[should_panic(expected = "source is not this port")]
    fn test_send_wrong_source_panics() {
        let (_owner, _wire, port) = setup(1);
        let _ = port.send(Msg::new(1, "x", "b", serde_json::Value::Null));
    }

    #[test]
    #[should_panic(expected = "destination is empty")]
    fn test_send_empty_destination_panics() {
        let (_owner, _wire, port) = setup(1);
        let _ = port.send(Msg::new(1, "a", "", serde_json::Value::Null));
    }

    #[test]
    #[should_panic(expected = "destination equals source")]
    fn test_send_to_self_panics() {
        let (_owner, _wire, port) = setup(1);
        let _ = port.send(Msg::new(1, "a", "a", serde_json::Value::Null));
    }

    #[test]
    fn test_port_hooks() {
        let (_owner, _wire, port) = setup(2);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        port.accept_hook(Arc::new(move |ctx: &HookCtx<'_>| sink.lock().push(ctx.pos)));

        port.send(msg(1)).unwrap();
        port.retrieve_outgoing();

        assert_eq!(*seen.lock(), vec![HookPos::PortSend, HookPos::PortRetrieveOutgoing]);
    }
}
