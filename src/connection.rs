//! Connections move messages between ports.
//!
//! [`DirectConnection`] forwards with zero simulated latency: as soon as a
//! port exposes an outgoing message it is eligible for delivery in the same
//! cycle.
//!
//! # Forwarding pass
//!
//! Starting at the rotation cursor, every attached port's outgoing buffer is
//! drained into the destination ports until a destination is full. A port
//! blocked on a full destination keeps its message at the head of its
//! buffer and resumes there on the next pass, which is triggered when the
//! destination frees a slot (`notify_available`) or a sender queues a new
//! message (`notify_send`). The cursor only advances after a pass that moved
//! at least one message, so an idle connection does not spin.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::hooking::{HookCtx, HookItem, HookPos, HookRegistry, Hookable};
use crate::msg::RemotePort;
use crate::port::Port;

/// Routes messages between the ports plugged into it.
///
/// # Deadlocks
///
/// [`DirectConnection`] holds its endpoint lock for a whole forwarding pass,
/// and the pass calls [`Component::notify_recv`] and
/// [`Component::notify_port_free`] on the owning components. A component that
/// sends on or retrieves from a port of the same connection inside those
/// callbacks re-enters the connection and deadlocks. Components should only
/// request a tick there and touch their ports from their own events.
///
/// [`Component::notify_recv`]: crate::component::Component::notify_recv
/// [`Component::notify_port_free`]: crate::component::Component::notify_port_free
pub trait Connection: Hookable + Send + Sync {
    fn name(&self) -> &str;

    /// Attaches `port`. Ports must be plugged in before the engine runs.
    fn plug_in(&self, port: Arc<Port>);

    /// Detaches `port`.
    fn unplug(&self, port: &Port);

    /// A plugged-in port freed a slot in its incoming buffer.
    fn notify_available(&self, port: &Port);

    /// A plugged-in port's outgoing buffer became non-empty.
    fn notify_send(&self);
}

#[derive(Default)]
struct Endpoints {
    ports: Vec<Arc<Port>>,
    by_name: HashMap<RemotePort, usize>,
    cursor: usize,
}

/// Zero-latency, round-robin connection.
pub struct DirectConnection {
    name: String,
    self_ref: Weak<DirectConnection>,
    endpoints: Mutex<Endpoints>,
    hooks: HookRegistry,
}

impl DirectConnection {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        let name = name.into();
        Arc::new_cyclic(|self_ref| Self {
            name,
            self_ref: self_ref.clone(),
            endpoints: Mutex::new(Endpoints::default()),
            hooks: HookRegistry::new(),
        })
    }

    /// Number of attached ports.
    pub fn port_count(&self) -> usize {
        self.endpoints.lock().ports.len()
    }

    /// Runs one forwarding pass and returns how many messages moved.
    pub fn forward(&self) -> usize {
        let mut endpoints = self.endpoints.lock();
        let count = endpoints.ports.len();
        if count == 0 {
            return 0;
        }

        let mut forwarded = 0;
        for offset in 0..count {
            let src = Arc::clone(&endpoints.ports[(endpoints.cursor + offset) % count]);
            forwarded += self.drain(&endpoints, &src);
        }

        if forwarded > 0 {
            endpoints.cursor = (endpoints.cursor + 1) % count;
        }
        tracing::trace!(connection = %self.name, forwarded, "forwarding pass");
        forwarded
    }

    /// Moves messages out of `src` until it is empty or a destination is full.
    fn drain(&self, endpoints: &Endpoints, src: &Port) -> usize {
        let mut moved = 0;
        while let Some(dst_name) = src.peek_outgoing_dst() {
            let dst = match endpoints.by_name.get(&dst_name) {
                Some(&index) => &endpoints.ports[index],
                None => {
                    tracing::error!(connection = %self.name, dst = %dst_name, "unknown destination");
                    panic!("connection {} has no port named {dst_name}", self.name);
                }
            };

            // Only this connection fills `dst`'s incoming buffer, so the
            // check below cannot be invalidated before the delivery.
            if !dst.can_deliver() {
                break;
            }
            let Some(msg) = src.retrieve_outgoing() else {
                break;
            };

            self.hooks.invoke(&HookCtx {
                domain: &self.name,
                pos: HookPos::ConnForward,
                item: HookItem::Msg(&msg),
            });

            if let Err(err) = dst.deliver(msg) {
                tracing::error!(connection = %self.name, port = err.port(), "delivery rejected after capacity check");
                panic!("connection {} lost message {} to {}", self.name, err.msg().id, err.port());
            }
            moved += 1;
        }
        moved
    }
}

impl Hookable for DirectConnection {
    fn hook_registry(&self) -> &HookRegistry {
        &self.hooks
    }
}

impl Connection for DirectConnection {
    fn name(&self) -> &str {
        &self.name
    }

    fn plug_in(&self, port: Arc<Port>) {
        {
            let mut endpoints = self.endpoints.lock();
            let remote = port.as_remote();
            if endpoints.by_name.contains_key(&remote) {
                tracing::error!(connection = %self.name, port = %remote, "port plugged in twice");
                panic!("port {remote} is already plugged into {}", self.name);
            }
            let index = endpoints.ports.len();
            endpoints.by_name.insert(remote, index);
            endpoints.ports.push(Arc::clone(&port));
        }

        let connection: Weak<dyn Connection> = self.self_ref.clone();
        port.set_connection(connection);
        tracing::debug!(connection = %self.name, port = port.name(), "plugged in");
    }

    fn unplug(&self, port: &Port) {
        tracing::error!(connection = %self.name, port = port.name(), "unplug requested");
        panic!("direct connection {} does not support unplugging", self.name);
    }

    fn notify_available(&self, _port: &Port) {
        self.forward();
    }

    fn notify_send(&self) {
        self.forward();
    }
}
