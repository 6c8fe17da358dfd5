//! Observation hooks.
//!
//! Engines, ports and connections each own a [`HookRegistry`] and expose it
//! through [`Hookable`]. Hooks are called synchronously, in registration
//! order, at fixed lifecycle points. They observe; they never change the
//! outcome of the operation that triggered them.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::event::Event;
use crate::msg::Msg;

/// Lifecycle point at which a hook fires.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HookPos {
    /// An engine is about to hand an event to its handler.
    BeforeEvent,
    /// An engine has finished handling an event.
    AfterEvent,
    /// A message entered a port's outgoing buffer.
    PortSend,
    /// A message entered a port's incoming buffer.
    PortDeliver,
    /// A message left a port's incoming buffer.
    PortRetrieveIncoming,
    /// A message left a port's outgoing buffer.
    PortRetrieveOutgoing,
    /// A connection moved a message between two ports.
    ConnForward,
}

/// The object a hook is being told about.
#[derive(Clone, Copy, Debug)]
pub enum HookItem<'a> {
    Event(&'a Event),
    Msg(&'a Msg),
}

/// Context passed to every hook invocation.
#[derive(Clone, Copy, Debug)]
pub struct HookCtx<'a> {
    /// Name of the hookable that fired.
    pub domain: &'a str,
    /// Where in the lifecycle the hook fired.
    pub pos: HookPos,
    /// The event or message involved.
    pub item: HookItem<'a>,
}

/// An externally registered observer.
pub trait Hook: Send + Sync {
    fn func(&self, ctx: &HookCtx<'_>);
}

impl<F> Hook for F
where
    F: Fn(&HookCtx<'_>) + Send + Sync,
{
    fn func(&self, ctx: &HookCtx<'_>) {
        self(ctx)
    }
}

/// Ordered list of hooks owned by a hookable value.
#[derive(Default)]
pub struct HookRegistry {
    hooks: RwLock<Vec<Arc<dyn Hook>>>,
}

impl HookRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a hook. Meant for setup, before the engine runs.
    pub fn accept(&self, hook: Arc<dyn Hook>) {
        self.hooks.write().push(hook);
    }

    /// Returns the registered hooks in registration order.
    pub fn hooks(&self) -> Vec<Arc<dyn Hook>> {
        self.hooks.read().clone()
    }

    /// Number of registered hooks.
    pub fn len(&self) -> usize {
        self.hooks.read().len()
    }

    /// Returns true if no hook is registered.
    pub fn is_empty(&self) -> bool {
        self.hooks.read().is_empty()
    }

    /// Calls every hook with `ctx`.
    pub fn invoke(&self, ctx: &HookCtx<'_>) {
        let hooks = self.hooks.read();
        for hook in hooks.iter() {
            hook.func(ctx);
        }
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRegistry").field("len", &self.len()).finish()
    }
}

/// Something hooks can be attached to.
pub trait Hookable {
    /// The registry owned by this value.
    fn hook_registry(&self) -> &HookRegistry;

    fn accept_hook(&self, hook: Arc<dyn Hook>) {
        self.hook_registry().accept(hook);
    }

    fn hooks(&self) -> Vec<Arc<dyn Hook>> {
        self.hook_registry().hooks()
    }

    fn num_hooks(&self) -> usize {
        self.hook_registry().len()
    }

    fn invoke_hook(&self, ctx: &HookCtx<'_>) {
        self.hook_registry().invoke(ctx);
    }
}

/// Hook that forwards every invocation to `tracing` at trace level.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogHook;

impl Hook for LogHook {
    fn func(&self, ctx: &HookCtx<'_>) {
        match ctx.item {
            HookItem::Event(event) => tracing::trace!(
                domain = ctx.domain,
                pos = ?ctx.pos,
                time = event.time(),
                secondary = event.is_secondary(),
                payload = ?event.payload(),
                "event"
            ),
            HookItem::Msg(msg) => tracing::trace!(
                domain = ctx.domain,
                pos = ?ctx.pos,
                id = msg.id,
                src = %msg.src,
                dst = %msg.dst,
                "msg"
            ),
        }
    }
}
