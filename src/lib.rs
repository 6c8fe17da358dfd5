//! # Chronokern
//!
//! A discrete-event simulation kernel for timed hardware systems such as
//! processors, memories and interconnects, modelled as components that
//! exchange messages over time.
//!
//! ## Design Principles
//!
//! - **Total temporal order**: effects at cycle `T` are complete before any
//!   effect at a later cycle begins. At equal cycles primary events run
//!   before secondary events.
//! - **Concurrent within a timestamp**: the parallel engine runs all events
//!   of one cycle and one class at once, behind a join barrier.
//! - **Multi-clock**: clock domains share one global cycle resolution, the
//!   LCM of every registered frequency.
//! - **Backpressure without stalls**: bounded port buffers with
//!   edge-triggered notifications, plus tick scheduling that collapses wake-up
//!   requests into at most one pending tick per component.
//!
//! ## Features
//!
//! - `parallel` (default) - Dispatch a round's events on a rayon thread pool
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use chronokern::{Engine, SerialEngine, Simulation, Ticker, TickingComponent};
//! use chronokern::types::{SimTime, GHZ};
//!
//! struct Blinker { blinks: u32 }
//!
//! impl Ticker for Blinker {
//!     fn tick(&mut self, _now: SimTime) -> bool {
//!         self.blinks += 1;
//!         self.blinks < 3
//!     }
//! }
//!
//! let sim = Simulation::new(Arc::new(SerialEngine::new()));
//! let clock = sim.register_domain("core", GHZ).unwrap();
//! let led = TickingComponent::new("led", sim.engine().clone(), clock, |_| Blinker { blinks: 0 });
//!
//! led.tick_now();
//! sim.run().unwrap();
//!
//! assert_eq!(led.with_ticker(|b| b.blinks), 3);
//! assert_eq!(sim.engine().current_time(), 2);
//! ```
//!
//! ## Configuration-Driven Setup
//!
//! ```rust,ignore
//! use chronokern::config::SimConfig;
//!
//! let config = SimConfig::from_yaml_file("simulation.yaml")?;
//! let sim = config.build_simulation()?;
//! ```

pub mod buffer;
pub mod component;
pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
pub mod event;
pub mod freq;
pub mod hooking;
pub mod id;
pub mod msg;
pub mod port;
pub mod queue;
pub mod simulation;
pub mod ticking;
pub mod types;

// Re-export commonly used types
pub use buffer::Buffer;
pub use component::Component;
pub use config::{ConfigError, SimConfig, SimConfigBuilder};
pub use connection::{Connection, DirectConnection};
pub use engine::{Engine, EngineStats, ParallelEngine, SerialEngine, SimulationEndHandler};
pub use error::{SimError, SimResult};
pub use event::{Event, EventPayload, Handler};
pub use freq::{FreqDomain, FreqError, FrequencyRegistry};
pub use hooking::{Hook, HookCtx, HookItem, HookPos, HookRegistry, Hookable, LogHook};
pub use id::IdGenerator;
pub use msg::{Msg, RemotePort};
pub use port::{Port, SendError};
pub use queue::EventQueue;
pub use simulation::Simulation;
pub use ticking::{TickScheduler, Ticker, TickingComponent};
pub use types::SimTime;

/// Initialize the tracing subscriber for logging.
///
/// Call this at the start of your program to enable logging.
///
/// # Example
///
/// ```rust,ignore
/// chronokern::init_logging("info");
/// ```
pub fn init_logging(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
