//! Ping-pong over a direct connection.
//!
//! A 2 GHz `ping` component sends a request, waits for the answer and sends
//! the next one. A 500 MHz `pong` component answers every request it sees.
//! Both are ticking components, so neither ticks while it has nothing to
//! do: they are woken by message arrivals and freed buffer slots.
//!
//! Run with: `cargo run --example ping_pong`
//! Set `RUST_LOG=chronokern=trace` to see every hook invocation.

use std::sync::Arc;

use serde_json::json;

use chronokern::config::SimConfigBuilder;
use chronokern::types::{SimTime, GHZ, MHZ};
use chronokern::{Connection, DirectConnection, Engine, Hookable, LogHook, Msg, Port, Ticker, TickingComponent};

const ROUND_TRIPS: u64 = 10;

// -----------------------------------------------------------------------------
// Requester
// -----------------------------------------------------------------------------

struct Ping {
    port: Option<Arc<Port>>,
    sent: u64,
    completed: u64,
    awaiting: bool,
    latencies: Vec<SimTime>,
    sent_at: SimTime,
}

impl Ticker for Ping {
    fn tick(&mut self, now: SimTime) -> bool {
        let Some(port) = self.port.clone() else {
            return false;
        };
        let mut progress = false;

        if let Some(reply) = port.retrieve_incoming() {
            self.awaiting = false;
            self.completed += 1;
            self.latencies.push(now - self.sent_at);
            tracing::info!(now, seq = %reply.payload["seq"], "pong received");
            progress = true;
        }

        if !self.awaiting && self.sent < ROUND_TRIPS && port.can_send() {
            let msg = Msg::new(self.sent, port.name(), "pong.io", json!({"seq": self.sent}))
                .with_traffic_bytes(8);
            if port.send(msg).is_ok() {
                self.sent += 1;
                self.sent_at = now;
                self.awaiting = true;
                progress = true;
            }
        }

        progress
    }
}

// -----------------------------------------------------------------------------
// Responder
// -----------------------------------------------------------------------------

struct Pong {
    port: Option<Arc<Port>>,
    answered: u64,
}

impl Ticker for Pong {
    fn tick(&mut self, _now: SimTime) -> bool {
        let Some(port) = &self.port else {
            return false;
        };
        if port.peek_incoming().is_none() || !port.can_send() {
            return false;
        }
        let Some(request) = port.retrieve_incoming() else {
            return false;
        };

        let reply = Msg::new(
            request.id + 1_000,
            port.name(),
            request.src.clone(),
            json!({"seq": request.payload["seq"]}),
        );
        if port.send(reply).is_err() {
            return false;
        }
        self.answered += 1;
        true
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = SimConfigBuilder::new()
        .log_level("info")
        .parallel(Some(2), Some(2))
        .default_capacity(1)
        .add_domain("ping", 2 * GHZ)
        .add_domain("pong", 500 * MHZ)
        .build()?;
    chronokern::init_logging(&config.log_level);

    let sim = config.build_simulation()?;
    let capacity = config.buffers.default_capacity;
    let ping_clock = sim.domain("ping").ok_or("missing ping domain")?;
    let pong_clock = sim.domain("pong").ok_or("missing pong domain")?;

    let ping = TickingComponent::new("ping", sim.engine().clone(), ping_clock, |weak| Ping {
        port: Some(Port::new(TickingComponent::component_ref(weak), capacity, capacity, "ping.io")),
        sent: 0,
        completed: 0,
        awaiting: false,
        latencies: Vec::new(),
        sent_at: 0,
    });
    let pong = TickingComponent::new("pong", sim.engine().clone(), pong_clock, |weak| Pong {
        port: Some(Port::new(TickingComponent::component_ref(weak), capacity, capacity, "pong.io")),
        answered: 0,
    });

    let wire = DirectConnection::new("wire");
    wire.accept_hook(Arc::new(LogHook));
    for port in [ping.with_ticker(|p| p.port.clone()), pong.with_ticker(|p| p.port.clone())]
        .into_iter()
        .flatten()
    {
        sim.register_port(Arc::clone(&port));
        wire.plug_in(port);
    }
    sim.register_connection(wire);
    sim.register_component(ping.clone());
    sim.register_component(pong.clone());

    ping.tick_now();
    sim.run()?;

    let (completed, latencies) = ping.with_ticker(|p| (p.completed, p.latencies.clone()));
    let answered = pong.with_ticker(|p| p.answered);
    let seconds = sim
        .frequency_registry()
        .cycles_to_seconds(sim.engine().current_time())?;

    println!("round trips: {completed} (pong answered {answered})");
    println!("latencies (global cycles): {latencies:?}");
    println!("simulated time: {seconds:.3e} s");
    println!("{}", serde_json::to_string_pretty(&sim.engine().export_stats())?);
    Ok(())
}
