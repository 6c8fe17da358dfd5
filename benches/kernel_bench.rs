//! Performance benchmarks for the chronokern simulation kernel.
//!
//! Run with: `cargo bench`
//! Or for specific bench: `cargo bench --bench kernel_bench`

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;

use chronokern::freq::FrequencyRegistry;
use chronokern::types::{SimTime, GHZ, MHZ};
use chronokern::{
    Connection, DirectConnection, Engine, Event, EventQueue, Handler, Msg, ParallelEngine, Port,
    SerialEngine, SimResult, Ticker, TickingComponent,
};

// ============================================================================
// Benchmark Handlers
// ============================================================================

/// Counts dispatches and does nothing else
struct BenchCounter {
    count: AtomicU64,
}

impl BenchCounter {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            count: AtomicU64::new(0),
        })
    }
}

impl Handler for BenchCounter {
    fn handle(&self, _event: &Event) -> SimResult<()> {
        self.count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Burns a little CPU so that parallel rounds have something to overlap
struct BenchWorker;

impl Handler for BenchWorker {
    fn handle(&self, event: &Event) -> SimResult<()> {
        let mut acc = event.time();
        for i in 0..2_000u64 {
            acc = acc.wrapping_mul(6364136223846793005).wrapping_add(i);
        }
        black_box(acc);
        Ok(())
    }
}

// ============================================================================
// Event Queue Benchmarks
// ============================================================================

fn bench_event_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_queue");
    let handler = BenchCounter::new();

    for size in [100usize, 1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::new("push_pop", size), size, |b, &size| {
            b.iter(|| {
                let queue = EventQueue::new();
                for i in 0..size {
                    let time = (i as SimTime * 7919) % size as SimTime;
                    queue.push(Event::tick(time, handler.clone()));
                }
                while let Some(event) = queue.pop() {
                    black_box(event.time());
                }
            });
        });
    }

    group.finish();
}

// ============================================================================
// Engine Benchmarks
// ============================================================================

fn bench_serial_engine(c: &mut Criterion) {
    let mut group = c.benchmark_group("serial_engine");
    let handler = BenchCounter::new();

    for events in [1_000u64, 10_000].iter() {
        group.throughput(Throughput::Elements(*events));
        group.bench_with_input(BenchmarkId::new("events", events), events, |b, &events| {
            b.iter(|| {
                let engine = SerialEngine::new();
                for i in 0..events {
                    engine.schedule(Event::tick(i / 4, handler.clone()));
                }
                engine.run().unwrap();
                black_box(engine.current_time());
            });
        });
    }

    group.finish();
}

fn bench_parallel_engine(c: &mut Criterion) {
    let mut group = c.benchmark_group("parallel_engine");
    group.sample_size(20);
    let handler: Arc<dyn Handler> = Arc::new(BenchWorker);

    // Same total work, varying round width.
    for width in [1u64, 8, 64].iter() {
        group.throughput(Throughput::Elements(1_024));
        group.bench_with_input(BenchmarkId::new("round_width", width), width, |b, &width| {
            b.iter(|| {
                let engine = ParallelEngine::with_shards(8);
                for i in 0..1_024u64 {
                    engine.schedule(Event::tick(i / width, handler.clone()));
                }
                engine.run().unwrap();
                black_box(engine.stats().rounds);
            });
        });
    }

    group.finish();
}

// ============================================================================
// Frequency Benchmarks
// ============================================================================

fn bench_tick_arithmetic(c: &mut Criterion) {
    let registry = FrequencyRegistry::new();
    registry.register_frequency(GHZ).unwrap();
    let domain = registry.register_frequency(2500 * MHZ).unwrap();

    c.bench_function("freq/next_tick", |b| {
        b.iter(|| {
            let mut now = 0;
            for _ in 0..1_000 {
                now = domain.next_tick(black_box(now));
            }
            now
        });
    });
}

// ============================================================================
// Messaging Benchmarks
// ============================================================================

struct Source {
    port: Option<Arc<Port>>,
    remaining: u64,
}

impl Ticker for Source {
    fn tick(&mut self, _now: SimTime) -> bool {
        let Some(port) = &self.port else {
            return false;
        };
        if self.remaining == 0 || !port.can_send() {
            return false;
        }
        let msg = Msg::new(self.remaining, port.name(), "sink.in", json!(self.remaining));
        if port.send(msg).is_err() {
            return false;
        }
        self.remaining -= 1;
        true
    }
}

struct Sink {
    port: Option<Arc<Port>>,
}

impl Ticker for Sink {
    fn tick(&mut self, _now: SimTime) -> bool {
        self.port
            .as_ref()
            .and_then(|port| port.retrieve_incoming())
            .is_some()
    }
}

fn bench_port_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("port_pipeline");

    for capacity in [1usize, 4, 16].iter() {
        group.throughput(Throughput::Elements(1_000));
        group.bench_with_input(
            BenchmarkId::new("capacity", capacity),
            capacity,
            |b, &capacity| {
                b.iter(|| {
                    let engine: Arc<dyn Engine> = Arc::new(SerialEngine::new());
                    let registry = FrequencyRegistry::new();
                    let domain = registry.register_frequency(GHZ).unwrap();

                    let source = TickingComponent::new("source", engine.clone(), domain.clone(), |weak| Source {
                        port: Some(Port::new(TickingComponent::component_ref(weak), capacity, capacity, "source.out")),
                        remaining: 1_000,
                    });
                    let sink = TickingComponent::new("sink", engine.clone(), domain, |weak| Sink {
                        port: Some(Port::new(TickingComponent::component_ref(weak), capacity, capacity, "sink.in")),
                    });

                    let bus = DirectConnection::new("bus");
                    for port in [source.with_ticker(|s| s.port.clone()), sink.with_ticker(|s| s.port.clone())]
                        .into_iter()
                        .flatten()
                    {
                        bus.plug_in(port);
                    }

                    source.tick_now();
                    engine.run().unwrap();
                    black_box(engine.current_time());
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_event_queue,
    bench_serial_engine,
    bench_parallel_engine,
    bench_tick_arithmetic,
    bench_port_pipeline,
);
criterion_main!(benches);
