//! Integration tests for the serial engine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use chronokern::types::SimTime;
use chronokern::{Engine, Event, EventPayload, Handler, HookCtx, HookItem, HookPos, Hookable, SerialEngine, SimResult};

type Log = Arc<Mutex<Vec<(String, SimTime, bool)>>>;

/// A handler that appends `(name, time, secondary)` to a shared log.
struct Named {
    name: String,
    log: Log,
}

impl Named {
    fn new(name: &str, log: &Log) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            log: Arc::clone(log),
        })
    }
}

impl Handler for Named {
    fn handle(&self, event: &Event) -> SimResult<()> {
        self.log
            .lock()
            .push((self.name.clone(), event.time(), event.is_secondary()));
        Ok(())
    }
}

/// A handler that schedules follow-up events for another handler.
struct Spawner {
    log: Log,
    engine: Arc<SerialEngine>,
    target: Arc<Named>,
    at: Vec<SimTime>,
}

impl Handler for Spawner {
    fn handle(&self, event: &Event) -> SimResult<()> {
        self.log.lock().push(("B".to_string(), event.time(), false));
        for &time in &self.at {
            self.engine.schedule(Event::tick(time, self.target.clone()));
        }
        Ok(())
    }
}

fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

#[test]
fn test_follow_up_events_interleave_with_existing() {
    let engine = Arc::new(SerialEngine::new());
    let log = new_log();
    let a = Named::new("A", &log);
    let b = Arc::new(Spawner {
        log: Arc::clone(&log),
        engine: Arc::clone(&engine),
        target: Arc::clone(&a),
        at: vec![3, 5],
    });

    engine.schedule(Event::tick(2, b));
    engine.schedule(Event::tick(4, a));
    engine.run().unwrap();

    let order: Vec<_> = log.lock().iter().map(|(n, t, _)| format!("{n}@{t}")).collect();
    assert_eq!(order, vec!["B@2", "A@3", "A@4", "A@5"]);
}

#[test]
fn test_time_order_and_class_order() {
    let engine = SerialEngine::new();
    let log = new_log();
    let handler = Named::new("h", &log);

    // Deterministic pseudo-random schedule.
    let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
    for _ in 0..500 {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let time = (seed >> 33) % 50;
        let event = Event::tick(time, handler.clone());
        if (seed >> 20) & 1 == 1 {
            engine.schedule(event.into_secondary());
        } else {
            engine.schedule(event);
        }
    }

    engine.run().unwrap();

    let log = log.lock();
    assert_eq!(log.len(), 500);
    for pair in log.windows(2) {
        let (_, t0, s0) = &pair[0];
        let (_, t1, s1) = &pair[1];
        assert!(t0 <= t1, "time went backwards: {t0} -> {t1}");
        if t0 == t1 {
            assert!(!(*s0 && !*s1), "secondary ran before primary at {t0}");
        }
    }
}

#[test]
fn test_current_time_is_non_decreasing() {
    struct Check {
        engine: Arc<SerialEngine>,
        last: Mutex<SimTime>,
    }

    impl Handler for Check {
        fn handle(&self, event: &Event) -> SimResult<()> {
            let now = self.engine.current_time();
            assert_eq!(now, event.time());
            let mut last = self.last.lock();
            assert!(now >= *last);
            *last = now;
            Ok(())
        }
    }

    let engine = Arc::new(SerialEngine::new());
    let check = Arc::new(Check {
        engine: Arc::clone(&engine),
        last: Mutex::new(0),
    });
    for time in [9, 1, 4, 4, 7, 0] {
        engine.schedule(Event::tick(time, check.clone()));
    }
    engine.run().unwrap();
    assert_eq!(engine.current_time(), 9);
}

#[test]
#[should_panic(expected = "cannot schedule")]
fn test_scheduling_into_the_past_from_handler_aborts() {
    struct Backwards {
        engine: Arc<SerialEngine>,
    }

    impl Handler for Backwards {
        fn handle(&self, event: &Event) -> SimResult<()> {
            let log = new_log();
            self.engine
                .schedule(Event::tick(event.time() - 1, Named::new("late", &log)));
            Ok(())
        }
    }

    let engine = Arc::new(SerialEngine::new());
    let handler = Arc::new(Backwards {
        engine: Arc::clone(&engine),
    });
    engine.schedule(Event::tick(10, handler));
    let _ = engine.run();
}

#[test]
fn test_engine_hooks_surround_dispatch() {
    let engine = SerialEngine::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    engine.accept_hook(Arc::new(move |ctx: &HookCtx<'_>| {
        if let HookItem::Event(event) = ctx.item {
            sink.lock().push((ctx.pos, event.time()));
        }
    }));

    let log = new_log();
    engine.schedule(Event::new(
        3,
        Named::new("h", &log),
        EventPayload::Data(serde_json::json!({"k": 1})),
    ));
    engine.run().unwrap();

    assert_eq!(engine.num_hooks(), 1);
    assert_eq!(
        *seen.lock(),
        vec![(HookPos::BeforeEvent, 3), (HookPos::AfterEvent, 3)]
    );
}

#[test]
fn test_pause_from_handler_blocks_until_resume() {
    struct Pauser {
        engine: Arc<SerialEngine>,
        paused: AtomicBool,
    }

    impl Handler for Pauser {
        fn handle(&self, _event: &Event) -> SimResult<()> {
            self.engine.pause();
            self.paused.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    let engine = Arc::new(SerialEngine::new());
    let log = new_log();
    let pauser = Arc::new(Pauser {
        engine: Arc::clone(&engine),
        paused: AtomicBool::new(false),
    });
    engine.schedule(Event::tick(5, pauser.clone()));
    engine.schedule(Event::tick(6, Named::new("after", &log)));

    let runner = {
        let engine = Arc::clone(&engine);
        std::thread::spawn(move || engine.run())
    };

    while !pauser.paused.load(Ordering::SeqCst) {
        std::thread::yield_now();
    }
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(engine.current_time(), 5);
    assert!(log.lock().is_empty());

    engine.resume();
    runner.join().unwrap().unwrap();
    assert_eq!(log.lock().len(), 1);
    assert_eq!(engine.current_time(), 6);
}

#[test]
fn test_pause_before_run() {
    let engine = Arc::new(SerialEngine::new());
    let log = new_log();
    engine.schedule(Event::tick(1, Named::new("h", &log)));
    engine.pause();

    let runner = {
        let engine = Arc::clone(&engine);
        std::thread::spawn(move || engine.run())
    };

    std::thread::sleep(Duration::from_millis(50));
    assert!(log.lock().is_empty());

    engine.resume();
    runner.join().unwrap().unwrap();
    assert_eq!(log.lock().len(), 1);
}

/// Signals when it starts, then holds the dispatch for a while.
struct Slow {
    started: AtomicBool,
    finished: AtomicBool,
}

impl Handler for Slow {
    fn handle(&self, _event: &Event) -> SimResult<()> {
        self.started.store(true, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(100));
        self.finished.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn test_external_pause_waits_for_in_flight_dispatch() {
    let engine = Arc::new(SerialEngine::new());
    let log = new_log();
    let slow = Arc::new(Slow {
        started: AtomicBool::new(false),
        finished: AtomicBool::new(false),
    });
    engine.schedule(Event::tick(1, slow.clone()));
    engine.schedule(Event::tick(2, Named::new("after", &log)));

    let runner = {
        let engine = Arc::clone(&engine);
        std::thread::spawn(move || engine.run())
    };

    while !slow.started.load(Ordering::SeqCst) {
        std::thread::yield_now();
    }
    engine.pause();
    assert!(slow.finished.load(Ordering::SeqCst));

    std::thread::sleep(Duration::from_millis(50));
    assert!(log.lock().is_empty());
    assert_eq!(engine.current_time(), 1);

    engine.resume();
    runner.join().unwrap().unwrap();
    assert_eq!(log.lock().len(), 1);
}
