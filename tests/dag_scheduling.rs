use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use archetype_ecs::registry::ComponentMask;
use archetype_ecs::{EcsError, Executor, Registry, Schedule, System, SystemAccess, SystemId, World, WorldConfig};

fn world() -> World {
    let registry = Arc::new(Registry::builder().build());
    World::new(registry, WorldConfig::default().with_chunk_size_bytes(256)).unwrap()
}

struct RecordingSystem {
    name: &'static str,
    access: SystemAccess,
    log: Arc<Mutex<Vec<&'static str>>>,
    counter: Arc<AtomicUsize>,
}

impl System for RecordingSystem {
    fn access(&self) -> SystemAccess {
        self.access
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn run(&mut self, _world: &World) -> archetype_ecs::Result<()> {
        self.log.lock().unwrap().push(self.name);
        self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// S4: two systems writing disjoint components land in the same wave; a
/// third system writing one of those components must wait for a second
/// wave. Every system still runs exactly once per frame regardless of how
/// many waves it takes.
#[test]
fn disjoint_writers_share_a_wave_conflicting_writer_waits() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let counter = Arc::new(AtomicUsize::new(0));

    let mut schedule = Schedule::new();
    schedule.add_system(Box::new(RecordingSystem {
        name: "movement",
        access: SystemAccess {
            reads: ComponentMask::EMPTY,
            writes: ComponentMask::EMPTY.with(0),
        },
        log: Arc::clone(&log),
        counter: Arc::clone(&counter),
    }));
    schedule.add_system(Box::new(RecordingSystem {
        name: "health_regen",
        access: SystemAccess {
            reads: ComponentMask::EMPTY,
            writes: ComponentMask::EMPTY.with(1),
        },
        log: Arc::clone(&log),
        counter: Arc::clone(&counter),
    }));
    schedule.add_system(Box::new(RecordingSystem {
        name: "movement_cleanup",
        access: SystemAccess {
            reads: ComponentMask::EMPTY,
            writes: ComponentMask::EMPTY.with(0),
        },
        log: Arc::clone(&log),
        counter: Arc::clone(&counter),
    }));

    let schedule = schedule.build().unwrap();
    assert_eq!(schedule.wave_count(), 2);

    let mut executor = Executor::new(schedule).unwrap();
    let w = world();
    executor.execute_frame(&w).unwrap();

    assert_eq!(counter.load(Ordering::SeqCst), 3);
    let order = log.lock().unwrap().clone();
    assert_eq!(order.len(), 3);
    // "movement_cleanup" conflicts with "movement" (both write component 0),
    // so it must come after it regardless of wave-internal ordering.
    let movement_pos = order.iter().position(|&n| n == "movement").unwrap();
    let cleanup_pos = order.iter().position(|&n| n == "movement_cleanup").unwrap();
    assert!(movement_pos < cleanup_pos);
}

/// S4: running the same schedule twice produces the same per-system call
/// count both times, whether waves are dispatched sequentially or (the
/// default, `parallel` feature) across a rayon pool.
#[test]
fn repeated_frames_run_every_system_once_per_frame() {
    let counter = Arc::new(AtomicUsize::new(0));
    let log = Arc::new(Mutex::new(Vec::new()));

    let mut schedule = Schedule::new();
    schedule.add_system(Box::new(RecordingSystem {
        name: "a",
        access: SystemAccess {
            reads: ComponentMask::EMPTY,
            writes: ComponentMask::EMPTY.with(0),
        },
        log: Arc::clone(&log),
        counter: Arc::clone(&counter),
    }));
    schedule.add_system(Box::new(RecordingSystem {
        name: "b",
        access: SystemAccess {
            reads: ComponentMask::EMPTY,
            writes: ComponentMask::EMPTY.with(1),
        },
        log: Arc::clone(&log),
        counter: Arc::clone(&counter),
    }));

    let mut executor = Executor::new(schedule).unwrap();
    let w = world();
    executor.execute_frame(&w).unwrap();
    executor.execute_frame(&w).unwrap();
    executor.execute_frame(&w).unwrap();

    assert_eq!(counter.load(Ordering::SeqCst), 6);
    assert_eq!(executor.profiler().get_stats(SystemId(0)).unwrap().call_count, 3);
    assert_eq!(executor.profiler().get_stats(SystemId(1)).unwrap().call_count, 3);
}

/// S6: an explicit `after` cycle between two systems is rejected at build
/// time with `SystemCycleDetected`, not silently dropped or deadlocked.
#[test]
fn mutual_after_cycle_is_rejected() {
    let mut schedule = Schedule::new();
    schedule.add_system_after(
        Box::new(RecordingSystem {
            name: "a",
            access: SystemAccess::empty(),
            log: Arc::new(Mutex::new(Vec::new())),
            counter: Arc::new(AtomicUsize::new(0)),
        }),
        &[SystemId(1)],
    );
    schedule.add_system_after(
        Box::new(RecordingSystem {
            name: "b",
            access: SystemAccess::empty(),
            log: Arc::new(Mutex::new(Vec::new())),
            counter: Arc::new(AtomicUsize::new(0)),
        }),
        &[SystemId(0)],
    );

    let err = schedule.build().err().unwrap();
    assert_eq!(err, EcsError::SystemCycleDetected);
}

/// A three-system cycle (a -> b -> c -> a) is caught the same way a direct
/// two-system cycle is.
#[test]
fn three_system_after_cycle_is_rejected() {
    let mut schedule = Schedule::new();
    schedule.add_system_after(
        Box::new(RecordingSystem {
            name: "a",
            access: SystemAccess::empty(),
            log: Arc::new(Mutex::new(Vec::new())),
            counter: Arc::new(AtomicUsize::new(0)),
        }),
        &[SystemId(2)],
    );
    schedule.add_system_after(
        Box::new(RecordingSystem {
            name: "b",
            access: SystemAccess::empty(),
            log: Arc::new(Mutex::new(Vec::new())),
            counter: Arc::new(AtomicUsize::new(0)),
        }),
        &[SystemId(0)],
    );
    schedule.add_system_after(
        Box::new(RecordingSystem {
            name: "c",
            access: SystemAccess::empty(),
            log: Arc::new(Mutex::new(Vec::new())),
            counter: Arc::new(AtomicUsize::new(0)),
        }),
        &[SystemId(1)],
    );

    assert_eq!(schedule.build().err(), Some(EcsError::SystemCycleDetected));
}
