use std::sync::Arc;

use archetype_ecs::registry::ComponentMask;
use archetype_ecs::{Executor, Registry, Schedule, System, SystemAccess, World, WorldConfig};
use criterion::{criterion_group, criterion_main, Criterion};

struct HeavySystem {
    access: SystemAccess,
}

impl System for HeavySystem {
    fn name(&self) -> &'static str {
        "HeavySystem"
    }

    fn access(&self) -> SystemAccess {
        self.access
    }

    fn run(&mut self, _world: &World) -> archetype_ecs::Result<()> {
        let mut x = 0u64;
        for i in 0..10_000u64 {
            x = x.wrapping_add(i);
        }
        std::hint::black_box(x);
        Ok(())
    }
}

fn world() -> World {
    let registry = Arc::new(Registry::builder().build());
    World::new(registry, WorldConfig::default()).unwrap()
}

fn independent_schedule(count: usize) -> Schedule {
    let mut schedule = Schedule::new();
    for i in 0..count {
        schedule.add_system(Box::new(HeavySystem {
            access: SystemAccess {
                reads: ComponentMask::EMPTY,
                writes: ComponentMask::EMPTY.with(i % 256),
            },
        }));
    }
    schedule
}

fn bench_wave_execution(c: &mut Criterion) {
    let mut group = c.benchmark_group("scheduler_bench");

    // 100 systems each writing a distinct component: one wave, fully
    // parallelizable when the `parallel` feature is on.
    group.bench_function("100_independent_systems", |b| {
        let schedule = independent_schedule(100);
        let mut executor = Executor::new(schedule).unwrap();
        let w = world();
        b.iter(|| executor.execute_frame(&w).unwrap());
    });

    // 100 systems all writing the same component: forces 100 sequential
    // waves regardless of the `parallel` feature.
    group.bench_function("100_serialized_systems", |b| {
        let mut schedule = Schedule::new();
        for _ in 0..100 {
            schedule.add_system(Box::new(HeavySystem {
                access: SystemAccess {
                    reads: ComponentMask::EMPTY,
                    writes: ComponentMask::EMPTY.with(0),
                },
            }));
        }
        let mut executor = Executor::new(schedule).unwrap();
        let w = world();
        b.iter(|| executor.execute_frame(&w).unwrap());
    });

    group.finish();
}

criterion_group!(benches, bench_wave_execution);
criterion_main!(benches);
