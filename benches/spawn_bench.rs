use std::sync::Arc;

use archetype_ecs::{declare_component, Registry, World, WorldConfig};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

#[derive(Debug, Clone, Copy)]
struct Position(f32, f32, f32);
declare_component!(Position, 0);

#[derive(Debug, Clone, Copy)]
struct Velocity(f32, f32, f32);
declare_component!(Velocity, 1);

#[derive(Debug, Clone, Copy)]
struct Health(u32);
declare_component!(Health, 2);

fn world() -> World {
    let registry = Arc::new(
        Registry::builder()
            .register_component::<Position>(1)
            .register_component::<Velocity>(2)
            .register_component::<Health>(3)
            .build(),
    );
    World::new(registry, WorldConfig::default()).unwrap()
}

fn spawn_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("spawn_bench");

    group.bench_function("spawn_2_components", |b| {
        let mut w = world();
        b.iter(|| {
            for _ in 0..1000 {
                let e = w.spawn().unwrap();
                w.add_component(e, Position(1.0, 2.0, 3.0)).unwrap();
                w.add_component(e, Velocity(1.0, 0.0, 0.0)).unwrap();
                black_box(e);
            }
            w.clear().unwrap();
        });
    });

    group.bench_function("spawn_3_components_bundle", |b| {
        let mut w = world();
        b.iter(|| {
            for _ in 0..1000 {
                let e = w
                    .spawn_with((Position(1.0, 2.0, 3.0), Velocity(1.0, 0.0, 0.0), Health(100)))
                    .unwrap();
                black_box(e);
            }
            w.clear().unwrap();
        });
    });

    group.bench_function("spawn_mixed_archetypes", |b| {
        let mut w = world();
        b.iter(|| {
            for i in 0..1000 {
                let e = if i % 2 == 0 {
                    w.spawn_with((Position(1.0, 2.0, 3.0), Velocity(1.0, 0.0, 0.0))).unwrap()
                } else {
                    w.spawn_with((Position(1.0, 2.0, 3.0), Velocity(1.0, 0.0, 0.0), Health(100)))
                        .unwrap()
                };
                black_box(e);
            }
            w.clear().unwrap();
        });
    });

    group.bench_function("query_iteration_1000_entities", |b| {
        let mut w = world();
        for _ in 0..1000 {
            w.spawn_with((Position(1.0, 2.0, 3.0), Velocity(1.0, 0.0, 0.0))).unwrap();
        }
        b.iter(|| {
            let query = w.query().with::<Position>().with::<Velocity>().build(&mut w).unwrap();
            let sum: f32 = query
                .chunks()
                .flat_map(|chunk| chunk.column::<Position>().unwrap().iter().map(|p| p.0))
                .sum();
            black_box(sum);
        });
    });

    group.finish();
}

criterion_group!(benches, spawn_benchmark);
criterion_main!(benches);
