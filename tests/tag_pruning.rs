use std::sync::Arc;

use archetype_ecs::{declare_component, declare_tag, EntityTags, Registry, World, WorldConfig};

#[derive(Debug, Clone, Copy, PartialEq)]
struct Position {
    x: f32,
    y: f32,
}
declare_component!(Position, 1);

struct Dead;
declare_tag!(Dead, 0);

struct Asleep;
declare_tag!(Asleep, 1);

fn world() -> World {
    let registry = Arc::new(
        Registry::builder()
            .register_component::<EntityTags>(0)
            .register_component::<Position>(1)
            .build(),
    );
    World::new(registry, WorldConfig::default().with_chunk_size_bytes(256)).unwrap()
}

/// S5: tagging a subset of entities sharing a chunk prunes a tag-filtered
/// query down to exactly that subset, and clearing the tag again excludes it,
/// even though the chunk's tag union itself never shrinks back down.
#[test]
fn tag_set_and_clear_changes_query_membership() {
    let mut w = world();
    let mut entities = Vec::new();
    for _ in 0..4 {
        let e = w.spawn().unwrap();
        w.add_component(e, Position { x: 0.0, y: 0.0 }).unwrap();
        entities.push(e);
    }

    w.set_tag::<EntityTags, Dead>(entities[1]).unwrap();
    w.set_tag::<EntityTags, Dead>(entities[3]).unwrap();

    let dead = w.query().with::<Position>().with_tag::<Dead>().build(&mut w).unwrap();
    assert_eq!(dead.entity_count(), 2);
    let dead_set: Vec<_> = dead.entities().collect();
    drop(dead);
    assert!(dead_set.contains(&entities[1]));
    assert!(dead_set.contains(&entities[3]));

    w.clear_tag::<EntityTags, Dead>(entities[1]).unwrap();
    let dead = w.query().with::<Position>().with_tag::<Dead>().build(&mut w).unwrap();
    assert_eq!(dead.entity_count(), 1);
    assert!(dead.entities().any(|e| e == entities[3]));
}

/// Two independent tags on the same entity set are each prunable on their
/// own, and an entity can satisfy both simultaneously.
#[test]
fn independent_tags_compose() {
    let mut w = world();
    let e = w.spawn().unwrap();
    w.add_component(e, Position { x: 0.0, y: 0.0 }).unwrap();
    w.set_tag::<EntityTags, Dead>(e).unwrap();
    w.set_tag::<EntityTags, Asleep>(e).unwrap();

    let dead = w.query().with::<Position>().with_tag::<Dead>().build(&mut w).unwrap();
    assert_eq!(dead.entity_count(), 1);
    drop(dead);
    let asleep = w.query().with::<Position>().with_tag::<Asleep>().build(&mut w).unwrap();
    assert_eq!(asleep.entity_count(), 1);
}
