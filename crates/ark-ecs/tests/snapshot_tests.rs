//! Integration tests for world snapshots and full-state replacement.

use std::collections::BTreeSet;

use ark_ecs::prelude::*;
use serde_json::json;

// -- test component types ---------------------------------------------------

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
struct Velocity {
    dx: f32,
    dy: f32,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
struct Health(u32);

fn setup_world() -> World {
    let mut world = World::new();
    world.register_component::<Position>("position");
    world.register_component::<Velocity>("velocity");
    world.register_component::<Health>("health");
    world
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn snapshot_empty_world() {
    let world = setup_world();
    let snapshot = world.capture_snapshot();
    assert!(snapshot.entities.is_empty());

    let mut world2 = setup_world();
    world2.replace_with(&snapshot).unwrap();
    assert_eq!(world2.entity_count(), 0);
}

#[test]
fn snapshot_roundtrip_through_json_text() {
    let mut world = setup_world();
    let e1 = world
        .spawn_bundle(
            ComponentBundle::new()
                .with(Position { x: 1.0, y: 2.0 })
                .with(Velocity { dx: 3.0, dy: 4.0 }),
        )
        .unwrap();
    let e2 = world.spawn_with(Health(100)).unwrap();

    let text = serde_json::to_string(&world.capture_snapshot()).unwrap();
    let snapshot: WorldSnapshot = serde_json::from_str(&text).unwrap();

    let mut world2 = setup_world();
    world2.replace_with(&snapshot).unwrap();

    assert_eq!(world2.entities(), vec![e1, e2]);
    assert_eq!(
        world2.get_component::<Velocity>(e1),
        Some(&Velocity { dx: 3.0, dy: 4.0 })
    );
    assert_eq!(world2.get_component::<Health>(e2), Some(&Health(100)));
    assert_eq!(world2.get_component::<Health>(e1), None);
}

#[test]
fn bulk_replace_mid_session_leaves_exactly_the_new_set() {
    // Host world.
    let mut host = setup_world();
    let h1 = host.spawn_with(Position { x: 10.0, y: 10.0 }).unwrap();
    let h2 = host.spawn_with(Health(5)).unwrap();
    let snapshot = host.capture_snapshot();

    // Participant with unrelated local state.
    let mut local = setup_world();
    for i in 0..5 {
        local
            .spawn_bundle(
                ComponentBundle::new()
                    .with(Position { x: i as f32, y: 0.0 })
                    .with(Health(i)),
            )
            .unwrap();
    }

    local.remove_all_entities_except(&snapshot.entity_ids());
    local.bulk_upsert(&snapshot.entities).unwrap();

    assert_eq!(local.get_entities(&[]), vec![h1, h2]);
    assert_eq!(local.get_component::<Position>(h1), Some(&Position { x: 10.0, y: 10.0 }));
    assert_eq!(local.get_component::<Health>(h2), Some(&Health(5)));

    // Nothing left over from removed entities.
    let health = local.kind_of::<Health>().unwrap();
    assert_eq!(local.get_entities(&[health]), vec![h2]);
}

#[test]
fn replace_with_keeps_shared_ids_and_updates_values() {
    let mut world = setup_world();
    let e = world.spawn_with(Health(1)).unwrap();
    let gone = world.spawn_with(Health(2)).unwrap();

    let snapshot = WorldSnapshot {
        component_names: vec!["health".into()],
        entities: vec![EntitySnapshot {
            entity_id: e,
            components: [("health".to_owned(), json!(42))].into_iter().collect(),
        }],
    };
    world.replace_with(&snapshot).unwrap();

    assert_eq!(world.get_component::<Health>(e), Some(&Health(42)));
    assert!(!world.is_alive(gone));
}

#[test]
fn bad_payload_leaves_world_untouched() {
    let mut world = setup_world();
    let e = world.spawn_with(Health(1)).unwrap();

    let snapshot = WorldSnapshot {
        component_names: vec![],
        entities: vec![EntitySnapshot {
            entity_id: EntityId::from_raw(7),
            components: [("position".to_owned(), json!({"x": "left"}))]
                .into_iter()
                .collect(),
        }],
    };
    let err = world.replace_with(&snapshot).unwrap_err();
    assert!(matches!(
        err,
        EcsError::ComponentDeserializationError { ref component, .. } if component == "position"
    ));
    assert_eq!(world.entities(), vec![e]);
    assert_eq!(world.get_component::<Health>(e), Some(&Health(1)));
}

#[test]
fn remove_all_except_empty_set_clears_world() {
    let mut world = setup_world();
    world.spawn_with(Health(1)).unwrap();
    world.spawn_with(Health(2)).unwrap();
    assert_eq!(world.remove_all_entities_except(&BTreeSet::new()), 2);
    assert_eq!(world.entity_count(), 0);
}
