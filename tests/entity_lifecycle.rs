// Run:
//   cargo test --test entity_lifecycle

mod common;

use common::*;
use tick_ecs::{EcsError, Entity};

#[test]
fn destroyed_entities_are_dead_and_recycled_with_newer_generation() {
    let mut world = relaxed_world(8);
    let first = world.create_entity().unwrap();
    assert!(world.is_alive(first));

    assert!(world.destroy_entity(first).unwrap());
    assert!(!world.is_alive(first));

    let second = world.create_entity().unwrap();
    assert_eq!(second.index(), first.index());
    assert!(second.generation() > first.generation());
    assert!(!world.is_alive(first));
    assert!(world.is_alive(second));
}

#[test]
fn destroying_twice_is_a_no_op() {
    let mut world = relaxed_world(8);
    let entity = world.create_entity().unwrap();
    assert!(world.destroy_entity(entity).unwrap());
    assert!(!world.destroy_entity(entity).unwrap());
    assert_eq!(world.entity_count(), 0);
}

#[test]
fn free_list_is_lifo() {
    let mut world = relaxed_world(8);
    let a = world.create_entity().unwrap();
    let b = world.create_entity().unwrap();
    world.destroy_entity(a).unwrap();
    world.destroy_entity(b).unwrap();
    assert_eq!(world.create_entity().unwrap().index(), b.index());
    assert_eq!(world.create_entity().unwrap().index(), a.index());
}

#[test]
fn placeholder_is_never_alive() {
    let world = relaxed_world(8);
    assert!(!world.is_alive(Entity::PLACEHOLDER));
}

#[test]
fn stale_handles_fail_component_access() {
    let mut world = relaxed_world(8);
    let entity = world.create_entity().unwrap();
    world.add(entity, Health(3)).unwrap();
    world.destroy_entity(entity).unwrap();

    assert_eq!(world.get_ro::<Health>(entity), Err(EcsError::StaleEntity(entity)));
    assert!(!world.has::<Health>(entity).unwrap());
    assert!(!world.add(entity, Health(1)).unwrap());
    assert!(!world.remove::<Health>(entity).unwrap());
}

#[test]
fn destroy_fixes_the_location_of_the_swapped_entity() {
    let mut world = relaxed_world(4);
    let entities = spawn_movers(&mut world, 3).unwrap();
    world.destroy_entity(entities[0]).unwrap();

    let moved = world.entities().location(entities[2]).unwrap();
    assert_eq!(moved.row, 0);
    assert_eq!(world.get_ro::<Position>(entities[2]).unwrap().x, 2.0);
    assert_eq!(world.get_ro::<Position>(entities[1]).unwrap().x, 1.0);
}
