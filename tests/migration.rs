// Run:
//   cargo test --test migration

mod common;

use common::*;
use tick_ecs::{AllocationPolicy, EcsError, RemovalPolicy, WorldConfig};

#[test]
fn add_remove_history_decides_the_archetype() {
    let mut world = relaxed_world(16);
    let entity = world.create_entity().unwrap();
    let position = world.component_handle::<Position>().unwrap();
    let health = world.component_handle::<Health>().unwrap();

    world.add(entity, Position { x: 1.0, y: 2.0 }).unwrap();
    world.add(entity, Health(10)).unwrap();
    world.add(entity, Velocity { dx: 0.5, dy: 0.5 }).unwrap();
    world.remove::<Velocity>(entity).unwrap();

    let archetype = world.store().archetype_of(world.entities(), entity).unwrap();
    let signature = world.store().archetype(archetype).unwrap().signature();
    let ids: Vec<_> = signature.iter().collect();
    let mut expected = vec![position.id(), health.id()];
    expected.sort_unstable();
    assert_eq!(ids, expected);

    assert_eq!(*world.get_ro::<Position>(entity).unwrap(), Position { x: 1.0, y: 2.0 });
    assert_eq!(*world.get_ro::<Health>(entity).unwrap(), Health(10));
    assert_eq!(
        world.get_ro::<Velocity>(entity),
        Err(EcsError::ComponentAbsent { entity, name: std::any::type_name::<Velocity>() })
    );
}

#[test]
fn migration_keeps_neighbours_intact() {
    let mut world = relaxed_world(16);
    let entities = spawn_movers(&mut world, 5).unwrap();
    world.add(entities[1], Health(7)).unwrap();
    world.add(entities[3], Frozen).unwrap();

    for (i, &entity) in entities.iter().enumerate() {
        assert_eq!(world.get_ro::<Position>(entity).unwrap().x, i as f32);
        assert_eq!(*world.get_ro::<Velocity>(entity).unwrap(), Velocity { dx: 1.0, dy: 1.0 });
    }
    assert!(world.has::<Health>(entities[1]).unwrap());
    assert!(world.has::<Frozen>(entities[3]).unwrap());
    assert!(!world.has::<Health>(entities[0]).unwrap());
}

#[test]
fn overwrite_keeps_location_and_version() {
    let mut world = relaxed_world(16);
    let entity = world.create_entity().unwrap();
    world.add(entity, Health(1)).unwrap();
    let location = world.entities().location(entity);
    let version = world.structural_version();

    world.add(entity, Health(2)).unwrap();
    assert_eq!(world.entities().location(entity), location);
    assert_eq!(world.structural_version(), version);
    assert_eq!(*world.get_ro::<Health>(entity).unwrap(), Health(2));
}

#[test]
fn every_structural_change_bumps_the_version_once() {
    let mut world = relaxed_world(16);
    let v0 = world.structural_version();
    let entity = world.create_entity().unwrap();
    assert_eq!(world.structural_version(), v0 + 1);
    world.add(entity, Health(1)).unwrap();
    assert_eq!(world.structural_version(), v0 + 2);
    world.remove::<Health>(entity).unwrap();
    assert_eq!(world.structural_version(), v0 + 3);
    assert!(!world.remove::<Health>(entity).unwrap());
    assert_eq!(world.structural_version(), v0 + 3);
    world.destroy_entity(entity).unwrap();
    assert_eq!(world.structural_version(), v0 + 4);
}

#[test]
fn removing_the_last_component_keeps_the_entity_alive() {
    let mut world = relaxed_world(16);
    let entity = world.create_entity().unwrap();
    world.add(entity, Health(5)).unwrap();
    world.remove::<Health>(entity).unwrap();
    assert!(world.is_alive(entity));
    assert_eq!(world.store().archetype_of(world.entities(), entity), Some(0));
}

#[test]
fn swap_back_moves_the_last_entity_into_the_hole() {
    const N: usize = 4;
    let mut world = relaxed_world(N);
    let entities = spawn_movers(&mut world, N).unwrap();

    let archetype = world.store().archetype_of(world.entities(), entities[0]).unwrap();
    assert_eq!(world.store().archetype(archetype).unwrap().chunks()[0].len(), N);

    world.remove::<Velocity>(entities[0]).unwrap();

    let chunk = &world.store().archetype(archetype).unwrap().chunks()[0];
    assert_eq!(chunk.len(), N - 1);
    assert_eq!(chunk.entities()[0], entities[N - 1]);
    assert_eq!(chunk.column::<Position>().unwrap()[0].x, (N - 1) as f32);
    assert_eq!(chunk.column::<Velocity>().unwrap().len(), N - 1);
    assert_eq!(world.entities().location(entities[N - 1]).unwrap().row, 0);
}

#[test]
fn ordered_removal_preserves_insertion_order() {
    let mut world = world_with(
        WorldConfig::default()
            .with_chunk_capacity(8)
            .with_removal_policy(RemovalPolicy::Ordered)
            .with_strict_determinism(false),
    );
    let entities = spawn_movers(&mut world, 4).unwrap();
    world.destroy_entity(entities[1]).unwrap();

    let archetype = world.store().archetype_of(world.entities(), entities[0]).unwrap();
    let chunk = &world.store().archetype(archetype).unwrap().chunks()[0];
    assert_eq!(chunk.entities(), &[entities[0], entities[2], entities[3]]);
    let xs: Vec<f32> = chunk.column::<Position>().unwrap().iter().map(|p| p.x).collect();
    assert_eq!(xs, vec![0.0, 2.0, 3.0]);
    assert_eq!(world.entities().location(entities[3]).unwrap().row, 2);
}

#[test]
fn first_fit_reuses_holes_and_append_to_last_does_not() {
    for (policy, expected_chunk) in [(AllocationPolicy::ScanFirstFit, 0), (AllocationPolicy::AppendToLast, 1)] {
        let mut world = world_with(
            WorldConfig::default()
                .with_chunk_capacity(2)
                .with_allocation_policy(policy)
                .with_strict_determinism(false),
        );
        let entities: Vec<_> = (0..3)
            .map(|_| {
                let entity = world.create_entity().unwrap();
                world.add(entity, Health(0)).unwrap();
                entity
            })
            .collect();
        world.destroy_entity(entities[0]).unwrap();

        let late = world.create_entity().unwrap();
        world.add(late, Health(9)).unwrap();
        assert_eq!(world.entities().location(late).unwrap().chunk, expected_chunk, "{policy:?}");
    }
}

#[test]
fn handles_from_another_world_are_rejected() {
    let mut world = relaxed_world(8);
    let other = relaxed_world(8);
    let foreign = other.component_handle::<Health>().unwrap();
    let entity = world.create_entity().unwrap();
    assert!(matches!(
        world.add_by_handle(foreign, entity, Health(1)),
        Err(EcsError::ForeignComponentHandle { .. })
    ));
}

#[test]
fn unregistered_types_are_configuration_errors() {
    struct Unknown;
    let mut world = relaxed_world(8);
    let entity = world.create_entity().unwrap();
    assert!(matches!(world.add(entity, Unknown), Err(EcsError::UnregisteredComponent { .. })));
    assert!(matches!(world.has::<Unknown>(entity), Err(EcsError::UnregisteredComponent { .. })));
}

#[test]
fn frozen_registry_rejects_new_types() {
    struct Late;
    let mut world = relaxed_world(8);
    world.freeze_components();
    assert!(matches!(world.register_component::<Late>(), Err(EcsError::RegistryFrozen { .. })));
    assert!(world.register_component::<Health>().is_ok());
}
