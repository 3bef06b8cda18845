// Run:
//   cargo test --test query_order

mod common;

use common::*;
use tick_ecs::{ChunkRef, EcsResult, Entity, World};

/// Builds the same world from a fixed script of structural operations.
fn scripted_world() -> EcsResult<World> {
    let mut world = relaxed_world(4);
    let movers = spawn_movers(&mut world, 10)?;
    for (i, &entity) in movers.iter().enumerate() {
        if i % 3 == 0 {
            world.add(entity, Health(i as i32))?;
        }
        if i % 4 == 1 {
            world.destroy_entity(entity)?;
        }
    }
    for _ in 0..3 {
        let entity = world.create_entity()?;
        world.add(entity, Position { x: -1.0, y: -1.0 })?;
    }
    Ok(world)
}

fn visit_order(world: &mut World) -> EcsResult<Vec<Entity>> {
    let mut query = world.query().with::<Position>()?.build();
    let mut order = Vec::new();
    world.for_each_entity(&mut query, |_, entity| {
        order.push(entity);
        Ok(())
    })?;
    Ok(order)
}

#[test]
fn identical_scripts_visit_entities_in_identical_order() {
    let mut first = scripted_world().unwrap();
    let mut second = scripted_world().unwrap();
    let a = visit_order(&mut first).unwrap();
    let b = visit_order(&mut second).unwrap();
    assert_eq!(a.len(), first.entity_count());
    assert_eq!(a, b);
}

#[test]
fn none_set_excludes_archetypes() {
    let mut world = relaxed_world(8);
    let movers = spawn_movers(&mut world, 4).unwrap();
    world.add(movers[2], Frozen).unwrap();

    let mut moving = world.query().with::<Velocity>().unwrap().without::<Frozen>().unwrap().build();
    let mut seen = Vec::new();
    world
        .for_each_entity(&mut moving, |_, entity| {
            seen.push(entity);
            Ok(())
        })
        .unwrap();
    seen.sort();
    assert_eq!(seen, vec![movers[0], movers[1], movers[3]]);
}

#[test]
fn empty_all_set_matches_every_archetype() {
    let mut world = relaxed_world(8);
    spawn_movers(&mut world, 2).unwrap();
    world.create_entity().unwrap();
    let mut everything = world.query().build();
    let mut count = 0;
    world
        .for_each_entity(&mut everything, |_, _| {
            count += 1;
            Ok(())
        })
        .unwrap();
    assert_eq!(count, 3);
}

#[test]
fn cache_is_reused_until_structure_changes() {
    let mut world = relaxed_world(8);
    spawn_movers(&mut world, 2).unwrap();
    let mut query = world.query().with::<Position>().unwrap().build();
    world.warmup_query(&mut query);
    assert!(query.is_cache_current(world.store()));

    let first = query.get_or_build_cache(world.store());
    let again = query.get_or_build_cache(world.store());
    assert!(std::sync::Arc::ptr_eq(&first, &again));

    let entity = world.create_entity().unwrap();
    assert!(!query.is_cache_current(world.store()));
    world.add(entity, Health(1)).unwrap();
    world.add(entity, Position { x: 0.0, y: 0.0 }).unwrap();
    let rebuilt = query.get_or_build_cache(world.store());
    assert_eq!(query.cached_version(), Some(world.structural_version()));
    assert_eq!(rebuilt.len(), first.len() + 1);
}

#[test]
fn cache_built_by_another_world_is_rebuilt() {
    let mut a = relaxed_world(8);
    let mut b = relaxed_world(8);
    spawn_movers(&mut a, 1).unwrap();
    spawn_movers(&mut b, 1).unwrap();
    let mut query = a.query().with::<Position>().unwrap().build();
    a.warmup_query(&mut query);
    assert_eq!(a.structural_version(), b.structural_version());
    assert!(!query.is_cache_current(b.store()));
}

#[test]
fn chunks_are_visited_in_index_order_and_empty_ones_skipped() {
    let mut world = relaxed_world(2);
    let movers = spawn_movers(&mut world, 6).unwrap();
    world.destroy_entity(movers[2]).unwrap();
    world.destroy_entity(movers[3]).unwrap();

    let mut query = world.query().with::<Position>().unwrap().build();
    let mut chunks: Vec<ChunkRef> = Vec::new();
    world
        .for_each_chunk(&mut query, |world, chunk| {
            assert!(!world.chunk(chunk)?.is_empty());
            chunks.push(chunk);
            Ok(())
        })
        .unwrap();
    let indices: Vec<u32> = chunks.iter().map(|c| c.chunk).collect();
    assert_eq!(indices, vec![0, 2]);
}

#[test]
fn callbacks_may_write_components() {
    let mut world = relaxed_world(4);
    let movers = spawn_movers(&mut world, 6).unwrap();
    let mut query = world.query().with::<Position>().unwrap().with::<Velocity>().unwrap().build();
    world
        .for_each_chunk(&mut query, |world, chunk| {
            let mut chunk = world.chunk_mut(chunk)?;
            if let Some((velocity, position)) = chunk.read_write::<Velocity, Position>() {
                for (p, v) in position.iter_mut().zip(velocity) {
                    p.x += v.dx;
                }
            }
            Ok(())
        })
        .unwrap();
    for (i, &entity) in movers.iter().enumerate() {
        assert_eq!(world.get_ro::<Position>(entity).unwrap().x, i as f32 + 1.0);
    }
}
