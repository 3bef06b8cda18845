#![allow(dead_code)]

use tick_ecs::{EcsResult, Entity, World, WorldConfig};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Velocity {
    pub dx: f32,
    pub dy: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Health(pub i32);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Frozen;

/// Relaxed world with every test component registered.
pub fn relaxed_world(chunk_capacity: usize) -> World {
    world_with(WorldConfig::default().with_chunk_capacity(chunk_capacity).with_strict_determinism(false))
}

pub fn world_with(config: WorldConfig) -> World {
    let mut world = World::new(config).expect("valid config");
    world.register_component::<Position>().unwrap();
    world.register_component::<Velocity>().unwrap();
    world.register_component::<Health>().unwrap();
    world.register_component::<Frozen>().unwrap();
    world
}

/// Spawns `count` movers with `Position(i, 0)` and `Velocity(1, 1)`.
pub fn spawn_movers(world: &mut World, count: usize) -> EcsResult<Vec<Entity>> {
    let mut entities = Vec::with_capacity(count);
    for i in 0..count {
        let entity = world.create_entity()?;
        world.add(entity, Position { x: i as f32, y: 0.0 })?;
        world.add(entity, Velocity { dx: 1.0, dy: 1.0 })?;
        entities.push(entity);
    }
    Ok(entities)
}
