#![allow(dead_code)]

use tick_ecs::{
    ChunkMut, ChunkProcessor, EcsResult, Query, ReducingChunkProcessor, Sum, WorkerContext, World, WorldConfig,
};

pub const AGENTS_SMALL: usize = 10_000;
pub const AGENTS_MED: usize = 100_000;
pub const WORKERS: usize = 4;

#[derive(Clone, Copy)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

#[derive(Clone, Copy)]
pub struct Wealth {
    pub value: f32,
}

#[derive(Clone, Copy)]
pub struct Productivity {
    pub rate: f32,
}

pub fn make_world(strict: bool) -> World {
    let config = WorldConfig::default()
        .with_strict_determinism(strict)
        .with_initial_entity_capacity(AGENTS_MED);
    let mut world = World::new(config).expect("default config is valid");
    world.register_component::<Position>().unwrap();
    world.register_component::<Wealth>().unwrap();
    world.register_component::<Productivity>().unwrap();
    world.freeze_components();
    world
}

pub fn populate(world: &mut World, agents: usize) -> EcsResult<()> {
    for i in 0..agents {
        let entity = world.create_entity()?;
        world.add(entity, Position { x: i as f32, y: 0.0 })?;
        world.add(entity, Wealth { value: 1.0 })?;
        world.add(entity, Productivity { rate: 0.01 + (i % 7) as f32 * 0.001 })?;
    }
    world.warmup_ecb_parallel(WORKERS, 0)?;
    Ok(())
}

pub fn economy_query(world: &mut World) -> Query {
    let mut query = world
        .query()
        .with::<Wealth>()
        .unwrap()
        .with::<Productivity>()
        .unwrap()
        .build();
    world.warmup_query(&mut query);
    query
}

/// Wealth grows by productivity.
#[derive(Clone)]
pub struct Produce;

impl ChunkProcessor for Produce {
    fn process(&mut self, mut chunk: ChunkMut<'_>, _: &mut WorkerContext<'_>) -> EcsResult<()> {
        if let Some((rate, wealth)) = chunk.read_write::<Productivity, Wealth>() {
            for (w, p) in wealth.iter_mut().zip(rate) {
                w.value *= 1.0 + p.rate;
            }
        }
        Ok(())
    }
}

/// Total wealth per worker.
#[derive(Clone)]
pub struct TotalWealth;

impl ReducingChunkProcessor<Sum> for TotalWealth {
    fn process(&mut self, chunk: ChunkMut<'_>, _: &mut WorkerContext<'_>, total: &mut Sum) -> EcsResult<()> {
        if let Some(wealth) = chunk.column::<Wealth>() {
            total.0 += wealth.iter().map(|w| f64::from(w.value)).sum::<f64>();
        }
        Ok(())
    }
}
