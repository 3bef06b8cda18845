// Run:
//   cargo test --test scheduler -- --nocapture

mod common;

use common::*;
use tick_ecs::{
    ChunkMut, ChunkProcessor, EcsResult, Entity, FnSystem, Query, Scheduler, System, WorkerContext, World,
};

/// Drains health every tick and queues the dead for destruction.
struct Starvation {
    living: Query,
}

impl System for Starvation {
    fn name(&self) -> &str {
        "starvation"
    }

    fn run(&mut self, world: &mut World) -> EcsResult<()> {
        let mut dead: Vec<Entity> = Vec::new();
        world.for_each_chunk(&mut self.living, |world, chunk| {
            let mut chunk = world.chunk_mut(chunk)?;
            let entities = chunk.entities().to_vec();
            if let Some(health) = chunk.column_mut::<Health>() {
                for (entity, h) in entities.into_iter().zip(health.iter_mut()) {
                    h.0 -= 1;
                    if h.0 <= 0 {
                        dead.push(entity);
                    }
                }
            }
            Ok(())
        })?;
        let mut commands = world.commands()?;
        for entity in dead {
            commands.destroy(entity)?;
        }
        Ok(())
    }
}

#[derive(Clone)]
struct Drift;

impl ChunkProcessor for Drift {
    fn process(&mut self, mut chunk: ChunkMut<'_>, _: &mut WorkerContext<'_>) -> EcsResult<()> {
        if let Some((velocity, position)) = chunk.read_write::<Velocity, Position>() {
            for (p, v) in position.iter_mut().zip(velocity) {
                p.x += v.dx;
            }
        }
        Ok(())
    }
}

fn colony() -> (World, Scheduler) {
    let mut world = relaxed_world(4);
    let movers = spawn_movers(&mut world, 10).unwrap();
    for (i, &entity) in movers.iter().enumerate() {
        world.add(entity, Health(i as i32 + 1)).unwrap();
    }
    world.warmup_ecb_parallel(2, 16).unwrap();

    let living = world.query().with::<Health>().unwrap().build();
    let mut drifting = world.query().with::<Position>().unwrap().with::<Velocity>().unwrap().build();

    let mut scheduler = Scheduler::new();
    scheduler.add_system(Box::new(Starvation { living }));
    scheduler.add_system(Box::new(FnSystem::new("drift", move |world: &mut World| {
        world.for_each_chunk_parallel(&mut drifting, 2, Drift)
    })));
    scheduler.add_fn("births", |world: &mut World| {
        if world.time().tick() % 2 == 0 {
            let mut commands = world.commands()?;
            let child = commands.create()?;
            commands.add(child, Health(100))?;
        }
        Ok(())
    });
    (world, scheduler)
}

#[test]
fn ticks_run_systems_and_replay_commands() {
    let (mut world, mut scheduler) = colony();
    assert_eq!(scheduler.len(), 3);

    let stats = scheduler.run_tick(&mut world, 0).unwrap();
    assert_eq!(stats.created, 1);
    assert_eq!(stats.applied, 2);
    assert_eq!(world.entity_count(), 10);

    let total = scheduler.run_ticks(&mut world, 1, 4).unwrap();
    assert_eq!(total.created, 2);
    assert_eq!(world.entity_count(), 10 - 5 + 3);
    assert!(!world.is_updating());
}

#[test]
fn colonies_evolve_identically() {
    let snapshot = |world: &mut World| {
        let mut all = world.query().with::<Health>().unwrap().build();
        let mut out = Vec::new();
        world
            .for_each_entity(&mut all, |world, entity| {
                let x = world.get_ro::<Position>(entity).map(|p| p.x).ok();
                out.push((entity, world.get_ro::<Health>(entity)?.0, x));
                Ok(())
            })
            .unwrap();
        out
    };

    let (mut a, mut sa) = colony();
    let (mut b, mut sb) = colony();
    sa.run_ticks(&mut a, 0, 8).unwrap();
    sb.run_ticks(&mut b, 0, 8).unwrap();
    assert_eq!(snapshot(&mut a), snapshot(&mut b));
}
