// Run:
//   cargo test --test command_buffer

mod common;

use common::*;
use tick_ecs::{
    ChunkMut, ChunkProcessor, CommandKind, EcsError, EcsResult, PlaybackStats, WorkerContext, World,
    WorldConfig,
};

#[test]
fn structure_is_invisible_until_end_tick() {
    let mut world = relaxed_world(8);
    world.begin_tick(1).unwrap();
    let pending = world.commands().unwrap().create().unwrap();
    world.commands().unwrap().add(pending, Health(4)).unwrap();
    assert_eq!(world.entity_count(), 0);

    let stats = world.end_tick().unwrap();
    assert_eq!(stats, PlaybackStats { created: 1, applied: 1, skipped: 0 });
    assert_eq!(world.entity_count(), 1);
}

#[test]
fn sequential_records_replay_in_order() {
    let mut world = relaxed_world(8);
    let entity = world.create_entity().unwrap();

    world.begin_tick(1).unwrap();
    {
        let mut commands = world.commands().unwrap();
        commands.add(entity, Health(1)).unwrap();
        commands.add(entity, Health(2)).unwrap();
        commands.remove::<Health>(entity).unwrap();
        commands.add(entity, Health(3)).unwrap();
    }
    world.end_tick().unwrap();
    assert_eq!(*world.get_ro::<Health>(entity).unwrap(), Health(3));
}

#[test]
fn commands_against_dead_entities_are_skipped() {
    let mut world = relaxed_world(8);
    let entity = world.create_entity().unwrap();

    world.begin_tick(1).unwrap();
    {
        let mut commands = world.commands().unwrap();
        commands.destroy(entity).unwrap();
        commands.add(entity, Health(1)).unwrap();
        commands.remove::<Health>(entity).unwrap();
        commands.destroy(entity).unwrap();
    }
    let stats = world.end_tick().unwrap();
    assert!(!world.is_alive(entity));
    assert_eq!(stats, PlaybackStats { created: 0, applied: 1, skipped: 3 });
}

/// Worker 0 destroys the target; every other worker tries to add to it.
#[derive(Clone)]
struct Contend {
    target: tick_ecs::Entity,
}

impl ChunkProcessor for Contend {
    fn process(&mut self, _chunk: ChunkMut<'_>, worker: &mut WorkerContext<'_>) -> EcsResult<()> {
        if worker.worker_index() == 0 {
            worker.commands().destroy(self.target)
        } else {
            worker.commands().add(self.target, Health(99))
        }
    }
}

fn contention_world() -> (World, tick_ecs::Entity) {
    let mut world = relaxed_world(1);
    spawn_movers(&mut world, 2).unwrap();
    let target = world.create_entity().unwrap();
    world.warmup_ecb_parallel(2, 4).unwrap();
    (world, target)
}

#[test]
fn lower_worker_destroy_beats_higher_worker_add() {
    let (mut world, target) = contention_world();
    let mut movers = world.query().with::<Velocity>().unwrap().build();

    world.begin_tick(1).unwrap();
    world.for_each_chunk_parallel(&mut movers, 2, Contend { target }).unwrap();
    let stats = world.end_tick().unwrap();

    assert!(!world.is_alive(target));
    assert_eq!(stats.applied, 1);
    assert_eq!(stats.skipped, 1);
}

#[test]
fn sequential_buffer_plays_before_workers() {
    let (mut world, target) = contention_world();
    let mut movers = world.query().with::<Velocity>().unwrap().build();

    world.begin_tick(1).unwrap();
    world.commands().unwrap().add(target, Health(1)).unwrap();
    world.for_each_chunk_parallel(&mut movers, 2, Contend { target }).unwrap();
    // The sequential tag sorts after every worker, yet it replays first.
    assert_eq!(world.command_buffer().worker(), u16::MAX);
    assert!(world.parallel_command_buffer().buffers().iter().all(|b| b.worker() < world.command_buffer().worker()));
    let stats = world.end_tick().unwrap();

    assert!(!world.is_alive(target));
    assert_eq!(stats, PlaybackStats { created: 0, applied: 2, skipped: 1 });
}

#[test]
fn pending_entities_resolve_within_their_buffer() {
    let mut world = relaxed_world(8);
    world.begin_tick(5).unwrap();
    {
        let mut commands = world.commands().unwrap();
        let a = commands.create().unwrap();
        let b = commands.create().unwrap();
        commands.add(b, Health(2)).unwrap();
        commands.add(a, Health(1)).unwrap();
        commands.destroy(a).unwrap();
        assert_eq!((a.worker(), a.tick(), a.slot()), (u16::MAX, 5, 0));
    }
    let stats = world.end_tick().unwrap();
    assert_eq!(stats.created, 2);
    assert_eq!(world.entity_count(), 1);

    let mut healthy = world.query().with::<Health>().unwrap().build();
    let mut values = Vec::new();
    world
        .for_each_entity(&mut healthy, |world, entity| {
            values.push(*world.get_ro::<Health>(entity)?);
            Ok(())
        })
        .unwrap();
    assert_eq!(values, vec![Health(2)]);
}

#[test]
fn pending_entities_do_not_outlive_their_tick() {
    let mut world = relaxed_world(8);
    world.begin_tick(1).unwrap();
    let pending = world.commands().unwrap().create().unwrap();
    world.end_tick().unwrap();

    world.begin_tick(2).unwrap();
    assert!(matches!(
        world.commands().unwrap().destroy(pending),
        Err(EcsError::UnknownPendingEntity { tick: 1, .. })
    ));
    world.end_tick().unwrap();
}

#[test]
fn strict_buffers_fail_past_warmed_capacity() {
    let mut world = world_with(WorldConfig::default());
    world.warmup_ecb(2);
    world.warmup_ecb_component::<Health>(1).unwrap();

    world.begin_tick(1).unwrap();
    let mut commands = world.commands().unwrap();
    let pending = commands.create().unwrap();
    commands.add(pending, Health(1)).unwrap();
    assert!(matches!(
        commands.create(),
        Err(EcsError::CommandCapacityExceeded { kind: "record", capacity: 2, .. })
    ));
    world.end_tick().unwrap();

    world.begin_tick(2).unwrap();
    let mut commands = world.commands().unwrap();
    let pending = commands.create().unwrap();
    commands.add(pending, Health(1)).unwrap();
    drop(commands);
    assert_eq!(world.end_tick().unwrap().created, 1);
}

#[test]
fn relaxed_buffers_grow() {
    let mut world = relaxed_world(8);
    world.begin_tick(1).unwrap();
    {
        let mut commands = world.commands().unwrap();
        for i in 0..100 {
            let pending = commands.create().unwrap();
            commands.add(pending, Health(i)).unwrap();
        }
    }
    assert_eq!(world.end_tick().unwrap().created, 100);
    assert_eq!(world.entity_count(), 100);
}

#[test]
fn strict_parallel_requires_warmed_workers() {
    let mut world = world_with(WorldConfig::default());
    spawn_movers(&mut world, 4).unwrap();
    let target = world.create_entity().unwrap();
    world.warmup_ecb_parallel(2, 4).unwrap();
    let mut movers = world.query().with::<Velocity>().unwrap().build();

    world.begin_tick(1).unwrap();
    assert_eq!(
        world.for_each_chunk_parallel(&mut movers, 3, Contend { target }),
        Err(EcsError::WorkerCountExceedsWarmup { requested: 3, warmed: 2 })
    );
    world.end_tick().unwrap();
}

/// Every worker records one entity creation per chunk.
#[derive(Clone)]
struct SpawnPerChunk;

impl ChunkProcessor for SpawnPerChunk {
    fn process(&mut self, _chunk: ChunkMut<'_>, worker: &mut WorkerContext<'_>) -> EcsResult<()> {
        let tick = worker.tick();
        let pending = worker.commands().create()?;
        assert_eq!(pending.tick(), tick);
        Ok(())
    }
}

#[test]
fn worker_buffers_added_mid_tick_carry_the_open_tick() {
    let mut world = relaxed_world(1);
    spawn_movers(&mut world, 2).unwrap();
    let mut movers = world.query().with::<Velocity>().unwrap().build();

    world.begin_tick(5).unwrap();
    world.for_each_chunk_parallel(&mut movers, 2, SpawnPerChunk).unwrap();

    let buffers = world.parallel_command_buffer().buffers();
    assert_eq!(buffers.len(), 2);
    for buffer in buffers {
        assert_eq!(buffer.tick(), 5);
        assert_eq!(buffer.len(), 1);
        for record in buffer.records() {
            assert_eq!((record.tick, record.worker), (5, buffer.worker()));
            match record.kind {
                CommandKind::Create { pending } => assert_eq!(pending.tick(), 5),
                other => panic!("unexpected record {other:?}"),
            }
        }
    }
    assert_eq!(world.end_tick().unwrap().created, 2);

    world.begin_tick(6).unwrap();
    world.for_each_chunk_parallel(&mut movers, 3, SpawnPerChunk).unwrap();
    assert!(world.parallel_command_buffer().buffers().iter().all(|buffer| buffer.tick() == 6));
    world.end_tick().unwrap();
}
