use criterion::*;
use std::hint::black_box;

use tick_ecs::Scheduler;

mod common;
use common::*;

fn tick_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("tick");

    let mut world = make_world(true);
    populate(&mut world, AGENTS_MED).unwrap();
    let mut query = economy_query(&mut world);

    let mut scheduler = Scheduler::new();
    scheduler.add_fn("produce", move |world| world.for_each_chunk_parallel(&mut query, WORKERS, Produce));

    let mut tick = 0;
    group.bench_function("parallel_produce_tick_100k", |b| {
        b.iter(|| {
            tick += 1;
            black_box(scheduler.run_tick(&mut world, tick).unwrap());
        });
    });

    group.finish();
}

criterion_group!(benches, tick_benchmark);
criterion_main!(benches);
