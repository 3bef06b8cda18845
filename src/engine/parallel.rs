//! Deterministic parallel chunk processing.
//!
//! ## Work assignment
//! The chunks of every archetype matching a query are flattened into one work
//! list in (archetype creation order, chunk index) order, skipping empty
//! chunks. Item `i` of that list is owned by worker `i % worker_count`. The
//! assignment depends only on storage layout and worker count, never on
//! thread scheduling, so each worker processes the same chunks in the same
//! order on every run.
//!
//! ## Execution
//! Each worker gets:
//!
//! * its own clone of the processor,
//! * exclusive `&mut` access to its chunks (buckets are disjoint),
//! * its own command sub-buffer, reached through a [`WorkerContext`],
//! * its own reduction slot.
//!
//! Workers run on rayon, either on the world's dedicated pool or on the
//! global pool. Failures are collected per worker and the error of the lowest
//! worker index is returned.

use rayon::prelude::*;
use rayon::ThreadPool;

use crate::engine::archetype::Archetype;
use crate::engine::chunk::{Chunk, ChunkMut, ChunkRef};
use crate::engine::commands::{CommandBuffer, EcbWriter};
use crate::engine::component::ComponentRegistry;
use crate::engine::error::EcsResult;
use crate::engine::types::{ArchetypeId, ChunkIndex, Tick, WorkerIndex};

/// Per-worker state handed to a processor alongside each chunk.
pub struct WorkerContext<'a> {
    worker: WorkerIndex,
    tick: Tick,
    commands: EcbWriter<'a>,
}

impl<'a> WorkerContext<'a> {
    /// Index of the worker running this chunk.
    #[inline] pub fn worker_index(&self) -> usize { self.worker as usize }
    /// Tick the chunks are processed in.
    #[inline] pub fn tick(&self) -> Tick { self.tick }

    /// Command sub-buffer owned by this worker.
    #[inline]
    pub fn commands(&mut self) -> &mut EcbWriter<'a> {
        &mut self.commands
    }
}

/// Per-chunk work run on every worker.
///
/// The processor is cloned once per worker, so any state it carries is
/// worker-local.
pub trait ChunkProcessor: Clone + Send {
    /// Processes one chunk. An error skips the rest of this worker's chunks;
    /// the pass reports the lowest-numbered worker's error.
    fn process(&mut self, chunk: ChunkMut<'_>, worker: &mut WorkerContext<'_>) -> EcsResult<()>;
}

/// Per-chunk work that also accumulates into a worker-local reduction slot.
pub trait ReducingChunkProcessor<R>: Clone + Send {
    /// Processes one chunk, folding its contribution into `reduction`.
    fn process(&mut self, chunk: ChunkMut<'_>, worker: &mut WorkerContext<'_>, reduction: &mut R) -> EcsResult<()>;
}

/// Adapts a plain processor to the reducing executor.
#[derive(Clone)]
pub(crate) struct Unreduced<P>(pub(crate) P);

impl<P: ChunkProcessor> ReducingChunkProcessor<()> for Unreduced<P> {
    fn process(&mut self, chunk: ChunkMut<'_>, worker: &mut WorkerContext<'_>, _: &mut ()) -> EcsResult<()> {
        self.0.process(chunk, worker)
    }
}

/// Worker owning item `item_index` of the flattened work list.
#[inline]
pub fn assign_worker(item_index: usize, worker_count: usize) -> usize {
    item_index % worker_count
}

/// One entry of the flattened work list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WorkItem {
    /// Position in the flattened list.
    pub index: usize,
    /// Owning archetype.
    pub archetype: ArchetypeId,
    /// Chunk index within the archetype.
    pub chunk: ChunkIndex,
    /// Worker that processes this chunk (`index % worker_count`).
    pub worker: usize,
}

impl WorkItem {
    /// Address of the chunk this item covers.
    #[inline]
    pub fn chunk_ref(&self) -> ChunkRef {
        ChunkRef { archetype: self.archetype, chunk: self.chunk }
    }
}

/// Full chunk-to-worker plan for one query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkAssignment {
    worker_count: usize,
    items: Vec<WorkItem>,
}

impl WorkAssignment {
    /// Worker count the plan was built for.
    #[inline] pub fn worker_count(&self) -> usize { self.worker_count }
    /// Every item in processing order.
    #[inline] pub fn items(&self) -> &[WorkItem] { &self.items }
    /// Number of non-empty chunks in the plan.
    #[inline] pub fn len(&self) -> usize { self.items.len() }
    /// `true` when no chunk matched.
    #[inline] pub fn is_empty(&self) -> bool { self.items.is_empty() }

    /// Items owned by `worker`, in processing order.
    pub fn for_worker(&self, worker: usize) -> impl Iterator<Item = &WorkItem> + '_ {
        self.items.iter().filter(move |item| item.worker == worker)
    }
}

pub(crate) fn plan(archetypes: &[Archetype], order: &[ArchetypeId], worker_count: usize) -> WorkAssignment {
    let mut items = Vec::new();
    let mut wanted = order.iter().copied().peekable();
    for archetype in archetypes.iter() {
        if wanted.peek() != Some(&archetype.id()) {
            continue;
        }
        wanted.next();
        for (chunk, _) in archetype.chunks().iter().enumerate().filter(|(_, c)| !c.is_empty()) {
            let index = items.len();
            items.push(WorkItem {
                index,
                archetype: archetype.id(),
                chunk: chunk as ChunkIndex,
                worker: assign_worker(index, worker_count),
            });
        }
    }
    WorkAssignment { worker_count, items }
}

type Bucket<'a> = Vec<(WorkItem, &'a mut Chunk)>;

/// Splits the matched chunks into one disjoint bucket per worker.
///
/// `order` must be ascending, as produced by the query cache.
pub(crate) fn distribute<'a>(
    archetypes: &'a mut [Archetype],
    order: &[ArchetypeId],
    worker_count: usize,
) -> Vec<Bucket<'a>> {
    let mut buckets: Vec<Bucket<'a>> = (0..worker_count).map(|_| Vec::new()).collect();
    let mut next = 0usize;
    let mut wanted = order.iter().copied().peekable();
    for archetype in archetypes.iter_mut() {
        let archetype_id = archetype.id();
        if wanted.peek() != Some(&archetype_id) {
            continue;
        }
        wanted.next();
        for (chunk_index, chunk) in archetype.chunks_mut().iter_mut().enumerate() {
            if chunk.is_empty() {
                continue;
            }
            let worker = assign_worker(next, worker_count);
            let item = WorkItem { index: next, archetype: archetype_id, chunk: chunk_index as ChunkIndex, worker };
            buckets[worker].push((item, chunk));
            next += 1;
        }
    }
    buckets
}

struct WorkerJob<'a, P, R> {
    worker: WorkerIndex,
    items: Bucket<'a>,
    commands: &'a mut CommandBuffer,
    reduction: &'a mut R,
    processor: P,
}

impl<'a, P, R> WorkerJob<'a, P, R>
where
    P: ReducingChunkProcessor<R>,
{
    fn run(self, registry: &'a ComponentRegistry, tick: Tick) -> EcsResult<()> {
        let WorkerJob { worker, items, commands, reduction, mut processor } = self;
        let _span = tracing::trace_span!("worker", worker, chunks = items.len()).entered();
        let mut context = WorkerContext { worker, tick, commands: EcbWriter::new(commands, registry) };
        for (item, chunk) in items {
            processor.process(ChunkMut::new(chunk, item.chunk_ref()), &mut context, &mut *reduction)?;
        }
        Ok(())
    }
}

/// Runs `processor` over every bucket, one job per worker.
pub(crate) fn execute<P, R>(
    pool: Option<&ThreadPool>,
    registry: &ComponentRegistry,
    buckets: Vec<Bucket<'_>>,
    commands: &mut [CommandBuffer],
    reductions: &mut [R],
    processor: P,
    tick: Tick,
) -> EcsResult<()>
where
    P: ReducingChunkProcessor<R>,
    R: Send,
{
    let jobs: Vec<WorkerJob<'_, P, R>> = buckets
        .into_iter()
        .zip(commands.iter_mut())
        .zip(reductions.iter_mut())
        .enumerate()
        .map(|(worker, ((items, commands), reduction))| WorkerJob {
            worker: worker as WorkerIndex,
            items,
            commands,
            reduction,
            processor: processor.clone(),
        })
        .collect();

    let run = move || {
        jobs.into_par_iter()
            .map(|job| job.run(registry, tick))
            .collect::<Vec<EcsResult<()>>>()
    };
    let results = match pool {
        Some(pool) => pool.install(run),
        None => run(),
    };
    results.into_iter().collect::<EcsResult<Vec<()>>>()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignment_is_round_robin() {
        let workers: Vec<_> = (0..7).map(|i| assign_worker(i, 3)).collect();
        assert_eq!(workers, vec![0, 1, 2, 0, 1, 2, 0]);
    }
}
