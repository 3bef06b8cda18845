//! The world facade.
//!
//! A [`World`] owns the entity table, the component store, the command
//! buffers and the tick state, and is the only public way to reach any of
//! them.
//!
//! ## Tick protocol
//!
//! ```text
//! begin_tick(t) ──► systems read/write components, record structure via ECB ──► end_tick()
//! ```
//!
//! * While a tick is open, immediate structural calls (`create_entity`,
//!   `destroy_entity`, `add`, `remove`) fail with
//!   [`EcsError::StructuralChangeDuringTick`]. Structure is changed through
//!   [`World::commands`] or a worker's command sub-buffer instead.
//! * `end_tick` closes the tick first and then replays the sequential buffer
//!   followed by every worker sub-buffer in ascending worker order.
//!
//! ## Iteration
//!
//! `for_each_chunk` and `for_each_entity` hand the callback `&mut World`, so
//! components can be read and written freely. The iteration depth is raised
//! for the duration of the walk by an [`IterationScope`], which lowers it
//! again on every exit path including unwinding. Any structural call made
//! from inside the callback fails with
//! [`EcsError::StructuralChangeDuringIteration`].

use std::ops::{Deref, DerefMut};

use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::engine::chunk::{ChunkMut, ChunkRef, ChunkView};
use crate::engine::commands::{play_back, CommandBuffer, EcbWriter, ParallelCommandBuffer, PlaybackStats};
use crate::engine::component::{Component, ComponentHandle};
use crate::engine::config::WorldConfig;
use crate::engine::entity::{Entity, EntityManager};
use crate::engine::error::{EcsError, EcsResult};
use crate::engine::parallel::{self, ChunkProcessor, ReducingChunkProcessor, Unreduced, WorkAssignment};
use crate::engine::query::{Query, QueryBuilder};
use crate::engine::reduce::ReductionBuffer;
use crate::engine::store::ComponentStore;
use crate::engine::structural::{self, assert_not_iterating, assert_not_updating};
use crate::engine::time::WorldTime;
use crate::engine::types::{ComponentTypeId, StructuralVersion, Tick, WorldId, MAIN_WORKER, MAX_WORKERS};

/// Entities, components, command buffers and tick state of one simulation.
pub struct World {
    id: WorldId,
    config: WorldConfig,
    entities: EntityManager,
    store: ComponentStore,
    commands: CommandBuffer,
    parallel_commands: ParallelCommandBuffer,
    time: WorldTime,
    current_tick: Tick,
    is_updating: bool,
    iteration_depth: u32,
    current_system_order: u32,
    pool: Option<ThreadPool>,
}

impl World {
    /// Builds a world from a validated copy of `config`.
    ///
    /// ## Errors
    /// `InvalidConfig` if the configuration fails validation or the worker
    /// pool cannot be started.
    pub fn new(config: WorldConfig) -> EcsResult<Self> {
        config.validate()?;
        let id = WorldId::next();

        let pool = match config.worker_threads {
            Some(threads) => Some(
                ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .thread_name(move |index| format!("tick-ecs-{}-worker-{index}", id.get()))
                    .build()
                    .map_err(|e| EcsError::InvalidConfig(format!("failed to start worker pool: {e}")))?,
            ),
            None => None,
        };

        let strict = config.strict_determinism;
        let world = Self {
            id,
            entities: EntityManager::with_capacity(config.initial_entity_capacity),
            store: ComponentStore::new(id, &config)?,
            commands: CommandBuffer::new(MAIN_WORKER, strict),
            parallel_commands: ParallelCommandBuffer::new(strict),
            time: WorldTime::new(config.simulation_hz),
            current_tick: 0,
            is_updating: false,
            iteration_depth: 0,
            current_system_order: 0,
            pool,
            config,
        };

        tracing::info!(
            world = id.get(),
            chunk_capacity = world.config.chunk_capacity,
            removal = ?world.config.removal_policy,
            allocation = ?world.config.allocation_policy,
            strict = strict,
            worker_threads = ?world.config.worker_threads,
            "world created"
        );
        Ok(world)
    }

    /// Process-unique id stamped into component handles.
    #[inline] pub fn id(&self) -> WorldId { self.id }
    /// Configuration the world was built with.
    #[inline] pub fn config(&self) -> &WorldConfig { &self.config }
    /// Entity allocator and location table.
    #[inline] pub fn entities(&self) -> &EntityManager { &self.entities }
    /// Archetype storage.
    #[inline] pub fn store(&self) -> &ComponentStore { &self.store }
    /// Simulation and presentation clocks.
    #[inline] pub fn time(&self) -> &WorldTime { &self.time }
    /// Tick most recently opened.
    #[inline] pub fn current_tick(&self) -> Tick { self.current_tick }
    /// `true` between `begin_tick` and `end_tick`.
    #[inline] pub fn is_updating(&self) -> bool { self.is_updating }
    /// Nesting depth of active chunk or entity iteration.
    #[inline] pub fn iteration_depth(&self) -> u32 { self.iteration_depth }
    /// Ordinal of the running system within the tick; `0` outside systems.
    #[inline] pub fn current_system_order(&self) -> u32 { self.current_system_order }
    /// Number of alive entities.
    #[inline] pub fn entity_count(&self) -> usize { self.entities.len() }
    /// Number of archetypes, the empty one included.
    #[inline] pub fn archetype_count(&self) -> usize { self.store.archetype_count() }
    /// See [`ComponentStore::structural_version`].
    #[inline] pub fn structural_version(&self) -> StructuralVersion { self.store.structural_version() }

    /// Records the variable frame time for presentation consumers.
    pub fn set_presentation_delta(&mut self, seconds: f64) {
        self.time.set_presentation_delta(seconds);
    }

    pub(crate) fn advance_system_order(&mut self) -> u32 {
        self.current_system_order += 1;
        self.current_system_order
    }

    // ── bootstrap ────────────────────────────────────────────────────────────

    /// Registers `T`, returning a handle usable on hot paths. Idempotent.
    pub fn register_component<T: Component>(&mut self) -> EcsResult<ComponentHandle<T>> {
        self.store.registry_mut().register_handle::<T>()
    }

    /// Handle of an already registered component.
    pub fn component_handle<T: Component>(&self) -> EcsResult<ComponentHandle<T>> {
        self.store.registry().handle::<T>()
    }

    /// Rejects any further registration.
    pub fn freeze_components(&mut self) {
        self.store.registry_mut().freeze();
    }

    /// Sizes the sequential command buffer for `records` records per tick.
    pub fn warmup_ecb(&mut self, records: usize) {
        self.commands.warmup(records);
    }

    /// Sizes the sequential command buffer for `payloads` adds of `T` per tick.
    pub fn warmup_ecb_component<T: Component>(&mut self, payloads: usize) -> EcsResult<()> {
        let id = self.store.registry().id_of::<T>()?;
        self.commands.warmup_component(self.store.registry(), id, payloads)
    }

    /// Creates `worker_count` command sub-buffers of `records_per_worker` records.
    pub fn warmup_ecb_parallel(&mut self, worker_count: usize, records_per_worker: usize) -> EcsResult<()> {
        check_worker_count(worker_count)?;
        self.parallel_commands.warmup(self.store.registry(), worker_count, records_per_worker)
    }

    /// Sizes every worker sub-buffer for `payloads_per_worker` adds of `T`.
    pub fn warmup_ecb_parallel_component<T: Component>(&mut self, payloads_per_worker: usize) -> EcsResult<()> {
        let id = self.store.registry().id_of::<T>()?;
        self.parallel_commands.warmup_component(self.store.registry(), id, payloads_per_worker)
    }

    /// Builds the query's archetype cache ahead of the first tick.
    pub fn warmup_query(&mut self, query: &mut Query) {
        query.get_or_build_cache(&self.store);
    }

    /// Sequential command buffer used by [`World::commands`].
    #[inline] pub fn command_buffer(&self) -> &CommandBuffer { &self.commands }
    /// Per-worker sub-buffers used by parallel processing.
    #[inline] pub fn parallel_command_buffer(&self) -> &ParallelCommandBuffer { &self.parallel_commands }

    // ── tick protocol ────────────────────────────────────────────────────────

    /// Opens tick `tick`.
    ///
    /// Resets every command buffer, restarts the system order counter and
    /// publishes `tick` through [`World::time`].
    ///
    /// ## Errors
    /// `NestedTick` if a tick is already open, `StructuralChangeDuringIteration`
    /// when called from an iteration callback.
    pub fn begin_tick(&mut self, tick: Tick) -> EcsResult<()> {
        if self.is_updating {
            return Err(EcsError::NestedTick { current: self.current_tick, requested: tick });
        }
        assert_not_iterating(self.iteration_depth)?;

        self.commands.reset(tick);
        self.parallel_commands.reset(tick);
        self.current_tick = tick;
        self.time.set_tick(tick);
        self.current_system_order = 0;
        self.is_updating = true;

        tracing::debug!(tick, version = self.store.structural_version(), "tick opened");
        Ok(())
    }

    /// Closes the open tick and replays recorded commands.
    ///
    /// The sequential buffer is replayed first, then worker sub-buffers in
    /// ascending worker index, each in record order. Commands aimed at
    /// entities that are no longer alive are skipped.
    ///
    /// ## Errors
    /// `EndTickWithoutBegin` if no tick is open. Playback errors (for example
    /// a frozen registry) are returned as-is; the tick is closed regardless.
    pub fn end_tick(&mut self) -> EcsResult<PlaybackStats> {
        if !self.is_updating {
            return Err(EcsError::EndTickWithoutBegin);
        }
        assert_not_iterating(self.iteration_depth)?;
        self.is_updating = false;

        let mut stats = play_back(&mut self.commands, &mut self.store, &mut self.entities)?;
        for buffer in self.parallel_commands.buffers_mut() {
            stats += play_back(buffer, &mut self.store, &mut self.entities)?;
        }

        tracing::debug!(
            tick = self.current_tick,
            created = stats.created,
            applied = stats.applied,
            skipped = stats.skipped,
            version = self.store.structural_version(),
            "tick closed"
        );
        Ok(stats)
    }

    /// Closes the open tick without replaying anything it recorded.
    pub fn abort_tick(&mut self) -> EcsResult<()> {
        if !self.is_updating {
            return Err(EcsError::EndTickWithoutBegin);
        }
        assert_not_iterating(self.iteration_depth)?;
        let discarded = self.commands.len()
            + self.parallel_commands.buffers().iter().map(CommandBuffer::len).sum::<usize>();
        self.commands.reset(self.current_tick);
        self.parallel_commands.reset(self.current_tick);
        self.is_updating = false;
        tracing::warn!(tick = self.current_tick, discarded, "tick aborted");
        Ok(())
    }

    /// Sequential command writer for the open tick.
    pub fn commands(&mut self) -> EcsResult<EcbWriter<'_>> {
        if !self.is_updating {
            return Err(EcsError::NoActiveTick { operation: "commands" });
        }
        Ok(EcbWriter::new(&mut self.commands, self.store.registry()))
    }

    // ── immediate structural API ─────────────────────────────────────────────

    fn assert_structural_allowed(&self) -> EcsResult<()> {
        assert_not_iterating(self.iteration_depth)?;
        assert_not_updating(self.is_updating)
    }

    /// Creates an entity with no components.
    pub fn create_entity(&mut self) -> EcsResult<Entity> {
        self.assert_structural_allowed()?;
        structural::create(&mut self.store, &mut self.entities)
    }

    /// Destroys `entity`. Returns `Ok(false)` if it was not alive.
    pub fn destroy_entity(&mut self, entity: Entity) -> EcsResult<bool> {
        self.assert_structural_allowed()?;
        structural::destroy(&mut self.store, &mut self.entities, entity)
    }

    /// Adds `value` to `entity`, overwriting an existing `T` in place.
    ///
    /// Returns `Ok(false)` if `entity` is not alive.
    pub fn add<T: Component>(&mut self, entity: Entity, value: T) -> EcsResult<bool> {
        self.assert_structural_allowed()?;
        structural::add(&mut self.store, &mut self.entities, entity, value)
    }

    /// [`World::add`] through a pre-resolved handle.
    pub fn add_by_handle<T: Component>(&mut self, handle: ComponentHandle<T>, entity: Entity, value: T) -> EcsResult<bool> {
        self.assert_structural_allowed()?;
        let id = self.store.registry().check_handle(&handle)?;
        structural::add_by_id(&mut self.store, &mut self.entities, entity, id, value)
    }

    /// Removes `T` from `entity`.
    ///
    /// Returns `Ok(false)` if `entity` is not alive or does not carry `T`.
    pub fn remove<T: Component>(&mut self, entity: Entity) -> EcsResult<bool> {
        self.assert_structural_allowed()?;
        let id = self.store.registry().id_of::<T>()?;
        structural::remove_by_id(&mut self.store, &mut self.entities, entity, id)
    }

    /// [`World::remove`] by component id.
    pub fn remove_by_id(&mut self, entity: Entity, id: ComponentTypeId) -> EcsResult<bool> {
        self.assert_structural_allowed()?;
        structural::remove_by_id(&mut self.store, &mut self.entities, entity, id)
    }

    // ── accessors ────────────────────────────────────────────────────────────

    /// `true` iff `entity` is alive and its generation is current.
    #[inline]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.entities.is_alive(entity)
    }

    /// Returns `true` if `entity` is alive and carries `T`.
    pub fn has<T: Component>(&self, entity: Entity) -> EcsResult<bool> {
        let id = self.store.registry().id_of::<T>()?;
        Ok(self.store.has_id(&self.entities, entity, id))
    }

    /// [`World::has`] through a pre-resolved handle.
    pub fn has_by_handle<T: Component>(&self, handle: ComponentHandle<T>, entity: Entity) -> EcsResult<bool> {
        let id = self.store.registry().check_handle(&handle)?;
        Ok(self.store.has_id(&self.entities, entity, id))
    }

    /// Shared access to `entity`'s `T`.
    ///
    /// ## Errors
    /// `StaleEntity` for a dead handle, `ComponentAbsent` if the entity does
    /// not carry `T`, `UnregisteredComponent` if `T` was never registered.
    pub fn get_ro<T: Component>(&self, entity: Entity) -> EcsResult<&T> {
        let id = self.store.registry().id_of::<T>()?;
        self.store.get_by_id(&self.entities, entity, id)
    }

    /// Mutable access to `entity`'s `T`. Errors as [`World::get_ro`].
    pub fn get_rw<T: Component>(&mut self, entity: Entity) -> EcsResult<&mut T> {
        let id = self.store.registry().id_of::<T>()?;
        self.store.get_mut_by_id(&self.entities, entity, id)
    }

    /// [`World::get_ro`] through a pre-resolved handle.
    pub fn get_ro_by_handle<T: Component>(&self, handle: ComponentHandle<T>, entity: Entity) -> EcsResult<&T> {
        let id = self.store.registry().check_handle(&handle)?;
        self.store.get_by_id(&self.entities, entity, id)
    }

    /// [`World::get_rw`] through a pre-resolved handle.
    pub fn get_rw_by_handle<T: Component>(&mut self, handle: ComponentHandle<T>, entity: Entity) -> EcsResult<&mut T> {
        let id = self.store.registry().check_handle(&handle)?;
        self.store.get_mut_by_id(&self.entities, entity, id)
    }

    // ── queries and iteration ────────────────────────────────────────────────

    /// Starts a query against this world's registry.
    pub fn query(&self) -> QueryBuilder<'_> {
        QueryBuilder::new(self.store.registry())
    }

    /// Read-only view of one chunk.
    ///
    /// ## Errors
    /// `Internal` if `reference` does not address an existing chunk.
    pub fn chunk(&self, reference: ChunkRef) -> EcsResult<ChunkView<'_>> {
        Ok(ChunkView::new(self.store.chunk(reference)?, reference))
    }

    /// Mutable view of one chunk. Errors as [`World::chunk`].
    pub fn chunk_mut(&mut self, reference: ChunkRef) -> EcsResult<ChunkMut<'_>> {
        Ok(ChunkMut::new(self.store.chunk_mut(reference)?, reference))
    }

    /// Calls `f` for every non-empty chunk matching `query`.
    ///
    /// Archetypes are visited in cache order and chunks in index order. The
    /// first error returned by `f` stops the walk and is returned.
    pub fn for_each_chunk<F>(&mut self, query: &mut Query, mut f: F) -> EcsResult<()>
    where
        F: FnMut(&mut World, ChunkRef) -> EcsResult<()>,
    {
        let archetypes = query.get_or_build_cache(&self.store);
        let mut scope = IterationScope::enter(self);
        for &archetype in archetypes.iter() {
            let chunk_count = scope.store.archetype(archetype).map_or(0, |a| a.chunk_count());
            for chunk in 0..chunk_count as u32 {
                let occupied = scope
                    .store
                    .archetype(archetype)
                    .and_then(|a| a.chunk(chunk))
                    .map_or(false, |c| !c.is_empty());
                if occupied {
                    f(&mut *scope, ChunkRef { archetype, chunk })?;
                }
            }
        }
        Ok(())
    }

    /// Calls `f` for every entity matching `query`, in chunk row order.
    pub fn for_each_entity<F>(&mut self, query: &mut Query, mut f: F) -> EcsResult<()>
    where
        F: FnMut(&mut World, Entity) -> EcsResult<()>,
    {
        self.for_each_chunk(query, |world, chunk| {
            let len = world.store.chunk(chunk)?.len();
            for row in 0..len {
                let Some(&entity) = world.store.chunk(chunk)?.entities().get(row) else {
                    break;
                };
                f(&mut *world, entity)?;
            }
            Ok(())
        })
    }

    /// The chunk-to-worker assignment `for_each_chunk_parallel` would use now.
    pub fn plan_parallel_work(&mut self, query: &mut Query, worker_count: usize) -> EcsResult<WorkAssignment> {
        check_worker_count(worker_count)?;
        let archetypes = query.get_or_build_cache(&self.store);
        Ok(parallel::plan(self.store.archetypes(), &archetypes, worker_count))
    }

    /// Runs `processor` over every chunk matching `query` on `worker_count`
    /// logical workers.
    ///
    /// Chunk `i` of the flattened work list goes to worker
    /// `i % worker_count`. Each worker records structure only into its own
    /// command sub-buffer, replayed by `end_tick`. Returns after every worker
    /// has finished.
    ///
    /// ## Errors
    /// * `InvalidWorkerCount` for zero workers or more than `MAX_WORKERS`.
    /// * `NoActiveTick` outside `begin_tick`/`end_tick`.
    /// * `WorkerCountExceedsWarmup` in strict mode when fewer sub-buffers were
    ///   warmed than requested.
    /// * The error of the lowest-indexed failing worker.
    pub fn for_each_chunk_parallel<P>(&mut self, query: &mut Query, worker_count: usize, processor: P) -> EcsResult<()>
    where
        P: ChunkProcessor,
    {
        let mut slots = ReductionBuffer::new(worker_count, || ());
        self.for_each_chunk_parallel_reduce(query, Unreduced(processor), &mut slots)
    }

    /// Parallel variant accumulating into `reductions`, one slot per worker.
    ///
    /// The worker count is `reductions.worker_count()`. Combine the slots with
    /// [`ReductionBuffer::fold`] afterwards for a worker-order merge.
    pub fn for_each_chunk_parallel_reduce<P, R>(
        &mut self,
        query: &mut Query,
        processor: P,
        reductions: &mut ReductionBuffer<R>,
    ) -> EcsResult<()>
    where
        P: ReducingChunkProcessor<R>,
        R: Send,
    {
        let worker_count = reductions.worker_count();
        check_worker_count(worker_count)?;
        if !self.is_updating {
            return Err(EcsError::NoActiveTick { operation: "for_each_chunk_parallel" });
        }

        let archetypes = query.get_or_build_cache(&self.store);
        let tick = self.current_tick;
        let mut scope = IterationScope::enter(self);
        let World { store, parallel_commands, pool, .. } = &mut *scope;

        parallel_commands.prepare_workers(store.registry(), worker_count)?;
        let commands = parallel_commands
            .buffers_mut()
            .get_mut(..worker_count)
            .ok_or_else(|| EcsError::Internal(format!("missing command sub-buffers for {worker_count} workers")))?;

        let (registry, table) = store.split_for_parallel();
        let buckets = parallel::distribute(table, &archetypes, worker_count);
        let chunks: usize = buckets.iter().map(Vec::len).sum();
        let _span = tracing::debug_span!("parallel", workers = worker_count, chunks).entered();

        parallel::execute(pool.as_ref(), registry, buckets, commands, reductions.slots_mut(), processor, tick)
    }
}

fn check_worker_count(worker_count: usize) -> EcsResult<()> {
    if worker_count == 0 || worker_count > MAX_WORKERS {
        return Err(EcsError::InvalidWorkerCount(worker_count));
    }
    Ok(())
}

/// Raises the world's iteration depth for as long as it lives.
///
/// Dereferences to the world, so code inside the scope keeps full access to
/// component data while structural calls are rejected.
pub struct IterationScope<'w> {
    world: &'w mut World,
}

impl<'w> IterationScope<'w> {
    /// Increments the iteration depth until the scope is dropped.
    ///
    /// ```
    /// use tick_ecs::{EcsError, IterationScope, World, WorldConfig};
    ///
    /// let mut world = World::new(WorldConfig::default())?;
    /// {
    ///     let mut scope = IterationScope::enter(&mut world);
    ///     assert_eq!(scope.iteration_depth(), 1);
    ///     assert!(matches!(
    ///         scope.create_entity(),
    ///         Err(EcsError::StructuralChangeDuringIteration { depth: 1 })
    ///     ));
    /// }
    /// assert_eq!(world.iteration_depth(), 0);
    /// assert!(world.create_entity().is_ok());
    /// # Ok::<(), EcsError>(())
    /// ```
    pub fn enter(world: &'w mut World) -> Self {
        world.iteration_depth += 1;
        Self { world }
    }
}

impl Deref for IterationScope<'_> {
    type Target = World;

    fn deref(&self) -> &World {
        self.world
    }
}

impl DerefMut for IterationScope<'_> {
    fn deref_mut(&mut self) -> &mut World {
        self.world
    }
}

impl Drop for IterationScope<'_> {
    fn drop(&mut self) {
        self.world.iteration_depth -= 1;
    }
}
