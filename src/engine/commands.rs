//! # Entity Command Buffers
//!
//! This module defines the deferred structural-change buffers used while a
//! tick is open.
//!
//! ## Purpose
//! Systems never mutate archetypes directly during a tick. Instead they record
//! creates, destroys, adds and removes into a [`CommandBuffer`], and the world
//! replays every buffer when the tick closes. Parallel workers each record into
//! their own sub-buffer of a [`ParallelCommandBuffer`], so recording never
//! needs a lock.
//!
//! ## Design
//! - Commands are plain data ([`CommandRecord`]) stamped with tick and worker.
//! - Component values are kept out of the records, in one typed
//!   [`PayloadQueue<T>`] per component type; a record stores only the slot.
//! - Entities created by a buffer are referenced through [`PendingEntity`]
//!   placeholders and resolved to real handles during playback.
//! - Capacities are prepared during bootstrap ("warmup"). Reset between ticks
//!   clears lengths but keeps allocations, so a warmed buffer never allocates.
//!
//! ## Capacity policy
//! In strict-determinism mode exceeding a warmed capacity is an error
//! ([`EcsError::CommandCapacityExceeded`]). In relaxed mode the buffer grows
//! and a warning is logged once per tick.
//!
//! ## Playback order
//! Records of one buffer are applied in recording order. The world plays the
//! sequential buffer first, then worker sub-buffers in ascending worker index.
//! Commands whose target is no longer alive are skipped.

use std::any::{type_name, Any};
use std::ops::AddAssign;

use crate::engine::component::{Component, ComponentHandle, ComponentRegistry};
use crate::engine::entity::{Entity, EntityManager};
use crate::engine::error::{EcsError, EcsResult};
use crate::engine::store::ComponentStore;
use crate::engine::structural;
use crate::engine::types::{ComponentTypeId, Tick, WorkerIndex};

/// Factory constructing an empty payload queue for one component type.
pub type PayloadQueueFactory = fn(usize) -> Box<dyn ErasedPayloadQueue>;

/// Typed add-applier captured at registration; takes a queued value and adds it.
pub(crate) type ApplyAddFn = fn(
    &mut ComponentStore,
    &mut EntityManager,
    Entity,
    &mut dyn ErasedPayloadQueue,
    u32,
) -> EcsResult<bool>;

/// Placeholder for an entity created by a command buffer during the current tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PendingEntity {
    worker: WorkerIndex,
    tick: Tick,
    slot: u32,
}

impl PendingEntity {
    /// Buffer that minted the placeholder.
    #[inline] pub fn worker(&self) -> WorkerIndex { self.worker }
    /// Tick the placeholder is valid in.
    #[inline] pub fn tick(&self) -> Tick { self.tick }
    /// Creation index within the minting buffer.
    #[inline] pub fn slot(&self) -> u32 { self.slot }
}

/// Target of a deferred command.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommandTarget {
    /// An entity that existed when the command was recorded.
    Live(Entity),
    /// An entity created earlier in the same buffer.
    Pending(PendingEntity),
}

impl From<Entity> for CommandTarget {
    fn from(entity: Entity) -> Self { CommandTarget::Live(entity) }
}

impl From<PendingEntity> for CommandTarget {
    fn from(pending: PendingEntity) -> Self { CommandTarget::Pending(pending) }
}

/// Recorded structural change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandKind {
    /// Spawn an empty entity.
    Create {
        /// Placeholder later commands may target.
        pending: PendingEntity,
    },
    /// Destroy an entity.
    Destroy {
        /// Entity to destroy.
        target: CommandTarget,
    },
    /// Add or overwrite a component.
    Add {
        /// Receiving entity.
        target: CommandTarget,
        /// Component type of the value.
        component: ComponentTypeId,
        /// Slot of the value in this buffer's payload queue for `component`.
        payload: u32,
    },
    /// Remove a component.
    Remove {
        /// Entity to strip.
        target: CommandTarget,
        /// Component to remove.
        component: ComponentTypeId,
    },
}

/// One entry of a command buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandRecord {
    /// Tick that was open when the command was recorded.
    pub tick: Tick,
    /// Recording buffer. `MAIN_WORKER` marks the sequential buffer, which is
    /// replayed before every worker sub-buffer despite its high value.
    pub worker: WorkerIndex,
    /// What to apply.
    pub kind: CommandKind,
}

/// Counters returned by playback.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlaybackStats {
    /// Entities created from `Create` records.
    pub created: usize,
    /// Destroy/add/remove records that changed the world.
    pub applied: usize,
    /// Records that were no-ops because the target was dead or unaffected.
    pub skipped: usize,
}

impl AddAssign for PlaybackStats {
    fn add_assign(&mut self, other: Self) {
        self.created += other.created;
        self.applied += other.applied;
        self.skipped += other.skipped;
    }
}

/// Object-safe view of a [`PayloadQueue<T>`].
pub trait ErasedPayloadQueue: Any + Send + Sync {
    /// Number of queued values, taken or not.
    fn len(&self) -> usize;

    /// Returns `true` if no values are queued.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Warmed capacity.
    fn limit(&self) -> usize;

    /// Raises the warmed capacity to at least `limit`, allocating now.
    fn reserve_limit(&mut self, limit: usize);

    /// Forgets every queued value, keeping the allocation.
    fn clear(&mut self);

    /// Component type name.
    fn element_type_name(&self) -> &'static str;

    /// Mutable type-erased reference for downcasting.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Per-type store of component values waiting for playback.
pub struct PayloadQueue<T> {
    values: Vec<Option<T>>,
    limit: usize,
}

impl<T> PayloadQueue<T> {
    fn with_limit(limit: usize) -> Self {
        Self { values: Vec::with_capacity(limit), limit }
    }

    fn push(&mut self, value: T) -> u32 {
        self.values.push(Some(value));
        (self.values.len() - 1) as u32
    }

    fn take(&mut self, slot: u32) -> Option<T> {
        self.values.get_mut(slot as usize).and_then(Option::take)
    }
}

impl<T: Component> ErasedPayloadQueue for PayloadQueue<T> {
    fn len(&self) -> usize { self.values.len() }
    fn limit(&self) -> usize { self.limit }

    fn reserve_limit(&mut self, limit: usize) {
        if limit > self.limit {
            self.values.reserve(limit.saturating_sub(self.values.len()));
            self.limit = limit;
        }
    }

    fn clear(&mut self) { self.values.clear(); }
    fn element_type_name(&self) -> &'static str { type_name::<T>() }
    fn as_any_mut(&mut self) -> &mut dyn Any { self }
}

/// Registered as the payload-queue factory for component type `T`.
pub(crate) fn new_payload_queue<T: Component>(limit: usize) -> Box<dyn ErasedPayloadQueue> {
    Box::new(PayloadQueue::<T>::with_limit(limit))
}

/// Registered as the add-applier for component type `T`.
pub(crate) fn apply_payload_add<T: Component>(
    store: &mut ComponentStore,
    entities: &mut EntityManager,
    entity: Entity,
    queue: &mut dyn ErasedPayloadQueue,
    slot: u32,
) -> EcsResult<bool> {
    let name = queue.element_type_name();
    let queue = queue
        .as_any_mut()
        .downcast_mut::<PayloadQueue<T>>()
        .ok_or_else(|| EcsError::Internal(format!("payload queue holds {name}, expected {}", type_name::<T>())))?;
    let value = queue
        .take(slot)
        .ok_or_else(|| EcsError::Internal(format!("payload slot {slot} of {name} already consumed")))?;
    let id = store.registry().id_of::<T>()?;
    structural::add_by_id(store, entities, entity, id, value)
}

type PayloadSlots = Vec<Option<Box<dyn ErasedPayloadQueue>>>;

fn ensure_queue<'q>(
    payloads: &'q mut PayloadSlots,
    registry: &ComponentRegistry,
    id: ComponentTypeId,
) -> EcsResult<&'q mut Box<dyn ErasedPayloadQueue>> {
    let index = id as usize;
    if payloads.len() <= index {
        payloads.resize_with(index + 1, || None);
    }
    let slot = &mut payloads[index];
    if slot.is_none() {
        *slot = Some((registry.info(id)?.payload_factory)(0));
    }
    slot.as_mut()
        .ok_or_else(|| EcsError::Internal(format!("payload queue {id} missing after creation")))
}

/// Single-writer buffer of deferred structural changes.
pub struct CommandBuffer {
    worker: WorkerIndex,
    tick: Tick,
    strict: bool,
    records: Vec<CommandRecord>,
    record_limit: usize,
    payloads: PayloadSlots,
    pending_count: u32,
    resolved: Vec<Entity>,
    grew: bool,
}

impl CommandBuffer {
    /// Creates an empty buffer tagged `worker`.
    ///
    /// With `strict` set, recording past the warmed capacity fails instead of growing.
    pub fn new(worker: WorkerIndex, strict: bool) -> Self {
        Self {
            worker,
            tick: 0,
            strict,
            records: Vec::new(),
            record_limit: 0,
            payloads: Vec::new(),
            pending_count: 0,
            resolved: Vec::new(),
            grew: false,
        }
    }

    /// Worker tag; `MAIN_WORKER` for the sequential buffer.
    #[inline] pub fn worker(&self) -> WorkerIndex { self.worker }
    /// Tick the buffer records for.
    #[inline] pub fn tick(&self) -> Tick { self.tick }
    /// Number of recorded commands.
    #[inline] pub fn len(&self) -> usize { self.records.len() }
    /// `true` when nothing was recorded.
    #[inline] pub fn is_empty(&self) -> bool { self.records.is_empty() }
    /// Recorded commands in recording order.
    #[inline] pub fn records(&self) -> &[CommandRecord] { &self.records }
    /// Warmed record capacity.
    #[inline] pub fn record_limit(&self) -> usize { self.record_limit }

    /// Raises the record capacity to at least `records`.
    pub fn warmup(&mut self, records: usize) {
        if records > self.record_limit {
            self.records.reserve(records.saturating_sub(self.records.len()));
            self.resolved.reserve(records.saturating_sub(self.resolved.len()));
            self.record_limit = records;
        }
    }

    /// Raises the payload capacity of component `id` to at least `payloads`.
    pub fn warmup_component(
        &mut self,
        registry: &ComponentRegistry,
        id: ComponentTypeId,
        payloads: usize,
    ) -> EcsResult<()> {
        ensure_queue(&mut self.payloads, registry, id)?.reserve_limit(payloads);
        Ok(())
    }

    /// Empties the buffer for a new tick, keeping every allocation.
    pub fn reset(&mut self, tick: Tick) {
        self.tick = tick;
        self.records.clear();
        self.resolved.clear();
        self.pending_count = 0;
        self.grew = false;
        for queue in self.payloads.iter_mut().flatten() {
            queue.clear();
        }
    }

    fn overflow(&mut self, kind: &'static str, capacity: usize) -> EcsResult<()> {
        if self.strict {
            return Err(EcsError::CommandCapacityExceeded { worker: self.worker, kind, capacity });
        }
        if !self.grew {
            self.grew = true;
            tracing::warn!(
                worker = self.worker,
                tick = self.tick,
                kind,
                capacity,
                "command buffer grew past its warmed capacity"
            );
        }
        Ok(())
    }

    fn reserve_record(&mut self) -> EcsResult<()> {
        if self.records.len() >= self.record_limit {
            self.overflow("record", self.record_limit)?;
        }
        Ok(())
    }

    fn push(&mut self, kind: CommandKind) {
        self.records.push(CommandRecord { tick: self.tick, worker: self.worker, kind });
    }

    fn check_target(&self, target: CommandTarget) -> EcsResult<CommandTarget> {
        if let CommandTarget::Pending(pending) = target {
            if pending.worker != self.worker || pending.tick != self.tick || pending.slot >= self.pending_count {
                return Err(EcsError::UnknownPendingEntity {
                    worker: pending.worker,
                    tick: pending.tick,
                    slot: pending.slot,
                });
            }
        }
        Ok(target)
    }

    fn push_payload<T: Component>(
        &mut self,
        registry: &ComponentRegistry,
        id: ComponentTypeId,
        value: T,
    ) -> EcsResult<u32> {
        let (length, limit) = {
            let queue = ensure_queue(&mut self.payloads, registry, id)?;
            (queue.len(), queue.limit())
        };
        if length >= limit {
            self.overflow(type_name::<T>(), limit)?;
        }
        let queue = ensure_queue(&mut self.payloads, registry, id)?;
        let queue = queue
            .as_any_mut()
            .downcast_mut::<PayloadQueue<T>>()
            .ok_or_else(|| EcsError::Internal(format!("payload queue {id} is not {}", type_name::<T>())))?;
        Ok(queue.push(value))
    }
}

/// Recording handle over one [`CommandBuffer`].
///
/// Obtained from `World::commands` for the sequential buffer, or from a
/// worker context inside parallel processing.
pub struct EcbWriter<'a> {
    buffer: &'a mut CommandBuffer,
    registry: &'a ComponentRegistry,
}

impl<'a> EcbWriter<'a> {
    pub(crate) fn new(buffer: &'a mut CommandBuffer, registry: &'a ComponentRegistry) -> Self {
        Self { buffer, registry }
    }

    /// Worker that owns the underlying buffer.
    #[inline] pub fn worker(&self) -> WorkerIndex { self.buffer.worker }
    /// Tick being recorded.
    #[inline] pub fn tick(&self) -> Tick { self.buffer.tick }
    /// Number of commands recorded so far.
    #[inline] pub fn len(&self) -> usize { self.buffer.len() }
    /// `true` when nothing was recorded yet.
    #[inline] pub fn is_empty(&self) -> bool { self.buffer.is_empty() }

    /// Records creation of a new entity and returns its placeholder.
    pub fn create(&mut self) -> EcsResult<PendingEntity> {
        self.buffer.reserve_record()?;
        let pending = PendingEntity { worker: self.buffer.worker, tick: self.buffer.tick, slot: self.buffer.pending_count };
        self.buffer.pending_count += 1;
        self.buffer.push(CommandKind::Create { pending });
        Ok(pending)
    }

    /// Records destruction of `target`.
    pub fn destroy(&mut self, target: impl Into<CommandTarget>) -> EcsResult<()> {
        let target = self.buffer.check_target(target.into())?;
        self.buffer.reserve_record()?;
        self.buffer.push(CommandKind::Destroy { target });
        Ok(())
    }

    /// Records adding (or overwriting) `value` on `target`.
    pub fn add<T: Component>(&mut self, target: impl Into<CommandTarget>, value: T) -> EcsResult<()> {
        let id = self.registry.id_of::<T>()?;
        self.add_by_id(target.into(), id, value)
    }

    /// Handle-based variant of [`EcbWriter::add`].
    pub fn add_with_handle<T: Component>(
        &mut self,
        handle: ComponentHandle<T>,
        target: impl Into<CommandTarget>,
        value: T,
    ) -> EcsResult<()> {
        let id = self.registry.check_handle(&handle)?;
        self.add_by_id(target.into(), id, value)
    }

    fn add_by_id<T: Component>(&mut self, target: CommandTarget, id: ComponentTypeId, value: T) -> EcsResult<()> {
        let target = self.buffer.check_target(target)?;
        self.buffer.reserve_record()?;
        let payload = self.buffer.push_payload(self.registry, id, value)?;
        self.buffer.push(CommandKind::Add { target, component: id, payload });
        Ok(())
    }

    /// Records removal of component `T` from `target`.
    pub fn remove<T: Component>(&mut self, target: impl Into<CommandTarget>) -> EcsResult<()> {
        let id = self.registry.id_of::<T>()?;
        self.remove_by_id(target, id)
    }

    /// Records removal of component `id` from `target`.
    pub fn remove_by_id(&mut self, target: impl Into<CommandTarget>, id: ComponentTypeId) -> EcsResult<()> {
        self.registry.info(id)?;
        let target = self.buffer.check_target(target.into())?;
        self.buffer.reserve_record()?;
        self.buffer.push(CommandKind::Remove { target, component: id });
        Ok(())
    }
}

/// One sub-buffer per logical worker.
pub struct ParallelCommandBuffer {
    buffers: Vec<CommandBuffer>,
    tick: Tick,
    strict: bool,
    records_per_worker: usize,
    payloads_per_worker: Vec<(ComponentTypeId, usize)>,
}

impl ParallelCommandBuffer {
    /// Creates an empty set of sub-buffers; `strict` is passed to each.
    pub fn new(strict: bool) -> Self {
        Self { buffers: Vec::new(), tick: 0, strict, records_per_worker: 0, payloads_per_worker: Vec::new() }
    }

    /// Number of sub-buffers.
    #[inline] pub fn worker_count(&self) -> usize { self.buffers.len() }
    /// Tick of the most recent `reset`; sub-buffers added later start on it.
    #[inline] pub fn tick(&self) -> Tick { self.tick }
    /// Sub-buffers in worker order.
    #[inline] pub fn buffers(&self) -> &[CommandBuffer] { &self.buffers }
    #[inline] pub(crate) fn buffers_mut(&mut self) -> &mut [CommandBuffer] { &mut self.buffers }

    /// Prepares `worker_count` sub-buffers of `records_per_worker` records each.
    pub fn warmup(&mut self, registry: &ComponentRegistry, worker_count: usize, records_per_worker: usize) -> EcsResult<()> {
        self.records_per_worker = self.records_per_worker.max(records_per_worker);
        self.grow_to(registry, worker_count)?;
        let records = self.records_per_worker;
        for buffer in self.buffers.iter_mut() {
            buffer.warmup(records);
        }
        Ok(())
    }

    /// Prepares `payloads_per_worker` slots of component `id` in every sub-buffer.
    pub fn warmup_component(
        &mut self,
        registry: &ComponentRegistry,
        id: ComponentTypeId,
        payloads_per_worker: usize,
    ) -> EcsResult<()> {
        match self.payloads_per_worker.iter_mut().find(|(component, _)| *component == id) {
            Some((_, count)) => *count = (*count).max(payloads_per_worker),
            None => self.payloads_per_worker.push((id, payloads_per_worker)),
        }
        for buffer in self.buffers.iter_mut() {
            buffer.warmup_component(registry, id, payloads_per_worker)?;
        }
        Ok(())
    }

    /// Makes sure at least `worker_count` sub-buffers exist.
    ///
    /// ## Errors
    /// In strict mode, `WorkerCountExceedsWarmup` instead of growing.
    pub(crate) fn prepare_workers(&mut self, registry: &ComponentRegistry, worker_count: usize) -> EcsResult<()> {
        if worker_count <= self.buffers.len() {
            return Ok(());
        }
        if self.strict {
            return Err(EcsError::WorkerCountExceedsWarmup { requested: worker_count, warmed: self.buffers.len() });
        }
        tracing::warn!(requested = worker_count, warmed = self.buffers.len(), "adding parallel command buffers mid-tick");
        self.grow_to(registry, worker_count)
    }

    fn grow_to(&mut self, registry: &ComponentRegistry, worker_count: usize) -> EcsResult<()> {
        let tick = self.tick;
        while self.buffers.len() < worker_count {
            let mut buffer = CommandBuffer::new(self.buffers.len() as WorkerIndex, self.strict);
            buffer.warmup(self.records_per_worker);
            for &(id, payloads) in &self.payloads_per_worker {
                buffer.warmup_component(registry, id, payloads)?;
            }
            buffer.reset(tick);
            self.buffers.push(buffer);
        }
        Ok(())
    }

    /// Empties every sub-buffer for `tick`.
    pub fn reset(&mut self, tick: Tick) {
        self.tick = tick;
        for buffer in self.buffers.iter_mut() {
            buffer.reset(tick);
        }
    }
}

fn resolve(resolved: &[Entity], target: CommandTarget) -> EcsResult<Entity> {
    match target {
        CommandTarget::Live(entity) => Ok(entity),
        CommandTarget::Pending(pending) => resolved.get(pending.slot as usize).copied().ok_or(
            EcsError::UnknownPendingEntity { worker: pending.worker, tick: pending.tick, slot: pending.slot },
        ),
    }
}

fn tally(stats: &mut PlaybackStats, applied: bool, record: &CommandRecord) {
    if applied {
        stats.applied += 1;
    } else {
        stats.skipped += 1;
        tracing::trace!(worker = record.worker, tick = record.tick, kind = ?record.kind, "command skipped");
    }
}

/// Applies every record of `buffer` in order.
pub(crate) fn play_back(
    buffer: &mut CommandBuffer,
    store: &mut ComponentStore,
    entities: &mut EntityManager,
) -> EcsResult<PlaybackStats> {
    let mut stats = PlaybackStats::default();
    let CommandBuffer { records, payloads, resolved, .. } = buffer;
    resolved.clear();
    for record in records.iter() {
        match record.kind {
            CommandKind::Create { pending } => {
                let entity = structural::create(store, entities)?;
                debug_assert_eq!(resolved.len(), pending.slot as usize);
                resolved.push(entity);
                stats.created += 1;
            }
            CommandKind::Destroy { target } => {
                let entity = resolve(resolved.as_slice(), target)?;
                tally(&mut stats, structural::destroy(store, entities, entity)?, record);
            }
            CommandKind::Add { target, component, payload } => {
                let entity = resolve(resolved.as_slice(), target)?;
                let queue = payloads
                    .get_mut(component as usize)
                    .and_then(Option::as_mut)
                    .ok_or_else(|| EcsError::Internal(format!("no payload queue for component {component}")))?;
                let apply = store.registry().info(component)?.apply_add;
                tally(&mut stats, apply(store, entities, entity, &mut **queue, payload)?, record);
            }
            CommandKind::Remove { target, component } => {
                let entity = resolve(resolved.as_slice(), target)?;
                tally(&mut stats, structural::remove_by_id(store, entities, entity, component)?, record);
            }
        }
    }
    Ok(stats)
}
