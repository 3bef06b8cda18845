//! Error types for the ECS runtime.
//!
//! Every fallible operation returns [`EcsResult`]. The variants of [`EcsError`]
//! fall into a small taxonomy:
//!
//! * **Protocol violations**: structural calls while a tick is open or while
//!   iterating, nested `begin_tick`, `end_tick` without `begin_tick`. These
//!   are programmer errors and are always reported, never ignored.
//! * **Stale handles**: direct accessors report [`EcsError::StaleEntity`];
//!   deferred command playback degrades to a no-op instead.
//! * **Missing registration**: unregistered component types or handles
//!   minted by another world. These indicate an incomplete bootstrap.
//! * **Capacity exhaustion**: exceeding a pre-warmed command buffer in
//!   strict-determinism mode.
//!
//! Archetype migration internals report the narrower [`MoveError`], which
//! converts into [`EcsError::Move`] through `?`.
//!
//! ## Display vs. Debug
//! * `Display` (via `thiserror`) is short, operator-facing phrasing.
//! * `Debug` (derived) retains full structure for diagnostics.

use thiserror::Error;

use crate::engine::entity::Entity;
use crate::engine::types::{ComponentTypeId, Tick, WorkerIndex};

/// Result alias used throughout the crate.
pub type EcsResult<T> = Result<T, EcsError>;

/// Top-level error type of the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EcsError {
    /// An immediate structural call was made while a tick is open.
    #[error("structural change requested while a tick is open; record it through the command buffer")]
    StructuralChangeDuringTick,

    /// A structural call was made while chunks are being iterated.
    #[error("structural change requested during iteration (depth {depth})")]
    StructuralChangeDuringIteration {
        /// Iteration depth at the time of the call.
        depth: u32,
    },

    /// `begin_tick` was called while another tick is still open.
    #[error("begin_tick({requested}) called while tick {current} is still open")]
    NestedTick {
        /// Tick that is currently open.
        current: Tick,
        /// Tick that was requested.
        requested: Tick,
    },

    /// `end_tick` was called without a matching `begin_tick`.
    #[error("end_tick called without a matching begin_tick")]
    EndTickWithoutBegin,

    /// A run of ticks would step past the largest representable tick.
    #[error("running {count} ticks from {first} overflows the tick counter")]
    TickOverflow {
        /// First tick of the run.
        first: Tick,
        /// Number of ticks requested.
        count: u64,
    },

    /// An operation that records deferred commands was used outside a tick.
    #[error("{operation} requires an open tick")]
    NoActiveTick {
        /// Name of the rejected operation.
        operation: &'static str,
    },

    /// Parallel processing was requested with an unusable worker count.
    #[error("invalid worker count {0}")]
    InvalidWorkerCount(usize),

    /// More workers were requested than parallel command buffers were warmed for.
    #[error("worker count {requested} exceeds the {warmed} warmed parallel command buffers")]
    WorkerCountExceedsWarmup {
        /// Requested worker count.
        requested: usize,
        /// Number of sub-buffers prepared during bootstrap.
        warmed: usize,
    },

    /// The entity handle is dead or its generation is stale.
    #[error("stale or dead entity {0}")]
    StaleEntity(Entity),

    /// The entity is alive but does not carry the requested component.
    #[error("entity {entity} has no component {name}")]
    ComponentAbsent {
        /// Entity that was queried.
        entity: Entity,
        /// Rust type name of the missing component.
        name: &'static str,
    },

    /// The component type was never registered with this world.
    #[error("component type {name} is not registered with this world")]
    UnregisteredComponent {
        /// Rust type name of the component.
        name: &'static str,
    },

    /// The component id does not belong to any registered type.
    #[error("component id {0} is not registered with this world")]
    UnregisteredComponentId(ComponentTypeId),

    /// A component handle minted by another world (or for another type) was used.
    #[error("component handle for {name} does not belong to this world")]
    ForeignComponentHandle {
        /// Rust type name of the handle's component.
        name: &'static str,
    },

    /// Registration was attempted after the registry was frozen.
    #[error("component registry is frozen; cannot register {name}")]
    RegistryFrozen {
        /// Rust type name of the rejected component.
        name: &'static str,
    },

    /// The per-world component capacity is exhausted.
    #[error("component capacity {capacity} exhausted while registering {name}")]
    ComponentCapacity {
        /// Rust type name of the rejected component.
        name: &'static str,
        /// Maximum number of component types.
        capacity: usize,
    },

    /// A pre-warmed command buffer capacity was exceeded in strict mode.
    #[error("command buffer of worker {worker} exceeded its warmed {kind} capacity of {capacity}")]
    CommandCapacityExceeded {
        /// Worker whose sub-buffer overflowed (`MAIN_WORKER` for the sequential buffer).
        worker: WorkerIndex,
        /// What overflowed: `"record"` or a component type name.
        kind: &'static str,
        /// Capacity that was exceeded.
        capacity: usize,
    },

    /// A pending entity from another buffer or another tick was referenced.
    #[error("pending entity {slot} (worker {worker}, tick {tick}) is unknown to this command buffer")]
    UnknownPendingEntity {
        /// Worker that minted the pending entity.
        worker: WorkerIndex,
        /// Tick in which it was minted.
        tick: Tick,
        /// Slot within the minting buffer.
        slot: u32,
    },

    /// The entity index space is exhausted.
    #[error("entity capacity exhausted ({capacity} slots)")]
    EntityCapacity {
        /// Number of slots that exist.
        capacity: usize,
    },

    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration text could not be parsed.
    #[error("failed to parse configuration: {0}")]
    ConfigParse(String),

    /// Archetype migration failed.
    #[error(transparent)]
    Move(#[from] MoveError),

    /// An internal invariant was violated; storage may be corrupt.
    #[error("internal invariant violated: {0}")]
    Internal(String),
}

/// Errors that can occur while moving a row between chunks.
///
/// ## Notes
/// These generally indicate violated storage invariants rather than
/// recoverable user-facing failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoveError {
    /// A column's element type differs from the requested type.
    #[error("column type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// Requested element type.
        expected: &'static str,
        /// Actual element type of the column.
        found: &'static str,
    },

    /// No column exists for the component in the target chunk.
    #[error("chunk has no column for component {0}")]
    MissingColumn(ComponentTypeId),

    /// A row index outside the chunk was addressed.
    #[error("row {row} out of bounds (chunk length {len})")]
    RowOutOfBounds {
        /// Requested row.
        row: usize,
        /// Current chunk length.
        len: usize,
    },

    /// The destination chunk has no free slot.
    #[error("destination chunk is full (capacity {0})")]
    ChunkFull(usize),

    /// Columns of a chunk disagree on their length after a move.
    #[error("component {component_id} column holds {found} rows, expected {expected}")]
    RowMisalignment {
        /// Component whose column is misaligned.
        component_id: ComponentTypeId,
        /// Number of entities in the chunk.
        expected: usize,
        /// Number of rows in the column.
        found: usize,
    },
}
