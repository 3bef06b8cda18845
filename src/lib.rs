//! # tick-ecs
//!
//! Deterministic archetype Entity-Component-System runtime for fixed-step
//! simulations.
//!
//! ## Design Goals
//! - Archetype storage in fixed-capacity structure-of-arrays chunks
//! - Deferred structural changes through per-tick command buffers
//! - Parallel chunk processing with a stable chunk-to-worker assignment
//! - Reproducible results: same inputs and worker count, same world
//!
//! ## Frame shape
//! ```
//! use tick_ecs::prelude::*;
//!
//! #[derive(Clone, Copy)]
//! struct Energy(f32);
//!
//! let mut world = World::new(WorldConfig::default().with_strict_determinism(false))?;
//! world.register_component::<Energy>()?;
//! let mut alive = world.query().with::<Energy>()?.build();
//!
//! world.begin_tick(0)?;
//! let spawned = world.commands()?.create()?;
//! world.commands()?.add(spawned, Energy(1.0))?;
//! world.end_tick()?;
//!
//! let mut total = 0.0;
//! world.for_each_entity(&mut alive, |world, entity| {
//!     total += world.get_ro::<Energy>(entity)?.0;
//!     Ok(())
//! })?;
//! assert_eq!(total, 1.0);
//! # Ok::<(), tick_ecs::EcsError>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::module_inception)]
#![deny(dead_code)]

pub mod engine;

// ─────────────────────────────────────────────────────────────────────────────
// Re-exports (Public API)
// ─────────────────────────────────────────────────────────────────────────────

pub use engine::world::{IterationScope, World};

pub use engine::config::{AllocationPolicy, RemovalPolicy, WorldConfig};
pub use engine::time::WorldTime;

pub use engine::entity::{Entity, EntityLocation, EntityManager};

pub use engine::component::{Component, ComponentHandle, ComponentInfo, ComponentRegistry};

pub use engine::chunk::{Chunk, ChunkMut, ChunkRef, ChunkView};
pub use engine::archetype::Archetype;
pub use engine::store::ComponentStore;

pub use engine::query::{Query, QueryBuilder};

pub use engine::commands::{
    CommandBuffer,
    CommandKind,
    CommandRecord,
    CommandTarget,
    EcbWriter,
    ParallelCommandBuffer,
    PendingEntity,
    PlaybackStats,
};

pub use engine::parallel::{
    ChunkProcessor,
    ReducingChunkProcessor,
    WorkAssignment,
    WorkItem,
    WorkerContext,
};
pub use engine::reduce::{Combine, Count, MinMax, ReductionBuffer, Sum, Welford};

pub use engine::systems::{FnSystem, System};
pub use engine::scheduler::Scheduler;

pub use engine::error::{EcsError, EcsResult, MoveError};

pub use engine::types::{
    ArchetypeId,
    ComponentTypeId,
    Signature,
    StructuralVersion,
    Tick,
    WorkerIndex,
    WorldId,
};

// ─────────────────────────────────────────────────────────────────────────────
// Prelude
// ─────────────────────────────────────────────────────────────────────────────

/// Commonly used ECS types.
///
/// Import with:
/// ```rust
/// use tick_ecs::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        ChunkMut,
        ChunkProcessor,
        ChunkRef,
        ComponentHandle,
        EcsError,
        EcsResult,
        Entity,
        FnSystem,
        Query,
        ReducingChunkProcessor,
        ReductionBuffer,
        Scheduler,
        System,
        WorkerContext,
        World,
        WorldConfig,
    };
}
