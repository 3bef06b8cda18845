//! System abstractions.
//!
//! A **system** is a unit of simulation logic run once per tick against the
//! world. Systems:
//! - read and write component data directly,
//! - record structural changes through the world's command buffers,
//! - run strictly in the order they were added to a [`Scheduler`].
//!
//! ## Function-backed systems
//!
//! [`FnSystem`] wraps a closure so most systems need no dedicated type:
//!
//! ```ignore
//! scheduler.add_system(Box::new(FnSystem::new("decay", move |world: &mut World| {
//!     world.for_each_chunk_parallel(&mut decaying, 4, Decay)
//! })));
//!
//! // or, equivalently
//! scheduler.add_fn("decay", move |world: &mut World| {
//!     world.for_each_chunk_parallel(&mut decaying, 4, Decay)
//! });
//! ```
//!
//! [`Scheduler`]: crate::engine::scheduler::Scheduler

use crate::engine::error::EcsResult;
use crate::engine::world::World;

/// A unit of executable logic operating on the world.
pub trait System: Send {
    /// Human-readable name, used in logs and tracing spans.
    fn name(&self) -> &str;

    /// Executes the system for the currently open tick.
    fn run(&mut self, world: &mut World) -> EcsResult<()>;
}

/// A [`System`] backed by a function or closure.
pub struct FnSystem<F>
where
    F: FnMut(&mut World) -> EcsResult<()> + Send,
{
    name: String,
    f: F,
}

impl<F> FnSystem<F>
where
    F: FnMut(&mut World) -> EcsResult<()> + Send,
{
    /// Wraps `f` as a system called `name`.
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self { name: name.into(), f }
    }
}

impl<F> System for FnSystem<F>
where
    F: FnMut(&mut World) -> EcsResult<()> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self, world: &mut World) -> EcsResult<()> {
        (self.f)(world)
    }
}
