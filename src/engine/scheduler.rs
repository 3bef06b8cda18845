//! Ordered system execution.
//!
//! The scheduler is a sequencer, not a dependency graph: systems run one
//! after another in registration order, inside a single world tick.
//!
//! ## Tick layout
//!
//! ```text
//! begin_tick(t)
//!   system 0   (current_system_order = 1)
//!   system 1   (current_system_order = 2)
//!   ...
//! end_tick()   ECB playback
//! ```
//!
//! ## Failure
//! A system returning an error aborts the tick: the remaining systems are
//! skipped, commands recorded so far are discarded, and the tick is closed
//! before the error is returned. The world is therefore always ready for the
//! next `begin_tick`.

use crate::engine::commands::PlaybackStats;
use crate::engine::error::{EcsError, EcsResult};
use crate::engine::systems::{FnSystem, System};
use crate::engine::types::Tick;
use crate::engine::world::World;

/// Systems in the order they run.
#[derive(Default)]
pub struct Scheduler {
    systems: Vec<Box<dyn System>>,
}

impl Scheduler {
    /// Creates an empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a system; systems run in insertion order.
    pub fn add_system(&mut self, system: Box<dyn System>) -> &mut Self {
        self.systems.push(system);
        self
    }

    /// Adds a closure-backed system.
    pub fn add_fn<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: FnMut(&mut World) -> EcsResult<()> + Send + 'static,
    {
        self.add_system(Box::new(FnSystem::new(name, f)))
    }

    /// Number of systems.
    #[inline] pub fn len(&self) -> usize { self.systems.len() }
    /// `true` when no system was added.
    #[inline] pub fn is_empty(&self) -> bool { self.systems.is_empty() }

    /// System names in execution order.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.systems.iter().map(|system| system.name())
    }

    /// Runs one full tick: `begin_tick`, every system in order, `end_tick`.
    pub fn run_tick(&mut self, world: &mut World, tick: Tick) -> EcsResult<PlaybackStats> {
        world.begin_tick(tick)?;
        for system in self.systems.iter_mut() {
            let order = world.advance_system_order();
            let span = tracing::debug_span!("system", name = system.name(), order, tick);
            let _enter = span.enter();
            if let Err(error) = system.run(world) {
                tracing::error!(system = system.name(), tick, %error, "system failed, aborting tick");
                world.abort_tick()?;
                return Err(error);
            }
        }
        world.end_tick()
    }

    /// Runs `count` consecutive ticks starting at `first`, summing playback
    /// statistics.
    ///
    /// ## Errors
    /// `TickOverflow` if the last tick would not fit in a `Tick`; no tick is run.
    pub fn run_ticks(&mut self, world: &mut World, first: Tick, count: u64) -> EcsResult<PlaybackStats> {
        if count > 0 && first.checked_add(count - 1).is_none() {
            return Err(EcsError::TickOverflow { first, count });
        }
        let mut total = PlaybackStats::default();
        for offset in 0..count {
            total += self.run_tick(world, first + offset)?;
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::WorldConfig;

    #[test]
    fn systems_run_in_registration_order() {
        let mut world = World::new(WorldConfig::default()).unwrap();
        let log = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut scheduler = Scheduler::new();
        for name in ["a", "b", "c"] {
            let log = log.clone();
            scheduler.add_fn(name, move |world: &mut World| {
                log.lock().unwrap().push((name, world.current_system_order()));
                Ok(())
            });
        }
        scheduler.run_tick(&mut world, 0).unwrap();
        assert_eq!(*log.lock().unwrap(), vec![("a", 1), ("b", 2), ("c", 3)]);
        assert_eq!(scheduler.names().collect::<Vec<_>>(), vec!["a", "b", "c"]);
    }

    #[test]
    fn failing_system_closes_the_tick() {
        let mut world = World::new(WorldConfig::default()).unwrap();
        let mut scheduler = Scheduler::new();
        scheduler.add_fn("fails", |_: &mut World| Err(EcsError::Internal("boom".into())));
        assert_eq!(scheduler.run_tick(&mut world, 3), Err(EcsError::Internal("boom".into())));
        assert!(!world.is_updating());
        assert!(scheduler.run_tick(&mut world, 4).is_ok());
    }

    #[test]
    fn run_ticks_reaches_the_last_tick_without_overflow() {
        let mut world = World::new(WorldConfig::default()).unwrap();
        let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut scheduler = Scheduler::new();
        let log = seen.clone();
        scheduler.add_fn("ticks", move |world: &mut World| {
            log.lock().unwrap().push(world.current_tick());
            Ok(())
        });

        scheduler.run_ticks(&mut world, Tick::MAX - 1, 2).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![Tick::MAX - 1, Tick::MAX]);

        assert_eq!(
            scheduler.run_ticks(&mut world, Tick::MAX, 2),
            Err(EcsError::TickOverflow { first: Tick::MAX, count: 2 })
        );
        assert_eq!(seen.lock().unwrap().len(), 2);
        assert!(scheduler.run_ticks(&mut world, Tick::MAX, 0).is_ok());
    }
}
