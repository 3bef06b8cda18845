//! Deterministic simulation time versus variable presentation time.
//!
//! Simulation code must only ever consume [`WorldTime::tick`] and
//! [`WorldTime::tick_delta`]. The presentation delta is recorded for
//! consumers outside the simulation (interpolation, rendering) and never
//! feeds back into it.

use crate::engine::types::Tick;

/// Read-only time snapshot exposed by `World::time`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WorldTime {
    tick: Tick,
    tick_delta: f64,
    presentation_delta_time: f64,
    simulation_hz: u32,
}

impl WorldTime {
    pub(crate) fn new(simulation_hz: u32) -> Self {
        Self {
            tick: 0,
            tick_delta: 1.0 / f64::from(simulation_hz),
            presentation_delta_time: 0.0,
            simulation_hz,
        }
    }

    pub(crate) fn set_tick(&mut self, tick: Tick) {
        self.tick = tick;
    }

    pub(crate) fn set_presentation_delta(&mut self, seconds: f64) {
        self.presentation_delta_time = seconds;
    }

    /// Tick most recently opened by `begin_tick`.
    #[inline]
    pub fn tick(&self) -> Tick {
        self.tick
    }

    /// Fixed simulation step in seconds (`1 / simulation_hz`).
    #[inline]
    pub fn tick_delta(&self) -> f64 {
        self.tick_delta
    }

    /// Wall-clock frame delta reported by the presentation layer.
    #[inline]
    pub fn presentation_delta_time(&self) -> f64 {
        self.presentation_delta_time
    }

    /// Fixed simulation rate.
    #[inline]
    pub fn simulation_hz(&self) -> u32 {
        self.simulation_hz
    }

    /// Simulated seconds elapsed at the current tick.
    #[inline]
    pub fn elapsed(&self) -> f64 {
        self.tick as f64 * self.tick_delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_delta_is_reciprocal_of_rate() {
        let mut time = WorldTime::new(50);
        assert_eq!(time.tick_delta(), 0.02);
        time.set_tick(100);
        time.set_presentation_delta(0.016);
        assert_eq!(time.tick(), 100);
        assert!((time.elapsed() - 2.0).abs() < 1e-12);
        assert_eq!(time.presentation_delta_time(), 0.016);
    }
}
