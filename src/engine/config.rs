//! World configuration.
//!
//! A [`WorldConfig`] is an explicit value handed to `World::new`. The world
//! keeps its own copy and only exposes it by shared reference, so the layout
//! and determinism policies cannot change once simulation has started.
//!
//! Configurations can be built in code with the `with_*` methods or loaded
//! from TOML:
//!
//! ```
//! use tick_ecs::{WorldConfig, RemovalPolicy};
//!
//! let config = WorldConfig::from_toml_str(r#"
//!     chunk_capacity = 64
//!     removal_policy = "ordered"
//!     simulation_hz = 30
//! "#).unwrap();
//! assert_eq!(config.removal_policy, RemovalPolicy::Ordered);
//! ```

use serde::{Deserialize, Serialize};

use crate::engine::error::{EcsError, EcsResult};
use crate::engine::types::{Row, DEFAULT_CHUNK_CAPACITY, MAX_WORKERS};

/// How a chunk closes the gap left by a removed entity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalPolicy {
    /// Move the chunk's last entity into the freed slot. O(1), reorders.
    #[default]
    SwapBack,
    /// Shift every later entity down one slot. O(n), keeps insertion order.
    Ordered,
}

/// Which chunk receives a newly placed entity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationPolicy {
    /// First chunk in index order with a free slot; append a chunk if none.
    #[default]
    ScanFirstFit,
    /// Only the last chunk is considered; earlier holes are never refilled.
    AppendToLast,
}

/// Construction-time configuration of a world.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorldConfig {
    /// Entity slots per chunk.
    pub chunk_capacity: usize,
    /// Gap-closing policy used by every chunk.
    pub removal_policy: RemovalPolicy,
    /// Slot allocation policy used by every archetype.
    pub allocation_policy: AllocationPolicy,
    /// Fixed simulation rate; `tick_delta = 1 / simulation_hz`.
    pub simulation_hz: u32,
    /// When set, command buffers never grow past their warmed capacity.
    pub strict_determinism: bool,
    /// Size of a world-owned worker pool; `None` uses rayon's global pool.
    pub worker_threads: Option<usize>,
    /// Entity table slots reserved up front.
    pub initial_entity_capacity: usize,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            chunk_capacity: DEFAULT_CHUNK_CAPACITY,
            removal_policy: RemovalPolicy::SwapBack,
            allocation_policy: AllocationPolicy::ScanFirstFit,
            simulation_hz: 60,
            strict_determinism: true,
            worker_threads: None,
            initial_entity_capacity: 0,
        }
    }
}

impl WorldConfig {
    /// Sets the chunk capacity.
    pub fn with_chunk_capacity(mut self, chunk_capacity: usize) -> Self {
        self.chunk_capacity = chunk_capacity;
        self
    }

    /// Sets the removal policy.
    pub fn with_removal_policy(mut self, policy: RemovalPolicy) -> Self {
        self.removal_policy = policy;
        self
    }

    /// Sets the allocation policy.
    pub fn with_allocation_policy(mut self, policy: AllocationPolicy) -> Self {
        self.allocation_policy = policy;
        self
    }

    /// Sets the simulation rate in ticks per second.
    pub fn with_simulation_hz(mut self, simulation_hz: u32) -> Self {
        self.simulation_hz = simulation_hz;
        self
    }

    /// Enables or disables strict command-buffer capacity.
    pub fn with_strict_determinism(mut self, strict: bool) -> Self {
        self.strict_determinism = strict;
        self
    }

    /// Gives the world its own pool of `threads` workers.
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = Some(threads);
        self
    }

    /// Reserves entity table slots at construction.
    pub fn with_initial_entity_capacity(mut self, capacity: usize) -> Self {
        self.initial_entity_capacity = capacity;
        self
    }

    /// Checks that every field is usable.
    pub fn validate(&self) -> EcsResult<()> {
        if self.chunk_capacity == 0 || self.chunk_capacity > Row::MAX as usize {
            return Err(EcsError::InvalidConfig(format!(
                "chunk_capacity must be in 1..={}, got {}",
                Row::MAX,
                self.chunk_capacity
            )));
        }
        if self.simulation_hz == 0 {
            return Err(EcsError::InvalidConfig("simulation_hz must be positive".into()));
        }
        if let Some(threads) = self.worker_threads {
            if threads == 0 || threads > MAX_WORKERS {
                return Err(EcsError::InvalidConfig(format!(
                    "worker_threads must be in 1..={MAX_WORKERS}, got {threads}"
                )));
            }
        }
        Ok(())
    }

    /// Parses and validates a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> EcsResult<Self> {
        let config: WorldConfig =
            toml::from_str(text).map_err(|e| EcsError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}
