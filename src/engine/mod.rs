//! # Engine Module
//!
//! ECS engine implementation.
//!
//! Leaf to root:
//! - core types, errors, configuration and time,
//! - entity allocation and component registration,
//! - columns, chunks, archetypes and the component store,
//! - structural changes and deferred command buffers,
//! - queries, parallel chunk processing and reductions,
//! - the world facade, systems and the scheduler.
//!
//! Public API exposure is controlled by `lib.rs`.

pub mod types;
pub mod error;
pub mod config;
pub mod time;
pub mod entity;
pub mod component;
pub mod storage;
pub mod chunk;
pub mod archetype;
pub mod store;
pub mod structural;
pub mod query;
pub mod commands;
pub mod parallel;
pub mod reduce;
pub mod world;
pub mod systems;
pub mod scheduler;
