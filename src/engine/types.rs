//! Core ECS Types, Identifiers, and Bit-Level Layouts
//!
//! This module defines the **fundamental identifiers, capacity constants and
//! signatures** shared by every other part of the runtime: the entity table,
//! archetype storage, the query engine, the command buffers and the parallel
//! executor.
//!
//! ## Design Philosophy
//!
//! - **Dense storage**: every identifier is a small integer used as an index.
//! - **Bitset-based signatures**: component sets are fixed-size `u64` arrays.
//! - **World-local identity**: component ids are only meaningful inside the
//!   [`WorldId`] that assigned them.
//!
//! ## Archetypes and Components
//!
//! Components are identified by compact [`ComponentTypeId`] values. Archetypes
//! are keyed by a [`Signature`] indicating which components they contain.
//! Signatures:
//!
//! - are fixed-size arrays of `u64`,
//! - support fast subset and disjointness tests,
//! - iterate their set bits in ascending id order,
//! - are used for both archetype identity and query matching.

use std::sync::atomic::{AtomicU64, Ordering};

/// Dense identifier for a registered component type (world-local).
pub type ComponentTypeId = u16;
/// Identifier for an archetype; equals its creation index.
pub type ArchetypeId = u32;
/// Chunk index within an archetype.
pub type ChunkIndex = u32;
/// Row index within a chunk.
pub type Row = u32;
/// Logical worker index used by parallel processing and command buffers.
pub type WorkerIndex = u16;
/// Simulation tick counter.
pub type Tick = u64;
/// Monotonic counter bumped by every structural change.
pub type StructuralVersion = u64;

/// Maximum number of component types a single world can register.
pub const COMPONENT_CAP: usize = 256;
/// Number of `u64` words required to represent a full component signature.
pub const SIGNATURE_SIZE: usize = (COMPONENT_CAP + 63) / 64;

/// Default number of entity slots per chunk.
pub const DEFAULT_CHUNK_CAPACITY: usize = 128;

/// Archetype holding entities that carry no components. Always id `0`.
pub const EMPTY_ARCHETYPE: ArchetypeId = 0;

/// Worker index stamped on records of the sequential (non-parallel) command buffer.
///
/// This is a tag, not a position: the sequential buffer is replayed *before*
/// worker `0`, so sorting records by worker index does not reproduce
/// playback order.
pub const MAIN_WORKER: WorkerIndex = WorkerIndex::MAX;

/// Largest worker count accepted by the parallel executor.
pub const MAX_WORKERS: usize = MAIN_WORKER as usize;

const _: () = assert!(COMPONENT_CAP <= ComponentTypeId::MAX as usize + 1);
const _: () = assert!(SIGNATURE_SIZE * 64 >= COMPONENT_CAP);

static NEXT_WORLD_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a `World` instance.
///
/// Component ids, handles and query caches are stamped with the world that
/// produced them so they cannot silently be reused against another world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorldId(u64);

impl WorldId {
    /// Allocates a fresh, never reused identifier.
    pub(crate) fn next() -> Self {
        Self(NEXT_WORLD_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Bitset representing a set of component types.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Signature {
    /// Packed component bitset.
    pub components: [u64; SIGNATURE_SIZE],
}

impl Signature {
    /// The empty signature.
    pub const EMPTY: Signature = Signature { components: [0u64; SIGNATURE_SIZE] };

    /// Sets the bit corresponding to `component_id`.
    #[inline]
    pub fn set(&mut self, component_id: ComponentTypeId) {
        let index = (component_id as usize) / 64;
        let bits = (component_id as usize) % 64;
        self.components[index] |= 1u64 << bits;
    }

    /// Clears the bit corresponding to `component_id`.
    #[inline]
    pub fn clear(&mut self, component_id: ComponentTypeId) {
        let index = (component_id as usize) / 64;
        let bits = (component_id as usize) % 64;
        self.components[index] &= !(1u64 << bits);
    }

    /// Returns a copy with `component_id` added.
    #[inline]
    pub fn with(mut self, component_id: ComponentTypeId) -> Self {
        self.set(component_id);
        self
    }

    /// Returns a copy with `component_id` removed.
    #[inline]
    pub fn without(mut self, component_id: ComponentTypeId) -> Self {
        self.clear(component_id);
        self
    }

    /// Returns `true` if `component_id` is present in this signature.
    #[inline]
    pub fn has(&self, component_id: ComponentTypeId) -> bool {
        let index = (component_id as usize) / 64;
        let bits = (component_id as usize) % 64;
        (self.components[index] >> bits) & 1 == 1
    }

    /// Returns `true` if all components in `signature` are present.
    #[inline]
    pub fn contains_all(&self, signature: &Signature) -> bool {
        self.components
            .iter()
            .zip(signature.components.iter())
            .all(|(a, b)| (a & b) == *b)
    }

    /// Returns `true` if no component of `signature` is present.
    #[inline]
    pub fn is_disjoint(&self, signature: &Signature) -> bool {
        self.components
            .iter()
            .zip(signature.components.iter())
            .all(|(a, b)| (a & b) == 0)
    }

    /// Returns `true` if no bits are set.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.components.iter().all(|&word| word == 0)
    }

    /// Number of component types in the set.
    #[inline]
    pub fn len(&self) -> usize {
        self.components.iter().map(|word| word.count_ones() as usize).sum()
    }

    /// Iterates over all component ids set in this signature, ascending.
    pub fn iter(&self) -> impl Iterator<Item = ComponentTypeId> + '_ {
        self.components
            .iter()
            .enumerate()
            .flat_map(|(word_index, &word)| {
                let base = word_index * 64;
                let mut bits = word;
                std::iter::from_fn(move || {
                    if bits == 0 {
                        return None;
                    }
                    let tz = bits.trailing_zeros() as usize;
                    bits &= bits - 1;
                    Some((base + tz) as ComponentTypeId)
                })
            })
    }
}

/// Builds a component signature from a list of component ids.
pub fn build_signature(component_ids: &[ComponentTypeId]) -> Signature {
    let mut signature = Signature::default();
    for &component_id in component_ids {
        signature.set(component_id);
    }
    signature
}
