//! Entity handles and the generational allocator.
//!
//! Indices are recycled LIFO; the generation stored per index tells live
//! handles from stale ones.

use std::fmt;

use crate::engine::error::{EcsError, EcsResult};
use crate::engine::types::{ArchetypeId, ChunkIndex, Row};

/// Generational entity handle.
///
/// An entity is alive iff its index is marked alive and its generation equals
/// the generation currently stored for that index. Destroying an entity bumps
/// the stored generation, so every copy of the old handle becomes stale.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct Entity {
    index: u32,
    generation: u32,
}

impl Entity {
    /// A handle that never refers to a live entity.
    pub const PLACEHOLDER: Entity = Entity { index: u32::MAX, generation: u32::MAX };

    #[inline] pub(crate) const fn new(index: u32, generation: u32) -> Self { Self { index, generation } }
    /// Slot index.
    #[inline] pub const fn index(self) -> u32 { self.index }
    /// Generation the slot had when this handle was minted.
    #[inline] pub const fn generation(self) -> u32 { self.generation }
    /// Packs the handle as `generation << 32 | index`.
    #[inline] pub const fn to_bits(self) -> u64 { ((self.generation as u64) << 32) | self.index as u64 }
    /// Inverse of [`Entity::to_bits`].
    #[inline] pub const fn from_bits(bits: u64) -> Self { Self { index: bits as u32, generation: (bits >> 32) as u32 } }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// Where an alive entity's components are stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EntityLocation {
    /// Archetype holding the entity.
    pub archetype: ArchetypeId,
    /// Chunk within that archetype.
    pub chunk: ChunkIndex,
    /// Row within that chunk.
    pub row: Row,
}

/// Generational index allocator plus the entity → location table.
#[derive(Default)]
pub struct EntityManager {
    generations: Vec<u32>,
    alive: Vec<u64>,
    locations: Vec<Option<EntityLocation>>,
    free_store: Vec<u32>,
    alive_count: usize,
}

impl EntityManager {
    /// Creates an empty manager.
    pub fn new() -> Self { Self::default() }

    /// Creates an empty manager with room for `capacity` entities.
    pub fn with_capacity(capacity: usize) -> Self {
        let mut entities = Self::default();
        entities.reserve(capacity);
        entities
    }

    /// Reserves room for `additional` more index slots.
    pub fn reserve(&mut self, additional: usize) {
        self.generations.reserve(additional);
        self.locations.reserve(additional);
        self.alive.reserve((additional + 63) / 64);
    }

    /// Number of alive entities.
    #[inline] pub fn len(&self) -> usize { self.alive_count }
    /// `true` when no entity is alive.
    #[inline] pub fn is_empty(&self) -> bool { self.alive_count == 0 }
    /// Number of index slots ever handed out, dead or alive.
    #[inline] pub fn slot_count(&self) -> usize { self.generations.len() }
    /// Number of retired indices awaiting reuse.
    #[inline] pub fn free_count(&self) -> usize { self.free_store.len() }

    #[inline]
    fn alive_bit(&self, index: usize) -> bool {
        self.alive.get(index / 64).map_or(false, |word| (word >> (index % 64)) & 1 == 1)
    }

    #[inline]
    fn set_alive_bit(&mut self, index: usize, value: bool) {
        let word = index / 64;
        if word >= self.alive.len() {
            self.alive.resize(word + 1, 0);
        }
        if value {
            self.alive[word] |= 1u64 << (index % 64);
        } else {
            self.alive[word] &= !(1u64 << (index % 64));
        }
    }

    /// Allocates a handle, reusing the most recently freed index first.
    ///
    /// The new entity has no location until storage places it.
    pub(crate) fn create_entity(&mut self) -> EcsResult<Entity> {
        let index = match self.free_store.pop() {
            Some(i) => i,
            None => {
                let next = self.generations.len();
                if next >= u32::MAX as usize {
                    return Err(EcsError::EntityCapacity { capacity: next });
                }
                self.generations.push(0);
                self.locations.push(None);
                next as u32
            }
        };
        self.set_alive_bit(index as usize, true);
        self.alive_count += 1;
        Ok(Entity::new(index, self.generations[index as usize]))
    }

    /// Retires `entity`. Returns `false` for stale or dead handles.
    pub(crate) fn finalize_destroy(&mut self, entity: Entity) -> bool {
        if !self.is_alive(entity) {
            return false;
        }
        let index = entity.index() as usize;
        self.generations[index] = self.generations[index].wrapping_add(1);
        self.locations[index] = None;
        self.set_alive_bit(index, false);
        self.free_store.push(entity.index());
        self.alive_count -= 1;
        true
    }

    /// `true` iff `entity` is alive and its generation is current.
    pub fn is_alive(&self, entity: Entity) -> bool {
        let index = entity.index() as usize;
        index < self.generations.len()
            && self.alive_bit(index)
            && self.generations[index] == entity.generation()
    }

    /// Storage location of an alive entity; `None` for stale handles.
    pub fn location(&self, entity: Entity) -> Option<EntityLocation> {
        if self.is_alive(entity) {
            self.locations[entity.index() as usize]
        } else {
            None
        }
    }

    pub(crate) fn set_location(&mut self, entity: Entity, location: EntityLocation) {
        debug_assert!(
            self.is_alive(entity),
            "set_location was called on a dead or stale entity. Entity: {:?}, Location: {:?}",
            entity, location
        );
        if let Some(slot) = self.locations.get_mut(entity.index() as usize) {
            *slot = Some(location);
        }
    }

    /// Alive entities in index order.
    pub fn iter_alive(&self) -> impl Iterator<Item = Entity> + '_ {
        self.generations
            .iter()
            .enumerate()
            .filter(|(index, _)| self.alive_bit(*index))
            .map(|(index, &generation)| Entity::new(index as u32, generation))
    }
}
