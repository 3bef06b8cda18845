//! # Archetypes
//!
//! An archetype groups every entity that has exactly one component set. It
//! owns an ordered list of [`Chunk`]s and the column factories needed to
//! create new ones.
//!
//! ## Allocation
//!
//! Slot allocation follows the world's [`AllocationPolicy`]:
//!
//! * `ScanFirstFit` returns the first chunk in index order with a free slot,
//!   refilling holes left by removals.
//! * `AppendToLast` only ever considers the last chunk.
//!
//! In both cases a new chunk is appended when no candidate has room. Chunks
//! are never released, so chunk indices stay stable for the lifetime of the
//! world.

use std::sync::Arc;

use crate::engine::chunk::Chunk;
use crate::engine::component::ComponentRegistry;
use crate::engine::config::AllocationPolicy;
use crate::engine::error::EcsResult;
use crate::engine::storage::ColumnFactory;
use crate::engine::types::{ArchetypeId, ChunkIndex, ComponentTypeId, Signature};

/// Storage for every entity with one specific component set.
pub struct Archetype {
    id: ArchetypeId,
    signature: Signature,
    component_ids: Arc<[ComponentTypeId]>,
    factories: Vec<ColumnFactory>,
    chunks: Vec<Chunk>,
    chunk_capacity: usize,
    allocation: AllocationPolicy,
    len: usize,
}

impl Archetype {
    /// Creates an empty archetype for `signature`.
    ///
    /// ## Errors
    /// `UnregisteredComponentId` if the signature names an unknown component.

    pub(crate) fn new(
        id: ArchetypeId,
        signature: Signature,
        registry: &ComponentRegistry,
        chunk_capacity: usize,
        allocation: AllocationPolicy,
    ) -> EcsResult<Self> {
        let ids: Vec<ComponentTypeId> = signature.iter().collect();
        let factories = ids
            .iter()
            .map(|&component| registry.info(component).map(|info| info.column_factory))
            .collect::<EcsResult<Vec<_>>>()?;
        Ok(Self {
            id,
            signature,
            component_ids: Arc::from(ids),
            factories,
            chunks: Vec::new(),
            chunk_capacity,
            allocation,
            len: 0,
        })
    }

    /// Dense id; also the index into the store's archetype table.
    #[inline] pub fn id(&self) -> ArchetypeId { self.id }
    /// Component set of this archetype.
    #[inline] pub fn signature(&self) -> &Signature { &self.signature }
    /// Sorted component ids, one per column.
    #[inline] pub fn component_ids(&self) -> &[ComponentTypeId] { &self.component_ids }
    /// `true` if the archetype stores `component`.
    #[inline] pub fn has(&self, component: ComponentTypeId) -> bool { self.signature.has(component) }
    /// Number of entities stored across all chunks.
    #[inline] pub fn len(&self) -> usize { self.len }
    /// `true` when no chunk holds a row.
    #[inline] pub fn is_empty(&self) -> bool { self.len == 0 }
    /// Number of chunks, including empty ones.
    #[inline] pub fn chunk_count(&self) -> usize { self.chunks.len() }
    /// Chunks in index order.
    #[inline] pub fn chunks(&self) -> &[Chunk] { &self.chunks }

    /// Chunk at `index`, if it exists.
    #[inline]
    pub fn chunk(&self, index: ChunkIndex) -> Option<&Chunk> {
        self.chunks.get(index as usize)
    }

    #[inline]
    pub(crate) fn chunk_mut(&mut self, index: ChunkIndex) -> Option<&mut Chunk> {
        self.chunks.get_mut(index as usize)
    }

    #[inline]
    pub(crate) fn chunks_mut(&mut self) -> &mut [Chunk] {
        &mut self.chunks
    }

    /// Number of chunks holding at least one entity.
    pub fn occupied_chunk_count(&self) -> usize {
        self.chunks.iter().filter(|chunk| !chunk.is_empty()).count()
    }

    /// Picks the chunk that receives the next entity, appending one if needed.
    pub(crate) fn reserve_slot(&mut self) -> ChunkIndex {
        let candidate = match self.allocation {
            AllocationPolicy::ScanFirstFit => self.chunks.iter().position(|chunk| !chunk.is_full()),
            AllocationPolicy::AppendToLast => match self.chunks.last() {
                Some(last) if !last.is_full() => Some(self.chunks.len() - 1),
                _ => None,
            },
        };
        match candidate {
            Some(index) => index as ChunkIndex,
            None => self.push_chunk(),
        }
    }

    fn push_chunk(&mut self) -> ChunkIndex {
        let columns = self.factories.iter().map(|factory| factory(self.chunk_capacity)).collect();
        self.chunks.push(Chunk::new(Arc::clone(&self.component_ids), columns, self.chunk_capacity));
        tracing::trace!(archetype = self.id, chunk = self.chunks.len() - 1, "chunk allocated");
        (self.chunks.len() - 1) as ChunkIndex
    }

    #[inline]
    pub(crate) fn note_added(&mut self) {
        self.len += 1;
    }

    #[inline]
    pub(crate) fn note_removed(&mut self) {
        debug_assert!(self.len > 0);
        self.len -= 1;
    }
}

/// Returns mutable references to two distinct archetypes.
///
/// ## Panics
/// Panics if `a == b` or either index is out of bounds.

pub(crate) fn get_archetype_pair_mut(
    archetypes: &mut [Archetype],
    a: ArchetypeId,
    b: ArchetypeId,
) -> (&mut Archetype, &mut Archetype) {
    let (a, b) = (a as usize, b as usize);
    assert_ne!(a, b, "source and destination archetypes must differ");
    if a < b {
        let (low, high) = archetypes.split_at_mut(b);
        (&mut low[a], &mut high[0])
    } else {
        let (low, high) = archetypes.split_at_mut(a);
        (&mut high[0], &mut low[b])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::entity::Entity;
    use crate::engine::types::{build_signature, WorldId};

    fn archetype(policy: AllocationPolicy) -> Archetype {
        let mut registry = ComponentRegistry::new(WorldId::next());
        let id = registry.register::<u64>().unwrap();
        Archetype::new(1, build_signature(&[id]), &registry, 2, policy).unwrap()
    }

    fn fill(archetype: &mut Archetype, count: u32) {
        for i in 0..count {
            let chunk = archetype.reserve_slot();
            let chunk = archetype.chunk_mut(chunk).unwrap();
            chunk.push_value::<u64>(0, i as u64).unwrap();
            chunk.push_entity(Entity::new(i, 0)).unwrap();
            archetype.note_added();
        }
    }

    #[test]
    fn first_fit_refills_earlier_holes() {
        let mut archetype = archetype(AllocationPolicy::ScanFirstFit);
        fill(&mut archetype, 4);
        assert_eq!(archetype.chunk_count(), 2);
        archetype.chunk_mut(0).unwrap().remove_row(0, Default::default()).unwrap();
        archetype.note_removed();
        assert_eq!(archetype.reserve_slot(), 0);
    }

    #[test]
    fn append_to_last_ignores_earlier_holes() {
        let mut archetype = archetype(AllocationPolicy::AppendToLast);
        fill(&mut archetype, 4);
        archetype.chunk_mut(0).unwrap().remove_row(0, Default::default()).unwrap();
        archetype.note_removed();
        assert_eq!(archetype.reserve_slot(), 2);
        assert_eq!(archetype.chunk_count(), 3);
        assert_eq!(archetype.occupied_chunk_count(), 2);
    }

    #[test]
    fn unknown_components_are_rejected() {
        let registry = ComponentRegistry::new(WorldId::next());
        assert!(Archetype::new(1, build_signature(&[3]), &registry, 8, AllocationPolicy::ScanFirstFit).is_err());
    }
}
