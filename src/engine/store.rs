//! # Component Store
//!
//! The store owns the component registry and every archetype, and carries out
//! the low-level half of each structural change: placing entities, removing
//! them, and migrating them between archetypes.
//!
//! ## Migration
//!
//! Adding or removing a component moves the entity to the archetype of its new
//! signature (created on first use). The steps are:
//!
//! 1. resolve or create the destination archetype,
//! 2. reserve a destination chunk per the allocation policy,
//! 3. push any newly added value into the destination chunk,
//! 4. move shared columns and drop columns the destination lacks,
//! 5. fix the locations of entities displaced in the source chunk,
//! 6. bump the structural version.
//!
//! ## Invariants
//! - Archetype `0` always exists and has the empty signature.
//! - Archetype ids equal their index in `archetypes` and are never reused.
//! - Every method that changes which archetype or row an entity occupies
//!   bumps `structural_version` exactly once.
//!
//! Mutating methods are crate-private; the world routes them through the
//! structural-change module so that tick and iteration guards always apply.

use std::any::type_name;
use std::collections::HashMap;
use std::ops::Range;

use crate::engine::archetype::{get_archetype_pair_mut, Archetype};
use crate::engine::chunk::{Chunk, ChunkRef};
use crate::engine::component::{Component, ComponentRegistry};
use crate::engine::config::{AllocationPolicy, RemovalPolicy, WorldConfig};
use crate::engine::entity::{Entity, EntityLocation, EntityManager};
use crate::engine::error::{EcsError, EcsResult, MoveError};
use crate::engine::types::{
    ArchetypeId, ChunkIndex, ComponentTypeId, Row, Signature, StructuralVersion, WorldId,
    EMPTY_ARCHETYPE,
};

/// Archetypes, chunks and the component registry of one world.
pub struct ComponentStore {
    registry: ComponentRegistry,
    archetypes: Vec<Archetype>,
    signature_map: HashMap<Signature, ArchetypeId>,
    structural_version: StructuralVersion,
    chunk_capacity: usize,
    removal_policy: RemovalPolicy,
    allocation_policy: AllocationPolicy,
}

impl ComponentStore {
    pub(crate) fn new(world: WorldId, config: &WorldConfig) -> EcsResult<Self> {
        let mut store = Self {
            registry: ComponentRegistry::new(world),
            archetypes: Vec::new(),
            signature_map: HashMap::new(),
            structural_version: 0,
            chunk_capacity: config.chunk_capacity,
            removal_policy: config.removal_policy,
            allocation_policy: config.allocation_policy,
        };
        let empty = store.get_or_create_archetype(Signature::EMPTY)?;
        debug_assert_eq!(empty, EMPTY_ARCHETYPE);
        Ok(store)
    }

    /// World this store belongs to.
    #[inline] pub fn world(&self) -> WorldId { self.registry.world() }
    /// Component registry.
    #[inline] pub fn registry(&self) -> &ComponentRegistry { &self.registry }
    #[inline] pub(crate) fn registry_mut(&mut self) -> &mut ComponentRegistry { &mut self.registry }
    /// Counter bumped on every archetype or chunk layout change.
    #[inline] pub fn structural_version(&self) -> StructuralVersion { self.structural_version }
    /// Archetype table indexed by `ArchetypeId`.
    #[inline] pub fn archetypes(&self) -> &[Archetype] { &self.archetypes }
    /// Number of archetypes, the empty one included.
    #[inline] pub fn archetype_count(&self) -> usize { self.archetypes.len() }
    /// How rows are removed from chunks.
    #[inline] pub fn removal_policy(&self) -> RemovalPolicy { self.removal_policy }

    /// Archetype with the given id.
    #[inline]
    pub fn archetype(&self, id: ArchetypeId) -> Option<&Archetype> {
        self.archetypes.get(id as usize)
    }

    /// Archetype currently holding `entity`, if it is alive.
    pub fn archetype_of(&self, entities: &EntityManager, entity: Entity) -> Option<ArchetypeId> {
        entities.location(entity).map(|location| location.archetype)
    }

    /// Archetype id for `signature`, if it has been created.
    pub fn find_archetype(&self, signature: &Signature) -> Option<ArchetypeId> {
        self.signature_map.get(signature).copied()
    }

    /// Splits the store into the registry and the archetype table so parallel
    /// workers can hold chunk borrows next to registry lookups.
    pub(crate) fn split_for_parallel(&mut self) -> (&ComponentRegistry, &mut [Archetype]) {
        (&self.registry, &mut self.archetypes)
    }

    #[inline]
    fn bump_version(&mut self) {
        self.structural_version = self.structural_version.wrapping_add(1);
    }

    fn archetype_at(&self, id: ArchetypeId) -> EcsResult<&Archetype> {
        self.archetypes
            .get(id as usize)
            .ok_or_else(|| EcsError::Internal(format!("archetype {id} does not exist")))
    }

    fn archetype_at_mut(&mut self, id: ArchetypeId) -> EcsResult<&mut Archetype> {
        self.archetypes
            .get_mut(id as usize)
            .ok_or_else(|| EcsError::Internal(format!("archetype {id} does not exist")))
    }

    /// Chunk containing `location`.
    pub fn chunk_at(&self, location: EntityLocation) -> EcsResult<&Chunk> {
        self.archetype_at(location.archetype)?
            .chunk(location.chunk)
            .ok_or_else(|| missing_chunk(location.archetype, location.chunk))
    }

    /// Chunk addressed by `reference`.
    pub fn chunk(&self, reference: ChunkRef) -> EcsResult<&Chunk> {
        self.archetype_at(reference.archetype)?
            .chunk(reference.chunk)
            .ok_or_else(|| missing_chunk(reference.archetype, reference.chunk))
    }

    pub(crate) fn chunk_mut(&mut self, reference: ChunkRef) -> EcsResult<&mut Chunk> {
        self.archetype_at_mut(reference.archetype)?
            .chunk_mut(reference.chunk)
            .ok_or_else(|| missing_chunk(reference.archetype, reference.chunk))
    }

    fn chunk_at_mut(&mut self, location: EntityLocation) -> EcsResult<&mut Chunk> {
        self.archetype_at_mut(location.archetype)?
            .chunk_mut(location.chunk)
            .ok_or_else(|| missing_chunk(location.archetype, location.chunk))
    }

    /// Returns the archetype for `signature`, creating it on first use.
    pub(crate) fn get_or_create_archetype(&mut self, signature: Signature) -> EcsResult<ArchetypeId> {
        if let Some(&id) = self.signature_map.get(&signature) {
            return Ok(id);
        }
        let id = self.archetypes.len() as ArchetypeId;
        let archetype = Archetype::new(
            id,
            signature,
            &self.registry,
            self.chunk_capacity,
            self.allocation_policy,
        )?;
        self.archetypes.push(archetype);
        self.signature_map.insert(signature, id);
        tracing::debug!(archetype = id, components = signature.len(), "archetype created");
        Ok(id)
    }

    /// Stores a freshly created entity in the empty archetype.
    pub(crate) fn place_in_empty_archetype(
        &mut self,
        entities: &mut EntityManager,
        entity: Entity,
    ) -> EcsResult<EntityLocation> {
        let archetype = self.archetype_at_mut(EMPTY_ARCHETYPE)?;
        let chunk = archetype.reserve_slot();
        let row = archetype
            .chunk_mut(chunk)
            .ok_or_else(|| missing_chunk(EMPTY_ARCHETYPE, chunk))?
            .push_entity(entity)?;
        archetype.note_added();
        let location = EntityLocation { archetype: EMPTY_ARCHETYPE, chunk, row };
        entities.set_location(entity, location);
        self.bump_version();
        Ok(location)
    }

    /// Drops `entity`'s row and component values. The entity table is untouched.
    pub(crate) fn remove_from_storage(&mut self, entities: &mut EntityManager, entity: Entity) -> EcsResult<()> {
        let location = entities.location(entity).ok_or(EcsError::StaleEntity(entity))?;
        let policy = self.removal_policy;
        let displaced = {
            let archetype = self.archetype_at_mut(location.archetype)?;
            let chunk = archetype
                .chunk_mut(location.chunk)
                .ok_or_else(|| missing_chunk(location.archetype, location.chunk))?;
            let displaced = chunk.remove_row(location.row as usize, policy)?;
            archetype.note_removed();
            displaced
        };
        self.fix_displaced(entities, location.archetype, location.chunk, displaced)?;
        self.bump_version();
        Ok(())
    }

    fn fix_displaced(
        &self,
        entities: &mut EntityManager,
        archetype: ArchetypeId,
        chunk: ChunkIndex,
        rows: Range<usize>,
    ) -> EcsResult<()> {
        let occupants = self
            .archetype_at(archetype)?
            .chunk(chunk)
            .ok_or_else(|| missing_chunk(archetype, chunk))?
            .entities();
        for row in rows {
            let moved = occupants[row];
            entities.set_location(moved, EntityLocation { archetype, chunk, row: row as Row });
        }
        Ok(())
    }

    /// Returns `true` if the alive `entity` carries component `id`.
    pub fn has_id(&self, entities: &EntityManager, entity: Entity, id: ComponentTypeId) -> bool {
        entities
            .location(entity)
            .and_then(|location| self.archetypes.get(location.archetype as usize))
            .map_or(false, |archetype| archetype.has(id))
    }

    /// Shared reference to `entity`'s `T` stored under component `id`.
    pub fn get_by_id<T: Component>(
        &self,
        entities: &EntityManager,
        entity: Entity,
        id: ComponentTypeId,
    ) -> EcsResult<&T> {
        let location = entities.location(entity).ok_or(EcsError::StaleEntity(entity))?;
        self.chunk_at(location)?
            .get::<T>(id, location.row as usize)
            .ok_or(EcsError::ComponentAbsent { entity, name: type_name::<T>() })
    }

    /// Mutable reference to `entity`'s `T` stored under component `id`.
    pub fn get_mut_by_id<T: Component>(
        &mut self,
        entities: &EntityManager,
        entity: Entity,
        id: ComponentTypeId,
    ) -> EcsResult<&mut T> {
        let location = entities.location(entity).ok_or(EcsError::StaleEntity(entity))?;
        self.chunk_at_mut(location)?
            .get_mut::<T>(id, location.row as usize)
            .ok_or(EcsError::ComponentAbsent { entity, name: type_name::<T>() })
    }

    /// Adds or overwrites component `id` on `entity`.
    ///
    /// Overwriting keeps the entity in place and does not bump the structural
    /// version. Returns `Ok(false)` if the entity is not alive.
    pub(crate) fn add_by_id<T: Component>(
        &mut self,
        entities: &mut EntityManager,
        entity: Entity,
        id: ComponentTypeId,
        value: T,
    ) -> EcsResult<bool> {
        let info = self.registry.info(id)?;
        if !info.matches_type::<T>() {
            return Err(MoveError::TypeMismatch { expected: info.name, found: type_name::<T>() }.into());
        }
        let Some(location) = entities.location(entity) else {
            return Ok(false);
        };
        let signature = *self.archetype_at(location.archetype)?.signature();
        if signature.has(id) {
            *self.get_mut_by_id::<T>(entities, entity, id)? = value;
            return Ok(true);
        }
        self.migrate(entities, entity, location, signature.with(id), |chunk| chunk.push_value(id, value))?;
        Ok(true)
    }

    /// Removes component `id` from `entity`.
    ///
    /// Returns `Ok(false)` if the entity is not alive or lacks the component.
    pub(crate) fn remove_by_id(
        &mut self,
        entities: &mut EntityManager,
        entity: Entity,
        id: ComponentTypeId,
    ) -> EcsResult<bool> {
        self.registry.info(id)?;
        let Some(location) = entities.location(entity) else {
            return Ok(false);
        };
        let signature = *self.archetype_at(location.archetype)?.signature();
        if !signature.has(id) {
            return Ok(false);
        }
        self.migrate(entities, entity, location, signature.without(id), |_| Ok(()))?;
        Ok(true)
    }

    fn migrate<F>(
        &mut self,
        entities: &mut EntityManager,
        entity: Entity,
        source: EntityLocation,
        destination_signature: Signature,
        insert: F,
    ) -> EcsResult<EntityLocation>
    where
        F: FnOnce(&mut Chunk) -> Result<(), MoveError>,
    {
        let destination_id = self.get_or_create_archetype(destination_signature)?;
        if destination_id == source.archetype {
            return Err(EcsError::Internal(format!(
                "migration of {entity} targets its own archetype {destination_id}"
            )));
        }
        let policy = self.removal_policy;

        let (destination_chunk, new_row, displaced) = {
            let (source_archetype, destination_archetype) =
                get_archetype_pair_mut(&mut self.archetypes, source.archetype, destination_id);
            let destination_chunk = destination_archetype.reserve_slot();
            let target = destination_archetype
                .chunk_mut(destination_chunk)
                .ok_or_else(|| missing_chunk(destination_id, destination_chunk))?;
            let origin = source_archetype
                .chunk_mut(source.chunk)
                .ok_or_else(|| missing_chunk(source.archetype, source.chunk))?;

            insert(&mut *target)?;
            let (new_row, displaced) = origin.transfer_row(source.row as usize, &mut *target, policy)?;
            target.check_aligned()?;
            origin.check_aligned()?;

            source_archetype.note_removed();
            destination_archetype.note_added();
            (destination_chunk, new_row, displaced)
        };

        let location = EntityLocation { archetype: destination_id, chunk: destination_chunk, row: new_row };
        entities.set_location(entity, location);
        self.fix_displaced(entities, source.archetype, source.chunk, displaced)?;
        self.bump_version();
        Ok(location)
    }
}

fn missing_chunk(archetype: ArchetypeId, chunk: ChunkIndex) -> EcsError {
    EcsError::Internal(format!("chunk {chunk} of archetype {archetype} does not exist"))
}
