//! Structural changes: the only code paths that create or destroy entities
//! or move them between archetypes.
//!
//! Both the immediate world API and command playback land here, so entity
//! table and storage updates always happen together. The guard functions are
//! checked by the world before any immediate call; playback runs after the
//! tick is closed and skips them.

use crate::engine::component::Component;
use crate::engine::entity::{Entity, EntityManager};
use crate::engine::error::{EcsError, EcsResult};
use crate::engine::store::ComponentStore;
use crate::engine::types::ComponentTypeId;

/// Rejects structural calls while chunks are being iterated.
#[inline]
pub fn assert_not_iterating(iteration_depth: u32) -> EcsResult<()> {
    if iteration_depth > 0 {
        return Err(EcsError::StructuralChangeDuringIteration { depth: iteration_depth });
    }
    Ok(())
}

/// Rejects immediate structural calls while a tick is open.
#[inline]
pub fn assert_not_updating(is_updating: bool) -> EcsResult<()> {
    if is_updating {
        return Err(EcsError::StructuralChangeDuringTick);
    }
    Ok(())
}

/// Allocates an entity and places it in the empty archetype.
pub(crate) fn create(store: &mut ComponentStore, entities: &mut EntityManager) -> EcsResult<Entity> {
    let entity = entities.create_entity()?;
    if let Err(error) = store.place_in_empty_archetype(entities, entity) {
        entities.finalize_destroy(entity);
        return Err(error);
    }
    Ok(entity)
}

/// Destroys `entity`. Returns `Ok(false)` if it is already dead.
pub(crate) fn destroy(store: &mut ComponentStore, entities: &mut EntityManager, entity: Entity) -> EcsResult<bool> {
    if !entities.is_alive(entity) {
        return Ok(false);
    }
    store.remove_from_storage(entities, entity)?;
    entities.finalize_destroy(entity);
    Ok(true)
}

/// Adds or overwrites `T` on `entity`. Returns `Ok(false)` if it is dead.
pub(crate) fn add<T: Component>(
    store: &mut ComponentStore,
    entities: &mut EntityManager,
    entity: Entity,
    value: T,
) -> EcsResult<bool> {
    let id = store.registry().id_of::<T>()?;
    add_by_id(store, entities, entity, id, value)
}

pub(crate) fn add_by_id<T: Component>(
    store: &mut ComponentStore,
    entities: &mut EntityManager,
    entity: Entity,
    id: ComponentTypeId,
    value: T,
) -> EcsResult<bool> {
    store.add_by_id(entities, entity, id, value)
}

/// Removes component `id` from `entity`. Returns `Ok(false)` if nothing changed.
pub(crate) fn remove_by_id(
    store: &mut ComponentStore,
    entities: &mut EntityManager,
    entity: Entity,
    id: ComponentTypeId,
) -> EcsResult<bool> {
    store.remove_by_id(entities, entity, id)
}
