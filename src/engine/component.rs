//! # Component Registry
//!
//! This module provides the per-world registry that assigns dense
//! `ComponentTypeId` values to Rust component types and records, for each
//! registered type, the type-erased factories the rest of the runtime needs.
//!
//! ## Purpose
//! The registry decouples component type information (`TypeId`, name, size,
//! alignment) from runtime storage, enabling archetypes to store heterogeneous
//! component columns behind `TypeErasedColumn` and command buffers to queue
//! heterogeneous payloads behind `ErasedPayloadQueue`.
//!
//! ## Design
//! - Every `World` owns its own registry; ids are never shared across worlds.
//! - Components are assigned a compact id in `[0, COMPONENT_CAP)` on first
//!   registration, in registration order.
//! - Each entry carries three monomorphized function pointers captured at
//!   registration time: a column factory, a payload-queue factory and a typed
//!   add-applier used by command playback.
//! - The registry can be `freeze()`d to forbid further registrations once
//!   bootstrap is complete.
//!
//! ## Invariants
//! - `by_type` and `infos` always agree: `infos[by_type[t]].type_id == t`.
//! - When frozen, registration of a new type is an error.

use std::{
    any::{type_name, TypeId},
    collections::HashMap,
    fmt,
    hash::{Hash, Hasher},
    marker::PhantomData,
    mem::{align_of, size_of},
};

use crate::engine::commands::{apply_payload_add, new_payload_queue, ApplyAddFn, PayloadQueueFactory};
use crate::engine::error::{EcsError, EcsResult};
use crate::engine::storage::{new_column, ColumnFactory};
use crate::engine::types::{ComponentTypeId, WorldId, COMPONENT_CAP};

/// Marker trait for types that can be stored as components.
///
/// Implemented automatically for every `Send + Sync + 'static` type.
pub trait Component: Send + Sync + 'static {}

impl<T: Send + Sync + 'static> Component for T {}

/// Describes a registered component type.
///
/// ## Fields
/// - `id`: the runtime identifier assigned by the registry.
/// - `name`: the Rust type name (`type_name::<T>()`).
/// - `type_id`, `size`, `align`: layout metadata for diagnostics.
///
/// The factory pointers are crate-internal and drive storage and playback.

#[derive(Clone, Copy)]
pub struct ComponentInfo {
    /// Dense per-world id.
    pub id: ComponentTypeId,
    /// Rust type name, for diagnostics.
    pub name: &'static str,
    /// `TypeId` the id was assigned to.
    pub type_id: TypeId,
    /// `size_of::<T>()`.
    pub size: usize,
    /// `align_of::<T>()`.
    pub align: usize,
    pub(crate) column_factory: ColumnFactory,
    pub(crate) payload_factory: PayloadQueueFactory,
    pub(crate) apply_add: ApplyAddFn,
}

impl ComponentInfo {
    fn of<T: Component>(id: ComponentTypeId) -> Self {
        Self {
            id,
            name: type_name::<T>(),
            type_id: TypeId::of::<T>(),
            size: size_of::<T>(),
            align: align_of::<T>(),
            column_factory: new_column::<T>,
            payload_factory: new_payload_queue::<T>,
            apply_add: apply_payload_add::<T>,
        }
    }

    /// Returns `true` if this descriptor refers to type `T`.
    #[inline]
    pub fn matches_type<T: 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }
}

impl fmt::Debug for ComponentInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentInfo")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("size", &self.size)
            .field("align", &self.align)
            .finish()
    }
}

/// Typed, world-stamped component id.
///
/// ## Purpose
/// Lets hot paths skip the `TypeId` hash lookup. The handle remembers the
/// world that minted it; using it against any other world is rejected with
/// `EcsError::ForeignComponentHandle`.

pub struct ComponentHandle<T> {
    id: ComponentTypeId,
    world: WorldId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ComponentHandle<T> {
    /// Component id within the minting world.
    #[inline] pub fn id(&self) -> ComponentTypeId { self.id }
    /// World that minted the handle.
    #[inline] pub fn world(&self) -> WorldId { self.world }
}

impl<T> Clone for ComponentHandle<T> {
    fn clone(&self) -> Self { *self }
}

impl<T> Copy for ComponentHandle<T> {}

impl<T> PartialEq for ComponentHandle<T> {
    fn eq(&self, other: &Self) -> bool { self.id == other.id && self.world == other.world }
}

impl<T> Eq for ComponentHandle<T> {}

impl<T> Hash for ComponentHandle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.world.hash(state);
    }
}

impl<T> fmt::Debug for ComponentHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentHandle")
            .field("type", &type_name::<T>())
            .field("id", &self.id)
            .field("world", &self.world)
            .finish()
    }
}

/// Per-world mapping between Rust component types and `ComponentTypeId`s.
///
/// ## Invariants
/// - Every entry in `by_type` has a matching `infos[id]`.
/// - `infos.len() <= COMPONENT_CAP`.

pub struct ComponentRegistry {
    world: WorldId,
    by_type: HashMap<TypeId, ComponentTypeId>,
    infos: Vec<ComponentInfo>,
    frozen: bool,
}

impl ComponentRegistry {
    pub(crate) fn new(world: WorldId) -> Self {
        Self { world, by_type: HashMap::new(), infos: Vec::new(), frozen: false }
    }

    /// World that owns this registry.
    #[inline] pub fn world(&self) -> WorldId { self.world }
    /// Number of registered component types.
    #[inline] pub fn len(&self) -> usize { self.infos.len() }
    /// `true` before the first registration.
    #[inline] pub fn is_empty(&self) -> bool { self.infos.is_empty() }
    /// `true` once the world has frozen the registry.
    #[inline] pub fn is_frozen(&self) -> bool { self.frozen }

    /// Freezes the registry, preventing further component registrations.
    pub fn freeze(&mut self) { self.frozen = true; }

    /// Registers component type `T` and returns its id.
    ///
    /// ## Behavior
    /// - If `T` is already registered, returns the existing id (even when frozen).
    /// - Otherwise allocates the next id and captures `T`'s factories.
    ///
    /// ## Errors
    /// - `RegistryFrozen` if the registry is frozen and `T` is new.
    /// - `ComponentCapacity` if `COMPONENT_CAP` types are already registered.

    pub fn register<T: Component>(&mut self) -> EcsResult<ComponentTypeId> {
        let type_id = TypeId::of::<T>();
        if let Some(&existing) = self.by_type.get(&type_id) {
            return Ok(existing);
        }
        if self.frozen {
            return Err(EcsError::RegistryFrozen { name: type_name::<T>() });
        }
        if self.infos.len() >= COMPONENT_CAP {
            return Err(EcsError::ComponentCapacity { name: type_name::<T>(), capacity: COMPONENT_CAP });
        }
        let id = self.infos.len() as ComponentTypeId;
        self.by_type.insert(type_id, id);
        self.infos.push(ComponentInfo::of::<T>(id));
        tracing::debug!(component = type_name::<T>(), id, "component registered");
        Ok(id)
    }

    /// Registers `T` and returns a typed handle for it.
    pub fn register_handle<T: Component>(&mut self) -> EcsResult<ComponentHandle<T>> {
        let id = self.register::<T>()?;
        Ok(self.make_handle(id))
    }

    /// Returns the id for `T`, if registered.
    #[inline]
    pub fn try_id_of<T: 'static>(&self) -> Option<ComponentTypeId> {
        self.by_type.get(&TypeId::of::<T>()).copied()
    }

    /// Returns the id for `T`.
    ///
    /// ## Errors
    /// `UnregisteredComponent` if `T` was never registered with this world.

    #[inline]
    pub fn id_of<T: 'static>(&self) -> EcsResult<ComponentTypeId> {
        self.try_id_of::<T>()
            .ok_or(EcsError::UnregisteredComponent { name: type_name::<T>() })
    }

    /// Returns a typed handle for an already registered `T`.
    pub fn handle<T: 'static>(&self) -> EcsResult<ComponentHandle<T>> {
        let id = self.id_of::<T>()?;
        Ok(self.make_handle(id))
    }

    /// Descriptor for `id`.
    pub fn info(&self, id: ComponentTypeId) -> EcsResult<&ComponentInfo> {
        self.infos.get(id as usize).ok_or(EcsError::UnregisteredComponentId(id))
    }

    /// All descriptors in id order.
    pub fn infos(&self) -> &[ComponentInfo] {
        &self.infos
    }

    /// Validates that `handle` was minted by this world for type `T`.
    pub fn check_handle<T: 'static>(&self, handle: &ComponentHandle<T>) -> EcsResult<ComponentTypeId> {
        let foreign = EcsError::ForeignComponentHandle { name: type_name::<T>() };
        if handle.world != self.world {
            return Err(foreign);
        }
        match self.infos.get(handle.id as usize) {
            Some(info) if info.matches_type::<T>() => Ok(handle.id),
            _ => Err(foreign),
        }
    }

    fn make_handle<T>(&self, id: ComponentTypeId) -> ComponentHandle<T> {
        ComponentHandle { id, world: self.world, _marker: PhantomData }
    }
}
