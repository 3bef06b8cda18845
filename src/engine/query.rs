//! Query construction and archetype matching.
//!
//! A [`Query`] is an `all` / `none` pair of component signatures. An
//! archetype matches when its signature contains every `all` component and
//! none of the `none` components.
//!
//! ## Caching
//! Each query carries a cache of matching archetype ids, stamped with the
//! world id and structural version it was built at. Iteration consults the
//! cache first:
//!
//! * on a version match the cached array is returned as-is (an `Arc` clone,
//!   no allocation);
//! * on a mismatch the archetype table is rescanned and the cache replaced.
//!
//! Cached ids are in archetype creation order, which is the order every
//! iteration walks them.
//!
//! ## Example
//! ```
//! # use tick_ecs::{World, WorldConfig};
//! # struct Position; struct Frozen;
//! let mut world = World::new(WorldConfig::default()).unwrap();
//! world.register_component::<Position>().unwrap();
//! world.register_component::<Frozen>().unwrap();
//!
//! let mut moving = world.query().with::<Position>().unwrap().without::<Frozen>().unwrap().build();
//! world.warmup_query(&mut moving);
//! ```

use std::sync::Arc;

use crate::engine::component::{ComponentHandle, ComponentRegistry};
use crate::engine::error::EcsResult;
use crate::engine::store::ComponentStore;
use crate::engine::types::{ArchetypeId, ComponentTypeId, Signature, StructuralVersion, WorldId};

#[derive(Clone, Debug)]
struct ArchetypeCache {
    world: WorldId,
    version: StructuralVersion,
    archetypes: Arc<[ArchetypeId]>,
}

/// Component filter plus a lazily rebuilt archetype cache.
#[derive(Clone, Debug, Default)]
pub struct Query {
    all: Signature,
    none: Signature,
    cache: Option<ArchetypeCache>,
}

impl Query {
    /// Creates a query from explicit required and excluded sets.
    pub fn new(all: Signature, none: Signature) -> Self {
        Self { all, none, cache: None }
    }

    /// Components every match must have.
    #[inline] pub fn all(&self) -> &Signature { &self.all }
    /// Components no match may have.
    #[inline] pub fn none(&self) -> &Signature { &self.none }

    /// Returns `true` if an archetype with `signature` matches.
    #[inline]
    pub fn matches(&self, signature: &Signature) -> bool {
        signature.contains_all(&self.all) && signature.is_disjoint(&self.none)
    }

    /// Structural version the cache was built at, if any.
    pub fn cached_version(&self) -> Option<StructuralVersion> {
        self.cache.as_ref().map(|cache| cache.version)
    }

    /// Returns `true` if the cache is valid for `store`'s current version.
    pub fn is_cache_current(&self, store: &ComponentStore) -> bool {
        self.cache
            .as_ref()
            .map_or(false, |cache| cache.world == store.world() && cache.version == store.structural_version())
    }

    /// Drops the cache; the next iteration rebuilds it.
    pub fn invalidate(&mut self) {
        self.cache = None;
    }

    /// Matching archetype ids in creation order, rebuilding the cache if stale.
    pub fn get_or_build_cache(&mut self, store: &ComponentStore) -> Arc<[ArchetypeId]> {
        if let Some(cache) = &self.cache {
            if cache.world == store.world() && cache.version == store.structural_version() {
                return Arc::clone(&cache.archetypes);
            }
        }
        let archetypes: Arc<[ArchetypeId]> = store
            .archetypes()
            .iter()
            .filter(|archetype| self.matches(archetype.signature()))
            .map(|archetype| archetype.id())
            .collect();
        tracing::debug!(
            version = store.structural_version(),
            matched = archetypes.len(),
            "query cache rebuilt"
        );
        self.cache = Some(ArchetypeCache {
            world: store.world(),
            version: store.structural_version(),
            archetypes: Arc::clone(&archetypes),
        });
        archetypes
    }
}

/// Builder resolving component types to ids through a world's registry.
pub struct QueryBuilder<'w> {
    registry: &'w ComponentRegistry,
    all: Signature,
    none: Signature,
}

impl<'w> QueryBuilder<'w> {
    pub(crate) fn new(registry: &'w ComponentRegistry) -> Self {
        Self { registry, all: Signature::EMPTY, none: Signature::EMPTY }
    }

    /// Requires component `T`.
    pub fn with<T: 'static>(mut self) -> EcsResult<Self> {
        self.all.set(self.registry.id_of::<T>()?);
        Ok(self)
    }

    /// Excludes component `T`.
    pub fn without<T: 'static>(mut self) -> EcsResult<Self> {
        self.none.set(self.registry.id_of::<T>()?);
        Ok(self)
    }

    /// Requires component `id`.
    pub fn with_id(mut self, id: ComponentTypeId) -> EcsResult<Self> {
        self.registry.info(id)?;
        self.all.set(id);
        Ok(self)
    }

    /// Excludes component `id`.
    pub fn without_id(mut self, id: ComponentTypeId) -> EcsResult<Self> {
        self.registry.info(id)?;
        self.none.set(id);
        Ok(self)
    }

    /// Requires the component of `handle`.
    pub fn with_handle<T: 'static>(mut self, handle: ComponentHandle<T>) -> EcsResult<Self> {
        self.all.set(self.registry.check_handle(&handle)?);
        Ok(self)
    }

    /// Finishes the query. The archetype cache is filled on first use.
    pub fn build(self) -> Query {
        Query::new(self.all, self.none)
    }
}
