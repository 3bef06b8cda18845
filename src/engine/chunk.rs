//! # Chunks
//!
//! A chunk is a fixed-capacity block of structure-of-arrays storage holding
//! up to `capacity` entities of a single archetype: one entity column plus one
//! [`Column`](crate::engine::storage::Column) per component of the archetype, sorted by component id.
//!
//! ## Invariants
//! - Every column has exactly `entities.len()` rows.
//! - `entities.len() <= capacity`; columns never reallocate.
//! - Rows `0..len` are occupied; there are no holes.
//!
//! ## Views
//! [`ChunkView`] and [`ChunkMut`] are the borrowed, typed handles handed to
//! iteration callbacks and parallel processors. Columns are looked up by Rust
//! type or by [`ComponentHandle`].

use std::any::TypeId;
use std::ops::Range;
use std::sync::Arc;

use crate::engine::component::ComponentHandle;
use crate::engine::config::RemovalPolicy;
use crate::engine::entity::Entity;
use crate::engine::error::MoveError;
use crate::engine::storage::{downcast_column, downcast_column_mut, take_row, TypeErasedColumn};
use crate::engine::types::{ArchetypeId, ChunkIndex, ComponentTypeId, Row};

/// Stable address of a chunk: archetype id plus chunk index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkRef {
    /// Owning archetype.
    pub archetype: ArchetypeId,
    /// Chunk index within the archetype.
    pub chunk: ChunkIndex,
}

/// Fixed-capacity SoA block of one archetype.
pub struct Chunk {
    component_ids: Arc<[ComponentTypeId]>,
    columns: Vec<Box<dyn TypeErasedColumn>>,
    entities: Vec<Entity>,
    capacity: usize,
}

impl Chunk {
    pub(crate) fn new(
        component_ids: Arc<[ComponentTypeId]>,
        columns: Vec<Box<dyn TypeErasedColumn>>,
        capacity: usize,
    ) -> Self {
        debug_assert_eq!(component_ids.len(), columns.len());
        Self { component_ids, columns, entities: Vec::with_capacity(capacity), capacity }
    }

    /// Number of occupied rows.
    #[inline] pub fn len(&self) -> usize { self.entities.len() }
    /// `true` when no row is occupied.
    #[inline] pub fn is_empty(&self) -> bool { self.entities.is_empty() }
    /// `true` when every slot is occupied.
    #[inline] pub fn is_full(&self) -> bool { self.entities.len() >= self.capacity }
    /// Fixed row capacity.
    #[inline] pub fn capacity(&self) -> usize { self.capacity }
    /// Entities in row order.
    #[inline] pub fn entities(&self) -> &[Entity] { &self.entities }
    /// Sorted component ids, one per column.
    #[inline] pub fn component_ids(&self) -> &[ComponentTypeId] { &self.component_ids }

    #[inline]
    fn column_index(&self, id: ComponentTypeId) -> Option<usize> {
        self.component_ids.binary_search(&id).ok()
    }

    #[inline]
    fn column_index_of_type<T: 'static>(&self) -> Option<usize> {
        let type_id = TypeId::of::<T>();
        self.columns.iter().position(|c| c.element_type_id() == type_id)
    }

    /// Returns `true` if the chunk stores component `id`.
    #[inline]
    pub fn has_component(&self, id: ComponentTypeId) -> bool {
        self.column_index(id).is_some()
    }

    /// Typed column slice for `T`.
    pub fn column<T: 'static>(&self) -> Option<&[T]> {
        let index = self.column_index_of_type::<T>()?;
        downcast_column::<T>(&*self.columns[index]).map(|c| c.as_slice())
    }

    /// Mutable typed column slice for `T`.
    pub fn column_mut<T: 'static>(&mut self) -> Option<&mut [T]> {
        let index = self.column_index_of_type::<T>()?;
        downcast_column_mut::<T>(&mut *self.columns[index]).map(|c| c.as_mut_slice())
    }

    /// Typed column slice for component `id`.
    pub fn column_by_id<T: 'static>(&self, id: ComponentTypeId) -> Option<&[T]> {
        let index = self.column_index(id)?;
        downcast_column::<T>(&*self.columns[index]).map(|c| c.as_slice())
    }

    /// Mutable typed column slice for component `id`.
    pub fn column_by_id_mut<T: 'static>(&mut self, id: ComponentTypeId) -> Option<&mut [T]> {
        let index = self.column_index(id)?;
        downcast_column_mut::<T>(&mut *self.columns[index]).map(|c| c.as_mut_slice())
    }

    /// Two distinct columns, both mutable.
    ///
    /// Returns `None` if either type is missing or `A` and `B` are the same type.
    pub fn column_pair_mut<A: 'static, B: 'static>(&mut self) -> Option<(&mut [A], &mut [B])> {
        let a = self.column_index_of_type::<A>()?;
        let b = self.column_index_of_type::<B>()?;
        if a == b {
            return None;
        }
        let (first, second) = if a < b {
            let (low, high) = self.columns.split_at_mut(b);
            (&mut low[a], &mut high[0])
        } else {
            let (low, high) = self.columns.split_at_mut(a);
            (&mut high[0], &mut low[b])
        };
        let first = downcast_column_mut::<A>(&mut **first)?.as_mut_slice();
        let second = downcast_column_mut::<B>(&mut **second)?.as_mut_slice();
        Some((first, second))
    }

    /// Column `R` for reading alongside column `W` for writing.
    pub fn read_write<R: 'static, W: 'static>(&mut self) -> Option<(&[R], &mut [W])> {
        self.column_pair_mut::<R, W>().map(|(r, w)| (&*r, w))
    }

    pub(crate) fn get<T: 'static>(&self, id: ComponentTypeId, row: usize) -> Option<&T> {
        self.column_by_id::<T>(id)?.get(row)
    }

    pub(crate) fn get_mut<T: 'static>(&mut self, id: ComponentTypeId, row: usize) -> Option<&mut T> {
        self.column_by_id_mut::<T>(id)?.get_mut(row)
    }

    /// Appends `entity` to the entity column. Component columns are filled separately.
    pub(crate) fn push_entity(&mut self, entity: Entity) -> Result<Row, MoveError> {
        if self.is_full() {
            return Err(MoveError::ChunkFull(self.capacity));
        }
        self.entities.push(entity);
        Ok((self.entities.len() - 1) as Row)
    }

    /// Appends `value` to the column of component `id`.
    pub(crate) fn push_value<T: Send + Sync + 'static>(
        &mut self,
        id: ComponentTypeId,
        value: T,
    ) -> Result<(), MoveError> {
        let index = self.column_index(id).ok_or(MoveError::MissingColumn(id))?;
        let column = &mut self.columns[index];
        let found = column.element_type_name();
        downcast_column_mut::<T>(&mut **column)
            .ok_or(MoveError::TypeMismatch { expected: std::any::type_name::<T>(), found })?
            .push(value);
        Ok(())
    }

    /// Rows whose entity changed after removing `row` under `policy`.
    fn displaced_rows(&self, row: usize, policy: RemovalPolicy) -> Range<usize> {
        let len = self.entities.len();
        match policy {
            RemovalPolicy::SwapBack if row < len => row..row + 1,
            RemovalPolicy::SwapBack => row..row,
            RemovalPolicy::Ordered => row..len.max(row),
        }
    }

    /// Drops the entity at `row` and all its component values.
    ///
    /// Returns the rows whose occupant moved, so their locations can be fixed.
    pub(crate) fn remove_row(&mut self, row: usize, policy: RemovalPolicy) -> Result<Range<usize>, MoveError> {
        if row >= self.entities.len() {
            return Err(MoveError::RowOutOfBounds { row, len: self.entities.len() });
        }
        for column in self.columns.iter_mut() {
            column.remove_row(row, policy)?;
        }
        take_row(&mut self.entities, row, policy);
        Ok(self.displaced_rows(row, policy))
    }

    /// Moves the entity at `row` into `destination`.
    ///
    /// Components present in both chunks are moved; components missing from
    /// `destination` are dropped. Components only `destination` has must
    /// already have been pushed by the caller.
    ///
    /// Returns the entity's new row and the displaced rows of `self`.
    pub(crate) fn transfer_row(
        &mut self,
        row: usize,
        destination: &mut Chunk,
        policy: RemovalPolicy,
    ) -> Result<(Row, Range<usize>), MoveError> {
        if row >= self.entities.len() {
            return Err(MoveError::RowOutOfBounds { row, len: self.entities.len() });
        }
        if destination.is_full() {
            return Err(MoveError::ChunkFull(destination.capacity));
        }
        for (index, column) in self.columns.iter_mut().enumerate() {
            match destination.column_index(self.component_ids[index]) {
                Some(target) => column.move_row_into(row, &mut *destination.columns[target], policy)?,
                None => column.remove_row(row, policy)?,
            }
        }
        let entity = take_row(&mut self.entities, row, policy);
        let new_row = destination.push_entity(entity)?;
        Ok((new_row, self.displaced_rows(row, policy)))
    }

    /// Verifies that every column has one row per entity.
    pub(crate) fn check_aligned(&self) -> Result<(), MoveError> {
        let expected = self.entities.len();
        for (index, column) in self.columns.iter().enumerate() {
            if column.len() != expected {
                return Err(MoveError::RowMisalignment {
                    component_id: self.component_ids[index],
                    expected,
                    found: column.len(),
                });
            }
        }
        Ok(())
    }
}

/// Read-only view of one chunk handed to iteration code.
#[derive(Clone, Copy)]
pub struct ChunkView<'a> {
    chunk: &'a Chunk,
    reference: ChunkRef,
}

impl<'a> ChunkView<'a> {
    pub(crate) fn new(chunk: &'a Chunk, reference: ChunkRef) -> Self {
        Self { chunk, reference }
    }

    /// Address of the viewed chunk.
    #[inline] pub fn reference(&self) -> ChunkRef { self.reference }
    /// Number of rows.
    #[inline] pub fn len(&self) -> usize { self.chunk.len() }
    /// `true` when the chunk has no rows.
    #[inline] pub fn is_empty(&self) -> bool { self.chunk.is_empty() }
    /// Entities in row order.
    #[inline] pub fn entities(&self) -> &'a [Entity] { self.chunk.entities() }

    /// Column of `T`, if the archetype has one.
    pub fn column<T: 'static>(&self) -> Option<&'a [T]> {
        self.chunk.column::<T>()
    }

    /// Column addressed by a pre-resolved handle.
    pub fn column_by_handle<T: 'static>(&self, handle: ComponentHandle<T>) -> Option<&'a [T]> {
        self.chunk.column_by_id::<T>(handle.id())
    }
}

/// Mutable view of one chunk handed to iteration code and parallel processors.
pub struct ChunkMut<'a> {
    chunk: &'a mut Chunk,
    reference: ChunkRef,
}

impl<'a> ChunkMut<'a> {
    pub(crate) fn new(chunk: &'a mut Chunk, reference: ChunkRef) -> Self {
        Self { chunk, reference }
    }

    /// Address of the viewed chunk.
    #[inline] pub fn reference(&self) -> ChunkRef { self.reference }
    /// Number of rows.
    #[inline] pub fn len(&self) -> usize { self.chunk.len() }
    /// `true` when the chunk has no rows.
    #[inline] pub fn is_empty(&self) -> bool { self.chunk.is_empty() }
    /// Entities in row order.
    #[inline] pub fn entities(&self) -> &[Entity] { self.chunk.entities() }

    /// Column of `T`, if the archetype has one.
    pub fn column<T: 'static>(&self) -> Option<&[T]> {
        self.chunk.column::<T>()
    }

    /// Mutable column of `T`.
    pub fn column_mut<T: 'static>(&mut self) -> Option<&mut [T]> {
        self.chunk.column_mut::<T>()
    }

    /// Column addressed by a pre-resolved handle.
    pub fn column_by_handle<T: 'static>(&self, handle: ComponentHandle<T>) -> Option<&[T]> {
        self.chunk.column_by_id::<T>(handle.id())
    }

    /// Mutable column addressed by a pre-resolved handle.
    pub fn column_by_handle_mut<T: 'static>(&mut self, handle: ComponentHandle<T>) -> Option<&mut [T]> {
        self.chunk.column_by_id_mut::<T>(handle.id())
    }

    /// Two mutable columns at once.
    ///
    /// `None` if either is missing or `A` and `B` are the same type.
    pub fn column_pair_mut<A: 'static, B: 'static>(&mut self) -> Option<(&mut [A], &mut [B])> {
        self.chunk.column_pair_mut::<A, B>()
    }

    /// Reads `R` while writing `W`; `None` under the same rules as `column_pair_mut`.
    pub fn read_write<R: 'static, W: 'static>(&mut self) -> Option<(&[R], &mut [W])> {
        self.chunk.read_write::<R, W>()
    }
}
