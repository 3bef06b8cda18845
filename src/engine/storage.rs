//! # Component Column Storage
//!
//! This module defines the dense, typed column type that backs every
//! component inside a chunk, and the object-safe trait through which chunks
//! manipulate columns without knowing their element type.
//!
//! ## Layout
//! A [`Column<T>`] is a `Vec<T>` pre-allocated to the owning chunk's capacity.
//! Row `r` of every column in a chunk belongs to the entity at row `r` of the
//! chunk's entity column, so all columns of a chunk always have equal length.
//!
//! ## Removal
//! Rows are removed according to a [`RemovalPolicy`]:
//! - `SwapBack` moves the last value into the hole (`Vec::swap_remove`).
//! - `Ordered` shifts every later value down (`Vec::remove`).
//!
//! Because every column of a chunk is driven by the same policy and the same
//! row, the columns stay aligned with the entity column.
//!
//! ## Type Erasure
//! [`TypeErasedColumn`] exposes only type-independent operations plus
//! `Any`-based downcasting. Typed access is recovered with
//! [`downcast_column`] / [`downcast_column_mut`].

use std::any::{type_name, Any, TypeId};

use crate::engine::config::RemovalPolicy;
use crate::engine::error::MoveError;

/// Factory constructing an empty column with room for `capacity` rows.
pub type ColumnFactory = fn(usize) -> Box<dyn TypeErasedColumn>;

/// Removes `row` from `values` according to `policy` and returns it.
///
/// ## Panics
/// Panics if `row` is out of bounds; callers check first.

#[inline]
pub(crate) fn take_row<T>(values: &mut Vec<T>, row: usize, policy: RemovalPolicy) -> T {
    match policy {
        RemovalPolicy::SwapBack => values.swap_remove(row),
        RemovalPolicy::Ordered => values.remove(row),
    }
}

/// Dense storage for one component type inside one chunk.
#[derive(Debug)]
pub struct Column<T> {
    values: Vec<T>,
}

impl<T> Column<T> {
    /// Creates an empty column that can hold `capacity` rows without reallocating.
    pub fn with_capacity(capacity: usize) -> Self {
        Self { values: Vec::with_capacity(capacity) }
    }

    /// Number of rows.
    #[inline] pub fn len(&self) -> usize { self.values.len() }
    /// `true` when the column has no rows.
    #[inline] pub fn is_empty(&self) -> bool { self.values.is_empty() }
    /// Rows as a slice.
    #[inline] pub fn as_slice(&self) -> &[T] { &self.values }
    /// Rows as a mutable slice.
    #[inline] pub fn as_mut_slice(&mut self) -> &mut [T] { &mut self.values }
    /// Value at `row`.
    #[inline] pub fn get(&self, row: usize) -> Option<&T> { self.values.get(row) }
    /// Mutable value at `row`.
    #[inline] pub fn get_mut(&mut self, row: usize) -> Option<&mut T> { self.values.get_mut(row) }

    #[inline]
    pub(crate) fn push(&mut self, value: T) {
        self.values.push(value);
    }
}

/// Object-safe interface over a [`Column<T>`] of unknown `T`.
///
/// ## Invariants
/// Implementations must keep `len()` equal to the number of initialized rows
/// and must apply removals exactly as the given [`RemovalPolicy`] describes.

pub trait TypeErasedColumn: Any + Send + Sync {
    /// Number of rows stored.
    fn len(&self) -> usize;

    /// Returns `true` if no rows are stored.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `TypeId` of the element type.
    fn element_type_id(&self) -> TypeId;

    /// Human-readable element type name.
    fn element_type_name(&self) -> &'static str;

    /// Immutable type-erased reference for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Mutable type-erased reference for downcasting.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Drops the value at `row`, closing the gap per `policy`.
    fn remove_row(&mut self, row: usize, policy: RemovalPolicy) -> Result<(), MoveError>;

    /// Moves the value at `row` to the end of `destination`, closing the gap per `policy`.
    ///
    /// ## Errors
    /// `TypeMismatch` if `destination` stores a different type; nothing is moved.
    fn move_row_into(
        &mut self,
        row: usize,
        destination: &mut dyn TypeErasedColumn,
        policy: RemovalPolicy,
    ) -> Result<(), MoveError>;
}

impl<T: Send + Sync + 'static> TypeErasedColumn for Column<T> {
    fn len(&self) -> usize { self.values.len() }
    fn element_type_id(&self) -> TypeId { TypeId::of::<T>() }
    fn element_type_name(&self) -> &'static str { type_name::<T>() }
    fn as_any(&self) -> &dyn Any { self }
    fn as_any_mut(&mut self) -> &mut dyn Any { self }

    fn remove_row(&mut self, row: usize, policy: RemovalPolicy) -> Result<(), MoveError> {
        if row >= self.values.len() {
            return Err(MoveError::RowOutOfBounds { row, len: self.values.len() });
        }
        drop(take_row(&mut self.values, row, policy));
        Ok(())
    }

    fn move_row_into(
        &mut self,
        row: usize,
        destination: &mut dyn TypeErasedColumn,
        policy: RemovalPolicy,
    ) -> Result<(), MoveError> {
        let found = destination.element_type_name();
        let destination = downcast_column_mut::<T>(destination)
            .ok_or(MoveError::TypeMismatch { expected: type_name::<T>(), found })?;
        if row >= self.values.len() {
            return Err(MoveError::RowOutOfBounds { row, len: self.values.len() });
        }
        destination.push(take_row(&mut self.values, row, policy));
        Ok(())
    }
}

/// Registered as the column factory for component type `T`.
pub(crate) fn new_column<T: Send + Sync + 'static>(capacity: usize) -> Box<dyn TypeErasedColumn> {
    Box::new(Column::<T>::with_capacity(capacity))
}

/// Recovers the typed column behind a type-erased one.
#[inline]
pub fn downcast_column<T: 'static>(column: &dyn TypeErasedColumn) -> Option<&Column<T>> {
    column.as_any().downcast_ref::<Column<T>>()
}

/// Mutable variant of [`downcast_column`].
#[inline]
pub fn downcast_column_mut<T: 'static>(column: &mut dyn TypeErasedColumn) -> Option<&mut Column<T>> {
    column.as_any_mut().downcast_mut::<Column<T>>()
}
