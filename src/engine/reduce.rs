//! Reduction primitives for parallel chunk processing.
//!
//! This module defines **per-worker accumulator slots** and a small set of
//! plain accumulator types used with
//! [`World::for_each_chunk_parallel_reduce`](crate::World::for_each_chunk_parallel_reduce).
//!
//! ## Execution model
//! A reduction proceeds in two phases:
//!
//! 1. **Parallel accumulation**
//!    * Each worker processes its fixed share of chunks.
//!    * Each worker writes only to its own slot of the [`ReductionBuffer`].
//!
//! 2. **Deterministic combination**
//!    * Slots are merged with [`Combine::combine`] in ascending worker index.
//!    * Because chunk-to-worker assignment is fixed, every slot sees the same
//!      chunks in the same order on every run, so the result is bit-identical
//!      for a given worker count.
//!
//! ## Provided accumulators
//!
//! * [`Count`]: counts entities.
//! * [`Sum`]: accumulates floating-point totals.
//! * [`MinMax`]: tracks minimum and maximum values.
//! * [`Welford`]: mean and variance via a numerically stable online algorithm.
//!
//! ## Usage example
//! ```ignore
//! let mut slots = ReductionBuffer::<Sum>::from_default(4);
//! world.for_each_chunk_parallel_reduce(&mut query, SumMass, &mut slots)?;
//! let total = slots.fold();
//! ```

/// Associative merge of two partial results.
pub trait Combine {
    /// Folds `other` into `self`.
    ///
    /// Called in ascending worker order, so the result only depends on the
    /// worker count.
    fn combine(&mut self, other: &Self);
}

/// One accumulator slot per worker.
#[derive(Clone, Debug)]
pub struct ReductionBuffer<R> {
    slots: Vec<R>,
}

impl<R> ReductionBuffer<R> {
    /// Creates `worker_count` slots initialized by `init`.
    pub fn new(worker_count: usize, mut init: impl FnMut() -> R) -> Self {
        Self { slots: (0..worker_count).map(|_| init()).collect() }
    }

    /// Number of slots.
    #[inline] pub fn worker_count(&self) -> usize { self.slots.len() }
    /// Slots in worker order.
    #[inline] pub fn slots(&self) -> &[R] { &self.slots }
    /// Mutable slots in worker order.
    #[inline] pub fn slots_mut(&mut self) -> &mut [R] { &mut self.slots }
    /// Slot owned by `worker`.
    #[inline] pub fn slot(&self, worker: usize) -> Option<&R> { self.slots.get(worker) }
    /// Unwraps the slots.
    pub fn into_inner(self) -> Vec<R> { self.slots }

    /// Re-initializes every slot, keeping the allocation.
    pub fn reset(&mut self, mut init: impl FnMut() -> R) {
        for slot in self.slots.iter_mut() {
            *slot = init();
        }
    }
}

impl<R: Default> ReductionBuffer<R> {
    /// Creates `worker_count` default-initialized slots.
    pub fn from_default(worker_count: usize) -> Self {
        Self::new(worker_count, R::default)
    }
}

impl<R: Combine + Default> ReductionBuffer<R> {
    /// Merges every slot in ascending worker order.
    pub fn fold(&self) -> R {
        let mut total = R::default();
        for slot in &self.slots {
            total.combine(slot);
        }
        total
    }
}

/// Accumulator that counts the number of entities processed.
///
/// ## Typical use cases
/// * Population size
/// * Cardinality of a query

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Count(pub u64);

impl Combine for Count {
    fn combine(&mut self, other: &Self) {
        self.0 += other.0;
    }
}

/// Accumulator that computes a floating-point sum.
///
/// ## Semantics
/// Values are accumulated with plain floating-point addition. The result is
/// reproducible for a fixed worker count because merge order is fixed.

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Sum(pub f64);

impl Combine for Sum {
    fn combine(&mut self, other: &Self) {
        self.0 += other.0;
    }
}

/// Accumulator that tracks minimum and maximum values.
///
/// The default initializer sets `min` to positive infinity and `max` to
/// negative infinity, allowing the first observed value to establish both.

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MinMax {
    /// Smallest observed value.
    pub min: f64,

    /// Largest observed value.
    pub max: f64,
}

impl Default for MinMax {
    fn default() -> Self {
        Self { min: f64::INFINITY, max: f64::NEG_INFINITY }
    }
}

impl MinMax {
    /// Widens the range to include `x`.
    pub fn push(&mut self, x: f64) {
        self.min = self.min.min(x);
        self.max = self.max.max(x);
    }
}

impl Combine for MinMax {
    fn combine(&mut self, other: &Self) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }
}

/// Accumulator implementing Welford's online algorithm for mean and variance.
///
/// Partial accumulators are merged with Chan et al.'s parallel update, so a
/// worker-split reduction agrees with a sequential one up to rounding.
///
/// ## References
/// * Welford, B. P. (1962). *Note on a method for calculating corrected sums of
///   squares and products*.

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Welford {
    /// Number of samples processed.
    pub n: u64,

    /// Running mean.
    pub mean: f64,

    /// Sum of squared deviations from the mean.
    pub m2: f64,
}

impl Welford {
    /// Incorporates a new sample into the running statistics.
    pub fn push(&mut self, x: f64) {
        self.n += 1;
        let delta = x - self.mean;
        self.mean += delta / self.n as f64;
        self.m2 += delta * (x - self.mean);
    }

    /// Returns the unbiased sample variance.
    pub fn variance(&self) -> f64 {
        if self.n > 1 {
            self.m2 / (self.n - 1) as f64
        } else {
            0.0
        }
    }
}

impl Combine for Welford {
    fn combine(&mut self, other: &Self) {
        if other.n == 0 {
            return;
        }
        if self.n == 0 {
            *self = *other;
            return;
        }
        let n = self.n + other.n;
        let delta = other.mean - self.mean;
        self.mean += delta * other.n as f64 / n as f64;
        self.m2 += other.m2 + delta * delta * (self.n as f64 * other.n as f64) / n as f64;
        self.n = n;
    }
}
