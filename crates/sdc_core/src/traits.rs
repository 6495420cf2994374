use anyhow::Result;
use nalgebra_sparse::pattern::SparsityPattern;
use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

/// A trait for types that can be used as scalars in the batched integrator.
/// Must support basic arithmetic, debug printing, conversion from f64 and
/// sharing across worker threads.
pub trait Scalar: Float + FromPrimitive + Debug + Send + Sync + 'static {}

impl<T: Float + FromPrimitive + Debug + Send + Sync + 'static> Scalar for T {}

/// Converts an `f64` constant into `T`, yielding NaN when `T` cannot represent it.
#[inline]
pub fn lit<T: Scalar>(value: f64) -> T {
    T::from_f64(value).unwrap_or_else(T::nan)
}

/// Right-hand side and Jacobian of one independent ODE system (a reaction network).
///
/// Implementations must be deterministic and free of side effects: the integrator
/// calls them for every active lane, possibly from several worker threads at once.
pub trait ReactionSystem<T: Scalar>: Sync {
    /// Number of equations (species).
    fn neqs(&self) -> usize;

    /// Column index of every stored Jacobian entry, row by row.
    fn csr_col_index(&self) -> Vec<usize>;

    /// CSR row offsets into `csr_col_index` (length `neqs + 1`).
    fn csr_row_count(&self) -> Vec<usize>;

    /// Number of stored Jacobian entries.
    fn nnz(&self) -> usize {
        self.csr_col_index().len()
    }

    /// Evaluates dy/dt at (t, y) into `rate`.
    fn evaluate(&self, t: T, y: &[T], rate: &mut [T]);

    /// Evaluates dy/dt into `rate` and the Jacobian values, in CSR entry order, into `jacobian`.
    fn evaluate_with_jacobian(&self, t: T, y: &[T], rate: &mut [T], jacobian: &mut [T]);
}

/// Sparse linear solver used for the Newton correction `A x = b` of a single lane.
pub trait LinearSolver<T: Scalar>: Sync {
    /// Solves `A x = b` where `matrix` holds the values of `A` in the order of `layout`.
    fn solve(&self, layout: &SparsityPattern, matrix: &[T], x: &mut [T], rhs: &[T]) -> Result<()>;
}
