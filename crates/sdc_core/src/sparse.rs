//! Batched CSR matrices for the Newton system.
//!
//! The sparsity pattern is shared by every lane; only the values differ. Values
//! live in a [`VectorSet`] with one component per stored entry, so scaling by a
//! per-lane time step or bumping the diagonal is a single elementwise pass.

use crate::error::{SdcError, SdcResult};
use crate::exec::ExecutionContext;
use crate::traits::Scalar;
use crate::vector_set::VectorSet;
use nalgebra_sparse::pattern::SparsityPattern;
use nalgebra_sparse::{CsrMatrix, SparseFormatError};

/// Validated square CSR pattern with its diagonal located.
#[derive(Debug, Clone, PartialEq)]
pub struct CsrLayout {
    pattern: SparsityPattern,
    diagonal: Vec<usize>,
    row_of_entry: Vec<usize>,
    is_diagonal: Vec<bool>,
}

impl CsrLayout {
    /// Builds a layout from CSR column indices and row offsets.
    ///
    /// Column indices must be sorted and unique within each row, and every row
    /// must store its diagonal entry.
    pub fn from_csr(neqs: usize, col_index: Vec<usize>, row_count: Vec<usize>) -> SdcResult<Self> {
        if neqs == 0 {
            return Err(SdcError::ZeroDimension);
        }
        let pattern = SparsityPattern::try_from_offsets_and_indices(neqs, neqs, row_count, col_index)?;

        let mut diagonal = Vec::with_capacity(neqs);
        let mut row_of_entry = vec![0; pattern.nnz()];
        let mut is_diagonal = vec![false; pattern.nnz()];
        for row in 0..neqs {
            let start = pattern.major_offsets()[row];
            let cols = pattern.lane(row);
            for k in 0..cols.len() {
                row_of_entry[start + k] = row;
            }
            let pos = cols
                .binary_search(&row)
                .map_err(|_| SdcError::MissingDiagonal { row })?;
            diagonal.push(start + pos);
            is_diagonal[start + pos] = true;
        }

        Ok(Self {
            pattern,
            diagonal,
            row_of_entry,
            is_diagonal,
        })
    }

    /// Fully populated pattern.
    pub fn dense(neqs: usize) -> SdcResult<Self> {
        let col_index = (0..neqs).flat_map(|_| 0..neqs).collect();
        let row_count = (0..=neqs).map(|i| i * neqs).collect();
        Self::from_csr(neqs, col_index, row_count)
    }

    /// Diagonal-only pattern.
    pub fn diagonal(neqs: usize) -> SdcResult<Self> {
        Self::from_csr(neqs, (0..neqs).collect(), (0..=neqs).collect())
    }

    pub fn neqs(&self) -> usize {
        self.pattern.major_dim()
    }

    pub fn nnz(&self) -> usize {
        self.pattern.nnz()
    }

    pub fn pattern(&self) -> &SparsityPattern {
        &self.pattern
    }

    pub fn col_index(&self) -> &[usize] {
        self.pattern.minor_indices()
    }

    pub fn row_count(&self) -> &[usize] {
        self.pattern.major_offsets()
    }

    /// Storage position of entry (i, j), if it is part of the pattern.
    pub fn entry(&self, i: usize, j: usize) -> Option<usize> {
        if i >= self.neqs() {
            return None;
        }
        let start = self.pattern.major_offsets()[i];
        self.pattern
            .lane(i)
            .binary_search(&j)
            .ok()
            .map(|pos| start + pos)
    }

    pub fn diagonal_entry(&self, row: usize) -> usize {
        self.diagonal[row]
    }

    pub fn is_diagonal(&self, entry: usize) -> bool {
        self.is_diagonal[entry]
    }

    pub fn row_of(&self, entry: usize) -> usize {
        self.row_of_entry[entry]
    }
}

/// CSR matrix with one set of values per lane.
#[derive(Debug, Clone)]
pub struct SparseMatrix<T: Scalar> {
    layout: CsrLayout,
    values: VectorSet<T>,
}

impl<T: Scalar> SparseMatrix<T> {
    pub fn new(layout: CsrLayout, lanes: usize) -> Self {
        let values = VectorSet::zeros(layout.nnz(), lanes);
        Self { layout, values }
    }

    /// Replaces the pattern; all values are reset to zero.
    pub fn set_csr_layout(&mut self, col_index: Vec<usize>, row_count: Vec<usize>) -> SdcResult<()> {
        let neqs = row_count.len().saturating_sub(1);
        self.layout = CsrLayout::from_csr(neqs, col_index, row_count)?;
        self.values = VectorSet::zeros(self.layout.nnz(), self.values.lanes());
        Ok(())
    }

    pub fn layout(&self) -> &CsrLayout {
        &self.layout
    }

    pub fn lanes(&self) -> usize {
        self.values.lanes()
    }

    pub fn values(&self) -> &VectorSet<T> {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut VectorSet<T> {
        &mut self.values
    }

    /// Value of entry (i, j) in `lane`; zero outside the pattern.
    pub fn get(&self, i: usize, j: usize, lane: usize) -> T {
        self.layout
            .entry(i, j)
            .map_or_else(T::zero, |e| self.values.get(e, lane))
    }

    pub fn ij_mut(&mut self, i: usize, j: usize, lane: usize) -> Option<&mut T> {
        let e = self.layout.entry(i, j)?;
        let idx = self.values.index(e, lane);
        self.values.as_mut_slice().get_mut(idx)
    }

    pub fn mul_scalar(&mut self, scalar: T) {
        self.values *= scalar;
    }

    /// Scales every lane's matrix by that lane's scalar.
    pub fn mul_lanes<E: ExecutionContext>(&mut self, exec: &E, scalars: &[T]) {
        self.values.mul_lanes(exec, scalars);
    }

    /// Adds `scalar` to every diagonal entry of every lane.
    pub fn add_to_diagonal<E: ExecutionContext>(&mut self, exec: &E, scalar: T) {
        let layout = &self.layout;
        self.values.for_each_mut(exec, |entry, _, v| {
            if layout.is_diagonal(entry) {
                *v = *v + scalar;
            }
        });
    }

    /// `self += factor[lane] * other`, lane by lane.
    pub fn add_scaled<E: ExecutionContext>(&mut self, exec: &E, other: &SparseMatrix<T>, factors: &[T]) {
        assert_eq!(self.layout, other.layout, "CSR layout mismatch");
        assert_eq!(factors.len(), self.lanes(), "lane count mismatch");
        let src = &other.values;
        self.values
            .for_each_mut(exec, |entry, lane, v| *v = *v + factors[lane] * src.get(entry, lane));
    }

    pub fn lane_values(&self, lane: usize) -> Vec<T> {
        self.values.lane(lane).into_vec()
    }

    pub fn read_lane(&self, lane: usize, out: &mut [T]) {
        self.values.read_lane(lane, out);
    }

    pub fn set_lane_values(&mut self, lane: usize, values: &[T]) {
        self.values.set_lane(lane, values);
    }

    /// y = A x for one lane.
    pub fn lane_matvec(&self, lane: usize, x: &[T], y: &mut [T]) {
        let neqs = self.layout.neqs();
        assert!(x.len() == neqs && y.len() == neqs, "dimension mismatch");
        let offsets = self.layout.row_count();
        let cols = self.layout.col_index();
        for (row, yi) in y.iter_mut().enumerate() {
            *yi = (offsets[row]..offsets[row + 1])
                .fold(T::zero(), |acc, e| acc + self.values.get(e, lane) * x[cols[e]]);
        }
    }

    /// Copies one lane into a standalone `nalgebra_sparse` matrix.
    pub fn to_csr(&self, lane: usize) -> Result<CsrMatrix<T>, SparseFormatError> {
        CsrMatrix::try_from_pattern_and_values(self.layout.pattern.clone(), self.lane_values(lane))
    }
}
