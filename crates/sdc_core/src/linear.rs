use crate::traits::LinearSolver;
use anyhow::{anyhow, bail, Result};
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::pattern::SparsityPattern;

/// Expands the CSR system into a dense matrix and solves it with LU.
///
/// Adequate for reaction networks of a few dozen species, where the fill-in of
/// a sparse factorization buys little.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenseLu;

impl LinearSolver<f64> for DenseLu {
    fn solve(&self, layout: &SparsityPattern, matrix: &[f64], x: &mut [f64], rhs: &[f64]) -> Result<()> {
        let dim = layout.major_dim();
        if matrix.len() != layout.nnz() {
            bail!(
                "Matrix value count mismatch. Expected {}, got {}.",
                layout.nnz(),
                matrix.len()
            );
        }
        if x.len() != dim || rhs.len() != dim {
            bail!(
                "Vector dimension mismatch. Expected {}, got x = {} and b = {}.",
                dim,
                x.len(),
                rhs.len()
            );
        }

        let mut a = DMatrix::zeros(dim, dim);
        for row in 0..dim {
            let start = layout.major_offsets()[row];
            for (k, &col) in layout.lane(row).iter().enumerate() {
                a[(row, col)] = matrix[start + k];
            }
        }
        let b = DVector::from_column_slice(rhs);
        let solution = a
            .lu()
            .solve(&b)
            .ok_or_else(|| anyhow!("Newton matrix is singular."))?;
        x.copy_from_slice(solution.as_slice());
        Ok(())
    }
}
