//! LU decomposition solver
//!
//! LU factorization with partial pivoting for small dense systems, such as the
//! near-field blocks of a block preconditioner.

use crate::traits::Scalar;
use ndarray::{Array1, Array2};
use thiserror::Error;

/// Errors that can occur during LU factorization
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LuError {
    #[error("Matrix is singular or nearly singular (pivot {pivot:.3e} at column {column})")]
    SingularMatrix { column: usize, pivot: f64 },
    #[error("Matrix dimensions mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// LU factorization result
///
/// Stores L and U factors along with the row permutation.
#[derive(Debug, Clone)]
pub struct LuFactorization<T: Scalar> {
    /// Combined L and U matrices (L is unit lower triangular, stored below diagonal)
    pub lu: Array2<T>,
    /// Row `i` of the factored matrix is row `perm[i]` of the input
    pub perm: Vec<usize>,
    /// Matrix dimension
    pub n: usize,
}

impl<T: Scalar> LuFactorization<T> {
    /// Solve Ax = b using the pre-computed LU factorization
    pub fn solve(&self, b: &Array1<T>) -> Result<Array1<T>, LuError> {
        if b.len() != self.n {
            return Err(LuError::DimensionMismatch {
                expected: self.n,
                got: b.len(),
            });
        }

        let mut x = Array1::from_iter(self.perm.iter().map(|&p| b[p]));

        // Forward substitution: Ly = Pb
        for i in 0..self.n {
            let mut sum = x[i];
            for j in 0..i {
                sum -= self.lu[[i, j]] * x[j];
            }
            x[i] = sum;
        }

        // Backward substitution: Ux = y
        for i in (0..self.n).rev() {
            let mut sum = x[i];
            for j in (i + 1)..self.n {
                sum -= self.lu[[i, j]] * x[j];
            }
            x[i] = sum / self.lu[[i, i]];
        }

        Ok(x)
    }

    /// Solve for the columns of the identity selected by `columns`
    ///
    /// Returns a `columns.len() x n` matrix whose row `r` is `A^{-1} e_{columns[r]}`.
    pub fn solve_unit_columns(&self, columns: &[usize]) -> Result<Array2<T>, LuError> {
        let mut out = Array2::from_elem((columns.len(), self.n), T::zero());
        for (r, &c) in columns.iter().enumerate() {
            if c >= self.n {
                return Err(LuError::DimensionMismatch {
                    expected: self.n,
                    got: c + 1,
                });
            }
            let mut e = Array1::from_elem(self.n, T::zero());
            e[c] = T::one();
            out.row_mut(r).assign(&self.solve(&e)?);
        }
        Ok(out)
    }
}

/// Compute LU factorization with partial pivoting
///
/// A pivot smaller than `n * eps * max|a_ij|` is reported as singular.
pub fn lu_factorize<T: Scalar>(a: &Array2<T>) -> Result<LuFactorization<T>, LuError> {
    let n = a.nrows();
    if n != a.ncols() {
        return Err(LuError::DimensionMismatch {
            expected: n,
            got: a.ncols(),
        });
    }

    let scale = a.iter().fold(T::zero(), |m, v| m.max(v.abs()));
    let threshold = T::epsilon() * T::from_f64_lossy(n.max(1) as f64) * scale;

    let mut lu = a.clone();
    let mut perm: Vec<usize> = (0..n).collect();

    for k in 0..n {
        // Find pivot
        let mut max_val = lu[[k, k]].abs();
        let mut max_row = k;
        for i in (k + 1)..n {
            let val = lu[[i, k]].abs();
            if val > max_val {
                max_val = val;
                max_row = i;
            }
        }

        if !(max_val > threshold) {
            return Err(LuError::SingularMatrix {
                column: k,
                pivot: max_val.to_f64().unwrap_or(0.0),
            });
        }

        if max_row != k {
            for j in 0..n {
                lu.swap([k, j], [max_row, j]);
            }
            perm.swap(k, max_row);
        }

        let pivot = lu[[k, k]];
        for i in (k + 1)..n {
            let mult = lu[[i, k]] / pivot;
            lu[[i, k]] = mult;
            for j in (k + 1)..n {
                let update = mult * lu[[k, j]];
                lu[[i, j]] -= update;
            }
        }
    }

    Ok(LuFactorization { lu, perm, n })
}

/// Solve Ax = b using LU decomposition
///
/// Convenience wrapper combining factorization and solve.
pub fn lu_solve<T: Scalar>(a: &Array2<T>, b: &Array1<T>) -> Result<Array1<T>, LuError> {
    lu_factorize(a)?.solve(b)
}
