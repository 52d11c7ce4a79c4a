//! Core traits for linear algebra operations
//!
//! This module defines the abstractions shared by the solvers:
//! - [`Scalar`]: real floating-point element type
//! - [`LinearOperator`]: anything that can perform a matrix-vector product
//! - [`Preconditioner`]: approximate inverse applied inside Krylov iterations

use ndarray::{Array1, Array2};
use num_traits::{Float, FromPrimitive, NumAssign, ToPrimitive};
use std::fmt::Debug;

/// Real scalar type usable by the solvers.
///
/// Implemented for `f64` and `f32` through a blanket impl.
pub trait Scalar:
    Float + NumAssign + FromPrimitive + ToPrimitive + Send + Sync + Debug + 'static
{
    /// Convert an `f64` constant
    #[inline]
    fn from_f64_lossy(v: f64) -> Self {
        <Self as FromPrimitive>::from_f64(v).unwrap_or_else(Self::max_value)
    }
}

impl<T> Scalar for T where
    T: Float + NumAssign + FromPrimitive + ToPrimitive + Send + Sync + Debug + 'static
{
}

/// Trait for linear operators (matrices) that can perform matrix-vector products.
///
/// Dense matrices and matrix-free operators (multipole-accelerated potential
/// operators) are interchangeable behind this trait.
pub trait LinearOperator<T: Scalar>: Send + Sync {
    /// Number of rows in the operator
    fn num_rows(&self) -> usize;

    /// Number of columns in the operator
    fn num_cols(&self) -> usize;

    /// Apply the operator: y = A * x
    fn apply(&self, x: &Array1<T>) -> Array1<T>;

    /// Check if the operator is square
    fn is_square(&self) -> bool {
        self.num_rows() == self.num_cols()
    }
}

impl<T: Scalar> LinearOperator<T> for Array2<T> {
    fn num_rows(&self) -> usize {
        self.nrows()
    }

    fn num_cols(&self) -> usize {
        self.ncols()
    }

    fn apply(&self, x: &Array1<T>) -> Array1<T> {
        let mut y = Array1::from_elem(self.nrows(), T::zero());
        for (yi, row) in y.iter_mut().zip(self.rows()) {
            let mut sum = T::zero();
            for (a, xj) in row.iter().zip(x.iter()) {
                sum += *a * *xj;
            }
            *yi = sum;
        }
        y
    }
}

/// Trait for preconditioners used in iterative solvers.
///
/// A preconditioner M approximates A^(-1), so that A*M is better conditioned
/// than A alone.
pub trait Preconditioner<T: Scalar>: Send + Sync {
    /// Apply the preconditioner: y = M * r
    fn apply(&self, r: &Array1<T>) -> Array1<T>;
}

/// Identity preconditioner (no preconditioning)
#[derive(Clone, Debug, Default)]
pub struct IdentityPreconditioner;

impl<T: Scalar> Preconditioner<T> for IdentityPreconditioner {
    fn apply(&self, r: &Array1<T>) -> Array1<T> {
        r.clone()
    }
}
