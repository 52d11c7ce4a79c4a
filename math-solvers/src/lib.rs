//! Real-valued linear solvers for boundary-element capacitance extraction
//!
//! This crate provides the linear-algebra building blocks used by the
//! multipole-accelerated extractor: a matrix-free operator abstraction, a
//! right-preconditioned restarted GMRES and a small dense LU used for
//! near-field preconditioner blocks.
//!
//! # Features
//!
//! - **Iterative Solvers**: restarted GMRES with a typed converged / not-converged outcome
//! - **Direct Solvers**: LU decomposition with partial pivoting
//! - **Generic Scalar Types**: `f64` and `f32`
//!
//! # Example
//!
//! ```
//! use ndarray::array;
//! use solvers::{GmresConfig, gmres};
//!
//! let a = array![[4.0_f64, 1.0], [1.0, 3.0]];
//! let b = array![1.0_f64, 2.0];
//! let outcome = gmres(&a, &b, &GmresConfig::with_tolerance(1e-10));
//! assert!(outcome.is_converged());
//! ```

pub mod blas_helpers;
pub mod direct;
pub mod iterative;
pub mod traits;

pub use traits::{IdentityPreconditioner, LinearOperator, Preconditioner, Scalar};

pub use iterative::{GmresConfig, GmresOutcome, gmres, gmres_preconditioned};

pub use direct::{LuError, LuFactorization, lu_factorize, lu_solve};
