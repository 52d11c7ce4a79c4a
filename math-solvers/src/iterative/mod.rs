//! Iterative solvers for linear systems
//!
//! - [`gmres`]: restarted GMRES(m), unpreconditioned
//! - [`gmres_preconditioned`]: restarted GMRES(m) with right preconditioning

mod gmres;

pub use gmres::{GmresConfig, GmresOutcome, gmres, gmres_preconditioned};
