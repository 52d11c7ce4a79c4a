//! # FastCap: multipole-accelerated capacitance extraction
//!
//! Computes the capacitance matrix of a set of conductors, optionally
//! embedded in piecewise-constant dielectrics, from a boundary-element model
//! of their surfaces.
//!
//! ## Features
//!
//! - Flat triangle and quadrilateral panels with exact near-field integrals
//! - Octree clustering with Cartesian multipole and local expansions
//! - Right-preconditioned GMRES with an overlapping near-field block preconditioner
//! - Conductor grouping, skip and remove selection, dielectric interfaces
//! - Geometry and list file readers, simple mesh generators
//! - Parallel execution with Rayon (feature `native`)
//!
//! ## Example
//!
//! ```
//! use fastcap::{LoadOptions, Problem, mesh};
//!
//! let mut problem = Problem::with_title("two plates");
//! let bottom = mesh::plate("bottom", [0.0, 0.0, 0.0], 1.0, 1.0, 0.25)?;
//! let top = mesh::plate("top", [0.0, 0.0, 0.2], 1.0, 1.0, 0.25)?;
//! problem.add(&bottom, &LoadOptions::default())?;
//! problem.add(&top, &LoadOptions::default())?;
//!
//! let result = problem.solve()?;
//! assert_eq!(result.conductors(), ["bottom%GROUP1", "top%GROUP2"]);
//! assert!(result.matrix()[[0, 1]] < 0.0);
//! # Ok::<(), fastcap::FastcapError>(())
//! ```

#![warn(clippy::all)]
#![allow(clippy::too_many_arguments)]

pub mod conductor;
pub mod config;
pub mod error;
pub mod expansion;
pub mod geometry;
pub mod influence;
pub mod io;
pub mod mesh;
pub mod operator;
pub mod panel;
pub mod parallel;
pub mod preconditioner;
pub mod problem;
pub mod quadrature;
pub mod surface;
pub mod tree;

// Re-exports
pub use config::FastcapConfig;
pub use error::{FastcapError, Result};
pub use geometry::Vec3;
pub use io::{ListEntry, parse_geo, parse_list, read_geo, read_list};
pub use problem::{
    CapacitanceResult, ColumnReport, EPSILON0, LoadOptions, Problem, SurfaceKind,
};
pub use surface::{Surface, SurfacePanel};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Git commit hash (set during build)
pub const GIT_HASH: &str = env!("GIT_HASH");
