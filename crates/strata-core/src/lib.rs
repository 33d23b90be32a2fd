//! # Strata Core
//!
//! Data redistribution and equilibration for sparse solvers running on a
//! layered (3-D) process grid. A 3-D grid is `npdep` stacked copies of an
//! `nprow x npcol` grid; the matrix rows owned by one 2-D position are spread
//! over its depth column and must be consolidated onto layer 0 before
//! factorization.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`matrix`] | Row-distributed sparse matrix blocks |
//! | [`dense`] | Strided column-major right-hand side blocks |
//! | [`redistribute`] | Layer plans, matrix gather, rhs gather/scatter |
//! | [`scaling`] | Power-of-radix row/column equilibration |
//! | [`scalar`] | Numeric element traits and machine constants |
//!
//! Every routine that communicates is a blocking collective over a
//! [`strata_comm::Communicator`]; see that crate for the available backends.

pub mod dense;
pub mod matrix;
pub mod redistribute;
pub mod scalar;
pub mod scaling;

pub use dense::DenseBlock;
pub use matrix::{block_partition, tiles_exactly, MatrixError, RowBlockMatrix};
pub use redistribute::{
    gather_matrix, gather_rhs, gather_system, gather_system_planned, scatter_rhs,
    ContiguousRanges, LayerCounts, LayerPlan, RedistributeError,
};
pub use scalar::{RealScalar, Scalar};
pub use scaling::{equilibrate, Equilibration, ScalingError};
