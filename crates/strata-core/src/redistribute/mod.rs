//! Redistribution between a layered (3-D) grid and its coordinating layer.
//!
//! Before factorization, the matrix and right-hand sides that live on every
//! depth layer are consolidated onto layer 0's 2-D grid. After the solve, the
//! solution is scattered back to every layer in its own row layout.
//!
//! Each routine is a collective call. Its sequence of communications is fixed:
//! a count exchange over the depth communicator, the data exchange that the
//! counts size, and, for the matrix gather, a row-offset exchange over the
//! coordinating layer's 2-D communicator.
//!
//! - [`plan`]: per-layer count and displacement tables.
//! - [`ranges`]: contiguous-range offsets and global vector assembly.
//! - [`consolidate`]: matrix gather onto the coordinating layer.
//! - [`rhs`]: dense right-hand side gather and scatter.

pub mod consolidate;
pub mod plan;
pub mod ranges;
pub mod rhs;

use strata_comm::CommError;
use thiserror::Error;

use crate::matrix::MatrixError;

pub use consolidate::{gather_matrix, gather_system, gather_system_planned};
pub use plan::{LayerCounts, LayerPlan};
pub use ranges::ContiguousRanges;
pub use rhs::{gather_rhs, scatter_rhs};

/// Errors raised by the layered redistribution routines.
#[derive(Debug, Error)]
pub enum RedistributeError {
    #[error(transparent)]
    InvalidArgument(#[from] MatrixError),

    #[error("Communication failed: {0}")]
    Comm(#[from] CommError),
}
