//! # Strata Comm
//!
//! Communication layer of the Strata framework. This crate provides a
//! [`Communicator`](comm::Communicator) trait that isolates the layered
//! redistribution and scaling code from the transport, plus the
//! [`GridTopology`](grid::GridTopology) of a layered (3-D) process grid.
//!
//! ## Available backends
//!
//! | Backend | Feature flag | Status |
//! |---------|-------------|--------|
//! | Single process ([`SelfComm`]) | always | Implemented |
//! | Thread group ([`LocalComm`], Rayon launcher) | `local` (default) | Implemented |
//! | Message passing | none | Not provided; implement [`Communicator`] |

pub mod comm;
pub mod grid;
pub mod local;
pub mod serial;

pub use comm::{CommError, Communicator, Element, Layout, ReduceOp, Reducible};
pub use grid::{Grid3d, GridTopology, COORDINATOR};
pub use local::{local_grids, LocalComm, LocalGroup};
pub use serial::SelfComm;

#[cfg(feature = "local")]
pub use local::run_grid;
