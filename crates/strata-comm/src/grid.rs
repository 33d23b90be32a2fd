//! Layered (3-D) process grid topology.
//!
//! A layered grid replicates an `nprow x npcol` 2-D grid across `npdep` depth
//! layers. Each process sits in two communicators:
//!
//! - the **2-D grid communicator** of its layer (`nprow * npcol` ranks), and
//! - the **depth communicator** linking the processes that share its 2-D
//!   coordinates across all layers (`npdep` ranks).
//!
//! Layer 0 (depth rank 0) is the coordinating layer that holds gathered data.

use crate::comm::{CommError, Communicator};
use crate::serial::SelfComm;

/// Depth rank of the coordinating layer.
pub const COORDINATOR: usize = 0;

/// Rank queries and sub-communicators of a layered process grid.
pub trait GridTopology {
    type Comm: Communicator;

    /// Number of process rows of the 2-D grid.
    fn nprow(&self) -> usize;

    /// Number of process columns of the 2-D grid.
    fn npcol(&self) -> usize;

    /// Number of depth layers.
    fn npdep(&self) -> usize;

    /// Communicator spanning this process's 2-D layer.
    fn grid2d(&self) -> &Self::Comm;

    /// Communicator spanning this process's depth column.
    fn depth(&self) -> &Self::Comm;

    fn procs2d(&self) -> usize {
        self.nprow() * self.npcol()
    }

    fn depth_rank(&self) -> usize {
        self.depth().rank()
    }

    fn grid2d_rank(&self) -> usize {
        self.grid2d().rank()
    }

    /// Whether this process belongs to the coordinating layer.
    fn is_coordinator(&self) -> bool {
        self.depth_rank() == COORDINATOR
    }

    /// Rank in the full grid; the depth coordinate varies fastest.
    fn world_rank(&self) -> usize {
        self.grid2d_rank() * self.npdep() + self.depth_rank()
    }
}

/// Concrete layered grid built from two communicators.
#[derive(Debug, Clone)]
pub struct Grid3d<C> {
    nprow: usize,
    npcol: usize,
    npdep: usize,
    grid2d: C,
    depth: C,
}

impl<C: Communicator> Grid3d<C> {
    /// Assemble a grid, checking that the communicators match its shape.
    pub fn new(
        nprow: usize,
        npcol: usize,
        npdep: usize,
        grid2d: C,
        depth: C,
    ) -> Result<Self, CommError> {
        if grid2d.size() != nprow * npcol {
            return Err(CommError::GridShape(format!(
                "2-D communicator has {} ranks, expected {nprow} x {npcol}",
                grid2d.size()
            )));
        }
        if depth.size() != npdep {
            return Err(CommError::GridShape(format!(
                "depth communicator has {} ranks, expected {npdep}",
                depth.size()
            )));
        }
        Ok(Self {
            nprow,
            npcol,
            npdep,
            grid2d,
            depth,
        })
    }

    /// Process row and column of this rank in its 2-D layer (row-major).
    pub fn coords(&self) -> (usize, usize) {
        let p = self.grid2d.rank();
        (p / self.npcol, p % self.npcol)
    }
}

impl Grid3d<SelfComm> {
    /// A `1 x 1 x 1` grid for single-process runs.
    pub fn serial() -> Self {
        Self {
            nprow: 1,
            npcol: 1,
            npdep: 1,
            grid2d: SelfComm,
            depth: SelfComm,
        }
    }
}

impl<C: Communicator> GridTopology for Grid3d<C> {
    type Comm = C;

    fn nprow(&self) -> usize {
        self.nprow
    }

    fn npcol(&self) -> usize {
        self.npcol
    }

    fn npdep(&self) -> usize {
        self.npdep
    }

    fn grid2d(&self) -> &C {
        &self.grid2d
    }

    fn depth(&self) -> &C {
        &self.depth
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_grid_is_its_own_coordinator() {
        let grid = Grid3d::serial();
        assert!(grid.is_coordinator());
        assert_eq!(grid.world_rank(), 0);
        assert_eq!(grid.procs2d(), 1);
        assert_eq!(grid.coords(), (0, 0));
    }

    #[test]
    fn test_shape_mismatch_is_rejected() {
        let err = Grid3d::new(2, 1, 1, SelfComm, SelfComm).unwrap_err();
        assert!(matches!(err, CommError::GridShape(_)));
    }
}
