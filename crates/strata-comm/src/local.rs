//! In-process communicator groups backed by threads.
//!
//! Each rank of a [`LocalGroup`] is a thread of the current process. A
//! collective is two barrier phases around a shared slot table: every rank
//! posts its payload into its own slot, waits for the others, reads what it
//! needs, and waits again so that no slot is overwritten by the next
//! collective while a slower rank is still reading.
//!
//! [`run_grid`] launches a full layered grid on a dedicated Rayon pool with
//! exactly one worker per rank, so blocking ranks never starve each other.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Barrier, Mutex, PoisonError};

use log::{debug, trace};

use crate::comm::{CommError, Communicator};
use crate::grid::Grid3d;

type Slot = Option<Box<dyn Any + Send>>;

/// Shared state of a thread-backed communicator group.
pub struct LocalGroup {
    size: usize,
    barrier: Barrier,
    slots: Mutex<Vec<Slot>>,
}

impl LocalGroup {
    /// Create a group of `size` ranks.
    pub fn new(size: usize) -> Arc<Self> {
        Arc::new(Self {
            size,
            barrier: Barrier::new(size),
            slots: Mutex::new((0..size).map(|_| None).collect()),
        })
    }

    /// Create a group and hand out one communicator per rank, in rank order.
    pub fn communicators(size: usize) -> Vec<LocalComm> {
        let group = Self::new(size);
        (0..size)
            .map(|rank| LocalComm {
                rank,
                group: Arc::clone(&group),
            })
            .collect()
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

impl fmt::Debug for LocalGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalGroup").field("size", &self.size).finish()
    }
}

/// One rank's handle on a [`LocalGroup`].
#[derive(Debug, Clone)]
pub struct LocalComm {
    rank: usize,
    group: Arc<LocalGroup>,
}

impl Communicator for LocalComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.group.size
    }

    fn exchange<P, R, F>(&self, send: Option<P>, read: F) -> Result<R, CommError>
    where
        P: Any + Send,
        F: FnOnce(&[Option<&P>]) -> Result<R, CommError>,
    {
        {
            let mut slots = self.group.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots[self.rank] = send.map(|p| Box::new(p) as Box<dyn Any + Send>);
        }
        self.group.barrier.wait();

        let result = {
            let slots = self.group.slots.lock().unwrap_or_else(PoisonError::into_inner);
            let mut posted: Vec<Option<&P>> = Vec::with_capacity(slots.len());
            let mut mismatch = None;
            for (rank, slot) in slots.iter().enumerate() {
                match slot {
                    None => posted.push(None),
                    Some(boxed) => match boxed.downcast_ref::<P>() {
                        Some(payload) => posted.push(Some(payload)),
                        None => {
                            mismatch = Some(rank);
                            break;
                        }
                    },
                }
            }
            match mismatch {
                Some(rank) => Err(CommError::TypeMismatch { rank }),
                None => read(&posted),
            }
        };

        // Second phase: nobody may post the next collective until every rank
        // has finished reading this one.
        self.group.barrier.wait();
        trace!(
            "rank {}/{} completed exchange (ok = {})",
            self.rank,
            self.group.size,
            result.is_ok()
        );
        result
    }
}

/// Build every rank's [`Grid3d`] for an `nprow x npcol x npdep` layered grid.
///
/// Grids are returned in world-rank order, where the world rank of the
/// process with 2-D rank `p` on layer `z` is `p * npdep + z` (the depth
/// coordinate varies fastest).
pub fn local_grids(
    nprow: usize,
    npcol: usize,
    npdep: usize,
) -> Result<Vec<Grid3d<LocalComm>>, CommError> {
    if nprow == 0 || npcol == 0 || npdep == 0 {
        return Err(CommError::GridShape(format!(
            "every grid dimension must be positive, got {nprow} x {npcol} x {npdep}"
        )));
    }
    let procs2d = nprow * npcol;

    let mut layers: Vec<std::vec::IntoIter<LocalComm>> = (0..npdep)
        .map(|_| LocalGroup::communicators(procs2d).into_iter())
        .collect();
    let mut columns: Vec<std::vec::IntoIter<LocalComm>> = (0..procs2d)
        .map(|_| LocalGroup::communicators(npdep).into_iter())
        .collect();

    let mut grids = Vec::with_capacity(procs2d * npdep);
    for p in 0..procs2d {
        for z in 0..npdep {
            let grid2d = layers[z].next().ok_or_else(|| {
                CommError::GridShape(format!("layer {z} ran out of 2-D ranks"))
            })?;
            let depth = columns[p].next().ok_or_else(|| {
                CommError::GridShape(format!("2-D rank {p} ran out of depth ranks"))
            })?;
            grids.push(Grid3d::new(nprow, npcol, npdep, grid2d, depth)?);
        }
    }
    Ok(grids)
}

/// Run `f` on every rank of an `nprow x npcol x npdep` grid of threads.
///
/// Returns the per-rank results in world-rank order (see [`local_grids`]).
/// The closure runs concurrently on all ranks; a rank that panics or skips a
/// collective leaves the rest blocked, exactly like a distributed job.
#[cfg(feature = "local")]
pub fn run_grid<R, F>(
    nprow: usize,
    npcol: usize,
    npdep: usize,
    f: F,
) -> Result<Vec<R>, CommError>
where
    R: Send,
    F: Fn(Grid3d<LocalComm>) -> R + Sync,
{
    let grids = local_grids(nprow, npcol, npdep)?;
    let nprocs = grids.len();
    debug!("launching {nprow} x {npcol} x {npdep} grid on {nprocs} threads");

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(nprocs)
        .thread_name(|i| format!("strata-rank-{i}"))
        .build()
        .map_err(|e| CommError::Unavailable(e.to_string()))?;

    let results: Vec<Mutex<Option<R>>> = (0..nprocs).map(|_| Mutex::new(None)).collect();
    pool.scope(|s| {
        for (grid, slot) in grids.into_iter().zip(results.iter()) {
            let f = &f;
            s.spawn(move |_| {
                let out = f(grid);
                *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(out);
            });
        }
    });

    results
        .into_iter()
        .enumerate()
        .map(|(rank, slot)| {
            slot.into_inner()
                .unwrap_or_else(PoisonError::into_inner)
                .ok_or(CommError::MissingPayload { rank })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridTopology;

    #[test]
    fn test_local_grids_rank_order() {
        let grids = local_grids(1, 2, 3).unwrap();
        assert_eq!(grids.len(), 6);
        for (w, grid) in grids.iter().enumerate() {
            assert_eq!(grid.world_rank(), w);
            assert_eq!(grid.grid2d().size(), 2);
            assert_eq!(grid.depth().size(), 3);
        }
        assert_eq!(grids[4].grid2d_rank(), 1);
        assert_eq!(grids[4].depth_rank(), 1);
    }

    #[test]
    fn test_local_grids_rejects_empty_dimension() {
        assert!(matches!(local_grids(0, 1, 1), Err(CommError::GridShape(_))));
    }

    #[cfg(feature = "local")]
    #[test]
    fn test_run_grid_collects_in_world_order() {
        let ranks = run_grid(2, 1, 2, |grid| grid.world_rank()).unwrap();
        assert_eq!(ranks, vec![0, 1, 2, 3]);
    }
}
