//! Assembly of globally ordered vectors from contiguous per-rank pieces.
//!
//! When every rank owns a contiguous slice of a global vector and the slices
//! follow rank order, one all-gather of the slice lengths determines every
//! rank's offset, and one variable-length all-gather assembles the whole
//! vector. Both the global row offset of a consolidated matrix and the global
//! row-scale vector are built this way.

use strata_comm::{CommError, Communicator, Element, Layout};

/// Offsets of contiguous per-rank ranges, agreed on by every rank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContiguousRanges {
    layout: Layout,
    rank: usize,
}

impl ContiguousRanges {
    /// All-gather the local range lengths and derive the offsets.
    ///
    /// Collective over `comm`.
    pub fn exchange<C: Communicator>(comm: &C, local_len: usize) -> Result<Self, CommError> {
        let counts = comm.all_gather(local_len)?;
        Ok(Self {
            layout: Layout::from_counts(counts),
            rank: comm.rank(),
        })
    }

    /// Exclusive prefix sum of the lengths of lower ranks.
    pub fn offset(&self) -> usize {
        self.layout.offset(self.rank)
    }

    /// Length of the assembled vector.
    pub fn total(&self) -> usize {
        self.layout.total()
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Assemble the global vector from every rank's `local` slice.
    ///
    /// Collective over the same communicator used in [`exchange`](Self::exchange).
    pub fn assemble<C: Communicator, T: Element>(
        &self,
        comm: &C,
        local: &[T],
    ) -> Result<Vec<T>, CommError> {
        comm.all_gatherv(local, &self.layout)
    }
}
