//! Per-layer displacement tables.
//!
//! Before any data moves across the depth dimension, the coordinating layer
//! needs every layer's `{nnz_loc, m_loc}` to size its receive buffers. The
//! [`LayerPlan`] bundles those counts with their prefix sums so that callers
//! never juggle parallel count/displacement arrays.

use log::debug;
use serde::{Deserialize, Serialize};
use strata_comm::{CommError, Communicator, Layout, COORDINATOR};

/// Local sizes reported by one depth layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LayerCounts {
    pub nnz: usize,
    pub rows: usize,
}

/// Count and displacement tables for one depth column of the grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerPlan {
    nnz: Layout,
    rows: Layout,
}

impl LayerPlan {
    /// Derive the tables from the counts of every layer, in layer order.
    pub fn from_counts(counts: &[LayerCounts]) -> Self {
        Self {
            nnz: Layout::from_counts(counts.iter().map(|c| c.nnz).collect()),
            rows: Layout::from_counts(counts.iter().map(|c| c.rows).collect()),
        }
    }

    /// Gather every layer's local sizes onto the coordinating layer.
    ///
    /// Collective over the depth communicator. Returns `Some` on the
    /// coordinating layer and `None` elsewhere.
    pub fn collect<C: Communicator>(
        depth: &C,
        nnz_loc: usize,
        m_loc: usize,
    ) -> Result<Option<Self>, CommError> {
        let local = LayerCounts {
            nnz: nnz_loc,
            rows: m_loc,
        };
        let gathered = depth.gather(local, COORDINATOR)?;
        Ok(gathered.map(|counts| {
            let plan = Self::from_counts(&counts);
            debug!(
                "layer plan over {} layers: rows {:?}, nnz {:?}",
                plan.layers(),
                plan.rows.counts(),
                plan.nnz.counts()
            );
            plan
        }))
    }

    /// Number of depth layers.
    pub fn layers(&self) -> usize {
        self.rows.len()
    }

    /// Non-zero counts and displacements (`nnz_disp`).
    pub fn nnz(&self) -> &Layout {
        &self.nnz
    }

    /// Row counts and displacements (`row_disp`).
    pub fn rows(&self) -> &Layout {
        &self.rows
    }

    /// Counts and displacements of a compacted `nrhs`-column block
    /// (`b_disp = nrhs * row_disp`).
    pub fn rhs(&self, nrhs: usize) -> Layout {
        self.rows.scaled(nrhs)
    }

    pub fn total_nnz(&self) -> usize {
        self.nnz.total()
    }

    pub fn total_rows(&self) -> usize {
        self.rows.total()
    }

    /// The counts of layer `z`.
    pub fn layer(&self, z: usize) -> LayerCounts {
        LayerCounts {
            nnz: self.nnz.count(z),
            rows: self.rows.count(z),
        }
    }
}
