//! Matrix consolidation onto the coordinating layer.
//!
//! Every process of a depth column contributes its row block; the process on
//! layer 0 concatenates them in layer order. Values and column indices are
//! copied verbatim, but row pointers are relative to each layer's own block
//! and must be rebased by that layer's non-zero displacement.
//!
//! The global first row of the consolidated block is not inherited from the
//! 3-D distribution. Row ownership on the 2-D grid follows the 2-D rank order,
//! so it is recomputed from an exchange of the consolidated row counts over
//! the coordinating layer's 2-D communicator.

use log::debug;
use strata_comm::{Communicator, Element, GridTopology, COORDINATOR};

use super::plan::LayerPlan;
use super::ranges::ContiguousRanges;
use super::rhs::gather_rhs_planned;
use super::RedistributeError;
use crate::dense::DenseBlock;
use crate::matrix::{MatrixError, RowBlockMatrix};

/// Consolidate a depth-distributed matrix onto the coordinating layer.
///
/// Collective over the depth communicator, then over the coordinating layer's
/// 2-D communicator. Returns `Some` on layer 0 and `None` on every other layer.
pub fn gather_matrix<T: Element, G: GridTopology>(
    a: &RowBlockMatrix<T>,
    grid: &G,
) -> Result<Option<RowBlockMatrix<T>>, RedistributeError> {
    let plan = LayerPlan::collect(grid.depth(), a.nnz_loc(), a.m_loc())?;
    consolidate(a, plan.as_ref(), grid)
}

/// Consolidate both the matrix and its right-hand sides with a single count
/// exchange.
///
/// `b` must have one row per local matrix row. Returns the consolidated matrix
/// and a column-major block with leading dimension equal to its row count on
/// layer 0, and `None` elsewhere.
pub fn gather_system<T: Element, U: Element, G: GridTopology>(
    a: &RowBlockMatrix<T>,
    b: &DenseBlock<U>,
    grid: &G,
) -> Result<Option<(RowBlockMatrix<T>, DenseBlock<U>)>, RedistributeError> {
    let system = gather_system_planned(a, b, grid)?;
    Ok(system.map(|(_, a2d, b2d)| (a2d, b2d)))
}

/// [`gather_system`] that also hands back the per-layer counts it exchanged,
/// so callers can report them without a second exchange.
pub fn gather_system_planned<T: Element, U: Element, G: GridTopology>(
    a: &RowBlockMatrix<T>,
    b: &DenseBlock<U>,
    grid: &G,
) -> Result<Option<(LayerPlan, RowBlockMatrix<T>, DenseBlock<U>)>, RedistributeError> {
    if b.nrows() != a.m_loc() {
        return Err(MatrixError::invalid(
            "b",
            format!("{} rows for a block with m_loc = {}", b.nrows(), a.m_loc()),
        )
        .into());
    }
    let plan = LayerPlan::collect(grid.depth(), a.nnz_loc(), a.m_loc())?;
    let a2d = consolidate(a, plan.as_ref(), grid)?;
    let b2d = gather_rhs_planned(plan.as_ref(), b, grid)?;
    Ok(match (plan, a2d, b2d) {
        (Some(plan), Some(a2d), Some(b2d)) => Some((plan, a2d, b2d)),
        _ => None,
    })
}

fn consolidate<T: Element, G: GridTopology>(
    a: &RowBlockMatrix<T>,
    plan: Option<&LayerPlan>,
    grid: &G,
) -> Result<Option<RowBlockMatrix<T>>, RedistributeError> {
    let depth = grid.depth();
    let nzval = depth.gatherv(a.nzval(), plan.map(LayerPlan::nnz), COORDINATOR)?;
    let colind = depth.gatherv(a.colind(), plan.map(LayerPlan::nnz), COORDINATOR)?;
    let tails = depth.gatherv(&a.rowptr()[1..], plan.map(LayerPlan::rows), COORDINATOR)?;

    let (Some(plan), Some(nzval), Some(colind), Some(tails)) = (plan, nzval, colind, tails) else {
        return Ok(None);
    };

    let mut rowptr = Vec::with_capacity(plan.total_rows() + 1);
    rowptr.push(0);
    for z in 0..plan.layers() {
        let base = plan.nnz().offset(z);
        rowptr.extend(tails[plan.rows().range(z)].iter().map(|&p| p + base));
    }

    let ranges = ContiguousRanges::exchange(grid.grid2d(), plan.total_rows())?;
    debug!(
        "2-D rank {} consolidated {} rows / {} non-zeros from {} layers, fst_row = {}",
        grid.grid2d_rank(),
        plan.total_rows(),
        plan.total_nnz(),
        plan.layers(),
        ranges.offset()
    );

    let a2d = RowBlockMatrix::new(a.nrow(), a.ncol(), ranges.offset(), rowptr, colind, nzval)?;
    Ok(Some(a2d))
}
