//! Right-hand side gather and scatter across the depth dimension.
//!
//! The variable-length gather concatenates each layer's compacted block one
//! after the other, which is layer-block-major order: all columns of layer 0,
//! then all columns of layer 1, and so on. The coordinating layer re-blocks
//! that buffer into true column-major order with leading dimension equal to
//! the consolidated row count, so layer `z` occupies rows
//! `[row_disp[z], row_disp[z + 1])` of every column. The scatter applies the
//! exact inverse.

use strata_comm::{Communicator, Element, GridTopology, COORDINATOR};

use super::plan::LayerPlan;
use super::RedistributeError;
use crate::dense::{copy_block, DenseBlock};
use crate::matrix::{MatrixError, RowBlockMatrix};

/// Gather right-hand sides onto the coordinating layer.
///
/// `b` holds one row per local row of `a` and may use any leading dimension.
/// Collective over the depth communicator. Returns a column-major block with
/// `ld` equal to the consolidated row count on layer 0, `None` elsewhere.
pub fn gather_rhs<V, T: Element, G: GridTopology>(
    a: &RowBlockMatrix<V>,
    b: &DenseBlock<T>,
    grid: &G,
) -> Result<Option<DenseBlock<T>>, RedistributeError> {
    check_aligned(a, b)?;
    let plan = LayerPlan::collect(grid.depth(), a.nnz_loc(), a.m_loc())?;
    gather_rhs_planned(plan.as_ref(), b, grid)
}

/// Scatter consolidated right-hand sides (typically the solution) back to
/// every layer, writing into the caller's `b` at its own stride.
///
/// `a` and `b` are this process's 3-D block and its right-hand side block;
/// `consolidated` is `Some((a2d, b2d))` on the coordinating layer and `None`
/// elsewhere. Collective over the depth communicator.
pub fn scatter_rhs<V, T: Element, G: GridTopology>(
    consolidated: Option<(&RowBlockMatrix<V>, &DenseBlock<T>)>,
    a: &RowBlockMatrix<V>,
    b: &mut DenseBlock<T>,
    grid: &G,
) -> Result<(), RedistributeError> {
    check_aligned(a, b)?;
    let nrhs = b.ncols();
    if grid.is_coordinator() {
        let Some((a2d, b2d)) = consolidated else {
            return Err(MatrixError::invalid(
                "consolidated",
                "the coordinating layer must supply the consolidated matrix and block",
            )
            .into());
        };
        check_aligned(a2d, b2d)?;
        if b2d.ncols() != nrhs {
            return Err(MatrixError::invalid(
                "b2d",
                format!("{} columns but the local block has {nrhs}", b2d.ncols()),
            )
            .into());
        }
    }

    let plan = LayerPlan::collect(grid.depth(), a.nnz_loc(), a.m_loc())?;

    let staged = match (plan.as_ref(), consolidated) {
        (Some(plan), Some((_, b2d))) => {
            if plan.total_rows() != b2d.nrows() {
                return Err(MatrixError::invalid(
                    "b2d",
                    format!(
                        "{} rows but the layers own {} in total",
                        b2d.nrows(),
                        plan.total_rows()
                    ),
                )
                .into());
            }
            Some((layer_block_major(plan, b2d), plan.rhs(nrhs)))
        }
        _ => None,
    };

    let compact = grid.depth().scatterv(
        staged.as_ref().map(|(data, layout)| (data.as_slice(), layout)),
        a.m_loc() * nrhs,
        COORDINATOR,
    )?;
    b.copy_from_compact(&compact)?;
    Ok(())
}

pub(crate) fn gather_rhs_planned<T: Element, G: GridTopology>(
    plan: Option<&LayerPlan>,
    b: &DenseBlock<T>,
    grid: &G,
) -> Result<Option<DenseBlock<T>>, RedistributeError> {
    let nrhs = b.ncols();
    let layout = plan.map(|p| p.rhs(nrhs));
    let stacked = grid
        .depth()
        .gatherv(&b.to_compact(), layout.as_ref(), COORDINATOR)?;

    let (Some(plan), Some(stacked)) = (plan, stacked) else {
        return Ok(None);
    };

    let m2d = plan.total_rows();
    let mut data = Vec::with_capacity(m2d * nrhs);
    for j in 0..nrhs {
        for z in 0..plan.layers() {
            let rows = plan.rows().count(z);
            let start = nrhs * plan.rows().offset(z) + j * rows;
            data.extend_from_slice(&stacked[start..start + rows]);
        }
    }
    Ok(Some(DenseBlock::new(m2d, nrhs, m2d.max(1), data)?))
}

/// Copy a column-major consolidated block into layer-block-major order, each
/// layer's rows compacted with stride equal to its own row count.
fn layer_block_major<T: Element>(plan: &LayerPlan, b2d: &DenseBlock<T>) -> Vec<T> {
    let nrhs = b2d.ncols();
    let mut staged = b2d.to_compact();
    let src = b2d.as_slice();
    for z in 0..plan.layers() {
        let rows = plan.rows().count(z);
        let first = plan.rows().offset(z);
        let dst = &mut staged[nrhs * first..nrhs * (first + rows)];
        let src = &src[first.min(src.len())..];
        copy_block(rows, nrhs, dst, rows, src, b2d.ld());
    }
    staged
}

fn check_aligned<V, T: Element>(
    a: &RowBlockMatrix<V>,
    b: &DenseBlock<T>,
) -> Result<(), MatrixError> {
    if b.nrows() != a.m_loc() {
        return Err(MatrixError::invalid(
            "b",
            format!("{} rows for a block with m_loc = {}", b.nrows(), a.m_loc()),
        ));
    }
    Ok(())
}
