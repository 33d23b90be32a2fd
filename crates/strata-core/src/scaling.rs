//! Power-of-radix row and column equilibration.
//!
//! Scale factors are rounded to powers of the floating-point radix, so
//! applying them to the matrix changes only exponents and never introduces
//! rounding error. The matrix is row-distributed over one communicator. Each
//! process measures its own rows, the column maxima are combined by an
//! element-wise reduction, and the global row-scale vector is assembled from
//! every process's contiguous piece.
//!
//! # Algorithm
//!
//! 1. `r_i = max_j |a_ij|`, rounded down to a power of the radix.
//! 2. Global `max`/`min` of `r`; a zero minimum means an empty row.
//! 3. `r_i = 1 / clamp(r_i, safe_min, safe_max)`.
//! 4. `c_j = max_i |a_ij| r_i`, rounded up to a covering power of the radix,
//!    then reduced with `max` across processes.
//! 5. Same zero check, inversion and condition ratio for `c`.

use std::ops::Mul;

use log::{debug, warn};
use strata_comm::{CommError, Communicator, ReduceOp};
use thiserror::Error;

use crate::matrix::{MatrixError, RowBlockMatrix};
use crate::redistribute::ContiguousRanges;
use crate::scalar::{RealScalar, Scalar};

/// Errors raised while computing scale factors.
#[derive(Debug, Error)]
pub enum ScalingError {
    #[error(transparent)]
    InvalidArgument(#[from] MatrixError),

    /// A row or column holds no non-zero entry. `index` is 1-based: rows are
    /// `1..=nrow`, columns `nrow + 1..=nrow + ncol`.
    #[error(
        "Structurally singular: {} {} is exactly zero (index {index})",
        kind(.index, .nrow),
        position(.index, .nrow)
    )]
    StructuralSingularity { index: usize, nrow: usize },

    #[error("Communication failed: {0}")]
    Comm(#[from] CommError),
}

fn kind(index: &usize, nrow: &usize) -> &'static str {
    if index <= nrow {
        "row"
    } else {
        "column"
    }
}

fn position(&index: &usize, &nrow: &usize) -> usize {
    if index <= nrow {
        index - 1
    } else {
        index - nrow - 1
    }
}

/// Row and column scale factors with their condition ratios.
///
/// `row_scale` and `col_scale` are global vectors, identical on every process.
#[derive(Debug, Clone, PartialEq)]
pub struct Equilibration<R> {
    pub row_scale: Vec<R>,
    pub col_scale: Vec<R>,
    /// Ratio of the smallest to the largest row scale.
    pub rowcnd: R,
    /// Ratio of the smallest to the largest column scale.
    pub colcnd: R,
    /// Largest absolute entry, after rounding to a power of the radix.
    pub amax: R,
}

impl<R: RealScalar> Equilibration<R> {
    /// Scale the locally owned block: `a_ij * r_i * c_j`.
    ///
    /// Because every factor is a power of the radix the result is exact
    /// unless it under- or overflows.
    pub fn scale_block<T>(&self, a: &RowBlockMatrix<T>) -> Result<RowBlockMatrix<T>, MatrixError>
    where
        T: Scalar<Real = R> + Mul<R, Output = T>,
    {
        if a.nrow() != self.row_scale.len() || a.ncol() != self.col_scale.len() {
            return Err(MatrixError::invalid(
                "a",
                format!(
                    "{} x {} block for {} x {} scale factors",
                    a.nrow(),
                    a.ncol(),
                    self.row_scale.len(),
                    self.col_scale.len()
                ),
            ));
        }
        let mut nzval = Vec::with_capacity(a.nnz_loc());
        for (i, global) in a.global_rows().enumerate() {
            let r = self.row_scale[global];
            let (cols, vals) = a.row(i);
            nzval.extend(
                cols.iter()
                    .zip(vals)
                    .map(|(&j, &v)| v * r * self.col_scale[j]),
            );
        }
        RowBlockMatrix::new(
            a.nrow(),
            a.ncol(),
            a.fst_row(),
            a.rowptr().to_vec(),
            a.colind().to_vec(),
            nzval,
        )
    }
}

/// Compute power-of-radix equilibration factors for a row-distributed matrix.
///
/// Collective over `comm`, the communicator across which the rows of `a` are
/// distributed. Every process receives the same result or the same error.
///
/// # Arguments
/// * `a` - This process's row block.
/// * `radix` - Base of the scale factors; [`RealScalar::RADIX`] gives exact
///   scaling.
/// * `comm` - Communicator over the processes sharing the rows of `a`.
pub fn equilibrate<T, C>(
    a: &RowBlockMatrix<T>,
    radix: T::Real,
    comm: &C,
) -> Result<Equilibration<T::Real>, ScalingError>
where
    T: Scalar,
    C: Communicator,
{
    let one = T::Real::one();
    let zero = T::Real::zero();
    if !radix.is_finite() || !(radix > one) {
        return Err(
            MatrixError::invalid("radix", format!("{radix} is not a finite value above 1")).into(),
        );
    }

    let (nrow, ncol) = (a.nrow(), a.ncol());
    if nrow == 0 || ncol == 0 {
        return Ok(Equilibration {
            row_scale: Vec::new(),
            col_scale: Vec::new(),
            rowcnd: one,
            colcnd: one,
            amax: zero,
        });
    }

    let smlnum = T::Real::safe_min();
    let bignum = T::Real::safe_max();

    // Row pass.
    let mut r: Vec<T::Real> = (0..a.m_loc())
        .map(|i| {
            let (_, vals) = a.row(i);
            vals.iter()
                .fold(zero, |acc, &v| acc.max(v.abs1()))
                .round_down_to_power(radix)
        })
        .collect();

    let (local_max, local_min) = extremes(&r, zero, bignum);
    let rcmax = comm.all_reduce(local_max, ReduceOp::Max)?;
    let rcmin = comm.all_reduce(local_min, ReduceOp::Min)?;
    let amax = rcmax;
    debug!("row scale range [{rcmin}, {rcmax}] over {nrow} rows");

    if rcmin == zero {
        let first = first_zero(&r, zero, a.fst_row());
        let index = comm.all_reduce(first, ReduceOp::Min)?;
        return Err(singular(index, nrow));
    }
    for v in &mut r {
        *v = invert_clamped(*v, smlnum, bignum);
    }
    let rowcnd = rcmin.max(smlnum) / rcmax.min(bignum);

    // Column pass, under the row scaling just computed.
    let mut c = vec![zero; ncol];
    for (i, &ri) in r.iter().enumerate() {
        let (cols, vals) = a.row(i);
        for (&j, &v) in cols.iter().zip(vals) {
            c[j] = c[j].max(v.abs1() * ri);
        }
    }
    for v in &mut c {
        *v = v.round_up_to_power(radix);
    }
    comm.all_reduce_elementwise(&mut c, ReduceOp::Max)?;

    let (ccmax, ccmin) = extremes(&c, zero, bignum);
    debug!("column scale range [{ccmin}, {ccmax}] over {ncol} columns");
    if ccmin == zero {
        // Identical on every process after the reduction.
        let j = c.iter().position(|&v| v == zero).unwrap_or(0);
        return Err(singular(nrow + j, nrow));
    }
    for v in &mut c {
        *v = invert_clamped(*v, smlnum, bignum);
    }
    let colcnd = ccmin.max(smlnum) / ccmax.min(bignum);

    let ranges = ContiguousRanges::exchange(comm, r.len())?;
    if ranges.total() != nrow {
        return Err(MatrixError::invalid(
            "a",
            format!("row blocks cover {} of {nrow} global rows", ranges.total()),
        )
        .into());
    }
    let row_scale = ranges.assemble(comm, &r)?;

    Ok(Equilibration {
        row_scale,
        col_scale: c,
        rowcnd,
        colcnd,
        amax,
    })
}

/// `(max, min)` of `values`, with `min` starting from `ceiling` so that an
/// empty local slice does not affect a global minimum.
fn extremes<R: RealScalar>(values: &[R], zero: R, ceiling: R) -> (R, R) {
    values
        .iter()
        .fold((zero, ceiling), |(hi, lo), &v| (hi.max(v), lo.min(v)))
}

/// Global index of the first zero entry, or `usize::MAX` when there is none.
fn first_zero<R: RealScalar>(values: &[R], zero: R, offset: usize) -> usize {
    values
        .iter()
        .position(|&v| v == zero)
        .map_or(usize::MAX, |i| offset + i)
}

fn invert_clamped<R: RealScalar>(v: R, smlnum: R, bignum: R) -> R {
    R::one() / v.max(smlnum).min(bignum)
}

/// Build the singularity error for 0-based global position `pos` (columns
/// already offset by `nrow`).
fn singular(pos: usize, nrow: usize) -> ScalingError {
    warn!(
        "structurally singular matrix: scale factor {} of {} rows and columns is zero",
        pos + 1,
        nrow
    );
    ScalingError::StructuralSingularity {
        index: pos + 1,
        nrow,
    }
}
