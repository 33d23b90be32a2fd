//! Row-distributed sparse matrix.
//!
//! Each process owns a contiguous block of global rows `[fst_row,
//! fst_row + m_loc)` stored in compressed sparse row form with zero-based
//! column indices. Row ranges of all processes partition `[0, nrow)` exactly
//! once, in rank order.

use std::ops::Range;

use thiserror::Error;

/// Errors describing malformed matrix or block arguments.
///
/// These are detected locally, before any communication takes place.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatrixError {
    #[error("Invalid argument `{arg}`: {reason}")]
    InvalidArgument { arg: &'static str, reason: String },
}

impl MatrixError {
    pub(crate) fn invalid(arg: &'static str, reason: impl Into<String>) -> Self {
        MatrixError::InvalidArgument {
            arg,
            reason: reason.into(),
        }
    }
}

/// The locally owned row block of a distributed sparse matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct RowBlockMatrix<T> {
    nrow: usize,
    ncol: usize,
    fst_row: usize,
    rowptr: Vec<usize>,
    colind: Vec<usize>,
    nzval: Vec<T>,
}

impl<T: Copy> RowBlockMatrix<T> {
    /// Assemble a row block, validating its structure.
    ///
    /// # Arguments
    /// * `nrow`, `ncol` - Global dimensions of the distributed matrix.
    /// * `fst_row` - Global index of the first locally owned row.
    /// * `rowptr` - `m_loc + 1` offsets into `colind`/`nzval`.
    /// * `colind` - Zero-based global column index of each stored entry.
    /// * `nzval` - Stored values, packed by row.
    pub fn new(
        nrow: usize,
        ncol: usize,
        fst_row: usize,
        rowptr: Vec<usize>,
        colind: Vec<usize>,
        nzval: Vec<T>,
    ) -> Result<Self, MatrixError> {
        let matrix = Self {
            nrow,
            ncol,
            fst_row,
            rowptr,
            colind,
            nzval,
        };
        matrix.validate()?;
        Ok(matrix)
    }

    /// Build a whole matrix (a single block owning every row) from
    /// `(row, col, value)` triplets. Entries keep their input order within a
    /// row; duplicates are stored as given.
    pub fn from_triplets(
        nrow: usize,
        ncol: usize,
        triplets: &[(usize, usize, T)],
    ) -> Result<Self, MatrixError> {
        let mut counts = vec![0usize; nrow];
        for &(i, j, _) in triplets {
            if i >= nrow {
                return Err(MatrixError::invalid(
                    "triplets",
                    format!("row {i} out of range for {nrow} rows"),
                ));
            }
            if j >= ncol {
                return Err(MatrixError::invalid(
                    "triplets",
                    format!("column {j} out of range for {ncol} columns"),
                ));
            }
            counts[i] += 1;
        }

        let mut rowptr = Vec::with_capacity(nrow + 1);
        rowptr.push(0);
        for &c in &counts {
            rowptr.push(rowptr[rowptr.len() - 1] + c);
        }

        let mut next = rowptr.clone();
        let mut slots: Vec<Option<(usize, T)>> = vec![None; triplets.len()];
        for &(i, j, v) in triplets {
            slots[next[i]] = Some((j, v));
            next[i] += 1;
        }
        let (colind, nzval) = slots.into_iter().flatten().unzip();

        Self::new(nrow, ncol, 0, rowptr, colind, nzval)
    }

    /// Extract local rows `rows` (relative to this block) as a new block.
    ///
    /// Used to hand each process its share of a matrix that is known in full.
    pub fn row_block(&self, rows: Range<usize>) -> Result<Self, MatrixError> {
        if rows.start > rows.end || rows.end > self.m_loc() {
            return Err(MatrixError::invalid(
                "rows",
                format!(
                    "range {}..{} exceeds the {} local rows",
                    rows.start,
                    rows.end,
                    self.m_loc()
                ),
            ));
        }
        let lo = self.rowptr[rows.start];
        let hi = self.rowptr[rows.end];
        let rowptr = self.rowptr[rows.start..=rows.end]
            .iter()
            .map(|&p| p - lo)
            .collect();
        Self::new(
            self.nrow,
            self.ncol,
            self.fst_row + rows.start,
            rowptr,
            self.colind[lo..hi].to_vec(),
            self.nzval[lo..hi].to_vec(),
        )
    }

    /// Check the structural invariants of the block.
    pub fn validate(&self) -> Result<(), MatrixError> {
        let Some((&first, _)) = self.rowptr.split_first() else {
            return Err(MatrixError::invalid("rowptr", "must hold m_loc + 1 entries"));
        };
        if first != 0 {
            return Err(MatrixError::invalid(
                "rowptr",
                format!("rowptr[0] must be 0, found {first}"),
            ));
        }
        if let Some(i) = self.rowptr.windows(2).position(|w| w[1] < w[0]) {
            return Err(MatrixError::invalid(
                "rowptr",
                format!("decreases between local rows {i} and {}", i + 1),
            ));
        }
        let nnz = self.nzval.len();
        if self.rowptr[self.m_loc()] != nnz {
            return Err(MatrixError::invalid(
                "rowptr",
                format!(
                    "rowptr[m_loc] = {} but {nnz} values are stored",
                    self.rowptr[self.m_loc()]
                ),
            ));
        }
        if self.colind.len() != nnz {
            return Err(MatrixError::invalid(
                "colind",
                format!("{} indices for {nnz} values", self.colind.len()),
            ));
        }
        if let Some(&j) = self.colind.iter().find(|&&j| j >= self.ncol) {
            return Err(MatrixError::invalid(
                "colind",
                format!("column {j} out of range for {} columns", self.ncol),
            ));
        }
        if self.fst_row + self.m_loc() > self.nrow {
            return Err(MatrixError::invalid(
                "fst_row",
                format!(
                    "rows {}..{} exceed the {} global rows",
                    self.fst_row,
                    self.fst_row + self.m_loc(),
                    self.nrow
                ),
            ));
        }
        Ok(())
    }
}

impl<T> RowBlockMatrix<T> {
    /// Global number of rows.
    pub fn nrow(&self) -> usize {
        self.nrow
    }

    /// Global number of columns.
    pub fn ncol(&self) -> usize {
        self.ncol
    }

    /// Global index of the first locally owned row.
    pub fn fst_row(&self) -> usize {
        self.fst_row
    }

    /// Number of locally owned rows.
    pub fn m_loc(&self) -> usize {
        self.rowptr.len().saturating_sub(1)
    }

    /// Number of locally stored entries.
    pub fn nnz_loc(&self) -> usize {
        self.nzval.len()
    }

    /// Global row range owned by this block.
    pub fn global_rows(&self) -> Range<usize> {
        self.fst_row..self.fst_row + self.m_loc()
    }

    pub fn rowptr(&self) -> &[usize] {
        &self.rowptr
    }

    pub fn colind(&self) -> &[usize] {
        &self.colind
    }

    pub fn nzval(&self) -> &[T] {
        &self.nzval
    }

    /// Column indices and values of local row `i`.
    pub fn row(&self, i: usize) -> (&[usize], &[T]) {
        let span = self.rowptr[i]..self.rowptr[i + 1];
        (&self.colind[span.clone()], &self.nzval[span])
    }

    /// Decompose into `(nrow, ncol, fst_row, rowptr, colind, nzval)`.
    pub fn into_parts(self) -> (usize, usize, usize, Vec<usize>, Vec<usize>, Vec<T>) {
        (
            self.nrow,
            self.ncol,
            self.fst_row,
            self.rowptr,
            self.colind,
            self.nzval,
        )
    }
}

/// Split `n` items into `parts` contiguous, balanced ranges.
///
/// The first `n % parts` ranges receive one extra item. Ranges may be empty
/// when `parts > n`.
pub fn block_partition(n: usize, parts: usize) -> Vec<Range<usize>> {
    if parts == 0 {
        return Vec::new();
    }
    let base = n / parts;
    let rem = n % parts;
    let mut cursor = 0usize;
    (0..parts)
        .map(|p| {
            let len = base + usize::from(p < rem);
            let range = cursor..cursor + len;
            cursor += len;
            range
        })
        .collect()
}

/// Check that `ranges`, in order, tile `[0, n)` exactly once.
pub fn tiles_exactly(ranges: &[Range<usize>], n: usize) -> bool {
    let mut cursor = 0usize;
    for r in ranges {
        if r.start != cursor || r.end < r.start {
            return false;
        }
        cursor = r.end;
    }
    cursor == n
}
