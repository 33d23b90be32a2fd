//! Column-major dense blocks with an explicit leading dimension.
//!
//! A [`DenseBlock`] holds the right-hand sides (or solutions) aligned with a
//! process's row block: `nrows` equals the matrix block's `m_loc`, and the
//! storage stride `ld` may exceed `nrows`, exactly like a LAPACK `B`/`LDB`
//! pair. Entry `(i, j)` lives at `data[i + j * ld]`.

use ndarray::{Array2, ArrayView2, ArrayViewMut2, ShapeBuilder};

use crate::matrix::MatrixError;

/// Column-major dense block with leading dimension `ld >= max(nrows, 1)`.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseBlock<T> {
    nrows: usize,
    ncols: usize,
    ld: usize,
    data: Vec<T>,
}

impl<T: Copy> DenseBlock<T> {
    /// Wrap column-major storage.
    pub fn new(nrows: usize, ncols: usize, ld: usize, data: Vec<T>) -> Result<Self, MatrixError> {
        if ld < nrows.max(1) {
            return Err(MatrixError::invalid(
                "ld",
                format!("leading dimension {ld} is smaller than max({nrows}, 1)"),
            ));
        }
        let required = storage_len(nrows, ncols, ld);
        if data.len() < required {
            return Err(MatrixError::invalid(
                "data",
                format!("{} elements cannot hold {nrows} x {ncols} with ld = {ld}", data.len()),
            ));
        }
        Ok(Self {
            nrows,
            ncols,
            ld,
            data,
        })
    }

    /// Fill a tightly packed block (`ld = max(nrows, 1)`) from `f(i, j)`.
    pub fn from_fn(nrows: usize, ncols: usize, mut f: impl FnMut(usize, usize) -> T) -> Self {
        let mut data = Vec::with_capacity(nrows * ncols);
        for j in 0..ncols {
            for i in 0..nrows {
                data.push(f(i, j));
            }
        }
        Self {
            nrows,
            ncols,
            ld: nrows.max(1),
            data,
        }
    }

    /// Fill a block with an explicit stride. Padding rows repeat the last
    /// entry of their column and carry no meaning.
    pub fn from_fn_with_stride(
        nrows: usize,
        ncols: usize,
        ld: usize,
        mut f: impl FnMut(usize, usize) -> T,
    ) -> Result<Self, MatrixError> {
        if ld < nrows.max(1) {
            return Err(MatrixError::invalid(
                "ld",
                format!("leading dimension {ld} is smaller than max({nrows}, 1)"),
            ));
        }
        let mut data = Vec::with_capacity(ld * ncols);
        for j in 0..ncols {
            for i in 0..nrows {
                data.push(f(i, j));
            }
            if let Some(&pad) = data.last() {
                data.extend(std::iter::repeat(pad).take(ld - nrows));
            }
        }
        Self::new(nrows, ncols, ld, data)
    }

    /// Copy an ndarray matrix into a block with stride `ld`.
    pub fn from_array(array: &Array2<T>, ld: usize) -> Result<Self, MatrixError> {
        let (nrows, ncols) = array.dim();
        Self::from_fn_with_stride(nrows, ncols, ld, |i, j| array[[i, j]])
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// Leading dimension (column stride) of the storage.
    pub fn ld(&self) -> usize {
        self.ld
    }

    /// Raw storage, including any padding rows.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn get(&self, i: usize, j: usize) -> T {
        self.data[i + j * self.ld]
    }

    pub fn set(&mut self, i: usize, j: usize, value: T) {
        self.data[i + j * self.ld] = value;
    }

    /// The `nrows` meaningful entries of column `j`.
    pub fn column(&self, j: usize) -> &[T] {
        if self.nrows == 0 {
            return &[];
        }
        &self.data[j * self.ld..j * self.ld + self.nrows]
    }

    /// Strided view of the logical `nrows x ncols` matrix.
    pub fn view(&self) -> ArrayView2<'_, T> {
        let data = &self.data[..storage_len(self.nrows, self.ncols, self.ld)];
        ArrayView2::from_shape((self.nrows, self.ncols).strides(self.strides()), data)
            .unwrap_or_else(|e| unreachable!("validated block layout rejected: {e}"))
    }

    /// Mutable strided view of the logical `nrows x ncols` matrix.
    pub fn view_mut(&mut self) -> ArrayViewMut2<'_, T> {
        let len = storage_len(self.nrows, self.ncols, self.ld);
        let (nrows, ncols, strides) = (self.nrows, self.ncols, self.strides());
        ArrayViewMut2::from_shape((nrows, ncols).strides(strides), &mut self.data[..len])
            .unwrap_or_else(|e| unreachable!("validated block layout rejected: {e}"))
    }

    /// Element strides for ndarray. Empty blocks have no storage, so their
    /// strides must be zero to pass the bounds check.
    fn strides(&self) -> (usize, usize) {
        if self.nrows == 0 || self.ncols == 0 {
            (0, 0)
        } else {
            (1, self.ld)
        }
    }

    /// Owned copy of the logical matrix.
    pub fn to_array(&self) -> Array2<T> {
        self.view().to_owned()
    }

    /// Column-major copy with stride `nrows` (no padding).
    pub fn to_compact(&self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.nrows * self.ncols);
        for j in 0..self.ncols {
            out.extend_from_slice(self.column(j));
        }
        out
    }

    /// Overwrite the logical entries from a compact column-major buffer,
    /// leaving padding rows untouched.
    pub fn copy_from_compact(&mut self, src: &[T]) -> Result<(), MatrixError> {
        if src.len() != self.nrows * self.ncols {
            return Err(MatrixError::invalid(
                "src",
                format!(
                    "{} elements for a {} x {} block",
                    src.len(),
                    self.nrows,
                    self.ncols
                ),
            ));
        }
        copy_block(self.nrows, self.ncols, &mut self.data, self.ld, src, self.nrows.max(1));
        Ok(())
    }

    /// Whether both blocks hold the same logical entries, bit for bit when
    /// `T` compares exactly. Strides and padding are ignored.
    pub fn same_entries(&self, other: &Self) -> bool
    where
        T: PartialEq,
    {
        self.nrows == other.nrows && self.ncols == other.ncols && self.view() == other.view()
    }
}

/// Minimum storage length of an `nrows x ncols` block with stride `ld`.
fn storage_len(nrows: usize, ncols: usize, ld: usize) -> usize {
    if nrows == 0 || ncols == 0 {
        0
    } else {
        ld * (ncols - 1) + nrows
    }
}

/// Copy an `n x m` column-major block between buffers with independent
/// leading dimensions.
pub(crate) fn copy_block<T: Copy>(
    n: usize,
    m: usize,
    dst: &mut [T],
    lddst: usize,
    src: &[T],
    ldsrc: usize,
) {
    if n == 0 {
        return;
    }
    for j in 0..m {
        dst[j * lddst..j * lddst + n].copy_from_slice(&src[j * ldsrc..j * ldsrc + n]);
    }
}
