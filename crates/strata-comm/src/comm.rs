//! Communicator trait and the blocking collectives built on it.
//!
//! The [`Communicator`] trait abstracts over the transport (a single process,
//! a group of threads, or a message-passing library) so that the
//! redistribution and scaling code in `strata-core` stays transport-agnostic.
//!
//! A backend implements a single primitive, [`Communicator::exchange`]: every
//! rank posts an optional payload and then inspects the full set of posted
//! payloads. All other collectives are provided on top of it and may be
//! overridden by backends with native equivalents.
//!
//! Every collective is blocking and must be entered by all ranks of the
//! communicator, in the same order, with matching shapes. A rank that skips a
//! call leaves the others waiting forever; there is no timeout.

use std::any::Any;
use std::ops::{Add, Range};

use thiserror::Error;

/// Errors a communicator can detect while running a collective.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommError {
    #[error("Root rank {root} is outside a communicator of size {size}")]
    InvalidRoot { root: usize, size: usize },

    #[error("Rank {rank} posted a payload of a different type")]
    TypeMismatch { rank: usize },

    #[error("Rank {rank} posted no payload to a collective that requires one")]
    MissingPayload { rank: usize },

    #[error("Rank {rank} sent {sent} elements but the layout expects {expected}")]
    CountMismatch {
        rank: usize,
        sent: usize,
        expected: usize,
    },

    #[error("Layout describes {layout} ranks but the communicator has {size}")]
    LayoutSize { layout: usize, size: usize },

    #[error("Root rank {root} did not supply a transfer layout")]
    MissingLayout { root: usize },

    #[error("Element-wise reduction over buffers of length {expected} and {found}")]
    LengthMismatch { expected: usize, found: usize },

    #[error("Grid shape mismatch: {0}")]
    GridShape(String),

    #[error("Backend not available: {0}")]
    Unavailable(String),
}

/// Plain-old-data element that can travel through a collective.
pub trait Element: Copy + Send + Sync + 'static {}

impl<T: Copy + Send + Sync + 'static> Element for T {}

/// Element type that supports the reductions in [`ReduceOp`].
pub trait Reducible: Element + PartialOrd + Add<Output = Self> {}

impl<T: Element + PartialOrd + Add<Output = T>> Reducible for T {}

/// Reduction operator for [`Communicator::all_reduce`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOp {
    Max,
    Min,
    Sum,
}

impl ReduceOp {
    /// Combine two operands.
    pub fn apply<T: Reducible>(self, a: T, b: T) -> T {
        match self {
            ReduceOp::Max => {
                if b > a {
                    b
                } else {
                    a
                }
            }
            ReduceOp::Min => {
                if b < a {
                    b
                } else {
                    a
                }
            }
            ReduceOp::Sum => a + b,
        }
    }
}

/// Transfer-size table for variable-length collectives.
///
/// Holds one count per rank plus the exclusive prefix sums of those counts,
/// so that `displs[0] == 0` and `displs[k + 1] == displs[k] + counts[k]`. The
/// final displacement is the total element count.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Layout {
    counts: Vec<usize>,
    displs: Vec<usize>,
}

impl Layout {
    /// Build a layout from per-rank counts.
    pub fn from_counts(counts: Vec<usize>) -> Self {
        let mut displs = Vec::with_capacity(counts.len() + 1);
        let mut acc = 0usize;
        displs.push(acc);
        for &count in &counts {
            acc += count;
            displs.push(acc);
        }
        Self { counts, displs }
    }

    /// Number of ranks described.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn count(&self, rank: usize) -> usize {
        self.counts[rank]
    }

    pub fn offset(&self, rank: usize) -> usize {
        self.displs[rank]
    }

    /// Element range owned by `rank` inside the concatenated buffer.
    pub fn range(&self, rank: usize) -> Range<usize> {
        self.displs[rank]..self.displs[rank + 1]
    }

    /// Total number of elements across all ranks.
    pub fn total(&self) -> usize {
        self.displs[self.counts.len()]
    }

    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    /// Displacements, `len() + 1` entries long.
    pub fn displs(&self) -> &[usize] {
        &self.displs
    }

    /// The same layout with every count multiplied by `factor`.
    ///
    /// Used to turn a row layout into the layout of a block with `factor`
    /// columns stored rank after rank.
    pub fn scaled(&self, factor: usize) -> Self {
        Self::from_counts(self.counts.iter().map(|&c| c * factor).collect())
    }
}

/// A group of ranks that can run blocking collectives together.
pub trait Communicator: Send + Sync {
    /// Rank of the calling process within this communicator.
    fn rank(&self) -> usize;

    /// Number of ranks in this communicator.
    fn size(&self) -> usize;

    /// Post `send` (or nothing) and hand the payloads posted by every rank,
    /// indexed by rank, to `read`.
    ///
    /// This is the one primitive a backend has to provide. The returned value
    /// is whatever `read` produced on this rank. A payload whose type differs
    /// from `P` yields [`CommError::TypeMismatch`] without calling `read`.
    fn exchange<P, R, F>(&self, send: Option<P>, read: F) -> Result<R, CommError>
    where
        P: Any + Send,
        F: FnOnce(&[Option<&P>]) -> Result<R, CommError>;

    /// Block until every rank has arrived.
    fn barrier(&self) -> Result<(), CommError> {
        self.exchange::<(), _, _>(None, |_| Ok(()))
    }

    /// Collect one value from every rank onto `root`.
    ///
    /// Returns `Some` on the root and `None` elsewhere.
    fn gather<T: Element>(&self, value: T, root: usize) -> Result<Option<Vec<T>>, CommError> {
        check_root(root, self.size())?;
        let me = self.rank();
        self.exchange(Some(value), |posted| {
            if me != root {
                return Ok(None);
            }
            collect_values(posted).map(Some)
        })
    }

    /// Collect one value from every rank onto every rank.
    fn all_gather<T: Element>(&self, value: T) -> Result<Vec<T>, CommError> {
        self.exchange(Some(value), collect_values)
    }

    /// Concatenate variable-length buffers onto `root` in rank order.
    ///
    /// The root supplies the transfer layout; other ranks may pass `None`.
    /// Every rank's contribution must match its count in the layout.
    fn gatherv<T: Element>(
        &self,
        send: &[T],
        layout: Option<&Layout>,
        root: usize,
    ) -> Result<Option<Vec<T>>, CommError> {
        check_root(root, self.size())?;
        let me = self.rank();
        let size = self.size();
        self.exchange(Some(send.to_vec()), |posted| {
            if me != root {
                return Ok(None);
            }
            let layout = layout.ok_or(CommError::MissingLayout { root })?;
            concat_by_layout(posted, layout, size).map(Some)
        })
    }

    /// Split the root's buffer by `layout` and hand each rank its piece.
    ///
    /// Only the root passes `send`; every rank states how many elements it
    /// expects to receive.
    fn scatterv<T: Element>(
        &self,
        send: Option<(&[T], &Layout)>,
        recv_len: usize,
        root: usize,
    ) -> Result<Vec<T>, CommError> {
        check_root(root, self.size())?;
        let me = self.rank();
        let size = self.size();
        let payload = if me == root {
            send.map(|(data, layout)| (data.to_vec(), layout.clone()))
        } else {
            None
        };
        self.exchange(payload, |posted| {
            let (data, layout) = posted[root].ok_or(CommError::MissingLayout { root })?;
            if layout.len() != size {
                return Err(CommError::LayoutSize {
                    layout: layout.len(),
                    size,
                });
            }
            if layout.total() > data.len() {
                return Err(CommError::CountMismatch {
                    rank: root,
                    sent: data.len(),
                    expected: layout.total(),
                });
            }
            if layout.count(me) != recv_len {
                return Err(CommError::CountMismatch {
                    rank: me,
                    sent: layout.count(me),
                    expected: recv_len,
                });
            }
            Ok(data[layout.range(me)].to_vec())
        })
    }

    /// Concatenate variable-length buffers onto every rank in rank order.
    fn all_gatherv<T: Element>(&self, send: &[T], layout: &Layout) -> Result<Vec<T>, CommError> {
        let size = self.size();
        self.exchange(Some(send.to_vec()), |posted| {
            concat_by_layout(posted, layout, size)
        })
    }

    /// Reduce one value across all ranks; every rank receives the result.
    ///
    /// Operands are combined in rank order, so every rank sees a bitwise
    /// identical result even for floating-point sums.
    fn all_reduce<T: Reducible>(&self, value: T, op: ReduceOp) -> Result<T, CommError> {
        self.exchange(Some(value), |posted| {
            let values = collect_values(posted)?;
            Ok(values
                .into_iter()
                .reduce(|acc, v| op.apply(acc, v))
                .unwrap_or(value))
        })
    }

    /// Element-wise reduction of equally long buffers, in place.
    fn all_reduce_elementwise<T: Reducible>(
        &self,
        buf: &mut [T],
        op: ReduceOp,
    ) -> Result<(), CommError> {
        let expected = buf.len();
        let reduced = self.exchange(Some(buf.to_vec()), |posted| {
            let mut acc: Option<Vec<T>> = None;
            for (rank, slot) in posted.iter().enumerate() {
                let part = slot.ok_or(CommError::MissingPayload { rank })?;
                if part.len() != expected {
                    return Err(CommError::LengthMismatch {
                        expected,
                        found: part.len(),
                    });
                }
                acc = Some(match acc {
                    None => part.clone(),
                    Some(mut acc) => {
                        for (a, &b) in acc.iter_mut().zip(part.iter()) {
                            *a = op.apply(*a, b);
                        }
                        acc
                    }
                });
            }
            Ok(acc)
        })?;
        if let Some(reduced) = reduced {
            buf.copy_from_slice(&reduced);
        }
        Ok(())
    }
}

fn check_root(root: usize, size: usize) -> Result<(), CommError> {
    if root >= size {
        return Err(CommError::InvalidRoot { root, size });
    }
    Ok(())
}

fn collect_values<T: Element>(posted: &[Option<&T>]) -> Result<Vec<T>, CommError> {
    posted
        .iter()
        .enumerate()
        .map(|(rank, slot)| slot.copied().ok_or(CommError::MissingPayload { rank }))
        .collect()
}

fn concat_by_layout<T: Element>(
    posted: &[Option<&Vec<T>>],
    layout: &Layout,
    size: usize,
) -> Result<Vec<T>, CommError> {
    if layout.len() != size {
        return Err(CommError::LayoutSize {
            layout: layout.len(),
            size,
        });
    }
    // Contributions are appended in rank order, which places each one at its
    // displacement because displacements are the prefix sums of the counts.
    let mut out = Vec::with_capacity(layout.total());
    for (rank, slot) in posted.iter().enumerate() {
        let part = slot.ok_or(CommError::MissingPayload { rank })?;
        if part.len() != layout.count(rank) {
            return Err(CommError::CountMismatch {
                rank,
                sent: part.len(),
                expected: layout.count(rank),
            });
        }
        out.extend_from_slice(part);
    }
    Ok(out)
}
