//! Single-process communicator.

use std::any::Any;

use crate::comm::{CommError, Communicator};

/// Communicator containing only the calling process.
///
/// Every collective degenerates to a local copy. Useful for running the
/// layered routines on a grid of depth one without any threading.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelfComm;

impl Communicator for SelfComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn exchange<P, R, F>(&self, send: Option<P>, read: F) -> Result<R, CommError>
    where
        P: Any + Send,
        F: FnOnce(&[Option<&P>]) -> Result<R, CommError>,
    {
        read(&[send.as_ref()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::{Layout, ReduceOp};

    #[test]
    fn test_self_gatherv_is_copy() {
        let comm = SelfComm;
        let layout = Layout::from_counts(vec![3]);
        let out = comm.gatherv(&[1, 2, 3], Some(&layout), 0).unwrap();
        assert_eq!(out, Some(vec![1, 2, 3]));
    }

    #[test]
    fn test_self_reduce_returns_input() {
        let comm = SelfComm;
        assert_eq!(comm.all_reduce(4.5, ReduceOp::Max).unwrap(), 4.5);
        let mut buf = [1.0, 0.0, 2.0];
        comm.all_reduce_elementwise(&mut buf, ReduceOp::Max).unwrap();
        assert_eq!(buf, [1.0, 0.0, 2.0]);
    }

    #[test]
    fn test_self_rejects_foreign_root() {
        let comm = SelfComm;
        let err = comm.gather(1u8, 2).unwrap_err();
        assert_eq!(err, CommError::InvalidRoot { root: 2, size: 1 });
    }
}
