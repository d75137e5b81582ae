//! Process-parallel communication seam.
//!
//! Plans talk to the message-passing substrate through the [`Comm`]
//! trait: an SPMD endpoint with a rank, a size, and the four collectives
//! the solvers need. Every rank must enter collectives in the same order;
//! all operations are blocking-semantic. Two backends are provided:
//! [`LocalComm`] runs the ranks as threads of one process (the default
//! test backend and the `P = 1` production case), and `MpiComm` (feature
//! `mpi`) binds to an MPI runtime.

use crate::error::TdError;

pub mod local_comm;
pub use local_comm::LocalComm;

#[cfg(feature = "mpi")]
pub mod mpi_comm;
#[cfg(feature = "mpi")]
pub use mpi_comm::MpiComm;

pub trait Comm {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    fn barrier(&self) -> Result<(), TdError>;

    /// Equal-count gather: every rank contributes `send`; on `root`,
    /// `recv` (length `size() * send.len()`) receives the contributions
    /// in rank order. `recv` is ignored on other ranks.
    fn gather_into(
        &self,
        send: &[f64],
        recv: Option<&mut [f64]>,
        root: usize,
    ) -> Result<(), TdError>;

    /// Equal-count scatter: `root` provides `send` (length
    /// `size() * recv.len()`); every rank receives its rank-order chunk
    /// in `recv`. `send` is ignored on other ranks.
    fn scatter_from(
        &self,
        send: Option<&[f64]>,
        recv: &mut [f64],
        root: usize,
    ) -> Result<(), TdError>;

    /// All-gather of one element count per rank.
    fn all_gather_counts(&self, count: usize, recv: &mut [usize]) -> Result<(), TdError>;

    /// Variable-count all-to-all: the segment of `send` at
    /// `send_displs[k] .. send_displs[k] + send_counts[k]` goes to rank
    /// `k` and lands in its `recv` at `recv_displs[self] ..`. Counts and
    /// displacements are element counts.
    #[allow(clippy::too_many_arguments)]
    fn all_to_all_v(
        &self,
        send: &[f64],
        send_counts: &[usize],
        send_displs: &[usize],
        recv: &mut [f64],
        recv_counts: &[usize],
        recv_displs: &[usize],
    ) -> Result<(), TdError>;
}

impl<C: Comm + ?Sized> Comm for &C {
    fn rank(&self) -> usize {
        (**self).rank()
    }
    fn size(&self) -> usize {
        (**self).size()
    }
    fn barrier(&self) -> Result<(), TdError> {
        (**self).barrier()
    }
    fn gather_into(
        &self,
        send: &[f64],
        recv: Option<&mut [f64]>,
        root: usize,
    ) -> Result<(), TdError> {
        (**self).gather_into(send, recv, root)
    }
    fn scatter_from(
        &self,
        send: Option<&[f64]>,
        recv: &mut [f64],
        root: usize,
    ) -> Result<(), TdError> {
        (**self).scatter_from(send, recv, root)
    }
    fn all_gather_counts(&self, count: usize, recv: &mut [usize]) -> Result<(), TdError> {
        (**self).all_gather_counts(count, recv)
    }
    fn all_to_all_v(
        &self,
        send: &[f64],
        send_counts: &[usize],
        send_displs: &[usize],
        recv: &mut [f64],
        recv_counts: &[usize],
        recv_displs: &[usize],
    ) -> Result<(), TdError> {
        (**self).all_to_all_v(send, send_counts, send_displs, recv, recv_counts, recv_displs)
    }
}
