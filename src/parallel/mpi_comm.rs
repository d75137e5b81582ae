// MPI-backed communicator (rsmpi)

use mpi::datatype::{Partition, PartitionMut};
use mpi::environment::Universe;
use mpi::topology::SimpleCommunicator;
use mpi::traits::*;

use crate::error::TdError;
use crate::parallel::Comm;

pub struct MpiComm {
    _universe: Universe,
    world: SimpleCommunicator,
    rank: usize,
    size: usize,
}

impl MpiComm {
    /// Initialize the MPI runtime and bind to the world communicator.
    /// The runtime is finalized when the communicator is dropped.
    pub fn new() -> Result<Self, TdError> {
        let universe = mpi::initialize()
            .ok_or_else(|| TdError::Transport("MPI runtime already initialized".into()))?;
        let world = universe.world();
        let rank = world.rank() as usize;
        let size = world.size() as usize;
        Ok(MpiComm {
            _universe: universe,
            world,
            rank,
            size,
        })
    }
}

impl Comm for MpiComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn barrier(&self) -> Result<(), TdError> {
        self.world.barrier();
        Ok(())
    }

    fn gather_into(
        &self,
        send: &[f64],
        recv: Option<&mut [f64]>,
        root: usize,
    ) -> Result<(), TdError> {
        let root_process = self.world.process_at_rank(root as i32);
        if self.rank == root {
            let recv = recv.ok_or_else(|| {
                TdError::Config("gather root called without a receive buffer".into())
            })?;
            root_process.gather_into_root(send, recv);
        } else {
            root_process.gather_into(send);
        }
        Ok(())
    }

    fn scatter_from(
        &self,
        send: Option<&[f64]>,
        recv: &mut [f64],
        root: usize,
    ) -> Result<(), TdError> {
        let root_process = self.world.process_at_rank(root as i32);
        if self.rank == root {
            let send = send.ok_or_else(|| {
                TdError::Config("scatter root called without a send buffer".into())
            })?;
            root_process.scatter_into_root(send, recv);
        } else {
            root_process.scatter_into(recv);
        }
        Ok(())
    }

    fn all_gather_counts(&self, count: usize, recv: &mut [usize]) -> Result<(), TdError> {
        let mut buf = vec![0i64; self.size];
        self.world.all_gather_into(&(count as i64), &mut buf[..]);
        for (slot, v) in recv.iter_mut().zip(buf.iter()) {
            *slot = *v as usize;
        }
        Ok(())
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
        let scounts: Vec<i32> = send_counts.iter().map(|&c| c as i32).collect();
        let sdispls: Vec<i32> = send_displs.iter().map(|&d| d as i32).collect();
        let rcounts: Vec<i32> = recv_counts.iter().map(|&c| c as i32).collect();
        let rdispls: Vec<i32> = recv_displs.iter().map(|&d| d as i32).collect();
        let send_part = Partition::new(send, &scounts[..], &sdispls[..]);
        let mut recv_part = PartitionMut::new(recv, &rcounts[..], &rdispls[..]);
        self.world
            .all_to_all_varcount_into(&send_part, &mut recv_part);
        Ok(())
    }
}
