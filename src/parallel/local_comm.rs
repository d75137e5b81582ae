//! In-process communicator: the ranks are threads of one process.
//!
//! [`LocalComm::split`] hands out one endpoint per rank; each endpoint is
//! moved onto its own thread and the group rendezvouses on a shared
//! condvar round counter. `split(1)` gives the degenerate single-rank
//! endpoint used for serial runs.

use std::sync::{Arc, Condvar, Mutex};

use crate::error::TdError;
use crate::parallel::Comm;

pub struct LocalComm {
    rank: usize,
    shared: Arc<Shared>,
}

struct Shared {
    size: usize,
    data: Rendezvous<Vec<Vec<f64>>>,
    meta: Rendezvous<i64>,
}

impl LocalComm {
    /// Create a group of `p` endpoints sharing one rendezvous. Endpoint
    /// `i` of the returned vector is rank `i`.
    pub fn split(p: usize) -> Vec<LocalComm> {
        assert!(p > 0, "communicator needs at least one rank");
        let shared = Arc::new(Shared {
            size: p,
            data: Rendezvous::new(p),
            meta: Rendezvous::new(p),
        });
        (0..p)
            .map(|rank| LocalComm {
                rank,
                shared: Arc::clone(&shared),
            })
            .collect()
    }

    /// The single-rank endpoint.
    pub fn solo() -> LocalComm {
        LocalComm::split(1).pop().expect("split(1) yields one endpoint")
    }
}

impl Comm for LocalComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.size
    }

    fn barrier(&self) -> Result<(), TdError> {
        self.shared.meta.exchange(self.rank, 0)?;
        Ok(())
    }

    fn gather_into(
        &self,
        send: &[f64],
        recv: Option<&mut [f64]>,
        root: usize,
    ) -> Result<(), TdError> {
        let all = self.shared.data.exchange(self.rank, vec![send.to_vec()])?;
        if self.rank == root {
            let recv = recv.ok_or_else(|| {
                TdError::Config("gather root called without a receive buffer".into())
            })?;
            let m = send.len();
            if recv.len() != m * self.shared.size {
                return Err(TdError::Shape(format!(
                    "gather receive buffer holds {} elements, expected {}",
                    recv.len(),
                    m * self.shared.size
                )));
            }
            for (k, parts) in all.iter().enumerate() {
                let part = &parts[0];
                if part.len() != m {
                    return Err(TdError::Transport(format!(
                        "rank {k} contributed {} elements to a {m}-element gather",
                        part.len()
                    )));
                }
                recv[k * m..(k + 1) * m].copy_from_slice(part);
            }
        }
        Ok(())
    }

    fn scatter_from(
        &self,
        send: Option<&[f64]>,
        recv: &mut [f64],
        root: usize,
    ) -> Result<(), TdError> {
        let m = recv.len();
        let parts = if self.rank == root {
            let send = send.ok_or_else(|| {
                TdError::Config("scatter root called without a send buffer".into())
            })?;
            if send.len() != m * self.shared.size {
                return Err(TdError::Shape(format!(
                    "scatter send buffer holds {} elements, expected {}",
                    send.len(),
                    m * self.shared.size
                )));
            }
            send.chunks(m).map(<[f64]>::to_vec).collect()
        } else {
            Vec::new()
        };
        let all = self.shared.data.exchange(self.rank, parts)?;
        let mine = all[root].get(self.rank).ok_or_else(|| {
            TdError::Transport(format!("scatter root {root} sent no chunk to rank {}", self.rank))
        })?;
        recv.copy_from_slice(mine);
        Ok(())
    }

    fn all_gather_counts(&self, count: usize, recv: &mut [usize]) -> Result<(), TdError> {
        if recv.len() != self.shared.size {
            return Err(TdError::Shape(format!(
                "all-gather receive buffer holds {} entries, expected {}",
                recv.len(),
                self.shared.size
            )));
        }
        let all = self.shared.meta.exchange(self.rank, count as i64)?;
        for (slot, v) in recv.iter_mut().zip(all.iter()) {
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
        let p = self.shared.size;
        if send_counts.len() != p
            || send_displs.len() != p
            || recv_counts.len() != p
            || recv_displs.len() != p
        {
            return Err(TdError::Shape(
                "all-to-all count/displacement arrays must have one entry per rank".into(),
            ));
        }
        let mut parts = Vec::with_capacity(p);
        for k in 0..p {
            let lo = send_displs[k];
            let hi = lo + send_counts[k];
            let seg = send.get(lo..hi).ok_or_else(|| {
                TdError::Shape(format!(
                    "send segment {lo}..{hi} for rank {k} exceeds buffer of {}",
                    send.len()
                ))
            })?;
            parts.push(seg.to_vec());
        }
        let all = self.shared.data.exchange(self.rank, parts)?;
        for (r, parts) in all.iter().enumerate() {
            let blk = parts.get(self.rank).ok_or_else(|| {
                TdError::Transport(format!("rank {r} sent no segment to rank {}", self.rank))
            })?;
            if blk.len() != recv_counts[r] {
                return Err(TdError::Transport(format!(
                    "rank {r} sent {} elements, receiver expected {}",
                    blk.len(),
                    recv_counts[r]
                )));
            }
            let lo = recv_displs[r];
            let hi = lo + recv_counts[r];
            let dst = recv.get_mut(lo..hi).ok_or_else(|| {
                TdError::Shape(format!(
                    "receive segment {lo}..{hi} from rank {r} exceeds buffer"
                ))
            })?;
            dst.copy_from_slice(blk);
        }
        Ok(())
    }
}

/// One-shot rendezvous reused round after round: every rank deposits a
/// payload, the last arrival publishes the full set and advances the
/// round counter, and everybody leaves with a shared handle on it.
struct Rendezvous<T> {
    state: Mutex<Round<T>>,
    cv: Condvar,
    size: usize,
}

struct Round<T> {
    deposits: Vec<Option<T>>,
    arrived: usize,
    round: u64,
    published: Option<Arc<Vec<T>>>,
}

impl<T> Rendezvous<T> {
    fn new(size: usize) -> Self {
        Rendezvous {
            state: Mutex::new(Round {
                deposits: (0..size).map(|_| None).collect(),
                arrived: 0,
                round: 0,
                published: None,
            }),
            cv: Condvar::new(),
            size,
        }
    }

    fn exchange(&self, rank: usize, payload: T) -> Result<Arc<Vec<T>>, TdError> {
        let mut st = self
            .state
            .lock()
            .map_err(|_| TdError::Transport("communicator lock poisoned".into()))?;
        if st.deposits[rank].is_some() {
            return Err(TdError::Transport(format!(
                "rank {rank} re-entered a collective before the group completed the last one"
            )));
        }
        st.deposits[rank] = Some(payload);
        st.arrived += 1;
        if st.arrived == self.size {
            let all: Vec<T> = st
                .deposits
                .iter_mut()
                .map(|slot| slot.take().expect("every rank has deposited"))
                .collect();
            let all = Arc::new(all);
            st.published = Some(Arc::clone(&all));
            st.arrived = 0;
            st.round += 1;
            self.cv.notify_all();
            Ok(all)
        } else {
            let round = st.round;
            while st.round == round {
                st = self
                    .cv
                    .wait(st)
                    .map_err(|_| TdError::Transport("communicator lock poisoned".into()))?;
            }
            st.published
                .as_ref()
                .map(Arc::clone)
                .ok_or_else(|| TdError::Transport("rendezvous completed without a result".into()))
        }
    }
}
