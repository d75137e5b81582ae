//! Plan for a batch of independent systems sharing the solving axis.

use ndarray::{ArrayView2, ArrayViewMut2, ShapeBuilder};

use crate::config::SolveOptions;
use crate::error::TdError;
use crate::kernel::batch::{tdma_cycl_many, tdma_many};
use crate::kernel::reduce::{back_substitute_many, modified_thomas_many};
use crate::kernel::SolveStats;
use crate::parallel::Comm;
use crate::plan::descriptor::BlockDesc;
use crate::utils::partition;

/// Cached state for repeated solves of `n_sys` independent tridiagonal
/// systems, each spread across the ranks along the `n_row` axis.
///
/// Rather than funnel all reduced systems to one rank, the `(n_sys × 2)`
/// boundary summaries are transposed across the communicator: rank `r`
/// becomes the owner of `n_sys_rt = |partition(n_sys, P, r)|` complete
/// reduced systems of length `2·P`, solves them with the batch kernel,
/// and the solution stream is transposed back. Within each assembled
/// reduced system the rows are rank-major: rank 0's first boundary row,
/// rank 0's last, rank 1's first, and so on.
///
/// Create, destroy, and both solves are collective; a transport error
/// poisons the plan. With one rank every exchange is skipped and the
/// batch serial kernel runs directly.
pub struct ManyPlan<C: Comm> {
    comm: C,
    opts: SolveOptions,
    n_sys: usize,
    n_row: usize,
    /// Reduced systems owned by this rank after the transpose.
    n_sys_rt: usize,
    /// Length of each reduced system (`2·P`).
    n_row_rt: usize,
    send_descs: Vec<BlockDesc>,
    recv_descs: Vec<BlockDesc>,
    send_counts: Vec<usize>,
    send_displs: Vec<usize>,
    recv_counts: Vec<usize>,
    recv_displs: Vec<usize>,
    // Boundary summaries, column-major (n_sys × 2): column 0 the first
    // rows, column 1 the last rows.
    bnd_a: Vec<f64>,
    bnd_b: Vec<f64>,
    bnd_c: Vec<f64>,
    bnd_d: Vec<f64>,
    // Transposed reduced systems, column-major (n_sys_rt × 2·P).
    rt_a: Vec<f64>,
    rt_b: Vec<f64>,
    rt_c: Vec<f64>,
    rt_d: Vec<f64>,
    stage_send: Vec<f64>,
    stage_recv: Vec<f64>,
}

impl<C: Comm> ManyPlan<C> {
    /// Set up a plan for `(n_sys, n_row)` local blocks. Requires
    /// `n_row >= 3` on every rank and `n_sys >= P` so each rank owns at
    /// least one reduced system.
    pub fn create(
        comm: C,
        n_sys: usize,
        n_row: usize,
        opts: SolveOptions,
    ) -> Result<Self, TdError> {
        if n_row < 3 {
            return Err(TdError::Config(format!(
                "local blocks of {n_row} rows; the reduction needs at least 3"
            )));
        }
        let p = comm.size();
        let rank = comm.rank();

        if p == 1 {
            return Ok(ManyPlan {
                comm,
                opts,
                n_sys,
                n_row,
                n_sys_rt: n_sys,
                n_row_rt: 2,
                send_descs: Vec::new(),
                recv_descs: Vec::new(),
                send_counts: Vec::new(),
                send_displs: Vec::new(),
                recv_counts: Vec::new(),
                recv_displs: Vec::new(),
                bnd_a: Vec::new(),
                bnd_b: Vec::new(),
                bnd_c: Vec::new(),
                bnd_d: Vec::new(),
                rt_a: Vec::new(),
                rt_b: Vec::new(),
                rt_c: Vec::new(),
                rt_d: Vec::new(),
                stage_send: Vec::new(),
                stage_recv: Vec::new(),
            });
        }

        let n_sys_rt = partition(n_sys, p, rank)?.len();
        let n_row_rt = 2 * p;

        // Tile heights per peer, agreed across the communicator.
        let mut heights = vec![0usize; p];
        comm.all_gather_counts(n_sys_rt, &mut heights)?;

        let mut send_descs = Vec::with_capacity(p);
        let mut start = 0;
        for &h in &heights {
            send_descs.push(BlockDesc::new(n_sys, 2, h, 2, start, 0)?);
            start += h;
        }
        if start != n_sys {
            return Err(TdError::Config(format!(
                "gathered tile heights cover {start} systems, local batch has {n_sys}"
            )));
        }
        let mut recv_descs = Vec::with_capacity(p);
        for r in 0..p {
            recv_descs.push(BlockDesc::new(n_sys_rt, n_row_rt, n_sys_rt, 2, 0, 2 * r)?);
        }

        let send_counts: Vec<usize> = send_descs.iter().map(BlockDesc::len).collect();
        let send_displs = prefix_sums(&send_counts);
        let recv_counts: Vec<usize> = recv_descs.iter().map(BlockDesc::len).collect();
        let recv_displs = prefix_sums(&recv_counts);

        let n_bnd = 2 * n_sys;
        let n_rt = n_sys_rt * n_row_rt;
        Ok(ManyPlan {
            comm,
            opts,
            n_sys,
            n_row,
            n_sys_rt,
            n_row_rt,
            send_descs,
            recv_descs,
            send_counts,
            send_displs,
            recv_counts,
            recv_displs,
            bnd_a: vec![0.0; n_bnd],
            bnd_b: vec![0.0; n_bnd],
            bnd_c: vec![0.0; n_bnd],
            bnd_d: vec![0.0; n_bnd],
            rt_a: vec![0.0; n_rt],
            rt_b: vec![0.0; n_rt],
            rt_c: vec![0.0; n_rt],
            rt_d: vec![0.0; n_rt],
            stage_send: Vec::with_capacity(n_bnd.max(n_rt)),
            stage_recv: vec![0.0; n_bnd.max(n_rt)],
        })
    }

    /// Solve the batch in place; `d` exits as the solutions.
    pub fn solve(
        &mut self,
        a: ArrayViewMut2<f64>,
        b: ArrayView2<f64>,
        c: ArrayViewMut2<f64>,
        d: ArrayViewMut2<f64>,
    ) -> Result<SolveStats, TdError> {
        self.run(a, b, c, d, false)
    }

    /// Solve the batch of cyclic systems in place; per system, `a[.., 0]`
    /// on rank 0 and `c[.., n_row-1]` on the last rank carry the
    /// wraparound coefficients.
    pub fn solve_cyclic(
        &mut self,
        a: ArrayViewMut2<f64>,
        b: ArrayView2<f64>,
        c: ArrayViewMut2<f64>,
        d: ArrayViewMut2<f64>,
    ) -> Result<SolveStats, TdError> {
        self.run(a, b, c, d, true)
    }

    /// Release the plan. Equivalent to dropping it; provided so the
    /// create/destroy pairing is explicit at call sites.
    pub fn destroy(self) {}

    fn run(
        &mut self,
        mut a: ArrayViewMut2<f64>,
        b: ArrayView2<f64>,
        mut c: ArrayViewMut2<f64>,
        mut d: ArrayViewMut2<f64>,
        cyclic: bool,
    ) -> Result<SolveStats, TdError> {
        let dims = (self.n_sys, self.n_row);
        if a.dim() != dims || b.dim() != dims || c.dim() != dims || d.dim() != dims {
            return Err(TdError::Shape(format!(
                "solve called with shapes a={:?}, b={:?}, c={:?}, d={:?} on a plan for {dims:?}",
                a.dim(),
                b.dim(),
                c.dim(),
                d.dim()
            )));
        }
        let eps = self.opts.pivot_eps;

        if self.comm.size() == 1 {
            return if cyclic {
                tdma_cycl_many(a.view(), b, c.view_mut(), d.view_mut(), eps)
            } else {
                tdma_many(a.view(), b, c.view_mut(), d.view_mut(), eps)
            };
        }

        let mut stats =
            modified_thomas_many(a.view_mut(), b, c.view_mut(), d.view_mut(), eps)?;

        // Boundary summaries of every system, unit diagonal implied.
        let (ns, n) = dims;
        for s in 0..ns {
            self.bnd_a[s] = a[[s, 0]];
            self.bnd_a[ns + s] = a[[s, n - 1]];
            self.bnd_b[s] = 1.0;
            self.bnd_b[ns + s] = 1.0;
            self.bnd_c[s] = c[[s, 0]];
            self.bnd_c[ns + s] = c[[s, n - 1]];
            self.bnd_d[s] = d[[s, 0]];
            self.bnd_d[ns + s] = d[[s, n - 1]];
        }

        self.transpose_forward()?;

        {
            let ra = view(&self.rt_a, self.n_sys_rt, self.n_row_rt);
            let rb = view(&self.rt_b, self.n_sys_rt, self.n_row_rt);
            let rc = view_mut(&mut self.rt_c, self.n_sys_rt, self.n_row_rt);
            let rd = view_mut(&mut self.rt_d, self.n_sys_rt, self.n_row_rt);
            let reduced = if cyclic {
                tdma_cycl_many(ra, rb, rc, rd, eps)?
            } else {
                tdma_many(ra, rb, rc, rd, eps)?
            };
            stats.absorb(reduced);
        }

        self.transpose_inverse()?;

        for s in 0..ns {
            d[[s, 0]] = self.bnd_d[s];
            d[[s, n - 1]] = self.bnd_d[ns + s];
        }
        back_substitute_many(a.view(), c.view(), d.view_mut());
        Ok(stats)
    }

    /// Move all four boundary streams into transposed form, one staged
    /// exchange per stream.
    fn transpose_forward(&mut self) -> Result<(), TdError> {
        stream_exchange(
            &self.comm,
            &self.send_descs,
            &self.recv_descs,
            &self.send_counts,
            &self.send_displs,
            &self.recv_counts,
            &self.recv_displs,
            &self.bnd_a,
            &mut self.rt_a,
            &mut self.stage_send,
            &mut self.stage_recv,
        )?;
        stream_exchange(
            &self.comm,
            &self.send_descs,
            &self.recv_descs,
            &self.send_counts,
            &self.send_displs,
            &self.recv_counts,
            &self.recv_displs,
            &self.bnd_b,
            &mut self.rt_b,
            &mut self.stage_send,
            &mut self.stage_recv,
        )?;
        stream_exchange(
            &self.comm,
            &self.send_descs,
            &self.recv_descs,
            &self.send_counts,
            &self.send_displs,
            &self.recv_counts,
            &self.recv_displs,
            &self.bnd_c,
            &mut self.rt_c,
            &mut self.stage_send,
            &mut self.stage_recv,
        )?;
        stream_exchange(
            &self.comm,
            &self.send_descs,
            &self.recv_descs,
            &self.send_counts,
            &self.send_displs,
            &self.recv_counts,
            &self.recv_displs,
            &self.bnd_d,
            &mut self.rt_d,
            &mut self.stage_send,
            &mut self.stage_recv,
        )
    }

    /// Return the solution stream to its origin ranks: the same exchange
    /// with the descriptor roles swapped.
    fn transpose_inverse(&mut self) -> Result<(), TdError> {
        stream_exchange(
            &self.comm,
            &self.recv_descs,
            &self.send_descs,
            &self.recv_counts,
            &self.recv_displs,
            &self.send_counts,
            &self.send_displs,
            &self.rt_d,
            &mut self.bnd_d,
            &mut self.stage_send,
            &mut self.stage_recv,
        )
    }
}

fn prefix_sums(counts: &[usize]) -> Vec<usize> {
    let mut displs = Vec::with_capacity(counts.len());
    let mut acc = 0;
    for &c in counts {
        displs.push(acc);
        acc += c;
    }
    displs
}

fn view(buf: &[f64], rows: usize, cols: usize) -> ArrayView2<'_, f64> {
    ArrayView2::from_shape((rows, cols).f(), buf).expect("scratch buffer matches plan shape")
}

fn view_mut(buf: &mut [f64], rows: usize, cols: usize) -> ArrayViewMut2<'_, f64> {
    ArrayViewMut2::from_shape((rows, cols).f(), buf).expect("scratch buffer matches plan shape")
}

/// Pack per-peer tiles of `src`, run one all-to-all, and unpack each
/// peer's run into `dst`.
#[allow(clippy::too_many_arguments)]
fn stream_exchange<C: Comm>(
    comm: &C,
    pack_descs: &[BlockDesc],
    unpack_descs: &[BlockDesc],
    send_counts: &[usize],
    send_displs: &[usize],
    recv_counts: &[usize],
    recv_displs: &[usize],
    src: &[f64],
    dst: &mut [f64],
    stage_send: &mut Vec<f64>,
    stage_recv: &mut [f64],
) -> Result<(), TdError> {
    stage_send.clear();
    for desc in pack_descs {
        desc.pack(src, stage_send);
    }
    comm.all_to_all_v(
        stage_send,
        send_counts,
        send_displs,
        stage_recv,
        recv_counts,
        recv_displs,
    )?;
    for (r, desc) in unpack_descs.iter().enumerate() {
        let lo = recv_displs[r];
        desc.unpack(&stage_recv[lo..lo + recv_counts[r]], dst);
    }
    Ok(())
}
