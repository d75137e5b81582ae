//! Plan for one tridiagonal system spread across the ranks.

use crate::config::SolveOptions;
use crate::error::TdError;
use crate::kernel::reduce::{back_substitute, modified_thomas};
use crate::kernel::thomas::{tdma, tdma_cycl};
use crate::kernel::SolveStats;
use crate::parallel::Comm;

/// Cached state for repeated solves of one distributed tridiagonal
/// system.
///
/// Every rank holds `n_row` consecutive rows of the global system. A
/// solve reduces the local block with the modified Thomas elimination,
/// gathers the two boundary rows of every rank on `gather_rank`, solves
/// the `2·P`-row reduced system there, scatters the solution endpoints
/// back, and back-substitutes locally. With one rank the plan degenerates
/// to the serial kernel and no collective is entered.
///
/// Create, destroy, and both solves are collective: all ranks of the
/// communicator must call them in the same order. A solve that returns a
/// transport error leaves the plan poisoned; destroy it.
pub struct SinglePlan<C: Comm> {
    comm: C,
    gather_rank: usize,
    n_row: usize,
    opts: SolveOptions,
    sm_a: [f64; 2],
    sm_b: [f64; 2],
    sm_c: [f64; 2],
    sm_d: [f64; 2],
    rd_a: Vec<f64>,
    rd_b: Vec<f64>,
    rd_c: Vec<f64>,
    rd_d: Vec<f64>,
}

impl<C: Comm> SinglePlan<C> {
    /// Set up a plan for blocks of `n_row` local rows, designating
    /// `gather_rank` as the reduced-system owner.
    pub fn create(
        comm: C,
        gather_rank: usize,
        n_row: usize,
        opts: SolveOptions,
    ) -> Result<Self, TdError> {
        let p = comm.size();
        if gather_rank >= p {
            return Err(TdError::Config(format!(
                "gather rank {gather_rank} out of range for {p} ranks"
            )));
        }
        if n_row < 3 {
            return Err(TdError::Config(format!(
                "local block of {n_row} rows; the reduction needs at least 3"
            )));
        }
        let n_reduced = 2 * p;
        Ok(SinglePlan {
            comm,
            gather_rank,
            n_row,
            opts,
            sm_a: [0.0; 2],
            sm_b: [0.0; 2],
            sm_c: [0.0; 2],
            sm_d: [0.0; 2],
            rd_a: vec![0.0; n_reduced],
            rd_b: vec![0.0; n_reduced],
            rd_c: vec![0.0; n_reduced],
            rd_d: vec![0.0; n_reduced],
        })
    }

    /// Solve the distributed system in place; `d` exits as the solution.
    ///
    /// `a[0]` on rank 0 and `c[n_row-1]` on the last rank are the global
    /// boundary coefficients and must be zero for a plain (non-cyclic)
    /// system.
    pub fn solve(
        &mut self,
        a: &mut [f64],
        b: &[f64],
        c: &mut [f64],
        d: &mut [f64],
    ) -> Result<SolveStats, TdError> {
        self.run(a, b, c, d, false)
    }

    /// Solve the distributed cyclic system in place; `a[0]` on rank 0 and
    /// `c[n_row-1]` on the last rank carry the wraparound coefficients.
    pub fn solve_cyclic(
        &mut self,
        a: &mut [f64],
        b: &[f64],
        c: &mut [f64],
        d: &mut [f64],
    ) -> Result<SolveStats, TdError> {
        self.run(a, b, c, d, true)
    }

    /// Release the plan. Equivalent to dropping it; provided so the
    /// create/destroy pairing is explicit at call sites.
    pub fn destroy(self) {}

    fn run(
        &mut self,
        a: &mut [f64],
        b: &[f64],
        c: &mut [f64],
        d: &mut [f64],
        cyclic: bool,
    ) -> Result<SolveStats, TdError> {
        let n = self.n_row;
        if a.len() != n || b.len() != n || c.len() != n || d.len() != n {
            return Err(TdError::Shape(format!(
                "solve called with lengths a={}, b={}, c={}, d={} on a plan for {n} rows",
                a.len(),
                b.len(),
                c.len(),
                d.len()
            )));
        }
        let eps = self.opts.pivot_eps;

        if self.comm.size() == 1 {
            return if cyclic {
                tdma_cycl(a, b, c, d, eps)
            } else {
                tdma(a, b, c, d, eps)
            };
        }

        let mut stats = modified_thomas(a, b, c, d, eps)?;

        // Boundary summary: rows 0 and n-1, unit diagonal implied.
        self.sm_a = [a[0], a[n - 1]];
        self.sm_b = [1.0, 1.0];
        self.sm_c = [c[0], c[n - 1]];
        self.sm_d = [d[0], d[n - 1]];

        let root = self.gather_rank;
        let is_root = self.comm.rank() == root;
        let recv = if is_root { Some(self.rd_a.as_mut_slice()) } else { None };
        self.comm.gather_into(&self.sm_a, recv, root)?;
        let recv = if is_root { Some(self.rd_b.as_mut_slice()) } else { None };
        self.comm.gather_into(&self.sm_b, recv, root)?;
        let recv = if is_root { Some(self.rd_c.as_mut_slice()) } else { None };
        self.comm.gather_into(&self.sm_c, recv, root)?;
        let recv = if is_root { Some(self.rd_d.as_mut_slice()) } else { None };
        self.comm.gather_into(&self.sm_d, recv, root)?;

        if is_root {
            let reduced = if cyclic {
                tdma_cycl(&self.rd_a, &self.rd_b, &mut self.rd_c, &mut self.rd_d, eps)?
            } else {
                tdma(&self.rd_a, &self.rd_b, &mut self.rd_c, &mut self.rd_d, eps)?
            };
            stats.absorb(reduced);
        }

        let send = if is_root { Some(self.rd_d.as_slice()) } else { None };
        self.comm.scatter_from(send, &mut self.sm_d, root)?;

        d[0] = self.sm_d[0];
        d[n - 1] = self.sm_d[1];
        back_substitute(a, c, d);
        Ok(stats)
    }
}
