//! Serial, batched, and reduction kernels for tridiagonal systems.

pub mod batch;
pub mod reduce;
pub mod thomas;

pub use batch::{tdma_cycl_many, tdma_many};
#[cfg(feature = "rayon")]
pub use batch::{tdma_cycl_many_par, tdma_many_par};
pub use reduce::{back_substitute, back_substitute_many, modified_thomas, modified_thomas_many};
#[cfg(feature = "rayon")]
pub use reduce::modified_thomas_many_par;
pub use thomas::{tdma, tdma_cycl};

use num_traits::Float;

/// Outcome report of a kernel or plan solve.
///
/// A solve that hit the pivot guard still ran to completion with the
/// offending pivots clamped; the caller decides whether to reject the
/// result.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SolveStats {
    /// Number of pivots clamped by the divide-by-zero guard.
    pub pivot_breakdowns: usize,
}

impl SolveStats {
    pub fn is_clean(&self) -> bool {
        self.pivot_breakdowns == 0
    }

    pub(crate) fn absorb(&mut self, other: SolveStats) {
        self.pivot_breakdowns += other.pivot_breakdowns;
    }
}

/// Replace a too-small pivot by `±eps` and count the breakdown.
#[inline]
pub(crate) fn clamp_pivot<T: Float>(pivot: T, eps: T, hits: &mut usize) -> T {
    if pivot.abs() < eps {
        *hits += 1;
        if pivot < T::zero() { -eps } else { eps }
    } else {
        pivot
    }
}
