//! Modified Thomas elimination and the matching back-substitution.
//!
//! The elimination runs on one rank's local block and leaves every row
//! coupled only to the block's first and last unknowns: after the sweeps,
//! interior row `i` reads `a_i·x_0 + x_i + c_i·x_{n-1} = d_i`, row 0
//! couples to the previous rank's last unknown through `a_0`, and row
//! `n-1` couples to the next rank's first unknown through `c_{n-1}`. Rows
//! 0 and `n-1` (with an implied unit diagonal) form the two-row boundary
//! summary that enters the reduced system. Once the reduced solution is
//! written back into `d[0]` and `d[n-1]`, [`back_substitute`] recovers
//! the interior with no further communication.

use ndarray::{ArrayView1, ArrayView2, ArrayViewMut1, ArrayViewMut2};
use num_traits::Float;

use crate::error::TdError;
use crate::kernel::batch::check_batch;
use crate::kernel::thomas::check_lens;
use crate::kernel::{SolveStats, clamp_pivot};

#[cfg(feature = "rayon")]
use ndarray::{Axis, Zip};
#[cfg(feature = "rayon")]
use std::sync::atomic::{AtomicUsize, Ordering};

/// Reduce one local block in place. Requires `n >= 3`.
pub fn modified_thomas<T: Float>(
    a: &mut [T],
    b: &[T],
    c: &mut [T],
    d: &mut [T],
    pivot_eps: T,
) -> Result<SolveStats, TdError> {
    check_lens(a.len(), b.len(), c.len(), d.len(), 3)?;
    let hits = modified_thomas_lane(
        ArrayViewMut1::from(a),
        ArrayView1::from(b),
        ArrayViewMut1::from(c),
        ArrayViewMut1::from(d),
        pivot_eps,
    );
    Ok(SolveStats {
        pivot_breakdowns: hits,
    })
}

/// Reduce `n_sys` local blocks in place. Requires `n_row >= 3`.
pub fn modified_thomas_many<T: Float>(
    mut a: ArrayViewMut2<T>,
    b: ArrayView2<T>,
    mut c: ArrayViewMut2<T>,
    mut d: ArrayViewMut2<T>,
    pivot_eps: T,
) -> Result<SolveStats, TdError> {
    let (n_sys, n_row) = check_batch(&a.view(), &b, &c.view(), &d.view(), 3)?;
    let mut hits = 0;
    let n = n_row;

    for i in 0..2 {
        for s in 0..n_sys {
            let r = T::one() / clamp_pivot(b[[s, i]], pivot_eps, &mut hits);
            a[[s, i]] = r * a[[s, i]];
            d[[s, i]] = r * d[[s, i]];
            c[[s, i]] = r * c[[s, i]];
        }
    }
    for i in 2..n {
        for s in 0..n_sys {
            let r = T::one() / clamp_pivot(b[[s, i]] - a[[s, i]] * c[[s, i - 1]], pivot_eps, &mut hits);
            d[[s, i]] = r * (d[[s, i]] - a[[s, i]] * d[[s, i - 1]]);
            c[[s, i]] = r * c[[s, i]];
            a[[s, i]] = -(r * a[[s, i]] * a[[s, i - 1]]);
        }
    }
    for i in (1..=n - 3).rev() {
        for s in 0..n_sys {
            d[[s, i]] = d[[s, i]] - c[[s, i]] * d[[s, i + 1]];
            a[[s, i]] = a[[s, i]] - c[[s, i]] * a[[s, i + 1]];
            c[[s, i]] = -(c[[s, i]] * c[[s, i + 1]]);
        }
    }
    for s in 0..n_sys {
        let r = T::one() / clamp_pivot(T::one() - a[[s, 1]] * c[[s, 0]], pivot_eps, &mut hits);
        d[[s, 0]] = r * (d[[s, 0]] - c[[s, 0]] * d[[s, 1]]);
        a[[s, 0]] = r * a[[s, 0]];
        c[[s, 0]] = -(r * c[[s, 0]] * c[[s, 1]]);
    }
    Ok(SolveStats {
        pivot_breakdowns: hits,
    })
}

/// [`modified_thomas_many`] with one lane per system on the rayon pool.
#[cfg(feature = "rayon")]
pub fn modified_thomas_many_par<T: Float + Send + Sync>(
    mut a: ArrayViewMut2<T>,
    b: ArrayView2<T>,
    mut c: ArrayViewMut2<T>,
    mut d: ArrayViewMut2<T>,
    pivot_eps: T,
) -> Result<SolveStats, TdError> {
    check_batch(&a.view(), &b, &c.view(), &d.view(), 3)?;
    let hits = AtomicUsize::new(0);
    Zip::from(a.lanes_mut(Axis(1)))
        .and(b.lanes(Axis(1)))
        .and(c.lanes_mut(Axis(1)))
        .and(d.lanes_mut(Axis(1)))
        .par_for_each(|la, lb, lc, ld| {
            let k = modified_thomas_lane(la, lb, lc, ld, pivot_eps);
            if k > 0 {
                hits.fetch_add(k, Ordering::Relaxed);
            }
        });
    Ok(SolveStats {
        pivot_breakdowns: hits.into_inner(),
    })
}

pub(crate) fn modified_thomas_lane<T: Float>(
    mut a: ArrayViewMut1<T>,
    b: ArrayView1<T>,
    mut c: ArrayViewMut1<T>,
    mut d: ArrayViewMut1<T>,
    eps: T,
) -> usize {
    let n = d.len();
    let mut hits = 0;

    for i in 0..2 {
        let r = T::one() / clamp_pivot(b[i], eps, &mut hits);
        a[i] = r * a[i];
        d[i] = r * d[i];
        c[i] = r * c[i];
    }
    for i in 2..n {
        let r = T::one() / clamp_pivot(b[i] - a[i] * c[i - 1], eps, &mut hits);
        d[i] = r * (d[i] - a[i] * d[i - 1]);
        c[i] = r * c[i];
        a[i] = -(r * a[i] * a[i - 1]);
    }
    // Eliminate the upper coupling back toward row 1.
    for i in (1..=n - 3).rev() {
        d[i] = d[i] - c[i] * d[i + 1];
        a[i] = a[i] - c[i] * a[i + 1];
        c[i] = -(c[i] * c[i + 1]);
    }
    // Couple row 0 through row 1.
    let r = T::one() / clamp_pivot(T::one() - a[1] * c[0], eps, &mut hits);
    d[0] = r * (d[0] - c[0] * d[1]);
    a[0] = r * a[0];
    c[0] = -(r * c[0] * c[1]);
    hits
}

/// Recover the interior unknowns once `d[0]` and `d[n-1]` hold the
/// reduced solution.
pub fn back_substitute<T: Float>(a: &[T], c: &[T], d: &mut [T]) {
    let n = d.len();
    assert_eq!(a.len(), n);
    assert_eq!(c.len(), n);
    let x0 = d[0];
    let xn = d[n - 1];
    for i in 1..n - 1 {
        d[i] = d[i] - a[i] * x0 - c[i] * xn;
    }
}

/// Batch variant of [`back_substitute`].
pub fn back_substitute_many<T: Float>(
    a: ArrayView2<T>,
    c: ArrayView2<T>,
    mut d: ArrayViewMut2<T>,
) {
    let (n_sys, n_row) = d.dim();
    assert_eq!(a.dim(), (n_sys, n_row));
    assert_eq!(c.dim(), (n_sys, n_row));
    for i in 1..n_row - 1 {
        for s in 0..n_sys {
            d[[s, i]] = d[[s, i]] - a[[s, i]] * d[[s, 0]] - c[[s, i]] * d[[s, n_row - 1]];
        }
    }
}
