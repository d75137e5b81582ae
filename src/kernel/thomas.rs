//! Serial Thomas kernels, non-cyclic and cyclic.
//!
//! Both kernels work in place: `c` is consumed as sweep scratch and `d`
//! exits holding the solution. The cyclic variant treats `a[0]` and
//! `c[n-1]` as the wraparound coefficients and closes the system with a
//! rank-one correction: rows `1..n` are swept once for the right-hand
//! side and once for the sensitivity to `x[0]`, then row 0 determines
//! `x[0]` and the combination is added back.

use ndarray::{Array1, ArrayView1, ArrayViewMut1};
use num_traits::Float;

use crate::error::TdError;
use crate::kernel::{SolveStats, clamp_pivot};

/// Solve one tridiagonal system `a·x_{i-1} + b·x_i + c·x_{i+1} = d` in
/// place; on exit `d` holds the solution.
///
/// `a` and `b` are read-only; `c` and `d` are overwritten. Pivots smaller
/// in magnitude than `pivot_eps` are clamped and counted in the returned
/// stats.
pub fn tdma<T: Float>(
    a: &[T],
    b: &[T],
    c: &mut [T],
    d: &mut [T],
    pivot_eps: T,
) -> Result<SolveStats, TdError> {
    check_lens(a.len(), b.len(), c.len(), d.len(), 1)?;
    let hits = tdma_lane(
        ArrayView1::from(a),
        ArrayView1::from(b),
        ArrayViewMut1::from(c),
        ArrayViewMut1::from(d),
        pivot_eps,
    );
    Ok(SolveStats {
        pivot_breakdowns: hits,
    })
}

/// Solve one cyclic tridiagonal system in place.
///
/// `a[0]` couples `x[0]` to `x[n-1]` and `c[n-1]` couples `x[n-1]` to
/// `x[0]`. Requires `n >= 3`. With both wrap coefficients zero this
/// agrees with [`tdma`].
pub fn tdma_cycl<T: Float>(
    a: &[T],
    b: &[T],
    c: &mut [T],
    d: &mut [T],
    pivot_eps: T,
) -> Result<SolveStats, TdError> {
    check_lens(a.len(), b.len(), c.len(), d.len(), 3)?;
    let hits = tdma_cycl_lane(
        ArrayView1::from(a),
        ArrayView1::from(b),
        ArrayViewMut1::from(c),
        ArrayViewMut1::from(d),
        pivot_eps,
    );
    Ok(SolveStats {
        pivot_breakdowns: hits,
    })
}

pub(crate) fn check_lens(
    na: usize,
    nb: usize,
    nc: usize,
    nd: usize,
    min: usize,
) -> Result<(), TdError> {
    if na != nb || na != nc || na != nd {
        return Err(TdError::Shape(format!(
            "coefficient streams differ in length: a={na}, b={nb}, c={nc}, d={nd}"
        )));
    }
    if nd < min {
        return Err(TdError::Config(format!(
            "system length {nd} below minimum {min}"
        )));
    }
    Ok(())
}

pub(crate) fn tdma_lane<T: Float>(
    a: ArrayView1<T>,
    b: ArrayView1<T>,
    mut c: ArrayViewMut1<T>,
    mut d: ArrayViewMut1<T>,
    eps: T,
) -> usize {
    let n = d.len();
    let mut hits = 0;

    let r = T::one() / clamp_pivot(b[0], eps, &mut hits);
    d[0] = r * d[0];
    c[0] = r * c[0];
    for i in 1..n {
        let r = T::one() / clamp_pivot(b[i] - a[i] * c[i - 1], eps, &mut hits);
        d[i] = r * (d[i] - a[i] * d[i - 1]);
        c[i] = r * c[i];
    }
    for i in (0..n - 1).rev() {
        d[i] = d[i] - c[i] * d[i + 1];
    }
    hits
}

pub(crate) fn tdma_cycl_lane<T: Float>(
    a: ArrayView1<T>,
    b: ArrayView1<T>,
    mut c: ArrayViewMut1<T>,
    mut d: ArrayViewMut1<T>,
    eps: T,
) -> usize {
    let n = d.len();
    let mut hits = 0;

    // Sensitivity of rows 1..n to x[0]: row 1 through its sub-diagonal,
    // row n-1 through the wrap coefficient.
    let mut e = Array1::<T>::zeros(n);
    e[1] = -a[1];
    e[n - 1] = -c[n - 1];

    let r = T::one() / clamp_pivot(b[1], eps, &mut hits);
    d[1] = r * d[1];
    e[1] = r * e[1];
    c[1] = r * c[1];
    for i in 2..n {
        let r = T::one() / clamp_pivot(b[i] - a[i] * c[i - 1], eps, &mut hits);
        d[i] = r * (d[i] - a[i] * d[i - 1]);
        e[i] = r * (e[i] - a[i] * e[i - 1]);
        c[i] = r * c[i];
    }
    for i in (1..n - 1).rev() {
        d[i] = d[i] - c[i] * d[i + 1];
        e[i] = e[i] - c[i] * e[i + 1];
    }

    // Row 0 closes the system: b0·x0 + c0·x1 + a0·x_{n-1} = d0.
    let den = clamp_pivot(
        b[0] + a[0] * e[n - 1] + c[0] * e[1],
        eps,
        &mut hits,
    );
    let x0 = (d[0] - a[0] * d[n - 1] - c[0] * d[1]) / den;
    d[0] = x0;
    for i in 1..n {
        d[i] = d[i] + e[i] * x0;
    }
    hits
}
