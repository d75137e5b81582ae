//! Batched Thomas kernels over many independent systems.
//!
//! Data has shape `(n_sys, n_row)`: the first axis indexes independent
//! systems, the second runs along the solving direction. The serial
//! variants sweep row by row with the system axis as the inner loop, so
//! storage with the system axis contiguous vectorizes; any stride is
//! accepted. Semantics are pointwise identical to applying the scalar
//! kernel to each system.

use ndarray::{Array2, ArrayView2, ArrayViewMut2, ShapeBuilder};
use num_traits::Float;

use crate::error::TdError;
use crate::kernel::{SolveStats, clamp_pivot};

#[cfg(feature = "rayon")]
use ndarray::{Axis, Zip};
#[cfg(feature = "rayon")]
use std::sync::atomic::{AtomicUsize, Ordering};

/// Solve `n_sys` tridiagonal systems in place; `d` exits as the solution.
pub fn tdma_many<T: Float>(
    a: ArrayView2<T>,
    b: ArrayView2<T>,
    mut c: ArrayViewMut2<T>,
    mut d: ArrayViewMut2<T>,
    pivot_eps: T,
) -> Result<SolveStats, TdError> {
    let (n_sys, n_row) = check_batch(&a, &b, &c.view(), &d.view(), 1)?;
    let mut hits = 0;

    for s in 0..n_sys {
        let r = T::one() / clamp_pivot(b[[s, 0]], pivot_eps, &mut hits);
        d[[s, 0]] = r * d[[s, 0]];
        c[[s, 0]] = r * c[[s, 0]];
    }
    for i in 1..n_row {
        for s in 0..n_sys {
            let r = T::one() / clamp_pivot(b[[s, i]] - a[[s, i]] * c[[s, i - 1]], pivot_eps, &mut hits);
            d[[s, i]] = r * (d[[s, i]] - a[[s, i]] * d[[s, i - 1]]);
            c[[s, i]] = r * c[[s, i]];
        }
    }
    for i in (0..n_row - 1).rev() {
        for s in 0..n_sys {
            d[[s, i]] = d[[s, i]] - c[[s, i]] * d[[s, i + 1]];
        }
    }
    Ok(SolveStats {
        pivot_breakdowns: hits,
    })
}

/// Solve `n_sys` cyclic tridiagonal systems in place.
///
/// Per system, `a[.., 0]` and `c[.., n_row-1]` are the wrap coefficients.
/// Requires `n_row >= 3`.
pub fn tdma_cycl_many<T: Float>(
    a: ArrayView2<T>,
    b: ArrayView2<T>,
    mut c: ArrayViewMut2<T>,
    mut d: ArrayViewMut2<T>,
    pivot_eps: T,
) -> Result<SolveStats, TdError> {
    let (n_sys, n_row) = check_batch(&a, &b, &c.view(), &d.view(), 3)?;
    let mut hits = 0;
    let n = n_row;

    let mut e = Array2::<T>::zeros((n_sys, n_row).f());
    for s in 0..n_sys {
        e[[s, 1]] = -a[[s, 1]];
        e[[s, n - 1]] = -c[[s, n - 1]];
    }
    for s in 0..n_sys {
        let r = T::one() / clamp_pivot(b[[s, 1]], pivot_eps, &mut hits);
        d[[s, 1]] = r * d[[s, 1]];
        e[[s, 1]] = r * e[[s, 1]];
        c[[s, 1]] = r * c[[s, 1]];
    }
    for i in 2..n {
        for s in 0..n_sys {
            let r = T::one() / clamp_pivot(b[[s, i]] - a[[s, i]] * c[[s, i - 1]], pivot_eps, &mut hits);
            d[[s, i]] = r * (d[[s, i]] - a[[s, i]] * d[[s, i - 1]]);
            e[[s, i]] = r * (e[[s, i]] - a[[s, i]] * e[[s, i - 1]]);
            c[[s, i]] = r * c[[s, i]];
        }
    }
    for i in (1..n - 1).rev() {
        for s in 0..n_sys {
            d[[s, i]] = d[[s, i]] - c[[s, i]] * d[[s, i + 1]];
            e[[s, i]] = e[[s, i]] - c[[s, i]] * e[[s, i + 1]];
        }
    }
    for s in 0..n_sys {
        let den = clamp_pivot(
            b[[s, 0]] + a[[s, 0]] * e[[s, n - 1]] + c[[s, 0]] * e[[s, 1]],
            pivot_eps,
            &mut hits,
        );
        let x0 = (d[[s, 0]] - a[[s, 0]] * d[[s, n - 1]] - c[[s, 0]] * d[[s, 1]]) / den;
        d[[s, 0]] = x0;
        for i in 1..n {
            d[[s, i]] = d[[s, i]] + e[[s, i]] * x0;
        }
    }
    Ok(SolveStats {
        pivot_breakdowns: hits,
    })
}

/// [`tdma_many`] with the independent-system axis fanned over the rayon
/// pool, one lane per system.
#[cfg(feature = "rayon")]
pub fn tdma_many_par<T: Float + Send + Sync>(
    a: ArrayView2<T>,
    b: ArrayView2<T>,
    mut c: ArrayViewMut2<T>,
    mut d: ArrayViewMut2<T>,
    pivot_eps: T,
) -> Result<SolveStats, TdError> {
    check_batch(&a, &b, &c.view(), &d.view(), 1)?;
    let hits = AtomicUsize::new(0);
    Zip::from(a.lanes(Axis(1)))
        .and(b.lanes(Axis(1)))
        .and(c.lanes_mut(Axis(1)))
        .and(d.lanes_mut(Axis(1)))
        .par_for_each(|la, lb, lc, ld| {
            let k = crate::kernel::thomas::tdma_lane(la, lb, lc, ld, pivot_eps);
            if k > 0 {
                hits.fetch_add(k, Ordering::Relaxed);
            }
        });
    Ok(SolveStats {
        pivot_breakdowns: hits.into_inner(),
    })
}

/// [`tdma_cycl_many`] with one lane per system on the rayon pool.
#[cfg(feature = "rayon")]
pub fn tdma_cycl_many_par<T: Float + Send + Sync>(
    a: ArrayView2<T>,
    b: ArrayView2<T>,
    mut c: ArrayViewMut2<T>,
    mut d: ArrayViewMut2<T>,
    pivot_eps: T,
) -> Result<SolveStats, TdError> {
    check_batch(&a, &b, &c.view(), &d.view(), 3)?;
    let hits = AtomicUsize::new(0);
    Zip::from(a.lanes(Axis(1)))
        .and(b.lanes(Axis(1)))
        .and(c.lanes_mut(Axis(1)))
        .and(d.lanes_mut(Axis(1)))
        .par_for_each(|la, lb, lc, ld| {
            let k = crate::kernel::thomas::tdma_cycl_lane(la, lb, lc, ld, pivot_eps);
            if k > 0 {
                hits.fetch_add(k, Ordering::Relaxed);
            }
        });
    Ok(SolveStats {
        pivot_breakdowns: hits.into_inner(),
    })
}

pub(crate) fn check_batch<T>(
    a: &ArrayView2<T>,
    b: &ArrayView2<T>,
    c: &ArrayView2<T>,
    d: &ArrayView2<T>,
    min_rows: usize,
) -> Result<(usize, usize), TdError> {
    let dim = d.dim();
    if a.dim() != dim || b.dim() != dim || c.dim() != dim {
        return Err(TdError::Shape(format!(
            "coefficient blocks differ in shape: a={:?}, b={:?}, c={:?}, d={:?}",
            a.dim(),
            b.dim(),
            c.dim(),
            dim
        )));
    }
    if dim.1 < min_rows {
        return Err(TdError::Config(format!(
            "system length {} below minimum {min_rows}",
            dim.1
        )));
    }
    Ok(dim)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::thomas::{tdma, tdma_cycl};
    use approx::assert_abs_diff_eq;
    use ndarray::Array2;

    fn batch_fixture(n_sys: usize, n_row: usize) -> (Array2<f64>, Array2<f64>, Array2<f64>, Array2<f64>) {
        let mut a = Array2::zeros((n_sys, n_row).f());
        let mut b = Array2::zeros((n_sys, n_row).f());
        let mut c = Array2::zeros((n_sys, n_row).f());
        let mut d = Array2::zeros((n_sys, n_row).f());
        for s in 0..n_sys {
            for i in 0..n_row {
                a[[s, i]] = -1.0 - 0.01 * s as f64;
                b[[s, i]] = 4.0 + 0.1 * s as f64;
                c[[s, i]] = -1.0 + 0.005 * (i as f64).sin();
                d[[s, i]] = ((i * 7 + s * 3) % 11) as f64 - 5.0;
            }
        }
        (a, b, c, d)
    }

    #[test]
    fn batch_matches_scalar_per_system() {
        let (a, b, c, d) = batch_fixture(5, 12);
        let mut cb = c.clone();
        let mut db = d.clone();
        tdma_many(a.view(), b.view(), cb.view_mut(), db.view_mut(), f64::MIN_POSITIVE).unwrap();

        for s in 0..5 {
            let av: Vec<f64> = a.row(s).to_vec();
            let bv: Vec<f64> = b.row(s).to_vec();
            let mut cv: Vec<f64> = c.row(s).to_vec();
            let mut dv: Vec<f64> = d.row(s).to_vec();
            tdma(&av, &bv, &mut cv, &mut dv, f64::MIN_POSITIVE).unwrap();
            for i in 0..12 {
                assert_abs_diff_eq!(db[[s, i]], dv[i], epsilon = 1e-14);
            }
        }
    }

    #[test]
    fn cyclic_batch_matches_scalar_per_system() {
        let (a, b, c, d) = batch_fixture(4, 9);
        let mut cb = c.clone();
        let mut db = d.clone();
        tdma_cycl_many(a.view(), b.view(), cb.view_mut(), db.view_mut(), f64::MIN_POSITIVE)
            .unwrap();

        for s in 0..4 {
            let av: Vec<f64> = a.row(s).to_vec();
            let bv: Vec<f64> = b.row(s).to_vec();
            let mut cv: Vec<f64> = c.row(s).to_vec();
            let mut dv: Vec<f64> = d.row(s).to_vec();
            tdma_cycl(&av, &bv, &mut cv, &mut dv, f64::MIN_POSITIVE).unwrap();
            for i in 0..9 {
                assert_abs_diff_eq!(db[[s, i]], dv[i], epsilon = 1e-13);
            }
        }
    }

    #[cfg(feature = "rayon")]
    #[test]
    fn par_variants_match_serial_batch() {
        let (a, b, c, d) = batch_fixture(16, 20);

        let mut c1 = c.clone();
        let mut d1 = d.clone();
        tdma_many(a.view(), b.view(), c1.view_mut(), d1.view_mut(), f64::MIN_POSITIVE).unwrap();
        let mut c2 = c.clone();
        let mut d2 = d.clone();
        tdma_many_par(a.view(), b.view(), c2.view_mut(), d2.view_mut(), f64::MIN_POSITIVE)
            .unwrap();
        for (u, v) in d1.iter().zip(d2.iter()) {
            assert_abs_diff_eq!(u, v, epsilon = 1e-14);
        }

        let mut c3 = c.clone();
        let mut d3 = d.clone();
        tdma_cycl_many(a.view(), b.view(), c3.view_mut(), d3.view_mut(), f64::MIN_POSITIVE)
            .unwrap();
        let mut c4 = c.clone();
        let mut d4 = d.clone();
        tdma_cycl_many_par(a.view(), b.view(), c4.view_mut(), d4.view_mut(), f64::MIN_POSITIVE)
            .unwrap();
        for (u, v) in d3.iter().zip(d4.iter()) {
            assert_abs_diff_eq!(u, v, epsilon = 1e-13);
        }
    }

    #[test]
    fn shape_mismatch_is_rejected() {
        let a = Array2::<f64>::zeros((3, 5));
        let b = Array2::<f64>::zeros((3, 5));
        let mut c = Array2::<f64>::zeros((3, 4));
        let mut d = Array2::<f64>::zeros((3, 5));
        assert!(
            tdma_many(a.view(), b.view(), c.view_mut(), d.view_mut(), f64::MIN_POSITIVE).is_err()
        );
    }
}
