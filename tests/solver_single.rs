//! End-to-end single-system solves over in-process ranks.

mod common;

use std::sync::Mutex;

use common::{apply_global, random_vec, rel_err, spmd};
use tridist::{Comm, SinglePlan, SolveOptions, partition, tdma, tdma_cycl};

/// Solve one global system of size `n` over `p` ranks and return the
/// assembled solution (every rank writes its slice).
fn solve_global(
    p: usize,
    ga: &[f64],
    gb: &[f64],
    gc: &[f64],
    gd: &[f64],
    cyclic: bool,
) -> Vec<f64> {
    let n = gb.len();
    let out = Mutex::new(vec![0.0; n]);
    spmd(p, |comm| {
        let rank = comm.rank();
        let range = partition(n, p, rank).unwrap();
        let mut a = ga[range.clone()].to_vec();
        let b = gb[range.clone()].to_vec();
        let mut c = gc[range.clone()].to_vec();
        let mut d = gd[range.clone()].to_vec();

        let mut plan =
            SinglePlan::create(comm, 0, range.len(), SolveOptions::default()).unwrap();
        let stats = if cyclic {
            plan.solve_cyclic(&mut a, &b, &mut c, &mut d).unwrap()
        } else {
            plan.solve(&mut a, &b, &mut c, &mut d).unwrap()
        };
        assert!(stats.is_clean());
        plan.destroy();

        out.lock().unwrap()[range].copy_from_slice(&d);
    });
    out.into_inner().unwrap()
}

// Two ranks, ten rows, coefficients (1, 2, 1), right-hand side built from
// a known random solution.
#[test]
fn two_ranks_recover_random_solution() {
    let n = 10;
    let a = vec![1.0; n];
    let b = vec![2.0; n];
    let c = vec![1.0; n];
    let x = random_vec(42, n);
    let d = apply_global(&a, &b, &c, &x, false);
    let sol = solve_global(2, &a, &b, &c, &d, false);
    assert!(rel_err(&sol, &x) < 1e-14, "err = {:e}", rel_err(&sol, &x));
}

// Parallel solves agree with the serial kernel for every rank count, on
// random diagonally dominant data.
#[test]
fn parallel_agrees_with_serial_kernel() {
    let n = 64;
    let a: Vec<f64> = random_vec(5, n).iter().map(|v| -v).collect();
    let b: Vec<f64> = random_vec(6, n).iter().map(|v| 3.0 + v).collect();
    let c: Vec<f64> = random_vec(7, n).iter().map(|v| -v).collect();
    let d = random_vec(8, n);

    let mut c_ref = c.clone();
    let mut x_ref = d.clone();
    tdma(&a, &b, &mut c_ref, &mut x_ref, f64::MIN_POSITIVE).unwrap();

    for p in [1, 2, 3, 4, 8] {
        let sol = solve_global(p, &a, &b, &c, &d, false);
        let err = rel_err(&sol, &x_ref);
        assert!(err < 1e-13, "p = {p}: err = {err:e}");
    }
}

// Same data solved with P and 2P ranks gives matching solutions.
#[test]
fn doubling_the_rank_count_is_invariant() {
    let n = 96;
    let a: Vec<f64> = random_vec(21, n).iter().map(|v| -v).collect();
    let b: Vec<f64> = random_vec(22, n).iter().map(|v| 3.0 + v).collect();
    let c: Vec<f64> = random_vec(23, n).iter().map(|v| -v).collect();
    let d = random_vec(24, n);

    for p in [1, 2, 4] {
        let lo = solve_global(p, &a, &b, &c, &d, false);
        let hi = solve_global(2 * p, &a, &b, &c, &d, false);
        let err = rel_err(&lo, &hi);
        assert!(err < 1e-13, "p = {p} vs {}: err = {err:e}", 2 * p);
    }
}

// Cyclic circulant system: check the residual of the returned solution.
#[test]
fn cyclic_two_ranks_has_small_residual() {
    let n = 10;
    let a = vec![-1.0; n];
    let b = vec![4.0; n];
    let c = vec![-1.0; n];
    let d = random_vec(99, n);
    let sol = solve_global(2, &a, &b, &c, &d, true);
    let applied = apply_global(&a, &b, &c, &sol, true);
    let res: f64 = applied
        .iter()
        .zip(&d)
        .map(|(u, v)| (u - v) * (u - v))
        .sum::<f64>()
        .sqrt();
    assert!(res < 1e-13, "residual = {res:e}");
}

// Cyclic path across several rank counts against the serial cyclic
// kernel.
#[test]
fn cyclic_parallel_agrees_with_serial_kernel() {
    let n = 60;
    let a: Vec<f64> = random_vec(31, n).iter().map(|v| -v).collect();
    let b: Vec<f64> = random_vec(32, n).iter().map(|v| 3.0 + v).collect();
    let c: Vec<f64> = random_vec(33, n).iter().map(|v| -v).collect();
    let d = random_vec(34, n);

    let mut c_ref = c.clone();
    let mut x_ref = d.clone();
    tdma_cycl(&a, &b, &mut c_ref, &mut x_ref, f64::MIN_POSITIVE).unwrap();

    for p in [2, 3, 5] {
        let sol = solve_global(p, &a, &b, &c, &d, true);
        let err = rel_err(&sol, &x_ref);
        assert!(err < 1e-13, "p = {p}: err = {err:e}");
    }
}

// One rank must bypass the exchanges and reproduce the serial kernel
// bit for bit.
#[test]
fn degenerate_single_rank_is_bit_exact() {
    let n = 17;
    let a: Vec<f64> = random_vec(61, n).iter().map(|v| -v).collect();
    let b: Vec<f64> = random_vec(62, n).iter().map(|v| 3.0 + v).collect();
    let c: Vec<f64> = random_vec(63, n).iter().map(|v| -v).collect();
    let d = random_vec(64, n);

    let mut c_ref = c.clone();
    let mut d_ref = d.clone();
    tdma(&a, &b, &mut c_ref, &mut d_ref, f64::MIN_POSITIVE).unwrap();

    let sol = solve_global(1, &a, &b, &c, &d, false);
    assert_eq!(sol, d_ref);
}

// Two successive solves on one plan with identical inputs produce
// identical outputs.
#[test]
fn plan_reuse_is_idempotent() {
    let n = 40;
    spmd(4, |comm| {
        let p = comm.size();
        let rank = comm.rank();
        let range = partition(n, p, rank).unwrap();
        let ga: Vec<f64> = random_vec(71, n).iter().map(|v| -v).collect();
        let gb: Vec<f64> = random_vec(72, n).iter().map(|v| 3.0 + v).collect();
        let gc: Vec<f64> = random_vec(73, n).iter().map(|v| -v).collect();
        let gd = random_vec(74, n);

        let mut plan =
            SinglePlan::create(comm, 1, range.len(), SolveOptions::default()).unwrap();
        let mut first = Vec::new();
        for pass in 0..2 {
            let mut a = ga[range.clone()].to_vec();
            let b = gb[range.clone()].to_vec();
            let mut c = gc[range.clone()].to_vec();
            let mut d = gd[range.clone()].to_vec();
            plan.solve(&mut a, &b, &mut c, &mut d).unwrap();
            if pass == 0 {
                first = d;
            } else {
                assert_eq!(d, first);
            }
        }
    });
}

// Misconfigurations are rejected before any exchange.
#[test]
fn bad_configurations_are_rejected() {
    spmd(2, |comm| {
        assert!(SinglePlan::create(&comm, 2, 8, SolveOptions::default()).is_err());
        assert!(SinglePlan::create(&comm, 0, 2, SolveOptions::default()).is_err());

        let mut plan = SinglePlan::create(&comm, 0, 5, SolveOptions::default()).unwrap();
        let mut a = vec![0.0; 4];
        let b = vec![1.0; 4];
        let mut c = vec![0.0; 4];
        let mut d = vec![1.0; 4];
        assert!(plan.solve(&mut a, &b, &mut c, &mut d).is_err());
    });
}
