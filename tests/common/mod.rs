//! Shared helpers for the SPMD integration tests: run one closure per
//! rank on scoped threads, and build deterministic global systems that
//! every rank reconstructs identically from the seed.

#![allow(dead_code)]

use std::thread;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tridist::LocalComm;

/// Run `f` once per rank, each on its own thread with its own endpoint.
pub fn spmd(p: usize, f: impl Fn(LocalComm) + Sync) {
    let comms = LocalComm::split(p);
    thread::scope(|s| {
        for comm in comms {
            s.spawn(|| f(comm));
        }
    });
}

/// Seeded vector with entries in `[0, 1)`.
pub fn random_vec(seed: u64, n: usize) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n).map(|_| rng.r#gen::<f64>()).collect()
}

/// Apply the global tridiagonal given by coefficient streams `a, b, c`
/// (optionally with wraparound) to `x`.
pub fn apply_global(a: &[f64], b: &[f64], c: &[f64], x: &[f64], cyclic: bool) -> Vec<f64> {
    let n = x.len();
    let mut y = vec![0.0; n];
    for i in 0..n {
        y[i] = b[i] * x[i];
        if i > 0 {
            y[i] += a[i] * x[i - 1];
        }
        if i + 1 < n {
            y[i] += c[i] * x[i + 1];
        }
    }
    if cyclic {
        y[0] += a[0] * x[n - 1];
        y[n - 1] += c[n - 1] * x[0];
    }
    y
}

/// `‖x − y‖₂ / len`, the per-unknown error norm.
pub fn rel_err(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len() as f64;
    x.iter()
        .zip(y)
        .map(|(u, v)| (u - v) * (u - v))
        .sum::<f64>()
        .sqrt()
        / n
}
