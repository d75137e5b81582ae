//! Numerical options shared by plans and kernels.

/// Knobs applied by every kernel invocation.
#[derive(Debug, Clone, Copy)]
pub struct SolveOptions {
    /// Pivot magnitudes below this are clamped to `±pivot_eps` and counted
    /// as a breakdown in the returned stats. The default only guards
    /// against division by zero or denormal pivots; raising it makes the
    /// clamp alter legitimately small pivots, so the solve result should
    /// then be rejected whenever the breakdown count is nonzero.
    pub pivot_eps: f64,
}

impl Default for SolveOptions {
    fn default() -> Self {
        SolveOptions {
            pivot_eps: f64::MIN_POSITIVE,
        }
    }
}
