//! Log-space arithmetic shared by every sweep.
//!
//! Probabilities are carried as natural logarithms. Multiplication becomes
//! addition and marginalization becomes log-sum-exp, evaluated as
//! `m + ln(Σ exp(xᵢ − m))` with `m = max xᵢ` so nothing underflows.

/// Numerically stable `ln(exp(a) + exp(b))`.
///
/// Either argument may be `-inf`; the sum of two `-inf` is `-inf`.
#[inline]
pub fn log_sum_exp(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let (hi, lo) = if a >= b { (a, b) } else { (b, a) };
    hi + (lo - hi).exp().ln_1p()
}

/// Log-sum-exp over a slice. Empty or all `-inf` input yields `-inf`.
pub fn log_sum_exp_slice(xs: &[f64]) -> f64 {
    let max = xs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    let sum: f64 = xs.iter().map(|&x| (x - max).exp()).sum();
    max + sum.ln()
}

/// Streaming log-sum accumulator.
///
/// Used where terms arrive one at a time (predecessor scans, stochastic
/// bucket groups) and materializing a slice would cost an allocation.
#[derive(Clone, Copy, Debug)]
pub struct LogSum(f64);

impl LogSum {
    #[inline]
    pub fn new() -> Self {
        LogSum(f64::NEG_INFINITY)
    }

    #[inline]
    pub fn add(&mut self, x: f64) {
        self.0 = log_sum_exp(self.0, x);
    }

    #[inline]
    pub fn value(self) -> f64 {
        self.0
    }
}

impl Default for LogSum {
    fn default() -> Self {
        Self::new()
    }
}

impl FromIterator<f64> for LogSum {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        let mut acc = LogSum::new();
        for x in iter {
            acc.add(x);
        }
        acc
    }
}

/// `ln(p)`, mapping `p == 0` to `-inf`.
#[inline]
pub fn to_log(p: f64) -> f64 {
    if p <= 0.0 {
        f64::NEG_INFINITY
    } else {
        p.ln()
    }
}
