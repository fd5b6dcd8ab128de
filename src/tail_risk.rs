// src/tail_risk.rs
//
// Tail metrics for simulated loss distributions.
//
// Losses are positive percentages of total royalties, so the risky tail is
// the UPPER tail: VaR at confidence c is the c-quantile, and expected
// shortfall averages the losses at or beyond it.
//
// Quantiles use linear interpolation between closest ranks (the same
// convention as numpy's default percentile). Non-finite samples are
// dropped before sorting.

use serde::{Deserialize, Serialize};

/// Confidence levels reported for every simulation.
pub const VAR_LEVELS: [f64; 3] = [0.90, 0.95, 0.99];

// ============================================================================
// Quantiles
// ============================================================================

/// Finite samples, ascending.
pub fn sorted_finite(data: &[f64]) -> Vec<f64> {
    let mut out: Vec<f64> = data.iter().copied().filter(|x| x.is_finite()).collect();
    out.sort_by(f64::total_cmp);
    out
}

/// Quantile `p` (in [0, 1]) of an ascending slice. NaN when empty.
pub fn quantile_sorted(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    match n {
        0 => return f64::NAN,
        1 => return sorted[0],
        _ => {}
    }
    let rank = p.clamp(0.0, 1.0) * (n - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = (lo + 1).min(n - 1);
    let frac = rank - lo as f64;
    if frac == 0.0 || lo == hi {
        return sorted[lo];
    }
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Percentile `q` in [0, 100] of unsorted data.
pub fn percentile(data: &[f64], q: f64) -> f64 {
    quantile_sorted(&sorted_finite(data), q / 100.0)
}

// ============================================================================
// VaR / ES
// ============================================================================

/// Upper-tail value at risk: the `confidence` quantile of the losses.
pub fn var_upper(losses: &[f64], confidence: f64) -> f64 {
    quantile_sorted(&sorted_finite(losses), confidence)
}

/// Mean of the losses at or above VaR. Falls back to VaR itself when the
/// tail is empty; NaN for empty input.
pub fn expected_shortfall(losses: &[f64], confidence: f64) -> f64 {
    let sorted = sorted_finite(losses);
    let var = quantile_sorted(&sorted, confidence);
    if !var.is_finite() {
        return f64::NAN;
    }
    // `sorted` is ascending, so the tail is a suffix.
    let start = sorted.partition_point(|&x| x < var);
    let tail = &sorted[start..];
    if tail.is_empty() {
        return var;
    }
    tail.iter().sum::<f64>() / tail.len() as f64
}

// ============================================================================
// Wilson interval
// ============================================================================

/// Wilson score interval for `k` successes in `n` trials at level `1 - alpha`.
/// `(0, 1)` when `n == 0`.
pub fn wilson_ci(k: u64, n: u64, alpha: f64) -> (f64, f64) {
    if n == 0 {
        return (0.0, 1.0);
    }
    let z = normal_quantile(1.0 - alpha / 2.0);
    let z2 = z * z;
    let nf = n as f64;
    let p = k as f64 / nf;

    let denom = 1.0 + z2 / nf;
    let center = p + z2 / (2.0 * nf);
    let margin = z * (p * (1.0 - p) / nf + z2 / (4.0 * nf * nf)).sqrt();

    (
        ((center - margin) / denom).max(0.0),
        ((center + margin) / denom).min(1.0),
    )
}

/// Inverse standard normal CDF, Abramowitz-Stegun 26.2.23 (|error| < 4.5e-4).
pub fn normal_quantile(p: f64) -> f64 {
    if p <= 0.0 {
        return f64::NEG_INFINITY;
    }
    if p >= 1.0 {
        return f64::INFINITY;
    }
    if (p - 0.5).abs() < 1e-15 {
        return 0.0;
    }

    const C: [f64; 3] = [2.515517, 0.802853, 0.010328];
    const D: [f64; 3] = [1.432788, 0.189269, 0.001308];

    let (sign, tail) = if p > 0.5 { (1.0, 1.0 - p) } else { (-1.0, p) };
    let t = (-2.0 * tail.ln()).sqrt();
    let num = C[0] + C[1] * t + C[2] * t * t;
    let den = 1.0 + D[0] * t + D[1] * t * t + D[2] * t * t * t;
    sign * (t - num / den)
}

// ============================================================================
// Output structures
// ============================================================================

/// `P(loss > threshold)` with a Wilson interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExceedanceProbability {
    pub threshold: f64,
    pub point_estimate: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
    pub ci_level: f64,
    pub exceed_count: u64,
    pub total: u64,
}

impl ExceedanceProbability {
    pub fn compute(losses: &[f64], threshold: f64, ci_level: f64) -> Self {
        let finite = losses.iter().filter(|x| x.is_finite());
        let total = finite.clone().count() as u64;
        let exceed_count = finite.filter(|&&x| x > threshold).count() as u64;
        let point_estimate = if total > 0 {
            exceed_count as f64 / total as f64
        } else {
            0.0
        };
        let (ci_lower, ci_upper) = wilson_ci(exceed_count, total, 1.0 - ci_level);
        Self {
            threshold,
            point_estimate,
            ci_lower,
            ci_upper,
            ci_level,
            exceed_count,
            total,
        }
    }
}
