//! Per-task utility curves.
//!
//! A task worked on for `x` slots earns `priority * P(D <= x)` where `D` is
//! log-normally distributed around the estimated duration; the confidence
//! setting narrows the distribution (`sd = mean / (confidence + 3)`). The
//! solver wants integers, so curves are tabulated at every slot in
//! `0..=total_slots`, scaled by `YSCALE` and rounded.
//!
//! Two tables per task: the CDF itself (terminal utility) and its running
//! integral (the area term of the cumulative-utility-function).

use cascade_core::YSCALE;
use statrs::distribution::{ContinuousCDF, LogNormal};

/// Parameters of the underlying normal for a log-normal with the given mean
/// and standard deviation.
fn lognorm_params(mean: f64, sd: f64) -> (f64, f64) {
    let s = (1.0 + (sd / mean).powi(2)).ln().sqrt();
    let scale = mean / (s * s / 2.0).exp();
    (s, scale)
}

/// CDF values at `0..=total_slots`. With `sd == 0` the distribution
/// degenerates to a step at the estimated duration.
fn cdf_samples(duration: i64, confidence: i64, total_slots: i64) -> Vec<f64> {
    let sd = duration / (confidence + 3);
    let mean = duration as f64;

    if sd == 0 {
        return (0..=total_slots)
            .map(|x| if x < duration { 0.0 } else { 1.0 })
            .collect();
    }

    let (s, scale) = lognorm_params(mean, sd as f64);
    // Location of the underlying normal is ln(scale).
    match LogNormal::new(scale.ln(), s) {
        Ok(dist) => (0..=total_slots).map(|x| dist.cdf(x as f64)).collect(),
        Err(_) => (0..=total_slots)
            .map(|x| if x < duration { 0.0 } else { 1.0 })
            .collect(),
    }
}

/// Terminal utility table: `round(priority * CDF(x) * YSCALE)` for every slot
/// count `x` in `0..=total_slots`.
pub fn utility_table(
    duration: i64,
    confidence: i64,
    priority: i64,
    total_slots: i64,
) -> Vec<i64> {
    cdf_samples(duration, confidence, total_slots)
        .into_iter()
        .map(|p| (p * (priority * YSCALE) as f64).round() as i64)
        .collect()
}

/// Integral utility table: `round(priority * (integral of CDF from 0 to x) *
/// YSCALE)`, computed as a running trapezoid sum on the slot grid.
pub fn utility_integral_table(
    duration: i64,
    confidence: i64,
    priority: i64,
    total_slots: i64,
) -> Vec<i64> {
    let samples = cdf_samples(duration, confidence, total_slots);
    let mut table = Vec::with_capacity(samples.len());
    let mut area = 0.0;
    let mut prev = None;
    for p in samples {
        if let Some(prev) = prev {
            area += (prev + p) / 2.0;
        }
        prev = Some(p);
        table.push((area * (priority * YSCALE) as f64).round() as i64);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn zero_sigma_is_a_step_function() {
        // duration 2 < confidence + 3, so integer sd is zero.
        let table = utility_table(2, 4, 1, 6);
        assert_eq!(table, vec![0, 0, 100, 100, 100, 100, 100]);
    }

    #[test]
    fn table_is_monotone_and_bounded() {
        let table = utility_table(12, 1, 3, 100);
        assert_eq!(table.len(), 101);
        assert_eq!(table[0], 0);
        for pair in table.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
        assert!(*table.last().unwrap() <= 3 * YSCALE);
    }

    #[test]
    fn cdf_crosses_half_near_the_estimate() {
        // The log-normal median sits slightly below the mean; the curve
        // should be far from saturated at the estimate and high well past it.
        let table = utility_table(12, 1, 1, 100);
        assert!(table[12] > 30 && table[12] < 70, "got {}", table[12]);
        assert!(table[40] > 90);
    }

    #[test]
    fn priority_scales_linearly() {
        let base = utility_table(12, 2, 1, 50);
        let scaled = utility_table(12, 2, 5, 50);
        for (b, s) in base.iter().zip(&scaled) {
            assert!((s - 5 * b).abs() <= 3, "rounding drift: {b} vs {s}");
        }
    }

    #[test]
    fn integral_table_is_convexly_increasing() {
        let table = utility_integral_table(6, 1, 1, 60);
        assert_eq!(table[0], 0);
        for pair in table.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
        // Increments approach priority * YSCALE per slot once saturated.
        let tail = table[59] - table[58];
        assert!((tail - YSCALE).abs() <= 2, "tail increment {tail}");
    }

    #[test]
    fn zero_sigma_integral_counts_slots_past_duration() {
        let table = utility_integral_table(2, 4, 1, 6);
        // Trapezoid across the step at x = 2 contributes half a slot.
        assert_eq!(table[2], 50);
        assert_eq!(table[3], 150);
        assert_eq!(table[6], 450);
    }
}
