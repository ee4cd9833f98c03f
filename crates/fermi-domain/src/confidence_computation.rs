//! Confidence arithmetic
//!
//! Deterministic helpers shared by model scoring, formula execution and
//! fusion. All functions are total: empty input yields `None` rather than a
//! guessed default.

/// Geometric mean of confidences
///
/// Used wherever sub-estimates multiply together, since multiplicative
/// error propagation matches geometric combination. Any non-positive
/// entry collapses the mean to 0.
pub fn geometric_mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    if values.iter().any(|v| *v <= 0.0) {
        return Some(0.0);
    }
    let log_sum: f64 = values.iter().map(|v| v.ln()).sum();
    Some((log_sum / values.len() as f64).exp())
}

/// Weighted average of `(value, weight)` pairs
///
/// Returns `None` when the total weight is not positive.
pub fn weighted_average(pairs: &[(f64, f64)]) -> Option<f64> {
    let total_weight: f64 = pairs.iter().map(|(_, w)| *w).sum();
    if total_weight <= 0.0 {
        return None;
    }
    let sum: f64 = pairs.iter().map(|(v, w)| v * w).sum();
    Some(sum / total_weight)
}

/// Relative difference `|a - b| / max(|a|, |b|)`
///
/// Two zeros are identical (0.0).
pub fn relative_difference(a: f64, b: f64) -> f64 {
    let scale = a.abs().max(b.abs());
    if scale == 0.0 {
        return 0.0;
    }
    (a - b).abs() / scale
}

/// Move `base` toward 1.0 by `share` of the remaining headroom
///
/// Strictly increases any `base < 1.0` when `share > 0`.
pub fn agreement_boost(base: f64, share: f64) -> f64 {
    let base = base.clamp(0.0, 1.0);
    (base + (1.0 - base) * share.clamp(0.0, 1.0)).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_geometric_mean_basic() {
        assert_eq!(geometric_mean(&[]), None);
        let gm = geometric_mean(&[0.5, 0.5]).unwrap();
        assert!((gm - 0.5).abs() < 1e-12);
        let gm = geometric_mean(&[0.25, 1.0]).unwrap();
        assert!((gm - 0.5).abs() < 1e-12);
        assert_eq!(geometric_mean(&[0.9, 0.0]), Some(0.0));
    }

    #[test]
    fn test_weighted_average_basic() {
        let avg = weighted_average(&[(90_000.0, 0.7), (150_000.0, 0.7)]).unwrap();
        assert!((avg - 120_000.0).abs() < 1e-6);
        assert_eq!(weighted_average(&[(1.0, 0.0)]), None);
    }

    #[test]
    fn test_relative_difference() {
        assert_eq!(relative_difference(0.0, 0.0), 0.0);
        assert!((relative_difference(100.0, 80.0) - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_agreement_boost_saturates() {
        assert!((agreement_boost(0.7, 0.5) - 0.85).abs() < 1e-12);
        assert_eq!(agreement_boost(1.0, 0.5), 1.0);
    }

    proptest! {
        #[test]
        fn geometric_mean_between_min_and_max(
            values in prop::collection::vec(0.01f64..1.0, 1..10)
        ) {
            let gm = geometric_mean(&values).unwrap();
            let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            prop_assert!(gm >= min - 1e-9);
            prop_assert!(gm <= max + 1e-9);
        }

        #[test]
        fn weighted_average_between_min_and_max(
            pairs in prop::collection::vec((0.0f64..1e9, 0.01f64..1.0), 1..6)
        ) {
            let avg = weighted_average(&pairs).unwrap();
            let min = pairs.iter().map(|(v, _)| *v).fold(f64::INFINITY, f64::min);
            let max = pairs.iter().map(|(v, _)| *v).fold(f64::NEG_INFINITY, f64::max);
            prop_assert!(avg >= min * (1.0 - 1e-9) - 1e-9);
            prop_assert!(avg <= max * (1.0 + 1e-9) + 1e-9);
        }

        #[test]
        fn agreement_boost_strictly_increases(base in 0.0f64..0.999, share in 0.01f64..1.0) {
            prop_assert!(agreement_boost(base, share) > base);
        }
    }
}
