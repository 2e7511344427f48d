//! Distance → 0–100 similarity score.
//!
//! The score is an interpretability layer over the collaborator's raw
//! distance. It is advisory: `verified` always comes from the collaborator's
//! own threshold comparison and never from this score.

/// Score assigned to a distance exactly at the threshold.
const THRESHOLD_SCORE: f64 = 50.0;
const MAX_SCORE: f64 = 100.0;
const MIN_SCORE: f64 = 0.0;
/// Distance at which the above-threshold segment reaches zero.
const ZERO_SCORE_DISTANCE: f64 = 1.0;

/// Map `distance` and the threshold the collaborator used to a score in [0, 100].
///
/// Two linear segments anchored at `threshold → 50`:
/// - `[0, threshold]` maps onto `[100, 50]`
/// - `(threshold, 1]` maps onto `[50, 0)`, clamped at 0 beyond
///
/// Degenerate thresholds never panic: a non-positive threshold scores every
/// positive distance 0, and a threshold at or above 1 scores anything past it 0.
pub fn normalize(distance: f64, threshold: f64) -> f64 {
    if distance.is_nan() || threshold.is_nan() {
        return MIN_SCORE;
    }
    let distance = distance.max(0.0);

    if threshold <= 0.0 {
        return if distance <= 0.0 { MAX_SCORE } else { MIN_SCORE };
    }

    let score = if distance <= threshold {
        MAX_SCORE - (distance / threshold) * (MAX_SCORE - THRESHOLD_SCORE)
    } else {
        let span = ZERO_SCORE_DISTANCE - threshold;
        if span <= 0.0 {
            MIN_SCORE
        } else {
            THRESHOLD_SCORE - ((distance - threshold) / span) * THRESHOLD_SCORE
        }
    };

    score.clamp(MIN_SCORE, MAX_SCORE)
}

/// Round to a fixed number of decimal places for presentation.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    const THRESHOLDS: [f64; 5] = [0.1, 0.4, 0.68, 0.9, 0.99];

    #[test]
    fn test_threshold_maps_to_fifty() {
        for t in THRESHOLDS {
            assert_eq!(normalize(t, t), 50.0, "threshold {t}");
        }
    }

    #[test]
    fn test_zero_distance_is_full_score() {
        assert_eq!(normalize(0.0, 0.68), 100.0);
    }

    #[test]
    fn test_distance_one_is_zero() {
        assert!(normalize(1.0, 0.68).abs() < 1e-9);
    }

    #[test]
    fn test_below_threshold_segment_monotone_and_bounded() {
        for t in THRESHOLDS {
            let mut prev = f64::INFINITY;
            for i in 0..=200 {
                let d = t * (i as f64 / 200.0);
                let s = normalize(d, t);
                assert!((50.0..=100.0).contains(&s), "d={d} t={t} s={s}");
                assert!(s <= prev, "not non-increasing at d={d} t={t}");
                prev = s;
            }
        }
    }

    #[test]
    fn test_above_threshold_segment_monotone_and_bounded() {
        for t in THRESHOLDS {
            let mut prev = normalize(t, t);
            for i in 1..=200 {
                let d = t + (1.0 - t) * (i as f64 / 200.0);
                let s = normalize(d, t);
                assert!((0.0..=50.0).contains(&s), "d={d} t={t} s={s}");
                assert!(s <= prev, "not non-increasing at d={d} t={t}");
                prev = s;
            }
        }
    }

    #[test]
    fn test_beyond_one_clamps_to_zero() {
        assert_eq!(normalize(1.7, 0.68), 0.0);
        assert_eq!(normalize(2.0, 0.4), 0.0);
    }

    #[test]
    fn test_same_person_example() {
        let s = normalize(0.2, 0.68);
        assert!((s - 85.2941).abs() < 1e-3, "got {s}");
        assert_eq!(round_to(s, 2), 85.29);
    }

    #[test]
    fn test_different_person_example() {
        let s = normalize(0.9, 0.68);
        assert!((s - 15.625).abs() < 1e-9, "got {s}");
    }

    #[test]
    fn test_threshold_at_or_above_one_does_not_divide_by_zero() {
        assert_eq!(normalize(1.0, 1.0), 50.0);
        assert_eq!(normalize(1.2, 1.0), 0.0);
        assert_eq!(normalize(1.5, 1.3), 0.0);
        assert_eq!(normalize(0.65, 1.3), 75.0);
    }

    #[test]
    fn test_threshold_near_one_stays_finite() {
        let s = normalize(0.999_999_9, 0.999_999_8);
        assert!(s.is_finite());
        assert!((0.0..=50.0).contains(&s));
    }

    #[test]
    fn test_non_positive_threshold_fallback() {
        assert_eq!(normalize(0.0, 0.0), 100.0);
        assert_eq!(normalize(0.3, 0.0), 0.0);
        assert_eq!(normalize(0.3, -1.0), 0.0);
    }

    #[test]
    fn test_nan_inputs_score_zero() {
        assert_eq!(normalize(f64::NAN, 0.68), 0.0);
        assert_eq!(normalize(0.2, f64::NAN), 0.0);
    }

    #[test]
    fn test_negative_distance_treated_as_zero() {
        assert_eq!(normalize(-0.1, 0.68), 100.0);
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(0.123456, 4), 0.1235);
        assert_eq!(round_to(85.294117, 2), 85.29);
    }
}
