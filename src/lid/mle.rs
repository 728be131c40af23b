//! Levina-Bickel maximum-likelihood LID estimate.
//!
//! For a point x with nearest-neighbor distances r_1 <= ... <= r_k:
//!
//! ```text
//! LID(x) = (k - 1) / sum_{j=1}^{k-1} ln(r_k / r_j)
//! ```

/// Distances below this are raised to it before taking logarithms.
pub const DISTANCE_FLOOR: f64 = 1e-10;

/// Lower clip bound for every estimate.
pub const LID_MIN: f32 = 0.1;

/// Upper clip bound for per-point estimates.
pub const EXACT_LID_MAX: f32 = 200.0;

/// Upper clip bound for values synthesized in sample-extrapolation mode.
pub const SAMPLE_LID_MAX: f32 = 100.0;

/// Clamps `value` into `[lo, hi]`; NaN and +Inf map to `hi`.
#[must_use]
pub fn clip(value: f64, lo: f32, hi: f32) -> f32 {
    if value.is_nan() || value >= hi as f64 {
        hi
    } else if value <= lo as f64 {
        lo
    } else {
        value as f32
    }
}

/// Unclipped MLE over ascending neighbor distances.
///
/// `distances` holds the k nearest distances, self excluded, sorted
/// ascending. All-equal distances give a zero denominator and +Inf.
#[must_use]
pub fn mle_raw(distances: &[f32]) -> f64 {
    let k = distances.len();
    if k < 2 {
        return f64::INFINITY;
    }

    let r_k = (distances[k - 1] as f64).max(DISTANCE_FLOOR);
    let log_sum: f64 = distances[..k - 1]
        .iter()
        .map(|&r| (r_k / (r as f64).max(DISTANCE_FLOOR)).ln())
        .sum();

    if log_sum <= 0.0 {
        return f64::INFINITY;
    }
    (k - 1) as f64 / log_sum
}

/// Clipped per-point LID in `[LID_MIN, EXACT_LID_MAX]`.
#[must_use]
pub fn mle_lid(distances: &[f32]) -> f32 {
    clip(mle_raw(distances), LID_MIN, EXACT_LID_MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_value() {
        // r = [1, 2, 4]: sum ln(4/1) + ln(4/2) = 3 ln 2
        let lid = mle_lid(&[1.0, 2.0, 4.0]);
        let expected = 2.0 / (3.0 * std::f64::consts::LN_2);
        assert!((lid as f64 - expected).abs() < 1e-6);
    }

    #[test]
    fn test_equal_distances_clip_to_upper_bound() {
        assert_eq!(mle_lid(&[0.5; 20]), EXACT_LID_MAX);
        assert_eq!(mle_lid(&[0.0; 20]), EXACT_LID_MAX);
    }

    #[test]
    fn test_zero_distances_are_floored() {
        let lid = mle_lid(&[0.0, 0.0, 1.0]);
        assert!(lid.is_finite());
        assert!(lid >= LID_MIN);
    }

    #[test]
    fn test_clip_bounds() {
        assert_eq!(clip(f64::NAN, LID_MIN, SAMPLE_LID_MAX), SAMPLE_LID_MAX);
        assert_eq!(clip(f64::INFINITY, LID_MIN, EXACT_LID_MAX), EXACT_LID_MAX);
        assert_eq!(clip(-3.0, LID_MIN, EXACT_LID_MAX), LID_MIN);
        assert_eq!(clip(12.5, LID_MIN, EXACT_LID_MAX), 12.5);
    }
}
