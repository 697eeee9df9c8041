//! Centroid position scores.
//!
//! Inputs are distance tensors `[unit_i, time, variant, unit_j]` from
//! [`crate::geometry::euclidean_distance`] or
//! [`crate::geometry::recentered_euclidean_distance`].  Every reduction over
//! flip variants keeps the best (smallest) value.
use ndarray::{s, Array2, Array4};

use crate::config::{DerivedParams, MatchConfig};
use crate::geometry::peak_distance;
use crate::rescale::{re_scale, zero_nan_inplace};
use crate::stats::{nan_mean, nan_min, nan_var};

/// Reduce over time with `over_time`, then take the smallest variant.
fn reduce_time_then_variant(
    eucl: &Array4<f64>,
    over_time: impl Fn(&mut dyn Iterator<Item = f64>) -> f64,
) -> Array2<f64> {
    let (n_i, _, n_var, n_j) = eucl.dim();
    Array2::from_shape_fn((n_i, n_j), |(i, j)| {
        nan_min((0..n_var).map(|f| over_time(&mut eucl.slice(s![i, .., f, j]).iter().copied())))
    })
}

/// Centroid distance and centroid variance scores.
///
/// Distance: smallest raw distance at the waveform peak, scaled as
/// `1 - (d - min) / (max_dist - min)` and clamped at 0.
///
/// Variance: sample variance (ddof 1) of the distance over the waveform
/// window, smallest variant, square-rooted, [`re_scale`]d.
///
/// NaN becomes 0 in both.
pub fn centroid_metrics(
    eucl: &Array4<f64>,
    cfg: &MatchConfig,
    derived: &DerivedParams,
) -> (Array2<f64>, Array2<f64>) {
    let peak = peak_distance(eucl, derived);
    let min = nan_min(peak.iter().copied());
    let mut dist = peak.mapv(|d| {
        let s = 1.0 - (d - min) / (cfg.max_dist - min);
        if s < 0.0 { 0.0 } else { s }
    });
    zero_nan_inplace(&mut dist);

    let var = reduce_time_then_variant(eucl, |xs| nan_var(xs, 1));
    let mut var = re_scale(&var.mapv(f64::sqrt));
    zero_nan_inplace(&mut var);

    (dist, var)
}

/// Recentred centroid distance score: mean distance over the window,
/// smallest variant, [`re_scale`]d, NaN → 0.
pub fn recentered_metrics(eucl_recentered: &Array4<f64>) -> Array2<f64> {
    let mean = reduce_time_then_variant(eucl_recentered, |xs| nan_mean(xs));
    let mut score = re_scale(&mean);
    zero_nan_inplace(&mut score);
    score
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Distances `base[i][j] + t * slope[i][j]`, identical for both variants.
    fn tensor(base: [[f64; 2]; 2], slope: [[f64; 2]; 2], n_t: usize) -> Array4<f64> {
        Array4::from_shape_fn((2, n_t, 2, 2), |(i, t, _, j)| base[i][j] + t as f64 * slope[i][j])
    }

    #[test]
    fn centroid_distance_scaled_by_max_dist() {
        let d = DerivedParams::with_window(2, 10, 5, 3..8).unwrap();
        // Peak offset 2 → distance base + 2·slope.
        let e = tensor([[0.0, 40.0], [60.0, 10.0]], [[0.0; 2]; 2], 5);
        let cfg = MatchConfig::default();
        let (dist, _) = centroid_metrics(&e, &cfg, &d);
        approx::assert_abs_diff_eq!(dist[[0, 0]], 1.0, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(dist[[0, 1]], 0.6, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(dist[[1, 1]], 0.9, epsilon = 1e-12);
    }

    #[test]
    fn far_pairs_clamp_to_zero() {
        let d = DerivedParams::with_window(2, 10, 5, 3..8).unwrap();
        let e = tensor([[0.0, 400.0], [60.0, 10.0]], [[0.0; 2]; 2], 5);
        let (dist, _) = centroid_metrics(&e, &MatchConfig::default(), &d);
        assert_eq!(dist[[0, 1]], 0.0);
    }

    #[test]
    fn steady_distance_has_best_variance_score() {
        let d = DerivedParams::with_window(2, 10, 5, 3..8).unwrap();
        let e = tensor([[1.0, 1.0], [1.0, 1.0]], [[0.0, 3.0], [1.0, 0.0]], 5);
        let (_, var) = centroid_metrics(&e, &MatchConfig::default(), &d);
        approx::assert_abs_diff_eq!(var[[0, 0]], 1.0, epsilon = 1e-12);
        assert!(var[[1, 0]] > var[[0, 1]]);
    }

    #[test]
    fn recentred_nan_becomes_zero() {
        let mut e = tensor([[0.0, 4.0], [8.0, 2.0]], [[0.0; 2]; 2], 3);
        e.slice_mut(s![1, .., .., 0]).fill(f64::NAN);
        let r = recentered_metrics(&e);
        assert_eq!(r[[1, 0]], 0.0);
        approx::assert_abs_diff_eq!(r[[0, 0]], 1.0, epsilon = 1e-12);
    }
}
