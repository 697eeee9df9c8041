//! Trajectory scores: how the centroid moves across the waveform window.
//!
//! For every unit, cv half and flip variant, the centroid takes one step
//! per pair of consecutive window samples.  Each step has a length and an
//! orientation (the summed `atan(|Δa| / |Δb|)` over all axis pairs
//! `a < b`).  Steps shorter than `min_angle_dist` carry no orientation.
use ndarray::{s, Array2, Array4, Array5};
use std::f64::consts::PI;

use crate::config::{DerivedParams, MatchConfig};
use crate::error::{MatchError, Result};
use crate::geometry::N_DIMS;
use crate::rescale::{re_scale, zero_nan_inplace};
use crate::stats::{nan_min, nan_sum};

/// Step lengths and orientations, each `[unit, step, cv, variant]`.
fn steps(flipped: &Array5<f64>, cfg: &MatchConfig, derived: &DerivedParams) -> (Array4<f64>, Array4<f64>) {
    let (n_dims, n_units, _, n_cv, n_var) = flipped.dim();
    let t0 = derived.waveidx.start;
    let n_steps = derived.waveidx.len() - 1;
    let shape = (n_units, n_steps, n_cv, n_var);

    let delta = |u: usize, st: usize, cv: usize, f: usize, d: usize| {
        flipped[[d, u, t0 + st + 1, cv, f]] - flipped[[d, u, t0 + st, cv, f]]
    };

    let length = Array4::from_shape_fn(shape, |(u, st, cv, f)| {
        (0..n_dims).map(|d| delta(u, st, cv, f, d).powi(2)).sum::<f64>().sqrt()
    });

    let angle = Array4::from_shape_fn(shape, |(u, st, cv, f)| {
        let gate = if length[[u, st, cv, f]] >= cfg.min_angle_dist { 1.0 } else { 0.0 };
        let mut terms = Vec::with_capacity(n_dims);
        for a in 0..n_dims {
            for b in (a + 1).max(1)..n_dims {
                let ratio = delta(u, st, cv, f, a).abs() / delta(u, st, cv, f, b).abs();
                terms.push(ratio.atan() * gate);
            }
        }
        nan_sum(terms)
    });

    (length, angle)
}

/// Compare `[unit, step, cv, variant]` tracks pairwise: sum of `cost` over
/// steps, smallest variant.
fn compare_tracks(track: &Array4<f64>, cost: impl Fn(f64, f64) -> f64) -> Array2<f64> {
    let (n_units, _, _, n_var) = track.dim();
    Array2::from_shape_fn((n_units, n_units), |(i, j)| {
        nan_min((0..n_var).map(|f| {
            let a = track.slice(s![i, .., 0, f]);
            let b = track.slice(s![j, .., 1, f]);
            nan_sum(a.iter().zip(b.iter()).map(|(&x, &y)| cost(x, y)))
        }))
    })
}

/// Trajectory angle and trajectory distance scores.
///
/// Angle: summed absolute orientation difference over the window.  Distance: summed
/// absolute step-length difference, square-rooted.  Both take the best
/// flip variant, are [`re_scale`]d, and map NaN to 0.
pub fn trajectory_metrics(
    flipped: &Array5<f64>,
    cfg: &MatchConfig,
    derived: &DerivedParams,
) -> Result<(Array2<f64>, Array2<f64>)> {
    let (n_dims, _, n_t, n_cv, _) = flipped.dim();
    if n_dims != N_DIMS || n_cv != 2 || n_t < derived.waveidx.end {
        return Err(MatchError::shape(
            "flipped positions",
            format!("[3, units, ≥{}, 2, variant]", derived.waveidx.end),
            flipped.shape(),
        ));
    }

    let (length, angle) = steps(flipped, cfg, derived);

    let angle_cost = compare_tracks(&angle, |x, y| {
        let d = (x - y).abs();
        // Dead branch: orientations are nan_sum totals and never NaN.
        if d.is_nan() { 2.0 * PI } else { d }
    });
    let mut angle_sim = re_scale(&angle_cost);
    zero_nan_inplace(&mut angle_sim);

    let dist_cost = compare_tracks(&length, |x, y| (x - y).abs());
    let mut dist_sim = re_scale(&dist_cost.mapv(f64::sqrt));
    zero_nan_inplace(&mut dist_sim);

    Ok((angle_sim, dist_sim))
}
