//! Spatial helpers: flip augmentation, distance tensors, shank bands.
//!
//! Position tensors use the layout `[dim, unit, time, cv]` with three
//! spatial dims (dim 0 is a constant placeholder for 2-D probes, dim 1 is x,
//! dim 2 is depth).  Distance tensors use `[unit_i, time, variant, unit_j]`
//! where `unit_i` is taken from cv half 0 and `unit_j` from cv half 1.
use ndarray::{s, Array2, Array3, Array4, Array5, Axis};

use crate::config::{DerivedParams, MatchConfig};
use crate::error::{MatchError, Result};
use crate::stats::{nan_max, nan_mean, nan_min};

pub const N_DIMS: usize = 3;

pub(crate) fn check_positions(what: &'static str, waw_per_tp: &Array4<f64>) -> Result<()> {
    let (d, _, _, cv) = waw_per_tp.dim();
    if d != N_DIMS || cv != 2 {
        return Err(MatchError::shape(what, "[3, units, time, 2]", waw_per_tp.shape()));
    }
    Ok(())
}

pub(crate) fn check_centroids(avg_centroid: &Array3<f64>, n_units: usize) -> Result<()> {
    if avg_centroid.dim() != (N_DIMS, n_units, 2) {
        return Err(MatchError::shape("avg_centroid", (N_DIMS, n_units, 2), avg_centroid.dim()));
    }
    Ok(())
}

/// Append mirrored copies of the per-time centroid.
///
/// Returns `[dim, unit, time, cv, variant]`: variant 0 is the input,
/// variant `k + 1` mirrors axis `flip_axes[k]` about the unit's own
/// range over time, `min + max - x`.
///
/// A decaying spike pulls the weighted centroid towards the middle of the
/// probe, which can mirror the apparent trajectory; comparing both
/// variants keeps such units matchable.
pub fn flip_dim(waw_per_tp: &Array4<f64>, flip_axes: &[usize]) -> Result<Array5<f64>> {
    check_positions("waw_per_tp", waw_per_tp)?;
    if let Some(&axis) = flip_axes.iter().find(|&&a| a >= N_DIMS) {
        return Err(MatchError::InvalidConfig(format!("flip axis {axis} out of range")));
    }
    let (n_dims, n_units, n_t, n_cv) = waw_per_tp.dim();
    let mut out = Array5::<f64>::zeros((n_dims, n_units, n_t, n_cv, flip_axes.len() + 1));
    for v in 0..=flip_axes.len() {
        out.slice_mut(s![.., .., .., .., v]).assign(waw_per_tp);
    }

    for (k, &axis) in flip_axes.iter().enumerate() {
        for u in 0..n_units {
            for cv in 0..n_cv {
                let trace = waw_per_tp.slice(s![axis, u, .., cv]);
                let lo = nan_min(trace.iter().copied());
                let hi = nan_max(trace.iter().copied());
                out.slice_mut(s![axis, u, .., cv, k + 1])
                    .assign(&trace.mapv(|x| lo + hi - x));
            }
        }
    }
    Ok(out)
}

/// Distance between every cv-0 unit and every cv-1 unit at each sample of
/// the waveform window, per flip variant.
///
/// Output `[unit_i, time, variant, unit_j]`.  A NaN in either position
/// gives a NaN distance.  The tensor grows as `n_units² × window`; drop it
/// once its reductions are taken.
pub fn euclidean_distance(flipped: &Array5<f64>, derived: &DerivedParams) -> Result<Array4<f64>> {
    let (n_dims, n_units, n_t, n_cv, n_var) = flipped.dim();
    if n_dims != N_DIMS || n_cv != 2 {
        return Err(MatchError::shape("flipped positions", "[3, units, time, 2, variant]", flipped.shape()));
    }
    if derived.waveidx.end > n_t {
        return Err(MatchError::shape("flipped positions time axis", derived.waveidx.end, n_t));
    }
    let w0 = derived.waveidx.start;
    let n_w = derived.waveidx.len();

    Ok(Array4::from_shape_fn((n_units, n_w, n_var, n_units), |(i, t, f, j)| {
        let mut ss = 0.0;
        for d in 0..n_dims {
            let diff = flipped[[d, i, w0 + t, 0, f]] - flipped[[d, j, w0 + t, 1, f]];
            if diff.is_nan() {
                return f64::NAN;
            }
            ss += diff * diff;
        }
        ss.sqrt()
    }))
}

/// As [`euclidean_distance`], after subtracting each unit's average
/// centroid (per cv half) from its trajectory, so only the shape of the
/// movement is compared.
pub fn recentered_euclidean_distance(
    flipped: &Array5<f64>,
    avg_centroid: &Array3<f64>,
    derived: &DerivedParams,
) -> Result<Array4<f64>> {
    let n_units = flipped.len_of(Axis(1));
    check_centroids(avg_centroid, n_units)?;

    let mut recentred = flipped.clone();
    for ((d, u, _t, cv, _v), x) in recentred.indexed_iter_mut() {
        *x -= avg_centroid[[d, u, cv]];
    }
    euclidean_distance(&recentred, derived)
}

/// Raw distance at the waveform peak, best flip variant: `[unit_i, unit_j]`.
pub fn peak_distance(eucl: &Array4<f64>, derived: &DerivedParams) -> Array2<f64> {
    let t = derived.peak_offset();
    let (n_i, _, _, n_j) = eucl.dim();
    Array2::from_shape_fn((n_i, n_j), |(i, j)| {
        nan_min(eucl.slice(s![i, t, .., j]).iter().copied())
    })
}

/// Mean position over the two cv halves: `[dim, unit]`.
pub fn mean_centroid(avg_centroid: &Array3<f64>) -> Array2<f64> {
    let (n_dims, n_units, _) = avg_centroid.dim();
    Array2::from_shape_fn((n_dims, n_units), |(d, u)| {
        nan_mean(avg_centroid.slice(s![d, u, ..]).iter().copied())
    })
}

/// Band index `k` whose interval `[k·shank_dist, (k+1)·shank_dist)` holds
/// `coord`, or `None` outside every band.
pub fn shank_of(coord: f64, cfg: &MatchConfig) -> Option<usize> {
    (0..cfg.n_shanks).find(|&k| {
        let lo = k as f64 * cfg.shank_dist;
        coord >= lo && coord < lo + cfg.shank_dist
    })
}

/// Assign each unit to a shank from its mean centroid.
///
/// `centres` is `[dim, unit]` (see [`mean_centroid`]).  Units outside every
/// band are put on shank 0.
pub fn shank_ids(centres: &Array2<f64>, units: impl IntoIterator<Item = usize>, cfg: &MatchConfig) -> Vec<usize> {
    let mut outside = 0usize;
    let ids: Vec<usize> = units
        .into_iter()
        .map(|u| {
            shank_of(centres[[cfg.shank_axis, u]], cfg).unwrap_or_else(|| {
                outside += 1;
                0
            })
        })
        .collect();
    if outside > 0 {
        log::debug!("{outside} unit(s) outside every shank band, assigned to shank 0");
    }
    ids
}

/// Indices of pairs whose two units fall in different shank bands.
///
/// Only advisory: a disagreement usually means a bad match or a unit on a
/// band edge.  Each hit is logged as a warning.
pub fn shank_mismatches(pairs: &[(usize, usize)], centres: &Array2<f64>, cfg: &MatchConfig) -> Vec<usize> {
    let axis = cfg.shank_axis;
    let bad: Vec<usize> = (0..pairs.len())
        .filter(|&k| {
            let (a, b) = pairs[k];
            shank_of(centres[[axis, a]], cfg) != shank_of(centres[[axis, b]], cfg)
        })
        .collect();
    if !bad.is_empty() {
        let shown: Vec<(usize, usize)> = bad.iter().map(|&k| pairs[k]).collect();
        log::warn!("these pairs may be bad, their units sit on different shanks: {shown:?}");
    }
    bad
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_positions(n_units: usize, n_t: usize) -> Array4<f64> {
        // x moves linearly in time, unit u offset by 10·u.
        Array4::from_shape_fn((3, n_units, n_t, 2), |(d, u, t, _)| match d {
            0 => 1.0,
            1 => 10.0 * u as f64 + t as f64,
            _ => 5.0,
        })
    }

    #[test]
    fn flip_mirrors_only_flip_axis() {
        let p = line_positions(2, 4);
        let f = flip_dim(&p, &[1]).unwrap();
        assert_eq!(f.shape(), &[3, 2, 4, 2, 2]);
        // Unit 1, x = 10..13 → mirrored 13..10.
        assert_eq!(f[[1, 1, 0, 0, 1]], 13.0);
        assert_eq!(f[[1, 1, 3, 0, 1]], 10.0);
        assert_eq!(f[[1, 1, 0, 0, 0]], 10.0);
        assert_eq!(f[[2, 1, 0, 0, 1]], 5.0);
    }

    #[test]
    fn distance_is_zero_for_same_unit_and_nan_aware() {
        let mut p = line_positions(2, 6);
        p[[2, 0, 3, 1]] = f64::NAN;
        let f = flip_dim(&p, &[1]).unwrap();
        let d = DerivedParams::with_window(2, 6, 2, 1..5).unwrap();
        let e = euclidean_distance(&f, &d).unwrap();
        assert_eq!(e.shape(), &[2, 4, 2, 2]);
        assert_eq!(e[[1, 0, 0, 1]], 0.0);
        approx::assert_abs_diff_eq!(e[[0, 0, 0, 1]], 10.0, epsilon = 1e-12);
        // Unit 0 cv 1 is NaN at sample 3 (window offset 2).
        assert!(e[[1, 2, 0, 0]].is_nan());
        let pd = peak_distance(&e, &d);
        approx::assert_abs_diff_eq!(pd[[1, 0]], 10.0, epsilon = 1e-12);
    }

    #[test]
    fn recentring_removes_offset() {
        let p = line_positions(2, 6);
        let f = flip_dim(&p, &[1]).unwrap();
        let d = DerivedParams::with_window(2, 6, 2, 1..5).unwrap();
        let centroid = Array3::from_shape_fn((3, 2, 2), |(dd, u, _)| match dd {
            0 => 1.0,
            1 => 10.0 * u as f64,
            _ => 5.0,
        });
        let e = recentered_euclidean_distance(&f, &centroid, &d).unwrap();
        approx::assert_abs_diff_eq!(e[[0, 1, 0, 1]], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn shank_bands_are_half_open() {
        let cfg = MatchConfig { n_shanks: 2, shank_dist: 100.0, ..MatchConfig::default() };
        assert_eq!(shank_of(0.0, &cfg), Some(0));
        assert_eq!(shank_of(99.9, &cfg), Some(0));
        assert_eq!(shank_of(100.0, &cfg), Some(1));
        assert_eq!(shank_of(200.0, &cfg), None);
        let centres = Array2::from_shape_vec((3, 3), vec![
            1.0, 1.0, 1.0,
            50.0, 150.0, 250.0,
            0.0, 0.0, 0.0,
        ]).unwrap();
        assert_eq!(shank_ids(&centres, 0..3, &cfg), vec![0, 1, 0]);
        assert_eq!(shank_mismatches(&[(0, 1), (0, 0)], &centres, &cfg), vec![0]);
    }
}
