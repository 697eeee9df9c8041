//! Weighted-difference score for per-unit scalars.
//!
//! For a parameter `p[unit, cv]` (amplitude, spatial decay, …):
//!
//! ```text
//! diff[i, j] = |p[i,0] - p[j,1]| / mean(|p[i,0]|, |p[j,1]|)
//! score      = re_scale(sqrt(diff))
//! ```
use ndarray::Array2;

use crate::error::{MatchError, Result};
use crate::rescale::re_scale;
use crate::stats::nan_quantile;

/// Score the weighted relative difference of a `[n_units, 2]` parameter.
///
/// With `outlier`, differences above the 99.99 % quantile are clipped to
/// it before rescaling.  Only the upper tail is clipped: differences are
/// absolute values, so there is no lower tail to treat.
///
/// NaN parameters give NaN scores.
pub fn get_simple_metric(param: &Array2<f64>, outlier: bool) -> Result<Array2<f64>> {
    let (n_units, n_cv) = param.dim();
    if n_cv != 2 {
        return Err(MatchError::shape("unit parameter", (n_units, 2), param.dim()));
    }

    let mut diff = Array2::from_shape_fn((n_units, n_units), |(i, j)| {
        let (a, b) = (param[[i, 0]], param[[j, 1]]);
        let weight = match (a.is_nan(), b.is_nan()) {
            (false, false) => (a.abs() + b.abs()) / 2.0,
            (true, false) => b.abs(),
            (false, true) => a.abs(),
            (true, true) => f64::NAN,
        };
        (a - b).abs() / weight
    });

    if outlier {
        let hi = nan_quantile(diff.iter().copied(), 0.9999);
        diff.mapv_inplace(|v| if v > hi { hi } else { v });
    }

    Ok(re_scale(&diff.mapv(f64::sqrt)))
}
