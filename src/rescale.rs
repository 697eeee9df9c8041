//! Quantile rescaling of raw dissimilarities into scores.
//!
//! `score = (q99 - x) / (q99 - min)`, negatives set to 0.
//!
//! The scale is inverted: small distances become scores near 1, anything
//! beyond the 99th percentile becomes 0.  NaN inputs stay NaN so that a
//! downstream classifier can see them.  A constant input has
//! `q99 == min` and rescales to NaN everywhere.
use ndarray::{Array, Dimension};

use crate::stats::{nan_min, nan_quantile};

pub fn re_scale<D: Dimension>(values: &Array<f64, D>) -> Array<f64, D> {
    let q99 = nan_quantile(values.iter().copied(), 0.99);
    let min = nan_min(values.iter().copied());
    let range = q99 - min;
    values.mapv(|v| {
        let s = (q99 - v) / range;
        if s < 0.0 { 0.0 } else { s }
    })
}

/// Replace NaN entries with 0 in place.
pub(crate) fn zero_nan_inplace<D: Dimension>(values: &mut Array<f64, D>) {
    values.mapv_inplace(|v| if v.is_nan() { 0.0 } else { v });
}
