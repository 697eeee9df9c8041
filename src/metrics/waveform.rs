//! Waveform shape scores over the waveform window.
//!
//! `waveform` is the average waveform `[time, unit, cv]`; only the samples
//! in `derived.waveidx` are compared.
use ndarray::{s, Array2, Array3};

use crate::config::DerivedParams;
use crate::error::{MatchError, Result};
use crate::rescale::re_scale;
use crate::stats::{nan_max, nan_mean, nan_min, nan_quantile};

fn check_waveform(waveform: &Array3<f64>, derived: &DerivedParams) -> Result<()> {
    let (n_t, _, n_cv) = waveform.dim();
    if n_cv != 2 || n_t < derived.waveidx.end {
        return Err(MatchError::shape(
            "waveform",
            format!("[≥{}, units, 2]", derived.waveidx.end),
            waveform.shape(),
        ));
    }
    Ok(())
}

/// Window of unit `u`, cv half `cv`, centred on its mean, and its norm.
fn centred(waveform: &Array3<f64>, derived: &DerivedParams, u: usize, cv: usize) -> (Vec<f64>, f64) {
    let x = waveform.slice(s![derived.waveidx.clone(), u, cv]);
    let mean = x.sum() / x.len() as f64;
    let c: Vec<f64> = x.iter().map(|v| v - mean).collect();
    let norm = c.iter().map(|v| v * v).sum::<f64>().sqrt();
    (c, norm)
}

/// Correlation score.
///
/// Pearson r between every cv-0 and cv-1 waveform, Fisher z-transformed
/// (`atanh`), then scaled linearly so the 0.5 % quantile maps to 0 and the
/// 99.5 % quantile to 1.  Result is clamped to `[0, 1]`; NaN becomes 0.
pub fn waveform_correlation(waveform: &Array3<f64>, derived: &DerivedParams) -> Result<Array2<f64>> {
    check_waveform(waveform, derived)?;
    let n_units = waveform.dim().1;

    let cv0: Vec<_> = (0..n_units).map(|u| centred(waveform, derived, u, 0)).collect();
    let cv1: Vec<_> = (0..n_units).map(|u| centred(waveform, derived, u, 1)).collect();

    let z = Array2::from_shape_fn((n_units, n_units), |(i, j)| {
        let (a, na) = &cv0[i];
        let (b, nb) = &cv1[j];
        let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        let r = (dot / (na * nb)).clamp(-1.0, 1.0);
        r.atanh()
    });

    let lo = nan_quantile(z.iter().copied(), 0.005);
    let hi = nan_quantile(z.iter().copied(), 0.995);
    Ok(z.mapv(|v| {
        let s = (v - lo) / (hi - lo);
        if s.is_nan() { 0.0 } else { s.clamp(0.0, 1.0) }
    }))
}

/// Mean-squared-error score.
///
/// Each (unit, cv) window is min–max normalised, the squared difference is
/// averaged over time, square-rooted and passed through
/// [`re_scale`].  NaN propagates.
pub fn waveform_mse(waveform: &Array3<f64>, derived: &DerivedParams) -> Result<Array2<f64>> {
    check_waveform(waveform, derived)?;
    let mut window = waveform.slice(s![derived.waveidx.clone(), .., ..]).to_owned();
    let (_, n_units, n_cv) = window.dim();

    for u in 0..n_units {
        for cv in 0..n_cv {
            let mut trace = window.slice_mut(s![.., u, cv]);
            let lo = nan_min(trace.iter().copied());
            let hi = nan_max(trace.iter().copied());
            trace.mapv_inplace(|v| (v - lo) / (hi - lo));
        }
    }

    let rmse = Array2::from_shape_fn((n_units, n_units), |(i, j)| {
        let a = window.slice(s![.., i, 0]);
        let b = window.slice(s![.., j, 1]);
        nan_mean(a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y))).sqrt()
    });
    Ok(re_scale(&rmse))
}
