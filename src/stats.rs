//! NaN-skipping reductions.
//!
//! Missing data travels through the pipeline as NaN.  Each reduction here
//! ignores NaN inputs and returns NaN when nothing is left, the same
//! contract as numpy's `nanmin`/`nanmean`/… family.  `nan_sum` is the
//! exception: an empty or all-NaN slice sums to 0.
use std::cmp::Ordering;

fn non_nan(values: impl IntoIterator<Item = f64>) -> Vec<f64> {
    values.into_iter().filter(|v| !v.is_nan()).collect()
}

/// Quantile `q ∈ [0, 1]` with linear interpolation between order
/// statistics (numpy's default method).
pub fn nan_quantile(values: impl IntoIterator<Item = f64>, q: f64) -> f64 {
    let mut sorted = non_nan(values);
    if sorted.is_empty() {
        return f64::NAN;
    }
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let rank = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let t = rank - lo as f64;
        sorted[lo] + (sorted[hi] - sorted[lo]) * t
    }
}

pub fn nan_min(values: impl IntoIterator<Item = f64>) -> f64 {
    values
        .into_iter()
        .filter(|v| !v.is_nan())
        .fold(f64::NAN, |acc, v| if acc.is_nan() || v < acc { v } else { acc })
}

pub fn nan_max(values: impl IntoIterator<Item = f64>) -> f64 {
    values
        .into_iter()
        .filter(|v| !v.is_nan())
        .fold(f64::NAN, |acc, v| if acc.is_nan() || v > acc { v } else { acc })
}

pub fn nan_sum(values: impl IntoIterator<Item = f64>) -> f64 {
    values.into_iter().filter(|v| !v.is_nan()).sum()
}

pub fn nan_mean(values: impl IntoIterator<Item = f64>) -> f64 {
    let (sum, n) = values
        .into_iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 { f64::NAN } else { sum / n as f64 }
}

pub fn nan_median(values: impl IntoIterator<Item = f64>) -> f64 {
    nan_quantile(values, 0.5)
}

/// Variance with `ddof` delta degrees of freedom.  NaN when fewer than
/// `ddof + 1` values remain.
pub fn nan_var(values: impl IntoIterator<Item = f64>, ddof: usize) -> f64 {
    let v = non_nan(values);
    if v.len() <= ddof {
        return f64::NAN;
    }
    let mean = v.iter().sum::<f64>() / v.len() as f64;
    let ss: f64 = v.iter().map(|x| (x - mean) * (x - mean)).sum();
    ss / (v.len() - ddof) as f64
}

/// Centred moving average of `window` samples.
///
/// Edge samples are averaged over the neighbours that exist, so a constant
/// input stays constant.  Even windows lean one sample to the left, as a
/// `'same'`-mode convolution does.
pub fn smooth(x: &[f64], window: usize) -> Vec<f64> {
    let n = x.len() as isize;
    let w = window.max(1) as isize;
    let right = (w - 1) / 2;
    (0..n)
        .map(|k| {
            let lo = (k + right - (w - 1)).max(0);
            let hi = (k + right).min(n - 1);
            let sum: f64 = (lo..=hi).map(|i| x[i as usize]).sum();
            sum / (hi - lo + 1) as f64
        })
        .collect()
}

/// Count values into the bins given by `edges` (`edges.len() - 1` bins).
///
/// Bins are half-open `[e_k, e_{k+1})` except the last, which also
/// includes its right edge.  NaN and out-of-range values are not counted.
pub fn histogram(values: impl IntoIterator<Item = f64>, edges: &[f64]) -> Vec<f64> {
    let n_bins = edges.len().saturating_sub(1);
    let mut counts = vec![0.0; n_bins];
    if n_bins == 0 {
        return counts;
    }
    let (first, last) = (edges[0], edges[n_bins]);
    for v in values {
        if v.is_nan() || v < first || v > last {
            continue;
        }
        // First edge strictly above v, minus one.
        let k = edges.partition_point(|&e| e <= v).saturating_sub(1).min(n_bins - 1);
        counts[k] += 1.0;
    }
    counts
}
