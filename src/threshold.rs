//! Match threshold from the shape of the total-score histograms.
//!
//! Pairs recorded in the same session have a known answer: the diagonal
//! (a unit against itself across cv halves) is a match, everything else is
//! not.  The threshold is the lowest candidate score above
//! `min_threshold_score` where the smoothed self-match histogram overtakes
//! the non-match histogram.
//!
//! Before drift correction, true cross-session matches score lower than
//! self-matches.  On that first pass the threshold is lowered by the gap
//! between the within-session and between-session score means.
use ndarray::Array2;
use statrs::statistics::Statistics;

use crate::config::MatchConfig;
use crate::error::{MatchError, Result};
use crate::stats::{histogram, nan_sum, smooth};

/// Mean and population standard deviation of a fitted normal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalFit {
    pub mean: f64,
    pub std: f64,
    pub n: usize,
}

impl NormalFit {
    fn from_values(values: &[f64]) -> Self {
        Self {
            mean: values.mean(),
            std: values.population_std_dev(),
            n: values.len(),
        }
    }
}

/// Normalised histograms behind a threshold decision, one value per
/// candidate score.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdHistograms {
    pub self_match: Vec<f64>,
    pub non_match: Vec<f64>,
    pub population: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdFit {
    /// Threshold to apply to the total score.
    pub threshold: f64,
    /// Crossing point before any first-pass adjustment.
    pub optimistic: f64,
    /// Within-session scores below `optimistic`.
    pub within: NormalFit,
    /// Between-session scores below `optimistic` (first pass, > 1 session).
    pub between: Option<NormalFit>,
    pub histograms: ThresholdHistograms,
}

/// Derive the match threshold.
///
/// * `total`        – total score `[n, n]`.
/// * `same_session` – `true` where both units belong to the same session.
/// * `peak_dist`    – centroid distance at the waveform peak `[n, n]`;
///   pairs further than `cfg.neighbour_dist` are ignored.
/// * `n_sessions`, `is_first_pass` – enable the first-pass lowering.
///
/// # Errors
///
/// [`MatchError::ThresholdNotFound`] when no candidate score satisfies the
/// crossing condition; [`MatchError::ShapeMismatch`] for inconsistent
/// inputs; [`MatchError::InvalidConfig`] when `cfg` fails
/// [`MatchConfig::validate`].
pub fn get_threshold(
    total: &Array2<f64>,
    same_session: &Array2<bool>,
    peak_dist: &Array2<f64>,
    cfg: &MatchConfig,
    n_sessions: usize,
    is_first_pass: bool,
) -> Result<ThresholdFit> {
    cfg.validate()?;
    let (n, m) = total.dim();
    if n != m {
        return Err(MatchError::shape("total score", (n, n), (n, m)));
    }
    if same_session.dim() != (n, n) {
        return Err(MatchError::shape("same-session mask", (n, n), same_session.dim()));
    }
    if peak_dist.dim() != (n, n) {
        return Err(MatchError::shape("peak distance", (n, n), peak_dist.dim()));
    }

    let score_vector = cfg.score_vector();
    let bins = cfg.bins();

    // Neighbouring pairs on the requested side of the session boundary.
    let masked = |within: bool| {
        Array2::from_shape_fn((n, n), |(i, j)| {
            let far = peak_dist[[i, j]] > cfg.neighbour_dist;
            if far || same_session[[i, j]] != within { f64::NAN } else { total[[i, j]] }
        })
    };

    let within = masked(true);
    let diag: Vec<f64> = within.diag().to_vec();
    let off_diag: Vec<f64> = within
        .indexed_iter()
        .map(|((i, j), &v)| if i == j { v - v } else { v })
        .collect();

    let h_self: Vec<f64> = histogram(diag.iter().copied(), &bins)
        .into_iter()
        .map(|c| c / n as f64)
        .collect();
    let off_sum = nan_sum(off_diag.iter().copied());
    let h_non: Vec<f64> = histogram(off_diag.iter().copied(), &bins)
        .into_iter()
        .map(|c| c / off_sum)
        .collect();
    let pop_sum = nan_sum(within.iter().copied());
    let h_pop: Vec<f64> = histogram(within.iter().copied(), &bins)
        .into_iter()
        .map(|c| c / pop_sum)
        .collect();

    let s_self = smooth(&h_self, cfg.smooth_window);
    let s_non = smooth(&h_non, cfg.smooth_window);
    let optimistic = score_vector
        .iter()
        .zip(s_self.iter().zip(&s_non))
        .find(|(&sv, (&a, &b))| sv > cfg.min_threshold_score && a > b)
        .map(|(&sv, _)| sv)
        .ok_or(MatchError::ThresholdNotFound)?;

    let below = |m: &Array2<f64>| -> Vec<f64> {
        m.iter().copied().filter(|v| !v.is_nan() && *v < optimistic).collect()
    };
    let within_fit = NormalFit::from_values(&below(&within));

    let mut threshold = optimistic;
    let mut between_fit = None;
    if n_sessions > 1 && is_first_pass {
        let fit = NormalFit::from_values(&below(&masked(false)));
        if !fit.mean.is_nan() && fit.mean < within_fit.mean {
            let gap = (within_fit.mean - fit.mean).abs();
            log::info!(
                "first pass: between-session mean {:.3} below within-session mean {:.3}, lowering threshold by {gap:.3}",
                fit.mean, within_fit.mean
            );
            threshold -= gap;
        }
        between_fit = Some(fit);
    }

    log::debug!("threshold {threshold:.3} (optimistic {optimistic:.3})");
    Ok(ThresholdFit {
        threshold,
        optimistic,
        within: within_fit,
        between: between_fit,
        histograms: ThresholdHistograms { self_match: h_self, non_match: h_non, population: h_pop },
    })
}
