//! Matching configuration.
//!
//! [`MatchConfig`] holds every tunable parameter of the matching pipeline.
//! All fields have defaults matching the reference UnitMatch settings for
//! Neuropixels recordings.
//!
//! [`DerivedParams`] holds the values that depend on the loaded data (unit
//! count, spike width, waveform window).  It is assembled once before the
//! pipeline runs and never changes afterwards.
use serde::{Deserialize, Serialize};
use std::ops::Range;

use crate::error::{MatchError, Result};

/// Score names included in the total score by default, in predictor order.
pub const DEFAULT_SCORES: [&str; 6] = [
    "amplitude",
    "spatial_decay",
    "centroid_overlord",
    "centroid_dist",
    "waveform_similarity",
    "traj_angle_sim",
];

/// Configuration for the unit matching pipeline.
///
/// All fields are `pub` so you can construct one with struct-update syntax:
///
/// ```
/// use unitmatch::MatchConfig;
///
/// let cfg = MatchConfig {
///     n_shanks:   4,      // 4-shank probe
///     shank_dist: 250.0,  // shank pitch in µm
///     ..MatchConfig::default()
/// };
/// assert_eq!(cfg.score_vector().len(), 100);
/// ```
///
/// It can also be read from JSON; missing fields take their default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Distance (µm) at which the centroid-distance score reaches 0.
    ///
    /// Default: `100.0`.
    pub max_dist: f64,

    /// Pairs further apart than this (µm, at the waveform peak) are ignored
    /// when estimating the match threshold.
    ///
    /// Default: `50.0`.
    pub neighbour_dist: f64,

    /// Minimum centroid step length between two samples for the step to
    /// contribute a trajectory angle.
    ///
    /// Default: `0.1`.
    pub min_angle_dist: f64,

    /// Histogram bin width used by the threshold estimator.
    ///
    /// Default: `0.01`.
    pub score_step: f64,

    /// Lowest candidate score considered for the threshold.
    ///
    /// Default: `0.6`.
    pub min_threshold_score: f64,

    /// Moving-average window applied to the threshold histograms.
    ///
    /// Default: `3`.
    pub smooth_window: usize,

    /// Number of shanks on the probe.
    ///
    /// Default: `1`.
    pub n_shanks: usize,

    /// Width of one shank band along [`shank_axis`](Self::shank_axis), µm.
    ///
    /// Default: `175.0`.
    pub shank_dist: f64,

    /// Spatial dimension along which shanks are laid out.
    ///
    /// Default: `1` (x).
    pub shank_axis: usize,

    /// Matches each shank needs before drift is corrected per shank.
    ///
    /// Default: `2`.
    pub match_num_threshold: usize,

    /// Spatial dimensions that receive a mirrored copy in the flip
    /// augmentation.
    ///
    /// Default: `[1]` (x).
    pub flip_axes: Vec<usize>,

    /// Deduplicate matches to one-to-one before estimating drift.
    ///
    /// Default: `true`.
    pub best_match: bool,

    /// Prefer per-shank drift correction when every shank has enough
    /// matches.
    ///
    /// Default: `true`.
    pub best_drift: bool,

    /// Number of score → threshold → drift rounds before the final pass.
    ///
    /// Default: `1`.
    pub drift_iterations: usize,

    /// Clip the top 0.01 % of spatial-decay differences before rescaling.
    ///
    /// Default: `true`.
    pub spatial_decay_outlier: bool,

    /// Named scores summed into the total score, in predictor order.
    ///
    /// Default: [`DEFAULT_SCORES`].
    pub scores_to_include: Vec<String>,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            max_dist: 100.0,
            neighbour_dist: 50.0,
            min_angle_dist: 0.1,
            score_step: 0.01,
            min_threshold_score: 0.6,
            smooth_window: 3,
            n_shanks: 1,
            shank_dist: 175.0,
            shank_axis: 1,
            match_num_threshold: 2,
            flip_axes: vec![1],
            best_match: true,
            best_drift: true,
            drift_iterations: 1,
            spatial_decay_outlier: true,
            scores_to_include: DEFAULT_SCORES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl MatchConfig {
    /// Candidate thresholds: histogram bin centres `step/2, 3·step/2, …`
    /// below 1.
    pub fn score_vector(&self) -> Vec<f64> {
        let n = self.n_bins();
        (0..n).map(|k| (k as f64 + 0.5) * self.score_step).collect()
    }

    /// Histogram bin edges `0, step, …, 1`.
    pub fn bins(&self) -> Vec<f64> {
        let n = self.n_bins();
        (0..=n).map(|k| k as f64 * self.score_step).collect()
    }

    fn n_bins(&self) -> usize {
        (1.0 / self.score_step).round() as usize
    }

    /// Check the values the pipeline relies on.
    pub fn validate(&self) -> Result<()> {
        if !(self.score_step > 0.0 && self.score_step < 1.0) {
            return Err(MatchError::InvalidConfig(format!(
                "score_step must lie in (0, 1), got {}",
                self.score_step
            )));
        }
        if self.smooth_window == 0 {
            return Err(MatchError::InvalidConfig("smooth_window must be > 0".into()));
        }
        if self.n_shanks == 0 || self.shank_dist <= 0.0 {
            return Err(MatchError::InvalidConfig(format!(
                "need at least one shank of positive width, got {} × {}",
                self.n_shanks, self.shank_dist
            )));
        }
        if self.match_num_threshold == 0 {
            return Err(MatchError::InvalidConfig(
                "match_num_threshold must be > 0: a shank without matches has no drift".into(),
            ));
        }
        if let Some(&axis) = self.flip_axes.iter().chain([&self.shank_axis]).find(|&&a| a >= 3) {
            return Err(MatchError::InvalidConfig(format!(
                "spatial axis {axis} out of range (3 dims)"
            )));
        }
        Ok(())
    }
}

/// Parameters derived from the loaded data.
///
/// `waveidx` is the half-open window of time samples compared by the
/// waveform and trajectory metrics; `peak_loc` must fall inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedParams {
    pub n_units: usize,
    pub spike_width: usize,
    pub peak_loc: usize,
    pub waveidx: Range<usize>,
}

impl DerivedParams {
    /// Standard window: `peak_loc = spike_width / 2`, samples
    /// `peak_loc - 8 .. peak_loc + 15`.
    ///
    /// ```
    /// use unitmatch::DerivedParams;
    /// let d = DerivedParams::from_data(10, 82).unwrap();
    /// assert_eq!(d.peak_loc, 41);
    /// assert_eq!(d.waveidx, 33..56);
    /// ```
    pub fn from_data(n_units: usize, spike_width: usize) -> Result<Self> {
        let peak_loc = spike_width / 2;
        if peak_loc < 8 {
            return Err(MatchError::InvalidConfig(format!(
                "spike width {spike_width} too short for the default waveform window"
            )));
        }
        Self::with_window(n_units, spike_width, peak_loc, peak_loc - 8..peak_loc + 15)
    }

    /// Explicit window and peak.
    pub fn with_window(
        n_units: usize,
        spike_width: usize,
        peak_loc: usize,
        waveidx: Range<usize>,
    ) -> Result<Self> {
        if waveidx.len() < 2 || waveidx.end > spike_width {
            return Err(MatchError::InvalidConfig(format!(
                "waveform window {waveidx:?} must hold ≥ 2 samples within spike width {spike_width}"
            )));
        }
        if !waveidx.contains(&peak_loc) {
            return Err(MatchError::InvalidConfig(format!(
                "peak_loc {peak_loc} outside waveform window {waveidx:?}"
            )));
        }
        Ok(Self { n_units, spike_width, peak_loc, waveidx })
    }

    /// Position of the peak sample inside the window.
    pub fn peak_offset(&self) -> usize {
        self.peak_loc - self.waveidx.start
    }
}
