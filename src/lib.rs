//! # unitmatch: track neurons across recording sessions
//!
//! `unitmatch` decides which spike-sorted units of different
//! electrophysiology sessions are the same neuron.  Every unit is described
//! by its average waveform and the trajectory of its spatial centroid, both
//! computed on two cross-validation halves of its spikes.  Pairs of units are
//! scored on several similarity metrics, the scores are combined into a total
//! score, and a threshold learned from within-session pairs separates
//! matches from non-matches.  Matched pairs then estimate probe drift between
//! sessions, which is corrected before the final scoring pass.
//!
//! ## Pipeline overview
//!
//! ```text
//! units.safetensors
//!   │
//!   ├─ io::UnitRecording::load()      waveforms, centroids, amplitudes
//!   │
//!   │  ┌──────────────── drift_iterations × ────────────────┐
//!   ├─ │ compute_scores()      waveform + centroid metrics  │
//!   │  │ total_score()         Σ scores, min–max → [0, 1]   │
//!   │  │ get_threshold()       histogram crossing           │
//!   │  │ candidate_pairs()     total > threshold            │
//!   │  │ drift_n_sessions()    median centroid shift        │
//!   │  └────────────────────────────────────────────────────┘
//!   │
//!   ├─ compute_scores() → total_score() → get_threshold()   final pass
//!   └─ good_matches()                                       one-to-one
//!        │
//!        └─→ MatchOutcome { total, predictors, matches, drift, … }
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use std::path::Path;
//! use unitmatch::{run_matching, DerivedParams, MatchConfig};
//! use unitmatch::io::{write_outcome, UnitRecording};
//!
//! let rec     = UnitRecording::load(Path::new("units.safetensors")).unwrap();
//! let layout  = rec.layout().unwrap();
//! let derived = DerivedParams::from_data(rec.data.n_units(), rec.data.spike_width()).unwrap();
//!
//! let cfg     = MatchConfig::default();
//! let outcome = run_matching(&rec.data, rec.positions, &layout, &cfg, &derived).unwrap();
//!
//! println!("{} matches at threshold {:.3}", outcome.matches.len(), outcome.threshold.threshold);
//! write_outcome(&outcome, Path::new("matches.safetensors")).unwrap();
//! ```
//!
//! ## Running individual steps
//!
//! ```no_run
//! use unitmatch::{compute_scores, get_threshold, total_score, candidate_pairs, good_matches};
//! # use unitmatch::{DerivedParams, MatchConfig, SessionLayout, UnitData, UnitPositions};
//! # fn run(data: &UnitData, pos: &UnitPositions, layout: &SessionLayout,
//! #        cfg: &MatchConfig, derived: &DerivedParams) -> unitmatch::Result<()> {
//! let (scores, peak_dist) = compute_scores(data, pos, cfg, derived)?;
//! let (total, _)          = total_score(&scores.select(&cfg.scores_to_include)?)?;
//! let fit                 = get_threshold(&total, &layout.same_session(), &peak_dist,
//!                                         cfg, layout.n_sessions(), true)?;
//! let matches             = good_matches(&candidate_pairs(&total, fit.threshold), &total);
//! # Ok(()) }
//! ```

pub mod config;
pub mod drift;
pub mod error;
pub mod geometry;
pub mod io;
pub mod matching;
pub mod metrics;
pub mod rescale;
pub mod score;
pub mod session;
pub mod stats;
pub mod threshold;

use ndarray::{Array2, Array3};

// ── Crate-root re-exports ─────────────────────────────────────────────────

// config + errors
pub use config::{DerivedParams, MatchConfig, DEFAULT_SCORES};
pub use error::{MatchError, Result};

// drift
pub use drift::{drift_correction_basic, drift_n_sessions, Drift3, DriftCorrection, DriftReport, UnitPositions};

// geometry
pub use geometry::{
    euclidean_distance, flip_dim, mean_centroid, peak_distance,
    recentered_euclidean_distance, shank_ids, shank_of,
};

// matching
pub use matching::{
    candidate_pairs, curate_matches, evaluate_output, good_matches, pairs_between,
    CurationMode, MatchSummary,
};

// metrics
pub use metrics::{
    average_scores, centroid_metrics, get_simple_metric, recentered_metrics,
    trajectory_metrics, waveform_correlation, waveform_mse,
};

pub use rescale::re_scale;
pub use score::{total_score, ScoreSet};
pub use session::SessionLayout;
pub use threshold::{get_threshold, NormalFit, ThresholdFit};

/// Per-unit inputs that drift correction never touches.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitData {
    /// Average waveform at the unit's peak channel, `[time, unit, cv]`.
    pub waveform: Array3<f64>,
    /// Peak amplitude, `[unit, cv]`.
    pub amplitude: Array2<f64>,
    /// Spatial decay of the amplitude across channels, `[unit, cv]`.
    pub spatial_decay: Array2<f64>,
}

impl UnitData {
    pub fn new(waveform: Array3<f64>, amplitude: Array2<f64>, spatial_decay: Array2<f64>) -> Result<Self> {
        let (n_t, n_units, n_cv) = waveform.dim();
        if n_cv != 2 {
            return Err(MatchError::shape("waveform", (n_t, n_units, 2), waveform.dim()));
        }
        if amplitude.dim() != (n_units, 2) {
            return Err(MatchError::shape("amplitude", (n_units, 2), amplitude.dim()));
        }
        if spatial_decay.dim() != (n_units, 2) {
            return Err(MatchError::shape("spatial_decay", (n_units, 2), spatial_decay.dim()));
        }
        Ok(Self { waveform, amplitude, spatial_decay })
    }

    pub fn n_units(&self) -> usize {
        self.waveform.dim().1
    }

    /// Samples per waveform.
    pub fn spike_width(&self) -> usize {
        self.waveform.dim().0
    }
}

/// Compute every similarity score.
///
/// Returns the named scores (see [`ScoreSet`]) and the centroid distance
/// at the waveform peak, which the threshold estimator uses to restrict
/// itself to neighbouring pairs.
///
/// | name                  | score |
/// |-----------------------|-------|
/// | `amplitude`           | [`get_simple_metric`] on amplitude |
/// | `spatial_decay`       | [`get_simple_metric`] on spatial decay |
/// | `waveform_corr`       | [`waveform_correlation`] |
/// | `waveform_mse`        | [`waveform_mse`] |
/// | `waveform_similarity` | mean of the two waveform scores |
/// | `centroid_dist`       | [`centroid_metrics`] distance |
/// | `centroid_var`        | [`centroid_metrics`] variance |
/// | `centroid_recentered` | [`recentered_metrics`] |
/// | `centroid_overlord`   | mean of `centroid_recentered` and `centroid_var` |
/// | `traj_angle_sim`      | [`trajectory_metrics`] angle |
/// | `traj_dist_sim`       | [`trajectory_metrics`] distance |
pub fn compute_scores(
    data: &UnitData,
    positions: &UnitPositions,
    cfg: &MatchConfig,
    derived: &DerivedParams,
) -> Result<(ScoreSet, Array2<f64>)> {
    let n = data.n_units();
    if positions.n_units() != n {
        return Err(MatchError::shape("unit positions", n, positions.n_units()));
    }
    if derived.n_units != n {
        return Err(MatchError::shape("derived parameters", n, derived.n_units));
    }
    let mut scores = ScoreSet::new();

    scores.insert("amplitude", get_simple_metric(&data.amplitude, false)?);
    scores.insert("spatial_decay", get_simple_metric(&data.spatial_decay, cfg.spatial_decay_outlier)?);

    let corr = waveform_correlation(&data.waveform, derived)?;
    let mse = waveform_mse(&data.waveform, derived)?;
    scores.insert("waveform_similarity", average_scores(&corr, &mse)?);
    scores.insert("waveform_corr", corr);
    scores.insert("waveform_mse", mse);

    let flipped = flip_dim(&positions.waw_per_tp, &cfg.flip_axes)?;

    let eucl = euclidean_distance(&flipped, derived)?;
    log::debug!("distance tensor {:?}", eucl.dim());
    let peak_dist = peak_distance(&eucl, derived);
    let (dist, var) = centroid_metrics(&eucl, cfg, derived);
    drop(eucl);

    let eucl = recentered_euclidean_distance(&flipped, &positions.avg_centroid, derived)?;
    let recentred = recentered_metrics(&eucl);
    drop(eucl);

    scores.insert("centroid_overlord", average_scores(&recentred, &var)?);
    scores.insert("centroid_dist", dist);
    scores.insert("centroid_var", var);
    scores.insert("centroid_recentered", recentred);

    let (angle, traj_dist) = trajectory_metrics(&flipped, cfg, derived)?;
    scores.insert("traj_angle_sim", angle);
    scores.insert("traj_dist_sim", traj_dist);

    log::debug!("computed {} scores for {n} units", scores.len());
    Ok((scores, peak_dist))
}

/// Result of [`run_matching`].
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    /// Every score of the final pass.
    pub scores: ScoreSet,
    /// Total score of the final pass.
    pub total: Array2<f64>,
    /// Selected scores stacked `[unit, unit, score]`.
    pub predictors: Array3<f64>,
    pub threshold: ThresholdFit,
    /// Every pair above the final threshold, within sessions included.
    pub candidates: Vec<(usize, usize)>,
    /// One-to-one matches between units of different sessions.
    pub matches: Vec<(usize, usize)>,
    /// Drift reports of every round, in order.
    pub drift: Vec<DriftReport>,
    /// Positions after drift correction.
    pub positions: UnitPositions,
}

/// Run the **full matching pipeline**.
///
/// 1. For each of `cfg.drift_iterations` rounds: score, total, threshold
///    (lowered for uncorrected drift on round 0), candidates, drift
///    correction of every session boundary.
/// 2. Score the corrected positions, take the total over
///    `cfg.scores_to_include` and the threshold.
/// 3. Reduce the cross-session candidates to one-to-one matches.
///
/// # Errors
///
/// Invalid configuration, inconsistent shapes and a failed threshold
/// search.
pub fn run_matching(
    data: &UnitData,
    mut positions: UnitPositions,
    layout: &SessionLayout,
    cfg: &MatchConfig,
    derived: &DerivedParams,
) -> Result<MatchOutcome> {
    cfg.validate()?;
    layout.check_units("unit data", data.n_units())?;
    let same_session = layout.same_session();
    let n_sessions = layout.n_sessions();

    let mut drift = Vec::new();
    for round in 0..cfg.drift_iterations {
        let (scores, peak_dist) = compute_scores(data, &positions, cfg, derived)?;
        let (total, _) = total_score(&scores.select(&cfg.scores_to_include)?)?;
        let fit = get_threshold(&total, &same_session, &peak_dist, cfg, n_sessions, round == 0)?;
        let pairs = candidate_pairs(&total, fit.threshold);
        log::info!("round {}: threshold {:.3}, {} candidate pairs", round + 1, fit.threshold, pairs.len());
        drift.extend(drift_n_sessions(&pairs, layout, &mut positions, &total, cfg)?);
    }

    let (scores, peak_dist) = compute_scores(data, &positions, cfg, derived)?;
    let (total, predictors) = total_score(&scores.select(&cfg.scores_to_include)?)?;
    let threshold = get_threshold(&total, &same_session, &peak_dist, cfg, n_sessions, cfg.drift_iterations == 0)?;

    let candidates = candidate_pairs(&total, threshold.threshold);
    let sid = layout.session_id();
    let crossing: Vec<(usize, usize)> = candidates.iter().copied().filter(|&(a, b)| sid[a] != sid[b]).collect();
    let matches = good_matches(&crossing, &total);
    log::info!(
        "threshold {:.3}: {} candidate pairs, {} cross-session matches",
        threshold.threshold,
        candidates.len(),
        matches.len()
    );

    Ok(MatchOutcome { scores, total, predictors, threshold, candidates, matches, drift, positions })
}
