//! Drift correction between consecutive sessions.
//!
//! Matched units should sit at the same place on the probe.  The drift of
//! session `s + 1` relative to session `s` is estimated as the median, over
//! matched pairs, of
//!
//! ```text
//! drift = centre(earlier unit) − centre(later unit)
//! ```
//!
//! where `centre` is the average centroid over both cv halves.  The drift is
//! added to every centroid of the later session, so a session displaced by
//! `+d` reports `−d`.  Boundaries are processed in order and always use the
//! current positions, so corrections compound along the session chain.
use ndarray::{s, Array2, Array3, Array4};

use crate::config::MatchConfig;
use crate::error::{MatchError, Result};
use crate::geometry::{check_centroids, check_positions, mean_centroid, shank_ids, shank_mismatches, N_DIMS};
use crate::matching::{good_matches, pairs_between};
use crate::session::SessionLayout;
use crate::stats::nan_median;

/// Drift vector, one entry per spatial dim.
pub type Drift3 = [f64; N_DIMS];

/// Positions updated by drift correction.
///
/// Borrowed mutably for the duration of a correction; nothing else may
/// read or write them until it returns.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitPositions {
    /// Average centroid `[dim, unit, cv]`.
    pub avg_centroid: Array3<f64>,
    /// Per-sample centroid `[dim, unit, time, cv]`.
    pub waw_per_tp: Array4<f64>,
}

impl UnitPositions {
    pub fn new(avg_centroid: Array3<f64>, waw_per_tp: Array4<f64>) -> Result<Self> {
        check_positions("waw_per_tp", &waw_per_tp)?;
        check_centroids(&avg_centroid, waw_per_tp.dim().1)?;
        Ok(Self { avg_centroid, waw_per_tp })
    }

    pub fn n_units(&self) -> usize {
        self.avg_centroid.dim().1
    }

    /// Add `drift` to every position of `units`.
    pub fn shift(&mut self, units: impl IntoIterator<Item = usize>, drift: Drift3) {
        for u in units {
            for (d, &v) in drift.iter().enumerate() {
                self.avg_centroid.slice_mut(s![d, u, ..]).mapv_inplace(|x| x + v);
                self.waw_per_tp.slice_mut(s![d, u, .., ..]).mapv_inplace(|x| x + v);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DriftCorrection {
    /// One drift vector for the whole later session.
    Global(Drift3),
    /// One drift vector per shank band.
    PerShank(Vec<Drift3>),
    /// No matched pairs crossed the boundary; positions left unchanged.
    Skipped,
}

/// Outcome for the boundary between sessions `session` and `session + 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct DriftReport {
    pub session: usize,
    pub n_pairs: usize,
    pub correction: DriftCorrection,
}

fn median_drift(pairs: &[(usize, usize)], centres: &Array2<f64>) -> Drift3 {
    let mut drift = [0.0; N_DIMS];
    for (d, v) in drift.iter_mut().enumerate() {
        *v = nan_median(pairs.iter().map(|&(a, b)| centres[[d, a]] - centres[[d, b]]));
    }
    drift
}

/// Two-session drift correction.
///
/// Uses the pairs going from session 0 to session 1 and shifts every unit
/// of session 1.
pub fn drift_correction_basic(
    pairs: &[(usize, usize)],
    layout: &SessionLayout,
    positions: &mut UnitPositions,
) -> Result<DriftReport> {
    layout.check_units("unit positions", positions.n_units())?;
    let crossing = pairs_between(pairs, layout, 0);
    let correction = apply_global(&crossing, layout, 0, positions);
    Ok(DriftReport { session: 0, n_pairs: crossing.len(), correction })
}

fn apply_global(
    pairs: &[(usize, usize)],
    layout: &SessionLayout,
    session: usize,
    positions: &mut UnitPositions,
) -> DriftCorrection {
    if pairs.is_empty() {
        log::warn!("sessions {}/{}: no matched pairs, drift not corrected", session + 1, session + 2);
        return DriftCorrection::Skipped;
    }
    let drift = median_drift(pairs, &mean_centroid(&positions.avg_centroid));
    log::info!("sessions {}/{}: drift {drift:?} from {} pairs", session + 1, session + 2, pairs.len());
    positions.shift(layout.range(session + 1), drift);
    DriftCorrection::Global(drift)
}

/// Number of pairs per shank, keyed on the earlier unit.  Shanks without
/// any pair count 0.
fn matches_per_shank(pairs: &[(usize, usize)], centres: &Array2<f64>, cfg: &MatchConfig) -> Vec<usize> {
    shank_mismatches(pairs, centres, cfg);
    let mut counts = vec![0; cfg.n_shanks];
    for id in shank_ids(centres, pairs.iter().map(|&(a, _)| a), cfg) {
        counts[id] += 1;
    }
    counts
}

fn apply_per_shank(
    pairs: &[(usize, usize)],
    layout: &SessionLayout,
    session: usize,
    positions: &mut UnitPositions,
    cfg: &MatchConfig,
) -> DriftCorrection {
    let centres = mean_centroid(&positions.avg_centroid);
    let pair_shank = shank_ids(&centres, pairs.iter().map(|&(a, _)| a), cfg);
    let later = layout.range(session + 1);
    let unit_shank = shank_ids(&centres, later.clone(), cfg);

    let mut drifts = Vec::with_capacity(cfg.n_shanks);
    for k in 0..cfg.n_shanks {
        let on_shank: Vec<(usize, usize)> = pairs
            .iter()
            .zip(&pair_shank)
            .filter(|(_, &id)| id == k)
            .map(|(&p, _)| p)
            .collect();
        let drift = median_drift(&on_shank, &centres);
        log::info!("sessions {}/{} shank {k}: drift {drift:?} from {} pairs", session + 1, session + 2, on_shank.len());
        let units = later.clone().zip(&unit_shank).filter(|(_, &id)| id == k).map(|(u, _)| u);
        positions.shift(units, drift);
        drifts.push(drift);
    }
    DriftCorrection::PerShank(drifts)
}

/// Drift correction along a chain of sessions.
///
/// For every boundary `s → s + 1` in order: take the pairs crossing it,
/// optionally reduce them to one-to-one matches (`cfg.best_match`), then
/// correct per shank when `cfg.best_drift` is set and every shank has at
/// least `cfg.match_num_threshold` pairs, and globally otherwise.
pub fn drift_n_sessions(
    pairs: &[(usize, usize)],
    layout: &SessionLayout,
    positions: &mut UnitPositions,
    total: &Array2<f64>,
    cfg: &MatchConfig,
) -> Result<Vec<DriftReport>> {
    cfg.validate()?;
    layout.check_units("unit positions", positions.n_units())?;
    let n = layout.n_units();
    if total.dim() != (n, n) {
        return Err(MatchError::shape("total score", (n, n), total.dim()));
    }

    let mut reports = Vec::with_capacity(layout.n_sessions().saturating_sub(1));
    for session in 0..layout.n_sessions().saturating_sub(1) {
        let mut crossing = pairs_between(pairs, layout, session);
        if cfg.best_match {
            crossing = good_matches(&crossing, total);
        }

        let correction = if crossing.is_empty() {
            apply_global(&crossing, layout, session, positions)
        } else {
            let counts = matches_per_shank(&crossing, &mean_centroid(&positions.avg_centroid), cfg);
            let enough = counts.iter().all(|&c| c >= cfg.match_num_threshold);
            if cfg.best_drift && enough {
                apply_per_shank(&crossing, layout, session, positions, cfg)
            } else {
                if cfg.best_drift {
                    log::info!(
                        "sessions {}/{}: {counts:?} matches per shank, below {} needed for per-shank drift",
                        session + 1,
                        session + 2,
                        cfg.match_num_threshold
                    );
                }
                apply_global(&crossing, layout, session, positions)
            }
        };
        reports.push(DriftReport { session, n_pairs: crossing.len(), correction });
    }
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `n` units per session, unit `k` at x = 30·k + 10, later sessions
    /// displaced by `offset` per session.
    fn positions(n_sessions: usize, n: usize, offset: [f64; 3]) -> UnitPositions {
        let n_units = n_sessions * n;
        let at = |d: usize, u: usize| {
            let s = (u / n) as f64;
            let base = match d {
                0 => 0.0,
                1 => 30.0 * (u % n) as f64 + 10.0,
                _ => 500.0,
            };
            base + s * offset[d]
        };
        let avg = Array3::from_shape_fn((3, n_units, 2), |(d, u, _)| at(d, u));
        let waw = Array4::from_shape_fn((3, n_units, 6, 2), |(d, u, _, _)| at(d, u));
        UnitPositions::new(avg, waw).unwrap()
    }

    fn self_pairs(n_sessions: usize, n: usize) -> Vec<(usize, usize)> {
        (0..n_sessions - 1).flat_map(|s| (0..n).map(move |k| (s * n + k, (s + 1) * n + k))).collect()
    }

    #[test]
    fn basic_recovers_offset() {
        let layout = SessionLayout::from_units_per_session(&[4, 4]).unwrap();
        let mut p = positions(2, 4, [0.0, 3.0, -2.0]);
        let report = drift_correction_basic(&self_pairs(2, 4), &layout, &mut p).unwrap();
        assert_eq!(report.correction, DriftCorrection::Global([0.0, -3.0, 2.0]));
        assert_eq!(p, positions(2, 4, [0.0; 3]));
    }

    #[test]
    fn missing_pairs_skip() {
        let layout = SessionLayout::from_units_per_session(&[2, 2]).unwrap();
        let mut p = positions(2, 2, [0.0, 5.0, 0.0]);
        let before = p.clone();
        let report = drift_correction_basic(&[(2, 0)], &layout, &mut p).unwrap();
        assert_eq!(report.correction, DriftCorrection::Skipped);
        assert_eq!(p, before);
    }

    #[test]
    fn chain_compounds() {
        let layout = SessionLayout::from_units_per_session(&[3, 3, 3]).unwrap();
        let mut p = positions(3, 3, [0.0, 4.0, 0.0]);
        let total = Array2::from_elem((9, 9), 1.0);
        let cfg = MatchConfig { best_drift: false, ..MatchConfig::default() };
        let reports = drift_n_sessions(&self_pairs(3, 3), &layout, &mut p, &total, &cfg).unwrap();
        assert_eq!(reports.len(), 2);
        // Session 2 is already aligned to session 1 when session 3 is measured.
        assert_eq!(reports[0].correction, DriftCorrection::Global([0.0, -4.0, 0.0]));
        assert_eq!(reports[1].correction, DriftCorrection::Global([0.0, -8.0, 0.0]));
        assert_eq!(p, positions(3, 3, [0.0; 3]));
    }

    #[test]
    fn per_shank_needs_enough_matches() {
        let layout = SessionLayout::from_units_per_session(&[4, 4]).unwrap();
        let cfg = MatchConfig { n_shanks: 2, shank_dist: 60.0, ..MatchConfig::default() };
        let total = Array2::from_elem((8, 8), 1.0);

        // x = 10, 40 on shank 0; 70, 100 on shank 1.
        let mut p = positions(2, 4, [0.0, 0.0, 1.0]);
        let r = drift_n_sessions(&self_pairs(2, 4), &layout, &mut p, &total, &cfg).unwrap();
        assert_eq!(r[0].correction, DriftCorrection::PerShank(vec![[0.0, 0.0, -1.0]; 2]));

        let mut p = positions(2, 4, [0.0, 0.0, 1.0]);
        let r = drift_n_sessions(&[(0, 4), (1, 5), (2, 6)], &layout, &mut p, &total, &cfg).unwrap();
        assert_eq!(r[0].correction, DriftCorrection::Global([0.0, 0.0, -1.0]));
    }

    #[test]
    fn bad_shank_config_is_an_error() {
        let layout = SessionLayout::from_units_per_session(&[4, 4]).unwrap();
        let total = Array2::from_elem((8, 8), 1.0);
        let pairs = self_pairs(2, 4);
        for cfg in [
            MatchConfig { n_shanks: 0, ..MatchConfig::default() },
            MatchConfig { shank_axis: 3, ..MatchConfig::default() },
            MatchConfig { n_shanks: 2, shank_dist: 60.0, match_num_threshold: 0, ..MatchConfig::default() },
        ] {
            let mut p = positions(2, 4, [0.0, 3.0, 0.0]);
            let before = p.clone();
            let r = drift_n_sessions(&pairs, &layout, &mut p, &total, &cfg);
            assert!(matches!(r, Err(MatchError::InvalidConfig(_))));
            assert_eq!(p, before);
        }
    }
}
