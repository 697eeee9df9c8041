mod common;
use common::{max_abs_diff, recording, true_pairs};
use ndarray::Array2;
use unitmatch::{drift_correction_basic, drift_n_sessions, DriftCorrection, MatchConfig};

#[test]
fn two_sessions_recover_constant_offset() {
    let mut rec = recording(2, [1.0, 3.0, -2.0]);
    let report = drift_correction_basic(&true_pairs(2), &rec.layout, &mut rec.positions).unwrap();
    assert_eq!(report.n_pairs, 5);
    assert_eq!(report.correction, DriftCorrection::Global([-1.0, -3.0, 2.0]));

    let aligned = recording(2, [0.0; 3]);
    assert!(max_abs_diff(&rec.positions.avg_centroid, &aligned.positions.avg_centroid) < 1e-9);
    assert!(max_abs_diff(&rec.positions.waw_per_tp, &aligned.positions.waw_per_tp) < 1e-9);
}

#[test]
fn earlier_session_is_never_moved() {
    let mut rec = recording(2, [0.0, 7.0, 0.0]);
    let before = rec.positions.clone();
    drift_correction_basic(&true_pairs(2), &rec.layout, &mut rec.positions).unwrap();
    for u in 0..5 {
        assert_eq!(
            rec.positions.avg_centroid.slice(ndarray::s![.., u, ..]),
            before.avg_centroid.slice(ndarray::s![.., u, ..])
        );
    }
}

#[test]
fn chain_of_sessions_aligns_every_boundary() {
    let mut rec = recording(4, [0.0, 2.0, 1.0]);
    let total = Array2::from_elem((20, 20), 1.0);
    let cfg = MatchConfig::default();
    let reports = drift_n_sessions(&true_pairs(4), &rec.layout, &mut rec.positions, &total, &cfg).unwrap();
    assert_eq!(reports.len(), 3);
    for r in &reports {
        assert_eq!(r.n_pairs, 5);
        match &r.correction {
            DriftCorrection::PerShank(d) => assert_eq!(d.len(), 1),
            other => panic!("expected per-shank correction, got {other:?}"),
        }
    }
    let aligned = recording(4, [0.0; 3]);
    assert!(max_abs_diff(&rec.positions.avg_centroid, &aligned.positions.avg_centroid) < 1e-9);
}

#[test]
fn sparse_shanks_fall_back_to_global() {
    // Neurons at x = 40, 68 on shank 0 and 96, 124, 152 on shank 1.
    let cfg = MatchConfig { n_shanks: 2, shank_dist: 90.0, match_num_threshold: 3, ..MatchConfig::default() };
    let total = Array2::from_elem((10, 10), 1.0);

    let mut rec = recording(2, [0.0, 0.0, 4.0]);
    let r = drift_n_sessions(&true_pairs(2), &rec.layout, &mut rec.positions, &total, &cfg).unwrap();
    assert_eq!(r[0].correction, DriftCorrection::Global([0.0, 0.0, -4.0]));

    let cfg = MatchConfig { match_num_threshold: 2, ..cfg };
    let mut rec = recording(2, [0.0, 0.0, 4.0]);
    let r = drift_n_sessions(&true_pairs(2), &rec.layout, &mut rec.positions, &total, &cfg).unwrap();
    assert_eq!(r[0].correction, DriftCorrection::PerShank(vec![[0.0, 0.0, -4.0]; 2]));
}

#[test]
fn boundary_without_pairs_is_skipped() {
    let mut rec = recording(3, [0.0, 5.0, 0.0]);
    let total = Array2::from_elem((15, 15), 1.0);
    // Only the 2 → 3 boundary has matches.
    let pairs: Vec<(usize, usize)> = true_pairs(3).into_iter().filter(|&(a, _)| a >= 5).collect();
    let reports = drift_n_sessions(&pairs, &rec.layout, &mut rec.positions, &total, &MatchConfig::default()).unwrap();
    assert_eq!(reports[0].correction, DriftCorrection::Skipped);
    assert_eq!(reports[0].n_pairs, 0);
    assert!(matches!(reports[1].correction, DriftCorrection::PerShank(_)));
}
