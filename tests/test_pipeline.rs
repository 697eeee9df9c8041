mod common;
use common::{max_abs_diff, recording, N_NEURONS};
use unitmatch::{evaluate_output, run_matching, DriftCorrection, MatchConfig, MatchError};

fn drift_of(c: &DriftCorrection) -> [f64; 3] {
    match c {
        DriftCorrection::Global(d) => *d,
        DriftCorrection::PerShank(ds) if ds.len() == 1 => ds[0],
        other => panic!("unexpected correction {other:?}"),
    }
}

#[test]
fn two_sessions_end_to_end() {
    let rec = recording(2, [0.0, 3.0, 0.0]);
    let cfg = MatchConfig::default();
    let out = run_matching(&rec.data, rec.positions, &rec.layout, &cfg, &rec.derived).unwrap();

    // Every neuron is found again in the second session.
    for k in 0..N_NEURONS {
        assert!(out.matches.contains(&(k, k + N_NEURONS)), "neuron {k} not matched: {:?}", out.matches);
    }
    assert!(out.matches.iter().all(|&(a, b)| a % N_NEURONS == b % N_NEURONS));

    // The later session was displaced by +3 in x; the correction is −3.
    assert_eq!(out.drift.len(), 1);
    let d = drift_of(&out.drift[0].correction);
    approx::assert_abs_diff_eq!(d[0], 0.0, epsilon = 1e-12);
    approx::assert_abs_diff_eq!(d[1], -3.0, epsilon = 1e-12);
    approx::assert_abs_diff_eq!(d[2], 0.0, epsilon = 1e-12);

    let aligned = recording(2, [0.0; 3]);
    assert!(max_abs_diff(&out.positions.avg_centroid, &aligned.positions.avg_centroid) < 1e-9);

    assert!(out.threshold.threshold > 0.6 && out.threshold.threshold < 1.0);
    assert_eq!(out.predictors.dim(), (10, 10, cfg.scores_to_include.len()));
    assert_eq!(out.scores.len(), 11);

    let summary = evaluate_output(&out.total, &rec.layout, out.threshold.threshold);
    approx::assert_abs_diff_eq!(summary.self_match_pct, 100.0, epsilon = 1e-12);
    approx::assert_abs_diff_eq!(summary.mismatch_per_expected, 0.0, epsilon = 1e-12);
}

#[test]
fn three_sessions_chain() {
    let rec = recording(3, [0.0, 3.0, 0.0]);
    let out = run_matching(&rec.data, rec.positions, &rec.layout, &MatchConfig::default(), &rec.derived).unwrap();
    assert_eq!(out.drift.len(), 2);
    approx::assert_abs_diff_eq!(drift_of(&out.drift[0].correction)[1], -3.0, epsilon = 1e-12);
    // Session 3 is compared against the already corrected session 2.
    approx::assert_abs_diff_eq!(drift_of(&out.drift[1].correction)[1], -6.0, epsilon = 1e-12);
    assert!(!out.matches.is_empty());
    assert!(out.matches.iter().all(|&(a, b)| a % N_NEURONS == b % N_NEURONS));
}

#[test]
fn no_drift_rounds() {
    let rec = recording(2, [0.0, 3.0, 0.0]);
    let cfg = MatchConfig { drift_iterations: 0, ..MatchConfig::default() };
    let before = rec.positions.clone();
    let out = run_matching(&rec.data, rec.positions, &rec.layout, &cfg, &rec.derived).unwrap();
    assert!(out.drift.is_empty());
    assert_eq!(out.positions, before);
    for k in 0..N_NEURONS {
        assert!(out.matches.contains(&(k, k + N_NEURONS)));
    }
}

#[test]
fn unknown_score_name_fails() {
    let rec = recording(2, [0.0; 3]);
    let cfg = MatchConfig { scores_to_include: vec!["amplitude".into(), "no_such_score".into()], ..MatchConfig::default() };
    let err = run_matching(&rec.data, rec.positions, &rec.layout, &cfg, &rec.derived);
    assert!(matches!(err, Err(MatchError::UnknownScore(name)) if name == "no_such_score"));
}
