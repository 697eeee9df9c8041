/// Shared synthetic recordings for the integration tests.
///
/// Five distinct neurons are recorded in every session.  Unit `u` is neuron
/// `u % 5` of session `u / 5`.  Neurons differ in waveform shape,
/// amplitude, spatial decay, position (28 µm apart in x) and centroid
/// trajectory; each later session is displaced by a fixed offset.  The two
/// cv halves differ by a small deterministic wiggle so that no score is
/// perfectly degenerate.
use ndarray::{Array2, Array3, Array4};
use unitmatch::{DerivedParams, SessionLayout, UnitData, UnitPositions};

pub const N_NEURONS: usize = 5;
pub const SPIKE_WIDTH: usize = 40;
const PEAK: f64 = 20.0;

const X: [f64; N_NEURONS] = [40.0, 68.0, 96.0, 124.0, 152.0];
const DEPTH: [f64; N_NEURONS] = [300.0, 310.0, 320.0, 330.0, 340.0];
const SLOPE: [f64; N_NEURONS] = [4.0, -3.0, 1.5, 6.0, -5.0];
const CURVE: [f64; N_NEURONS] = [2.0, 5.0, -4.0, 1.0, 3.0];

#[allow(unused)]
pub struct Recording {
    pub data: UnitData,
    pub positions: UnitPositions,
    pub layout: SessionLayout,
    pub derived: DerivedParams,
}

fn wave(k: usize, t: usize, cv: usize, s: usize) -> f64 {
    let t = t as f64;
    let width = 1.5 + 0.7 * k as f64;
    let rebound_at = 24.0 + 2.0 * k as f64;
    -(-((t - PEAK) / width).powi(2)).exp()
        + (0.3 + 0.1 * k as f64) * (-((t - rebound_at) / 3.0).powi(2)).exp()
        + 0.02 * (1.3 * t + 0.7 * cv as f64 + 2.1 * s as f64 + k as f64).sin()
}

#[allow(unused)]
/// Average centroid of neuron `u % 5` in session `u / 5`.
pub fn base(d: usize, u: usize, offset: [f64; 3]) -> f64 {
    let (k, s) = (u % N_NEURONS, u / N_NEURONS);
    let b = match d {
        0 => 0.0,
        1 => X[k],
        _ => DEPTH[k],
    };
    b + s as f64 * offset[d]
}

fn position(d: usize, u: usize, t: usize, cv: usize, offset: [f64; 3]) -> f64 {
    let (k, s) = (u % N_NEURONS, u / N_NEURONS);
    let x = (t as f64 - PEAK) / 10.0;
    let wiggle = 0.2 * (t as f64 + cv as f64 + s as f64).sin();
    match d {
        0 => base(d, u, offset),
        1 => base(d, u, offset) + SLOPE[k] * x + wiggle,
        _ => base(d, u, offset) + CURVE[k] * x * x + wiggle,
    }
}

/// `n_sessions` sessions of the five neurons, session `s` displaced by
/// `s · offset`.
pub fn recording(n_sessions: usize, offset: [f64; 3]) -> Recording {
    let n = n_sessions * N_NEURONS;
    let waveform = Array3::from_shape_fn((SPIKE_WIDTH, n, 2), |(t, u, cv)| {
        wave(u % N_NEURONS, t, cv, u / N_NEURONS)
    });
    let amplitude = Array2::from_shape_fn((n, 2), |(u, cv)| {
        60.0 + 90.0 * (u % N_NEURONS) as f64 + 2.0 * cv as f64
    });
    let spatial_decay = Array2::from_shape_fn((n, 2), |(u, cv)| {
        0.02 + 0.015 * (u % N_NEURONS) as f64 + 0.0005 * cv as f64
    });
    let waw_per_tp = Array4::from_shape_fn((3, n, SPIKE_WIDTH, 2), |(d, u, t, cv)| {
        position(d, u, t, cv, offset)
    });
    let avg_centroid = Array3::from_shape_fn((3, n, 2), |(d, u, _)| base(d, u, offset));

    Recording {
        data: UnitData::new(waveform, amplitude, spatial_decay).unwrap(),
        positions: UnitPositions::new(avg_centroid, waw_per_tp).unwrap(),
        layout: SessionLayout::from_units_per_session(&vec![N_NEURONS; n_sessions]).unwrap(),
        derived: DerivedParams::from_data(n, SPIKE_WIDTH).unwrap(),
    }
}

/// `(k, k + 5)` for every neuron of every consecutive session pair.
#[allow(unused)]
pub fn true_pairs(n_sessions: usize) -> Vec<(usize, usize)> {
    (0..n_sessions - 1)
        .flat_map(|s| (0..N_NEURONS).map(move |k| (s * N_NEURONS + k, (s + 1) * N_NEURONS + k)))
        .collect()
}

#[allow(unused)]
pub fn max_abs_diff<D: ndarray::Dimension>(a: &ndarray::Array<f64, D>, b: &ndarray::Array<f64, D>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).abs())
        .fold(0.0_f64, f64::max)
}
