//! Pairwise similarity metrics.
//!
//! Every metric compares unit `i` on cv half 0 with unit `j` on cv half 1
//! and returns an `[n_units, n_units]` score matrix where larger means more
//! similar.
//!
//! - [`simple`]: weighted relative difference of a per-unit scalar
//!   (amplitude, spatial decay).
//! - [`waveform`]: Fisher-z waveform correlation and waveform MSE.
//! - [`centroid`]: centroid distance at the peak, centroid variance and the
//!   recentred centroid distance.
//! - [`trajectory`]: similarity of the centroid trajectory's step angles and
//!   step lengths.

pub mod centroid;
pub mod simple;
pub mod trajectory;
pub mod waveform;

pub use centroid::{centroid_metrics, recentered_metrics};
pub use simple::get_simple_metric;
pub use trajectory::trajectory_metrics;
pub use waveform::{waveform_correlation, waveform_mse};

use ndarray::{Array2, Zip};

use crate::error::{MatchError, Result};

/// Element-wise mean of two scores, used for the composite scores
/// (`centroid_overlord`, `waveform_similarity`).
pub fn average_scores(a: &Array2<f64>, b: &Array2<f64>) -> Result<Array2<f64>> {
    if a.dim() != b.dim() {
        return Err(MatchError::shape("averaged score", a.dim(), b.dim()));
    }
    Ok(Zip::from(a).and(b).map_collect(|&x, &y| (x + y) / 2.0))
}
