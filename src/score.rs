//! Named score collection and the total score.
use ndarray::{Array2, Array3, Axis};

use crate::error::{MatchError, Result};
use crate::stats::{nan_max, nan_min};

/// Ordered collection of named `[n_units, n_units]` score matrices.
///
/// Insertion order is kept: it fixes the metric axis of the predictor
/// tensor.  Inserting an existing name replaces the matrix in place.
#[derive(Debug, Clone, Default)]
pub struct ScoreSet {
    entries: Vec<(String, Array2<f64>)>,
}

impl ScoreSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, score: Array2<f64>) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = score,
            None => self.entries.push((name, score)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Array2<f64>> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Array2<f64>)> {
        self.entries.iter().map(|(n, s)| (n.as_str(), s))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// New set holding `names` in the given order.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<ScoreSet> {
        let mut out = ScoreSet::new();
        for name in names {
            let name = name.as_ref();
            let score = self.get(name).ok_or_else(|| MatchError::UnknownScore(name.to_string()))?;
            out.insert(name, score.clone());
        }
        Ok(out)
    }
}

/// Sum the scores and min–max normalise the sum to `[0, 1]`.
///
/// Returns `(total, predictors)` where `predictors[.., .., k]` is the k-th
/// score in insertion order.  NaN entries stay NaN and are ignored when
/// finding the range.  A sum with zero range divides by zero; the caller
/// decides what to do with the resulting NaN.
pub fn total_score(scores: &ScoreSet) -> Result<(Array2<f64>, Array3<f64>)> {
    let mut iter = scores.iter();
    let (_, first) = iter
        .next()
        .ok_or_else(|| MatchError::InvalidConfig("no scores to combine".into()))?;
    let (n, m) = first.dim();
    if n != m {
        return Err(MatchError::shape("score matrix", (n, n), (n, m)));
    }

    let mut predictors = Array3::<f64>::zeros((n, n, scores.len()));
    let mut total = Array2::<f64>::zeros((n, n));
    for (k, (name, score)) in scores.iter().enumerate() {
        if score.dim() != (n, n) {
            log::debug!("score {name:?} has shape {:?}", score.dim());
            return Err(MatchError::shape("score matrix", (n, n), score.dim()));
        }
        predictors.index_axis_mut(Axis(2), k).assign(score);
        total += score;
    }

    let lo = nan_min(total.iter().copied());
    let hi = nan_max(total.iter().copied());
    total.mapv_inplace(|v| (v - lo) / (hi - lo));
    Ok((total, predictors))
}
