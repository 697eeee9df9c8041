//! Match extraction, one-to-one deduplication, curation and evaluation.
//!
//! A pair `(a, b)` always names two rows of the unit list.  Candidate pairs
//! come from thresholding the total score; [`good_matches`] then resolves
//! units that were matched more than once by keeping their best-scoring
//! partner.
use ndarray::Array2;
use std::collections::{BTreeSet, HashMap};

use crate::session::SessionLayout;

/// Every `(i, j)` with `total[i, j] > threshold`, reported as `(j, i)`.
///
/// Pairs are produced in row-major order of `(i, j)`.  NaN never passes.
pub fn candidate_pairs(total: &Array2<f64>, threshold: f64) -> Vec<(usize, usize)> {
    total
        .indexed_iter()
        .filter(|&(_, &v)| v > threshold)
        .map(|((i, j), _)| (j, i))
        .collect()
}

/// Deduplicate pairs so every unit appears at most once per column.
///
/// Column 0 is resolved first, then column 1 among the survivors.  Within
/// a group of pairs sharing an id the first pair with the highest
/// `total[a, b]` wins.  Survivors keep their input order.
///
/// ```
/// use ndarray::Array2;
/// use unitmatch::good_matches;
///
/// let mut total = Array2::zeros((3, 3));
/// total[[0, 1]] = 0.7;
/// total[[0, 2]] = 0.9;
/// assert_eq!(good_matches(&[(0, 1), (0, 2)], &total), vec![(0, 2)]);
/// ```
pub fn good_matches(pairs: &[(usize, usize)], total: &Array2<f64>) -> Vec<(usize, usize)> {
    let mut keep = vec![true; pairs.len()];
    for column in 0..2 {
        let mut groups: HashMap<usize, Vec<usize>> = HashMap::new();
        for (k, &(a, b)) in pairs.iter().enumerate() {
            if keep[k] {
                groups.entry(if column == 0 { a } else { b }).or_default().push(k);
            }
        }
        for rows in groups.values().filter(|rows| rows.len() > 1) {
            let score = |k: usize| total[[pairs[k].0, pairs[k].1]];
            let mut best = rows[0];
            for &k in &rows[1..] {
                if score(k) > score(best) {
                    best = k;
                }
            }
            for &k in rows {
                keep[k] = k == best;
            }
        }
    }

    let out: Vec<(usize, usize)> = pairs
        .iter()
        .zip(&keep)
        .filter(|(_, &k)| k)
        .map(|(&p, _)| p)
        .collect();
    log::debug!("good_matches: {} of {} pairs kept", out.len(), pairs.len());
    out
}

/// Pairs whose first unit is in session `s` and second in session `s + 1`.
pub fn pairs_between(pairs: &[(usize, usize)], layout: &SessionLayout, s: usize) -> Vec<(usize, usize)> {
    pairs
        .iter()
        .copied()
        .filter(|&(a, b)| layout.session_of(a) == Some(s) && layout.session_of(b) == Some(s + 1))
        .collect()
}

/// How the two cross-validation match lists are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CurationMode {
    /// Keep pairs found in both lists.
    #[default]
    And,
    /// Keep pairs found in either list.
    Or,
}

/// Merge the matches of the two cross-validation directions with manual
/// curation.
///
/// `is_match` pairs are added and `not_match` pairs removed after the two
/// lists are combined.  Returns `None` when there is nothing curated, so
/// the caller can keep the automatic result.  The output is sorted and
/// free of duplicates.
pub fn curate_matches(
    cv_a: &[(usize, usize)],
    cv_b: &[(usize, usize)],
    is_match: &[(usize, usize)],
    not_match: &[(usize, usize)],
    mode: CurationMode,
) -> Option<Vec<(usize, usize)>> {
    if is_match.is_empty() && not_match.is_empty() {
        log::info!("no curated matches or non-matches");
        return None;
    }

    let a: BTreeSet<_> = cv_a.iter().copied().collect();
    let b: BTreeSet<_> = cv_b.iter().copied().collect();
    let mut matches: BTreeSet<(usize, usize)> = match mode {
        CurationMode::And => a.intersection(&b).copied().collect(),
        CurationMode::Or => a.union(&b).copied().collect(),
    };
    matches.extend(is_match.iter().copied());
    for p in not_match {
        matches.remove(p);
    }
    Some(matches.into_iter().collect())
}

/// Summary of a match-probability matrix, assuming the spike sorter made no
/// mistakes (a unit only ever matches itself within a session).
#[derive(Debug, Clone, PartialEq)]
pub struct MatchSummary {
    /// Units matched to themselves across cv halves, %.
    pub self_match_pct: f64,
    /// `100 - self_match_pct`.
    pub false_negative_pct: f64,
    /// Off-diagonal within-session matches per unit.
    pub mismatch_per_expected: f64,
    /// Off-diagonal within-session matches per session, % of possible pairs.
    pub false_positive_pct_per_session: Vec<f64>,
}

/// Evaluate `prob` (any `[n, n]` score or probability) at `match_threshold`.
pub fn evaluate_output(prob: &Array2<f64>, layout: &SessionLayout, match_threshold: f64) -> MatchSummary {
    let n = layout.n_units();
    let matched = |i: usize, j: usize| prob[[i, j]] > match_threshold;
    let sid = layout.session_id();

    let n_diag = (0..n).filter(|&i| matched(i, i)).count();
    let self_match_pct = n_diag as f64 / n as f64 * 100.0;

    let mut off_diag = 0usize;
    for i in 0..n {
        for j in 0..n {
            if i != j && sid[i] == sid[j] && matched(i, j) {
                off_diag += 1;
            }
        }
    }
    let mismatch_per_expected = off_diag as f64 / n as f64;

    let false_positive_pct_per_session: Vec<f64> = (0..layout.n_sessions())
        .map(|s| {
            let r = layout.range(s);
            let m = r.len();
            let hits = r
                .clone()
                .flat_map(|i| r.clone().map(move |j| (i, j)))
                .filter(|&(i, j)| i != j && matched(i, j))
                .count();
            hits as f64 / (m * m - m) as f64 * 100.0
        })
        .collect();

    log::info!("units matched to themselves: {self_match_pct:.1}% (false negatives {:.1}%)", 100.0 - self_match_pct);
    log::info!("mismatches per expected match: {mismatch_per_expected:.3}");
    for (s, fp) in false_positive_pct_per_session.iter().enumerate() {
        log::info!("session {}: {fp:.2}% false positives", s + 1);
    }

    MatchSummary {
        self_match_pct,
        false_negative_pct: 100.0 - self_match_pct,
        mismatch_per_expected,
        false_positive_pct_per_session,
    }
}
