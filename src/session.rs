//! Session bookkeeping for the concatenated unit list.
//!
//! Units of all sessions are concatenated; session `s` owns the unit
//! indices `switch[s] .. switch[s + 1]`.
use ndarray::Array2;
use std::ops::Range;

use crate::error::{MatchError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLayout {
    switch: Vec<usize>,
    session_id: Vec<usize>,
}

impl SessionLayout {
    /// Build from the number of units recorded in each session.
    ///
    /// ```
    /// use unitmatch::SessionLayout;
    /// let layout = SessionLayout::from_units_per_session(&[3, 2]).unwrap();
    /// assert_eq!(layout.switch(), &[0, 3, 5]);
    /// assert_eq!(layout.session_id(), &[0, 0, 0, 1, 1]);
    /// ```
    pub fn from_units_per_session(units_per_session: &[usize]) -> Result<Self> {
        let mut switch = Vec::with_capacity(units_per_session.len() + 1);
        switch.push(0);
        for &n in units_per_session {
            switch.push(switch[switch.len() - 1] + n);
        }
        Self::new(switch)
    }

    /// Build from an explicit switch vector (`n_sessions + 1` boundaries).
    pub fn new(switch: Vec<usize>) -> Result<Self> {
        if switch.len() < 2 {
            return Err(MatchError::InvalidSessions(format!(
                "switch vector needs at least 2 entries, got {}",
                switch.len()
            )));
        }
        if switch[0] != 0 {
            return Err(MatchError::InvalidSessions(format!(
                "switch vector must start at 0, got {}",
                switch[0]
            )));
        }
        if switch.windows(2).any(|w| w[1] < w[0]) {
            return Err(MatchError::InvalidSessions(format!(
                "switch vector must be non-decreasing: {switch:?}"
            )));
        }
        let n_units = switch[switch.len() - 1];
        let mut session_id = vec![0; n_units];
        for (s, w) in switch.windows(2).enumerate() {
            session_id[w[0]..w[1]].fill(s);
        }
        Ok(Self { switch, session_id })
    }

    pub fn switch(&self) -> &[usize] {
        &self.switch
    }

    pub fn session_id(&self) -> &[usize] {
        &self.session_id
    }

    pub fn n_sessions(&self) -> usize {
        self.switch.len() - 1
    }

    pub fn n_units(&self) -> usize {
        self.session_id.len()
    }

    /// Unit indices of session `s`.
    pub fn range(&self, s: usize) -> Range<usize> {
        self.switch[s]..self.switch[s + 1]
    }

    pub fn session_of(&self, unit: usize) -> Option<usize> {
        self.session_id.get(unit).copied()
    }

    /// `[n_units, n_units]` mask, `true` where both units were recorded in
    /// the same session.
    pub fn same_session(&self) -> Array2<bool> {
        let n = self.n_units();
        Array2::from_shape_fn((n, n), |(i, j)| self.session_id[i] == self.session_id[j])
    }

    /// Fail unless the layout covers exactly `n_units` units.
    pub fn check_units(&self, what: &'static str, n_units: usize) -> Result<()> {
        if n_units != self.n_units() {
            return Err(MatchError::shape(what, self.n_units(), n_units));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_session_mask() {
        let layout = SessionLayout::from_units_per_session(&[2, 1]).unwrap();
        let m = layout.same_session();
        assert!(m[[0, 1]]);
        assert!(!m[[1, 2]]);
        assert!(m[[2, 2]]);
    }

    #[test]
    fn session_lookup() {
        let layout = SessionLayout::from_units_per_session(&[2, 0, 3]).unwrap();
        assert_eq!(layout.n_sessions(), 3);
        assert_eq!(layout.session_of(1), Some(0));
        assert_eq!(layout.session_of(2), Some(2));
        assert_eq!(layout.session_of(5), None);
        assert_eq!(layout.range(1), 2..2);
    }

    #[test]
    fn rejects_bad_switch() {
        assert!(SessionLayout::new(vec![0]).is_err());
        assert!(SessionLayout::new(vec![1, 4]).is_err());
        assert!(SessionLayout::new(vec![0, 4, 2]).is_err());
    }
}
