//! Library error type.
//!
//! Only malformed inputs, configuration problems and a failed threshold
//! search are errors.  Degenerate statistics (zero-range rescaling, all-NaN
//! slices) are not: they surface as NaN/Inf in the affected matrices.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MatchError {
    /// An input array does not have the shape the operation expects.
    #[error("shape mismatch for {what}: expected {expected}, got {got}")]
    ShapeMismatch {
        what: &'static str,
        expected: String,
        got: String,
    },

    #[error("invalid session layout: {0}")]
    InvalidSessions(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// No candidate score satisfied the histogram crossing condition.
    #[error("threshold not found: no candidate score where self-matches outnumber non-matches")]
    ThresholdNotFound,

    #[error("unknown score {0:?}")]
    UnknownScore(String),
}

pub type Result<T> = std::result::Result<T, MatchError>;

impl MatchError {
    pub(crate) fn shape(what: &'static str, expected: impl std::fmt::Debug, got: impl std::fmt::Debug) -> Self {
        MatchError::ShapeMismatch {
            what,
            expected: format!("{expected:?}"),
            got: format!("{got:?}"),
        }
    }
}
