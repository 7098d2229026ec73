use thiserror::Error;

use crate::range::Range;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    /// Lower bound above upper bound, or a NaN bound.
    #[error("invalid range: lower bound {lower} exceeds upper bound {upper}")]
    InvalidRange { lower: f64, upper: f64 },

    /// Concatenation requires `left.upper == right.lower` exactly.
    #[error("ranges {left} and {right} are not adjacent")]
    NotAdjacent { left: Range, right: Range },

    /// Candidate ranges leave a gap, overlap, or miss a boundary of the target.
    #[error("ranges do not span {target} exactly: {reason}")]
    RangeCoverage { target: Range, reason: String },

    /// No age-label pattern matched.
    #[error("cannot process age range '{0}'")]
    UnparseableAgeRange(String),
}

impl CoreError {
    /// True only for label-parsing failures, so callers can probe labels
    /// without swallowing unrelated errors.
    pub fn is_unparseable_age_range(&self) -> bool {
        matches!(self, Self::UnparseableAgeRange(_))
    }
}
