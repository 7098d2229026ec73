//! Closed-open intervals on a continuous axis (e.g. age in years).

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A slice `[lower, upper)` of a one-dimensional variable.
///
/// Immutable once built; `lower <= upper` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawRange")]
pub struct Range {
    lower: f64,
    upper: f64,
}

#[derive(Deserialize)]
struct RawRange {
    lower: f64,
    upper: f64,
}

impl TryFrom<RawRange> for Range {
    type Error = CoreError;

    fn try_from(raw: RawRange) -> Result<Self, Self::Error> {
        Range::new(raw.lower, raw.upper)
    }
}

impl Range {
    pub fn new(lower: f64, upper: f64) -> Result<Self, CoreError> {
        // `!(lower <= upper)` also rejects NaN bounds
        if !(lower <= upper) {
            return Err(CoreError::InvalidRange { lower, upper });
        }
        Ok(Self { lower, upper })
    }

    pub fn lower(&self) -> f64 {
        self.lower
    }

    pub fn upper(&self) -> f64 {
        self.upper
    }

    /// Width of the interval, `upper - lower`.
    pub fn duration(&self) -> f64 {
        self.upper - self.lower
    }

    /// True if `other` lies entirely inside `self`.
    pub fn contains(&self, other: &Range) -> bool {
        self.lower <= other.lower && other.upper <= self.upper
    }

    /// True if `self` lies entirely to the left of `other` (touching allowed).
    pub fn precedes(&self, other: &Range) -> bool {
        self.upper <= other.lower
    }

    /// Join two exactly adjacent ranges: `[a, b) + [b, c) = [a, c)`.
    pub fn concat(&self, next: &Range) -> Result<Range, CoreError> {
        if self.upper != next.lower {
            return Err(CoreError::NotAdjacent {
                left: *self,
                right: *next,
            });
        }
        Ok(Range {
            lower: self.lower,
            upper: next.upper,
        })
    }

    pub fn to_tuple(&self) -> (f64, f64) {
        (self.lower, self.upper)
    }
}

impl TryFrom<(f64, f64)> for Range {
    type Error = CoreError;

    fn try_from((lower, upper): (f64, f64)) -> Result<Self, Self::Error> {
        Range::new(lower, upper)
    }
}

/// Disjoint ranges are ordered left to right; overlapping ranges are unordered.
impl PartialOrd for Range {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self == other {
            Some(Ordering::Equal)
        } else if self.precedes(other) {
            Some(Ordering::Less)
        } else if other.precedes(self) {
            Some(Ordering::Greater)
        } else {
            None
        }
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.lower, self.upper)
    }
}

/// Check that `candidates` tile `target` exactly: sorted by lower bound they
/// must chain end-to-start with no gap or overlap, starting at
/// `target.lower` and ending at `target.upper`.
pub fn assert_range_spanned_exactly(target: &Range, candidates: &[Range]) -> Result<(), CoreError> {
    let coverage_err = |reason: String| CoreError::RangeCoverage {
        target: *target,
        reason,
    };

    let mut sorted = candidates.to_vec();
    sorted.sort_by(|a, b| a.lower.total_cmp(&b.lower));

    let Some((first, rest)) = sorted.split_first() else {
        return Err(coverage_err("no candidate ranges".into()));
    };

    if first.lower != target.lower {
        return Err(coverage_err(format!(
            "lowest candidate starts at {}, expected {}",
            first.lower, target.lower
        )));
    }

    let mut cumulative = *first;
    for next in rest {
        cumulative = cumulative.concat(next).map_err(|_| {
            if next.lower > cumulative.upper {
                coverage_err(format!("gap between {} and {}", cumulative.upper, next.lower))
            } else {
                coverage_err(format!("{next} overlaps {cumulative}"))
            }
        })?;
    }

    if cumulative.upper != target.upper {
        return Err(coverage_err(format!(
            "candidates end at {}, expected {}",
            cumulative.upper, target.upper
        )));
    }

    Ok(())
}
