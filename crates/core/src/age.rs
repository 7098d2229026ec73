//! Age-band labels ("6 months-4 years", "65+ years") to numeric ranges.
//!
//! Ranges are half-open and measured in years; months are twelfths of a
//! year. An open upper bound ("N+ years") is replaced by the parser's
//! `age_max` ceiling, so every label parsed in one run must share a parser
//! (or at least an `age_max`) for the ranges to be comparable.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::CoreError;
use crate::range::Range;

/// Ceiling substituted for open-ended labels when none is configured.
pub const DEFAULT_AGE_MAX: f64 = 100.0;

/// Captured numbers in, `(lower, upper)` out; `None` upper means open-ended.
type Converter = fn(&[f64]) -> (f64, Option<f64>);

fn single_year(n: &[f64]) -> (f64, Option<f64>) {
    (n[0] - 1.0, Some(n[0]))
}

fn years_and_over(n: &[f64]) -> (f64, Option<f64>) {
    (n[0], None)
}

fn years_inclusive(n: &[f64]) -> (f64, Option<f64>) {
    (n[0], Some(n[1] + 1.0))
}

fn years_exclusive(n: &[f64]) -> (f64, Option<f64>) {
    (n[0], Some(n[1]))
}

fn months_to_years_inclusive(n: &[f64]) -> (f64, Option<f64>) {
    (n[0] / 12.0, Some(n[1] + 1.0))
}

fn months_to_years_exclusive(n: &[f64]) -> (f64, Option<f64>) {
    (n[0] / 12.0, Some(n[1]))
}

fn months_inclusive(n: &[f64]) -> (f64, Option<f64>) {
    (n[0] / 12.0, Some((n[1] + 1.0) / 12.0))
}

fn months_exclusive(n: &[f64]) -> (f64, Option<f64>) {
    (n[0] / 12.0, Some(n[1] / 12.0))
}

/// Ordered (pattern, converter) table. First full match wins.
const AGE_PATTERNS: &[(&str, Converter)] = &[
    (r"^(\d+) years?$", single_year),
    (r"^(\d+)\+ years?$", years_and_over),
    (r"^(\d+)-(\d+) years?$", years_inclusive),
    (r"^(\d+)-<(\d+) years?$", years_exclusive),
    (r"^(\d+) months?-(\d+) years?$", months_to_years_inclusive),
    (r"^(\d+) months?-<(\d+) years?$", months_to_years_exclusive),
    (r"^(\d+)-(\d+) months?$", months_inclusive),
    (r"^(\d+)-<(\d+) months?$", months_exclusive),
];

fn converters() -> &'static [(Regex, Converter)] {
    static TABLE: OnceLock<Vec<(Regex, Converter)>> = OnceLock::new();
    TABLE.get_or_init(|| {
        AGE_PATTERNS
            .iter()
            .map(|(pattern, convert)| (Regex::new(pattern).expect("age pattern compiles"), *convert))
            .collect()
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgeParser {
    age_max: f64,
}

impl Default for AgeParser {
    fn default() -> Self {
        Self {
            age_max: DEFAULT_AGE_MAX,
        }
    }
}

impl AgeParser {
    pub fn new(age_max: f64) -> Result<Self, CoreError> {
        if !(age_max.is_finite() && age_max > 0.0) {
            return Err(CoreError::InvalidRange {
                lower: 0.0,
                upper: age_max,
            });
        }
        Ok(Self { age_max })
    }

    pub fn age_max(&self) -> f64 {
        self.age_max
    }

    /// Parse a label into its `[lower, upper)` range in years. The whole
    /// label must match, surrounding whitespace included. A band reaching
    /// below zero ("0 years") is an invalid range.
    pub fn parse(&self, label: &str) -> Result<Range, CoreError> {
        for (pattern, convert) in converters() {
            let Some(caps) = pattern.captures(label) else {
                continue;
            };
            let numbers = caps
                .iter()
                .skip(1)
                .flatten()
                .map(|m| m.as_str().parse::<f64>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| CoreError::UnparseableAgeRange(label.to_string()))?;
            let (lower, upper) = convert(&numbers);
            let upper = upper.unwrap_or(self.age_max);
            if lower < 0.0 {
                return Err(CoreError::InvalidRange { lower, upper });
            }
            return Range::new(lower, upper);
        }
        Err(CoreError::UnparseableAgeRange(label.to_string()))
    }

    /// True if `label` is a recognized age label. Other failures (e.g. an
    /// open label starting above `age_max`) still count as recognized.
    pub fn is_valid_label(&self, label: &str) -> bool {
        match self.parse(label) {
            Ok(_) => true,
            Err(e) => !e.is_unparseable_age_range(),
        }
    }

    /// True if both labels encode the same interval, e.g. "1-3 years" and
    /// "1-<4 years".
    pub fn equivalent(&self, a: &str, b: &str) -> Result<bool, CoreError> {
        Ok(self.parse(a)? == self.parse(b)?)
    }
}
