//! Attributes: named values attached to a group, with a policy for what
//! happens to them when crossing between supergroups and subgroups.
//!
//! Only `impute` attributes carry a [`MeasurementType`]; the pairing is
//! checked at construction so the rest of the engine can rely on it.

use std::fmt;
use std::ops::Mul;

use serde::{Deserialize, Serialize};

use crate::error::{ImputeError, Result};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImputeAction {
    /// Apportion by weight when disaggregating, sum when aggregating.
    Impute,
    /// Carry the value across tiers verbatim.
    Copy,
    /// Drop the value when crossing tiers.
    Ignore,
}

impl fmt::Display for ImputeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Impute => write!(f, "impute"),
            Self::Copy => write!(f, "copy"),
            Self::Ignore => write!(f, "ignore"),
        }
    }
}

/// How an imputable value behaves under apportionment.
///
/// Counts are mass-like and split additively; rates are density-like and
/// must pass through a count before they can be split or summed. The
/// `*_from_*` variants remember which conversion produced the value so it
/// can be undone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementType {
    Count,
    Rate,
    CountFromRate,
    RateFromCount,
}

impl MeasurementType {
    pub fn is_rate_like(self) -> bool {
        matches!(self, Self::Rate | Self::RateFromCount)
    }

    pub fn is_count_like(self) -> bool {
        matches!(self, Self::Count | Self::CountFromRate)
    }

    /// Tag after dividing by a size, for a count that is not a converted
    /// rate.
    fn rated(self) -> Self {
        match self {
            Self::Count => Self::RateFromCount,
            Self::CountFromRate => Self::Rate,
            other => other,
        }
    }
}

impl fmt::Display for MeasurementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count => write!(f, "count"),
            Self::Rate => write!(f, "rate"),
            Self::CountFromRate => write!(f, "count_from_rate"),
            Self::RateFromCount => write!(f, "rate_from_count"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    name: String,
    value: Value,
    action: ImputeAction,
    measurement: Option<MeasurementType>,
    /// The value as it appears in records, when that differs from `value`
    /// (e.g. the label "0-4 years" for a parsed range).
    record_value: Option<Value>,
    /// Set on counts produced by [`Attribute::to_count`]: the rate tag to
    /// put back on the way out.
    rate_origin: Option<MeasurementType>,
}

impl Attribute {
    /// A `copy` or `ignore` attribute. Imputing requires a measurement type,
    /// see [`Attribute::imputable`].
    pub fn new(name: impl Into<String>, value: impl Into<Value>, action: ImputeAction) -> Result<Self> {
        Self::from_parts(name, value.into(), action, None)
    }

    /// An `impute` attribute holding a non-negative measurement.
    pub fn imputable(name: impl Into<String>, value: f64, measurement: MeasurementType) -> Result<Self> {
        Self::from_parts(name, Value::Number(value), ImputeAction::Impute, Some(measurement))
    }

    /// Validating constructor shared by every other one.
    pub fn from_parts(
        name: impl Into<String>,
        value: Value,
        action: ImputeAction,
        measurement: Option<MeasurementType>,
    ) -> Result<Self> {
        let name = name.into();
        let invalid = |reason: String| ImputeError::Validation {
            attribute: name.clone(),
            reason,
        };

        match (action, measurement) {
            (ImputeAction::Impute, None) => {
                return Err(invalid("imputed attributes need a measurement type".into()));
            }
            (ImputeAction::Impute, Some(_)) => match value.as_f64() {
                Some(v) if v >= 0.0 => {}
                Some(v) => return Err(invalid(format!("imputed value must be non-negative, got {v}"))),
                None => return Err(invalid(format!("imputed value must be numeric, got '{value}'"))),
            },
            (_, Some(m)) => {
                return Err(invalid(format!(
                    "measurement type '{m}' given for a '{action}' attribute"
                )));
            }
            (_, None) => {}
        }

        Ok(Self {
            name,
            value,
            action,
            measurement,
            record_value: None,
            rate_origin: None,
        })
    }

    pub fn with_record_value(mut self, record_value: impl Into<Value>) -> Self {
        self.record_value = Some(record_value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn action(&self) -> ImputeAction {
        self.action
    }

    pub fn measurement(&self) -> Option<MeasurementType> {
        self.measurement
    }

    /// What this attribute looks like in a record: the record value if one
    /// was given, otherwise the value itself.
    pub fn record_value(&self) -> &Value {
        self.record_value.as_ref().unwrap_or(&self.value)
    }

    pub fn is_imputed(&self) -> bool {
        self.action == ImputeAction::Impute
    }

    pub fn is_rate_like(&self) -> bool {
        self.is_imputed() && self.measurement.is_some_and(MeasurementType::is_rate_like)
    }

    /// The rate tag this count was converted from, if it came out of
    /// [`Attribute::to_count`].
    pub fn rate_origin(&self) -> Option<MeasurementType> {
        self.rate_origin
    }

    /// Count-equivalent of a rate: `value * size`, tagged `count_from_rate`
    /// whichever rate tag it started with. Counts are only rescaled.
    pub fn to_count(&self, size: f64) -> Attribute {
        match self.measurement {
            Some(m) if m.is_rate_like() => {
                self.rescaled(|v| v * size, Some(MeasurementType::CountFromRate), Some(m))
            }
            m => self.rescaled(|v| v * size, m, self.rate_origin),
        }
    }

    /// Rate-equivalent of a count: `value / size`. A converted rate gets its
    /// original tag back, so this is the exact inverse of
    /// [`Attribute::to_count`] with the same size.
    pub fn to_rate(&self, size: f64) -> Attribute {
        let measurement = match self.rate_origin {
            Some(origin) => Some(origin),
            None => self.measurement.map(MeasurementType::rated),
        };
        self.rescaled(|v| v / size, measurement, None)
    }

    /// Scale the value, keeping the measurement type.
    pub fn scale(&self, k: f64) -> Attribute {
        self.rescaled(|v| v * k, self.measurement, self.rate_origin)
    }

    /// A summed count that stands for rates tagged `origin`.
    pub(crate) fn converted_from(mut self, origin: MeasurementType) -> Attribute {
        self.measurement = Some(MeasurementType::CountFromRate);
        self.rate_origin = Some(origin);
        self
    }

    fn rescaled(
        &self,
        f: impl Fn(f64) -> f64,
        measurement: Option<MeasurementType>,
        rate_origin: Option<MeasurementType>,
    ) -> Attribute {
        let value = match self.value {
            Value::Number(v) => Value::Number(f(v)),
            ref other => other.clone(),
        };
        Attribute {
            name: self.name.clone(),
            value,
            action: self.action,
            measurement,
            record_value: None,
            rate_origin,
        }
    }
}

impl Mul<f64> for &Attribute {
    type Output = Attribute;

    fn mul(self, k: f64) -> Attribute {
        self.scale(k)
    }
}
