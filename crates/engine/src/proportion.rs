//! Weights used to apportion a supergroup across its subgroups.

use imputer_core::{assert_range_spanned_exactly, Range};
use indexmap::IndexMap;
use tracing::warn;

use crate::error::{ImputeError, Result};
use crate::group::Group;
use crate::group_map::GroupMap;

/// Relative tolerance used when comparing subgroup and supergroup sizes.
pub const DEFAULT_REL_TOL: f64 = 1e-6;

/// Computes, for one supergroup, a weight in `[0, 1]` per subgroup. The
/// weights of one supergroup sum to 1.
pub trait ProportionCalculator {
    fn calculate(&self, supergroup: &str, map: &GroupMap) -> Result<IndexMap<String, f64>>;
}

impl<P: ProportionCalculator + ?Sized> ProportionCalculator for Box<P> {
    fn calculate(&self, supergroup: &str, map: &GroupMap) -> Result<IndexMap<String, f64>> {
        (**self).calculate(supergroup, map)
    }
}

/// Weight proportional to each subgroup's size.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoricalWeights {
    pub size_from: String,
    /// Normalize when subgroup sizes do not add up to the supergroup size,
    /// instead of failing.
    pub normalize: bool,
    pub rel_tol: f64,
}

impl CategoricalWeights {
    pub fn new(size_from: impl Into<String>) -> Self {
        Self {
            size_from: size_from.into(),
            normalize: false,
            rel_tol: DEFAULT_REL_TOL,
        }
    }

    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    pub fn with_rel_tol(mut self, rel_tol: f64) -> Self {
        self.rel_tol = rel_tol;
        self
    }

    fn weight_of(&self, group: &Group) -> Result<f64> {
        let attr = group.attribute(&self.size_from)?;
        match attr.value().as_f64() {
            Some(size) if size >= 0.0 && size.is_finite() => Ok(size),
            Some(size) => Err(ImputeError::InvalidSize {
                group: group.name().to_string(),
                attribute: self.size_from.clone(),
                size,
            }),
            None => Err(ImputeError::Validation {
                attribute: self.size_from.clone(),
                reason: format!("size of group '{}' is not numeric: '{}'", group.name(), attr.value()),
            }),
        }
    }
}

impl ProportionCalculator for CategoricalWeights {
    fn calculate(&self, supergroup: &str, map: &GroupMap) -> Result<IndexMap<String, f64>> {
        let mut weights = IndexMap::new();
        for name in map.subgroups_of(supergroup)? {
            weights.insert(name.clone(), self.weight_of(map.group(name)?)?);
        }
        let total: f64 = weights.values().sum();
        let supergroup_size = self.weight_of(map.group(supergroup)?)?;

        if !is_close(total, supergroup_size, self.rel_tol) {
            if !self.normalize {
                return Err(ImputeError::SizeMismatch {
                    supergroup: supergroup.to_string(),
                    subgroup_total: total,
                    supergroup_size,
                });
            }
            warn!(
                supergroup,
                subgroup_total = total,
                supergroup_size,
                "subgroup sizes disagree with supergroup size; normalizing"
            );
        }
        if total <= 0.0 {
            return Err(ImputeError::InvalidSize {
                group: supergroup.to_string(),
                attribute: self.size_from.clone(),
                size: total,
            });
        }

        Ok(normalized(weights, total))
    }
}

/// Weight proportional to how much of the supergroup's range each
/// subgroup's range covers.
#[derive(Debug, Clone, PartialEq)]
pub struct ContinuousWeights {
    pub variable_name: String,
}

impl ContinuousWeights {
    pub fn new(variable_name: impl Into<String>) -> Self {
        Self {
            variable_name: variable_name.into(),
        }
    }

    fn range_of(&self, group: &Group) -> Result<Range> {
        group
            .attribute(&self.variable_name)?
            .value()
            .as_range()
            .copied()
            .ok_or_else(|| ImputeError::NotARange {
                group: group.name().to_string(),
                attribute: self.variable_name.clone(),
            })
    }
}

impl ProportionCalculator for ContinuousWeights {
    fn calculate(&self, supergroup: &str, map: &GroupMap) -> Result<IndexMap<String, f64>> {
        let target = self.range_of(map.group(supergroup)?)?;
        let mut ranges = IndexMap::new();
        for name in map.subgroups_of(supergroup)? {
            ranges.insert(name.clone(), self.range_of(map.group(name)?)?);
        }
        let spans: Vec<Range> = ranges.values().copied().collect();
        assert_range_spanned_exactly(&target, &spans)?;

        let weights: IndexMap<String, f64> = ranges.into_iter().map(|(k, r)| (k, r.duration())).collect();
        let total: f64 = weights.values().sum();
        if total <= 0.0 {
            return Err(ImputeError::Validation {
                attribute: self.variable_name.clone(),
                reason: format!("range {target} of supergroup '{supergroup}' is empty"),
            });
        }
        Ok(normalized(weights, total))
    }
}

fn normalized(weights: IndexMap<String, f64>, total: f64) -> IndexMap<String, f64> {
    weights.into_iter().map(|(k, w)| (k, w / total)).collect()
}

/// `|a - b| <= rel_tol * max(|a|, |b|)`.
fn is_close(a: f64, b: f64, rel_tol: f64) -> bool {
    a == b || (a - b).abs() <= rel_tol * a.abs().max(b.abs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::{Attribute, ImputeAction};
    use crate::value::Value;

    fn sized(name: &str, size: f64) -> Group {
        Group::with_attributes(
            name,
            vec![Attribute::new("size", size, ImputeAction::Ignore).unwrap()],
        )
        .unwrap()
    }

    fn ranged(name: &str, lower: f64, upper: f64) -> Group {
        Group::with_attributes(
            name,
            vec![Attribute::new("age", Range::new(lower, upper).unwrap(), ImputeAction::Ignore).unwrap()],
        )
        .unwrap()
    }

    fn region(super_size: f64, low: f64, high: f64) -> GroupMap {
        let pairing = [("Low", "Region1"), ("High", "Region1")]
            .into_iter()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect();
        GroupMap::new(
            pairing,
            Some(vec![sized("Region1", super_size), sized("Low", low), sized("High", high)]),
        )
        .unwrap()
    }

    #[test]
    fn categorical_weights_follow_size() {
        let w = CategoricalWeights::new("size")
            .calculate("Region1", &region(100.0, 40.0, 60.0))
            .unwrap();
        assert_eq!(w["Low"], 0.4);
        assert_eq!(w["High"], 0.6);
    }

    #[test]
    fn categorical_mismatch_errors_unless_normalizing() {
        let map = region(100.0, 40.0, 40.0);
        let err = CategoricalWeights::new("size").calculate("Region1", &map).unwrap_err();
        assert!(matches!(err, ImputeError::SizeMismatch { .. }));

        let w = CategoricalWeights::new("size")
            .with_normalize(true)
            .calculate("Region1", &map)
            .unwrap();
        assert_eq!(w["Low"], 0.5);
        assert_eq!(w["High"], 0.5);
    }

    #[test]
    fn categorical_tolerance() {
        let map = region(100.0, 40.0, 60.00001);
        assert!(CategoricalWeights::new("size").calculate("Region1", &map).is_ok());
        assert!(CategoricalWeights::new("size")
            .with_rel_tol(1e-9)
            .calculate("Region1", &map)
            .is_err());
    }

    #[test]
    fn categorical_rejects_negative_size() {
        let map = region(20.0, -40.0, 60.0);
        assert!(matches!(
            CategoricalWeights::new("size").calculate("Region1", &map),
            Err(ImputeError::InvalidSize { .. })
        ));
    }

    fn ages(subs: &[(&str, f64, f64)]) -> GroupMap {
        let pairing = subs
            .iter()
            .map(|(name, _, _)| (name.to_string(), "0-17 years".to_string()))
            .collect();
        let mut groups = vec![ranged("0-17 years", 0.0, 18.0)];
        groups.extend(subs.iter().map(|(name, l, u)| ranged(name, *l, *u)));
        GroupMap::new(pairing, Some(groups)).unwrap()
    }

    #[test]
    fn continuous_weights_follow_duration() {
        let map = ages(&[("0-4 years", 0.0, 5.0), ("5-17 years", 5.0, 18.0)]);
        let w = ContinuousWeights::new("age").calculate("0-17 years", &map).unwrap();
        assert!((w["0-4 years"] - 5.0 / 18.0).abs() < 1e-15);
        assert!((w["5-17 years"] - 13.0 / 18.0).abs() < 1e-15);
    }

    #[test]
    fn continuous_requires_exact_cover() {
        let map = ages(&[("0-4 years", 0.0, 5.0), ("6-17 years", 6.0, 18.0)]);
        let err = ContinuousWeights::new("age").calculate("0-17 years", &map).unwrap_err();
        assert!(err.is_range_coverage());
    }

    #[test]
    fn continuous_requires_ranges() {
        let map = region(100.0, 40.0, 60.0)
            .add_attribute(
                crate::group::GroupType::Supergroup,
                "age",
                &[("Region1".to_string(), Value::from("all"))].into_iter().collect(),
                ImputeAction::Ignore,
                None,
            )
            .unwrap();
        assert!(matches!(
            ContinuousWeights::new("age").calculate("Region1", &map),
            Err(ImputeError::NotARange { .. })
        ));
    }

    #[test]
    fn boxed_calculator_delegates() {
        let calc: Box<dyn ProportionCalculator> = Box::new(CategoricalWeights::new("size"));
        let w = calc.calculate("Region1", &region(100.0, 40.0, 60.0)).unwrap();
        assert_eq!(w.len(), 2);
    }

    #[test]
    fn continuous_weights_sum_to_one() {
        let pairing = [("0-<6 months", "0-4 years"), ("6-23 months", "0-4 years"), ("2-4 years", "0-4 years")]
            .into_iter()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect();
        let map = GroupMap::new(
            pairing,
            Some(vec![
                ranged("0-4 years", 0.0, 5.0),
                ranged("0-<6 months", 0.0, 0.5),
                ranged("6-23 months", 0.5, 2.0),
                ranged("2-4 years", 2.0, 5.0),
            ]),
        )
        .unwrap();

        let w = ContinuousWeights::new("age").calculate("0-4 years", &map).unwrap();
        assert!((w.values().sum::<f64>() - 1.0).abs() < 1e-15);
        assert!((w["6-23 months"] - 0.3).abs() < 1e-15);
    }
}
