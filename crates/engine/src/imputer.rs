//! Moving measurements across a group map: down (disaggregation) and up
//! (aggregation).

use indexmap::IndexMap;
use tracing::debug;

use crate::attribute::{Attribute, ImputeAction, MeasurementType};
use crate::error::{ImputeError, Result};
use crate::group::Group;
use crate::group_map::GroupMap;
use crate::proportion::ProportionCalculator;

pub const DEFAULT_SIZE_FROM: &str = "size";

/// Spreads each supergroup's measurements over its subgroups.
#[derive(Debug, Clone)]
pub struct Disaggregator<P> {
    calculator: P,
    size_from: String,
}

impl<P: ProportionCalculator> Disaggregator<P> {
    pub fn new(calculator: P) -> Self {
        Self {
            calculator,
            size_from: DEFAULT_SIZE_FROM.to_string(),
        }
    }

    pub fn with_size_from(mut self, size_from: impl Into<String>) -> Self {
        self.size_from = size_from.into();
        self
    }

    /// A new map holding every supergroup unchanged and every subgroup
    /// filled in from its supergroup.
    ///
    /// In a chained hierarchy a group filled in as a subgroup is then used,
    /// filled, as the supergroup of the next level down.
    pub fn apply(&self, map: &GroupMap) -> Result<GroupMap> {
        let mut done: IndexMap<String, Group> = IndexMap::new();

        for supergroup_name in map.supergroups_top_down() {
            let supergroup = match done.get(supergroup_name) {
                Some(filled) => filled.clone(),
                None => map.group(supergroup_name)?.clone(),
            };
            let weights = self.calculator.calculate(supergroup_name, map)?;
            debug!(supergroup = supergroup_name, subgroups = weights.len(), "disaggregating");

            for subgroup_name in map.subgroups_of(supergroup_name)? {
                let prop = weights.get(subgroup_name).copied().ok_or_else(|| {
                    ImputeError::MissingAttribute {
                        group: subgroup_name.clone(),
                        attribute: "weight".into(),
                    }
                })?;
                let filled = supergroup.disaggregate_one_subgroup(
                    map.group(subgroup_name)?,
                    prop,
                    &self.size_from,
                    &self.size_from,
                )?;
                done.insert(subgroup_name.clone(), filled);
            }
        }

        rebuild(map, done)
    }
}

/// Rolls subgroup measurements up into their supergroup.
#[derive(Debug, Clone)]
pub struct Aggregator {
    size_from: String,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(DEFAULT_SIZE_FROM)
    }
}

impl Aggregator {
    pub fn new(size_from: impl Into<String>) -> Self {
        Self {
            size_from: size_from.into(),
        }
    }

    /// A new map holding every subgroup unchanged and every supergroup
    /// extended with the aggregated subgroup attributes.
    ///
    /// Chained hierarchies aggregate bottom-up, each level from the one
    /// below it as already aggregated.
    pub fn apply(&self, map: &GroupMap) -> Result<GroupMap> {
        let mut done: IndexMap<String, Group> = IndexMap::new();

        for supergroup_name in map.supergroups_top_down().into_iter().rev() {
            let subgroups = map
                .subgroups_of(supergroup_name)?
                .iter()
                .map(|name| match done.get(name.as_str()) {
                    Some(aggregated) => aggregated.rate_to_count(&self.size_from),
                    None => map.group(name)?.rate_to_count(&self.size_from),
                })
                .collect::<Result<Vec<_>>>()?;
            debug!(supergroup = supergroup_name, subgroups = subgroups.len(), "aggregating");

            let mut supergroup = map.group(supergroup_name)?.clone();
            let names = subgroups.first().map(Group::attributes).unwrap_or_default();
            for attr in names {
                if let Some(combined) = combine(supergroup_name, attr.name(), &subgroups)? {
                    supergroup = supergroup.add_attribute(combined)?;
                }
            }
            done.insert(supergroup_name.to_string(), supergroup.restore_rates(&self.size_from)?);
        }

        rebuild(map, done)
    }
}

/// `map` with the groups in `updated` swapped in, keeping group order.
fn rebuild(map: &GroupMap, mut updated: IndexMap<String, Group>) -> Result<GroupMap> {
    let groups = map
        .groups()
        .map(|g| updated.swap_remove(g.name()).unwrap_or_else(|| g.clone()))
        .collect();
    GroupMap::new(map.sub_to_super().clone(), Some(groups))
}

/// The supergroup attribute for `name`, or `None` when it is ignored.
/// Subgroups must already be mass-converted.
fn combine(supergroup: &str, name: &str, subgroups: &[Group]) -> Result<Option<Attribute>> {
    let attrs = subgroups
        .iter()
        .map(|g| g.attribute(name))
        .collect::<Result<Vec<_>>>()?;
    let first = attrs[0];

    if let Some(odd) = attrs.iter().find(|a| a.action() != first.action()) {
        return Err(ImputeError::Validation {
            attribute: name.to_string(),
            reason: format!(
                "subgroups of '{supergroup}' disagree on impute action ('{}' vs '{}')",
                first.action(),
                odd.action()
            ),
        });
    }

    match first.action() {
        ImputeAction::Ignore => Ok(None),
        ImputeAction::Copy => {
            if attrs.iter().any(|a| a != &first) {
                return Err(ImputeError::InconsistentCopyValue {
                    supergroup: supergroup.to_string(),
                    attribute: name.to_string(),
                });
            }
            Ok(Some(first.clone()))
        }
        ImputeAction::Impute => {
            let not_a_count = || ImputeError::Validation {
                attribute: name.to_string(),
                reason: "subgroup values must be counts before summing".into(),
            };
            let mut total = 0.0;
            let mut measurement = MeasurementType::Count;
            let mut origins = Vec::new();
            for attr in &attrs {
                let kind = attr.measurement().filter(|m| m.is_count_like()).ok_or_else(not_a_count)?;
                if kind == MeasurementType::CountFromRate {
                    measurement = MeasurementType::CountFromRate;
                }
                if let Some(origin) = attr.rate_origin() {
                    if !origins.contains(&origin) {
                        origins.push(origin);
                    }
                }
                total += attr.value().as_f64().ok_or_else(not_a_count)?;
            }
            let summed = Attribute::imputable(name, total, measurement)?;
            // Subgroups that started from different rate tags restore as plain rates.
            Ok(Some(match origins.as_slice() {
                [] => summed,
                [origin] => summed.converted_from(*origin),
                _ => summed.converted_from(MeasurementType::Rate),
            }))
        }
    }
}
