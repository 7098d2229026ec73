//! Building group maps from category listings or age-band labels.

use imputer_core::{assert_range_spanned_exactly, AgeParser, Range};
use indexmap::IndexMap;

use crate::attribute::ImputeAction;
use crate::error::{ImputeError, Result};
use crate::group::GroupType;
use crate::group_map::GroupMap;
use crate::value::Value;

/// Something that can produce a ready-to-populate [`GroupMap`]: pairing,
/// identity attributes and filters in place.
pub trait GroupMapper {
    fn construct_group_map(&self) -> Result<GroupMap>;
}

/// Subgroups given as explicit category combinations.
///
/// Each combination lists one category per variable; the last one is the
/// supergroup's category. `[["low", "child"], ["high", "child"],
/// ["low", "adult"]]` gives supergroups `child` and `adult` and three
/// subgroups.
#[derive(Debug, Clone, PartialEq)]
pub struct RaggedPairing {
    pub combinations: Vec<Vec<Value>>,
    /// Defaults to `variable_0`, `variable_1`, ...
    pub variable_names: Option<Vec<String>>,
}

impl RaggedPairing {
    pub fn new(combinations: Vec<Vec<Value>>) -> Self {
        Self {
            combinations,
            variable_names: None,
        }
    }

    pub fn with_variable_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.variable_names = Some(names.into_iter().map(Into::into).collect());
        self
    }

    fn width(&self) -> Result<usize> {
        let Some(first) = self.combinations.first() else {
            return Err(pairing_error("no category combinations given", Vec::new()));
        };
        let width = first.len();
        if width < 2 {
            return Err(pairing_error(
                "combinations need a subgroup and a supergroup category",
                vec![render(first)],
            ));
        }
        let ragged: Vec<String> = self
            .combinations
            .iter()
            .filter(|c| c.len() != width)
            .map(|c| render(c))
            .collect();
        if !ragged.is_empty() {
            return Err(pairing_error(
                &format!("combinations must all have {width} categories"),
                ragged,
            ));
        }
        Ok(width)
    }
}

/// `<supergroup>_<sub1>_<sub2>...`
fn subgroup_name(combination: &[Value]) -> String {
    let mut parts = Vec::with_capacity(combination.len());
    if let Some((sup, subs)) = combination.split_last() {
        parts.push(sup.to_string());
        parts.extend(subs.iter().map(Value::to_string));
    }
    parts.join("_")
}

fn render(combination: &[Value]) -> String {
    let parts: Vec<String> = combination.iter().map(Value::to_string).collect();
    format!("({})", parts.join(", "))
}

fn pairing_error(reason: &str, names: Vec<String>) -> ImputeError {
    ImputeError::MalformedHierarchy {
        reason: reason.to_string(),
        names,
    }
}

impl GroupMapper for RaggedPairing {
    fn construct_group_map(&self) -> Result<GroupMap> {
        let width = self.width()?;
        let variable_names = match &self.variable_names {
            Some(names) if names.len() != width => {
                return Err(pairing_error(
                    &format!("{width} variables per combination but {} names", names.len()),
                    names.clone(),
                ));
            }
            Some(names) => names.clone(),
            None => (0..width).map(|i| format!("variable_{i}")).collect(),
        };

        let mut sub_to_super = IndexMap::new();
        let mut supergroup_values = IndexMap::new();
        let mut subgroup_values: Vec<IndexMap<String, Value>> = vec![IndexMap::new(); width];
        for combination in &self.combinations {
            let sup_value = &combination[width - 1];
            let sup = sup_value.to_string();
            let sub = subgroup_name(combination);
            supergroup_values.insert(sup.clone(), sup_value.clone());
            for (values, category) in subgroup_values.iter_mut().zip(combination) {
                values.insert(sub.clone(), category.clone());
            }
            sub_to_super.insert(sub, sup);
        }

        let super_var = &variable_names[width - 1];
        let mut map = GroupMap::new(sub_to_super, None)?.add_attribute(
            GroupType::Supergroup,
            super_var,
            &supergroup_values,
            ImputeAction::Ignore,
            None,
        )?;
        for (name, values) in variable_names.iter().zip(&subgroup_values) {
            map = map.add_attribute(GroupType::Subgroup, name, values, ImputeAction::Ignore, None)?;
        }

        map.add_filters(GroupType::Supergroup, std::slice::from_ref(super_var))?
            .add_filters(GroupType::Subgroup, &variable_names)
    }
}

/// Every subgroup category in every supergroup.
///
/// For age supergroups `0-17 years`, `18+ years` and risk levels `low`,
/// `high`, this makes the four subgroups `0-17 years_low`, ...
#[derive(Debug, Clone, PartialEq)]
pub struct CartesianPairing {
    pub supergroup_categories: Vec<Value>,
    /// One category list per subgrouping variable.
    pub subgroup_categories: Vec<Vec<Value>>,
    pub supergroup_variable: String,
    /// Defaults to `subgroup_variable_0`, ...
    pub subgroup_variables: Option<Vec<String>>,
}

impl CartesianPairing {
    pub fn new(supergroup_categories: Vec<Value>, subgroup_categories: Vec<Vec<Value>>) -> Self {
        Self {
            supergroup_categories,
            subgroup_categories,
            supergroup_variable: "supergroup_variable".to_string(),
            subgroup_variables: None,
        }
    }

    pub fn with_variables<I, S>(mut self, supergroup_variable: impl Into<String>, subgroup_variables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.supergroup_variable = supergroup_variable.into();
        self.subgroup_variables = Some(subgroup_variables.into_iter().map(Into::into).collect());
        self
    }

    /// The product in odometer order: the last variable (the supergroup)
    /// varies fastest.
    fn combinations(&self) -> Vec<Vec<Value>> {
        self.subgroup_categories
            .iter()
            .chain(std::iter::once(&self.supergroup_categories))
            .fold(vec![Vec::new()], |acc, categories| {
                acc.iter()
                    .flat_map(|prefix| {
                        categories.iter().map(move |c| {
                            let mut next = prefix.clone();
                            next.push(c.clone());
                            next
                        })
                    })
                    .collect()
            })
    }
}

impl GroupMapper for CartesianPairing {
    fn construct_group_map(&self) -> Result<GroupMap> {
        let subgroup_variables = match &self.subgroup_variables {
            Some(names) if names.len() != self.subgroup_categories.len() => {
                return Err(pairing_error(
                    &format!(
                        "{} subgrouping variables but {} names",
                        self.subgroup_categories.len(),
                        names.len()
                    ),
                    names.clone(),
                ));
            }
            Some(names) => names.clone(),
            None => (0..self.subgroup_categories.len())
                .map(|i| format!("subgroup_variable_{i}"))
                .collect(),
        };
        let mut variable_names = subgroup_variables;
        variable_names.push(self.supergroup_variable.clone());

        RaggedPairing::new(self.combinations())
            .with_variable_names(variable_names)
            .construct_group_map()
    }
}

/// Age-band labels for both tiers, matched by range containment.
#[derive(Debug, Clone, PartialEq)]
pub struct AgeGroupMapper {
    pub parser: AgeParser,
    pub supergroups: Vec<String>,
    pub subgroups: Vec<String>,
    /// Record key holding the label; also the name of the range attribute.
    pub variable_name: String,
}

impl AgeGroupMapper {
    pub fn new(parser: AgeParser, supergroups: Vec<String>, subgroups: Vec<String>) -> Self {
        Self {
            parser,
            supergroups,
            subgroups,
            variable_name: "age".to_string(),
        }
    }

    pub fn with_variable_name(mut self, name: impl Into<String>) -> Self {
        self.variable_name = name.into();
        self
    }

    fn parse_all(&self, labels: &[String]) -> Result<IndexMap<String, Range>> {
        labels
            .iter()
            .map(|label| Ok((label.clone(), self.parser.parse(label)?)))
            .collect()
    }
}

impl GroupMapper for AgeGroupMapper {
    fn construct_group_map(&self) -> Result<GroupMap> {
        let super_ranges = self.parse_all(&self.supergroups)?;
        let sub_ranges = self.parse_all(&self.subgroups)?;

        let mut sub_to_super = IndexMap::new();
        for (sub, sub_range) in &sub_ranges {
            let containing: Vec<String> = super_ranges
                .iter()
                .filter(|(_, sup_range)| sup_range.contains(sub_range))
                .map(|(name, _)| name.clone())
                .collect();
            match containing.as_slice() {
                [sup] => {
                    sub_to_super.insert(sub.clone(), sup.clone());
                }
                [] => {
                    return Err(pairing_error("subgroup has no containing supergroup", vec![sub.clone()]));
                }
                _ => {
                    let mut names = vec![sub.clone()];
                    names.extend(containing);
                    return Err(pairing_error("subgroup is contained by several supergroups", names));
                }
            }
        }

        let childless: Vec<&String> = super_ranges
            .keys()
            .filter(|sup| !sub_to_super.values().any(|s| s == *sup))
            .collect();
        if let Some(sup) = childless.first() {
            return Err(ImputeError::NoSubgroups(sup.to_string()));
        }

        let labelled = |ranges: &IndexMap<String, Range>| -> IndexMap<String, (Value, Value)> {
            ranges
                .iter()
                .map(|(label, range)| (label.clone(), (Value::Range(*range), Value::from(label.as_str()))))
                .collect()
        };
        let map = GroupMap::new(sub_to_super, None)?
            .add_labelled_attribute(GroupType::Subgroup, &self.variable_name, &labelled(&sub_ranges))?
            .add_labelled_attribute(GroupType::Supergroup, &self.variable_name, &labelled(&super_ranges))?;

        for sup in map.supergroup_names() {
            let spans: Vec<Range> = map
                .subgroups_of(sup)?
                .iter()
                .map(|sub| sub_ranges[sub.as_str()])
                .collect();
            assert_range_spanned_exactly(&super_ranges[sup], &spans)?;
        }

        // The supergroups themselves must tile one contiguous range.
        let mut all: Vec<Range> = super_ranges.values().copied().collect();
        all.sort_by(|a, b| a.lower().total_cmp(&b.lower()));
        if let (Some(first), Some(last)) = (all.first(), all.last()) {
            let overall = Range::new(first.lower(), last.upper())?;
            assert_range_spanned_exactly(&overall, &all)?;
        }

        let filter = std::slice::from_ref(&self.variable_name);
        map.add_filters(GroupType::Supergroup, filter)?
            .add_filters(GroupType::Subgroup, filter)
    }
}
