use std::fmt;

use serde::{Deserialize, Serialize};

use crate::attribute::{Attribute, ImputeAction};
use crate::error::{ImputeError, Result};
use crate::records::Record;

/// Which side of the hierarchy an operation addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupType {
    Supergroup,
    Subgroup,
}

impl fmt::Display for GroupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Supergroup => write!(f, "supergroup"),
            Self::Subgroup => write!(f, "subgroup"),
        }
    }
}

/// A named bag of uniquely-named attributes.
///
/// Groups are never modified in place: every operation that changes a group
/// returns a new one.
#[derive(Debug, Clone)]
pub struct Group {
    name: String,
    attributes: Vec<Attribute>,
    /// Record keys that identify this group's row when it is a supergroup.
    supergroup_filter: Option<Vec<String>>,
    /// Same, when it is a subgroup.
    subgroup_filter: Option<Vec<String>>,
}

impl Group {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            supergroup_filter: None,
            subgroup_filter: None,
        }
    }

    pub fn with_attributes(name: impl Into<String>, attributes: Vec<Attribute>) -> Result<Self> {
        let mut group = Self::new(name);
        for attr in attributes {
            group = group.add_attribute(attr)?;
        }
        Ok(group)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn find_attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name() == name)
    }

    /// Look up an attribute by name.
    pub fn attribute(&self, name: &str) -> Result<&Attribute> {
        let mut matched = self.attributes.iter().filter(|a| a.name() == name);
        let first = matched.next().ok_or_else(|| ImputeError::MissingAttribute {
            group: self.name.clone(),
            attribute: name.to_string(),
        })?;
        if matched.next().is_some() {
            return Err(ImputeError::MalformedGroup {
                group: self.name.clone(),
                reason: format!("multiple attributes named '{name}'"),
            });
        }
        Ok(first)
    }

    /// A copy of this group with `attr` appended.
    pub fn add_attribute(&self, attr: Attribute) -> Result<Group> {
        if self.find_attribute(attr.name()).is_some() {
            return Err(ImputeError::DuplicateAttribute {
                group: self.name.clone(),
                attribute: attr.name().to_string(),
            });
        }
        let mut attributes = self.attributes.clone();
        attributes.push(attr);
        Ok(self.with_attribute_list(attributes))
    }

    pub fn filters(&self, tier: GroupType) -> Option<&[String]> {
        match tier {
            GroupType::Supergroup => self.supergroup_filter.as_deref(),
            GroupType::Subgroup => self.subgroup_filter.as_deref(),
        }
    }

    /// A copy of this group that identifies its `tier` row by `filters`.
    /// Replacing existing filters requires `overwrite`.
    pub fn with_filters(&self, tier: GroupType, filters: &[String], overwrite: bool) -> Result<Group> {
        if let Some(existing) = self.filters(tier) {
            if !overwrite {
                return Err(ImputeError::MalformedGroup {
                    group: self.name.clone(),
                    reason: format!("already has {tier} filters {existing:?}"),
                });
            }
        }
        let mut group = self.clone();
        let filters = Some(filters.to_vec());
        match tier {
            GroupType::Supergroup => group.supergroup_filter = filters,
            GroupType::Subgroup => group.subgroup_filter = filters,
        }
        Ok(group)
    }

    /// Positive numeric size read from attribute `size_from`.
    pub fn size(&self, size_from: &str) -> Result<f64> {
        let attr = self.attribute(size_from)?;
        let size = attr.value().as_f64().ok_or_else(|| ImputeError::Validation {
            attribute: size_from.to_string(),
            reason: format!("size of group '{}' is not numeric: '{}'", self.name, attr.value()),
        })?;
        if !(size > 0.0 && size.is_finite()) {
            return Err(ImputeError::InvalidSize {
                group: self.name.clone(),
                attribute: size_from.to_string(),
                size,
            });
        }
        Ok(size)
    }

    /// Replace every rate-like imputed attribute by its count equivalent,
    /// using this group's own size.
    pub fn rate_to_count(&self, size_from: &str) -> Result<Group> {
        self.convert_where(size_from, Attribute::is_rate_like, Attribute::to_count)
    }

    /// Undo [`Group::rate_to_count`]: every count converted from a rate goes
    /// back to the rate it came from. Counts supplied as counts stay counts.
    pub fn restore_rates(&self, size_from: &str) -> Result<Group> {
        self.convert_where(
            size_from,
            |a| a.is_imputed() && a.rate_origin().is_some(),
            Attribute::to_rate,
        )
    }

    fn convert_where(
        &self,
        size_from: &str,
        select: impl Fn(&Attribute) -> bool,
        convert: impl Fn(&Attribute, f64) -> Attribute,
    ) -> Result<Group> {
        // Groups without anything to convert need not carry a size at all.
        if !self.attributes.iter().any(&select) {
            return Ok(self.clone());
        }
        let size = self.size(size_from)?;
        let attributes = self
            .attributes
            .iter()
            .map(|a| if select(a) { convert(a, size) } else { a.clone() })
            .collect();
        Ok(self.with_attribute_list(attributes))
    }

    /// Fill in `subgroup` from this supergroup.
    ///
    /// The subgroup keeps its own attributes. Copied attributes are taken
    /// verbatim, imputed ones are scaled by `prop` after this group has been
    /// mass-converted, ignored ones are left behind. Rates are finally
    /// re-expressed against the subgroup's own size.
    pub fn disaggregate_one_subgroup(
        &self,
        subgroup: &Group,
        prop: f64,
        size_from: &str,
        subgroup_size_from: &str,
    ) -> Result<Group> {
        if !(0.0..=1.0).contains(&prop) {
            return Err(ImputeError::InvalidProportion {
                supergroup: self.name.clone(),
                subgroup: subgroup.name.clone(),
                proportion: prop,
            });
        }

        let mut out = subgroup.clone();
        for attr in self.rate_to_count(size_from)?.attributes {
            match attr.action() {
                ImputeAction::Copy => out = out.add_attribute(attr)?,
                ImputeAction::Impute => out = out.add_attribute(&attr * prop)?,
                ImputeAction::Ignore => {}
            }
        }
        out.restore_rates(subgroup_size_from)
    }

    /// Does `record` hold this group's row on the given tier?
    pub fn matches_record(&self, record: &Record, tier: GroupType) -> Result<bool> {
        let filters = self.filters(tier).ok_or_else(|| ImputeError::MissingFilter {
            group: self.name.clone(),
            tier,
        })?;
        for key in filters {
            let expected = self.attribute(key)?.record_value();
            if record.get(key) != Some(expected) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn to_record(&self) -> Record {
        self.attributes
            .iter()
            .map(|a| (a.name().to_string(), a.record_value().clone()))
            .collect()
    }

    fn with_attribute_list(&self, attributes: Vec<Attribute>) -> Group {
        Group {
            name: self.name.clone(),
            attributes,
            supergroup_filter: self.supergroup_filter.clone(),
            subgroup_filter: self.subgroup_filter.clone(),
        }
    }
}

/// Attribute order is not significant.
impl PartialEq for Group {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.attributes.len() == other.attributes.len()
            && self
                .attributes
                .iter()
                .all(|a| other.find_attribute(a.name()) == Some(a))
            && self.supergroup_filter == other.supergroup_filter
            && self.subgroup_filter == other.subgroup_filter
    }
}
