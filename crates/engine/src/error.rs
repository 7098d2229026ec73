use imputer_core::CoreError;
use thiserror::Error;

use crate::group::GroupType;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ImputeError {
    // -- structural ---------------------------------------------------------
    /// Orphan group, unknown name in the mapping, or non-1:1 dual membership.
    #[error("malformed hierarchy ({reason}): {names:?}")]
    MalformedHierarchy { reason: String, names: Vec<String> },

    #[error("group '{group}' already has an attribute named '{attribute}'")]
    DuplicateAttribute { group: String, attribute: String },

    #[error("malformed group '{group}': {reason}")]
    MalformedGroup { group: String, reason: String },

    #[error("no group named '{0}'")]
    UnknownGroup(String),

    // -- data availability --------------------------------------------------
    #[error("attribute '{attribute}' has no value for groups {missing:?}")]
    IncompleteData { attribute: String, missing: Vec<String> },

    #[error("group '{group}' matched {matches} records, expected exactly 1")]
    AmbiguousRow { group: String, matches: usize },

    #[error("group '{group}' has no attribute '{attribute}'")]
    MissingAttribute { group: String, attribute: String },

    #[error("group '{group}' has no {tier} filter keys")]
    MissingFilter { group: String, tier: GroupType },

    #[error("{tier}s do not all declare the same filter keys")]
    InconsistentFilters { tier: GroupType },

    #[error("records do not all share the same keys: {0}")]
    InconsistentRecordKeys(String),

    // -- arithmetic / semantic ----------------------------------------------
    #[error("invalid attribute '{attribute}': {reason}")]
    Validation { attribute: String, reason: String },

    #[error("group '{group}' has invalid size {size} in attribute '{attribute}'")]
    InvalidSize { group: String, attribute: String, size: f64 },

    #[error("cannot disaggregate proportion {proportion} of supergroup '{supergroup}' into '{subgroup}'")]
    InvalidProportion {
        supergroup: String,
        subgroup: String,
        proportion: f64,
    },

    #[error("subgroup sizes of '{supergroup}' sum to {subgroup_total}, supergroup size is {supergroup_size}")]
    SizeMismatch {
        supergroup: String,
        subgroup_total: f64,
        supergroup_size: f64,
    },

    #[error("subgroups of '{supergroup}' disagree on copied attribute '{attribute}'")]
    InconsistentCopyValue { supergroup: String, attribute: String },

    #[error("supergroup '{0}' has no subgroups")]
    NoSubgroups(String),

    #[error("attribute '{attribute}' of group '{group}' is not a range")]
    NotARange { group: String, attribute: String },

    /// Range coverage and age-label failures from `imputer-core`.
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl ImputeError {
    pub fn is_unparseable_age_range(&self) -> bool {
        matches!(self, Self::Core(e) if e.is_unparseable_age_range())
    }

    pub fn is_range_coverage(&self) -> bool {
        matches!(self, Self::Core(CoreError::RangeCoverage { .. }))
    }
}

pub type Result<T> = std::result::Result<T, ImputeError>;
