//! `imputer-engine`: groups, group maps and the apportionment engine.
//!
//! Records come in already loaded; group maps (or records) come out. Every
//! transform returns a new structure, so independent maps can be processed
//! independently.

pub mod attribute;
pub mod error;
pub mod group;
pub mod group_map;
pub mod imputer;
pub mod mapping;
pub mod proportion;
pub mod records;
pub mod value;

pub use attribute::{Attribute, ImputeAction, MeasurementType};
pub use error::{ImputeError, Result};
pub use group::{Group, GroupType};
pub use group_map::GroupMap;
pub use imputer::{Aggregator, Disaggregator, DEFAULT_SIZE_FROM};
pub use mapping::{AgeGroupMapper, CartesianPairing, GroupMapper, RaggedPairing};
pub use proportion::{CategoricalWeights, ContinuousWeights, ProportionCalculator, DEFAULT_REL_TOL};
pub use records::{record_keys, KeyRoles, Record};
pub use value::Value;
