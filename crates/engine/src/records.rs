//! Flat records as exchanged with the collaborator layer, and the key-role
//! vocabulary used to turn record keys into attributes.

use indexmap::{IndexMap, IndexSet};

use crate::attribute::{ImputeAction, MeasurementType};
use crate::error::{ImputeError, Result};
use crate::value::Value;

/// One flat row. Key order is preserved from input to output.
pub type Record = IndexMap<String, Value>;

/// Keys shared by every record, in the first record's order.
///
/// An empty slice has no keys.
pub fn record_keys(records: &[Record]) -> Result<Vec<String>> {
    let Some(first) = records.first() else {
        return Ok(Vec::new());
    };
    for (i, record) in records.iter().enumerate().skip(1) {
        let same = record.len() == first.len() && first.keys().all(|k| record.contains_key(k));
        if !same {
            let theirs: Vec<&str> = record.keys().map(String::as_str).collect();
            let ours: Vec<&str> = first.keys().map(String::as_str).collect();
            return Err(ImputeError::InconsistentRecordKeys(format!(
                "record {i} has keys {theirs:?}, record 0 has {ours:?}"
            )));
        }
    }
    Ok(first.keys().cloned().collect())
}

/// How record keys become attributes.
///
/// Keys that are neither excluded nor classified as count, rate or copy
/// become `ignore` attributes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyRoles {
    pub exclude: IndexSet<String>,
    pub count: IndexSet<String>,
    pub rate: IndexSet<String>,
    pub copy: IndexSet<String>,
}

impl KeyRoles {
    pub fn with_exclude<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude.extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn with_count<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.count.extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn with_rate<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rate.extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn with_copy<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.copy.extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn is_excluded(&self, key: &str) -> bool {
        self.exclude.contains(key)
    }

    /// Impute action and measurement type for a (non-excluded) key.
    /// Count wins over rate, and both win over copy.
    pub fn classify(&self, key: &str) -> (ImputeAction, Option<MeasurementType>) {
        if self.count.contains(key) {
            (ImputeAction::Impute, Some(MeasurementType::Count))
        } else if self.rate.contains(key) {
            (ImputeAction::Impute, Some(MeasurementType::Rate))
        } else if self.copy.contains(key) {
            (ImputeAction::Copy, None)
        } else {
            (ImputeAction::Ignore, None)
        }
    }
}
