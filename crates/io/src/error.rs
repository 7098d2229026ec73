use std::path::PathBuf;

use imputer_engine::ImputeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IoError {
    // -- config -------------------------------------------------------------
    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("config validation error: {0}")]
    ConfigValidation(String),

    // -- files --------------------------------------------------------------
    #[error("cannot read '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot write '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported record format for '{}' (expected .json or .csv)", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    // -- data ---------------------------------------------------------------
    /// A field that cannot be turned into a record value.
    #[error("{dataset} record {row}: key '{key}' {reason}")]
    BadValue {
        dataset: String,
        row: usize,
        key: String,
        reason: String,
    },

    #[error("{dataset} records have no key '{key}'")]
    MissingKey { dataset: String, key: String },

    /// Loop-over partitioning failures: duplicate rows or partitions present
    /// on one side only.
    #[error("loop-over: {0}")]
    LoopOver(String),

    #[error(transparent)]
    Impute(#[from] ImputeError),
}

pub type Result<T> = std::result::Result<T, IoError>;
