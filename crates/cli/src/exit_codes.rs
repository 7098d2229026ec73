//! CLI Exit Code Registry
//!
//! The single source of truth for `subimpute` exit codes. Scripts rely on
//! them, so codes are never renumbered.
//!
//! | Code | Meaning                                                   |
//! |------|-----------------------------------------------------------|
//! | 0    | Success                                                   |
//! | 1    | General error (unspecified)                               |
//! | 2    | Usage error (bad arguments)                               |
//! | 3    | Config file cannot be parsed or fails validation          |
//! | 4    | Record file cannot be read, written, or decoded           |
//! | 5    | Record contents unusable (missing keys, bad cells, dupes) |
//! | 6    | Group hierarchy invalid (pairing, age bands, coverage)    |
//! | 7    | Imputation failed (sizes, proportions, copied values)     |

use imputer_engine::ImputeError;
use imputer_io::IoError;

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments.
pub const EXIT_USAGE: u8 = 2;

/// Config parse or validation failure.
pub const EXIT_CONFIG: u8 = 3;

/// File I/O or decoding failure.
pub const EXIT_IO: u8 = 4;

/// Records present but unusable.
pub const EXIT_DATA: u8 = 5;

/// Malformed hierarchy, unparseable age label, or incomplete range coverage.
pub const EXIT_HIERARCHY: u8 = 6;

/// Arithmetic or consistency failure while imputing.
pub const EXIT_IMPUTE: u8 = 7;

/// Map an `IoError` to its exit code.
pub fn io_exit_code(err: &IoError) -> u8 {
    match err {
        IoError::ConfigParse(_) | IoError::ConfigValidation(_) => EXIT_CONFIG,
        IoError::Read { .. }
        | IoError::Write { .. }
        | IoError::UnsupportedFormat(_)
        | IoError::Json(_)
        | IoError::Csv(_) => EXIT_IO,
        IoError::BadValue { .. } | IoError::MissingKey { .. } | IoError::LoopOver(_) => EXIT_DATA,
        IoError::Impute(e) => impute_exit_code(e),
    }
}

/// Map an `ImputeError` to its exit code.
pub fn impute_exit_code(err: &ImputeError) -> u8 {
    match err {
        ImputeError::MalformedHierarchy { .. }
        | ImputeError::UnknownGroup(_)
        | ImputeError::NoSubgroups(_)
        | ImputeError::Core(_) => EXIT_HIERARCHY,
        ImputeError::IncompleteData { .. }
        | ImputeError::AmbiguousRow { .. }
        | ImputeError::MissingAttribute { .. }
        | ImputeError::MissingFilter { .. }
        | ImputeError::InconsistentFilters { .. }
        | ImputeError::InconsistentRecordKeys(_)
        | ImputeError::DuplicateAttribute { .. }
        | ImputeError::MalformedGroup { .. }
        | ImputeError::NotARange { .. } => EXIT_DATA,
        ImputeError::Validation { .. }
        | ImputeError::InvalidSize { .. }
        | ImputeError::InvalidProportion { .. }
        | ImputeError::SizeMismatch { .. }
        | ImputeError::InconsistentCopyValue { .. } => EXIT_IMPUTE,
    }
}

/// A remedy worth printing under the error, when one is obvious.
pub fn io_hint(err: &IoError) -> Option<&'static str> {
    match err {
        IoError::Impute(ImputeError::SizeMismatch { .. }) => {
            Some("set normalize = true to rescale subgroup sizes, or raise rel_tol")
        }
        IoError::Impute(ImputeError::AmbiguousRow { .. }) => {
            Some("each group needs exactly one record; add the distinguishing key to loop_over")
        }
        IoError::Impute(e) if e.is_unparseable_age_range() => {
            Some("try `subimpute parse-age <label>` to see which labels are understood")
        }
        IoError::LoopOver(_) => Some("both record sets need the same loop_over combinations, one row per group each"),
        IoError::UnsupportedFormat(_) => Some("use a .json or .csv file"),
        _ => None,
    }
}
