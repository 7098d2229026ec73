//! `imputer-io`: run configuration, record files, and the driver that
//! imputes whole record sets partition by partition.

pub mod config;
pub mod driver;
pub mod error;
pub mod records;

pub use config::{Direction, FilesConfig, Grouping, RunConfig};
pub use driver::{aggregate, create_group_map, disaggregate, impute, run, RunInputs};
pub use error::{IoError, Result};
pub use records::{read_records, write_records, write_records_to, RecordFormat};
