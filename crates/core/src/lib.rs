//! `imputer-core`: numeric intervals and the labels that produce them.
//!
//! No I/O. Everything here is a value type or a pure function.

pub mod age;
pub mod error;
pub mod range;

pub use age::{AgeParser, DEFAULT_AGE_MAX};
pub use error::CoreError;
pub use range::{assert_range_spanned_exactly, Range};
