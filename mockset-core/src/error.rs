//! Error types and result types for record set and query emulation.
//!
//! All failures in this crate are authoring mistakes in test code rather than transient faults,
//! so every error surfaces immediately to the caller and nothing is retried.
//! Use [`MocksetResult<T>`] as the return type for fallible operations.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors raised by record sets, query execution and mock preparation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MocksetError {
    /// The identity key of a record type could not be determined, or a context member cannot be
    /// installed the way it is declared.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// The operation is not valid for the current state or arguments, such as a key arity
    /// mismatch in `find` or `first` over an empty sequence.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
    /// A composed query could not be resolved to something executable.
    #[error("Internal error: {0}")]
    Internal(String),
    /// Conversion between a record and its BSON or JSON view failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// A specialized `Result` type for mockset operations.
pub type MocksetResult<T> = Result<T, MocksetError>;

impl MocksetError {
    /// Raised by `first`, `single`, `last` and the non-summing aggregates over an empty sequence.
    pub fn no_elements() -> Self {
        MocksetError::InvalidOperation("Sequence contains no elements".to_string())
    }

    /// Raised by `single` and `single_or_default` when more than one element matches.
    pub fn more_than_one_element() -> Self {
        MocksetError::InvalidOperation("Sequence contains more than one element".to_string())
    }
}

impl From<BsonError> for MocksetError {
    fn from(err: BsonError) -> Self {
        MocksetError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for MocksetError {
    fn from(err: SerdeJsonError) -> Self {
        MocksetError::Serialization(err.to_string())
    }
}
