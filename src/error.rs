//! Error types shared across the query coordinator.
//!
//! Configuration mistakes (double prepare, bad custom fields, bad output
//! parameter references) fail fast and are never retried. Driver delegation
//! failures are wrapped with the identity of the thing being delegated
//! (result set, parameter) before they surface. Cancellation is not an
//! error and never appears here.

use thiserror::Error;

use crate::value::DataKind;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, QuarryError>;

/// Errors surfaced by query preparation, binding, and execution.
#[derive(Debug, Error)]
pub enum QuarryError {
    /// `prepare` was called on a query that already holds a statement,
    /// or on a query that has been closed.
    #[error("query has already been prepared")]
    AlreadyPrepared,

    /// An operation that requires a prepared statement was invoked before
    /// `prepare`.
    #[error("query has not been prepared")]
    NotPrepared,

    /// A custom field was declared with an empty name.
    #[error("custom field name must not be empty")]
    EmptyCustomFieldName,

    /// A custom field name was declared twice on the same query.
    #[error("custom field '{name}' is already declared")]
    DuplicateCustomField {
        /// The offending field name.
        name: String,
    },

    /// A parameter default value could not be coerced to its declared kind.
    #[error("cannot convert parameter value '{value}' to {target}")]
    ParameterConversion {
        /// Textual form of the offending value.
        value: String,
        /// The kind the value was supposed to become.
        target: DataKind,
    },

    /// Binding a parameter onto the driver statement failed, after any
    /// retry-by-position the binding was eligible for.
    #[error("failed to bind parameter {parameter}")]
    ParameterBind {
        /// Name or `#position` of the parameter.
        parameter: String,
        /// The underlying driver failure.
        #[source]
        source: Box<QuarryError>,
    },

    /// The driver could not hand back the addressed result set.
    #[error("failed to retrieve result set {result_set}")]
    ResultSetRetrieval {
        /// The result set that was being addressed (name, number, or
        /// "default").
        result_set: String,
        /// The underlying driver failure.
        #[source]
        source: Box<QuarryError>,
    },

    /// Result metadata was unavailable even after execution. The row shape
    /// is unknown, so the result cannot be iterated.
    #[error("result metadata is not available")]
    MetadataUnavailable,

    /// An output parameter was requested with a non-positive index.
    #[error("invalid output parameter index {index}")]
    InvalidOutputParameterIndex {
        /// The offending index.
        index: i64,
    },

    /// An output parameter index was past the last output-mode parameter.
    #[error("output parameter index {index} is out of bounds")]
    OutputParameterOutOfBounds {
        /// The offending index.
        index: i64,
    },

    /// An output parameter was requested by a name that does not belong to
    /// an output-mode parameter.
    #[error("'{name}' is not an output parameter")]
    InvalidOutputParameterName {
        /// The offending name.
        name: String,
    },

    /// A failure reported by the data-source driver itself.
    #[error("driver error: {message}")]
    Driver {
        /// The driver's own description of the failure.
        message: String,
    },
}

impl QuarryError {
    /// Builds a driver-side failure from a message.
    pub fn driver(message: impl Into<String>) -> Self {
        QuarryError::Driver {
            message: message.into(),
        }
    }
}
