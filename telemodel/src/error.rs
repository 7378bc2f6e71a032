//! Error types for the telemodel adapter.

use thiserror::Error;

/// The main error type for all telemodel operations.
///
/// Each variant corresponds to one class of failure: setup mistakes the caller
/// must fix, schema definitions that cannot be classified, records that cannot
/// be turned into points, read results that cannot be turned into rows, and
/// failures reported by an external sink.
#[derive(Error, Debug)]
pub enum Error {
    /// The adapter or its settings are misconfigured.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The schema definition is invalid or ambiguous.
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// A record could not be converted to a point (write path).
    #[error("write error: {0}")]
    Write(#[from] WriteError),

    /// A read result could not be parsed or reconstructed (read path).
    #[error("query error: {0}")]
    Query(#[from] QueryError),

    /// An external write, read or table sink failed.
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),
}

/// Errors caused by adapter setup or settings.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Neither the builder nor the schema supplied a metric name.
    #[error("a metric name is required")]
    MissingMetricName,

    /// No write sink was supplied and none could be built from settings.
    #[error("a write sink is required")]
    MissingWriteSink,

    /// A read operation was requested on a write-only adapter.
    #[error("{operation} requires a read sink")]
    MissingReadSink {
        /// The operation that needed the read sink.
        operation: &'static str,
    },

    /// A setting could not be parsed.
    #[error("invalid setting {name}={value}: {reason}")]
    InvalidSetting {
        /// The setting name.
        name: String,
        /// The raw value that was rejected.
        value: String,
        /// Why the value is invalid.
        reason: String,
    },

    /// The settings file could not be read.
    #[error("failed to read settings from '{}': {source}", path.display())]
    SettingsLoad {
        /// The settings file path.
        path: std::path::PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The settings file is not valid JSON for [`Settings`](crate::settings::Settings).
    #[error("failed to parse settings from '{}': {source}", path.display())]
    SettingsParse {
        /// The settings file path.
        path: std::path::PathBuf,
        /// The underlying JSON parsing error.
        #[source]
        source: serde_json::Error,
    },
}

/// Errors found while validating or classifying a schema.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SchemaError {
    /// More than one field is marked as the timestamp.
    #[error("fields '{first}' and '{second}' are both marked as timestamp")]
    MultipleTimestampFields {
        /// The first timestamp field in declaration order.
        first: String,
        /// The next timestamp field in declaration order.
        second: String,
    },

    /// A field is marked as both a tag and the timestamp.
    #[error("field '{field}' cannot be both a tag and the timestamp")]
    TagAndTimestamp {
        /// The offending field.
        field: String,
    },

    /// Two fields share a name.
    #[error("field '{field}' is declared more than once")]
    DuplicateField {
        /// The duplicated field name.
        field: String,
    },

    /// A field has an empty name.
    #[error("field names must not be empty")]
    EmptyFieldName,

    /// The timestamp scale is zero.
    #[error("timestamp scale must be > 0")]
    InvalidTimestampScale,
}

/// Errors that can occur when turning a record into a point.
#[derive(Error, Debug)]
pub enum WriteError {
    /// The record could not be serialized.
    #[error("failed to serialize record: {source}")]
    Serialize {
        /// The underlying serialization error.
        #[source]
        source: serde_json::Error,
    },

    /// The record did not serialize to a key/value structure.
    #[error("record serialized to {kind}, expected an object")]
    NotAnObject {
        /// The JSON kind the record produced.
        kind: &'static str,
    },

    /// A tag field has no value and no declared default.
    #[error("tag '{tag}' has no value and no default")]
    MissingTag {
        /// The tag field name.
        tag: String,
    },

    /// The timestamp field has no value and no declared default.
    #[error("timestamp field '{field}' has no value and no default")]
    MissingTimestamp {
        /// The timestamp field name.
        field: String,
    },

    /// The timestamp field holds something other than a number.
    #[error("timestamp field '{field}' holds non-numeric value {value}")]
    InvalidTimestamp {
        /// The timestamp field name.
        field: String,
        /// The offending value, as JSON text.
        value: String,
    },

    /// Scaling the timestamp to nanoseconds overflowed.
    #[error("timestamp field '{field}' value {value} overflows when scaled by {scale}")]
    TimestampOverflow {
        /// The timestamp field name.
        field: String,
        /// The native timestamp value, as JSON text.
        value: String,
        /// The scale that was applied.
        scale: u64,
    },
}

/// Errors that can occur on the read path.
#[derive(Error, Debug)]
pub enum QueryError {
    /// The store answered with an error message instead of results.
    #[error("store returned an error: {message}")]
    Response {
        /// The message reported by the store.
        message: String,
    },

    /// The response body is not a valid result set.
    #[error("failed to parse result set: {source}")]
    Parse {
        /// The underlying JSON parsing error.
        #[source]
        source: serde_json::Error,
    },

    /// A series in the result set is inconsistent.
    #[error("malformed series '{series}': {reason}")]
    MalformedSeries {
        /// The series (measurement) name.
        series: String,
        /// Description of the inconsistency.
        reason: String,
    },

    /// A time cell could not be converted to epoch nanoseconds.
    #[error("invalid time value {value}: {reason}")]
    InvalidTime {
        /// The offending cell, as JSON text.
        value: String,
        /// Why it could not be converted.
        reason: String,
    },

    /// The requested time window cannot be represented.
    #[error("invalid time window: {reason}")]
    InvalidWindow {
        /// Description of the problem.
        reason: String,
    },

    /// A row could not be turned back into a record.
    #[error("failed to reconstruct record: {source}")]
    Reconstruct {
        /// The underlying deserialization error.
        #[source]
        source: serde_json::Error,
    },
}

/// Errors reported by external sinks.
///
/// Sink implementations return these from their trait methods and the adapter
/// propagates them untouched inside [`Error::Sink`].
#[derive(Error, Debug)]
pub enum SinkError {
    /// The sink's underlying writer or connection failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The sink refused the request.
    #[error("rejected: {reason}")]
    Rejected {
        /// Why the sink refused it.
        reason: String,
    },

    /// Any other failure raised by a sink implementation.
    #[error("{source}")]
    Other {
        /// The sink's own error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl SinkError {
    /// Wraps an arbitrary sink-specific error.
    pub fn other(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Other {
            source: source.into(),
        }
    }

    /// Builds a [`SinkError::Rejected`] with the given reason.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }
}

/// Type alias for `Result<T, telemodel::Error>`.
pub type Result<T> = std::result::Result<T, Error>;
