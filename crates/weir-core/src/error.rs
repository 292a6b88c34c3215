//! Core error types.

use thiserror::Error;

/// Core engine errors.
///
/// Errors raised while a stream is being produced are converted to
/// [`ErrorItem`] events and delivered in-band; errors returned from
/// compile-time APIs (`Plan::compile`, `Module::redefine`, `Graph::query`)
/// indicate contract violations and never reach the stream channel.
#[derive(Debug, Error)]
pub enum Error {
    /// A required parameter was not supplied at execution time.
    #[error("missing parameter: {0}")]
    MissingParameter(String),

    /// No mount point matched the query tuple.
    #[error("no table found for query: {0}")]
    NoTableFound(String),

    /// A provider id did not resolve to a registered provider.
    #[error("provider not found: {0}")]
    ProviderNotFound(String),

    /// A unique constraint rejected a put.
    #[error("unique constraint violation on '{attr}' in table '{table}'")]
    UniqueViolation { table: String, attr: String },

    /// A callback asked for an attribute value that isn't present.
    #[error("no value for attribute: {0}")]
    MissingValue(String),

    /// The query is structurally invalid (e.g. an empty tuple).
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// A value was used in a way its variant forbids (e.g. unwrapping
    /// an abstract placeholder).
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The stream termination protocol was violated.
    #[error("stream protocol violation: {0}")]
    ProtocolViolation(String),

    /// Cooperative cancellation signal raised by a receiver. Not a real
    /// error: producers catch it and terminate with `done`.
    #[error("backpressure stop")]
    BackpressureStop,

    /// A mount point spec declared the same attribute twice.
    #[error("duplicate attribute: {0}")]
    DuplicateAttr(String),

    /// A verb's schema-only dry run suspended instead of completing
    /// synchronously. Fatal at plan compile time.
    #[error("schema-only execution didn't finish synchronously (verb={0})")]
    DryRunSuspended(String),

    /// Plain-data conversion failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A native callback failed.
    #[error("callback error: {0}")]
    Callback(String),

    /// Invalid data shape (bad filter, unknown attribute, ...).
    #[error("invalid data: {0}")]
    InvalidData(String),
}

impl Error {
    /// Whether this is the cooperative cancellation signal.
    pub fn is_backpressure_stop(&self) -> bool {
        matches!(self, Error::BackpressureStop)
    }
}

/// Classification of errors that travel through streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A required parameter was unfilled at execution time.
    MissingParameter,
    /// The matcher produced no result for a `get`.
    NoTableFound,
    /// A provider id did not resolve.
    ProviderNotFound,
    /// A unique constraint rejected a write.
    UniqueViolation,
    /// More than one mount point tied for best match (soft, warning only).
    AmbiguousMatch,
    /// A callback failed; the original error is wrapped in the message.
    Exception,
}

impl ErrorKind {
    /// Stable lowercase name, used in logs and plain-data forms.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::MissingParameter => "missing_parameter",
            ErrorKind::NoTableFound => "no_table_found",
            ErrorKind::ProviderNotFound => "provider_not_found",
            ErrorKind::UniqueViolation => "unique_violation",
            ErrorKind::AmbiguousMatch => "ambiguous_match",
            ErrorKind::Exception => "exception",
        }
    }
}

/// An error delivered in-band on a stream.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorItem {
    /// What went wrong.
    pub kind: ErrorKind,
    /// Human-readable detail.
    pub message: String,
    /// Canonical string of the query step that produced the error.
    pub from_query: Option<String>,
}

impl ErrorItem {
    /// Create an error item with no query context.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            from_query: None,
        }
    }

    /// Attach the originating query string.
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.from_query = Some(query.into());
        self
    }

    /// Wrap an engine error for stream delivery.
    pub fn from_error(err: &Error, from_query: Option<String>) -> Self {
        let kind = match err {
            Error::MissingParameter(_) => ErrorKind::MissingParameter,
            Error::NoTableFound(_) => ErrorKind::NoTableFound,
            Error::ProviderNotFound(_) => ErrorKind::ProviderNotFound,
            Error::UniqueViolation { .. } => ErrorKind::UniqueViolation,
            _ => ErrorKind::Exception,
        };

        Self {
            kind,
            message: err.to_string(),
            from_query,
        }
    }
}
