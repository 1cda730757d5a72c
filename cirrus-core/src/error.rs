//! Error types for cirrus operations

use std::fmt;

use thiserror::Error;

/// Status codes reported by the remote datastore service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteCode {
    Cancelled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    Internal,
    Unavailable,
}

impl fmt::Display for RemoteCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A failed remote call, carried verbatim to the caller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{method} failed with {code}: {message}")]
pub struct RemoteError {
    pub method: String,
    pub code: RemoteCode,
    pub message: String,
}

impl RemoteError {
    pub fn new(method: impl Into<String>, code: RemoteCode, message: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            code,
            message: message.into(),
        }
    }
}

/// Cache backend errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache backend {backend} failed: {reason}")]
    Backend { backend: String, reason: String },

    #[error("Cache lock poisoned")]
    LockPoisoned,

    #[error("Cache value serialization failed: {reason}")]
    Serialization { reason: String },

    #[error("Cache I/O error: {reason}")]
    Io { reason: String },
}

impl CacheError {
    pub fn backend(backend: impl Into<String>, reason: impl ToString) -> Self {
        Self::Backend {
            backend: backend.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<std::io::Error> for CacheError {
    fn from(e: std::io::Error) -> Self {
        Self::Io {
            reason: e.to_string(),
        }
    }
}

/// The remote service returned data that contradicts an earlier answer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConsistencyError {
    #[error("Lookup returned {found} entities for {requested} keys")]
    LookupCountMismatch { requested: usize, found: usize },

    #[error("Lookup did not return an entity for key {key}")]
    MissingEntity { key: String },

    #[error("Query result carried no entity key")]
    MissingKey,
}

/// A message did not match the method it was sent or received under.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Request for {method} is not a {expected} request")]
    UnexpectedRequest {
        method: String,
        expected: &'static str,
    },

    #[error("Response for {method} is not a {expected} response")]
    UnexpectedResponse {
        method: String,
        expected: &'static str,
    },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Cache backend not enabled in this build: {backend}")]
    BackendNotEnabled { backend: String },
}

/// Master error type for all cirrus errors.
#[derive(Debug, Clone, Error)]
pub enum CirrusError {
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// The mutation was committed, but its cache entries could not be removed.
    #[error("Commit applied but cache invalidation failed, cached data may be stale: {0}")]
    CacheInvalidation(CacheError),

    #[error("Consistency error: {0}")]
    Consistency(#[from] ConsistencyError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Call cancelled")]
    Cancelled,

    #[error("Call deadline exceeded")]
    DeadlineExceeded,
}

impl CirrusError {
    /// Whether the remote write behind this error is known to be durable.
    pub fn write_applied(&self) -> bool {
        matches!(self, Self::CacheInvalidation(_))
    }

    /// The remote status, if this error came from the remote service.
    pub fn remote_code(&self) -> Option<RemoteCode> {
        match self {
            Self::Remote(e) => Some(e.code),
            _ => None,
        }
    }
}

/// Result type alias for cirrus operations.
pub type CirrusResult<T> = Result<T, CirrusError>;

// =============================================================================
// TESTS
// =============================================================================
