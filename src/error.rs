//! Error types for the GitHub organization provider
//!
//! Every operation in the reconcile path returns a classified [`Error`]. The
//! controller's error policy reads [`Error::class`] to decide how the
//! resource is requeued; nothing in this crate retries in place.

use std::time::Duration;

use thiserror::Error;

use crate::github::ApiError;

/// Default context value when no specific resource is known
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Failure categories the external scheduler acts on
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// Credentials missing, invalid or empty
    Auth,
    /// Network failure, timeout, rate limit or server-side error
    Transient,
    /// Validation rejection or malformed reference; needs a spec change
    Permanent,
    /// Optimistic-concurrency mismatch; restart from a fresh read
    Conflict,
}

/// Main error type for provider operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error other than a version conflict
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        source: kube::Error,
    },

    /// Credential resolution failed before any remote call
    #[error("auth error for {resource}: {message}")]
    Auth {
        /// Resource whose credentials could not be resolved
        resource: String,
        /// Description of what's missing
        message: String,
    },

    /// Remote failure that may clear on its own
    #[error("transient error during {operation}: {message}")]
    Transient {
        /// Remote operation that failed (e.g. "get team")
        operation: String,
        /// Description of what failed
        message: String,
        /// Server-suggested delay before the next attempt
        retry_after: Option<Duration>,
    },

    /// Remote call exceeded its deadline
    #[error("{operation} cancelled after {timeout:?}")]
    Cancelled {
        /// Remote operation that was cancelled
        operation: String,
        /// Deadline that expired
        timeout: Duration,
    },

    /// Failure that will repeat until the desired state changes
    #[error("permanent error for {resource}: {message}")]
    Permanent {
        /// Resource the error applies to
        resource: String,
        /// Description of what's wrong
        message: String,
    },

    /// Write rejected because the object changed since it was read
    #[error("conflict updating {resource}: {message}")]
    Conflict {
        /// Resource whose write was rejected
        resource: String,
        /// Message from the API server
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
    },
}

impl From<kube::Error> for Error {
    fn from(source: kube::Error) -> Self {
        match source {
            kube::Error::Api(ae) if ae.code == 409 => Self::conflict(UNKNOWN_CONTEXT, ae.message),
            source => Self::Kube { source },
        }
    }
}

impl Error {
    /// Create an auth error for a resource
    pub fn auth(resource: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Auth {
            resource: resource.into(),
            message: msg.into(),
        }
    }

    /// Create a transient error for a remote operation
    pub fn transient(operation: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Transient {
            operation: operation.into(),
            message: msg.into(),
            retry_after: None,
        }
    }

    /// Create a permanent error for a resource
    pub fn permanent(resource: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Permanent {
            resource: resource.into(),
            message: msg.into(),
        }
    }

    /// Create a conflict error for a resource
    pub fn conflict(resource: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Conflict {
            resource: resource.into(),
            message: msg.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Translate a remote adapter failure into the provider taxonomy
    ///
    /// `NotFound` only reaches this point when the caller did not expect
    /// absence (e.g. editing a team that vanished), so it is permanent for
    /// this attempt; the next observe will pick the create path.
    pub fn remote(operation: impl Into<String>, err: ApiError) -> Self {
        let operation = operation.into();
        match err {
            ApiError::Unauthorized(msg) => Self::auth(operation, msg),
            ApiError::RateLimited { retry_after } => Self::Transient {
                operation,
                message: "rate limit exceeded".to_string(),
                retry_after,
            },
            ApiError::Server { status, message } => {
                Self::transient(operation, format!("HTTP {status}: {message}"))
            }
            ApiError::Network(msg) => Self::transient(operation, msg),
            ApiError::Timeout => Self::transient(operation, "request timed out"),
            ApiError::NotFound(what) => Self::permanent(operation, format!("{what} not found")),
            ApiError::AlreadyExists(msg) => {
                Self::permanent(operation, format!("already exists: {msg}"))
            }
            ApiError::Forbidden(msg) | ApiError::Validation(msg) => {
                Self::permanent(operation, msg)
            }
            ApiError::Decode(msg) => Self::serialization(format!("{operation}: {msg}")),
        }
    }

    /// Attach the resource name to errors created without one
    pub fn for_resource(self, name: &str) -> Self {
        match self {
            Self::Conflict { resource, message } if resource == UNKNOWN_CONTEXT => Self::Conflict {
                resource: name.to_string(),
                message,
            },
            other => other,
        }
    }

    /// Classify this error for requeue decisions
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::Kube { source } => match source {
                kube::Error::Api(ae) if (400..500).contains(&ae.code) => ErrorClass::Permanent,
                _ => ErrorClass::Transient,
            },
            Error::Auth { .. } => ErrorClass::Auth,
            Error::Transient { .. } | Error::Cancelled { .. } => ErrorClass::Transient,
            Error::Permanent { .. } | Error::Serialization { .. } => ErrorClass::Permanent,
            Error::Conflict { .. } => ErrorClass::Conflict,
        }
    }

    /// Check if this error may clear without a spec change
    pub fn is_retryable(&self) -> bool {
        matches!(self.class(), ErrorClass::Transient | ErrorClass::Conflict)
    }

    /// Server-suggested delay, if the remote sent one
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::Transient { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}
