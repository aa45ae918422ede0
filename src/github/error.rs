//! Classification of GitHub HTTP failures

use std::time::Duration;

use reqwest::header::HeaderMap;
use thiserror::Error;

/// Structured failure of a GitHub API call
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApiError {
    /// The addressed object does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Token missing, expired or revoked
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Token lacks permission for the call
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Primary or secondary rate limit hit
    #[error("rate limited")]
    RateLimited {
        /// Delay the server asked for
        retry_after: Option<Duration>,
    },

    /// The object being created already exists
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Request rejected as invalid
    #[error("validation failed: {0}")]
    Validation(String),

    /// GitHub returned a 5xx
    #[error("server error (HTTP {status}): {message}")]
    Server {
        /// HTTP status code
        status: u16,
        /// Response body
        message: String,
    },

    /// Connection or transport failure
    #[error("network error: {0}")]
    Network(String),

    /// Request exceeded the client timeout
    #[error("request timed out")]
    Timeout,

    /// Response body could not be decoded
    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Returns true if the remote object is absent
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound(_))
    }
}

/// Map a non-success HTTP status from GitHub to an [`ApiError`]
///
/// Reference: <https://docs.github.com/en/rest/using-the-rest-api/troubleshooting-the-rest-api>
pub(crate) fn map_http_status(
    status: reqwest::StatusCode,
    headers: &HeaderMap,
    body: &str,
) -> ApiError {
    match status.as_u16() {
        401 => ApiError::Unauthorized(body.to_string()),
        403 if rate_limit_exhausted(headers) => ApiError::RateLimited {
            retry_after: retry_after(headers),
        },
        403 => ApiError::Forbidden(body.to_string()),
        404 => ApiError::NotFound(body.to_string()),
        409 => ApiError::AlreadyExists(body.to_string()),
        422 if is_duplicate(body) => ApiError::AlreadyExists(body.to_string()),
        429 => ApiError::RateLimited {
            retry_after: retry_after(headers),
        },
        s @ 500..=599 => ApiError::Server {
            status: s,
            message: body.to_string(),
        },
        _ => ApiError::Validation(format!("HTTP {status}: {body}")),
    }
}

/// Map a transport-level [`reqwest::Error`] to an [`ApiError`]
pub(crate) fn map_reqwest_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        ApiError::Timeout
    } else if err.is_decode() {
        ApiError::Decode(err.to_string())
    } else {
        ApiError::Network(err.to_string())
    }
}

fn rate_limit_exhausted(headers: &HeaderMap) -> bool {
    header_str(headers, "x-ratelimit-remaining") == Some("0") || headers.contains_key("retry-after")
}

/// Delay from `Retry-After`, else from `X-RateLimit-Reset` (epoch seconds)
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    if let Some(secs) = header_str(headers, "retry-after").and_then(|v| v.parse::<u64>().ok()) {
        return Some(Duration::from_secs(secs));
    }
    let reset = header_str(headers, "x-ratelimit-reset")?.parse::<i64>().ok()?;
    let wait = reset - chrono::Utc::now().timestamp();
    u64::try_from(wait).ok().map(Duration::from_secs)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn is_duplicate(body: &str) -> bool {
    let lower = body.to_lowercase();
    lower.contains("already exists") || lower.contains("must be unique")
}
