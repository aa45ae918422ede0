//! Controller runtime configuration
//!
//! Built once in `main` from CLI flags and environment variables, then
//! shared read-only by every controller.

use std::time::Duration;

/// Default deadline for each remote call
pub const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default steady-state requeue interval (drift detection)
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Default number of concurrent reconciles per controller
pub const DEFAULT_MAX_CONCURRENT_RECONCILES: u16 = 4;

/// Requeue delay after a successful create, so the next observe sees it
pub const POST_CREATE_REQUEUE: Duration = Duration::from_secs(5);

/// Exponential backoff settings for failed reconciles
#[derive(Clone, Debug, PartialEq)]
pub struct BackoffConfig {
    /// First delay after a transient failure
    pub initial_delay: Duration,
    /// First delay after a permanent or auth failure
    pub permanent_delay: Duration,
    /// Upper bound on any delay
    pub max_delay: Duration,
    /// Growth factor per consecutive failure
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            permanent_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(300),
            multiplier: 2.0,
        }
    }
}

/// Settings shared by every managed-resource controller
#[derive(Clone, Debug, PartialEq)]
pub struct ControllerConfig {
    /// GitHub REST endpoint used when a ProviderConfig has no `baseUrl`
    pub github_api_url: String,
    /// Deadline for each remote call
    pub remote_timeout: Duration,
    /// Requeue interval after a successful reconcile
    pub poll_interval: Duration,
    /// Worker limit per controller
    pub max_concurrent_reconciles: u16,
    /// Failure backoff
    pub backoff: BackoffConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            github_api_url: crate::DEFAULT_GITHUB_API_URL.to_string(),
            remote_timeout: DEFAULT_REMOTE_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_concurrent_reconciles: DEFAULT_MAX_CONCURRENT_RECONCILES,
            backoff: BackoffConfig::default(),
        }
    }
}
