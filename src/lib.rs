//! GitHub organization provider - declarative Teams and Memberships
//!
//! Users declare GitHub teams and team memberships as Kubernetes custom
//! resources. A control loop per kind observes the organization through the
//! GitHub REST API, creates what is missing, updates what drifted, folds
//! server defaults back into unset fields and reports progress as `Ready` and
//! `Synced` conditions.
//!
//! # Modules
//!
//! - [`crd`] - Custom Resource Definitions (Team, Membership, ProviderConfig)
//! - [`controller`] - Generic managed-resource reconcile loop and per-kind rules
//! - [`github`] - GitHub REST adapter and its error classification
//! - [`connector`] - Credential resolution and adapter construction
//! - [`backoff`] - Per-resource requeue backoff
//! - [`registry`] - Static table of reconciled kinds
//! - [`events`] - Kubernetes Event publishing
//! - [`config`] - Controller runtime configuration
//! - [`telemetry`] - Logging setup
//! - [`error`] - Error types for the provider

#![deny(missing_docs)]

pub mod backoff;
pub mod config;
pub mod connector;
pub mod controller;
pub mod crd;
pub mod error;
pub mod events;
pub mod github;
pub mod registry;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Default Configuration Constants
// =============================================================================

/// ProviderConfig used when a resource does not name one
pub const DEFAULT_PROVIDER_CONFIG: &str = "default";

/// Annotation holding the identifier used against the remote API
pub const EXTERNAL_NAME_ANNOTATION: &str = "crossplane.io/external-name";

/// Finalizer guarding remote deletion
pub const FINALIZER: &str = "finalizer.managedresource.kc.dev";

/// Field manager for server-side apply and events
pub const FIELD_MANAGER: &str = "github-org-provider";

/// Default GitHub REST endpoint
pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
