//! Kubernetes Event recording for managed-resource controllers.
//!
//! Events are **fire-and-forget**: failures are logged as warnings and never
//! propagate errors. A failed event must never break reconciliation.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

/// Trait for publishing Kubernetes Events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a Kubernetes Event on the given resource.
    ///
    /// * `type_` - Normal or Warning
    /// * `reason` - Machine-readable reason string (e.g. "CreatedExternalResource")
    /// * `action` - What action was taken (e.g. "Create")
    /// * `note` - Optional human-readable message
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// Production implementation wrapping `kube::runtime::events::Recorder`.
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// Create a publisher reporting as `controller_name`
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: None,
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = kube::runtime::events::Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!(
                reason,
                action,
                error = %e,
                "Failed to publish Kubernetes event"
            );
        }
    }
}

/// No-op implementation for tests.
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(
        &self,
        _resource_ref: &ObjectReference,
        _type_: EventType,
        _reason: &str,
        _action: &str,
        _note: Option<String>,
    ) {
    }
}

/// Well-known event reason strings.
pub mod reasons {
    /// Remote resource created
    pub const CREATED_EXTERNAL: &str = "CreatedExternalResource";
    /// Remote resource brought back in line with the spec
    pub const UPDATED_EXTERNAL: &str = "UpdatedExternalResource";
    /// Remote resource deleted
    pub const DELETED_EXTERNAL: &str = "DeletedExternalResource";
    /// Server defaults copied into the spec
    pub const LATE_INITIALIZED: &str = "LateInitialized";
    /// Reference or selector could not be resolved
    pub const CANNOT_RESOLVE_REFERENCES: &str = "CannotResolveReferences";
    /// Credentials could not be resolved
    pub const CANNOT_CONNECT: &str = "CannotConnectToProvider";
    /// Reconcile failed after connecting
    pub const RECONCILE_FAILED: &str = "ReconcileFailed";
}

/// Well-known event action strings.
pub mod actions {
    /// Standard reconciliation loop
    pub const RECONCILE: &str = "Reconcile";
    /// Creating the remote resource
    pub const CREATE: &str = "Create";
    /// Updating the remote resource
    pub const UPDATE: &str = "Update";
    /// Deleting the remote resource
    pub const DELETE: &str = "Delete";
}
