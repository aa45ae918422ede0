//! Capability interfaces every managed resource kind implements
//!
//! The reconcile loop in [`super::reconcile`] is generic over
//! [`ManagedResource`]; per-kind behaviour (diffing, late-initialization,
//! condition derivation and the remote calls) is resolved once through these
//! traits instead of inspecting which kind a handle refers to.

use std::fmt::Debug;

use async_trait::async_trait;
use kube::core::ClusterResourceScope;
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::crd::{Condition, ManagedStatus, ResourceSpec};
use crate::registry::ResourceKind;
use crate::Result;

/// A cluster-scoped custom resource mirroring one remote object
pub trait ManagedResource:
    Resource<DynamicType = (), Scope = ClusterResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// User-declared remote attributes (`spec.forProvider`)
    type Parameters: Clone + Debug + PartialEq + Send + Sync;
    /// Remote snapshot returned by observe
    type Observation: Clone + Debug + Send + Sync;
    /// Status sub-record
    type Status: ManagedStatus;

    /// Registry entry for this kind
    const KIND: ResourceKind;

    /// Provider config and deletion policy
    fn resource_spec(&self) -> &ResourceSpec;

    /// Desired remote attributes
    fn parameters(&self) -> &Self::Parameters;

    /// Mutable desired remote attributes
    fn parameters_mut(&mut self) -> &mut Self::Parameters;

    /// Current status, if any was ever written
    fn status(&self) -> Option<&Self::Status>;

    /// Mutable status, created empty on first access
    fn status_mut(&mut self) -> &mut Self::Status;

    /// Copy observed values into unset parameters
    ///
    /// Must never change a set field, and applying it twice must give the
    /// same result as applying it once.
    fn late_initialize(params: &Self::Parameters, observed: &Self::Observation)
        -> Self::Parameters;

    /// Returns true if no settable field differs from the remote
    fn is_up_to_date(params: &Self::Parameters, observed: &Self::Observation) -> bool;

    /// Lifecycle (`Ready`) condition implied by the remote snapshot
    fn ready_condition(observed: &Self::Observation) -> Condition;

    /// Record the remote snapshot in `status.atProvider`
    fn apply_observation(status: &mut Self::Status, observed: &Self::Observation);
}

/// Remote operations for one managed resource, bound to credentials
#[async_trait]
pub trait ExternalClient<K: ManagedResource>: Send + Sync {
    /// Fetch the remote object; `Ok(None)` when it does not exist
    async fn observe(&self, resource: &K) -> Result<Option<K::Observation>>;

    /// Create the remote object
    async fn create(&self, resource: &K) -> Result<()>;

    /// Push every settable field to the remote object
    ///
    /// Returns the remote object as it stands after the edit.
    async fn update(&self, resource: &K) -> Result<K::Observation>;

    /// Delete the remote object; already absent counts as success
    async fn delete(&self, resource: &K) -> Result<()>;
}

/// Produces an [`ExternalClient`] bound to a resource's credentials
#[async_trait]
pub trait ExternalConnector<K: ManagedResource>: Send + Sync {
    /// Resolve credentials for `resource` and bind a client to them
    async fn connect(&self, resource: &K) -> Result<Box<dyn ExternalClient<K>>>;
}

/// Fills parameters derived from other resources
#[async_trait]
pub trait ReferenceResolver<K: ManagedResource>: Send + Sync {
    /// Parameters with every reference resolved
    async fn resolve(&self, resource: &K) -> Result<K::Parameters>;
}

/// Resolver for kinds without references
pub struct NoReferences;

#[async_trait]
impl<K: ManagedResource> ReferenceResolver<K> for NoReferences {
    async fn resolve(&self, resource: &K) -> Result<K::Parameters> {
        Ok(resource.parameters().clone())
    }
}

/// Identifier used against the remote API, if one was recorded
pub fn external_name<K: Resource>(resource: &K) -> Option<&str> {
    resource
        .annotations()
        .get(crate::EXTERNAL_NAME_ANNOTATION)
        .map(String::as_str)
        .filter(|name| !name.is_empty())
}

/// External name, falling back to the resource name
pub fn external_name_or_default<K: Resource>(resource: &K) -> String {
    external_name(resource)
        .map(str::to_string)
        .unwrap_or_else(|| resource.name_any())
}

/// Record `metadata.name` as the external name if none is set
///
/// Returns true if the annotation was added.
pub fn ensure_external_name<K: Resource>(resource: &mut K) -> bool {
    if external_name(resource).is_some() {
        return false;
    }
    let name = resource.name_any();
    resource
        .annotations_mut()
        .insert(crate::EXTERNAL_NAME_ANNOTATION.to_string(), name);
    true
}

/// Returns true if the provider finalizer is present
pub fn has_finalizer<K: Resource>(resource: &K) -> bool {
    resource.finalizers().iter().any(|f| f == crate::FINALIZER)
}

/// Add the provider finalizer; returns true if it was missing
pub fn add_finalizer<K: Resource>(resource: &mut K) -> bool {
    if has_finalizer(resource) {
        return false;
    }
    resource.finalizers_mut().push(crate::FINALIZER.to_string());
    true
}

/// Remove the provider finalizer; returns true if it was present
pub fn remove_finalizer<K: Resource>(resource: &mut K) -> bool {
    let before = resource.finalizers().len();
    resource.finalizers_mut().retain(|f| f != crate::FINALIZER);
    resource.finalizers().len() != before
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{Team, TeamParameters, TeamSpec};

    fn team() -> Team {
        Team::new(
            "team-x",
            TeamSpec {
                resource: ResourceSpec::default(),
                for_provider: TeamParameters {
                    organization: "acme".to_string(),
                    ..Default::default()
                },
            },
        )
    }

    #[test]
    fn external_name_defaults_to_metadata_name_once() {
        let mut t = team();
        assert!(external_name(&t).is_none());
        assert_eq!(external_name_or_default(&t), "team-x");

        assert!(ensure_external_name(&mut t));
        assert_eq!(external_name(&t), Some("team-x"));
        assert!(!ensure_external_name(&mut t));
    }

    #[test]
    fn existing_external_name_is_kept() {
        let mut t = team();
        t.annotations_mut().insert(
            crate::EXTERNAL_NAME_ANNOTATION.to_string(),
            "platform-team".to_string(),
        );
        assert!(!ensure_external_name(&mut t));
        assert_eq!(external_name_or_default(&t), "platform-team");
    }

    #[test]
    fn finalizer_add_and_remove_are_idempotent() {
        let mut t = team();
        assert!(add_finalizer(&mut t));
        assert!(!add_finalizer(&mut t));
        assert!(has_finalizer(&t));
        assert!(remove_finalizer(&mut t));
        assert!(!remove_finalizer(&mut t));
    }
}
