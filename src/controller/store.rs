//! Persistence of managed resources back to the API server

use std::marker::PhantomData;

use async_trait::async_trait;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};

use super::managed::ManagedResource;
use crate::{Error, Result};

/// Writes managed resources with optimistic concurrency
///
/// Both writes carry the resource version the object was read at, so a
/// concurrent change surfaces as [`Error::Conflict`]. Each returns the stored
/// object, whose new version must be used for any further write.
#[async_trait]
pub trait ResourceStore<K: ManagedResource>: Send + Sync {
    /// Replace metadata and spec
    async fn update(&self, resource: &K) -> Result<K>;

    /// Replace the status sub-record
    async fn update_status(&self, resource: &K) -> Result<K>;
}

/// [`ResourceStore`] backed by the Kubernetes API
pub struct KubeStore<K> {
    client: Client,
    _kind: PhantomData<fn() -> K>,
}

impl<K> KubeStore<K> {
    /// Create a store using the given client
    pub fn new(client: Client) -> Self {
        Self {
            client,
            _kind: PhantomData,
        }
    }
}

#[async_trait]
impl<K: ManagedResource> ResourceStore<K> for KubeStore<K> {
    async fn update(&self, resource: &K) -> Result<K> {
        let api: Api<K> = Api::all(self.client.clone());
        let name = resource.name_any();
        api.replace(&name, &PostParams::default(), resource)
            .await
            .map_err(|e| Error::from(e).for_resource(&name))
    }

    async fn update_status(&self, resource: &K) -> Result<K> {
        let api: Api<K> = Api::all(self.client.clone());
        let name = resource.name_any();
        let patch = status_patch(resource)?;
        api.patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| Error::from(e).for_resource(&name))
    }
}

/// Merge patch replacing `status`, pinned to the resource version read
fn status_patch<K: ManagedResource>(resource: &K) -> Result<serde_json::Value> {
    let value = serde_json::to_value(resource).map_err(|e| Error::serialization(e.to_string()))?;
    let status = value
        .get("status")
        .cloned()
        .unwrap_or(serde_json::Value::Null);
    Ok(serde_json::json!({
        "metadata": { "resourceVersion": resource.resource_version() },
        "status": status,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{
        Condition, Membership, MembershipObservation, MembershipParameters, MembershipSpec,
        MembershipStatus, ResourceSpec, Team, TeamObservation, TeamParameters, TeamSpec,
        TeamStatus,
    };

    #[test]
    fn status_patch_pins_resource_version() {
        let mut team = Team::new(
            "team-x",
            TeamSpec {
                resource: ResourceSpec::default(),
                for_provider: TeamParameters {
                    organization: "acme".to_string(),
                    ..Default::default()
                },
            },
        );
        team.metadata.resource_version = Some("17".to_string());
        let mut status = TeamStatus::default();
        status.conditions.set(Condition::available());
        team.status = Some(status);

        let patch = status_patch(&team).unwrap();
        assert_eq!(patch["metadata"]["resourceVersion"], "17");
        assert_eq!(patch["status"]["conditions"][0]["reason"], "Available");
        assert!(patch.get("spec").is_none());
    }

    /// Story: a field the remote stopped reporting is removed from status
    #[test]
    fn story_dropped_observation_fields_are_cleared() {
        let mut team = Team::new(
            "team-x",
            TeamSpec {
                resource: ResourceSpec::default(),
                for_provider: TeamParameters {
                    organization: "acme".to_string(),
                    ..Default::default()
                },
            },
        );
        team.metadata.resource_version = Some("3".to_string());
        let mut status = TeamStatus::default();
        status.at_provider = TeamObservation {
            id: Some(1),
            ..Default::default()
        };
        team.status = Some(status);

        let patch = status_patch(&team).unwrap();
        let at_provider = patch["status"]["atProvider"].as_object().unwrap();
        assert_eq!(at_provider["id"], 1);
        for cleared in ["nodeId", "slug", "membersCount"] {
            assert!(at_provider.contains_key(cleared), "{cleared} missing");
            assert!(at_provider[cleared].is_null());
        }
    }

    #[test]
    fn membership_status_patch_clears_dropped_role() {
        let mut membership = Membership::new(
            "alice-core",
            MembershipSpec {
                resource: ResourceSpec::default(),
                for_provider: MembershipParameters::default(),
            },
        );
        let mut status = MembershipStatus::default();
        status.at_provider = MembershipObservation {
            state: Some("active".to_string()),
            role: None,
        };
        membership.status = Some(status);

        let patch = status_patch(&membership).unwrap();
        assert_eq!(patch["status"]["atProvider"]["state"], "active");
        assert!(patch["status"]["atProvider"]
            .as_object()
            .unwrap()
            .get("role")
            .is_some_and(serde_json::Value::is_null));
    }
}
