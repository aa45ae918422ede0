//! Team Custom Resource Definition
//!
//! A Team represents a team inside a GitHub organization. The team slug is
//! the resource's external name.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{ConditionSet, Field, ManagedStatus, ResourceSpec, TeamPrivacy};

/// Specification for a Team
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "org.github.kc.dev",
    version = "v1alpha1",
    kind = "Team",
    plural = "teams",
    status = "TeamStatus",
    namespaced = false,
    printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.conditions[?(@.type=='Ready')].status"}"#,
    printcolumn = r#"{"name":"Synced","type":"string","jsonPath":".status.conditions[?(@.type=='Synced')].status"}"#,
    printcolumn = r#"{"name":"External-Name","type":"string","jsonPath":".metadata.annotations.crossplane\\.io/external-name"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct TeamSpec {
    /// Provider config and deletion policy
    #[serde(flatten)]
    pub resource: ResourceSpec,

    /// Desired remote attributes
    pub for_provider: TeamParameters,
}

/// Configurable fields of a Team
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TeamParameters {
    /// Organization owning the team
    pub organization: String,

    /// Team description
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub description: Field<String>,

    /// Team visibility
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub privacy: Field<TeamPrivacy>,
}

/// Observable fields of a Team
///
/// Absent fields serialize as `null` so a status merge patch clears them.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TeamObservation {
    /// Numeric team id
    #[serde(default)]
    pub id: Option<u64>,

    /// GraphQL node id
    #[serde(default)]
    pub node_id: Option<String>,

    /// Team slug as reported by the remote
    #[serde(default)]
    pub slug: Option<String>,

    /// Number of members in the team
    #[serde(default)]
    pub members_count: Option<u32>,
}

/// Status for a Team
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TeamStatus {
    /// Last observed remote attributes
    #[serde(default)]
    pub at_provider: TeamObservation,

    /// Conditions representing the team state
    #[serde(default, skip_serializing_if = "ConditionSet::is_empty")]
    pub conditions: ConditionSet,
}

impl ManagedStatus for TeamStatus {
    fn conditions(&self) -> &ConditionSet {
        &self.conditions
    }

    fn conditions_mut(&mut self) -> &mut ConditionSet {
        &mut self.conditions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_parses_with_defaults() {
        let spec: TeamSpec = serde_json::from_value(serde_json::json!({
            "forProvider": { "organization": "acme" }
        }))
        .unwrap();

        assert_eq!(spec.for_provider.organization, "acme");
        assert!(spec.for_provider.description.is_unset());
        assert!(spec.for_provider.privacy.is_unset());
        assert_eq!(spec.resource.provider_config_ref.name, "default");
    }

    #[test]
    fn unset_fields_are_omitted_when_serialized() {
        let params = TeamParameters {
            organization: "acme".to_string(),
            description: Field::Unset,
            privacy: Field::Value(TeamPrivacy::Closed),
        };
        let json = serde_json::to_value(&params).unwrap();
        assert!(json.get("description").is_none());
        assert_eq!(json["privacy"], "closed");
    }

    #[test]
    fn crd_is_cluster_scoped() {
        use kube::CustomResourceExt;
        let crd = Team::crd();
        assert_eq!(crd.spec.scope, "Cluster");
        assert_eq!(crd.spec.group, "org.github.kc.dev");
    }
}
