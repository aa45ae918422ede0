//! Membership Custom Resource Definition
//!
//! A Membership grants a GitHub user membership of a team. The team can be
//! named directly by slug, or resolved from a Team resource by reference or
//! label selector.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{
    ConditionSet, Field, ManagedStatus, MembershipRole, Reference, ResourceSpec, Selector,
};

/// Specification for a Membership
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "org.github.kc.dev",
    version = "v1alpha1",
    kind = "Membership",
    plural = "memberships",
    status = "MembershipStatus",
    namespaced = false,
    printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.conditions[?(@.type=='Ready')].status"}"#,
    printcolumn = r#"{"name":"Synced","type":"string","jsonPath":".status.conditions[?(@.type=='Synced')].status"}"#,
    printcolumn = r#"{"name":"External-Name","type":"string","jsonPath":".metadata.annotations.crossplane\\.io/external-name"}"#,
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.atProvider.state"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MembershipSpec {
    /// Provider config and deletion policy
    #[serde(flatten)]
    pub resource: ResourceSpec,

    /// Desired remote attributes
    pub for_provider: MembershipParameters,
}

/// Configurable fields of a Membership
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MembershipParameters {
    /// Organization the team belongs to
    pub org: String,

    /// Login of the user granted membership
    pub user: String,

    /// Slug of the team the user is added to
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub team: Field<String>,

    /// Team resource to take the slug from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_ref: Option<Reference>,

    /// Selects one Team resource to take the slug from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_selector: Option<Selector>,

    /// Role of the user within the team
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub role: Field<MembershipRole>,
}

/// Observable fields of a Membership
///
/// Absent fields serialize as `null` so a status merge patch clears them.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MembershipObservation {
    /// Remote lifecycle state (e.g. "active", "pending")
    #[serde(default)]
    pub state: Option<String>,

    /// Role reported by the remote
    #[serde(default)]
    pub role: Option<MembershipRole>,
}

/// Status for a Membership
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MembershipStatus {
    /// Last observed remote attributes
    #[serde(default)]
    pub at_provider: MembershipObservation,

    /// Conditions representing the membership state
    #[serde(default, skip_serializing_if = "ConditionSet::is_empty")]
    pub conditions: ConditionSet,
}

impl ManagedStatus for MembershipStatus {
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
    fn spec_parses_team_by_reference() {
        let spec: MembershipSpec = serde_json::from_value(serde_json::json!({
            "providerConfigRef": { "name": "github" },
            "deletionPolicy": "Orphan",
            "forProvider": {
                "org": "acme",
                "user": "alice",
                "teamRef": { "name": "core" }
            }
        }))
        .unwrap();

        assert!(spec.for_provider.team.is_unset());
        assert_eq!(spec.for_provider.team_ref.unwrap().name, "core");
        assert_eq!(spec.resource.provider_config_ref.name, "github");
        assert_eq!(
            spec.resource.deletion_policy,
            crate::crd::DeletionPolicy::Orphan
        );
    }

    #[test]
    fn role_uses_lowercase_wire_names() {
        let params: MembershipParameters = serde_json::from_value(serde_json::json!({
            "org": "acme",
            "user": "alice",
            "team": "core",
            "role": "maintainer"
        }))
        .unwrap();
        assert_eq!(params.role, Field::Value(MembershipRole::Maintainer));
    }
}
