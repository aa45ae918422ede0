//! ProviderConfig and ProviderConfigUsage Custom Resource Definitions
//!
//! A ProviderConfig tells the provider where to find the GitHub token used
//! by the managed resources that reference it. A ProviderConfigUsage records
//! that one managed resource uses one ProviderConfig.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::ProviderConfigReference;

/// Label naming the ProviderConfig on each ProviderConfigUsage
pub const PROVIDER_CONFIG_LABEL: &str = "crossplane.io/provider-config";

/// Specification for a ProviderConfig
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "org.github.kc.dev",
    version = "v1alpha1",
    kind = "ProviderConfig",
    plural = "providerconfigs",
    namespaced = false,
    printcolumn = r#"{"name":"Source","type":"string","jsonPath":".spec.credentials.source"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfigSpec {
    /// Where the token comes from
    pub credentials: ProviderCredentials,

    /// API endpoint override (GitHub Enterprise Server)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

/// Credential source for a ProviderConfig
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderCredentials {
    /// Kind of credential source
    pub source: CredentialsSource,

    /// Secret key holding the token when `source` is `Secret`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<SecretKeySelector>,
}

/// Supported credential sources
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum CredentialsSource {
    /// Token stored in a Kubernetes Secret
    Secret,
    /// No credentials
    None,
}

/// Reference to a key inside a namespaced Secret
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct SecretKeySelector {
    /// Namespace of the Secret
    pub namespace: String,
    /// Name of the Secret
    pub name: String,
    /// Key within the Secret data
    pub key: String,
}

impl ProviderConfigSpec {
    /// The secret reference, if this config reads its token from a Secret
    pub fn secret_ref(&self) -> Option<&SecretKeySelector> {
        match self.credentials.source {
            CredentialsSource::Secret => self.credentials.secret_ref.as_ref(),
            CredentialsSource::None => None,
        }
    }
}

/// Specification for a ProviderConfigUsage
///
/// Named after the managed resource's UID and owned by it, so the record is
/// garbage-collected together with the resource.
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "org.github.kc.dev",
    version = "v1alpha1",
    kind = "ProviderConfigUsage",
    plural = "providerconfigusages",
    namespaced = false,
    printcolumn = r#"{"name":"Config-Name","type":"string","jsonPath":".spec.providerConfigRef.name"}"#,
    printcolumn = r#"{"name":"Resource-Kind","type":"string","jsonPath":".spec.resourceRef.kind"}"#,
    printcolumn = r#"{"name":"Resource-Name","type":"string","jsonPath":".spec.resourceRef.name"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfigUsageSpec {
    /// ProviderConfig in use
    pub provider_config_ref: ProviderConfigReference,

    /// Managed resource using it
    pub resource_ref: TypedReference,
}

/// Reference to a cluster-scoped object of a known kind
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TypedReference {
    /// API version of the referenced object
    pub api_version: String,
    /// Kind of the referenced object
    pub kind: String,
    /// Name of the referenced object
    pub name: String,
    /// UID of the referenced object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_ref_ignored_for_none_source() {
        let spec = ProviderConfigSpec {
            credentials: ProviderCredentials {
                source: CredentialsSource::None,
                secret_ref: Some(SecretKeySelector {
                    namespace: "crossplane-system".to_string(),
                    name: "github".to_string(),
                    key: "token".to_string(),
                }),
            },
            base_url: None,
        };
        assert!(spec.secret_ref().is_none());
    }

    #[test]
    fn spec_parses_secret_source() {
        let spec: ProviderConfigSpec = serde_json::from_value(serde_json::json!({
            "credentials": {
                "source": "Secret",
                "secretRef": {
                    "namespace": "crossplane-system",
                    "name": "github-creds",
                    "key": "token"
                }
            }
        }))
        .unwrap();
        assert_eq!(spec.secret_ref().unwrap().name, "github-creds");
        assert!(spec.base_url.is_none());
    }

    #[test]
    fn usage_serializes_typed_reference() {
        let spec = ProviderConfigUsageSpec {
            provider_config_ref: ProviderConfigReference {
                name: "default".to_string(),
            },
            resource_ref: TypedReference {
                api_version: "org.github.kc.dev/v1alpha1".to_string(),
                kind: "Team".to_string(),
                name: "team-x".to_string(),
                uid: Some("1f2e".to_string()),
            },
        };
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["providerConfigRef"]["name"], "default");
        assert_eq!(json["resourceRef"]["apiVersion"], "org.github.kc.dev/v1alpha1");
        assert_eq!(json["resourceRef"]["uid"], "1f2e");
    }
}
