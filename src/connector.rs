//! Credential resolution and GitHub client construction
//!
//! A managed resource names a ProviderConfig; the ProviderConfig names a
//! Secret key holding a GitHub token. [`GithubConnector`] records the resource
//! as a user of that ProviderConfig, then walks the chain and binds a
//! [`GithubApi`] to the token. Every credential failure along the way is an
//! [`Error::Auth`], raised before any remote call is attempted.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, ResourceExt};
use tracing::debug;
use zeroize::Zeroizing;

#[cfg(test)]
use mockall::automock;

use crate::controller::{ExternalClient, ExternalConnector, ManagedResource};
use crate::crd::{
    ProviderConfig, ProviderConfigSpec, ProviderConfigUsage, ProviderConfigUsageSpec,
    TypedReference, PROVIDER_CONFIG_LABEL,
};
use crate::github::{ApiError, GithubApi, GithubClient};
use crate::{Error, Result};

/// Read access to ProviderConfigs and Secrets
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Fetch a ProviderConfig spec by name; `None` if it does not exist
    async fn provider_config(&self, name: &str) -> Result<Option<ProviderConfigSpec>>;

    /// Fetch one key of a Secret; `None` if the Secret or key is absent
    async fn secret_value(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
    ) -> Result<Option<Zeroizing<String>>>;
}

/// [`CredentialSource`] backed by the Kubernetes API
pub struct KubeCredentials {
    client: Client,
}

impl KubeCredentials {
    /// Create a credential source using the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CredentialSource for KubeCredentials {
    async fn provider_config(&self, name: &str) -> Result<Option<ProviderConfigSpec>> {
        let api: Api<ProviderConfig> = Api::all(self.client.clone());
        Ok(api.get_opt(name).await?.map(|pc| pc.spec))
    }

    async fn secret_value(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
    ) -> Result<Option<Zeroizing<String>>> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let Some(secret) = api.get_opt(name).await? else {
            return Ok(None);
        };
        let Some(bytes) = secret.data.and_then(|mut data| data.remove(key)) else {
            return Ok(None);
        };
        let value = String::from_utf8(bytes.0).map_err(|_| {
            Error::auth(
                secret.metadata.name.unwrap_or_default(),
                format!("key {key} is not valid UTF-8"),
            )
        })?;
        Ok(Some(Zeroizing::new(value)))
    }
}

/// Records which managed resources use which ProviderConfig
#[cfg_attr(test, automock)]
#[async_trait]
pub trait UsageTracker: Send + Sync {
    /// Create or refresh a usage record
    async fn track(&self, usage: &ProviderConfigUsage) -> Result<()>;
}

/// [`UsageTracker`] applying records with server-side apply
pub struct KubeUsageTracker {
    client: Client,
}

impl KubeUsageTracker {
    /// Create a tracker using the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl UsageTracker for KubeUsageTracker {
    async fn track(&self, usage: &ProviderConfigUsage) -> Result<()> {
        let api: Api<ProviderConfigUsage> = Api::all(self.client.clone());
        let name = usage.name_any();
        api.patch(
            &name,
            &PatchParams::apply(crate::FIELD_MANAGER).force(),
            &Patch::Apply(usage),
        )
        .await
        .map_err(|e| Error::from(e).for_resource(&name))?;
        Ok(())
    }
}

/// Usage record for `resource`, named by its UID and owned by it
pub fn usage_for<K: ManagedResource>(resource: &K) -> Result<ProviderConfigUsage> {
    let resource_name = resource.name_any();
    let owner = resource.controller_owner_ref(&()).ok_or_else(|| {
        Error::permanent(&resource_name, "resource has no UID to track ProviderConfig usage")
    })?;
    let pc_name = resource.resource_spec().provider_config_ref.clone();

    let mut usage = ProviderConfigUsage::new(
        &owner.uid,
        ProviderConfigUsageSpec {
            resource_ref: TypedReference {
                api_version: owner.api_version.clone(),
                kind: owner.kind.clone(),
                name: resource_name,
                uid: Some(owner.uid.clone()),
            },
            provider_config_ref: pc_name.clone(),
        },
    );
    usage
        .labels_mut()
        .insert(PROVIDER_CONFIG_LABEL.to_string(), pc_name.name);
    usage.metadata.owner_references = Some(vec![owner]);
    Ok(usage)
}

/// Builds a [`GithubApi`] for an endpoint and token
#[cfg_attr(test, automock)]
pub trait ApiFactory: Send + Sync {
    /// Create a client for `base_url` authenticating with `token`
    fn build(
        &self,
        base_url: &str,
        token: Zeroizing<String>,
    ) -> std::result::Result<Arc<dyn GithubApi>, ApiError>;
}

/// [`ApiFactory`] producing reqwest-backed clients
pub struct HttpApiFactory {
    timeout: Duration,
}

impl HttpApiFactory {
    /// Clients built by this factory time out after `timeout`
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl ApiFactory for HttpApiFactory {
    fn build(
        &self,
        base_url: &str,
        token: Zeroizing<String>,
    ) -> std::result::Result<Arc<dyn GithubApi>, ApiError> {
        Ok(Arc::new(GithubClient::new(base_url, token, self.timeout)?))
    }
}

/// A managed resource kind whose remote object lives in GitHub
pub trait GithubResource: ManagedResource {
    /// Bind this kind's remote operations to an authenticated client
    fn bind(api: Arc<dyn GithubApi>) -> Box<dyn ExternalClient<Self>>;
}

/// Connects managed resources to GitHub using their ProviderConfig
pub struct GithubConnector {
    credentials: Arc<dyn CredentialSource>,
    usage: Arc<dyn UsageTracker>,
    factory: Arc<dyn ApiFactory>,
    default_base_url: String,
}

impl GithubConnector {
    /// Create a connector; `default_base_url` applies when a ProviderConfig has no `baseUrl`
    pub fn new(
        credentials: Arc<dyn CredentialSource>,
        usage: Arc<dyn UsageTracker>,
        factory: Arc<dyn ApiFactory>,
        default_base_url: impl Into<String>,
    ) -> Self {
        Self {
            credentials,
            usage,
            factory,
            default_base_url: default_base_url.into(),
        }
    }

    /// Record usage, then resolve `resource`'s credentials into an authenticated client
    pub async fn api_for<K: ManagedResource>(&self, resource: &K) -> Result<Arc<dyn GithubApi>> {
        let resource_name = resource.name_any();
        let pc_name = &resource.resource_spec().provider_config_ref.name;

        self.usage.track(&usage_for(resource)?).await?;

        let config = self
            .credentials
            .provider_config(pc_name)
            .await?
            .ok_or_else(|| {
                Error::auth(&resource_name, format!("ProviderConfig {pc_name} not found"))
            })?;

        let secret_ref = config.secret_ref().ok_or_else(|| {
            Error::auth(
                &resource_name,
                format!("ProviderConfig {pc_name} does not reference a credentials secret"),
            )
        })?;

        let token = self
            .credentials
            .secret_value(&secret_ref.namespace, &secret_ref.name, &secret_ref.key)
            .await?
            .ok_or_else(|| {
                Error::auth(
                    &resource_name,
                    format!(
                        "secret {}/{} has no key {}",
                        secret_ref.namespace, secret_ref.name, secret_ref.key
                    ),
                )
            })?;

        let token = Zeroizing::new(token.trim().to_string());
        if token.is_empty() {
            return Err(Error::auth(
                &resource_name,
                format!(
                    "token in secret {}/{} is empty",
                    secret_ref.namespace, secret_ref.name
                ),
            ));
        }

        let base_url = config
            .base_url
            .as_deref()
            .unwrap_or(&self.default_base_url);
        debug!(provider_config = %pc_name, %base_url, "resolved GitHub credentials");

        self.factory
            .build(base_url, token)
            .map_err(|e| Error::permanent(&resource_name, format!("ProviderConfig {pc_name}: {e}")))
    }
}

#[async_trait]
impl<K: GithubResource> ExternalConnector<K> for GithubConnector {
    async fn connect(&self, resource: &K) -> Result<Box<dyn ExternalClient<K>>> {
        Ok(K::bind(self.api_for(resource).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{
        CredentialsSource, ProviderCredentials, ResourceSpec, SecretKeySelector, Team,
        TeamParameters, TeamSpec,
    };
    use crate::error::ErrorClass;
    use crate::github::MockGithubApi;

    fn team() -> Team {
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
        team.metadata.uid = Some("0b5e-team-x".to_string());
        team
    }

    fn tracked() -> MockUsageTracker {
        let mut usage = MockUsageTracker::new();
        usage.expect_track().returning(|_| Ok(()));
        usage
    }

    fn secret_config(base_url: Option<&str>) -> ProviderConfigSpec {
        ProviderConfigSpec {
            credentials: ProviderCredentials {
                source: CredentialsSource::Secret,
                secret_ref: Some(SecretKeySelector {
                    namespace: "crossplane-system".to_string(),
                    name: "github".to_string(),
                    key: "token".to_string(),
                }),
            },
            base_url: base_url.map(str::to_string),
        }
    }

    fn connector(credentials: MockCredentialSource, factory: MockApiFactory) -> GithubConnector {
        GithubConnector::new(
            Arc::new(credentials),
            Arc::new(tracked()),
            Arc::new(factory),
            "https://api.github.com",
        )
    }

    fn no_factory() -> MockApiFactory {
        let mut factory = MockApiFactory::new();
        factory.expect_build().never();
        factory
    }

    /// Story: a resource pointing at a ProviderConfig with a token gets a client
    #[tokio::test]
    async fn story_secret_token_builds_client() {
        let mut credentials = MockCredentialSource::new();
        credentials
            .expect_provider_config()
            .withf(|name| name == "default")
            .returning(|_| Ok(Some(secret_config(Some("https://ghe.example.com/api/v3")))));
        credentials
            .expect_secret_value()
            .withf(|ns, name, key| ns == "crossplane-system" && name == "github" && key == "token")
            .returning(|_, _, _| Ok(Some(Zeroizing::new("ghp_abc\n".to_string()))));

        let mut factory = MockApiFactory::new();
        factory
            .expect_build()
            .withf(|url, token| url == "https://ghe.example.com/api/v3" && token.as_str() == "ghp_abc")
            .times(1)
            .returning(|_, _| Ok(Arc::new(MockGithubApi::new())));

        connector(credentials, factory).api_for(&team()).await.unwrap();
    }

    #[tokio::test]
    async fn missing_provider_config_is_auth_error() {
        let mut credentials = MockCredentialSource::new();
        credentials.expect_provider_config().returning(|_| Ok(None));

        let err = connector(credentials, no_factory())
            .api_for(&team())
            .await
            .err()
            .unwrap();
        assert_eq!(err.class(), ErrorClass::Auth);
    }

    #[tokio::test]
    async fn source_none_is_auth_error() {
        let mut credentials = MockCredentialSource::new();
        credentials.expect_provider_config().returning(|_| {
            let mut config = secret_config(None);
            config.credentials.source = CredentialsSource::None;
            Ok(Some(config))
        });

        let err = connector(credentials, no_factory())
            .api_for(&team())
            .await
            .err()
            .unwrap();
        assert_eq!(err.class(), ErrorClass::Auth);
        assert!(err.to_string().contains("credentials secret"));
    }

    #[tokio::test]
    async fn missing_secret_is_auth_error() {
        let mut credentials = MockCredentialSource::new();
        credentials
            .expect_provider_config()
            .returning(|_| Ok(Some(secret_config(None))));
        credentials
            .expect_secret_value()
            .returning(|_, _, _| Ok(None));

        let err = connector(credentials, no_factory())
            .api_for(&team())
            .await
            .err()
            .unwrap();
        assert_eq!(err.class(), ErrorClass::Auth);
    }

    /// Story: a blank token is rejected before any client exists
    #[tokio::test]
    async fn story_empty_token_is_auth_error() {
        let mut credentials = MockCredentialSource::new();
        credentials
            .expect_provider_config()
            .returning(|_| Ok(Some(secret_config(None))));
        credentials
            .expect_secret_value()
            .returning(|_, _, _| Ok(Some(Zeroizing::new("  \n".to_string()))));

        let err = connector(credentials, no_factory())
            .api_for(&team())
            .await
            .err()
            .unwrap();
        assert_eq!(err.class(), ErrorClass::Auth);
        assert!(err.to_string().contains("empty"));
    }

    #[tokio::test]
    async fn invalid_base_url_is_permanent() {
        let mut credentials = MockCredentialSource::new();
        credentials
            .expect_provider_config()
            .returning(|_| Ok(Some(secret_config(Some("not a url")))));
        credentials
            .expect_secret_value()
            .returning(|_, _, _| Ok(Some(Zeroizing::new("ghp_abc".to_string()))));

        let factory = HttpApiFactory::new(Duration::from_secs(1));
        let connector = GithubConnector::new(
            Arc::new(credentials),
            Arc::new(tracked()),
            Arc::new(factory),
            "https://api.github.com",
        );
        let err = connector.api_for(&team()).await.err().unwrap();
        assert_eq!(err.class(), ErrorClass::Permanent);
    }

    /// Story: connecting records the resource as a user of its ProviderConfig
    #[tokio::test]
    async fn story_usage_is_recorded_before_credentials_are_read() {
        let mut seq = mockall::Sequence::new();
        let mut usage = MockUsageTracker::new();
        usage
            .expect_track()
            .withf(|u| {
                let owner = &u.metadata.owner_references.as_ref().unwrap()[0];
                u.name_any() == "0b5e-team-x"
                    && u.labels().get(PROVIDER_CONFIG_LABEL).map(String::as_str) == Some("default")
                    && u.spec.provider_config_ref.name == "default"
                    && u.spec.resource_ref.kind == "Team"
                    && u.spec.resource_ref.api_version == "org.github.kc.dev/v1alpha1"
                    && u.spec.resource_ref.name == "team-x"
                    && u.spec.resource_ref.uid.as_deref() == Some("0b5e-team-x")
                    && owner.uid == "0b5e-team-x"
                    && owner.controller == Some(true)
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let mut credentials = MockCredentialSource::new();
        credentials
            .expect_provider_config()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Some(secret_config(None))));
        credentials
            .expect_secret_value()
            .returning(|_, _, _| Ok(Some(Zeroizing::new("ghp_abc".to_string()))));

        let mut factory = MockApiFactory::new();
        factory
            .expect_build()
            .returning(|_, _| Ok(Arc::new(MockGithubApi::new())));

        GithubConnector::new(
            Arc::new(credentials),
            Arc::new(usage),
            Arc::new(factory),
            "https://api.github.com",
        )
        .api_for(&team())
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn usage_failure_stops_before_credentials() {
        let mut usage = MockUsageTracker::new();
        usage
            .expect_track()
            .returning(|_| Err(Error::transient("track usage", "apiserver unavailable")));
        let mut credentials = MockCredentialSource::new();
        credentials.expect_provider_config().never();
        credentials.expect_secret_value().never();

        let err = GithubConnector::new(
            Arc::new(credentials),
            Arc::new(usage),
            Arc::new(no_factory()),
            "https://api.github.com",
        )
        .api_for(&team())
        .await
        .err()
        .unwrap();
        assert_eq!(err.class(), ErrorClass::Transient);
    }

    #[test]
    fn usage_requires_uid() {
        let mut team = team();
        team.metadata.uid = None;
        let err = usage_for(&team).err().unwrap();
        assert_eq!(err.class(), ErrorClass::Permanent);
    }
}
