//! reqwest-backed [`GithubApi`] implementation

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::{Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;
use zeroize::Zeroizing;

use super::error::{map_http_status, map_reqwest_error};
use super::{ApiError, GithubApi, Team, TeamMembership, TeamRequest};
use crate::crd::MembershipRole;

const API_VERSION: &str = "2022-11-28";
const ACCEPT_GITHUB_JSON: &str = "application/vnd.github+json";

/// GitHub REST client bound to one token
pub struct GithubClient {
    http: reqwest::Client,
    base_url: Url,
    token: Zeroizing<String>,
}

impl std::fmt::Debug for GithubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubClient")
            .field("base_url", &self.base_url.as_str())
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl GithubClient {
    /// Build a client for `base_url` that authenticates with `token`
    ///
    /// `timeout` bounds every request, connect included.
    pub fn new(
        base_url: &str,
        token: Zeroizing<String>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ApiError::Validation(format!("invalid API URL {base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::Validation(format!(
                "API URL {base_url} cannot be used as a base"
            )));
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_GITHUB_JSON));
        headers.insert("x-github-api-version", HeaderValue::from_static(API_VERSION));
        headers.insert(USER_AGENT, HeaderValue::from_static(crate::FIELD_MANAGER));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(map_reqwest_error)?;

        Ok(Self {
            http,
            base_url,
            token,
        })
    }

    /// URL for the given path segments, each percent-encoded
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        let url = self.url(segments);
        debug!(%method, %url, "github request");
        self.http
            .request(method, url)
            .bearer_auth(self.token.as_str())
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, ApiError> {
        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let headers = response.headers().clone();
        let body = response.text().await.unwrap_or_default();
        Err(map_http_status(status, &headers, &body))
    }

    async fn json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ApiError> {
        let response = self.send(builder).await?;
        let bytes = response.bytes().await.map_err(map_reqwest_error)?;
        serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn json_with_body<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        segments: &[&str],
        body: &B,
    ) -> Result<T, ApiError> {
        self.json(self.request(method, segments).json(body)).await
    }
}

#[derive(Serialize)]
struct MembershipRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<MembershipRole>,
}

#[async_trait]
impl GithubApi for GithubClient {
    async fn get_team(&self, org: &str, slug: &str) -> Result<Team, ApiError> {
        self.json(self.request(Method::GET, &["orgs", org, "teams", slug]))
            .await
    }

    async fn create_team(&self, org: &str, request: &TeamRequest) -> Result<Team, ApiError> {
        self.json_with_body(Method::POST, &["orgs", org, "teams"], request)
            .await
    }

    async fn edit_team(
        &self,
        org: &str,
        slug: &str,
        request: &TeamRequest,
    ) -> Result<Team, ApiError> {
        self.json_with_body(Method::PATCH, &["orgs", org, "teams", slug], request)
            .await
    }

    async fn delete_team(&self, org: &str, slug: &str) -> Result<(), ApiError> {
        self.send(self.request(Method::DELETE, &["orgs", org, "teams", slug]))
            .await
            .map(|_| ())
    }

    async fn get_membership(
        &self,
        org: &str,
        team_slug: &str,
        user: &str,
    ) -> Result<TeamMembership, ApiError> {
        self.json(self.request(
            Method::GET,
            &["orgs", org, "teams", team_slug, "memberships", user],
        ))
        .await
    }

    async fn add_membership(
        &self,
        org: &str,
        team_slug: &str,
        user: &str,
        role: Option<MembershipRole>,
    ) -> Result<TeamMembership, ApiError> {
        self.json_with_body(
            Method::PUT,
            &["orgs", org, "teams", team_slug, "memberships", user],
            &MembershipRequest { role },
        )
        .await
    }

    async fn remove_membership(
        &self,
        org: &str,
        team_slug: &str,
        user: &str,
    ) -> Result<(), ApiError> {
        self.send(self.request(
            Method::DELETE,
            &["orgs", org, "teams", team_slug, "memberships", user],
        ))
        .await
        .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> GithubClient {
        GithubClient::new(
            base,
            Zeroizing::new("t0ken".to_string()),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn url_appends_to_enterprise_prefix() {
        let c = client("https://ghe.example.com/api/v3/");
        assert_eq!(
            c.url(&["orgs", "acme", "teams", "core"]).as_str(),
            "https://ghe.example.com/api/v3/orgs/acme/teams/core"
        );
    }

    #[test]
    fn url_escapes_segments() {
        let c = client("https://api.github.com");
        assert_eq!(
            c.url(&["orgs", "acme", "teams", "a/b"]).as_str(),
            "https://api.github.com/orgs/acme/teams/a%2Fb"
        );
    }

    #[test]
    fn debug_redacts_token() {
        let c = client("https://api.github.com");
        let rendered = format!("{c:?}");
        assert!(!rendered.contains("t0ken"));
    }

    #[test]
    fn rejects_unusable_base_url() {
        let err = GithubClient::new(
            "mailto:ops@example.com",
            Zeroizing::new("t".to_string()),
            Duration::from_secs(1),
        )
        .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }
}
