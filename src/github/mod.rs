//! GitHub REST adapter
//!
//! [`GithubApi`] is the capability surface the reconcile loop depends on.
//! Every call returns a structured [`ApiError`] so callers can tell "not
//! found" apart from other failures without looking at message text.

mod client;
mod error;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};

use crate::crd::{MembershipRole, TeamPrivacy};

pub use client::GithubClient;
pub use error::ApiError;

/// Team as returned by the GitHub API
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Team {
    /// Numeric id
    pub id: u64,
    /// GraphQL node id
    #[serde(default)]
    pub node_id: String,
    /// Display name
    pub name: String,
    /// URL-safe identifier
    pub slug: String,
    /// Description, absent or null when never set
    #[serde(default)]
    pub description: Option<String>,
    /// Visibility
    #[serde(default)]
    pub privacy: Option<TeamPrivacy>,
    /// Number of members (only on single-team responses)
    #[serde(default)]
    pub members_count: Option<u32>,
}

/// Body of the create and edit team calls
#[derive(Clone, Debug, Default, Serialize, PartialEq)]
pub struct TeamRequest {
    /// Team name
    pub name: String,
    /// Description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Visibility
    #[serde(skip_serializing_if = "Option::is_none")]
    pub privacy: Option<TeamPrivacy>,
}

/// A user's membership of a team
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct TeamMembership {
    /// API URL of the membership
    #[serde(default)]
    pub url: String,
    /// Role within the team
    #[serde(default)]
    pub role: Option<MembershipRole>,
    /// Lifecycle state ("active" or "pending")
    #[serde(default)]
    pub state: String,
}

/// Operations against a GitHub organization's teams
#[cfg_attr(test, automock)]
#[async_trait]
pub trait GithubApi: Send + Sync {
    /// Fetch a team by slug
    async fn get_team(&self, org: &str, slug: &str) -> Result<Team, ApiError>;

    /// Create a team
    async fn create_team(&self, org: &str, request: &TeamRequest) -> Result<Team, ApiError>;

    /// Replace the settable fields of a team
    async fn edit_team(
        &self,
        org: &str,
        slug: &str,
        request: &TeamRequest,
    ) -> Result<Team, ApiError>;

    /// Delete a team
    async fn delete_team(&self, org: &str, slug: &str) -> Result<(), ApiError>;

    /// Fetch a user's membership of a team
    async fn get_membership(
        &self,
        org: &str,
        team_slug: &str,
        user: &str,
    ) -> Result<TeamMembership, ApiError>;

    /// Add a user to a team, or change their role
    async fn add_membership(
        &self,
        org: &str,
        team_slug: &str,
        user: &str,
        role: Option<MembershipRole>,
    ) -> Result<TeamMembership, ApiError>;

    /// Remove a user from a team
    async fn remove_membership(
        &self,
        org: &str,
        team_slug: &str,
        user: &str,
    ) -> Result<(), ApiError>;
}
