//! Membership reconciliation rules, team reference resolution and remote operations

use std::sync::Arc;

use async_trait::async_trait;
use kube::api::{Api, ListParams};
use kube::{Client, ResourceExt};

#[cfg(test)]
use mockall::automock;

use super::managed::{external_name, ExternalClient, ManagedResource, ReferenceResolver};
use super::{run_controller, Context};
use crate::config::ControllerConfig;
use crate::connector::GithubResource;
use crate::crd::{
    Condition, Field, Membership, MembershipObservation, MembershipParameters, MembershipStatus,
    Reference, ResourceSpec, Selector, Team,
};
use crate::github::{GithubApi, TeamMembership};
use crate::registry::{ControllerFuture, ResourceKind};
use crate::{Error, Result};

/// Remote state of an accepted membership
pub const STATE_ACTIVE: &str = "active";

/// Remote state of an invitation not yet accepted
pub const STATE_PENDING: &str = "pending";

impl ManagedResource for Membership {
    type Parameters = MembershipParameters;
    type Observation = TeamMembership;
    type Status = MembershipStatus;

    const KIND: ResourceKind = ResourceKind::Membership;

    fn resource_spec(&self) -> &ResourceSpec {
        &self.spec.resource
    }

    fn parameters(&self) -> &MembershipParameters {
        &self.spec.for_provider
    }

    fn parameters_mut(&mut self) -> &mut MembershipParameters {
        &mut self.spec.for_provider
    }

    fn status(&self) -> Option<&MembershipStatus> {
        self.status.as_ref()
    }

    fn status_mut(&mut self) -> &mut MembershipStatus {
        self.status.get_or_insert_with(MembershipStatus::default)
    }

    fn late_initialize(
        params: &MembershipParameters,
        observed: &TeamMembership,
    ) -> MembershipParameters {
        MembershipParameters {
            role: params.role.late_init(observed.role.as_ref()),
            ..params.clone()
        }
    }

    /// Organization, team and user form the identity; only the role is settable.
    fn is_up_to_date(params: &MembershipParameters, observed: &TeamMembership) -> bool {
        match params.role.as_option() {
            Some(role) => observed.role.as_ref() == Some(role),
            None => true,
        }
    }

    fn ready_condition(observed: &TeamMembership) -> Condition {
        match observed.state.as_str() {
            STATE_ACTIVE => Condition::available(),
            STATE_PENDING => Condition::creating(),
            _ => Condition::unavailable(),
        }
    }

    fn apply_observation(status: &mut MembershipStatus, observed: &TeamMembership) {
        status.at_provider = MembershipObservation {
            state: Some(observed.state.clone()).filter(|s| !s.is_empty()),
            role: observed.role,
        };
    }
}

impl GithubResource for Membership {
    fn bind(api: Arc<dyn GithubApi>) -> Box<dyn ExternalClient<Self>> {
        Box::new(MembershipExternal { api })
    }
}

/// Membership operations against GitHub, keyed by org, team slug and user
pub struct MembershipExternal {
    api: Arc<dyn GithubApi>,
}

fn team_slug(membership: &Membership) -> Result<&str> {
    membership
        .parameters()
        .team
        .as_option()
        .map(String::as_str)
        .ok_or_else(|| Error::permanent(membership.name_any(), "team is not resolved"))
}

#[async_trait]
impl ExternalClient<Membership> for MembershipExternal {
    /// A membership whose team was never resolved cannot exist remotely.
    async fn observe(&self, membership: &Membership) -> Result<Option<TeamMembership>> {
        let params = membership.parameters();
        let Some(team) = params.team.as_option() else {
            return Ok(None);
        };
        match self
            .api
            .get_membership(&params.org, team, &params.user)
            .await
        {
            Ok(remote) => Ok(Some(remote)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(Error::remote("get membership", e)),
        }
    }

    async fn create(&self, membership: &Membership) -> Result<()> {
        let params = membership.parameters();
        self.api
            .add_membership(
                &params.org,
                team_slug(membership)?,
                &params.user,
                params.role.as_option().copied(),
            )
            .await
            .map(|_| ())
            .map_err(|e| Error::remote("add membership", e))
    }

    async fn update(&self, membership: &Membership) -> Result<TeamMembership> {
        let params = membership.parameters();
        self.api
            .add_membership(
                &params.org,
                team_slug(membership)?,
                &params.user,
                params.role.as_option().copied(),
            )
            .await
            .map_err(|e| Error::remote("update membership", e))
    }

    async fn delete(&self, membership: &Membership) -> Result<()> {
        let params = membership.parameters();
        let Some(team) = params.team.as_option() else {
            return Ok(());
        };
        match self
            .api
            .remove_membership(&params.org, team, &params.user)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(Error::remote("remove membership", e)),
        }
    }
}

// =============================================================================
// Team references
// =============================================================================

/// Read access to Team resources
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TeamLister: Send + Sync {
    /// Fetch a Team by name; `None` if it does not exist
    async fn get(&self, name: &str) -> Result<Option<Team>>;

    /// List Teams matching a label selector
    async fn list(&self, selector: &Selector) -> Result<Vec<Team>>;
}

/// [`TeamLister`] backed by the Kubernetes API
pub struct KubeTeamLister {
    client: Client,
}

impl KubeTeamLister {
    /// Create a lister using the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TeamLister for KubeTeamLister {
    async fn get(&self, name: &str) -> Result<Option<Team>> {
        let api: Api<Team> = Api::all(self.client.clone());
        Ok(api.get_opt(name).await?)
    }

    async fn list(&self, selector: &Selector) -> Result<Vec<Team>> {
        let api: Api<Team> = Api::all(self.client.clone());
        let params = ListParams::default().labels(&selector.to_label_selector());
        Ok(api.list(&params).await?.items)
    }
}

/// Resolves `teamRef` and `teamSelector` into a team slug
///
/// A selector is only consulted when no reference is set; the first matching
/// Team by name is recorded as the reference. The slug is the referenced
/// Team's external name.
pub struct TeamReferenceResolver {
    teams: Arc<dyn TeamLister>,
}

impl TeamReferenceResolver {
    /// Create a resolver reading Teams from `teams`
    pub fn new(teams: Arc<dyn TeamLister>) -> Self {
        Self { teams }
    }
}

#[async_trait]
impl ReferenceResolver<Membership> for TeamReferenceResolver {
    async fn resolve(&self, membership: &Membership) -> Result<MembershipParameters> {
        let name = membership.name_any();
        let mut params = membership.parameters().clone();

        if params.team_ref.is_none() {
            if let Some(selector) = &params.team_selector {
                let mut matches: Vec<Team> = self
                    .teams
                    .list(selector)
                    .await?
                    .into_iter()
                    .filter(|team| selector.matches(team.labels()))
                    .collect();
                matches.sort_by_key(|team| team.name_any());
                let selected = matches.first().ok_or_else(|| {
                    Error::permanent(&name, "no Team matches teamSelector")
                })?;
                params.team_ref = Some(Reference {
                    name: selected.name_any(),
                });
            }
        }

        if let Some(reference) = &params.team_ref {
            let team = self.teams.get(&reference.name).await?.ok_or_else(|| {
                Error::permanent(&name, format!("referenced Team {} not found", reference.name))
            })?;
            let slug = external_name(&team).ok_or_else(|| {
                Error::permanent(
                    &name,
                    format!("referenced Team {} has no external name yet", reference.name),
                )
            })?;
            params.team = Field::Value(slug.to_string());
        }

        if params.team.is_unset() {
            return Err(Error::permanent(
                &name,
                "one of team, teamRef or teamSelector is required",
            ));
        }
        Ok(params)
    }
}

/// Controller future for Memberships
pub fn controller(client: Client, config: Arc<ControllerConfig>) -> ControllerFuture {
    let resolver = TeamReferenceResolver::new(Arc::new(KubeTeamLister::new(client.clone())));
    let ctx = Context::<Membership>::from_client(client.clone(), config, Arc::new(resolver));
    run_controller(client, Arc::new(ctx))
}
