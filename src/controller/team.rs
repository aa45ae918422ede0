//! Team reconciliation rules and remote operations

use std::sync::Arc;

use async_trait::async_trait;
use kube::{Client, ResourceExt};

use super::managed::{external_name_or_default, ExternalClient, ManagedResource, NoReferences};
use super::{run_controller, Context};
use crate::config::ControllerConfig;
use crate::connector::GithubResource;
use crate::crd::{Condition, ResourceSpec, Team, TeamObservation, TeamParameters, TeamStatus};
use crate::github::{self, GithubApi, TeamRequest};
use crate::registry::{ControllerFuture, ResourceKind};
use crate::{Error, Result};

impl ManagedResource for Team {
    type Parameters = TeamParameters;
    type Observation = github::Team;
    type Status = TeamStatus;

    const KIND: ResourceKind = ResourceKind::Team;

    fn resource_spec(&self) -> &ResourceSpec {
        &self.spec.resource
    }

    fn parameters(&self) -> &TeamParameters {
        &self.spec.for_provider
    }

    fn parameters_mut(&mut self) -> &mut TeamParameters {
        &mut self.spec.for_provider
    }

    fn status(&self) -> Option<&TeamStatus> {
        self.status.as_ref()
    }

    fn status_mut(&mut self) -> &mut TeamStatus {
        self.status.get_or_insert_with(TeamStatus::default)
    }

    fn late_initialize(params: &TeamParameters, observed: &github::Team) -> TeamParameters {
        // An empty remote description carries no information worth pinning.
        let description = observed.description.as_ref().filter(|d| !d.is_empty());
        TeamParameters {
            organization: params.organization.clone(),
            description: params.description.late_init(description),
            privacy: params.privacy.late_init(observed.privacy.as_ref()),
        }
    }

    fn is_up_to_date(params: &TeamParameters, observed: &github::Team) -> bool {
        let desired = params.description.as_option().map_or("", String::as_str);
        let remote = observed.description.as_deref().unwrap_or("");
        if desired != remote {
            return false;
        }
        match params.privacy.as_option() {
            Some(privacy) => observed.privacy.as_ref() == Some(privacy),
            None => true,
        }
    }

    fn ready_condition(_observed: &github::Team) -> Condition {
        Condition::available()
    }

    fn apply_observation(status: &mut TeamStatus, observed: &github::Team) {
        status.at_provider = TeamObservation {
            id: Some(observed.id),
            node_id: Some(observed.node_id.clone()).filter(|id| !id.is_empty()),
            slug: Some(observed.slug.clone()),
            members_count: observed.members_count,
        };
    }
}

impl GithubResource for Team {
    fn bind(api: Arc<dyn GithubApi>) -> Box<dyn ExternalClient<Self>> {
        Box::new(TeamExternal { api })
    }
}

/// Team operations against GitHub, keyed by organization and external name
pub struct TeamExternal {
    api: Arc<dyn GithubApi>,
}

/// Whether `name` is already in the form GitHub slugs a team name to
///
/// GitHub addresses teams by slug. A name that slugs to something else would
/// be created under an identifier the external name can never observe.
fn is_slug(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('-')
        && !name.ends_with('-')
        && !name.contains("--")
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

impl TeamExternal {
    fn request(team: &Team) -> TeamRequest {
        let params = team.parameters();
        TeamRequest {
            name: external_name_or_default(team),
            description: params.description.as_option().cloned(),
            privacy: params.privacy.as_option().copied(),
        }
    }
}

#[async_trait]
impl ExternalClient<Team> for TeamExternal {
    async fn observe(&self, team: &Team) -> Result<Option<github::Team>> {
        let slug = external_name_or_default(team);
        match self.api.get_team(&team.parameters().organization, &slug).await {
            Ok(remote) => Ok(Some(remote)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(Error::remote("get team", e)),
        }
    }

    async fn create(&self, team: &Team) -> Result<()> {
        let name = external_name_or_default(team);
        if !is_slug(&name) {
            return Err(Error::permanent(
                team.name_any(),
                format!(
                    "external name {name:?} is not a team slug (lowercase letters, digits and single hyphens)"
                ),
            ));
        }
        self.api
            .create_team(&team.parameters().organization, &Self::request(team))
            .await
            .map(|_| ())
            .map_err(|e| Error::remote("create team", e))
    }

    async fn update(&self, team: &Team) -> Result<github::Team> {
        let slug = external_name_or_default(team);
        self.api
            .edit_team(&team.parameters().organization, &slug, &Self::request(team))
            .await
            .map_err(|e| Error::remote("edit team", e))
    }

    async fn delete(&self, team: &Team) -> Result<()> {
        let slug = external_name_or_default(team);
        match self
            .api
            .delete_team(&team.parameters().organization, &slug)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(Error::remote("delete team", e)),
        }
    }
}

/// Controller future for Teams
pub fn controller(client: Client, config: Arc<ControllerConfig>) -> ControllerFuture {
    let ctx = Context::<Team>::from_client(client.clone(), config, Arc::new(NoReferences));
    run_controller(client, Arc::new(ctx))
}
