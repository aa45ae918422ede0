//! Managed-resource controllers
//!
//! One generic reconcile loop drives every kind in the registry. Per trigger
//! it resolves references, connects with the resource's credentials, observes
//! the remote object and then creates, late-initializes, updates or deletes
//! it. Progress is reported through the `Ready` and `Synced` conditions.

mod managed;
pub mod membership;
mod store;
pub mod team;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::{FutureExt, StreamExt};
use kube::api::Api;
use kube::runtime::controller::{self, Action};
use kube::runtime::events::EventType;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Client, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

use crate::backoff::Backoff;
use crate::config::{ControllerConfig, POST_CREATE_REQUEUE};
use crate::connector::{
    GithubConnector, GithubResource, HttpApiFactory, KubeCredentials, KubeUsageTracker,
};
use crate::crd::{Condition, DeletionPolicy, ManagedStatus};
use crate::events::{actions, reasons, EventPublisher, KubeEventPublisher};
use crate::error::ErrorClass;
use crate::registry::ControllerFuture;
use crate::{Error, Result};

pub use managed::{
    add_finalizer, ensure_external_name, external_name, external_name_or_default, has_finalizer,
    remove_finalizer, ExternalClient, ExternalConnector, ManagedResource, NoReferences,
    ReferenceResolver,
};
pub use membership::{KubeTeamLister, MembershipExternal, TeamLister, TeamReferenceResolver};
pub use store::{KubeStore, ResourceStore};
pub use team::TeamExternal;

/// Watcher timeout (seconds) - must be less than client read_timeout (30s)
///
/// Forces the API server to close idle watches before the client times out.
const WATCH_TIMEOUT_SECS: u32 = 25;

/// Shared state for one kind's controller
pub struct Context<K: ManagedResource> {
    /// Persists spec, metadata and status writes
    pub store: Arc<dyn ResourceStore<K>>,
    /// Binds remote operations to credentials
    pub connector: Arc<dyn ExternalConnector<K>>,
    /// Resolves cross-resource references
    pub resolver: Arc<dyn ReferenceResolver<K>>,
    /// Kubernetes Event sink
    pub events: Arc<dyn EventPublisher>,
    /// Per-resource failure backoff
    pub backoff: Backoff,
    /// Runtime settings
    pub config: Arc<ControllerConfig>,
}

impl<K: ManagedResource> Context<K> {
    /// Create a context from explicit collaborators
    pub fn new(
        store: Arc<dyn ResourceStore<K>>,
        connector: Arc<dyn ExternalConnector<K>>,
        resolver: Arc<dyn ReferenceResolver<K>>,
        events: Arc<dyn EventPublisher>,
        config: Arc<ControllerConfig>,
    ) -> Self {
        Self {
            store,
            connector,
            resolver,
            events,
            backoff: Backoff::new(config.backoff.clone()),
            config,
        }
    }
}

impl<K: GithubResource> Context<K> {
    /// Create a context talking to the cluster and to GitHub
    pub fn from_client(
        client: Client,
        config: Arc<ControllerConfig>,
        resolver: Arc<dyn ReferenceResolver<K>>,
    ) -> Self {
        let connector = GithubConnector::new(
            Arc::new(KubeCredentials::new(client.clone())),
            Arc::new(KubeUsageTracker::new(client.clone())),
            Arc::new(HttpApiFactory::new(config.remote_timeout)),
            config.github_api_url.clone(),
        );
        Self::new(
            Arc::new(KubeStore::new(client.clone())),
            Arc::new(connector),
            resolver,
            Arc::new(KubeEventPublisher::new(client, K::KIND.controller_name())),
            config,
        )
    }
}

/// Reconcile one managed resource
///
/// Returns the requeue action on success. Errors are classified so that
/// [`error_policy`] can pick a delay; nothing is retried in place.
#[instrument(skip(resource, ctx), fields(kind = K::KIND.kind_str(), name = %resource.name_any()))]
pub async fn reconcile<K: ManagedResource>(
    resource: Arc<K>,
    ctx: Arc<Context<K>>,
) -> Result<Action> {
    let mut current = (*resource).clone();

    if current.meta().deletion_timestamp.is_some() {
        return finalize(current, &ctx).await;
    }

    let added_finalizer = add_finalizer(&mut current);
    let named = ensure_external_name(&mut current);
    if added_finalizer || named {
        debug!(added_finalizer, named, "persisting finalizer and external name");
        current = ctx.store.update(&current).await?;
    }

    let resolved = match ctx.resolver.resolve(&current).await {
        Ok(params) => params,
        Err(e) => {
            warn!(error = %e, "cannot resolve references");
            publish_warning(&ctx, &current, reasons::CANNOT_RESOLVE_REFERENCES, &e).await;
            report_failure(&ctx, current, None, &e).await;
            return Err(e);
        }
    };
    if &resolved != current.parameters() {
        info!("persisting resolved references");
        *current.parameters_mut() = resolved;
        current = ctx.store.update(&current).await?;
    }

    // Status stays untouched: nothing has been observed yet.
    let external = match ctx.connector.connect(&current).await {
        Ok(external) => external,
        Err(e) => {
            warn!(error = %e, "cannot connect to provider");
            publish_warning(&ctx, &current, reasons::CANNOT_CONNECT, &e).await;
            return Err(e);
        }
    };

    let timeout = ctx.config.remote_timeout;
    let observed = match bounded("observe", timeout, external.observe(&current)).await {
        Ok(observed) => observed,
        Err(e) => {
            warn!(error = %e, "observe failed");
            report_failure(&ctx, current, None, &e).await;
            return Err(e);
        }
    };

    let Some(observed) = observed else {
        info!("remote resource absent, creating");
        if let Err(e) = bounded("create", timeout, external.create(&current)).await {
            warn!(error = %e, "create failed");
            publish_warning(&ctx, &current, reasons::RECONCILE_FAILED, &e).await;
            report_failure(&ctx, current, None, &e).await;
            return Err(e);
        }
        publish(
            &ctx,
            &current,
            EventType::Normal,
            reasons::CREATED_EXTERNAL,
            actions::CREATE,
            None,
        )
        .await;

        let before = current.status().cloned();
        let status = current.status_mut();
        status.conditions_mut().set(Condition::creating());
        status.conditions_mut().set(Condition::reconcile_success());
        persist_status(&ctx, &current, before.as_ref()).await?;
        ctx.backoff.reset(&current.name_any());
        return Ok(Action::requeue(POST_CREATE_REQUEUE));
    };

    let late = K::late_initialize(current.parameters(), &observed);
    if &late != current.parameters() {
        info!("late-initializing spec from remote");
        *current.parameters_mut() = late;
        current = ctx.store.update(&current).await?;
        publish(
            &ctx,
            &current,
            EventType::Normal,
            reasons::LATE_INITIALIZED,
            actions::RECONCILE,
            None,
        )
        .await;
    }

    // Status reflects the remote object after any edit, not the pre-edit read.
    let observed = if K::is_up_to_date(current.parameters(), &observed) {
        observed
    } else {
        info!("remote resource drifted, updating");
        let updated = match bounded("update", timeout, external.update(&current)).await {
            Ok(updated) => updated,
            Err(e) => {
                warn!(error = %e, "update failed");
                publish_warning(&ctx, &current, reasons::RECONCILE_FAILED, &e).await;
                report_failure(&ctx, current, Some(&observed), &e).await;
                return Err(e);
            }
        };
        publish(
            &ctx,
            &current,
            EventType::Normal,
            reasons::UPDATED_EXTERNAL,
            actions::UPDATE,
            None,
        )
        .await;
        updated
    };

    let before = current.status().cloned();
    let status = current.status_mut();
    K::apply_observation(status, &observed);
    status.conditions_mut().set(K::ready_condition(&observed));
    status.conditions_mut().set(Condition::reconcile_success());
    persist_status(&ctx, &current, before.as_ref()).await?;

    ctx.backoff.reset(&current.name_any());
    Ok(Action::requeue(ctx.config.poll_interval))
}

/// Delete the remote object, then release the finalizer
async fn finalize<K: ManagedResource>(mut current: K, ctx: &Context<K>) -> Result<Action> {
    if !has_finalizer(&current) {
        return Ok(Action::await_change());
    }

    if current.resource_spec().deletion_policy == DeletionPolicy::Orphan {
        info!("deletion policy is Orphan, leaving remote resource in place");
        remove_finalizer(&mut current);
        ctx.store.update(&current).await?;
        return Ok(Action::await_change());
    }

    let before = current.status().cloned();
    current
        .status_mut()
        .conditions_mut()
        .set(Condition::deleting());
    if let Some(updated) = persist_status(ctx, &current, before.as_ref()).await? {
        current = updated;
    }

    let external = match ctx.connector.connect(&current).await {
        Ok(external) => external,
        Err(e) => {
            warn!(error = %e, "cannot connect to provider");
            publish_warning(ctx, &current, reasons::CANNOT_CONNECT, &e).await;
            return Err(e);
        }
    };

    let timeout = ctx.config.remote_timeout;
    let observed = match bounded("observe", timeout, external.observe(&current)).await {
        Ok(observed) => observed,
        Err(e) => {
            report_failure(ctx, current, None, &e).await;
            return Err(e);
        }
    };

    if observed.is_some() {
        info!("deleting remote resource");
        if let Err(e) = bounded("delete", timeout, external.delete(&current)).await {
            warn!(error = %e, "delete failed");
            publish_warning(ctx, &current, reasons::RECONCILE_FAILED, &e).await;
            report_failure(ctx, current, None, &e).await;
            return Err(e);
        }
        publish(
            ctx,
            &current,
            EventType::Normal,
            reasons::DELETED_EXTERNAL,
            actions::DELETE,
            None,
        )
        .await;
    }

    remove_finalizer(&mut current);
    ctx.store.update(&current).await?;
    ctx.backoff.reset(&current.name_any());
    Ok(Action::await_change())
}

/// Requeue policy for failed reconciles
pub fn error_policy<K: ManagedResource>(
    resource: Arc<K>,
    error: &Error,
    ctx: Arc<Context<K>>,
) -> Action {
    let name = resource.name_any();
    let class = error.class();
    let delay = ctx.backoff.next_delay(&name, class, error.retry_after());
    match class {
        ErrorClass::Conflict => {
            debug!(kind = %K::KIND, %name, "stale write, retrying from a fresh read")
        }
        _ => error!(
            kind = %K::KIND,
            %name,
            ?class,
            error = %error,
            delay_ms = delay.as_millis() as u64,
            "reconciliation failed"
        ),
    }
    Action::requeue(delay)
}

/// Run one remote call under a deadline
async fn bounded<T>(
    operation: &str,
    timeout: Duration,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(Error::Cancelled {
            operation: operation.to_string(),
            timeout,
        }),
    }
}

/// Write status if it differs from `before`; returns the stored object
async fn persist_status<K: ManagedResource>(
    ctx: &Context<K>,
    current: &K,
    before: Option<&K::Status>,
) -> Result<Option<K>> {
    if current.status() == before {
        debug!("status unchanged");
        return Ok(None);
    }
    ctx.store.update_status(current).await.map(Some)
}

/// Record a failed reconcile in the `Synced` condition
///
/// The failure being reported is what the caller returns, so a failed status
/// write is only logged.
async fn report_failure<K: ManagedResource>(
    ctx: &Context<K>,
    mut current: K,
    observed: Option<&K::Observation>,
    err: &Error,
) {
    let before = current.status().cloned();
    let status = current.status_mut();
    if let Some(observed) = observed {
        K::apply_observation(status, observed);
        status.conditions_mut().set(K::ready_condition(observed));
    }
    status.conditions_mut().set(Condition::reconcile_error(err));
    if let Err(e) = persist_status(ctx, &current, before.as_ref()).await {
        warn!(error = %e, "failed to record reconcile error in status");
    }
}

async fn publish<K: ManagedResource>(
    ctx: &Context<K>,
    resource: &K,
    type_: EventType,
    reason: &str,
    action: &str,
    note: Option<String>,
) {
    ctx.events
        .publish(&resource.object_ref(&()), type_, reason, action, note)
        .await;
}

async fn publish_warning<K: ManagedResource>(
    ctx: &Context<K>,
    resource: &K,
    reason: &str,
    err: &Error,
) {
    publish(
        ctx,
        resource,
        EventType::Warning,
        reason,
        actions::RECONCILE,
        Some(err.to_string()),
    )
    .await;
}

/// Drive a controller for `K` until a shutdown signal
pub fn run_controller<K: ManagedResource>(
    client: Client,
    ctx: Arc<Context<K>>,
) -> ControllerFuture {
    let api: Api<K> = Api::all(client);
    let config = controller::Config::default().concurrency(ctx.config.max_concurrent_reconciles);
    info!(kind = %K::KIND, "starting controller");

    Controller::new(api, WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS))
        .with_config(config)
        .shutdown_on_signal()
        .run(reconcile::<K>, error_policy::<K>, ctx)
        .for_each(log_reconcile_result(K::KIND.kind_str()))
        .boxed()
}

fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(std::result::Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => warn!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}
