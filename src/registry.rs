//! Static registry of reconciled kinds
//!
//! The binary walks [`KINDS`] to print and install CRDs and to start one
//! controller per kind. Adding a kind means adding a row here; nothing is
//! registered as a side effect of loading a module.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::{Client, CustomResourceExt};

use crate::config::ControllerConfig;
use crate::controller::{membership, team};
use crate::crd::{Membership, ProviderConfig, ProviderConfigUsage, Team};

/// Managed resource kinds reconciled by this provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Team (org.github.kc.dev)
    Team,
    /// Membership (org.github.kc.dev)
    Membership,
}

impl ResourceKind {
    /// Kubernetes Kind string
    pub fn kind_str(&self) -> &'static str {
        match self {
            Self::Team => "Team",
            Self::Membership => "Membership",
        }
    }

    /// Name reported on Events emitted by this kind's controller
    pub fn controller_name(&self) -> &'static str {
        match self {
            Self::Team => "github-team-controller",
            Self::Membership => "github-membership-controller",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind_str())
    }
}

/// Future driving one controller until shutdown
pub type ControllerFuture = BoxFuture<'static, ()>;

/// One row of the kind registry
pub struct KindRegistration {
    /// Kind reconciled
    pub kind: ResourceKind,
    /// CRD generator
    pub crd: fn() -> CustomResourceDefinition,
    /// Controller factory
    pub controller: fn(Client, Arc<ControllerConfig>) -> ControllerFuture,
}

impl fmt::Debug for KindRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KindRegistration")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Every reconciled kind
pub static KINDS: &[KindRegistration] = &[
    KindRegistration {
        kind: ResourceKind::Team,
        crd: Team::crd,
        controller: team::controller,
    },
    KindRegistration {
        kind: ResourceKind::Membership,
        crd: Membership::crd,
        controller: membership::controller,
    },
];

/// Every CRD the provider owns, reconciled kinds first
pub fn crds() -> Vec<CustomResourceDefinition> {
    KINDS
        .iter()
        .map(|r| (r.crd)())
        .chain([ProviderConfig::crd(), ProviderConfigUsage::crd()])
        .collect()
}
