//! Custom Resource Definitions for the GitHub organization provider
//!
//! This module contains all CRD definitions reconciled or consumed by the
//! provider's controllers.

mod membership;
mod provider_config;
mod team;
mod types;

pub use membership::{
    Membership, MembershipObservation, MembershipParameters, MembershipSpec, MembershipStatus,
};
pub use provider_config::{
    CredentialsSource, ProviderConfig, ProviderConfigSpec, ProviderConfigUsage,
    ProviderConfigUsageSpec, ProviderCredentials, SecretKeySelector, TypedReference,
    PROVIDER_CONFIG_LABEL,
};
pub use team::{Team, TeamObservation, TeamParameters, TeamSpec, TeamStatus};
pub use types::{
    Condition, ConditionReason, ConditionSet, ConditionStatus, ConditionType, DeletionPolicy,
    Field, ManagedStatus, MembershipRole, ProviderConfigReference, Reference, ResourceSpec,
    Selector, TeamPrivacy,
};
