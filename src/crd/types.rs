//! Shared types for managed resource CRDs

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use schemars::gen::SchemaGenerator;
use schemars::schema::Schema;
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

// =============================================================================
// Optional desired fields
// =============================================================================

/// A desired-state field the user may leave unset
///
/// Late-initialization only ever fills `Unset` fields, so a `Value` the user
/// declared can never be overwritten by server defaults. Serialized as an
/// optional JSON value.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Field<T> {
    /// The user did not declare a value
    #[default]
    Unset,
    /// The user (or late-initialization) declared this value
    Value(T),
}

impl<T> Field<T> {
    /// Returns true if no value is declared
    pub fn is_unset(&self) -> bool {
        matches!(self, Field::Unset)
    }

    /// Borrow the declared value, if any
    pub fn as_option(&self) -> Option<&T> {
        match self {
            Field::Unset => None,
            Field::Value(v) => Some(v),
        }
    }
}

impl<T: Clone> Field<T> {
    /// Fill an unset field from an observed value; set fields are kept
    pub fn late_init(&self, observed: Option<&T>) -> Field<T> {
        match (self, observed) {
            (Field::Unset, Some(v)) => Field::Value(v.clone()),
            _ => self.clone(),
        }
    }
}

impl<T> From<Option<T>> for Field<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Field::Value(v),
            None => Field::Unset,
        }
    }
}

impl<T: Serialize> Serialize for Field<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.as_option().serialize(serializer)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Field<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<T>::deserialize(deserializer).map(Field::from)
    }
}

impl<T: JsonSchema> JsonSchema for Field<T> {
    fn is_referenceable() -> bool {
        false
    }

    fn schema_name() -> String {
        Option::<T>::schema_name()
    }

    fn json_schema(gen: &mut SchemaGenerator) -> Schema {
        Option::<T>::json_schema(gen)
    }
}

// =============================================================================
// Common managed resource fields
// =============================================================================

/// What happens to the remote resource when the managed resource is deleted
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum DeletionPolicy {
    /// Delete the remote resource
    #[default]
    Delete,
    /// Leave the remote resource in place
    Orphan,
}

/// Reference to the ProviderConfig holding credentials
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct ProviderConfigReference {
    /// Name of the ProviderConfig
    pub name: String,
}

impl Default for ProviderConfigReference {
    fn default() -> Self {
        Self {
            name: crate::DEFAULT_PROVIDER_CONFIG.to_string(),
        }
    }
}

/// Fields shared by every managed resource spec
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSpec {
    /// Credentials used to reach the remote API
    #[serde(default)]
    pub provider_config_ref: ProviderConfigReference,

    /// Remote deletion behaviour
    #[serde(default)]
    pub deletion_policy: DeletionPolicy,
}

/// Reference to another resource by name
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct Reference {
    /// Name of the referenced resource
    pub name: String,
}

/// Selects a resource by labels
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Selector {
    /// Labels the selected resource must carry
    #[serde(default)]
    pub match_labels: BTreeMap<String, String>,
}

impl Selector {
    /// Returns true if `labels` carries every label this selector requires
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.match_labels
            .iter()
            .all(|(k, v)| labels.get(k) == Some(v))
    }

    /// Render as a Kubernetes label selector string
    pub fn to_label_selector(&self) -> String {
        self.match_labels
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

// =============================================================================
// Remote enums shared with the GitHub adapter
// =============================================================================

/// Team visibility inside the organization
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TeamPrivacy {
    /// Only visible to organization owners and team members
    Secret,
    /// Visible to all organization members
    Closed,
}

/// Role of a user inside a team
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MembershipRole {
    /// Regular team member
    Member,
    /// Team maintainer
    Maintainer,
}

// =============================================================================
// Conditions
// =============================================================================

/// Condition status following Kubernetes conventions
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// Condition is true
    True,
    /// Condition is false
    False,
    /// Condition status is unknown
    #[default]
    Unknown,
}

impl fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Condition types reported on managed resources
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionType {
    /// Lifecycle of the remote resource
    Ready,
    /// Outcome of the last reconcile
    Synced,
}

/// Machine-readable reasons for conditions
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionReason {
    /// Remote resource exists and is usable
    Available,
    /// Remote resource is being created
    Creating,
    /// Remote resource is being deleted
    Deleting,
    /// Remote resource exists but is not usable
    Unavailable,
    /// Last reconcile succeeded
    ReconcileSuccess,
    /// Last reconcile failed
    ReconcileError,
}

impl fmt::Display for ConditionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Kubernetes-style condition for status reporting
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    #[serde(rename = "type")]
    pub type_: ConditionType,

    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,

    /// Machine-readable reason for the condition
    pub reason: ConditionReason,

    /// Human-readable message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Last time the condition transitioned
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Create a new condition with the current timestamp
    pub fn new(type_: ConditionType, status: ConditionStatus, reason: ConditionReason) -> Self {
        Self {
            type_,
            status,
            reason,
            message: None,
            last_transition_time: Utc::now(),
        }
    }

    /// Attach a human-readable message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Remote resource is available
    pub fn available() -> Self {
        Self::new(ConditionType::Ready, ConditionStatus::True, ConditionReason::Available)
    }

    /// Remote resource is being created
    pub fn creating() -> Self {
        Self::new(ConditionType::Ready, ConditionStatus::False, ConditionReason::Creating)
    }

    /// Remote resource is being deleted
    pub fn deleting() -> Self {
        Self::new(ConditionType::Ready, ConditionStatus::False, ConditionReason::Deleting)
    }

    /// Remote resource is not usable
    pub fn unavailable() -> Self {
        Self::new(
            ConditionType::Ready,
            ConditionStatus::False,
            ConditionReason::Unavailable,
        )
    }

    /// Last reconcile succeeded
    pub fn reconcile_success() -> Self {
        Self::new(
            ConditionType::Synced,
            ConditionStatus::True,
            ConditionReason::ReconcileSuccess,
        )
    }

    /// Last reconcile failed
    pub fn reconcile_error(err: &crate::Error) -> Self {
        Self::new(
            ConditionType::Synced,
            ConditionStatus::False,
            ConditionReason::ReconcileError,
        )
        .with_message(err.to_string())
    }

    /// Same condition apart from the transition timestamp
    pub fn equivalent(&self, other: &Condition) -> bool {
        self.type_ == other.type_
            && self.status == other.status
            && self.reason == other.reason
            && self.message == other.message
    }
}

/// Ordered set of conditions, at most one per type
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(transparent)]
pub struct ConditionSet(Vec<Condition>);

impl ConditionSet {
    /// Set a condition, replacing any existing condition of the same type
    ///
    /// Setting a condition equivalent to the current one is a no-op and keeps
    /// the original transition time. Returns true if the set changed.
    pub fn set(&mut self, condition: Condition) -> bool {
        match self.0.iter_mut().find(|c| c.type_ == condition.type_) {
            Some(existing) if existing.equivalent(&condition) => false,
            Some(existing) => {
                *existing = condition;
                true
            }
            None => {
                self.0.push(condition);
                true
            }
        }
    }

    /// Get the condition of a given type
    pub fn get(&self, type_: ConditionType) -> Option<&Condition> {
        self.0.iter().find(|c| c.type_ == type_)
    }

    /// Returns true if no conditions are set
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of conditions
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Status sub-record shared by every managed resource kind
pub trait ManagedStatus: Clone + Default + PartialEq + Serialize + fmt::Debug + Send + Sync {
    /// Conditions reported on the resource
    fn conditions(&self) -> &ConditionSet;

    /// Mutable access to the reported conditions
    fn conditions_mut(&mut self) -> &mut ConditionSet;
}

#[cfg(test)]
mod tests {
    use super::*;

    mod field {
        use super::*;

        #[test]
        fn unset_serializes_as_null_and_round_trips_from_missing() {
            let value: Field<String> = serde_json::from_value(serde_json::Value::Null).unwrap();
            assert!(value.is_unset());

            let value: Field<String> = serde_json::from_str("\"core\"").unwrap();
            assert_eq!(value, Field::Value("core".to_string()));
            assert_eq!(serde_json::to_string(&value).unwrap(), "\"core\"");
        }

        #[test]
        fn late_init_fills_only_unset() {
            let observed = "legacy".to_string();
            assert_eq!(
                Field::<String>::Unset.late_init(Some(&observed)),
                Field::Value("legacy".to_string())
            );
            assert_eq!(
                Field::Value("mine".to_string()).late_init(Some(&observed)),
                Field::Value("mine".to_string())
            );
            assert_eq!(Field::<String>::Unset.late_init(None), Field::Unset);
        }
    }

    mod selector {
        use super::*;

        #[test]
        fn matches_requires_all_labels() {
            let selector = Selector {
                match_labels: BTreeMap::from([
                    ("team".to_string(), "core".to_string()),
                    ("env".to_string(), "prod".to_string()),
                ]),
            };
            let mut labels = BTreeMap::from([("team".to_string(), "core".to_string())]);
            assert!(!selector.matches(&labels));

            labels.insert("env".to_string(), "prod".to_string());
            assert!(selector.matches(&labels));
            assert_eq!(selector.to_label_selector(), "env=prod,team=core");
        }
    }

    // ==========================================================================
    // Story Tests: Condition bookkeeping
    // ==========================================================================

    mod conditions {
        use super::*;

        /// Story: re-reporting the same state does not churn transition time
        #[test]
        fn story_setting_current_condition_is_noop() {
            let mut set = ConditionSet::default();
            assert!(set.set(Condition::available()));
            let first = set.get(ConditionType::Ready).unwrap().last_transition_time;

            assert!(!set.set(Condition::available()));
            assert_eq!(
                set.get(ConditionType::Ready).unwrap().last_transition_time,
                first
            );
            assert_eq!(set.len(), 1);
        }

        /// Story: a lifecycle change replaces, not merges, the Ready condition
        #[test]
        fn story_lifecycle_condition_is_replaced() {
            let mut set = ConditionSet::default();
            set.set(Condition::creating());
            set.set(Condition::reconcile_success());
            assert!(set.set(Condition::available()));

            let ready = set.get(ConditionType::Ready).unwrap();
            assert_eq!(ready.reason, ConditionReason::Available);
            assert_eq!(ready.status, ConditionStatus::True);
            assert_eq!(set.len(), 2);
        }

        #[test]
        fn conditions_serialize_with_kubernetes_field_names() {
            let json = serde_json::to_value(Condition::reconcile_success()).unwrap();
            assert_eq!(json["type"], "Synced");
            assert_eq!(json["status"], "True");
            assert_eq!(json["reason"], "ReconcileSuccess");
            assert!(json.get("lastTransitionTime").is_some());
            assert!(json.get("message").is_none());
        }

        #[test]
        fn reconcile_error_carries_message() {
            let err = crate::Error::permanent("m", "team reference not found");
            let condition = Condition::reconcile_error(&err);
            assert_eq!(condition.status, ConditionStatus::False);
            assert!(condition
                .message
                .as_deref()
                .unwrap()
                .contains("team reference not found"));
        }
    }
}
