use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::compliance::{ComplianceState, ComplianceType, RemediationAction, UpgradeApproval};
use super::condition::{Condition, RelatedObject};

/// OperatorPolicy drives an Operator Lifecycle Manager install toward a
/// declared desired state. See spec.md §3 "OperatorPolicy".
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "policy.open-cluster-management.io",
    version = "v1beta1",
    kind = "OperatorPolicy",
    plural = "operatorpolicies",
    shortname = "oppol",
    namespaced,
    status = "OperatorPolicyStatus",
    printcolumn = r#"{"name":"Compliance state", "type":"string", "jsonPath":".status.compliant"}"#,
    printcolumn = r#"{"name":"Remediation action", "type":"string", "jsonPath":".spec.remediationAction"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct OperatorPolicySpec {
    pub remediation_action: RemediationAction,
    pub compliance_type: ComplianceType,

    /// Partial Subscription body; merged against any cluster default via the
    /// PackageManifest lookup in the build stage (spec.md §4.E "Build").
    pub subscription: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator_group: Option<Value>,

    #[serde(default)]
    pub upgrade_approval: UpgradeApproval,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub versions: Option<Vec<String>>,

    #[serde(default)]
    pub removal_behavior: RemovalBehaviorSpec,

    #[serde(default)]
    pub compliance_config: ComplianceConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub struct RemovalBehaviorSpec {
    #[serde(default)]
    pub operator_group: super::compliance::RemovalBehavior,
    #[serde(default)]
    pub subscription: super::compliance::RemovalBehavior,
    #[serde(default)]
    pub csv: super::compliance::RemovalBehavior,
    #[serde(default)]
    pub crds: super::compliance::RemovalBehavior,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum DeploymentsUnavailableBehavior {
    Compliant,
    NonCompliant,
}

impl Default for DeploymentsUnavailableBehavior {
    fn default() -> Self {
        DeploymentsUnavailableBehavior::NonCompliant
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceConfig {
    #[serde(default)]
    pub deployments_unavailable: DeploymentsUnavailableBehavior,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OperatorPolicyStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compliant: Option<ComplianceState>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub related_objects: Vec<RelatedObject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_subscription_label: Option<String>,
    #[serde(default)]
    pub overlapping_policies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_intervention_time: Option<DateTime<Utc>>,
}

pub const OP_GROUP_CONDITION_TYPE: &str = "OperatorGroupCompliant";
pub const SUBSCRIPTION_CONDITION_TYPE: &str = "SubscriptionCompliant";
pub const INSTALL_PLAN_CONDITION_TYPE: &str = "InstallPlanCompliant";
pub const CSV_CONDITION_TYPE: &str = "CSVCompliant";
pub const DEPLOYMENT_CONDITION_TYPE: &str = "DeploymentCompliant";
pub const CRD_CONDITION_TYPE: &str = "CRDCompliant";
pub const CATALOG_SOURCE_CONDITION_TYPE: &str = "CatalogSourceCompliant";
pub const COMPLIANT_CONDITION_TYPE: &str = "Compliant";

/// The grace period OLM is given to resolve a Subscription before the
/// reconciler forcibly sets `currentCSV` (spec.md §4.E Subscription, §8 test
/// scenario 5).
pub const OLM_GRACE_PERIOD_SECONDS: i64 = 30;

impl OperatorPolicyStatus {
    pub fn get_condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }

    /// spec.md §3 OperatorPolicy invariant: intervention time cleared when
    /// resolution is healthy or the grace period has expired and
    /// intervention was performed.
    pub fn subscription_intervention_waiting(&self, now: DateTime<Utc>) -> bool {
        match self.subscription_intervention_time {
            Some(t) => now.signed_duration_since(t).num_seconds() < OLM_GRACE_PERIOD_SECONDS,
            None => false,
        }
    }

    pub fn subscription_intervention_expired(&self, now: DateTime<Utc>) -> bool {
        match self.subscription_intervention_time {
            Some(t) => now.signed_duration_since(t).num_seconds() >= OLM_GRACE_PERIOD_SECONDS,
            None => false,
        }
    }
}
