use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::compliance::{ComplianceState, ComplianceType, RemediationAction};
use super::condition::{Condition, RelatedObject};

/// ConfigurationPolicy drives live cluster objects toward a declared desired
/// state. See spec.md §3 "ConfigurationPolicy".
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "policy.open-cluster-management.io",
    version = "v1",
    kind = "ConfigurationPolicy",
    plural = "configurationpolicies",
    shortname = "cfgpol",
    namespaced,
    status = "ConfigurationPolicyStatus",
    printcolumn = r#"{"name":"Compliance state", "type":"string", "jsonPath":".status.compliant"}"#,
    printcolumn = r#"{"name":"Remediation action", "type":"string", "jsonPath":".spec.remediationAction"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationPolicySpec {
    pub remediation_action: RemediationAction,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace_selector: Option<NamespaceSelector>,

    pub object_templates: Vec<ObjectTemplate>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceSelector {
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// One entry of `spec.objectTemplates`. `object_definition` is kept as raw
/// JSON because it describes an arbitrary Kubernetes resource, possibly
/// still containing unresolved `{{...}}` template expressions.
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ObjectTemplate {
    pub compliance_type: ComplianceType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_compliance_type: Option<ComplianceType>,
    pub object_definition: Value,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationPolicyStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compliant: Option<ComplianceState>,
    #[serde(default)]
    pub template_statuses: Vec<TemplateStatus>,
    #[serde(default)]
    pub related_objects: Vec<RelatedObject>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TemplateStatus {
    pub compliant: ComplianceState,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl ConfigurationPolicyStatus {
    /// spec.md §3 invariant: complianceState = Compliant iff every template
    /// Compliant, NonCompliant if any NonCompliant, else Undetermined.
    pub fn recompute_overall_compliance(&mut self) {
        self.compliant = Some(ComplianceState::fold(
            self.template_statuses.iter().map(|t| t.compliant),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overall_compliance_recomputed_from_templates() {
        let mut status = ConfigurationPolicyStatus {
            compliant: None,
            template_statuses: vec![
                TemplateStatus {
                    compliant: ComplianceState::Compliant,
                    conditions: vec![],
                },
                TemplateStatus {
                    compliant: ComplianceState::NonCompliant,
                    conditions: vec![],
                },
            ],
            related_objects: vec![],
        };
        status.recompute_overall_compliance();
        assert_eq!(status.compliant, Some(ComplianceState::NonCompliant));
    }
}
