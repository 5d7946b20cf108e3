use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// How a template's desired state is compared against live cluster state.
/// See spec.md §3 / GLOSSARY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ComplianceType {
    Musthave,
    Mustonlyhave,
    Mustnothave,
}

impl ComplianceType {
    pub fn is_musthave(self) -> bool {
        matches!(self, ComplianceType::Musthave)
    }

    pub fn is_mustonlyhave(self) -> bool {
        matches!(self, ComplianceType::Mustonlyhave)
    }

    pub fn is_mustnothave(self) -> bool {
        matches!(self, ComplianceType::Mustnothave)
    }
}

/// Whether the evaluator is allowed to mutate the cluster. See spec.md §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum RemediationAction {
    Inform,
    Enforce,
    #[default]
    Unset,
}

impl RemediationAction {
    pub fn is_enforce(self) -> bool {
        matches!(self, RemediationAction::Enforce)
    }

    pub fn is_inform(self) -> bool {
        matches!(self, RemediationAction::Inform)
    }
}

/// Overall compliance roll-up for a policy. See spec.md §3 invariants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ComplianceState {
    Compliant,
    NonCompliant,
    /// No templates evaluated yet, or evaluation could not determine a state.
    Undetermined,
}

impl ComplianceState {
    /// spec.md §3: Compliant iff every template is Compliant, NonCompliant if
    /// any is NonCompliant, else Undetermined.
    pub fn fold<I: IntoIterator<Item = ComplianceState>>(states: I) -> ComplianceState {
        let mut saw_any = false;
        let mut saw_noncompliant = false;

        for s in states {
            saw_any = true;
            match s {
                ComplianceState::NonCompliant => saw_noncompliant = true,
                ComplianceState::Compliant => {},
                ComplianceState::Undetermined => {},
            }
        }

        if !saw_any {
            ComplianceState::Undetermined
        } else if saw_noncompliant {
            ComplianceState::NonCompliant
        } else {
            ComplianceState::Compliant
        }
    }
}

/// How a managed resource is treated when its ComplianceType is Mustnothave
/// and the policy is enforcing. See spec.md §3 (OperatorPolicy).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "PascalCase")]
pub enum RemovalBehavior {
    /// Never delete the resource.
    Keep,
    #[default]
    Delete,
    /// Delete only if nothing else depends on it.
    DeleteIfUnused,
}

/// Upgrade approval mode for OLM InstallPlans. See spec.md §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "PascalCase")]
pub enum UpgradeApproval {
    #[default]
    Manual,
    Automatic,
}

impl UpgradeApproval {
    pub fn is_automatic(self) -> bool {
        matches!(self, UpgradeApproval::Automatic)
    }
}
