//! OperatorPolicy Evaluator (spec.md §4.E): build -> overlap -> operator
//! group -> subscription -> install plan -> CSV -> CRDs -> deployment ->
//! catalog source. Errors from any stage accumulate; status is always
//! written (spec.md §4.E intro).

pub mod build;
pub mod csv;
pub mod install_plan;
pub mod olm;
pub mod operator_group;
pub mod resources;
pub mod subscription;

use crate::models::compliance::ComplianceState;
use crate::models::condition::Condition;
use crate::models::operator_policy::{
    CATALOG_SOURCE_CONDITION_TYPE, CRD_CONDITION_TYPE, CSV_CONDITION_TYPE, DEPLOYMENT_CONDITION_TYPE,
    INSTALL_PLAN_CONDITION_TYPE, OP_GROUP_CONDITION_TYPE, OperatorPolicyStatus,
    SUBSCRIPTION_CONDITION_TYPE,
};
use crate::status::{apply_condition_update, Aspect};

/// The fixed aspect order the overall `Compliant` condition folds over
/// (spec.md §4.G item 2: "OperatorGroup, Subscription, …").
fn aspects() -> [Aspect<'static>; 6] {
    [
        Aspect { condition_type: OP_GROUP_CONDITION_TYPE, name: "OperatorGroup" },
        Aspect { condition_type: SUBSCRIPTION_CONDITION_TYPE, name: "Subscription" },
        Aspect { condition_type: INSTALL_PLAN_CONDITION_TYPE, name: "InstallPlan" },
        Aspect { condition_type: CSV_CONDITION_TYPE, name: "ClusterServiceVersion" },
        Aspect { condition_type: DEPLOYMENT_CONDITION_TYPE, name: "Deployment" },
        Aspect { condition_type: CATALOG_SOURCE_CONDITION_TYPE, name: "CatalogSource" },
    ]
}

/// Validation-only outcome of the build+overlap stages: once either fails,
/// downstream stages never create/update anything (spec.md §4.E "Build":
/// "downstream stages then skip any create/update").
pub struct ValidationOutcome {
    pub ok: bool,
    pub condition: Condition,
}

const VALIDATION_CONDITION_TYPE: &str = "ValidPolicySpec";

pub fn validate_build(subscription_error: Option<&str>, operator_group_error: Option<&str>, overlappers: &[String]) -> ValidationOutcome {
    let mut errors = Vec::new();
    if let Some(e) = subscription_error {
        errors.push(e.to_string());
    }
    if let Some(e) = operator_group_error {
        errors.push(e.to_string());
    }
    if !overlappers.is_empty() {
        errors.push(format!("the specified operator is managed by multiple policies ({})", overlappers.join(", ")));
    }

    if errors.is_empty() {
        ValidationOutcome {
            ok: true,
            condition: Condition::new(VALIDATION_CONDITION_TYPE, crate::models::condition::ConditionStatus::True, "Validated", "the policy spec is valid"),
        }
    } else {
        ValidationOutcome {
            ok: false,
            condition: Condition::new(VALIDATION_CONDITION_TYPE, crate::models::condition::ConditionStatus::False, "InvalidPolicySpec", errors.join("; ")),
        }
    }
}

/// Apply every stage condition gathered by the caller (each stage runs its
/// own pure decision function and performs any cluster writes the decision
/// implies), fold the overall Compliant condition, and report whether it
/// changed (spec.md §4.G).
pub fn finalize_status(status: &mut OperatorPolicyStatus, stage_conditions: Vec<Condition>) -> bool {
    let mut changed = false;
    for condition in stage_conditions {
        if apply_condition_update(&mut status.conditions, condition, &aspects()).compliance_changed {
            changed = true;
        }
    }

    let overall = crate::status::calculate_compliance_condition(&status.conditions, &aspects());
    status.compliant = Some(if overall.status == crate::models::condition::ConditionStatus::True {
        ComplianceState::Compliant
    } else {
        ComplianceState::NonCompliant
    });

    changed
}
