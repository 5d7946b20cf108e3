//! Install Plan stage (spec.md §4.E "Install Plan"; grounds Go's
//! `handleInstallPlan`/`musthaveInstallPlan`).

use crate::models::condition::{Condition, ConditionStatus};
use crate::models::operator_policy::INSTALL_PLAN_CONDITION_TYPE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Installing,
    RequiresApproval,
    Failed,
    Complete,
}

#[derive(Debug, Clone)]
pub struct FoundInstallPlan {
    pub name: String,
    pub phase: Phase,
    pub csv_names: Vec<String>,
    pub is_current: bool,
}

pub struct InstallPlanDecision {
    pub condition: Condition,
    /// Name of the single install plan to set `spec.approved = true` on.
    pub approve: Option<String>,
}

fn condition(status: ConditionStatus, reason: &str, message: impl Into<String>) -> Condition {
    Condition::new(INSTALL_PLAN_CONDITION_TYPE, status, reason, message)
}

/// The approvable set: install plans naming exactly one CSV that's either
/// unconstrained (`versions` empty), explicitly pinned, or the
/// subscription's `startingCSV` (spec.md §4.E "Install Plan").
fn is_approvable(plan: &FoundInstallPlan, versions: &[String], starting_csv: Option<&str>) -> bool {
    let [csv] = plan.csv_names.as_slice() else { return false };
    versions.is_empty() || versions.iter().any(|v| v == csv) || starting_csv == Some(csv.as_str())
}

/// `handleInstallPlan`/`musthaveInstallPlan` (spec.md §4.E "Install Plan").
/// `initial_install` and `automatic_upgrade` gate whether an upgrade being
/// available is even actionable; `inform` always just reports.
pub fn handle(
    plans: &[FoundInstallPlan],
    inform: bool,
    initial_install: bool,
    automatic_upgrade: bool,
    versions: &[String],
    starting_csv: Option<&str>,
) -> InstallPlanDecision {
    if let Some(failed) = plans.iter().find(|p| p.is_current && p.phase == Phase::Failed) {
        return InstallPlanDecision {
            condition: condition(ConditionStatus::False, "InstallPlanFailed", format!("the install plan {} failed", failed.name)),
            approve: None,
        };
    }

    if plans.iter().any(|p| p.phase == Phase::Installing) {
        return InstallPlanDecision {
            condition: condition(ConditionStatus::True, "InstallPlanInProgress", "the install plan is installing"),
            approve: None,
        };
    }

    let requires_approval: Vec<&FoundInstallPlan> = plans.iter().filter(|p| p.phase == Phase::RequiresApproval).collect();
    if requires_approval.is_empty() {
        return InstallPlanDecision {
            condition: condition(ConditionStatus::True, "NoInstallPlansRequireApproval", "there are no install plans requiring approval"),
            approve: None,
        };
    }

    if inform || !(initial_install || automatic_upgrade) {
        let versions: Vec<&str> = requires_approval.iter().flat_map(|p| p.csv_names.iter().map(String::as_str)).collect();
        return InstallPlanDecision {
            condition: condition(ConditionStatus::False, "UpgradeAvailable", format!("an upgrade is available: {}", versions.join(", "))),
            approve: None,
        };
    }

    let approvable: Vec<&FoundInstallPlan> = requires_approval
        .iter()
        .copied()
        .filter(|p| is_approvable(p, versions, starting_csv))
        .collect();

    match approvable.as_slice() {
        [only] => InstallPlanDecision {
            condition: condition(ConditionStatus::True, "InstallPlanApproved", format!("the install plan {} was approved", only.name)),
            approve: Some(only.name.clone()),
        },
        _ => InstallPlanDecision {
            condition: condition(ConditionStatus::False, "UpgradeAvailable", "an upgrade is available but could not be unambiguously approved"),
            approve: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(name: &str, phase: Phase, csvs: &[&str]) -> FoundInstallPlan {
        FoundInstallPlan { name: name.into(), phase, csv_names: csvs.iter().map(|s| s.to_string()).collect(), is_current: true }
    }

    #[test]
    fn failed_current_plan_is_noncompliant() {
        let plans = vec![plan("ip1", Phase::Failed, &["op.v1"])];
        let decision = handle(&plans, false, true, false, &[], None);
        assert_eq!(decision.condition.reason, "InstallPlanFailed");
    }

    #[test]
    fn single_approvable_plan_is_approved_on_initial_install() {
        let plans = vec![plan("ip1", Phase::RequiresApproval, &["op.v1"])];
        let decision = handle(&plans, false, true, false, &[], None);
        assert_eq!(decision.approve.as_deref(), Some("ip1"));
    }

    #[test]
    fn inform_never_approves() {
        let plans = vec![plan("ip1", Phase::RequiresApproval, &["op.v1"])];
        let decision = handle(&plans, true, true, false, &[], None);
        assert!(decision.approve.is_none());
        assert_eq!(decision.condition.reason, "UpgradeAvailable");
    }

    #[test]
    fn ambiguous_approvable_set_is_never_guessed() {
        let plans = vec![
            plan("ip1", Phase::RequiresApproval, &["op.v1"]),
            plan("ip2", Phase::RequiresApproval, &["op.v2"]),
        ];
        let decision = handle(&plans, false, true, false, &[], None);
        assert!(decision.approve.is_none());
    }
}
