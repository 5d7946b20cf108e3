use policy_reconciler::models::compliance::{RemediationAction, UpgradeApproval};
use serde_json::json;

// `operator_policy_evaluator::evaluate` talks to a live `kube::Client` and
// isn't exercised here; these tests compose the pure pipeline stages the way
// the evaluator does, the same boundary `configuration_policy`'s own unit
// tests draw around `ClusterStore`.
use policy_reconciler::controller::operator_policy::build::{build_operator_group, build_subscription};
use policy_reconciler::controller::operator_policy::olm::check_overlap;
use policy_reconciler::controller::operator_policy::operator_group::{self, FoundOperatorGroup};
use policy_reconciler::controller::operator_policy::subscription::{self, FoundSubscription};
use policy_reconciler::controller::operator_policy::{finalize_status, validate_build};
use policy_reconciler::models::condition::ConditionStatus;
use policy_reconciler::models::operator_policy::OperatorPolicyStatus;

#[test]
fn build_overlap_and_operator_group_pipeline_reports_compliant_for_a_fresh_install() {
    let raw_sub = json!({"name": "my-operator", "namespace": "operators", "channel": "stable", "source": "redhat-operators", "sourceNamespace": "openshift-marketplace"});
    let built_sub = build_subscription(&raw_sub, "", RemediationAction::Enforce, UpgradeApproval::Manual, &[], None).unwrap();
    let built_og = build_operator_group(None, &built_sub.namespace).unwrap();

    let overlap = check_overlap("my-policy", "operators", Some(&built_sub.name), &[]);
    assert!(overlap.overlappers.is_empty());

    let validation = validate_build(None, None, &overlap.overlappers);
    assert!(validation.ok);

    let og_decision = operator_group::musthave(&[], &built_og, true);
    assert_eq!(og_decision.condition.reason, "OperatorGroupCreated");

    let sub_decision = subscription::musthave(None, &built_sub, true);
    assert_eq!(sub_decision.condition.status, ConditionStatus::True);

    let mut status = OperatorPolicyStatus::default();
    finalize_status(&mut status, vec![og_decision.condition, sub_decision.condition]);
    assert_eq!(status.compliant, Some(policy_reconciler::models::compliance::ComplianceState::Compliant));
}

#[test]
fn overlapping_subscriptions_fail_validation_before_any_stage_runs() {
    let raw_sub = json!({"name": "shared-operator", "namespace": "operators"});
    let built_sub = build_subscription(&raw_sub, "", RemediationAction::Inform, UpgradeApproval::Manual, &[], None).unwrap();

    let others = vec![("other-policy".to_string(), "operators".to_string(), "shared-operator.operators".to_string())];
    let overlap = check_overlap("my-policy", "operators", Some(&built_sub.name), &others);
    assert_eq!(overlap.overlappers.len(), 2);

    let validation = validate_build(None, None, &overlap.overlappers);
    assert!(!validation.ok);
    assert!(validation.condition.message.contains("managed by multiple policies"));
}

#[test]
fn subscription_drift_triggers_an_update_decision_when_enforcing() {
    let raw_sub = json!({"name": "my-operator", "namespace": "operators", "channel": "fast"});
    let built_sub = build_subscription(&raw_sub, "", RemediationAction::Enforce, UpgradeApproval::Manual, &[], None).unwrap();

    let found = FoundSubscription {
        name: "my-operator".to_string(),
        channel: Some("stable".to_string()),
        source: None,
        source_namespace: None,
        resolution_failed_reason: None,
        resolution_failed_message: None,
    };

    let decision = subscription::musthave(Some(&found), &built_sub, true);
    assert_eq!(decision.condition.status, ConditionStatus::False);
}

#[test]
fn existing_operator_group_with_matching_spec_is_left_alone() {
    let built_og = build_operator_group(None, "operators").unwrap();
    let found = FoundOperatorGroup {
        name: "operators-abc".to_string(),
        target_namespaces: vec![],
        has_owner_references: false,
        has_deletion_timestamp: false,
    };

    let decision = operator_group::musthave(&[found], &built_og, true);
    assert_eq!(decision.condition.status, ConditionStatus::True);
}
