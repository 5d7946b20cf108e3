use policy_reconciler::controller::operator_policy::finalize_status;
use policy_reconciler::models::compliance::ComplianceState;
use policy_reconciler::models::condition::{
    append_condition, merge_related_objects_for_kind, Condition, ConditionStatus, ObjectProperties, ObjectResource, RelatedObject,
};
use policy_reconciler::models::operator_policy::{
    OperatorPolicyStatus, CATALOG_SOURCE_CONDITION_TYPE, CSV_CONDITION_TYPE, DEPLOYMENT_CONDITION_TYPE,
    INSTALL_PLAN_CONDITION_TYPE, OP_GROUP_CONDITION_TYPE, SUBSCRIPTION_CONDITION_TYPE,
};
use policy_reconciler::status::{build_compliance_event, EventOwner, EventType};

/// All six aspects the overall `Compliant` condition folds over
/// (`controller::operator_policy::aspects`), each reporting healthy.
fn all_aspects_true() -> Vec<Condition> {
    vec![
        Condition::new(OP_GROUP_CONDITION_TYPE, ConditionStatus::True, "OperatorGroupMatches", "og ok"),
        Condition::new(SUBSCRIPTION_CONDITION_TYPE, ConditionStatus::True, "SubscriptionMatches", "sub ok"),
        Condition::new(INSTALL_PLAN_CONDITION_TYPE, ConditionStatus::True, "NoInstallPlansRequiringApproval", "ip ok"),
        Condition::new(CSV_CONDITION_TYPE, ConditionStatus::True, "InstallSucceeded", "csv ok"),
        Condition::new(DEPLOYMENT_CONDITION_TYPE, ConditionStatus::True, "DeploymentAvailable", "deploy ok"),
        Condition::new(CATALOG_SOURCE_CONDITION_TYPE, ConditionStatus::True, "CatalogSourcesFound", "catalog ok"),
    ]
}

// `src/status/mod.rs` already unit-tests `calculate_compliance_condition` and
// `update_condition` in isolation. These exercise the Compliance Status
// Engine the way `controller::operator_policy::finalize_status` actually
// drives it across repeated evaluations, and the related-object merge
// invariants spec.md §3 calls out.

fn owner() -> EventOwner {
    EventOwner {
        kind: "Policy".into(),
        name: "parent".into(),
        uid: "abc-123".into(),
        api_version: "policy.open-cluster-management.io/v1".into(),
    }
}

#[test]
fn finalize_status_is_idempotent_on_unchanged_aspect_conditions() {
    let mut status = OperatorPolicyStatus::default();

    let first_changed = finalize_status(&mut status, all_aspects_true());
    assert!(first_changed, "first application from a default status should register as a change");
    assert_eq!(status.compliant, Some(ComplianceState::Compliant));

    let second_changed = finalize_status(&mut status, all_aspects_true());
    assert!(!second_changed, "re-applying the same aspect conditions should not re-trigger a compliance transition");
}

#[test]
fn finalize_status_flips_to_noncompliant_when_an_aspect_regresses() {
    let mut status = OperatorPolicyStatus::default();
    finalize_status(&mut status, all_aspects_true());
    assert_eq!(status.compliant, Some(ComplianceState::Compliant));

    let changed = finalize_status(&mut status, vec![Condition::new(SUBSCRIPTION_CONDITION_TYPE, ConditionStatus::False, "SubscriptionDrift", "sub drifted")]);

    assert!(changed);
    assert_eq!(status.compliant, Some(ComplianceState::NonCompliant));
}

#[test]
fn compliance_event_is_only_built_when_finalize_status_reports_a_change() {
    let mut status = OperatorPolicyStatus::default();
    let changed = finalize_status(&mut status, all_aspects_true());
    assert!(changed);

    let overall = status.get_condition("Compliant").cloned().unwrap();
    let event = build_compliance_event(Some(owner()), "operators", "my-policy", &overall).unwrap();
    assert_eq!(event.event_type, EventType::Normal);
    assert_eq!(event.reason, "policy: operators/my-policy");

    // Re-applying the same conditions: finalize_status reports no change, so
    // the caller (controller::mod.rs's per-pass loop) skips emitting again.
    let unchanged = finalize_status(&mut status, all_aspects_true());
    assert!(!unchanged);
}

#[test]
fn append_condition_dedupes_only_against_the_immediately_preceding_entry() {
    let mut conditions = vec![];
    append_condition(&mut conditions, Condition::new("template-cm", ConditionStatus::True, "K8sResourceFound", "matches"));
    append_condition(&mut conditions, Condition::new("template-cm", ConditionStatus::False, "K8sResourceNotFound", "missing"));
    // Identical to the first entry, but not the immediately preceding one:
    // the one-entry dedup window means this is appended, not dropped.
    append_condition(&mut conditions, Condition::new("template-cm", ConditionStatus::True, "K8sResourceFound", "matches"));

    assert_eq!(conditions.len(), 3);

    // A true repeat of the last entry is dropped.
    append_condition(&mut conditions, Condition::new("template-cm", ConditionStatus::True, "K8sResourceFound", "matches"));
    assert_eq!(conditions.len(), 3);
}

fn related(kind: &str, name: &str, created_by_policy: Option<bool>) -> RelatedObject {
    RelatedObject {
        object: ObjectResource { api_version: "v1".into(), kind: kind.into(), namespace: Some("ns1".into()), name: name.into() },
        compliant: "Compliant".into(),
        reason: "resource found as expected".into(),
        properties: created_by_policy.map(|v| ObjectProperties { created_by_policy: Some(v), uid: None }),
    }
}

#[test]
fn related_object_merge_preserves_other_kinds_and_carries_created_by_policy_forward() {
    let previous = vec![related("Deployment", "dep1", None), related("ConfigMap", "cfg1", Some(true))];

    // A fresh read of ConfigMaps lost the createdByPolicy flag (the cluster
    // read can't re-derive "we created this"), but the invariant says it's
    // monotonic once set.
    let fresh = vec![related("ConfigMap", "cfg1", None)];

    let merged = merge_related_objects_for_kind(&previous, "ConfigMap", fresh);

    assert_eq!(merged.len(), 2, "the unrelated Deployment entry must survive the ConfigMap-only merge");
    let cfg = merged.iter().find(|o| o.object.kind == "ConfigMap").unwrap();
    assert_eq!(cfg.properties.as_ref().and_then(|p| p.created_by_policy), Some(true));
}

#[test]
fn related_objects_are_sorted_by_kind_namespace_name_after_merge() {
    let previous = vec![];
    let fresh = vec![related("ConfigMap", "zeta", None), related("ConfigMap", "alpha", None)];

    let merged = merge_related_objects_for_kind(&previous, "ConfigMap", fresh);

    let names: Vec<&str> = merged.iter().map(|o| o.object.name.as_str()).collect();
    assert_eq!(names, vec!["alpha", "zeta"]);
}
