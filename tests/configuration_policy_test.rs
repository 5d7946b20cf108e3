mod common;

use std::sync::Arc;

use common::{make_configuration_policy_spec, make_namespace_selector, single_namespaced_snapshot, FakeClusterStore, FakeDependencyWatcher};
use policy_reconciler::controller::configuration_policy::{evaluate, WatchedClusterStore};
use policy_reconciler::depclient::{DependencyWatcher, Gvk, ObjectIdentifier};
use policy_reconciler::models::compliance::{ComplianceState, RemediationAction};
use policy_reconciler::models::configuration_policy::ConfigurationPolicyStatus;
use policy_reconciler::template::{EncryptionKeyCache, NoopResolver};
use serde_json::json;

fn cm_object(name: &str, namespace: &str, value: &str) -> serde_json::Value {
    json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": { "name": name, "namespace": namespace },
        "data": { "key": value },
    })
}

/// A ConfigMap template with no `metadata.namespace`, letting the namespace
/// selector expansion pick the namespace instead.
fn unscoped_cm_object(name: &str, value: &str) -> serde_json::Value {
    json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": { "name": name },
        "data": { "key": value },
    })
}

#[tokio::test]
async fn enforcing_policy_creates_a_missing_configmap_and_reports_compliant() {
    let store = FakeClusterStore::new(vec!["ns1".to_string()]);
    let snapshot = single_namespaced_snapshot("v1", "ConfigMap", "", "v1", "configmaps");

    let spec = make_configuration_policy_spec(RemediationAction::Enforce, cm_object("cfg1", "ns1", "hello"));

    let outcome = evaluate(&spec, ConfigurationPolicyStatus::default(), "policies", "demo-policy", &store, &NoopResolver, &snapshot, None, None, &EncryptionKeyCache::new()).await;

    assert_eq!(outcome.status.compliant, Some(ComplianceState::Compliant));
    assert!(store.contains("", "v1", "configmaps", Some("ns1"), "cfg1"));
}

#[tokio::test]
async fn informing_policy_never_touches_the_cluster() {
    let store = FakeClusterStore::new(vec!["ns1".to_string()]);
    let snapshot = single_namespaced_snapshot("v1", "ConfigMap", "", "v1", "configmaps");

    let spec = make_configuration_policy_spec(RemediationAction::Inform, cm_object("cfg2", "ns1", "hello"));

    let outcome = evaluate(&spec, ConfigurationPolicyStatus::default(), "policies", "demo-policy", &store, &NoopResolver, &snapshot, None, None, &EncryptionKeyCache::new()).await;

    assert_eq!(outcome.status.compliant, Some(ComplianceState::NonCompliant));
    assert!(!store.contains("", "v1", "configmaps", Some("ns1"), "cfg2"));
}

#[tokio::test]
async fn already_matching_object_is_compliant_without_a_cluster_write() {
    let store = FakeClusterStore::new(vec!["ns1".to_string()]);
    store.seed("", "v1", "configmaps", Some("ns1"), "cfg3", cm_object("cfg3", "ns1", "hello"));
    let snapshot = single_namespaced_snapshot("v1", "ConfigMap", "", "v1", "configmaps");

    let spec = make_configuration_policy_spec(RemediationAction::Inform, cm_object("cfg3", "ns1", "hello"));

    let outcome = evaluate(&spec, ConfigurationPolicyStatus::default(), "policies", "demo-policy", &store, &NoopResolver, &snapshot, None, None, &EncryptionKeyCache::new()).await;

    assert_eq!(outcome.status.compliant, Some(ComplianceState::Compliant));
}

#[tokio::test]
async fn unset_remediation_action_is_noncompliant_before_any_evaluation() {
    let store = FakeClusterStore::new(vec!["ns1".to_string()]);
    let snapshot = single_namespaced_snapshot("v1", "ConfigMap", "", "v1", "configmaps");

    let spec = make_configuration_policy_spec(RemediationAction::Unset, cm_object("cfg4", "ns1", "hello"));

    let outcome = evaluate(&spec, ConfigurationPolicyStatus::default(), "policies", "demo-policy", &store, &NoopResolver, &snapshot, None, None, &EncryptionKeyCache::new()).await;

    assert_eq!(outcome.status.compliant, Some(ComplianceState::NonCompliant));
    assert_eq!(outcome.status.template_statuses[0].conditions[0].reason, "No RemediationAction");
}

#[tokio::test]
async fn namespace_selector_expands_across_every_matching_namespace() {
    let store = FakeClusterStore::new(vec!["team-a".to_string(), "team-b".to_string(), "kube-system".to_string()]);
    let snapshot = single_namespaced_snapshot("v1", "ConfigMap", "", "v1", "configmaps");

    let mut spec = make_configuration_policy_spec(RemediationAction::Enforce, unscoped_cm_object("shared", "hello"));
    spec.namespace_selector = Some(make_namespace_selector(&["team-*"], &[]));

    let outcome = evaluate(&spec, ConfigurationPolicyStatus::default(), "policies", "demo-policy", &store, &NoopResolver, &snapshot, None, None, &EncryptionKeyCache::new()).await;

    assert_eq!(outcome.status.compliant, Some(ComplianceState::Compliant));
    assert!(store.contains("", "v1", "configmaps", Some("team-a"), "shared"));
    assert!(store.contains("", "v1", "configmaps", Some("team-b"), "shared"));
    assert!(!store.contains("", "v1", "configmaps", Some("kube-system"), "shared"));
}

#[tokio::test]
async fn evaluation_through_the_dependency_watcher_reads_its_watch_set_not_the_cluster_store() {
    let inner = FakeClusterStore::new(vec!["ns1".to_string()]);
    let watcher = Arc::new(FakeDependencyWatcher::new());
    watcher.seed(
        &Gvk { group: String::new(), version: "v1".to_string(), kind: "ConfigMap".to_string() },
        Some("ns1"),
        "cfg5",
        cm_object("cfg5", "ns1", "hello"),
    );

    let id = ObjectIdentifier::for_policy("ConfigurationPolicy", "ns1", "demo-policy");
    watcher.start_query_batch(&id).await;
    let store = WatchedClusterStore::new(&inner, watcher.clone(), id.clone());
    let snapshot = single_namespaced_snapshot("v1", "ConfigMap", "", "v1", "configmaps");

    let spec = make_configuration_policy_spec(RemediationAction::Inform, cm_object("cfg5", "ns1", "hello"));
    let outcome = evaluate(&spec, ConfigurationPolicyStatus::default(), "ns1", "demo-policy", &store, &NoopResolver, &snapshot, None, None, &EncryptionKeyCache::new()).await;
    watcher.end_query_batch(&id).await;

    assert_eq!(outcome.status.compliant, Some(ComplianceState::Compliant));
    assert_eq!(watcher.batches_started.lock().unwrap().len(), 1);
    assert_eq!(watcher.batches_ended.lock().unwrap().len(), 1);
}
