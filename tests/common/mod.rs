// Shared fixtures for the policy-reconciler integration tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use policy_reconciler::controller::configuration_policy::ClusterStore;
use policy_reconciler::depclient::{DependencyWatcher, Gvk, ObjectIdentifier};
use policy_reconciler::locator::DiscoverySnapshot;
use policy_reconciler::models::compliance::{ComplianceType, RemediationAction};
use policy_reconciler::models::configuration_policy::{ConfigurationPolicySpec, NamespaceSelector, ObjectTemplate};
use serde_json::Value;

/// Builds a minimal ConfigurationPolicy spec with a single object template.
pub fn make_configuration_policy_spec(remediation_action: RemediationAction, object: Value) -> ConfigurationPolicySpec {
    ConfigurationPolicySpec {
        remediation_action,
        namespace_selector: None,
        object_templates: vec![ObjectTemplate {
            compliance_type: ComplianceType::Musthave,
            metadata_compliance_type: None,
            object_definition: object,
        }],
    }
}

pub fn make_namespace_selector(include: &[&str], exclude: &[&str]) -> NamespaceSelector {
    NamespaceSelector {
        include: include.iter().map(|s| s.to_string()).collect(),
        exclude: exclude.iter().map(|s| s.to_string()).collect(),
    }
}

/// An in-memory [`ClusterStore`] keyed by (group/version/resource,
/// namespace, name), standing in for `kube::Api<DynamicObject>` in tests.
#[derive(Default)]
pub struct FakeClusterStore {
    namespaces: Vec<String>,
    objects: Mutex<HashMap<(String, String, String), Value>>,
}

impl FakeClusterStore {
    pub fn new(namespaces: Vec<String>) -> Self {
        Self { namespaces, objects: Mutex::new(HashMap::new()) }
    }

    fn key(group: &str, version: &str, resource: &str, namespace: Option<&str>, name: &str) -> (String, String, String) {
        (format!("{group}/{version}/{resource}"), namespace.unwrap_or("").to_string(), name.to_string())
    }

    pub fn seed(&self, group: &str, version: &str, resource: &str, namespace: Option<&str>, name: &str, object: Value) {
        self.objects.lock().unwrap().insert(Self::key(group, version, resource, namespace, name), object);
    }

    pub fn contains(&self, group: &str, version: &str, resource: &str, namespace: Option<&str>, name: &str) -> bool {
        self.objects.lock().unwrap().contains_key(&Self::key(group, version, resource, namespace, name))
    }
}

#[async_trait]
impl ClusterStore for FakeClusterStore {
    async fn list_namespaces(&self) -> anyhow::Result<Vec<String>> {
        Ok(self.namespaces.clone())
    }

    async fn get_named(&self, group: &str, version: &str, resource: &str, namespace: Option<&str>, name: &str) -> anyhow::Result<Option<Value>> {
        Ok(self.objects.lock().unwrap().get(&Self::key(group, version, resource, namespace, name)).cloned())
    }

    async fn list_all(&self, group: &str, version: &str, resource: &str, namespace: Option<&str>) -> anyhow::Result<Vec<Value>> {
        let prefix = format!("{group}/{version}/{resource}");
        let ns = namespace.unwrap_or("").to_string();
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|((key, object_ns, _), _)| key == &prefix && object_ns == &ns)
            .map(|(_, v)| v.clone())
            .collect())
    }

    async fn create(&self, group: &str, version: &str, resource: &str, namespace: Option<&str>, object: Value) -> anyhow::Result<()> {
        let name = object.pointer("/metadata/name").and_then(Value::as_str).unwrap_or_default().to_string();
        self.objects.lock().unwrap().insert(Self::key(group, version, resource, namespace, &name), object);
        Ok(())
    }

    async fn update(&self, group: &str, version: &str, resource: &str, namespace: Option<&str>, object: Value) -> anyhow::Result<()> {
        self.create(group, version, resource, namespace, object).await
    }

    async fn delete(&self, group: &str, version: &str, resource: &str, namespace: Option<&str>, name: &str) -> anyhow::Result<()> {
        self.objects.lock().unwrap().remove(&Self::key(group, version, resource, namespace, name));
        Ok(())
    }
}

pub fn single_namespaced_snapshot(api_version: &str, kind: &str, group: &str, version: &str, plural: &str) -> DiscoverySnapshot {
    DiscoverySnapshot::new(vec![(
        kube::discovery::ApiResource {
            group: group.to_string(),
            version: version.to_string(),
            api_version: api_version.to_string(),
            kind: kind.to_string(),
            plural: plural.to_string(),
        },
        true,
    )])
}

/// An in-memory [`DependencyWatcher`] that echoes back whatever was seeded,
/// recording every batch/get/list call for assertions.
#[derive(Default)]
pub struct FakeDependencyWatcher {
    objects: Mutex<HashMap<(String, String, String, String), Value>>,
    pub batches_started: Mutex<Vec<ObjectIdentifier>>,
    pub batches_ended: Mutex<Vec<ObjectIdentifier>>,
}

impl FakeDependencyWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, gvk: &Gvk, namespace: Option<&str>, name: &str, object: Value) {
        let key = (gvk.group.clone(), gvk.kind.clone(), namespace.unwrap_or("").to_string(), name.to_string());
        self.objects.lock().unwrap().insert(key, object);
    }
}

#[async_trait]
impl DependencyWatcher for FakeDependencyWatcher {
    async fn start_query_batch(&self, id: &ObjectIdentifier) {
        self.batches_started.lock().unwrap().push(id.clone());
    }

    async fn end_query_batch(&self, id: &ObjectIdentifier) {
        self.batches_ended.lock().unwrap().push(id.clone());
    }

    async fn get(&self, _id: &ObjectIdentifier, gvk: &Gvk, namespace: Option<&str>, name: &str) -> Option<Value> {
        let key = (gvk.group.clone(), gvk.kind.clone(), namespace.unwrap_or("").to_string(), name.to_string());
        self.objects.lock().unwrap().get(&key).cloned()
    }

    async fn list(&self, _id: &ObjectIdentifier, gvk: &Gvk, namespace: Option<&str>, _label_selector: Option<&str>) -> Vec<Value> {
        let ns = namespace.unwrap_or("").to_string();
        self.objects
            .lock()
            .unwrap()
            .iter()
            .filter(|((group, kind, object_ns, _), _)| group == &gvk.group && kind == &gvk.kind && object_ns == &ns)
            .map(|(_, v)| v.clone())
            .collect()
    }

    async fn remove_watcher(&self, _id: &ObjectIdentifier) {}
}

