//! `kube::Api<DynamicObject>`-backed [`ClusterStore`], the live-cluster
//! implementation of the seam the evaluator pipeline mutates through
//! (grounds Go's `dynamicClient`/`getResourceAndDynamicClient`).

use async_trait::async_trait;
use kube::api::{ApiResource, DynamicObject, ListParams, Patch, PatchParams, PostParams};
use kube::{Api, Client};
use serde_json::Value;

use crate::controller::configuration_policy::ClusterStore;
use crate::depclient::{DependencyWatcher, Gvk, ObjectIdentifier};

const FIELD_MANAGER: &str = "policy-reconciler";

/// Builds the `Api<DynamicObject>` for a GVR/namespace pair the way
/// `locate()` describes it.
fn dynamic_api(client: &Client, group: &str, version: &str, resource: &str, namespace: Option<&str>) -> Api<DynamicObject> {
    let ar = ApiResource {
        group: group.to_string(),
        version: version.to_string(),
        api_version: if group.is_empty() { version.to_string() } else { format!("{group}/{version}") },
        kind: resource.to_string(),
        plural: resource.to_string(),
    };

    match namespace.filter(|ns| !ns.is_empty()) {
        Some(ns) => Api::namespaced_with(client.clone(), ns, &ar),
        None => Api::all_with(client.clone(), &ar),
    }
}

pub struct KubeClusterStore {
    client: Client,
}

impl KubeClusterStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClusterStore for KubeClusterStore {
    async fn list_namespaces(&self) -> anyhow::Result<Vec<String>> {
        let api: Api<k8s_openapi::api::core::v1::Namespace> = Api::all(self.client.clone());
        let list = api.list(&ListParams::default()).await?;
        Ok(list.items.into_iter().filter_map(|ns| ns.metadata.name).collect())
    }

    async fn get_named(
        &self,
        group: &str,
        version: &str,
        resource: &str,
        namespace: Option<&str>,
        name: &str,
    ) -> anyhow::Result<Option<Value>> {
        let api = dynamic_api(&self.client, group, version, resource, namespace);
        match api.get(name).await {
            Ok(obj) => Ok(Some(serde_json::to_value(obj)?)),
            Err(kube::Error::Api(err)) if err.code == 404 => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn list_all(
        &self,
        group: &str,
        version: &str,
        resource: &str,
        namespace: Option<&str>,
    ) -> anyhow::Result<Vec<Value>> {
        let api = dynamic_api(&self.client, group, version, resource, namespace);
        let list = api.list(&ListParams::default()).await?;
        list.items.into_iter().map(|obj| serde_json::to_value(obj).map_err(Into::into)).collect()
    }

    async fn create(
        &self,
        group: &str,
        version: &str,
        resource: &str,
        namespace: Option<&str>,
        object: Value,
    ) -> anyhow::Result<()> {
        let api = dynamic_api(&self.client, group, version, resource, namespace);
        let obj: DynamicObject = serde_json::from_value(object)?;
        api.create(&PostParams::default(), &obj).await?;
        Ok(())
    }

    async fn update(
        &self,
        group: &str,
        version: &str,
        resource: &str,
        namespace: Option<&str>,
        object: Value,
    ) -> anyhow::Result<()> {
        let api = dynamic_api(&self.client, group, version, resource, namespace);
        let name = object
            .pointer("/metadata/name")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("object has no metadata.name to update"))?
            .to_string();
        api.patch(&name, &PatchParams::apply(FIELD_MANAGER).force(), &Patch::Apply(&object)).await?;
        Ok(())
    }

    async fn delete(
        &self,
        group: &str,
        version: &str,
        resource: &str,
        namespace: Option<&str>,
        name: &str,
    ) -> anyhow::Result<()> {
        let api = dynamic_api(&self.client, group, version, resource, namespace);
        api.delete(name, &Default::default()).await?;
        Ok(())
    }
}

/// Production [`DependencyWatcher`]: a direct `kube::Api<DynamicObject>`
/// read per `get`/`list` call. The watcher library's actual caching watch
/// set is out of scope (spec.md §1 Non-goals), so `start_query_batch`/
/// `end_query_batch`/`remove_watcher` are no-ops here — this type exists to
/// give the evaluator pipeline a real implementation of the contract rather
/// than leaving it fully unexercised outside of tests.
pub struct KubeDependencyWatcher {
    client: Client,
}

impl KubeDependencyWatcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DependencyWatcher for KubeDependencyWatcher {
    async fn start_query_batch(&self, _id: &ObjectIdentifier) {}

    async fn end_query_batch(&self, _id: &ObjectIdentifier) {}

    async fn get(&self, _id: &ObjectIdentifier, gvk: &Gvk, namespace: Option<&str>, name: &str) -> Option<Value> {
        let api = dynamic_api(&self.client, &gvk.group, &gvk.version, &gvk.kind, namespace);
        match api.get(name).await {
            Ok(obj) => serde_json::to_value(obj).ok(),
            Err(_) => None,
        }
    }

    async fn list(&self, _id: &ObjectIdentifier, gvk: &Gvk, namespace: Option<&str>, label_selector: Option<&str>) -> Vec<Value> {
        let api = dynamic_api(&self.client, &gvk.group, &gvk.version, &gvk.kind, namespace);
        let mut lp = ListParams::default();
        if let Some(selector) = label_selector {
            lp = lp.labels(selector);
        }
        match api.list(&lp).await {
            Ok(list) => list.items.into_iter().filter_map(|obj| serde_json::to_value(obj).ok()).collect(),
            Err(_) => Vec::new(),
        }
    }

    async fn remove_watcher(&self, _id: &ObjectIdentifier) {}
}
