//! Dependency Watcher external interface (spec.md §6).
//!
//! The watcher library itself — the thing that keeps a consistent,
//! server-side-cached view of watched objects per policy — is explicitly out
//! of scope (spec.md §1 Non-goals). This module only pins down its contract
//! so the evaluators can be written against a trait object, the way the
//! teacher's controllers are written against `kube::Api` rather than the
//! raw HTTP client.

use async_trait::async_trait;
use serde_json::Value;

/// One watcher identity per policy, keyed by (group, kind, namespace, name)
/// — spec.md §6: "One watcher identity per policy keyed by
/// (group=policy.open-cluster-management.io,
/// kind=ConfigurationPolicy|OperatorPolicy, namespace, name)".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectIdentifier {
    pub group: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl ObjectIdentifier {
    pub fn for_policy(kind: &str, namespace: &str, name: &str) -> Self {
        Self {
            group: "policy.open-cluster-management.io".to_string(),
            kind: kind.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Gvk {
    pub group: String,
    pub version: String,
    pub kind: String,
}

/// `StartQueryBatch`/`EndQueryBatch`/`Get`/`List`/`RemoveWatcher` —
/// spec.md §6. Each `Reconcile` opens a batch, issues `get`/`list` calls
/// that become the policy's new watch set, and closes the batch on exit,
/// atomically replacing the previous watch set (spec.md §5).
#[async_trait]
pub trait DependencyWatcher: Send + Sync {
    async fn start_query_batch(&self, id: &ObjectIdentifier);
    async fn end_query_batch(&self, id: &ObjectIdentifier);
    async fn get(
        &self,
        id: &ObjectIdentifier,
        gvk: &Gvk,
        namespace: Option<&str>,
        name: &str,
    ) -> Option<Value>;
    async fn list(
        &self,
        id: &ObjectIdentifier,
        gvk: &Gvk,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> Vec<Value>;
    async fn remove_watcher(&self, id: &ObjectIdentifier);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_identifier_uses_the_policy_group() {
        let id = ObjectIdentifier::for_policy("OperatorPolicy", "ns1", "pol1");
        assert_eq!(id.group, "policy.open-cluster-management.io");
        assert_eq!(id.kind, "OperatorPolicy");
    }
}
