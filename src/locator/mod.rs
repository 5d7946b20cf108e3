//! Resource Locator (spec.md §4.C) and the discovery snapshot it reads from
//! (spec.md §3 "Discovery Snapshot").

use kube::discovery::ApiResource;
use serde_json::Value;
use thiserror::Error;

/// A cached, point-in-time view of cluster API discovery. Replaced
/// atomically by the scheduler each pass (spec.md §5: "discovery snapshot
/// read-only per pass, replaced atomically").
#[derive(Debug, Clone, Default)]
pub struct DiscoverySnapshot {
    resources: Vec<(ApiResource, bool)>, // (resource, namespaced)
}

impl DiscoverySnapshot {
    pub fn new(resources: Vec<(ApiResource, bool)>) -> Self {
        Self { resources }
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    fn find(&self, api_version: &str, kind: &str) -> Option<&(ApiResource, bool)> {
        self.resources
            .iter()
            .find(|(r, _)| r.api_version == api_version && r.kind == kind)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedResource {
    pub group: String,
    pub version: String,
    pub resource: String,
    pub kind: String,
    pub namespaced: bool,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LocatorError {
    #[error("the object has no apiVersion or kind")]
    Undecodable,
    #[error(
        "couldn't find mapping resource with kind {kind}, please check if you have CRD deployed"
    )]
    NoMapping { kind: String },
}

/// Maps a raw object's `apiVersion`/`kind` to a REST resource via the
/// discovery snapshot (spec.md §4.C). On a miss, returns the exact
/// "K8s creation error" message spec.md requires.
pub fn locate(raw: &Value, snapshot: &DiscoverySnapshot) -> Result<LocatedResource, LocatorError> {
    let api_version = raw
        .get("apiVersion")
        .and_then(Value::as_str)
        .ok_or(LocatorError::Undecodable)?;
    let kind = raw
        .get("kind")
        .and_then(Value::as_str)
        .ok_or(LocatorError::Undecodable)?;

    let (resource, namespaced) = snapshot
        .find(api_version, kind)
        .ok_or_else(|| LocatorError::NoMapping { kind: kind.to_string() })?;

    Ok(LocatedResource {
        group: resource.group.clone(),
        version: resource.version.clone(),
        resource: resource.plural.clone(),
        kind: resource.kind.clone(),
        namespaced: *namespaced,
    })
}

/// Extracts `metadata.name`/`metadata.namespace`/`kind` for logging and
/// related-object construction (grounds Go's `getDetails`).
pub fn object_details(raw: &Value) -> (Option<String>, Option<String>, Option<String>) {
    let name = raw
        .pointer("/metadata/name")
        .and_then(Value::as_str)
        .map(str::to_string);
    let namespace = raw
        .pointer("/metadata/namespace")
        .and_then(Value::as_str)
        .map(str::to_string);
    let kind = raw.get("kind").and_then(Value::as_str).map(str::to_string);
    (name, namespace, kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_resource(group: &str, version: &str, kind: &str, plural: &str) -> ApiResource {
        ApiResource {
            group: group.to_string(),
            version: version.to_string(),
            api_version: if group.is_empty() {
                version.to_string()
            } else {
                format!("{group}/{version}")
            },
            kind: kind.to_string(),
            plural: plural.to_string(),
        }
    }

    #[test]
    fn locate_finds_matching_resource() {
        let snapshot = DiscoverySnapshot::new(vec![(
            make_resource("apps", "v1", "Deployment", "deployments"),
            true,
        )]);
        let raw = json!({"apiVersion": "apps/v1", "kind": "Deployment"});
        let located = locate(&raw, &snapshot).unwrap();
        assert_eq!(located.resource, "deployments");
        assert!(located.namespaced);
    }

    #[test]
    fn locate_reports_exact_no_mapping_message() {
        let snapshot = DiscoverySnapshot::default();
        let raw = json!({"apiVersion": "example.com/v1", "kind": "Widget"});
        let err = locate(&raw, &snapshot).unwrap_err();
        assert_eq!(
            err.to_string(),
            "couldn't find mapping resource with kind Widget, please check if you have CRD deployed"
        );
    }

    #[test]
    fn object_details_extracts_name_namespace_kind() {
        let raw = json!({"kind": "ConfigMap", "metadata": {"name": "cm1", "namespace": "ns1"}});
        let (name, namespace, kind) = object_details(&raw);
        assert_eq!(name.as_deref(), Some("cm1"));
        assert_eq!(namespace.as_deref(), Some("ns1"));
        assert_eq!(kind.as_deref(), Some("ConfigMap"));
    }
}
