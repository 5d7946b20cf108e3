//! ConfigurationPolicy Evaluator (spec.md §4.D).
//!
//! Grounds Go's `handleObjectTemplates`/`getPolicyNamespaces`/`handleSingleObj`
//! pipeline. The live cluster is reached only through [`ClusterStore`], kept
//! as a trait object the way `depclient::DependencyWatcher` abstracts the
//! watcher library — so the pipeline can be driven in tests without a real
//! `kube::Api`.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::comparator::{compare_object, ComparisonError};
use crate::depclient::{DependencyWatcher, Gvk, ObjectIdentifier};
use crate::locator::{locate, DiscoverySnapshot, LocatorError};
use crate::models::compliance::{ComplianceState, ComplianceType, RemediationAction};
use crate::models::condition::{
    merge_related_objects_for_kind, sort_and_dedupe_related_objects, Condition, ConditionStatus,
    ObjectProperties, ObjectResource, RelatedObject,
};
use crate::models::configuration_policy::{
    ConfigurationPolicySpec, ConfigurationPolicyStatus, NamespaceSelector, ObjectTemplate,
    TemplateStatus,
};
use crate::status::{append_template_condition, build_compliance_event, ComplianceEvent, EventOwner};
use crate::template::{has_hub_template, has_template, EncryptionKeyCache, TemplateContext, TemplateError, TemplateResolver};

/// The live-cluster seam the evaluator mutates through (grounds Go's
/// `dynamicClient`/`getResourceAndDynamicClient` usage throughout
/// `configurationpolicy_controller.go`).
#[async_trait]
pub trait ClusterStore: Send + Sync {
    async fn list_namespaces(&self) -> anyhow::Result<Vec<String>>;
    async fn get_named(
        &self,
        group: &str,
        version: &str,
        resource: &str,
        namespace: Option<&str>,
        name: &str,
    ) -> anyhow::Result<Option<Value>>;
    async fn list_all(
        &self,
        group: &str,
        version: &str,
        resource: &str,
        namespace: Option<&str>,
    ) -> anyhow::Result<Vec<Value>>;
    async fn create(
        &self,
        group: &str,
        version: &str,
        resource: &str,
        namespace: Option<&str>,
        object: Value,
    ) -> anyhow::Result<()>;
    async fn update(
        &self,
        group: &str,
        version: &str,
        resource: &str,
        namespace: Option<&str>,
        object: Value,
    ) -> anyhow::Result<()>;
    async fn delete(
        &self,
        group: &str,
        version: &str,
        resource: &str,
        namespace: Option<&str>,
        name: &str,
    ) -> anyhow::Result<()>;
}

/// A [`ClusterStore`] whose reads go through a policy's
/// [`DependencyWatcher`] watch set instead of a direct `get`/`list` against
/// the live API (spec.md §6: "StartQueryBatch/Get/List/EndQueryBatch" per
/// reconcile). Namespace listing and mutations still go straight to `inner`,
/// since only reads of policy-managed objects belong in the watch set.
pub struct WatchedClusterStore<'a> {
    inner: &'a dyn ClusterStore,
    watcher: Arc<dyn DependencyWatcher>,
    id: ObjectIdentifier,
}

impl<'a> WatchedClusterStore<'a> {
    pub fn new(inner: &'a dyn ClusterStore, watcher: Arc<dyn DependencyWatcher>, id: ObjectIdentifier) -> Self {
        Self { inner, watcher, id }
    }
}

#[async_trait]
impl<'a> ClusterStore for WatchedClusterStore<'a> {
    async fn list_namespaces(&self) -> anyhow::Result<Vec<String>> {
        self.inner.list_namespaces().await
    }

    async fn get_named(&self, group: &str, version: &str, resource: &str, namespace: Option<&str>, name: &str) -> anyhow::Result<Option<Value>> {
        let gvk = Gvk { group: group.to_string(), version: version.to_string(), kind: resource.to_string() };
        Ok(self.watcher.get(&self.id, &gvk, namespace, name).await)
    }

    async fn list_all(&self, group: &str, version: &str, resource: &str, namespace: Option<&str>) -> anyhow::Result<Vec<Value>> {
        let gvk = Gvk { group: group.to_string(), version: version.to_string(), kind: resource.to_string() };
        Ok(self.watcher.list(&self.id, &gvk, namespace, None).await)
    }

    async fn create(&self, group: &str, version: &str, resource: &str, namespace: Option<&str>, object: Value) -> anyhow::Result<()> {
        self.inner.create(group, version, resource, namespace, object).await
    }

    async fn update(&self, group: &str, version: &str, resource: &str, namespace: Option<&str>, object: Value) -> anyhow::Result<()> {
        self.inner.update(group, version, resource, namespace, object).await
    }

    async fn delete(&self, group: &str, version: &str, resource: &str, namespace: Option<&str>, name: &str) -> anyhow::Result<()> {
        self.inner.delete(group, version, resource, namespace, name).await
    }
}

/// Whether a template resolution error stems from the encryption key cache
/// holding a stale key, warranting one invalidate-and-retry (spec.md §4.D /
/// §7: "AES errors clear cache + report NonCompliant").
fn is_aes_error(err: &TemplateError) -> bool {
    matches!(err, TemplateError::InvalidAESKey | TemplateError::AESKeyNotSet | TemplateError::InvalidIV | TemplateError::InvalidPKCS7Padding)
}

/// The five existence/match outcomes spec.md §4.D enumerates, grounds Go's
/// `createStatus`'s message switch.
fn existence_reason(should_exist: bool, exists: bool, matches: bool) -> &'static str {
    match (should_exist, exists, matches) {
        (true, true, true) => "Resource found as expected",
        (true, true, false) => "Resource found but does not match",
        (true, false, _) => "Resource not found but should exist",
        (false, true, _) => "Resource found but should not exist",
        (false, false, _) => "Resource not found as expected",
    }
}

/// A single `*`-wildcard glob, the only pattern syntax
/// `common.FindPattern` supports in the original namespace selector.
fn glob_match(pattern: &str, text: &str) -> bool {
    fn inner(p: &[u8], t: &[u8]) -> bool {
        match p.first() {
            None => t.is_empty(),
            Some(b'*') => inner(&p[1..], t) || (!t.is_empty() && inner(p, &t[1..])),
            Some(c) => t.first() == Some(c) && inner(&p[1..], &t[1..]),
        }
    }
    inner(pattern.as_bytes(), text.as_bytes())
}

/// `getPolicyNamespaces`: expand include/exclude glob patterns against the
/// live namespace list, dedupe, and fall back to `[""]` (cluster-scoped) if
/// nothing matched (spec.md §4.D item 2).
pub fn resolve_namespaces(selector: Option<&NamespaceSelector>, live_namespaces: &[String]) -> Vec<String> {
    let Some(selector) = selector else {
        return vec![String::new()];
    };

    let matched = |patterns: &[String]| -> Vec<String> {
        let mut out: Vec<String> = live_namespaces
            .iter()
            .filter(|ns| patterns.iter().any(|p| glob_match(p, ns)))
            .cloned()
            .collect();
        out.sort();
        out.dedup();
        out
    };

    let included = matched(&selector.include);
    let excluded = matched(&selector.exclude);

    let mut result: Vec<String> = included.into_iter().filter(|ns| !excluded.contains(ns)).collect();
    result.sort();
    result.dedup();

    if result.is_empty() {
        result.push(String::new());
    }

    result
}

/// The outcome of evaluating one `spec.objectTemplates` entry against one
/// applicable namespace.
struct TemplateNamespaceResult {
    condition: Condition,
    related_object: Option<RelatedObject>,
}

async fn evaluate_one_namespace(
    store: &dyn ClusterStore,
    template: &ObjectTemplate,
    object: &Value,
    kind: &str,
    group: &str,
    version: &str,
    resource: &str,
    namespace: Option<&str>,
    name: Option<&str>,
    enforce: bool,
) -> TemplateNamespaceResult {
    let should_exist = !template.compliance_type.is_mustnothave();

    // Unnamed template: list every object of the kind and treat the
    // template as satisfied if structural equality holds for at least one
    // (spec.md §4.D item 4: "remediation is forced to inform").
    let Some(name) = name else {
        let live_objects = store
            .list_all(group, version, resource, namespace)
            .await
            .unwrap_or_default();

        let matches = live_objects
            .iter()
            .any(|live| compare_object(object, live, template.compliance_type, template.metadata_compliance_type).map(|c| !c.needs_update).unwrap_or(false));

        let exists = !live_objects.is_empty();
        let reason = existence_reason(should_exist, exists, matches);
        let compliant = if should_exist { matches } else { !exists };
        let condition = Condition::new(
            format!("template-{kind}"),
            if compliant { ConditionStatus::True } else { ConditionStatus::False },
            reason,
            format!("{resource} objects of this kind were inspected ({reason})"),
        );
        return TemplateNamespaceResult { condition, related_object: None };
    };

    let live = store
        .get_named(group, version, resource, namespace, name)
        .await
        .unwrap_or(None);
    let exists = live.is_some();

    let (matches, merged) = match &live {
        Some(live_val) => match compare_object(object, live_val, template.compliance_type, template.metadata_compliance_type) {
            Ok(cmp) => (!cmp.needs_update, Some(cmp.merged)),
            Err(ComparisonError::TypeMismatch { .. }) => (false, None),
        },
        None => (false, None),
    };

    let mut reason = existence_reason(should_exist, exists, matches);
    let mut message = format!(
        "{resource} [{name}] in namespace {ns} {reason}",
        ns = namespace.unwrap_or(""),
    );

    let needs_action = should_exist != exists || (should_exist && exists && !matches);

    if enforce && needs_action {
        if should_exist {
            let to_write = merged.unwrap_or_else(|| object.clone());
            let action_result = if exists {
                store.update(group, version, resource, namespace, to_write).await
            } else {
                store.create(group, version, resource, namespace, to_write).await
            };
            match action_result {
                Ok(()) => {
                    reason = if exists { "K8s update success" } else { "K8s creation success" };
                    message = format!("{resource} [{name}] was {}", if exists { "updated" } else { "created" });
                },
                Err(err) => {
                    reason = if exists { "K8s update error" } else { "K8s creation error" };
                    message = format!("{resource} [{name}] could not be {}: {err}", if exists { "updated" } else { "created" });
                },
            }
        } else {
            match store.delete(group, version, resource, namespace, name).await {
                Ok(()) => {
                    reason = "K8s deletion success";
                    message = format!("{resource} [{name}] existed, and was deleted successfully");
                },
                Err(err) => {
                    reason = "K8s deletion error";
                    message = format!("{resource} [{name}] exists, and cannot be deleted: {err}");
                },
            }
        }
    }

    let compliant = reason.ends_with("as expected") || reason.ends_with("success");

    let condition = Condition::new(format!("template-{kind}"), if compliant { ConditionStatus::True } else { ConditionStatus::False }, reason, message);

    let related_object = Some(RelatedObject {
        object: ObjectResource {
            api_version: format!("{group}/{version}").trim_start_matches('/').to_string(),
            kind: kind.to_string(),
            namespace: namespace.map(str::to_string),
            name: name.to_string(),
        },
        compliant: if compliant { "Compliant".to_string() } else { "NonCompliant".to_string() },
        reason: reason.to_string(),
        properties: if reason == "K8s creation success" {
            Some(ObjectProperties { created_by_policy: Some(true), uid: None })
        } else {
            None
        },
    });

    TemplateNamespaceResult { condition, related_object }
}

/// The full result of evaluating one ConfigurationPolicy.
pub struct EvaluationOutcome {
    pub status: ConfigurationPolicyStatus,
    pub event: Option<ComplianceEvent>,
}

/// Evaluate a single ConfigurationPolicy end to end (spec.md §4.D).
#[allow(clippy::too_many_arguments)]
pub async fn evaluate(
    spec: &ConfigurationPolicySpec,
    mut previous_status: ConfigurationPolicyStatus,
    policy_namespace: &str,
    policy_name: &str,
    store: &dyn ClusterStore,
    resolver: &dyn TemplateResolver,
    snapshot: &DiscoverySnapshot,
    owner: Option<EventOwner>,
    hub_template_message: Option<&str>,
    key_cache: &EncryptionKeyCache,
) -> EvaluationOutcome {
    if spec.remediation_action == RemediationAction::Unset {
        previous_status.compliant = Some(ComplianceState::NonCompliant);
        previous_status.template_statuses = vec![TemplateStatus {
            compliant: ComplianceState::NonCompliant,
            conditions: vec![Condition::new(
                "template-error",
                ConditionStatus::False,
                "No RemediationAction",
                "the remediationAction field is unset",
            )],
        }];
        let event = build_compliance_event(
            owner,
            policy_namespace,
            policy_name,
            previous_status.template_statuses[0].conditions.last().unwrap(),
        );
        return EvaluationOutcome { status: previous_status, event };
    }

    let enforce = spec.remediation_action.is_enforce();
    let live_namespaces = store.list_namespaces().await.unwrap_or_default();
    let applicable_namespaces = resolve_namespaces(spec.namespace_selector.as_ref(), &live_namespaces);

    let ctx = TemplateContext { namespace: policy_namespace.to_string() };
    let mut template_statuses = Vec::with_capacity(spec.object_templates.len());
    let mut related_objects: Vec<RelatedObject> = previous_status.related_objects.clone();

    for (i, template) in spec.object_templates.iter().enumerate() {
        let mut conditions: Vec<Condition> = previous_status
            .template_statuses
            .get(i)
            .map(|t| t.conditions.clone())
            .unwrap_or_default();

        let raw = template.object_definition.to_string();

        if has_hub_template(&raw) {
            let message = hub_template_message.unwrap_or(
                "this object template contains hub-templates, which are resolved on the hub \
                 cluster and are not supported for direct use",
            );
            append_template_condition(
                &mut conditions,
                Condition::new("template-error", ConditionStatus::False, "hub-templates-not-resolved", message),
            );
            template_statuses.push(TemplateStatus { compliant: ComplianceState::NonCompliant, conditions });
            continue;
        }

        let resolved_raw = if has_template(&raw, "{{") {
            let mut attempt = resolver.resolve_template(&raw, &ctx);
            if let Err(err) = &attempt {
                if is_aes_error(err) {
                    // The cached key may be stale; clear it and retry once
                    // before giving up (spec.md §4.D / §7: "clear cache
                    // once + one retry").
                    key_cache.invalidate(&ctx.namespace);
                    attempt = resolver.resolve_template(&raw, &ctx);
                }
            }
            match attempt {
                Ok(resolved) => resolved,
                Err(err) => {
                    let reason = match err {
                        TemplateError::InvalidAESKey | TemplateError::AESKeyNotSet => "Invalid AES key",
                        TemplateError::InvalidIV => "Invalid initialization vector",
                        TemplateError::InvalidPKCS7Padding => "Invalid PKCS7 padding",
                        _ => "Template resolution failed",
                    };
                    append_template_condition(
                        &mut conditions,
                        Condition::new("template-error", ConditionStatus::False, reason, err.to_string()),
                    );
                    template_statuses.push(TemplateStatus { compliant: ComplianceState::NonCompliant, conditions });
                    continue;
                },
            }
        } else {
            raw
        };

        let object: Value = match serde_json::from_str(&resolved_raw) {
            Ok(v) => v,
            Err(err) => {
                append_template_condition(
                    &mut conditions,
                    Condition::new("template-error", ConditionStatus::False, "decode error", err.to_string()),
                );
                template_statuses.push(TemplateStatus { compliant: ComplianceState::NonCompliant, conditions });
                continue;
            },
        };

        let located = match locate(&object, snapshot) {
            Ok(l) => l,
            Err(LocatorError::Undecodable) => {
                append_template_condition(
                    &mut conditions,
                    Condition::new("template-error", ConditionStatus::False, "decode error", "object has no apiVersion or kind"),
                );
                template_statuses.push(TemplateStatus { compliant: ComplianceState::NonCompliant, conditions });
                continue;
            },
            Err(LocatorError::NoMapping { kind }) => {
                append_template_condition(
                    &mut conditions,
                    Condition::new("template-error", ConditionStatus::False, "K8s creation error", format!("couldn't find mapping resource with kind {kind}, please check if you have CRD deployed")),
                );
                template_statuses.push(TemplateStatus { compliant: ComplianceState::NonCompliant, conditions });
                continue;
            },
        };

        let object_namespace = object.pointer("/metadata/namespace").and_then(Value::as_str);
        let object_name = object.pointer("/metadata/name").and_then(Value::as_str);

        let namespaces_for_template: Vec<Option<String>> = match object_namespace {
            Some(ns) => vec![Some(ns.to_string())],
            None if located.namespaced => applicable_namespaces
                .iter()
                .map(|ns| if ns.is_empty() { None } else { Some(ns.clone()) })
                .collect(),
            None => vec![None],
        };

        if located.namespaced && namespaces_for_template.iter().all(Option::is_none) {
            append_template_condition(
                &mut conditions,
                Condition::new("template-error", ConditionStatus::False, "K8s missing namespace", "no namespace was specified or resolved for a namespaced resource"),
            );
            template_statuses.push(TemplateStatus { compliant: ComplianceState::NonCompliant, conditions });
            continue;
        }

        let per_template_enforce = enforce && object_name.is_some();
        let mut fresh_related = Vec::new();

        for ns in &namespaces_for_template {
            let result = evaluate_one_namespace(
                store,
                template,
                &object,
                &located.kind,
                &located.group,
                &located.version,
                &located.resource,
                ns.as_deref(),
                object_name,
                per_template_enforce,
            )
            .await;

            append_template_condition(&mut conditions, result.condition);
            if let Some(obj) = result.related_object {
                fresh_related.push(obj);
            }
        }

        related_objects = merge_related_objects_for_kind(&related_objects, &located.kind, fresh_related);

        let compliant = if conditions.iter().all(|c| c.status == ConditionStatus::True) {
            ComplianceState::Compliant
        } else {
            ComplianceState::NonCompliant
        };

        template_statuses.push(TemplateStatus { compliant, conditions });
    }

    let mut status = ConfigurationPolicyStatus {
        compliant: None,
        template_statuses,
        related_objects: sort_and_dedupe_related_objects(related_objects),
    };
    status.recompute_overall_compliance();

    let overall_condition = status
        .template_statuses
        .iter()
        .flat_map(|t| t.conditions.last())
        .last()
        .cloned()
        .unwrap_or_else(|| Condition::new("Compliant", ConditionStatus::Unknown, "NoTemplates", "no object templates were evaluated"));

    let changed = previous_status.compliant != status.compliant;
    let event = if changed {
        build_compliance_event(owner, policy_namespace, policy_name, &overall_condition)
    } else {
        None
    };

    if event.is_none() && changed {
        warn!(policy = policy_name, "compliance changed but policy has no owner reference to emit an event against");
    }

    EvaluationOutcome { status, event }
}
