//! Live-cluster orchestration for the OperatorPolicy pipeline (spec.md
//! §4.E): the thin `kube::Api` adapter around the pure stage functions in
//! `controller::operator_policy`, the same role
//! `configuration_policy::evaluate` plays for ConfigurationPolicy.

use k8s_openapi::api::apps::v1::Deployment;
use kube::api::{ApiResource, DynamicObject, ListParams, Patch, PatchParams, PostParams};
use kube::{Api, Client};
use serde_json::Value;
use tracing::{debug, error};

use crate::controller::operator_policy::{
    build, csv, finalize_status, install_plan, olm, operator_group, resources, subscription, validate_build,
};
use crate::models::condition::{
    merge_related_objects_for_kind, sort_and_dedupe_related_objects, Condition, ConditionStatus, ObjectProperties,
    ObjectResource, RelatedObject,
};
use crate::models::operator_policy::{OperatorPolicySpec, OperatorPolicyStatus, OP_GROUP_CONDITION_TYPE};
use crate::status::{build_compliance_event, ComplianceEvent, EventOwner};

const FIELD_MANAGER: &str = "policy-reconciler";

/// Whether a failed API call is a permanent `Forbidden` (spec.md §7 "API
/// permanent": a dry-run `Forbidden` will never succeed on retry, so it's
/// reported `MismatchUnfixable` rather than the usual retryable mismatch).
fn is_forbidden(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(resp) if resp.code == 403)
}

/// Whether OLM copied this object down from another namespace (`olm.copiedFrom`
/// annotation, or `status.reason == "Copied"`) — grounds Go's
/// `operatorv1alpha1.IsCopied`/`CSVReasonCopied` (review: CSV stage must
/// exclude copied CSVs, and an intervention must never target one).
fn is_copied(obj: &DynamicObject) -> bool {
    let has_annotation = obj
        .metadata
        .annotations
        .as_ref()
        .is_some_and(|a| a.contains_key("olm.copiedFrom"));
    let has_reason = obj.data.pointer("/status/reason").and_then(Value::as_str) == Some("Copied");
    has_annotation || has_reason
}

fn olm_resource(group: &str, version: &str, kind: &str, plural: &str) -> ApiResource {
    ApiResource { group: group.to_string(), version: version.to_string(), api_version: format!("{group}/{version}"), kind: kind.to_string(), plural: plural.to_string() }
}

fn subscription_resource() -> ApiResource {
    olm_resource("operators.coreos.com", "v1alpha1", "Subscription", "subscriptions")
}

fn operator_group_resource() -> ApiResource {
    olm_resource("operators.coreos.com", "v1", "OperatorGroup", "operatorgroups")
}

fn install_plan_resource() -> ApiResource {
    olm_resource("operators.coreos.com", "v1alpha1", "InstallPlan", "installplans")
}

fn csv_resource() -> ApiResource {
    olm_resource("operators.coreos.com", "v1alpha1", "ClusterServiceVersion", "clusterserviceversions")
}

fn catalog_source_resource() -> ApiResource {
    olm_resource("operators.coreos.com", "v1alpha1", "CatalogSource", "catalogsources")
}

fn crd_resource() -> ApiResource {
    olm_resource("apiextensions.k8s.io", "v1", "CustomResourceDefinition", "customresourcedefinitions")
}

fn package_manifest_resource() -> ApiResource {
    olm_resource("packages.operators.coreos.com", "v1", "PackageManifest", "packagemanifests")
}

/// Reads the channel/source/sourceNamespace defaults and offered channels off
/// a PackageManifest (spec.md §4.E "Build").
fn found_package_manifest(obj: &DynamicObject) -> build::PackageManifestInfo {
    build::PackageManifestInfo {
        default_channel: obj.data.pointer("/status/defaultChannel").and_then(Value::as_str).map(str::to_string),
        catalog_source: obj.data.pointer("/status/catalogSource").and_then(Value::as_str).map(str::to_string),
        catalog_source_namespace: obj.data.pointer("/status/catalogSourceNamespace").and_then(Value::as_str).map(str::to_string),
        channels: obj
            .data
            .pointer("/status/channels")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(|c| c.get("name").and_then(Value::as_str)).map(str::to_string).collect())
            .unwrap_or_default(),
    }
}

fn related_status(status: ConditionStatus) -> String {
    if status == ConditionStatus::True { "Compliant".to_string() } else { "NonCompliant".to_string() }
}

/// Builds one `RelatedObject` entry for a managed OLM resource, carrying the
/// aspect condition's status/reason as the object's own verdict (spec.md §3
/// "Related Object").
fn related_object(api_version: &str, kind: &str, namespace: Option<&str>, name: &str, condition: &Condition, created_by_policy: Option<bool>) -> RelatedObject {
    RelatedObject {
        object: ObjectResource { api_version: api_version.to_string(), kind: kind.to_string(), namespace: namespace.map(str::to_string), name: name.to_string() },
        compliant: related_status(condition.status),
        reason: condition.reason.clone(),
        properties: created_by_policy.map(|v| ObjectProperties { created_by_policy: Some(v), uid: None }),
    }
}

fn found_operator_group(obj: &DynamicObject) -> operator_group::FoundOperatorGroup {
    let target_namespaces = obj
        .data
        .pointer("/spec/targetNamespaces")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();
    operator_group::FoundOperatorGroup {
        name: obj.metadata.name.clone().unwrap_or_default(),
        target_namespaces,
        has_owner_references: obj.metadata.owner_references.as_ref().is_some_and(|o| !o.is_empty()),
        has_deletion_timestamp: obj.metadata.deletion_timestamp.is_some(),
    }
}

fn found_subscription(obj: &DynamicObject) -> subscription::FoundSubscription {
    subscription::FoundSubscription {
        name: obj.metadata.name.clone().unwrap_or_default(),
        channel: obj.data.pointer("/spec/channel").and_then(Value::as_str).map(str::to_string),
        source: obj.data.pointer("/spec/source").and_then(Value::as_str).map(str::to_string),
        source_namespace: obj.data.pointer("/spec/sourceNamespace").and_then(Value::as_str).map(str::to_string),
        resolution_failed_reason: obj
            .data
            .pointer("/status/conditions")
            .and_then(Value::as_array)
            .and_then(|conds| conds.iter().find(|c| c.get("type").and_then(Value::as_str) == Some("ResolutionFailed")))
            .and_then(|c| c.get("reason"))
            .and_then(Value::as_str)
            .map(str::to_string),
        resolution_failed_message: obj
            .data
            .pointer("/status/conditions")
            .and_then(Value::as_array)
            .and_then(|conds| conds.iter().find(|c| c.get("type").and_then(Value::as_str) == Some("ResolutionFailed")))
            .and_then(|c| c.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

fn installed_csv_name(sub: &DynamicObject) -> Option<String> {
    sub.data.pointer("/status/installedCSV").and_then(Value::as_str).map(str::to_string)
}

fn install_plan_phase(obj: &DynamicObject) -> install_plan::Phase {
    match obj.data.pointer("/status/phase").and_then(Value::as_str) {
        Some("Failed") => install_plan::Phase::Failed,
        Some("RequiresApproval") => install_plan::Phase::RequiresApproval,
        Some("Complete") => install_plan::Phase::Complete,
        _ => install_plan::Phase::Installing,
    }
}

fn found_install_plan(obj: &DynamicObject, current_names: &[String]) -> install_plan::FoundInstallPlan {
    let csv_names = obj
        .data
        .pointer("/spec/clusterServiceVersionNames")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();
    let name = obj.metadata.name.clone().unwrap_or_default();
    install_plan::FoundInstallPlan {
        is_current: current_names.contains(&name),
        name,
        phase: install_plan_phase(obj),
        csv_names,
    }
}

fn csv_phase(obj: &DynamicObject) -> csv::CsvPhase {
    match obj.data.pointer("/status/phase").and_then(Value::as_str) {
        Some("Succeeded") => csv::CsvPhase::Succeeded,
        Some("Failed") => csv::CsvPhase::Failed,
        Some("Pending") => csv::CsvPhase::Pending,
        Some("InstallReady") => csv::CsvPhase::InstallReady,
        Some("Installing") => csv::CsvPhase::Installing,
        _ => csv::CsvPhase::Unknown,
    }
}

async fn list_namespaced(client: &Client, ar: &ApiResource, namespace: &str) -> Vec<DynamicObject> {
    let api: Api<DynamicObject> = Api::namespaced_with(client.clone(), namespace, ar);
    match api.list(&ListParams::default()).await {
        Ok(list) => list.items,
        Err(err) => {
            error!(error = %err, kind = %ar.kind, "failed to list OLM resources");
            Vec::new()
        },
    }
}

async fn get_named(client: &Client, ar: &ApiResource, namespace: &str, name: &str) -> Option<DynamicObject> {
    let api: Api<DynamicObject> = Api::namespaced_with(client.clone(), namespace, ar);
    api.get(name).await.ok()
}

pub struct EvaluationOutcome {
    pub status: OperatorPolicyStatus,
    pub event: Option<ComplianceEvent>,
}

/// Run the full build -> overlap -> operator group -> subscription ->
/// install plan -> CSV -> CRDs -> deployment -> catalog source pipeline for
/// one OperatorPolicy, applying the cluster writes each stage decides on.
#[allow(clippy::too_many_arguments)]
pub async fn evaluate(
    client: &Client,
    spec: &OperatorPolicySpec,
    mut previous_status: OperatorPolicyStatus,
    policy_namespace: &str,
    policy_name: &str,
    default_operator_namespace: &str,
    other_policies: &[(String, String, String)],
    owner: Option<EventOwner>,
) -> EvaluationOutcome {
    let enforce = spec.remediation_action.is_enforce();
    let mustnothave = spec.compliance_type.is_mustnothave();

    let subscription_name_hint = spec.subscription.get("name").and_then(Value::as_str);
    let namespace_hint = spec.subscription.get("namespace").and_then(Value::as_str).unwrap_or(default_operator_namespace);
    let package_manifest = match subscription_name_hint {
        Some(name) => get_named(client, &package_manifest_resource(), namespace_hint, name).await.map(|obj| found_package_manifest(&obj)),
        None => None,
    };

    let built_sub = build::build_subscription(
        &spec.subscription,
        default_operator_namespace,
        spec.remediation_action,
        spec.upgrade_approval,
        spec.versions.as_deref().unwrap_or_default(),
        package_manifest.as_ref(),
    );
    let built_og = build::build_operator_group(spec.operator_group.as_ref(), built_sub.as_ref().map(|s| s.namespace.as_str()).unwrap_or(default_operator_namespace));

    let overlap = olm::check_overlap(policy_name, policy_namespace, built_sub.as_ref().ok().map(|s| s.name.as_str()), other_policies);

    let validation = validate_build(built_sub.as_ref().err().map(String::as_str), built_og.as_ref().err().map(String::as_str), &overlap.overlappers);
    previous_status.resolved_subscription_label = if overlap.resolved_label.is_empty() { None } else { Some(overlap.resolved_label) };
    previous_status.overlapping_policies = overlap.overlappers;

    if !validation.ok {
        let changed = finalize_status(&mut previous_status, vec![validation.condition]);
        let event = if changed {
            previous_status.get_condition("Compliant").cloned().and_then(|overall| build_compliance_event(owner, policy_namespace, policy_name, &overall))
        } else {
            None
        };
        return EvaluationOutcome { status: previous_status, event };
    }

    let Ok(built_sub) = built_sub else { unreachable!("validate_build would have rejected a subscription build error") };
    let Ok(built_og) = built_og else { unreachable!("validate_build would have rejected an operator group build error") };
    let namespace = built_sub.namespace.clone();

    let mut conditions = Vec::new();
    let mut related_objects: Vec<RelatedObject> = previous_status.related_objects.clone();

    // Operator Group
    let found_ogs: Vec<_> = list_namespaced(client, &operator_group_resource(), &namespace).await.iter().map(found_operator_group).collect();
    let og_decision = if mustnothave {
        operator_group::mustnothave(&found_ogs, spec.removal_behavior.operator_group, false, enforce)
    } else {
        operator_group::musthave(&found_ogs, &built_og, enforce)
    };
    let og_apply = apply_operator_group_action(client, &og_decision, &built_og, &namespace).await;
    let og_condition = match og_apply {
        ApplyOutcome::Forbidden => Condition::new(
            OP_GROUP_CONDITION_TYPE,
            ConditionStatus::False,
            "MismatchUnfixable",
            "the OperatorGroup update was rejected by the API server (Forbidden) and will not be retried",
        ),
        _ => og_decision.condition.clone(),
    };
    if let Some(name) = found_ogs.first().map(|o| o.name.clone()).or_else(|| built_og.name.clone()) {
        let created_by_policy = matches!(og_decision.action, operator_group::Action::Create) && matches!(og_apply, ApplyOutcome::Applied);
        let fresh = vec![related_object("operators.coreos.com/v1", "OperatorGroup", Some(&namespace), &name, &og_condition, created_by_policy.then_some(true))];
        related_objects = merge_related_objects_for_kind(&related_objects, "OperatorGroup", fresh);
    }
    conditions.push(og_condition);

    // Subscription
    let found_sub_obj = get_named(client, &subscription_resource(), &namespace, &built_sub.name).await;
    let found_sub = found_sub_obj.as_ref().map(found_subscription);
    let sub_decision = if mustnothave { None } else { Some(subscription::musthave(found_sub.as_ref(), &built_sub, enforce)) };
    if let Some(decision) = &sub_decision {
        apply_subscription_action(client, decision, &built_sub, found_sub_obj.is_none()).await;

        let now = chrono_now();
        if decision.start_intervention {
            previous_status.subscription_intervention_time.get_or_insert(now);
            if previous_status.subscription_intervention_expired(now) {
                if let Some(unreferenced) = found_sub.as_ref().and_then(|s| s.resolution_failed_message.as_deref()).and_then(subscription::unreferenced_csv_name) {
                    intervene_on_subscription(client, &namespace, &built_sub.name, &unreferenced).await;
                    previous_status.subscription_intervention_time = None;
                }
            }
        } else {
            previous_status.subscription_intervention_time = None;
        }

        let created_by_policy = decision.action == operator_group::Action::Create && found_sub_obj.is_none();
        let fresh = vec![related_object("operators.coreos.com/v1alpha1", "Subscription", Some(&namespace), &built_sub.name, &decision.condition, created_by_policy.then_some(true))];
        related_objects = merge_related_objects_for_kind(&related_objects, "Subscription", fresh);

        conditions.push(decision.condition.clone());
    }

    let subscription_created = found_sub_obj.is_some();
    let installed_csv_name = found_sub_obj.as_ref().and_then(installed_csv_name);

    // Install Plan
    if !mustnothave && subscription_created {
        let current_names: Vec<String> = installed_csv_name.clone().into_iter().collect();
        let plan_objs = list_namespaced(client, &install_plan_resource(), &namespace).await;
        let plans: Vec<_> = plan_objs.iter().map(|p| found_install_plan(p, &current_names)).collect();
        let initial_install = installed_csv_name.is_none();
        let ip_decision = install_plan::handle(&plans, spec.remediation_action.is_inform(), initial_install, spec.upgrade_approval.is_automatic(), spec.versions.as_deref().unwrap_or_default(), built_sub.starting_csv.as_deref());
        if enforce {
            if let Some(name) = &ip_decision.approve {
                approve_install_plan(client, &namespace, name).await;
            }
        }

        let fresh: Vec<RelatedObject> = plans
            .iter()
            .map(|p| related_object("operators.coreos.com/v1alpha1", "InstallPlan", Some(&namespace), &p.name, &ip_decision.condition, None))
            .collect();
        related_objects = merge_related_objects_for_kind(&related_objects, "InstallPlan", fresh);

        conditions.push(ip_decision.condition);
    }

    // CSV
    let found_csv = match &installed_csv_name {
        Some(name) => get_named(client, &csv_resource(), &namespace, name)
            .await
            .map(|obj| csv::FoundCsv { name: name.clone(), phase: csv_phase(&obj), is_copied: is_copied(&obj) }),
        None => None,
    };
    let csv_condition = if mustnothave {
        csv::mustnothave(found_csv.as_ref().map(std::slice::from_ref).unwrap_or(&[]))
    } else {
        csv::handle(subscription_created, found_csv.as_ref())
    };
    if let Some(csv) = &found_csv {
        let fresh = vec![related_object("operators.coreos.com/v1alpha1", "ClusterServiceVersion", Some(&namespace), &csv.name, &csv_condition, None)];
        related_objects = merge_related_objects_for_kind(&related_objects, "ClusterServiceVersion", fresh);
    }
    conditions.push(csv_condition);

    // CRDs: names the cluster-served CRD resource presently offers for the
    // installed CSV's owned kinds, approximated from the CSV's spec body.
    let owned_csv = match &installed_csv_name {
        Some(name) => get_named(client, &csv_resource(), &namespace, name).await,
        None => None,
    };
    let desired_crd_names: Vec<String> = owned_csv
        .as_ref()
        .and_then(|csv| csv.data.pointer("/spec/customresourcedefinitions/owned"))
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(|o| o.get("name").and_then(Value::as_str)).map(str::to_string).collect())
        .unwrap_or_default();
    if !desired_crd_names.is_empty() || mustnothave {
        let all_crds: Api<DynamicObject> = Api::all_with(client.clone(), &crd_resource());
        let found_crd_names: Vec<String> = all_crds
            .list(&ListParams::default())
            .await
            .map(|l| l.items.into_iter().filter_map(|o| o.metadata.name).collect())
            .unwrap_or_default();
        let relevant_found: Vec<String> = found_crd_names.into_iter().filter(|n| desired_crd_names.contains(n)).collect();
        let crd_condition = resources::handle_crds(&desired_crd_names, &relevant_found, mustnothave, spec.removal_behavior.crds);

        let fresh: Vec<RelatedObject> = relevant_found
            .iter()
            .map(|n| related_object("apiextensions.k8s.io/v1", "CustomResourceDefinition", None, n, &crd_condition, None))
            .collect();
        related_objects = merge_related_objects_for_kind(&related_objects, "CustomResourceDefinition", fresh);

        conditions.push(crd_condition);
    }

    // Deployments, from the CSV's install strategy.
    let deployment_names: Vec<String> = owned_csv
        .as_ref()
        .and_then(|csv| csv.data.pointer("/spec/install/spec/deployments"))
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(|d| d.get("name").and_then(Value::as_str)).map(str::to_string).collect())
        .unwrap_or_default();
    if !mustnothave && !deployment_names.is_empty() {
        let deployment_api: Api<Deployment> = Api::namespaced(client.clone(), &namespace);
        let mut found_deployments = Vec::with_capacity(deployment_names.len());
        for name in &deployment_names {
            match deployment_api.get_opt(name).await {
                Ok(Some(dep)) => {
                    let unavailable = dep.status.as_ref().and_then(|s| s.unavailable_replicas).unwrap_or(0);
                    found_deployments.push(resources::FoundDeployment { name: name.clone(), exists: true, unavailable_replicas: unavailable });
                },
                _ => found_deployments.push(resources::FoundDeployment { name: name.clone(), exists: false, unavailable_replicas: 0 }),
            }
        }
        let deployment_condition = resources::handle_deployments(&found_deployments, spec.compliance_config.deployments_unavailable);

        let fresh: Vec<RelatedObject> = found_deployments
            .iter()
            .filter(|d| d.exists)
            .map(|d| related_object("apps/v1", "Deployment", Some(&namespace), &d.name, &deployment_condition, None))
            .collect();
        related_objects = merge_related_objects_for_kind(&related_objects, "Deployment", fresh);

        conditions.push(deployment_condition);
    }

    // Catalog Source
    if let Some(source) = &built_sub.source {
        let source_namespace = built_sub.source_namespace.as_deref().unwrap_or(&namespace);
        let state = match get_named(client, &catalog_source_resource(), source_namespace, source).await {
            None => resources::CatalogSourceState::Missing,
            Some(cs) => match cs.data.pointer("/status/connectionState/lastObservedState").and_then(Value::as_str) {
                Some("READY") => resources::CatalogSourceState::Ready,
                _ => resources::CatalogSourceState::Other,
            },
        };
        let catalog_condition = resources::handle_catalog_source(state, mustnothave);

        if state != resources::CatalogSourceState::Missing {
            let fresh = vec![related_object("operators.coreos.com/v1alpha1", "CatalogSource", Some(source_namespace), source, &catalog_condition, None)];
            related_objects = merge_related_objects_for_kind(&related_objects, "CatalogSource", fresh);
        }

        conditions.push(catalog_condition);
    }

    previous_status.related_objects = sort_and_dedupe_related_objects(related_objects);

    let changed = finalize_status(&mut previous_status, conditions);
    let event = if changed {
        previous_status.get_condition("Compliant").cloned().and_then(|overall| build_compliance_event(owner, policy_namespace, policy_name, &overall))
    } else {
        None
    };

    EvaluationOutcome { status: previous_status, event }
}

fn chrono_now() -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now()
}

/// Outcome of applying an OperatorGroup decision, distinguishing a permanent
/// API rejection from a transient failure (spec.md §7 "API permanent").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ApplyOutcome {
    Applied,
    Forbidden,
    Failed,
}

async fn apply_operator_group_action(client: &Client, decision: &operator_group::OpGroupDecision, desired: &build::BuiltOperatorGroup, namespace: &str) -> ApplyOutcome {
    let ar = operator_group_resource();
    match decision.action {
        operator_group::Action::Create => {
            let mut obj = serde_json::json!({
                "apiVersion": ar.api_version,
                "kind": ar.kind,
                "metadata": {},
                "spec": { "targetNamespaces": desired.target_namespaces },
            });
            if let Some(name) = &desired.name {
                obj["metadata"]["name"] = serde_json::json!(name);
            }
            if let Some(prefix) = &desired.generate_name {
                obj["metadata"]["generateName"] = serde_json::json!(prefix);
            }
            let dyn_obj: DynamicObject = serde_json::from_value(obj).expect("well-formed OperatorGroup body");
            let api: Api<DynamicObject> = Api::namespaced_with(client.clone(), namespace, &ar);
            match api.create(&PostParams::default(), &dyn_obj).await {
                Ok(_) => ApplyOutcome::Applied,
                Err(err) if is_forbidden(&err) => {
                    error!(error = %err, "OperatorGroup create is forbidden");
                    ApplyOutcome::Forbidden
                },
                Err(err) => {
                    error!(error = %err, "failed to create OperatorGroup");
                    ApplyOutcome::Failed
                },
            }
        },
        operator_group::Action::Update => {
            let Some(name) = &desired.name else { return ApplyOutcome::Applied };
            let patch = serde_json::json!({ "spec": { "targetNamespaces": desired.target_namespaces } });
            let api: Api<DynamicObject> = Api::namespaced_with(client.clone(), namespace, &ar);

            // A dry-run pre-check surfaces a permanent Forbidden before the
            // real write, so it's reported unfixable rather than retried
            // forever on the next evaluation pass.
            if let Err(err) = api.patch(name, &PatchParams::apply(FIELD_MANAGER).dry_run(), &Patch::Merge(&patch)).await {
                if is_forbidden(&err) {
                    error!(error = %err, "OperatorGroup update is forbidden; marking unfixable");
                    return ApplyOutcome::Forbidden;
                }
                error!(error = %err, "OperatorGroup dry-run update failed");
                return ApplyOutcome::Failed;
            }

            match api.patch(name, &PatchParams::apply(FIELD_MANAGER).force(), &Patch::Merge(&patch)).await {
                Ok(_) => ApplyOutcome::Applied,
                Err(err) => {
                    error!(error = %err, "failed to update OperatorGroup");
                    ApplyOutcome::Failed
                },
            }
        },
        operator_group::Action::Delete => {
            let Some(name) = &desired.name else { return ApplyOutcome::Applied };
            let api: Api<DynamicObject> = Api::namespaced_with(client.clone(), namespace, &ar);
            match api.delete(name, &Default::default()).await {
                Ok(_) => ApplyOutcome::Applied,
                Err(err) if is_forbidden(&err) => {
                    error!(error = %err, "OperatorGroup delete is forbidden");
                    ApplyOutcome::Forbidden
                },
                Err(err) => {
                    error!(error = %err, "failed to delete OperatorGroup");
                    ApplyOutcome::Failed
                },
            }
        },
        operator_group::Action::None => ApplyOutcome::Applied,
    }
}

async fn apply_subscription_action(client: &Client, decision: &subscription::SubscriptionDecision, desired: &build::BuiltSubscription, missing: bool) {
    use crate::controller::operator_policy::operator_group::Action;
    let ar = subscription_resource();
    let api: Api<DynamicObject> = Api::namespaced_with(client.clone(), &desired.namespace, &ar);
    match decision.action {
        Action::Create if missing => {
            let mut spec = serde_json::json!({
                "channel": desired.channel,
                "source": desired.source,
                "sourceNamespace": desired.source_namespace,
                "installPlanApproval": desired.install_plan_approval,
            });
            if let Some(csv) = &desired.starting_csv {
                spec["startingCSV"] = serde_json::json!(csv);
            }
            let obj = serde_json::json!({
                "apiVersion": ar.api_version,
                "kind": ar.kind,
                "metadata": { "name": desired.name },
                "spec": spec,
            });
            let dyn_obj: DynamicObject = serde_json::from_value(obj).expect("well-formed Subscription body");
            if let Err(err) = api.create(&PostParams::default(), &dyn_obj).await {
                error!(error = %err, "failed to create Subscription");
            }
        },
        Action::Update => {
            let patch = serde_json::json!({ "spec": {
                "channel": desired.channel,
                "source": desired.source,
                "sourceNamespace": desired.source_namespace,
                "installPlanApproval": desired.install_plan_approval,
            }});
            if let Err(err) = api.patch(&desired.name, &PatchParams::apply(FIELD_MANAGER).force(), &Patch::Merge(&patch)).await {
                error!(error = %err, "failed to update Subscription");
            }
        },
        Action::Delete => {
            if let Err(err) = api.delete(&desired.name, &Default::default()).await {
                error!(error = %err, "failed to delete Subscription");
            }
        },
        _ => {},
    }
}

async fn approve_install_plan(client: &Client, namespace: &str, name: &str) {
    let ar = install_plan_resource();
    let api: Api<DynamicObject> = Api::namespaced_with(client.clone(), namespace, &ar);
    let patch = serde_json::json!({ "spec": { "approved": true } });
    if let Err(err) = api.patch(name, &PatchParams::apply(FIELD_MANAGER).force(), &Patch::Merge(&patch)).await {
        error!(error = %err, "failed to approve InstallPlan");
    } else {
        debug!(install_plan = %name, "approved InstallPlan");
    }
}

/// Forces OLM's stalled resolution forward once the grace period has
/// elapsed, by patching the Subscription's `status.currentCSV` to the
/// unreferenced CSV the resolution failure named (spec.md §4.E Subscription,
/// §8 test scenario 5; grounds Go's Subscription `currentCSV` intervention —
/// never a delete/recreate, since that would discard OLM's own resolution
/// state for no benefit). A copied CSV is never a valid target.
async fn intervene_on_subscription(client: &Client, namespace: &str, sub_name: &str, csv_name: &str) {
    let Some(csv_obj) = get_named(client, &csv_resource(), namespace, csv_name).await else {
        debug!(csv = %csv_name, "intervention target CSV not found; skipping");
        return;
    };
    if is_copied(&csv_obj) {
        debug!(csv = %csv_name, "intervention target CSV is a copy; skipping");
        return;
    }

    let api: Api<DynamicObject> = Api::namespaced_with(client.clone(), namespace, &subscription_resource());
    let patch = serde_json::json!({ "status": { "currentCSV": csv_name } });
    if let Err(err) = api.patch_status(sub_name, &PatchParams::apply(FIELD_MANAGER).force(), &Patch::Merge(&patch)).await {
        error!(error = %err, subscription = %sub_name, csv = %csv_name, "failed to intervene on stuck Subscription");
    } else {
        debug!(subscription = %sub_name, csv = %csv_name, "intervened on stuck Subscription by forcing status.currentCSV");
    }
}
