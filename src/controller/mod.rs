pub mod configuration_policy;
pub mod dynamic_store;
pub mod operator_policy;
pub mod operator_policy_evaluator;

use std::sync::Arc;

use anyhow::Result;
use kube::api::{ListParams, ObjectMeta, Patch, PatchParams};
use kube::{Api, Client, ResourceExt};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::PolicyControllerConfig;
use crate::depclient::{DependencyWatcher, ObjectIdentifier};
use crate::locator::DiscoverySnapshot;
use crate::models::configuration_policy::ConfigurationPolicy;
use crate::models::operator_policy::OperatorPolicy;
use crate::scheduler::{dedupe_by_name_and_resource_version, run_scheduler_loop, DiscoveryCache, DiscoveryOutcome, EvaluationLock};
use crate::status::EventOwner;
use crate::template::{EncryptionKeyCache, NoopResolver};
use configuration_policy::WatchedClusterStore;
use dynamic_store::{KubeClusterStore, KubeDependencyWatcher};

const FIELD_MANAGER: &str = "policy-reconciler";

/// The policy's first owner reference, the object a compliance Event is
/// attached to (spec.md §4.G item 5).
fn event_owner(meta: &ObjectMeta) -> Option<EventOwner> {
    let owner = meta.owner_references.as_ref()?.first()?;
    Some(EventOwner {
        kind: owner.kind.clone(),
        name: owner.name.clone(),
        uid: owner.uid.clone(),
        api_version: owner.api_version.clone(),
    })
}

fn resource_version_of(meta: &ObjectMeta) -> String {
    meta.resource_version.clone().unwrap_or_default()
}

/// Discovers every API resource currently served by the cluster into a
/// [`DiscoverySnapshot`] (spec.md §3 "Discovery Snapshot").
async fn refresh_discovery(client: &Client) -> DiscoverySnapshot {
    let discovery = kube::discovery::Discovery::new(client.clone());
    let discovery = match discovery.run().await {
        Ok(d) => d,
        Err(err) => {
            error!(error = %err, "discovery refresh failed");
            return DiscoverySnapshot::default();
        },
    };

    let mut resources = Vec::new();
    for group in discovery.groups() {
        for (ar, caps) in group.recommended_resources() {
            let namespaced = caps.scope == kube::discovery::Scope::Namespaced;
            resources.push((ar, namespaced));
        }
    }

    DiscoverySnapshot::new(resources)
}

/// Spawns the ConfigurationPolicy and OperatorPolicy evaluator loops, each
/// driven by its own [`crate::scheduler::run_scheduler_loop`] pass (spec.md
/// §5: "one evaluator task per policy-kind").
pub async fn start_controllers(client: Client, config: PolicyControllerConfig) -> Result<JoinHandle<()>> {
    info!("Starting policy evaluator loops");

    let lock = EvaluationLock::new();
    let discovery_cache = Arc::new(DiscoveryCache::new());
    let key_cache = EncryptionKeyCache::new();
    let watcher: Arc<dyn DependencyWatcher> = Arc::new(KubeDependencyWatcher::new(client.clone()));

    let cfg_client = client.clone();
    let cfg_config = config.clone();
    let cfg_lock = lock.clone();
    let cfg_discovery_cache = discovery_cache.clone();
    let cfg_key_cache = key_cache.clone();
    let cfg_watcher = watcher.clone();
    let configuration_policy_handle = tokio::spawn(async move {
        run_scheduler_loop("ConfigurationPolicy", cfg_config.reconcile_frequency_seconds, cfg_config.test_mode, move || {
            let client = cfg_client.clone();
            let lock = cfg_lock.clone();
            let discovery_cache = cfg_discovery_cache.clone();
            let key_cache = cfg_key_cache.clone();
            let watcher = cfg_watcher.clone();
            async move { run_configuration_policy_pass(&client, &lock, &discovery_cache, &key_cache, &watcher).await }
        })
        .await;
    });

    let op_client = client.clone();
    let op_config = config.clone();
    let op_lock = lock.clone();
    let operator_policy_handle = tokio::spawn(async move {
        run_scheduler_loop("OperatorPolicy", op_config.reconcile_frequency_seconds, op_config.test_mode, move || {
            let client = op_client.clone();
            let lock = op_lock.clone();
            let default_namespace = op_config.default_operator_namespace.clone();
            async move { run_operator_policy_pass(&client, &lock, &default_namespace).await }
        })
        .await;
    });

    let handle = tokio::spawn(async move {
        let _ = tokio::join!(configuration_policy_handle, operator_policy_handle);
        info!("Policy evaluator loops stopped");
    });

    Ok(handle)
}

/// One scheduler pass over every ConfigurationPolicy (spec.md §4.H). The
/// per-policy pipeline itself is [`configuration_policy::evaluate`]; this
/// function is the thin `kube::Api` adapter around it described in
/// `controller::configuration_policy`'s module docs.
async fn run_configuration_policy_pass(
    client: &Client,
    lock: &EvaluationLock,
    discovery_cache: &DiscoveryCache,
    key_cache: &EncryptionKeyCache,
    watcher: &Arc<dyn DependencyWatcher>,
) {
    let api: Api<ConfigurationPolicy> = Api::all(client.clone());
    let policies = match api.list(&ListParams::default()).await {
        Ok(list) => list.items,
        Err(err) => {
            error!(error = %err, "failed to list ConfigurationPolicy objects");
            return;
        },
    };

    let policies = dedupe_by_name_and_resource_version(policies, |p| {
        (p.metadata.name.clone().unwrap_or_default(), resource_version_of(&p.metadata))
    });

    if policies.is_empty() {
        return;
    }

    let snapshot = match discovery_cache.refresh(refresh_discovery(client).await) {
        DiscoveryOutcome::Use(snapshot) => snapshot,
        DiscoveryOutcome::SkipPass => {
            warn!("discovery snapshot and cache are both empty; skipping this ConfigurationPolicy pass");
            return;
        },
    };
    let store = KubeClusterStore::new(client.clone());

    for policy in policies {
        let _guard = lock.lock().await;
        let name = policy.name_any();
        let namespace = policy.namespace().unwrap_or_default();
        debug!(policy = %name, namespace = %namespace, "evaluating ConfigurationPolicy");

        let id = ObjectIdentifier::for_policy("ConfigurationPolicy", &namespace, &name);
        watcher.start_query_batch(&id).await;
        let watched_store = WatchedClusterStore::new(&store, watcher.clone(), id.clone());

        let outcome = configuration_policy::evaluate(
            &policy.spec,
            policy.status.clone().unwrap_or_default(),
            &namespace,
            &name,
            &watched_store,
            &NoopResolver,
            &snapshot,
            event_owner(&policy.metadata),
            None,
            key_cache,
        )
        .await;

        watcher.end_query_batch(&id).await;

        if let Some(event) = outcome.event {
            match event.event_type {
                crate::status::EventType::Warning => warn!(reason = %event.reason, message = %event.message, "policy compliance event"),
                crate::status::EventType::Normal => info!(reason = %event.reason, message = %event.message, "policy compliance event"),
            }
        }

        let patch = serde_json::json!({ "status": outcome.status });
        if let Err(err) = api.patch_status(&name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch)).await {
            error!(policy = %name, error = %err, "failed to patch ConfigurationPolicy status");
        }
    }
}

/// One scheduler pass over every OperatorPolicy (spec.md §4.H), built the
/// same way as [`run_configuration_policy_pass`]. `default_namespace` is
/// the operator namespace used when `spec.subscription.namespace` is unset.
async fn run_operator_policy_pass(client: &Client, lock: &EvaluationLock, default_namespace: &str) {
    let api: Api<OperatorPolicy> = Api::all(client.clone());
    let policies = match api.list(&ListParams::default()).await {
        Ok(list) => list.items,
        Err(err) => {
            error!(error = %err, "failed to list OperatorPolicy objects");
            return;
        },
    };

    let policies = dedupe_by_name_and_resource_version(policies, |p| {
        (p.metadata.name.clone().unwrap_or_default(), resource_version_of(&p.metadata))
    });

    // Every other policy's last-recorded resolved subscription label, read
    // once up front (spec.md §4.E "Overlap").
    let baseline: Vec<(String, String, String)> = policies
        .iter()
        .filter_map(|p| {
            let label = p.status.as_ref()?.resolved_subscription_label.clone()?;
            Some((p.name_any(), p.namespace().unwrap_or_default(), label))
        })
        .collect();

    for policy in policies {
        let _guard = lock.lock().await;
        let name = policy.name_any();
        let namespace = policy.namespace().unwrap_or_default();
        debug!(policy = %name, namespace = %namespace, "evaluating OperatorPolicy");

        let outcome = operator_policy_evaluator::evaluate(
            client,
            &policy.spec,
            policy.status.clone().unwrap_or_default(),
            &namespace,
            &name,
            default_namespace,
            &baseline,
            event_owner(&policy.metadata),
        )
        .await;

        if let Some(event) = outcome.event {
            match event.event_type {
                crate::status::EventType::Warning => warn!(reason = %event.reason, message = %event.message, "policy compliance event"),
                crate::status::EventType::Normal => info!(reason = %event.reason, message = %event.message, "policy compliance event"),
            }
        }

        let patch = serde_json::json!({ "status": outcome.status });
        if let Err(err) = api.patch_status(&name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch)).await {
            error!(policy = %name, error = %err, "failed to patch OperatorPolicy status");
        }
    }
}
