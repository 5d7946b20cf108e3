//! Build stage: turn `spec.subscription`/`spec.operatorGroup` into concrete
//! Subscription/OperatorGroup objects (spec.md §4.E "Build"; grounds Go's
//! `buildSubscription`/`buildOperatorGroup`).

use serde_json::Value;

use crate::models::compliance::{RemediationAction, UpgradeApproval};

/// Fields the original Subscription spec recognizes. Anything else in
/// `spec.subscription` is a validation error (grounds the Go decoder's
/// `DisallowUnknownFields`).
const SUBSCRIPTION_ALLOWED_FIELDS: &[&str] = &[
    "name",
    "namespace",
    "channel",
    "source",
    "sourceNamespace",
    "startingCSV",
    "config",
];

const OPERATOR_GROUP_ALLOWED_FIELDS: &[&str] = &["name", "namespace", "targetNamespaces"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltSubscription {
    pub name: String,
    pub namespace: String,
    pub channel: Option<String>,
    pub source: Option<String>,
    pub source_namespace: Option<String>,
    pub starting_csv: Option<String>,
    pub install_plan_approval: &'static str,
}

/// The subset of a PackageManifest's status this stage needs (spec.md §4.E
/// "Build": "defaults channel/source/sourceNamespace from the package's
/// PackageManifest when unset, flags a conflict when the policy names one
/// the package doesn't offer").
#[derive(Debug, Clone, Default)]
pub struct PackageManifestInfo {
    pub default_channel: Option<String>,
    pub catalog_source: Option<String>,
    pub catalog_source_namespace: Option<String>,
    pub channels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltOperatorGroup {
    pub name: Option<String>,
    pub generate_name: Option<String>,
    pub namespace: String,
    pub target_namespaces: Vec<String>,
}

fn is_dns1123_label(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= 63
        && s.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !s.starts_with('-')
        && !s.ends_with('-')
}

fn reject_unknown_fields(obj: &Value, allowed: &[&str], what: &str) -> Result<(), String> {
    let Some(map) = obj.as_object() else {
        return Err(format!("the policy {what} is invalid: expected a JSON object"));
    };

    if let Some(unknown) = map.keys().find(|k| !allowed.contains(&k.as_str())) {
        return Err(format!("the policy {what} is invalid: unknown field \"{unknown}\""));
    }

    Ok(())
}

/// `buildSubscription`: validates and fills in the Subscription, forcing
/// `installPlanApproval` to Manual except in the one case spec.md §4.E
/// "Build" names. `package_manifest`, when available, supplies
/// channel/source/sourceNamespace defaults for anything the policy left
/// unset, and flags a conflict when the policy pins a channel the package
/// doesn't actually offer.
pub fn build_subscription(
    raw: &Value,
    default_namespace: &str,
    remediation_action: RemediationAction,
    upgrade_approval: UpgradeApproval,
    versions: &[String],
    package_manifest: Option<&PackageManifestInfo>,
) -> Result<BuiltSubscription, String> {
    reject_unknown_fields(raw, SUBSCRIPTION_ALLOWED_FIELDS, "spec.subscription")?;

    let name = raw
        .get("name")
        .and_then(Value::as_str)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| "name is required in spec.subscription".to_string())?;
    if !is_dns1123_label(name) {
        return Err(format!("the name '{name}' used for the subscription is invalid"));
    }

    let namespace = match raw.get("namespace").and_then(Value::as_str) {
        Some(ns) => ns.to_string(),
        None if !default_namespace.is_empty() => default_namespace.to_string(),
        None => return Err("namespace is required in spec.subscription".to_string()),
    };
    if !is_dns1123_label(&namespace) {
        return Err(format!("the namespace '{namespace}' used for the subscription is not a valid namespace identifier"));
    }

    let install_plan_approval = if remediation_action.is_enforce()
        && upgrade_approval == UpgradeApproval::Automatic
        && versions.is_empty()
    {
        "Automatic"
    } else {
        "Manual"
    };

    let channel = raw.get("channel").and_then(Value::as_str).map(str::to_string);
    let source = raw.get("source").and_then(Value::as_str).map(str::to_string);
    let source_namespace = raw.get("sourceNamespace").and_then(Value::as_str).map(str::to_string);

    if let (Some(channel), Some(pm)) = (&channel, package_manifest) {
        if !pm.channels.is_empty() && !pm.channels.contains(channel) {
            return Err(format!(
                "the channel '{channel}' requested for subscription '{name}' is not offered by its package (available: {})",
                pm.channels.join(", ")
            ));
        }
    }

    let (channel, source, source_namespace) = match package_manifest {
        Some(pm) => (
            channel.or_else(|| pm.default_channel.clone()),
            source.or_else(|| pm.catalog_source.clone()),
            source_namespace.or_else(|| pm.catalog_source_namespace.clone()),
        ),
        None => (channel, source, source_namespace),
    };

    Ok(BuiltSubscription {
        name: name.to_string(),
        namespace,
        channel,
        source,
        source_namespace,
        starting_csv: raw.get("startingCSV").and_then(Value::as_str).map(str::to_string),
        install_plan_approval,
    })
}

/// `buildOperatorGroup`: synthesizes a default OperatorGroup (`generateName
/// = <ns>-`, empty target namespaces) when the policy specifies none, or
/// validates the user-specified one against the subscription's namespace.
pub fn build_operator_group(raw: Option<&Value>, namespace: &str) -> Result<BuiltOperatorGroup, String> {
    let Some(raw) = raw else {
        return Ok(BuiltOperatorGroup {
            name: None,
            generate_name: Some(format!("{namespace}-")),
            namespace: namespace.to_string(),
            target_namespaces: Vec::new(),
        });
    };

    reject_unknown_fields(raw, OPERATOR_GROUP_ALLOWED_FIELDS, "spec.operatorGroup")?;

    if let Some(specified_ns) = raw.get("namespace").and_then(Value::as_str) {
        if !specified_ns.is_empty() && specified_ns != namespace && !namespace.is_empty() {
            return Err(format!(
                "the namespace specified in spec.operatorGroup ('{specified_ns}') must match the \
                 namespace used for the subscription ('{namespace}')"
            ));
        }
    }

    let name = raw
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| "name is required in spec.operatorGroup".to_string())?
        .to_string();

    let target_namespaces = raw
        .get("targetNamespaces")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();

    Ok(BuiltOperatorGroup {
        name: Some(name),
        generate_name: None,
        namespace: namespace.to_string(),
        target_namespaces,
    })
}
