//! Structural Comparator (spec.md §4.A).
//!
//! Given a desired (template) value and a live (cluster) value under a
//! [`ComplianceType`], computes a merged value suitable for comparing against
//! the live value to decide whether an update is needed, and whether that
//! merge can even be attempted (a map compared against a scalar, for
//! example, is a hard type mismatch).

use serde_json::{Map, Value};
use thiserror::Error;

use crate::models::ComplianceType;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ComparisonError {
    #[error("Error merging changes into key \"{key}\": object type of template and existing do not match")]
    TypeMismatch { key: String },
}

/// Top-level keys never compared: `apiVersion`/`kind` identify the resource,
/// not its state, and `status` is a subresource the comparator never touches
/// (spec.md §4.A "Key filtering").
const IGNORED_TOP_LEVEL_KEYS: &[&str] = &["apiVersion", "kind", "status"];

/// Annotations the comparator strips before comparing `metadata`, regardless
/// of compliance type (spec.md §4.A).
const AUTOGENERATED_ANNOTATIONS: &[&str] = &[
    "kubectl.kubernetes.io/last-applied-configuration",
    "control-plane.alpha.kubernetes.io/leader",
];

fn is_autogenerated_annotation(key: &str) -> bool {
    AUTOGENERATED_ANNOTATIONS.contains(&key) || key.starts_with("kubernetes.io/controller-")
}

/// Reduce a `metadata` map to just `labels` and non-autogenerated
/// `annotations`, the only pieces of metadata the comparator considers
/// (spec.md §4.A: "for metadata compare only labels/annotations").
fn format_metadata(metadata: &Value) -> Value {
    let mut out = Map::new();
    let Some(obj) = metadata.as_object() else {
        return Value::Object(out);
    };

    if let Some(labels) = obj.get("labels") {
        out.insert("labels".to_string(), labels.clone());
    }

    if let Some(Value::Object(annos)) = obj.get("annotations") {
        let filtered: Map<String, Value> = annos
            .iter()
            .filter(|(k, _)| !is_autogenerated_annotation(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if !filtered.is_empty() {
            out.insert("annotations".to_string(), Value::Object(filtered));
        }
    }

    Value::Object(out)
}

/// The overall result of comparing a whole object template against a live
/// object.
#[derive(Debug, Clone)]
pub struct ObjectComparison {
    pub merged: Value,
    pub needs_update: bool,
}

/// Compare a whole desired object against the live object, key by key
/// (spec.md §4.A top-level rules; grounds Go's `handleKeys`/`handleSingleKey`).
///
/// `metadata_compliance_type`, if set, overrides `compliance_type` when
/// comparing the `metadata` key only.
pub fn compare_object(
    desired: &Value,
    live: &Value,
    compliance_type: ComplianceType,
    metadata_compliance_type: Option<ComplianceType>,
) -> Result<ObjectComparison, ComparisonError> {
    let desired_obj = desired.as_object().cloned().unwrap_or_default();
    let live_obj = live.as_object().cloned().unwrap_or_default();

    let mut merged = Map::new();
    let mut needs_update = false;

    for (key, desired_value) in &desired_obj {
        if IGNORED_TOP_LEVEL_KEYS.contains(&key.as_str()) {
            continue;
        }

        let live_value = live_obj.get(key).cloned().unwrap_or(Value::Null);

        let key_ctype = if key == "metadata" {
            metadata_compliance_type.unwrap_or(compliance_type)
        } else {
            compliance_type
        };

        let mut desired_value = desired_value.clone();
        let mut live_value = live_value;

        if key == "metadata" {
            desired_value = format_metadata(&desired_value);
            live_value = format_metadata(&live_value);
        }

        let merged_value = compare_value(key, &desired_value, &live_value, key_ctype)?;

        if !equal_after_sort(&merged_value, &live_value) {
            needs_update = true;
        }

        merged.insert(key.clone(), merged_value);
    }

    Ok(ObjectComparison {
        merged: Value::Object(merged),
        needs_update,
    })
}

/// Compares one field's desired/live value and returns the merged value to
/// diff against. Grounds Go's `handleSingleKey` per-type switch.
fn compare_value(
    key: &str,
    desired: &Value,
    live: &Value,
    ctype: ComplianceType,
) -> Result<Value, ComparisonError> {
    match (desired, live) {
        (Value::Array(d), Value::Array(l)) => Ok(Value::Array(compare_lists(d, l, ctype))),
        (Value::Array(d), Value::Null) => Ok(Value::Array(d.clone())),
        (Value::Array(_), _) => Err(ComparisonError::TypeMismatch { key: key.to_string() }),
        (Value::Object(d), Value::Object(l)) => Ok(compare_specs(d, l, ctype)),
        (Value::Object(d), Value::Null) => Ok(Value::Object(d.clone())),
        (Value::Object(_), _) => Err(ComparisonError::TypeMismatch { key: key.to_string() }),
        (d, _) => Ok(d.clone()),
    }
}

/// `compareSpecs`: returns the template map for `mustonlyhave`, or a merged
/// map for `musthave` (extra live-only keys tolerated and copied in).
pub fn compare_specs(desired: &Map<String, Value>, live: &Map<String, Value>, ctype: ComplianceType) -> Value {
    if ctype.is_mustonlyhave() {
        return Value::Object(desired.clone());
    }

    merge_maps(desired, live, ctype)
}

/// `mergeSpecsHelper` for the map case: recursively merges fields present in
/// `live` but absent from `desired` into the result (musthave tolerance),
/// and recurses into shared keys.
fn merge_maps(desired: &Map<String, Value>, live: &Map<String, Value>, ctype: ComplianceType) -> Value {
    let mut merged = desired.clone();

    for (k, live_v) in live {
        match merged.get(k) {
            Some(desired_v) => {
                let m = merge_values(desired_v, live_v, ctype);
                merged.insert(k.clone(), m);
            },
            None => {
                merged.insert(k.clone(), live_v.clone());
            },
        }
    }

    Value::Object(merged)
}

/// `mergeSpecsHelper`: the fully recursive merge used both at the top level
/// (through `compare_specs`) and inside nested maps/lists.
fn merge_values(desired: &Value, live: &Value, ctype: ComplianceType) -> Value {
    match (desired, live) {
        (Value::Object(d), Value::Object(l)) => merge_maps(d, l, ctype),
        (Value::Object(d), _) => Value::Object(d.clone()),
        (Value::Array(d), Value::Array(l)) if !l.is_empty() => {
            Value::Array(merge_arrays(d, l, ctype))
        },
        (Value::Array(d), _) => Value::Array(d.clone()),
        (Value::Null, Value::Object(l)) if ctype.is_musthave() => Value::Object(l.clone()),
        (d, _) => d.clone(),
    }
}

/// `compareLists`: for `mustonlyhave`, zips desired and live element-wise up
/// to `desired`'s length (recursively merging maps so extra live-only keys
/// inside each element are still dropped) and appends any desired tail that
/// extends past the live list's length. For `musthave`, delegates to
/// [`merge_arrays`].
fn compare_lists(desired: &[Value], live: &[Value], ctype: ComplianceType) -> Vec<Value> {
    if !ctype.is_mustonlyhave() {
        return merge_arrays(desired, live, ctype);
    }

    desired
        .iter()
        .enumerate()
        .map(|(idx, item)| match live.get(idx) {
            Some(live_item) => merge_values(item, live_item, ctype),
            None => item.clone(),
        })
        .collect()
}

/// `mergeArrays`: union-with-multiplicity matching used for `musthave` (and
/// `mustnothave`, which never reaches here with a meaningful merge).
///
/// Every live element is matched against the first not-yet-claimed desired
/// element it's equal to (after recursively merging, for element maps); live
/// elements with no match are appended to the desired tail, preserving
/// multiplicity (a live element repeated N times that matches nothing in
/// desired is appended N times).
fn merge_arrays(desired: &[Value], live: &[Value], ctype: ComplianceType) -> Vec<Value> {
    if ctype.is_mustonlyhave() {
        return desired.to_vec();
    }

    let mut result = desired.to_vec();
    let mut claimed = vec![false; result.len()];

    // Count multiplicities of each distinct live value so repeats that
    // aren't all matched still get appended the right number of times.
    let mut counts: Vec<(Value, usize)> = Vec::new();
    for v in live {
        if let Some(entry) = counts.iter_mut().find(|(val, _)| val == v) {
            entry.1 += 1;
        } else {
            counts.push((v.clone(), 1));
        }
    }

    for (live_val, required_count) in counts {
        let mut matched = 0usize;

        for (idx, desired_val) in result.clone().iter().enumerate() {
            if claimed[idx] {
                continue;
            }

            let candidate = match (desired_val, &live_val) {
                (Value::Object(d), Value::Object(l)) => compare_specs(d, l, ctype),
                _ => desired_val.clone(),
            };

            if equal_after_sort(&candidate, &live_val) {
                result[idx] = candidate;
                claimed[idx] = true;
                matched += 1;
            }
        }

        if matched < required_count {
            for _ in 0..(required_count - matched) {
                result.push(live_val.clone());
            }
        }
    }

    result
}

/// `equalAfterSort`: deep equality where array order doesn't matter — both
/// sides' arrays (recursively) are sorted by their canonical string form
/// before comparing.
pub fn equal_after_sort(a: &Value, b: &Value) -> bool {
    canonicalize(a) == canonicalize(b)
}

fn canonicalize(v: &Value) -> Value {
    match v {
        Value::Array(items) => {
            let mut items: Vec<Value> = items.iter().map(canonicalize).collect();
            items.sort_by(|x, y| x.to_string().cmp(&y.to_string()));
            Value::Array(items)
        },
        Value::Object(obj) => {
            let mut out = Map::new();
            for (k, v) in obj {
                out.insert(k.clone(), canonicalize(v));
            }
            Value::Object(out)
        },
        other => other.clone(),
    }
}
