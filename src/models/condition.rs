use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A Kubernetes-style condition. See spec.md §3 "Condition".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: ConditionStatus,
    pub reason: String,
    pub message: String,
    #[serde(rename = "lastTransitionTime")]
    pub last_transition_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl Condition {
    pub fn new(
        type_: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: Utc::now(),
        }
    }

    /// spec.md §3: "Similar" = type+status+reason+message all match.
    pub fn is_similar(&self, other: &Condition) -> bool {
        self.type_ == other.type_
            && self.status == other.status
            && self.reason == other.reason
            && self.message == other.message
    }

    /// Same type+status+reason+message ignoring lastTransitionTime, used by
    /// the Compliance Status Engine to decide whether a condition "changed".
    pub fn content_eq(&self, other: &Condition) -> bool {
        self.is_similar(other)
    }
}

/// Properties attached to a related object. See spec.md §3.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ObjectProperties {
    #[serde(rename = "createdByPolicy", skip_serializing_if = "Option::is_none")]
    pub created_by_policy: Option<bool>,
    #[serde(rename = "uid", skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}

/// The identity of a related object: apiVersion/kind/namespace/name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ObjectResource {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
}

/// A resource the policy inspected or mutated, with its own compliance
/// verdict. See spec.md §3 "Related Object" and invariants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RelatedObject {
    pub object: ObjectResource,
    pub compliant: String,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<ObjectProperties>,
}

impl RelatedObject {
    pub fn sort_key(&self) -> (String, String, String) {
        (
            self.object.kind.clone(),
            self.object.namespace.clone().unwrap_or_default(),
            self.object.name.clone(),
        )
    }
}

/// Sort related objects by (kind, namespace, name) per spec.md §3 invariant,
/// and drop duplicates (same sort key keeps the first occurrence).
pub fn sort_and_dedupe_related_objects(mut objs: Vec<RelatedObject>) -> Vec<RelatedObject> {
    objs.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    objs.dedup_by(|a, b| a.sort_key() == b.sort_key());
    objs
}

/// Merge a freshly computed batch of related objects (all of the same kind)
/// into the previous list, preserving unrelated kinds and copying forward a
/// `createdByPolicy = true` flag that the fresh read can no longer confirm
/// (spec.md §3 invariant: createdByPolicy is monotonic; see SPEC_FULL.md §16
/// "related-objects-changed detection").
pub fn merge_related_objects_for_kind(
    previous: &[RelatedObject],
    kind: &str,
    fresh: Vec<RelatedObject>,
) -> Vec<RelatedObject> {
    let mut merged: Vec<RelatedObject> = previous
        .iter()
        .filter(|o| o.object.kind != kind)
        .cloned()
        .collect();

    let mut fresh = fresh;
    for obj in &mut fresh {
        if let Some(prev) = previous.iter().find(|p| p.object.name == obj.object.name) {
            let prev_created = prev
                .properties
                .as_ref()
                .and_then(|p| p.created_by_policy)
                .unwrap_or(false);
            if prev_created {
                let props = obj.properties.get_or_insert_with(ObjectProperties::default);
                props.created_by_policy = Some(true);
            }
        }
    }

    merged.extend(fresh);
    sort_and_dedupe_related_objects(merged)
}

/// Append a condition to a list, deduping against only the immediately
/// preceding entry (spec.md §3 invariant and §9 Open Question: the dedup
/// window is deliberately one entry, not the whole history).
pub fn append_condition(conditions: &mut Vec<Condition>, new: Condition) {
    if let Some(last) = conditions.last() {
        if last.is_similar(&new) {
            return;
        }
    }
    conditions.push(new);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cond(reason: &str) -> Condition {
        Condition::new("Compliant", ConditionStatus::True, reason, "msg")
    }

    #[test]
    fn append_condition_dedupes_against_immediate_predecessor_only() {
        let mut conds = vec![cond("A")];
        append_condition(&mut conds, cond("A"));
        assert_eq!(conds.len(), 1, "identical condition should not duplicate");

        append_condition(&mut conds, cond("B"));
        append_condition(&mut conds, cond("A"));
        assert_eq!(
            conds.len(),
            3,
            "reappearing after a different condition is not deduped"
        );
    }

    #[test]
    fn sort_and_dedupe_orders_by_kind_namespace_name() {
        let make = |kind: &str, name: &str| RelatedObject {
            object: ObjectResource {
                api_version: "v1".into(),
                kind: kind.into(),
                namespace: Some("ns".into()),
                name: name.into(),
            },
            compliant: "Compliant".into(),
            reason: "x".into(),
            properties: None,
        };

        let objs = vec![make("Pod", "b"), make("ConfigMap", "a"), make("Pod", "a")];
        let sorted = sort_and_dedupe_related_objects(objs);
        let names: Vec<_> = sorted.iter().map(|o| o.object.name.clone()).collect();
        assert_eq!(names, vec!["a", "a", "b"]);
        assert_eq!(sorted[0].object.kind, "ConfigMap");
    }

    #[test]
    fn merge_preserves_created_by_policy_monotonically() {
        let created = RelatedObject {
            object: ObjectResource {
                api_version: "v1".into(),
                kind: "ConfigMap".into(),
                namespace: Some("ns".into()),
                name: "cm".into(),
            },
            compliant: "Compliant".into(),
            reason: "x".into(),
            properties: Some(ObjectProperties {
                created_by_policy: Some(true),
                uid: Some("123".into()),
            }),
        };

        let fresh = RelatedObject {
            properties: Some(ObjectProperties {
                created_by_policy: None,
                uid: Some("123".into()),
            }),
            ..created.clone()
        };

        let merged = merge_related_objects_for_kind(&[created], "ConfigMap", vec![fresh]);
        assert_eq!(
            merged[0].properties.as_ref().unwrap().created_by_policy,
            Some(true)
        );
    }
}
