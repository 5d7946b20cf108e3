//! Compliance Status Engine (spec.md §4.G).
//!
//! One call here updates exactly one condition, folds the known aspect
//! conditions into an overall `Compliant` condition, sorts conditions and
//! related objects, and decides whether a compliance event needs to be
//! emitted. Used directly by the OperatorPolicy evaluator (whose aspects are
//! named conditions) and conceptually mirrored by the ConfigurationPolicy
//! evaluator's per-template accumulation in `controller::configuration_policy`.

use chrono::Utc;

use crate::models::condition::{append_condition, Condition, ConditionStatus, RelatedObject};
use crate::models::operator_policy::COMPLIANT_CONDITION_TYPE;

/// Update a single named condition in place. Returns whether the condition's
/// (status, reason, message) actually changed — `lastTransitionTime` is
/// never considered (spec.md §4.G item 1, grounds Go's `conditionChanged`).
pub fn update_condition(conditions: &mut Vec<Condition>, mut updated: Condition) -> bool {
    match conditions.iter().position(|c| c.type_ == updated.type_) {
        None => {
            conditions.push(updated);
            true
        },
        Some(idx) => {
            let existing = &conditions[idx];
            if existing.content_eq(&updated) {
                false
            } else {
                updated.last_transition_time = Utc::now();
                conditions[idx] = updated;
                true
            }
        },
    }
}

/// One aspect the overall `Compliant` condition folds over: a condition type
/// plus the human name used in its "unknown" message
/// (`"the status of the {name} is unknown"`).
pub struct Aspect<'a> {
    pub condition_type: &'a str,
    pub name: &'a str,
}

/// Fold a fixed, ordered list of aspect conditions into the overall
/// `Compliant` condition (spec.md §4.G item 2; SPEC_FULL.md §16
/// `calculateComplianceCondition`). Missing aspects count as non-compliant
/// and contribute an "unknown" message; present aspects contribute their own
/// message regardless of status.
pub fn calculate_compliance_condition(conditions: &[Condition], aspects: &[Aspect]) -> Condition {
    let mut found_noncompliant = false;
    let mut messages = Vec::with_capacity(aspects.len());

    for aspect in aspects {
        match conditions.iter().find(|c| c.type_ == aspect.condition_type) {
            None => {
                messages.push(format!("the status of the {} is unknown", aspect.name));
                found_noncompliant = true;
            },
            Some(cond) => {
                messages.push(cond.message.clone());
                if cond.status != ConditionStatus::True {
                    found_noncompliant = true;
                }
            },
        }
    }

    if found_noncompliant {
        Condition::new(
            COMPLIANT_CONDITION_TYPE,
            ConditionStatus::False,
            "NonCompliant",
            format!("NonCompliant; {}", messages.join(", ")),
        )
    } else {
        Condition::new(
            COMPLIANT_CONDITION_TYPE,
            ConditionStatus::True,
            "Compliant",
            format!("Compliant; {}", messages.join(", ")),
        )
    }
}

/// The outcome of a single status update call: did the compliance verdict
/// change (and therefore does an event need emitting), plus the final
/// overall condition.
pub struct StatusUpdateOutcome {
    pub overall: Condition,
    pub compliance_changed: bool,
}

/// Apply one aspect condition update, recompute the overall condition, sort
/// conditions by type, and report whether a compliance event should be
/// emitted (spec.md §4.G items 1-3).
pub fn apply_condition_update(
    conditions: &mut Vec<Condition>,
    updated: Condition,
    aspects: &[Aspect],
) -> StatusUpdateOutcome {
    let changed = update_condition(conditions, updated);

    let overall = calculate_compliance_condition(conditions, aspects);
    let compliance_changed = if changed {
        update_condition(conditions, overall.clone())
    } else {
        false
    };

    conditions.sort_by(|a, b| a.type_.cmp(&b.type_));

    StatusUpdateOutcome {
        overall,
        compliance_changed,
    }
}

/// Append (not replace) a condition for the append-only ConfigurationPolicy
/// template-status model, deduping against only the immediately preceding
/// entry (spec.md §3 invariant).
pub fn append_template_condition(conditions: &mut Vec<Condition>, new: Condition) {
    append_condition(conditions, new);
}

/// Identity of the object a compliance Event is emitted against: the
/// policy's first owner reference (spec.md §6, grounds `emitComplianceEvent`).
#[derive(Debug, Clone)]
pub struct EventOwner {
    pub kind: String,
    pub name: String,
    pub uid: String,
    pub api_version: String,
}

#[derive(Debug, Clone)]
pub struct ComplianceEvent {
    pub owner: EventOwner,
    pub namespace: String,
    pub reason: String,
    pub message: String,
    pub event_type: EventType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Normal,
    Warning,
}

/// Builds the event to emit for a compliance transition (spec.md §6: reason
/// `policy: <ns>/<name>`, Warning if NonCompliant else Normal). Returns
/// `None` if the policy has no owner reference — there's nothing to attach
/// the event to (spec.md §4.G item 5).
pub fn build_compliance_event(
    owner: Option<EventOwner>,
    namespace: &str,
    policy_name: &str,
    overall: &Condition,
) -> Option<ComplianceEvent> {
    let owner = owner?;

    Some(ComplianceEvent {
        owner,
        namespace: namespace.to_string(),
        reason: format!("policy: {namespace}/{policy_name}"),
        message: overall.message.clone(),
        event_type: if overall.status == ConditionStatus::True {
            EventType::Normal
        } else {
            EventType::Warning
        },
    })
}

/// Merge a fresh batch of same-kind related objects into the previous list
/// (spec.md §4.G item 4); thin re-export of the models-level helper so
/// callers only need to import `status`.
pub use crate::models::condition::merge_related_objects_for_kind;

pub fn sorted_related_objects(objs: Vec<RelatedObject>) -> Vec<RelatedObject> {
    crate::models::condition::sort_and_dedupe_related_objects(objs)
}
