//! Operator Group stage (spec.md §4.E "Operator Group"; grounds Go's
//! `handleOpGroup`/`musthaveOpGroup`/`mustnothaveOpGroup`).

use crate::models::compliance::RemovalBehavior;
use crate::models::condition::{Condition, ConditionStatus};
use crate::models::operator_policy::OP_GROUP_CONDITION_TYPE;

use super::build::BuiltOperatorGroup;

#[derive(Debug, Clone)]
pub struct FoundOperatorGroup {
    pub name: String,
    pub target_namespaces: Vec<String>,
    pub has_owner_references: bool,
    pub has_deletion_timestamp: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    None,
    Create,
    Update,
    Delete,
}

pub struct OpGroupDecision {
    pub action: Action,
    pub condition: Condition,
}

fn spec_matches(found: &FoundOperatorGroup, desired: &BuiltOperatorGroup) -> bool {
    let mut found_ns = found.target_namespaces.clone();
    let mut desired_ns = desired.target_namespaces.clone();
    found_ns.sort();
    desired_ns.sort();
    found_ns == desired_ns
}

fn identity_matches(found: &FoundOperatorGroup, desired: &BuiltOperatorGroup) -> bool {
    match (&desired.name, &desired.generate_name) {
        (Some(name), _) => &found.name == name,
        (None, Some(prefix)) => found.name.starts_with(prefix.as_str()),
        (None, None) => false,
    }
}

fn condition(status: ConditionStatus, reason: &str, message: impl Into<String>) -> Condition {
    Condition::new(OP_GROUP_CONDITION_TYPE, status, reason, message)
}

/// Musthave branch (spec.md §4.E "Operator Group" bullet list).
pub fn musthave(found: &[FoundOperatorGroup], desired: &BuiltOperatorGroup, enforce: bool) -> OpGroupDecision {
    match found.len() {
        0 => {
            if enforce {
                OpGroupDecision {
                    action: Action::Create,
                    condition: condition(ConditionStatus::True, "OperatorGroupCreated", "the OperatorGroup was created"),
                }
            } else {
                OpGroupDecision {
                    action: Action::None,
                    condition: condition(ConditionStatus::False, "OperatorGroupMissing", "the OperatorGroup is required but does not exist"),
                }
            }
        },
        1 => {
            let found = &found[0];
            if !identity_matches(found, desired) {
                return if desired.name.is_none() {
                    OpGroupDecision {
                        action: Action::None,
                        condition: condition(ConditionStatus::True, "PreexistingOperatorGroup", format!("the OperatorGroup {} was found and is assumed to be managed outside this policy", found.name)),
                    }
                } else {
                    OpGroupDecision {
                        action: Action::None,
                        condition: condition(ConditionStatus::False, "OperatorGroupMismatch", format!("an OperatorGroup already exists as {}, and its name does not match", found.name)),
                    }
                };
            }

            if spec_matches(found, desired) {
                OpGroupDecision {
                    action: Action::None,
                    condition: condition(ConditionStatus::True, "OperatorGroupMatches", "the OperatorGroup matches the specified OperatorGroup"),
                }
            } else if enforce {
                OpGroupDecision {
                    action: Action::Update,
                    condition: condition(ConditionStatus::True, "OperatorGroupUpdated", "the OperatorGroup was updated to match the specified OperatorGroup"),
                }
            } else {
                OpGroupDecision {
                    action: Action::None,
                    condition: condition(ConditionStatus::False, "OperatorGroupMismatch", "the OperatorGroup does not match the specified OperatorGroup"),
                }
            }
        },
        _ => OpGroupDecision {
            action: Action::None,
            condition: condition(ConditionStatus::False, "TooManyOperatorGroups", format!("there is more than one OperatorGroup in namespace {}", desired.namespace)),
        },
    }
}

/// Mustnothave branch.
pub fn mustnothave(found: &[FoundOperatorGroup], removal_behavior: RemovalBehavior, other_subscriptions_exist: bool, enforce: bool) -> OpGroupDecision {
    if found.is_empty() {
        return OpGroupDecision {
            action: Action::None,
            condition: condition(ConditionStatus::True, "OperatorGroupMissing", "the OperatorGroup was not found, as expected"),
        };
    }

    let found = &found[0];
    let keep = matches!(removal_behavior, RemovalBehavior::Keep)
        || (matches!(removal_behavior, RemovalBehavior::DeleteIfUnused) && other_subscriptions_exist)
        || found.has_owner_references;

    if keep {
        return OpGroupDecision {
            action: Action::None,
            condition: condition(ConditionStatus::True, "OperatorGroupKept", "the OperatorGroup was kept because of its removal behavior"),
        };
    }

    if found.has_deletion_timestamp {
        return OpGroupDecision {
            action: Action::None,
            condition: condition(ConditionStatus::False, "OperatorGroupTerminating", "the OperatorGroup is terminating"),
        };
    }

    if enforce {
        OpGroupDecision {
            action: Action::Delete,
            condition: condition(ConditionStatus::True, "OperatorGroupDeleted", "the OperatorGroup was deleted"),
        }
    } else {
        OpGroupDecision {
            action: Action::None,
            condition: condition(ConditionStatus::False, "OperatorGroupShouldNotExist", "the OperatorGroup exists but should not"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desired() -> BuiltOperatorGroup {
        BuiltOperatorGroup { name: Some("og1".into()), generate_name: None, namespace: "ns1".into(), target_namespaces: vec!["ns1".into()] }
    }

    #[test]
    fn musthave_creates_when_none_found_and_enforcing() {
        let decision = musthave(&[], &desired(), true);
        assert_eq!(decision.action, Action::Create);
    }

    #[test]
    fn musthave_reports_missing_when_none_found_and_informing() {
        let decision = musthave(&[], &desired(), false);
        assert_eq!(decision.action, Action::None);
        assert_eq!(decision.condition.reason, "OperatorGroupMissing");
    }

    #[test]
    fn musthave_reports_too_many_when_multiple_found() {
        let found = vec![
            FoundOperatorGroup { name: "og1".into(), target_namespaces: vec![], has_owner_references: false, has_deletion_timestamp: false },
            FoundOperatorGroup { name: "og2".into(), target_namespaces: vec![], has_owner_references: false, has_deletion_timestamp: false },
        ];
        let decision = musthave(&found, &desired(), true);
        assert_eq!(decision.condition.reason, "TooManyOperatorGroups");
    }

    #[test]
    fn musthave_updates_on_spec_drift_when_enforcing() {
        let found = vec![FoundOperatorGroup { name: "og1".into(), target_namespaces: vec!["other".into()], has_owner_references: false, has_deletion_timestamp: false }];
        let decision = musthave(&found, &desired(), true);
        assert_eq!(decision.action, Action::Update);
    }

    #[test]
    fn mustnothave_keeps_when_owner_references_present() {
        let found = vec![FoundOperatorGroup { name: "og1".into(), target_namespaces: vec![], has_owner_references: true, has_deletion_timestamp: false }];
        let decision = mustnothave(&found, RemovalBehavior::Delete, false, true);
        assert_eq!(decision.action, Action::None);
        assert_eq!(decision.condition.reason, "OperatorGroupKept");
    }

    #[test]
    fn mustnothave_deletes_when_enforcing_and_nothing_prevents_it() {
        let found = vec![FoundOperatorGroup { name: "og1".into(), target_namespaces: vec![], has_owner_references: false, has_deletion_timestamp: false }];
        let decision = mustnothave(&found, RemovalBehavior::Delete, false, true);
        assert_eq!(decision.action, Action::Delete);
    }
}
