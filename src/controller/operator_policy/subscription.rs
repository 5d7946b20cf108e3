//! Subscription stage (spec.md §4.E "Subscription"; grounds Go's
//! `handleSubscription`/`musthaveSubscription`/`considerResolutionFailed`).

use regex::Regex;

use crate::models::condition::{Condition, ConditionStatus};
use crate::models::operator_policy::SUBSCRIPTION_CONDITION_TYPE;

use super::build::BuiltSubscription;
use super::operator_group::Action;

#[derive(Debug, Clone)]
pub struct FoundSubscription {
    pub name: String,
    pub channel: Option<String>,
    pub source: Option<String>,
    pub source_namespace: Option<String>,
    pub resolution_failed_reason: Option<String>,
    pub resolution_failed_message: Option<String>,
}

pub struct SubscriptionDecision {
    pub action: Action,
    pub condition: Condition,
    /// Set when the 30s grace-period intervention (§4.E) should begin or
    /// continue; `None` clears any pending intervention.
    pub start_intervention: bool,
}

fn condition(status: ConditionStatus, reason: &str, message: impl Into<String>) -> Condition {
    Condition::new(SUBSCRIPTION_CONDITION_TYPE, status, reason, message)
}

fn spec_matches(found: &FoundSubscription, desired: &BuiltSubscription) -> bool {
    found.channel == desired.channel
        && found.source == desired.source
        && found.source_namespace == desired.source_namespace
}

/// `messageIncludesSubscription`: does the resolution-failure message
/// actually mention this subscription or its package, bounded so
/// `"gatekeeper-operator"` doesn't match `"gatekeeper-operator-product"`.
pub fn message_includes_subscription(sub_name: &str, sub_namespace: &str, package: &str, message: &str) -> bool {
    let escaped = |s: &str| regex::escape(s);
    let pattern = format!(
        r"(?:subscription (?:{name}|{ns}/{name})|package (?:{pkg}|{ns}/{pkg}))(?:$|\s|,|:)",
        name = escaped(sub_name),
        ns = escaped(sub_namespace),
        pkg = escaped(package),
    );
    Regex::new(&pattern).map(|re| re.is_match(message)).unwrap_or(true)
}

/// `unreferencedCSVRegex`: extracts the CSV name from a ConstraintsNotSatisfiable message.
pub fn unreferenced_csv_name(message: &str) -> Option<String> {
    let re = Regex::new(r"clusterserviceversion (\S*) exists and is not referenced").ok()?;
    re.captures(message).and_then(|c| c.get(1)).map(|m| m.as_str().to_string())
}

/// `considerResolutionFailed`: given the subscription's
/// `SubscriptionResolutionFailed` condition (if any), decide the outcome.
/// Returns `None` when there's no resolution failure condition to consider.
pub fn consider_resolution_failed(
    sub_name: &str,
    sub_namespace: &str,
    package: &str,
    reason: &str,
    message: &str,
) -> Option<SubscriptionDecision> {
    if !message_includes_subscription(sub_name, sub_namespace, package, message) {
        return None;
    }

    if !reason.eq_ignore_ascii_case("ConstraintsNotSatisfiable") {
        return Some(SubscriptionDecision {
            action: Action::None,
            condition: condition(ConditionStatus::False, reason, message.to_string()),
            start_intervention: false,
        });
    }

    let generic = SubscriptionDecision {
        action: Action::None,
        condition: condition(
            ConditionStatus::False,
            "ConstraintsNotSatisfiable",
            "the operator could not be resolved; see the Subscription's status for full details",
        ),
        start_intervention: unreferenced_csv_name(message).is_some(),
    };

    Some(generic)
}

/// Musthave branch, absent a resolution-failure complication (spec.md
/// §4.E "Subscription", symmetric to the OperatorGroup bullet list).
pub fn musthave(found: Option<&FoundSubscription>, desired: &BuiltSubscription, enforce: bool) -> SubscriptionDecision {
    let base = |action, condition| SubscriptionDecision { action, condition, start_intervention: false };

    match found {
        None => {
            if enforce {
                base(Action::Create, condition(ConditionStatus::True, "SubscriptionCreated", "the Subscription was created"))
            } else {
                base(Action::None, condition(ConditionStatus::False, "SubscriptionMissing", "the Subscription is required but does not exist"))
            }
        },
        Some(found) if found.name != desired.name => {
            base(Action::None, condition(ConditionStatus::False, "SubscriptionMismatch", format!("a Subscription already exists as {}, and its name does not match", found.name)))
        },
        Some(found) if spec_matches(found, desired) => {
            if let (Some(reason), Some(message)) = (&found.resolution_failed_reason, &found.resolution_failed_message) {
                if let Some(decision) = consider_resolution_failed(&desired.name, &desired.namespace, &desired.name, reason, message) {
                    return decision;
                }
            }
            base(Action::None, condition(ConditionStatus::True, "SubscriptionMatches", "the Subscription matches the specified Subscription"))
        },
        Some(_) if enforce => base(Action::Update, condition(ConditionStatus::True, "SubscriptionUpdated", "the Subscription was updated to match the specified Subscription")),
        Some(_) => base(Action::None, condition(ConditionStatus::False, "SubscriptionMismatch", "the Subscription does not match the specified Subscription")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desired() -> BuiltSubscription {
        BuiltSubscription {
            name: "sub1".into(),
            namespace: "ns1".into(),
            channel: Some("stable".into()),
            source: Some("redhat".into()),
            source_namespace: Some("olm".into()),
            starting_csv: None,
            install_plan_approval: "Manual",
        }
    }

    #[test]
    fn message_includes_subscription_requires_word_boundary() {
        assert!(message_includes_subscription("gatekeeper-operator", "ns1", "gatekeeper-operator", "subscription gatekeeper-operator failed"));
        assert!(!message_includes_subscription("gatekeeper-operator", "ns1", "gatekeeper-operator", "subscription gatekeeper-operator-product failed"));
    }

    #[test]
    fn unreferenced_csv_name_extracts_name() {
        let msg = "clusterserviceversion my-operator.v1.2.3 exists and is not referenced by a subscription";
        assert_eq!(unreferenced_csv_name(msg).as_deref(), Some("my-operator.v1.2.3"));
    }

    #[test]
    fn non_constraints_not_satisfiable_reason_is_reported_directly() {
        let decision = consider_resolution_failed("sub1", "ns1", "sub1", "NoOperatorGroup", "subscription sub1 has no operator group").unwrap();
        assert_eq!(decision.condition.reason, "NoOperatorGroup");
    }

    #[test]
    fn constraints_not_satisfiable_starts_intervention_only_when_unreferenced_csv_mentioned() {
        let decision = consider_resolution_failed(
            "sub1", "ns1", "sub1", "ConstraintsNotSatisfiable",
            "subscription sub1: clusterserviceversion my-op.v1.0.0 exists and is not referenced",
        ).unwrap();
        assert!(decision.start_intervention);

        let decision = consider_resolution_failed("sub1", "ns1", "sub1", "ConstraintsNotSatisfiable", "subscription sub1 constraints not satisfiable").unwrap();
        assert!(!decision.start_intervention);
    }

    #[test]
    fn musthave_creates_when_none_found_and_enforcing() {
        let decision = musthave(None, &desired(), true);
        assert_eq!(decision.action, Action::Create);
    }

    #[test]
    fn musthave_matches_when_spec_equal() {
        let found = FoundSubscription {
            name: "sub1".into(),
            channel: Some("stable".into()),
            source: Some("redhat".into()),
            source_namespace: Some("olm".into()),
            resolution_failed_reason: None,
            resolution_failed_message: None,
        };
        let decision = musthave(Some(&found), &desired(), true);
        assert_eq!(decision.condition.reason, "SubscriptionMatches");
    }
}
