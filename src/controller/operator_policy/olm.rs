//! OLM label derivation and overlap detection shared by every stage of the
//! OperatorPolicy pipeline (spec.md §4.E "Overlap"; grounds Go's
//! `opLabelName`/`subLabelSelector`/`checkSubOverlap`).

/// The label name OLM attaches to resources it creates for a Subscription:
/// `<name>.<namespace>`, truncated to 63 characters and trimmed of trailing
/// `.`/`_`/`-` so it always ends on an alphanumeric character.
pub fn op_label_name(name: &str, namespace: &str) -> String {
    let mut label = format!("{name}.{namespace}");

    if label.len() > 63 {
        label.truncate(63);
        while label.ends_with(['.', '_', '-']) {
            label.pop();
        }
    }

    label
}

/// Result of comparing this policy's resolved subscription label against
/// every other OperatorPolicy's (spec.md §4.E "Overlap").
pub struct OverlapResult {
    pub resolved_label: String,
    pub overlappers: Vec<String>,
}

/// `checkSubOverlap`: `other_labels` is every other OperatorPolicy's
/// `(name, namespace, resolvedSubscriptionLabel)`, as last recorded in its
/// status (spec.md §4.E: "any other policy whose
/// `status.resolvedSubscriptionLabel` equals this one's label is an
/// overlapper").
pub fn check_overlap(
    policy_name: &str,
    policy_namespace: &str,
    subscription_name: Option<&str>,
    other_policies: &[(String, String, String)],
) -> OverlapResult {
    let Some(sub_name) = subscription_name else {
        return OverlapResult { resolved_label: String::new(), overlappers: Vec::new() };
    };

    let resolved_label = op_label_name(sub_name, policy_namespace);
    let mut overlappers = vec![format!("{policy_name}.{policy_namespace}")];

    for (name, namespace, label) in other_policies {
        if label == &resolved_label && !(name == policy_name && namespace == policy_namespace) {
            overlappers.push(format!("{name}.{namespace}"));
        }
    }

    overlappers.sort();

    if overlappers.len() == 1 {
        return OverlapResult { resolved_label, overlappers: Vec::new() };
    }

    OverlapResult { resolved_label, overlappers }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_over_63_chars_is_truncated_and_trimmed() {
        let name = "a".repeat(60);
        let namespace = "---ns";
        let label = op_label_name(&name, namespace);
        assert_eq!(label.len(), 60, "trailing punctuation past char 60 should be trimmed off");
        assert!(!label.ends_with(['.', '_', '-']));
    }

    #[test]
    fn label_under_63_chars_is_unchanged() {
        assert_eq!(op_label_name("my-sub", "ns1"), "my-sub.ns1");
    }

    #[test]
    fn no_overlap_when_only_this_policy_resolves_the_label() {
        let result = check_overlap("pol1", "ns1", Some("sub1"), &[]);
        assert!(result.overlappers.is_empty());
    }

    #[test]
    fn overlap_reports_other_policies_sorted() {
        let others = vec![
            ("pol3".to_string(), "ns1".to_string(), "sub1.ns1".to_string()),
            ("pol2".to_string(), "ns1".to_string(), "sub1.ns1".to_string()),
        ];
        let result = check_overlap("pol1", "ns1", Some("sub1"), &others);
        assert_eq!(result.overlappers, vec!["pol1.ns1", "pol2.ns1", "pol3.ns1"]);
    }
}
