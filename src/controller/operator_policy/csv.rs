//! CSV stage (spec.md §4.E "CSV"; grounds Go's `handleCSV`/`mustnothaveCSV`).

use crate::models::condition::{Condition, ConditionStatus};
use crate::models::operator_policy::CSV_CONDITION_TYPE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsvPhase {
    Succeeded,
    Pending,
    InstallReady,
    Installing,
    Failed,
    Unknown,
}

#[derive(Debug, Clone)]
pub struct FoundCsv {
    pub name: String,
    pub phase: CsvPhase,
    /// Whether OLM copied this CSV down from another namespace
    /// (`olm.copiedFrom` annotation or `status.reason == "Copied"`). A copied
    /// CSV is a read-only mirror, not the operator's own install, so it must
    /// never satisfy musthave/mustnothave evaluation.
    pub is_copied: bool,
}

fn condition(status: ConditionStatus, reason: &str, message: impl Into<String>) -> Condition {
    Condition::new(CSV_CONDITION_TYPE, status, reason, message)
}

/// `handleCSV`: no subscription means no CSV is possible yet; otherwise the
/// subscription's `status.installedCSV` names the primary CSV and its phase
/// determines compliance. A copied CSV is treated as not installed.
pub fn handle(subscription_created: bool, installed_csv: Option<&FoundCsv>) -> Condition {
    if !subscription_created {
        return condition(ConditionStatus::False, "NoCSV", "the Subscription has not been created, so there is no CSV to check");
    }

    match installed_csv.filter(|csv| !csv.is_copied) {
        None => condition(ConditionStatus::False, "NoCSV", "the ClusterServiceVersion is not installed"),
        Some(csv) => match csv.phase {
            CsvPhase::Succeeded => condition(ConditionStatus::True, "CSVInstalled", format!("ClusterServiceVersion {} - install strategy completed with no errors", csv.name)),
            CsvPhase::Failed => condition(ConditionStatus::False, "CSVFailed", format!("ClusterServiceVersion {} failed", csv.name)),
            _ => condition(ConditionStatus::False, "CSVInstalling", format!("ClusterServiceVersion {} is installing", csv.name)),
        },
    }
}

/// `mustnothaveCSV`: compliant once no non-copied CSV remains (a copied CSV
/// isn't this operator's own install, so it has nothing to say about this
/// policy's removal).
pub fn mustnothave(found: &[FoundCsv]) -> Condition {
    let owned: Vec<&FoundCsv> = found.iter().filter(|csv| !csv.is_copied).collect();
    if owned.is_empty() {
        condition(ConditionStatus::True, "CSVRemoved", "the ClusterServiceVersion was not found, as expected")
    } else {
        condition(ConditionStatus::False, "CSVShouldNotExist", format!("the ClusterServiceVersion {} exists but should not", owned[0].name))
    }
}
