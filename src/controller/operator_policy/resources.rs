//! CRDs, Deployments, and Catalog Source stages (spec.md §4.E "CRDs,
//! Deployments, Catalog Source"; grounds Go's
//! `handleCRDs`/`handleDeployment`/`handleCatalogSource`).

use crate::models::compliance::RemovalBehavior;
use crate::models::condition::{Condition, ConditionStatus};
use crate::models::operator_policy::{
    CATALOG_SOURCE_CONDITION_TYPE, CRD_CONDITION_TYPE, DEPLOYMENT_CONDITION_TYPE,
    DeploymentsUnavailableBehavior,
};

fn cond(kind: &str, status: ConditionStatus, reason: &str, message: impl Into<String>) -> Condition {
    Condition::new(kind, status, reason, message)
}

/// `handleCRDs`: musthave wants every named CRD present; mustnothave wants
/// them gone unless `removalBehavior.crds` is Keep.
pub fn handle_crds(desired_names: &[String], found_names: &[String], mustnothave: bool, removal_behavior: RemovalBehavior) -> Condition {
    if mustnothave {
        if matches!(removal_behavior, RemovalBehavior::Keep) {
            return cond(CRD_CONDITION_TYPE, ConditionStatus::True, "CRDsKept", "the CRDs were kept because of the removal behavior");
        }
        return if found_names.is_empty() {
            cond(CRD_CONDITION_TYPE, ConditionStatus::True, "CRDsRemoved", "the CRDs were not found, as expected")
        } else {
            cond(CRD_CONDITION_TYPE, ConditionStatus::False, "CRDsShouldNotExist", format!("{} CRD(s) exist but should not", found_names.len()))
        };
    }

    let missing: Vec<&String> = desired_names.iter().filter(|n| !found_names.contains(n)).collect();
    if missing.is_empty() {
        cond(CRD_CONDITION_TYPE, ConditionStatus::True, "CRDsPresent", "all the expected CRDs are present")
    } else {
        cond(CRD_CONDITION_TYPE, ConditionStatus::False, "CRDsMissing", format!("the following CRDs are missing: {}", missing.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")))
    }
}

#[derive(Debug, Clone)]
pub struct FoundDeployment {
    pub name: String,
    pub exists: bool,
    pub unavailable_replicas: i32,
}

/// `handleDeployment`: iterate the CSV's InstallStrategy deployments;
/// missing or unavailable-replica deployments are NonCompliant, modulated
/// by `complianceConfig.deploymentsUnavailable`.
pub fn handle_deployments(deployments: &[FoundDeployment], unavailable_behavior: DeploymentsUnavailableBehavior) -> Condition {
    let missing: Vec<&FoundDeployment> = deployments.iter().filter(|d| !d.exists).collect();
    if !missing.is_empty() {
        return cond(DEPLOYMENT_CONDITION_TYPE, ConditionStatus::False, "DeploymentsMissing", format!("the following deployments are missing: {}", missing.iter().map(|d| d.name.as_str()).collect::<Vec<_>>().join(", ")));
    }

    let unavailable: Vec<&FoundDeployment> = deployments.iter().filter(|d| d.unavailable_replicas > 0).collect();
    if unavailable.is_empty() {
        return cond(DEPLOYMENT_CONDITION_TYPE, ConditionStatus::True, "DeploymentsAvailable", "all operator deployments have their minimum availability");
    }

    let names = unavailable.iter().map(|d| d.name.as_str()).collect::<Vec<_>>().join(", ");
    match unavailable_behavior {
        DeploymentsUnavailableBehavior::NonCompliant => cond(DEPLOYMENT_CONDITION_TYPE, ConditionStatus::False, "DeploymentsUnavailable", format!("the following deployments have unavailable replicas: {names}")),
        DeploymentsUnavailableBehavior::Compliant => cond(DEPLOYMENT_CONDITION_TYPE, ConditionStatus::True, "DeploymentsUnavailable", format!("the following deployments have unavailable replicas, but this is tolerated: {names}")),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogSourceState {
    Ready,
    Other,
    Missing,
}

/// `handleCatalogSource`: READY is compliant; anything else (or missing) is
/// not, with polarity inverted for mustnothave.
pub fn handle_catalog_source(state: CatalogSourceState, mustnothave: bool) -> Condition {
    let ready = state == CatalogSourceState::Ready;
    let compliant = if mustnothave { !ready } else { ready };

    let (reason, message): (&str, String) = match (mustnothave, state) {
        (false, CatalogSourceState::Ready) => ("CatalogSourcesFound", "the CatalogSource was found and is ready".to_string()),
        (false, CatalogSourceState::Missing) => ("CatalogSourcesNotFound", "the CatalogSource was not found".to_string()),
        (false, CatalogSourceState::Other) => ("CatalogSourcesFound", "the CatalogSource was found but is not ready".to_string()),
        (true, CatalogSourceState::Missing) => ("CatalogSourcesNotFound", "the CatalogSource was not found, as expected".to_string()),
        (true, _) => ("CatalogSourcesFound", "the CatalogSource exists but should not be relied upon".to_string()),
    };

    cond(CATALOG_SOURCE_CONDITION_TYPE, if compliant { ConditionStatus::True } else { ConditionStatus::False }, reason, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_crds_are_noncompliant() {
        let condition = handle_crds(&["widgets.example.com".to_string()], &[], false, RemovalBehavior::Delete);
        assert_eq!(condition.reason, "CRDsMissing");
    }

    #[test]
    fn crds_kept_on_mustnothave_with_keep_behavior() {
        let condition = handle_crds(&[], &["widgets.example.com".to_string()], true, RemovalBehavior::Keep);
        assert_eq!(condition.reason, "CRDsKept");
        assert_eq!(condition.status, ConditionStatus::True);
    }

    #[test]
    fn unavailable_deployment_respects_tolerance_setting() {
        let deployments = vec![FoundDeployment { name: "op".into(), exists: true, unavailable_replicas: 1 }];
        let strict = handle_deployments(&deployments, DeploymentsUnavailableBehavior::NonCompliant);
        assert_eq!(strict.status, ConditionStatus::False);

        let tolerant = handle_deployments(&deployments, DeploymentsUnavailableBehavior::Compliant);
        assert_eq!(tolerant.status, ConditionStatus::True);
    }

    #[test]
    fn catalog_source_polarity_inverts_for_mustnothave() {
        assert_eq!(handle_catalog_source(CatalogSourceState::Ready, false).status, ConditionStatus::True);
        assert_eq!(handle_catalog_source(CatalogSourceState::Ready, true).status, ConditionStatus::False);
    }
}
