//! Directory/cloud reconciliation
//!
//! Pure comparison of the two inventories. Nothing here performs I/O, so the
//! same inputs always produce the same findings in the same order.

use annex_types::{AnnexAdvertisement, Finding, ProjectId, StackMap};
use std::collections::{BTreeMap, BTreeSet};

/// Compare directory ads against cloud stacks.
///
/// Findings come out grouped: malformed ads in ad order, then missing,
/// unknown and size mismatches, each sorted by project id. An ad repeated
/// for the same project counts once; the first copy's declared size wins.
pub fn reconcile(ads: &[AnnexAdvertisement], stacks: &StackMap) -> Vec<Finding> {
    let mut findings = Vec::new();
    let mut advertised: BTreeMap<ProjectId, &AnnexAdvertisement> = BTreeMap::new();

    for ad in ads {
        match ad.project_id() {
            Some(project_id) => {
                advertised.entry(project_id).or_insert(ad);
            }
            None => {
                tracing::warn!(attributes = ?ad.attributes(), "Annex ad without project ID, skipping");
                findings.push(Finding::MalformedAdvertisement { record: ad.clone() });
            }
        }
    }

    let directory_keys: BTreeSet<&ProjectId> = advertised.keys().collect();
    let cloud_keys: BTreeSet<&ProjectId> = stacks.keys().collect();

    findings.extend(
        directory_keys
            .difference(&cloud_keys)
            .map(|id| Finding::missing_in_cloud((*id).clone())),
    );

    findings.extend(
        cloud_keys
            .difference(&directory_keys)
            .map(|id| Finding::unknown_in_directory((*id).clone())),
    );

    for project_id in directory_keys.intersection(&cloud_keys) {
        let (Some(ad), Some(stack)) = (advertised.get(*project_id), stacks.get(*project_id)) else {
            continue;
        };
        if let Some(desired) = ad.desired_size() {
            if desired != stack.desired_size {
                findings.push(Finding::SizeMismatch {
                    project_id: (*project_id).clone(),
                    declared: stack.desired_size,
                    desired,
                });
            }
        }
    }

    findings
}
