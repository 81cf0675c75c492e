//! Reconciliation findings
//!
//! Findings are derived on every pass and never stored here. Consumers decide
//! whether to log them or publish them back to the directory.

use crate::{AnnexAdvertisement, ProjectId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// `MyType` of the records a finding would be published as
pub const FINDING_AD_TYPE: &str = "AnnexFinding";

/// A discrepancy between the directory and the cloud
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Finding {
    /// Advertised in the directory, absent from the cloud
    MissingInCloud { project_id: ProjectId },

    /// Present in the cloud, never advertised
    UnknownInDirectory { project_id: ProjectId },

    /// Both sides know the annex but disagree on its size
    SizeMismatch {
        project_id: ProjectId,
        /// Size declared on the cloud stack
        declared: u32,
        /// Size the directory advertisement asks for
        desired: u32,
    },

    /// Advertisement without a usable project identifier
    MalformedAdvertisement { record: AnnexAdvertisement },
}

/// Discriminant of a [`Finding`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FindingKind {
    MissingInCloud,
    UnknownInDirectory,
    SizeMismatch,
    MalformedAdvertisement,
}

impl FindingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FindingKind::MissingInCloud => "MissingInCloud",
            FindingKind::UnknownInDirectory => "UnknownInDirectory",
            FindingKind::SizeMismatch => "SizeMismatch",
            FindingKind::MalformedAdvertisement => "MalformedAdvertisement",
        }
    }
}

impl fmt::Display for FindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Finding {
    pub fn missing_in_cloud(project_id: impl Into<ProjectId>) -> Self {
        Finding::MissingInCloud {
            project_id: project_id.into(),
        }
    }

    pub fn unknown_in_directory(project_id: impl Into<ProjectId>) -> Self {
        Finding::UnknownInDirectory {
            project_id: project_id.into(),
        }
    }

    pub fn kind(&self) -> FindingKind {
        match self {
            Finding::MissingInCloud { .. } => FindingKind::MissingInCloud,
            Finding::UnknownInDirectory { .. } => FindingKind::UnknownInDirectory,
            Finding::SizeMismatch { .. } => FindingKind::SizeMismatch,
            Finding::MalformedAdvertisement { .. } => FindingKind::MalformedAdvertisement,
        }
    }

    pub fn project_id(&self) -> Option<&ProjectId> {
        match self {
            Finding::MissingInCloud { project_id }
            | Finding::UnknownInDirectory { project_id }
            | Finding::SizeMismatch { project_id, .. } => Some(project_id),
            Finding::MalformedAdvertisement { .. } => None,
        }
    }

    /// Attribute record this finding would be published as.
    ///
    /// Malformed advertisements carry no project identifier, so their record
    /// embeds the offending attributes instead.
    pub fn to_publishable(&self, reported_by: &str) -> BTreeMap<String, Value> {
        let mut record = BTreeMap::new();
        record.insert("MyType".to_string(), Value::from(FINDING_AD_TYPE));
        record.insert("FindingKind".to_string(), Value::from(self.kind().as_str()));
        record.insert("ReportedBy".to_string(), Value::from(reported_by));

        match self {
            Finding::MissingInCloud { project_id } | Finding::UnknownInDirectory { project_id } => {
                record.insert("ProjectID".to_string(), Value::from(project_id.as_str()));
            }
            Finding::SizeMismatch {
                project_id,
                declared,
                desired,
            } => {
                record.insert("ProjectID".to_string(), Value::from(project_id.as_str()));
                record.insert("DeclaredSize".to_string(), Value::from(*declared));
                record.insert("DesiredSize".to_string(), Value::from(*desired));
            }
            Finding::MalformedAdvertisement { record: ad } => {
                let attrs = ad
                    .attributes()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect::<serde_json::Map<_, _>>();
                record.insert("Record".to_string(), Value::Object(attrs));
            }
        }

        record
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Finding::MissingInCloud { project_id } => {
                write!(f, "annex {} was not found in the cloud", project_id)
            }
            Finding::UnknownInDirectory { project_id } => {
                write!(f, "found stack {} unknown to the directory", project_id)
            }
            Finding::SizeMismatch {
                project_id,
                declared,
                desired,
            } => write!(
                f,
                "annex {} declares size {} but the directory wants {}",
                project_id, declared, desired
            ),
            Finding::MalformedAdvertisement { .. } => {
                f.write_str("annex advertisement without project ID")
            }
        }
    }
}
