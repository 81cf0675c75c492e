//! Inventory records observed during a poll
//!
//! Both record types are read-only to the poller: stacks are owned by the
//! cloud provider and advertisements by whoever requested the annex.

use crate::ProjectId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Advertisement attribute holding the project identifier
pub const ATTR_PROJECT_ID: &str = "ProjectID";

/// Advertisement attribute holding the size requested for the annex
pub const ATTR_DESIRED_SIZE: &str = "DesiredSize";

/// Cloud-side stack backing one annex
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceGroup {
    /// Join key with the directory
    pub project_id: ProjectId,

    /// Provider-assigned stack identifier
    pub stack_id: String,

    /// Size declared on the stack
    pub desired_size: u32,

    /// Provider status string, informational only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl ResourceGroup {
    pub fn new(project_id: impl Into<ProjectId>, stack_id: impl Into<String>, desired_size: u32) -> Self {
        Self {
            project_id: project_id.into(),
            stack_id: stack_id.into(),
            desired_size,
            status: None,
        }
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }
}

/// Cloud inventory keyed by project identifier
pub type StackMap = BTreeMap<ProjectId, ResourceGroup>;

/// Directory-side record describing one annex.
///
/// Attributes are kept verbatim; only the project identifier and the desired
/// size are interpreted here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnnexAdvertisement {
    attributes: BTreeMap<String, Value>,
}

impl AnnexAdvertisement {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style attribute setter
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Shorthand for an ad carrying only a project identifier
    pub fn for_project(project_id: impl Into<String>) -> Self {
        Self::new().with_attribute(ATTR_PROJECT_ID, project_id.into())
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn attributes(&self) -> &BTreeMap<String, Value> {
        &self.attributes
    }

    /// Project identifier, if present as a non-empty string
    pub fn project_id(&self) -> Option<ProjectId> {
        match self.attributes.get(ATTR_PROJECT_ID) {
            Some(Value::String(s)) if !s.is_empty() => Some(ProjectId::new(s.clone())),
            _ => None,
        }
    }

    /// Size the directory expects the annex to have.
    ///
    /// Accepts either a JSON integer or a numeric string; anything else is
    /// treated as undeclared.
    pub fn desired_size(&self) -> Option<u32> {
        match self.attributes.get(ATTR_DESIRED_SIZE)? {
            Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// Everything observed in one poll
#[derive(Debug, Clone, Default)]
pub struct InventorySnapshot {
    pub ads: Vec<AnnexAdvertisement>,
    pub stacks: StackMap,
}

impl InventorySnapshot {
    pub fn new(ads: Vec<AnnexAdvertisement>, stacks: StackMap) -> Self {
        Self { ads, stacks }
    }
}
