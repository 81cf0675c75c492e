//! Describe-stacks inventory
//!
//! Every annex lives in its own stack, but not every stack is an annex: only
//! stacks tagged with a project identifier are kept. Stacks that are being or
//! have been deleted are not live and are dropped as well.

use crate::error::StackError;
use crate::transport::QueryTransport;
use annex_types::{ProjectId, ResourceGroup, StackMap};
use serde::Deserialize;
use std::collections::BTreeMap;

/// Action name of the describe call
pub const DESCRIBE_STACKS_ACTION: &str = "DescribeStacks";

/// Upper bound on followed `NextToken`s in one fetch
const MAX_PAGES: usize = 100;

/// Which stacks count as annexes, and where their size lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFilter {
    /// Tag key holding the project identifier
    pub project_tag: String,
    /// Stack parameter holding the desired size
    pub size_parameter: String,
}

impl Default for StackFilter {
    fn default() -> Self {
        Self {
            project_tag: "ProjectID".to_string(),
            size_parameter: "Size".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Envelope {
    describe_stacks_response: ResponseBody,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ResponseBody {
    describe_stacks_result: DescribeResult,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeResult {
    #[serde(default)]
    stacks: Option<Vec<RawStack>>,
    #[serde(default)]
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawStack {
    stack_id: String,
    #[serde(default)]
    stack_name: Option<String>,
    #[serde(default)]
    stack_status: Option<String>,
    #[serde(default)]
    tags: Option<Vec<RawTag>>,
    #[serde(default)]
    parameters: Option<Vec<RawParameter>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawTag {
    key: String,
    value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawParameter {
    parameter_key: String,
    #[serde(default)]
    parameter_value: Option<String>,
}

impl RawStack {
    fn is_live(&self) -> bool {
        !self
            .stack_status
            .as_deref()
            .is_some_and(|s| s.starts_with("DELETE_"))
    }

    fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .as_deref()?
            .iter()
            .find(|t| t.key == key)
            .map(|t| t.value.as_str())
    }

    fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters
            .as_deref()?
            .iter()
            .find(|p| p.parameter_key == key)
            .and_then(|p| p.parameter_value.as_deref())
    }
}

/// One decoded page of a describe-stacks response
#[derive(Debug, Default)]
pub struct StackPage {
    pub groups: Vec<ResourceGroup>,
    pub next_token: Option<String>,
}

/// Decode one describe-stacks response body, keeping only live annex stacks
pub fn decode_page(body: &str, filter: &StackFilter) -> Result<StackPage, StackError> {
    let envelope: Envelope =
        serde_json::from_str(body).map_err(|e| StackError::Decode(e.to_string()))?;
    let result = envelope.describe_stacks_response.describe_stacks_result;

    let mut groups = Vec::new();
    for stack in result.stacks.unwrap_or_default() {
        let Some(project_id) = stack.tag(&filter.project_tag).filter(|p| !p.is_empty()) else {
            tracing::trace!(stack_id = %stack.stack_id, "Skipping stack without project tag");
            continue;
        };

        if !stack.is_live() {
            tracing::debug!(
                stack_id = %stack.stack_id,
                status = ?stack.stack_status,
                "Skipping stack that is not live"
            );
            continue;
        }

        let desired_size = match stack.parameter(&filter.size_parameter) {
            Some(raw) => raw.trim().parse::<u32>().unwrap_or_else(|_| {
                tracing::warn!(
                    stack_id = %stack.stack_id,
                    value = raw,
                    "Unparseable size parameter, treating as 0"
                );
                0
            }),
            None => {
                tracing::warn!(
                    stack_id = %stack.stack_id,
                    name = ?stack.stack_name,
                    "Stack has no size parameter, treating as 0"
                );
                0
            }
        };

        let mut group = ResourceGroup::new(ProjectId::new(project_id), stack.stack_id.clone(), desired_size);
        group.status = stack.stack_status.clone();
        groups.push(group);
    }

    Ok(StackPage {
        groups,
        next_token: result.next_token.filter(|t| !t.is_empty()),
    })
}

/// Describe-stacks inventory over a signed transport
#[derive(Debug, Clone)]
pub struct DescribeStacks {
    transport: QueryTransport,
    filter: StackFilter,
}

impl DescribeStacks {
    pub fn new(transport: QueryTransport, filter: StackFilter) -> Self {
        Self { transport, filter }
    }

    pub fn filter(&self) -> &StackFilter {
        &self.filter
    }

    /// Fetch every live annex stack, following pagination.
    ///
    /// A failure on any page fails the whole fetch.
    pub async fn fetch_all(&self) -> Result<StackMap, StackError> {
        let mut stacks = StackMap::new();
        let mut next_token: Option<String> = None;

        for page_number in 0..MAX_PAGES {
            let mut params = BTreeMap::new();
            if let Some(token) = &next_token {
                params.insert("NextToken".to_string(), token.clone());
            }

            let body = self.transport.send(DESCRIBE_STACKS_ACTION, &params).await?;
            let page = decode_page(&body, &self.filter)?;

            tracing::debug!(
                page = page_number,
                stacks = page.groups.len(),
                "Decoded describe-stacks page"
            );

            for group in page.groups {
                if stacks.contains_key(&group.project_id) {
                    tracing::warn!(
                        project_id = %group.project_id,
                        stack_id = %group.stack_id,
                        "Duplicate project tag across stacks, keeping the first"
                    );
                    continue;
                }
                stacks.insert(group.project_id.clone(), group);
            }

            match page.next_token {
                Some(token) if next_token.as_deref() != Some(token.as_str()) => {
                    next_token = Some(token)
                }
                _ => return Ok(stacks),
            }
        }

        tracing::warn!(max_pages = MAX_PAGES, "Stopped following describe-stacks pagination");
        Ok(stacks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stack(id: &str, status: &str, project: Option<&str>, size: Option<&str>) -> serde_json::Value {
        let tags = match project {
            Some(p) => json!([{ "Key": "ProjectID", "Value": p }, { "Key": "Owner", "Value": "pool" }]),
            None => json!([{ "Key": "Owner", "Value": "someone-else" }]),
        };
        let parameters = match size {
            Some(s) => json!([{ "ParameterKey": "Size", "ParameterValue": s }]),
            None => json!(null),
        };
        json!({
            "StackId": id,
            "StackName": format!("name-{}", id),
            "StackStatus": status,
            "Tags": tags,
            "Parameters": parameters,
        })
    }

    fn body(stacks: Vec<serde_json::Value>, next: Option<&str>) -> String {
        json!({
            "DescribeStacksResponse": {
                "DescribeStacksResult": { "Stacks": stacks, "NextToken": next },
                "ResponseMetadata": { "RequestId": "r-1" }
            }
        })
        .to_string()
    }

    #[test]
    fn test_keeps_only_live_tagged_stacks() {
        let body = body(
            vec![
                stack("s-1", "CREATE_COMPLETE", Some("proj-a"), Some("3")),
                stack("s-2", "UPDATE_COMPLETE", None, Some("1")),
                stack("s-3", "DELETE_COMPLETE", Some("proj-c"), Some("2")),
                stack("s-4", "DELETE_IN_PROGRESS", Some("proj-d"), Some("2")),
                stack("s-5", "CREATE_IN_PROGRESS", Some("proj-e"), Some("5")),
            ],
            None,
        );
        let page = decode_page(&body, &StackFilter::default()).unwrap();
        let ids: Vec<_> = page.groups.iter().map(|g| g.project_id.as_str()).collect();
        assert_eq!(ids, vec!["proj-a", "proj-e"]);
        assert_eq!(page.groups[0].desired_size, 3);
        assert_eq!(page.groups[0].stack_id, "s-1");
        assert_eq!(page.groups[0].status.as_deref(), Some("CREATE_COMPLETE"));
        assert!(page.next_token.is_none());
    }

    #[test]
    fn test_missing_or_bad_size_is_zero() {
        let body = body(
            vec![
                stack("s-1", "CREATE_COMPLETE", Some("a"), None),
                stack("s-2", "CREATE_COMPLETE", Some("b"), Some("lots")),
            ],
            Some("tok-2"),
        );
        let page = decode_page(&body, &StackFilter::default()).unwrap();
        assert!(page.groups.iter().all(|g| g.desired_size == 0));
        assert_eq!(page.next_token.as_deref(), Some("tok-2"));
    }

    #[test]
    fn test_empty_result() {
        let body = json!({
            "DescribeStacksResponse": { "DescribeStacksResult": { "Stacks": null } }
        })
        .to_string();
        let page = decode_page(&body, &StackFilter::default()).unwrap();
        assert!(page.groups.is_empty());
    }

    #[test]
    fn test_custom_filter() {
        let filter = StackFilter {
            project_tag: "Owner".to_string(),
            size_parameter: "Size".to_string(),
        };
        let body = body(vec![stack("s-1", "CREATE_COMPLETE", None, Some("1"))], None);
        let page = decode_page(&body, &filter).unwrap();
        assert_eq!(page.groups[0].project_id.as_str(), "someone-else");
    }

    #[test]
    fn test_decode_error() {
        let err = decode_page("<DescribeStacksResponse/>", &StackFilter::default()).unwrap_err();
        assert!(matches!(err, StackError::Decode(_)));
    }
}
