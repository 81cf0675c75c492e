//! Reconciliation pass engine

use crate::error::{InventorySource, PassError};
use crate::inventory::{AnnexDirectory, StackInventory};
use crate::reconcile::reconcile;
use annex_types::{Finding, InventorySnapshot, PassId};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Outcome of a completed pass
#[derive(Debug, Clone)]
pub struct PassReport {
    pub pass_id: PassId,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub ad_count: usize,
    pub stack_count: usize,
    pub findings: Vec<Finding>,
}

impl PassReport {
    pub fn duration_ms(&self) -> u64 {
        (self.finished_at - self.started_at)
            .num_milliseconds()
            .max(0) as u64
    }

    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }

    /// Finding records ready to hand to the directory
    pub fn publishable_records(&self, reporter: &str) -> Vec<BTreeMap<String, Value>> {
        self.findings
            .iter()
            .map(|f| f.to_publishable(reporter))
            .collect()
    }
}

/// Fetches both inventories and compares them
pub struct ReconcileEngine {
    directory: Arc<dyn AnnexDirectory>,
    stacks: Arc<dyn StackInventory>,
    fetch_timeout: Duration,
}

impl ReconcileEngine {
    pub fn new(
        directory: Arc<dyn AnnexDirectory>,
        stacks: Arc<dyn StackInventory>,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            directory,
            stacks,
            fetch_timeout,
        }
    }

    /// Fetch both inventories, directory first.
    ///
    /// Either failure aborts; nothing is compared against a partial view.
    pub async fn snapshot(&self) -> Result<InventorySnapshot, PassError> {
        let ads = self
            .bounded(InventorySource::Directory, self.directory.fetch_annex_ads())
            .await?
            .map_err(PassError::Directory)?;

        let stacks = self
            .bounded(InventorySource::Cloud, self.stacks.fetch_stacks())
            .await?
            .map_err(PassError::Cloud)?;

        Ok(InventorySnapshot::new(ads, stacks))
    }

    /// Run one reconciliation pass
    pub async fn run_pass(&self, pass_id: PassId) -> Result<PassReport, PassError> {
        let started_at = Utc::now();
        tracing::debug!(pass_id = %pass_id, "Starting reconciliation pass");

        let snapshot = match self.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::error!(
                    pass_id = %pass_id,
                    class = %e.class(),
                    error = %e,
                    "Reconciliation pass aborted"
                );
                return Err(e);
            }
        };

        let findings = reconcile(&snapshot.ads, &snapshot.stacks);
        for finding in &findings {
            log_finding(&pass_id, finding);
        }

        let report = PassReport {
            pass_id,
            started_at,
            finished_at: Utc::now(),
            ad_count: snapshot.ads.len(),
            stack_count: snapshot.stacks.len(),
            findings,
        };

        tracing::info!(
            pass_id = %report.pass_id,
            ads = report.ad_count,
            stacks = report.stack_count,
            findings = report.findings.len(),
            duration_ms = report.duration_ms(),
            "Reconciliation pass completed"
        );

        Ok(report)
    }

    async fn bounded<T>(
        &self,
        inventory: InventorySource,
        fetch: impl Future<Output = T>,
    ) -> Result<T, PassError> {
        tokio::time::timeout(self.fetch_timeout, fetch)
            .await
            .map_err(|_| PassError::Timeout {
                inventory,
                seconds: self.fetch_timeout.as_secs(),
            })
    }
}

fn log_finding(pass_id: &PassId, finding: &Finding) {
    match finding {
        Finding::MissingInCloud { project_id } => {
            tracing::warn!(pass_id = %pass_id, project_id = %project_id, "Annex not found in cloud")
        }
        Finding::UnknownInDirectory { project_id } => {
            tracing::warn!(pass_id = %pass_id, project_id = %project_id, "Found stack unknown to directory")
        }
        Finding::SizeMismatch {
            project_id,
            declared,
            desired,
        } => tracing::warn!(
            pass_id = %pass_id,
            project_id = %project_id,
            declared = declared,
            desired = desired,
            "Annex size differs from directory"
        ),
        Finding::MalformedAdvertisement { .. } => {
            tracing::warn!(pass_id = %pass_id, "Annex ad without project ID")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::{InMemoryDirectory, InMemoryStacks};
    use annex_aws::ErrorClass;
    use annex_types::{AnnexAdvertisement, FindingKind, ResourceGroup, FINDING_AD_TYPE};

    fn engine(directory: Arc<InMemoryDirectory>, stacks: Arc<InMemoryStacks>) -> ReconcileEngine {
        ReconcileEngine::new(directory, stacks, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_advertised_annex_missing_from_empty_cloud() {
        let directory = Arc::new(InMemoryDirectory::new(vec![AnnexAdvertisement::for_project("proj-42")]));
        let stacks = Arc::new(InMemoryStacks::default());

        let report = engine(directory, stacks).run_pass(PassId::generate()).await.unwrap();
        assert_eq!(report.ad_count, 1);
        assert_eq!(report.stack_count, 0);
        assert_eq!(report.findings, vec![Finding::missing_in_cloud("proj-42")]);
        assert!(!report.is_clean());

        let records = report.publishable_records("submit.pool.example");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["MyType"], FINDING_AD_TYPE);
        assert_eq!(records[0]["ProjectID"], "proj-42");
        assert_eq!(records[0]["ReportedBy"], "submit.pool.example");
    }

    #[tokio::test]
    async fn test_cloud_failure_aborts_without_findings() {
        let directory = Arc::new(InMemoryDirectory::new(vec![AnnexAdvertisement::for_project("proj-42")]));
        let stacks = Arc::new(InMemoryStacks::default());
        stacks.fail_with("connection refused").await;

        let err = engine(directory, stacks).run_pass(PassId::generate()).await.unwrap_err();
        assert!(matches!(err, PassError::Cloud(_)));
        assert_eq!(err.class(), ErrorClass::Transport);
    }

    #[tokio::test]
    async fn test_directory_failure_skips_cloud_fetch() {
        let directory = Arc::new(InMemoryDirectory::default());
        directory.fail_with("collector down").await;
        let stacks = Arc::new(InMemoryStacks::default());

        let err = engine(directory, stacks.clone()).run_pass(PassId::generate()).await.unwrap_err();
        assert!(matches!(err, PassError::Directory(_)));
        assert_eq!(stacks.fetch_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_fetch_times_out_as_transport() {
        let directory = Arc::new(InMemoryDirectory::default());
        let stacks = Arc::new(InMemoryStacks::default());
        stacks.delay_by(Duration::from_secs(30)).await;

        let err = engine(directory, stacks).run_pass(PassId::generate()).await.unwrap_err();
        assert!(matches!(
            err,
            PassError::Timeout {
                inventory: InventorySource::Cloud,
                seconds: 5
            }
        ));
        assert_eq!(err.class(), ErrorClass::Transport);
    }

    #[tokio::test]
    async fn test_counts_and_kinds() {
        let directory = Arc::new(InMemoryDirectory::new(vec![
            AnnexAdvertisement::for_project("a"),
            AnnexAdvertisement::for_project("b"),
            AnnexAdvertisement::new(),
        ]));
        let stacks = Arc::new(InMemoryStacks::new(vec![
            ResourceGroup::new("b", "s-b", 1),
            ResourceGroup::new("c", "s-c", 1),
        ]));

        let report = engine(directory, stacks).run_pass(PassId::generate()).await.unwrap();
        assert_eq!(report.ad_count, 3);
        assert_eq!(report.stack_count, 2);
        let kinds: Vec<_> = report.findings.iter().map(|f| f.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                FindingKind::MalformedAdvertisement,
                FindingKind::MissingInCloud,
                FindingKind::UnknownInDirectory,
            ]
        );
    }
}
