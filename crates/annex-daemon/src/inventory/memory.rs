//! In-memory inventories for development and testing

use super::{AnnexDirectory, StackInventory};
use crate::error::DirectoryError;
use annex_aws::{QueryError, StackError};
use annex_types::{AnnexAdvertisement, ResourceGroup, StackMap};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Behaviour {
    failure: Option<String>,
    delay: Option<Duration>,
}

impl Behaviour {
    async fn apply(&self) -> Option<String> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.failure.clone()
    }
}

/// Directory backed by a vector of ads
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    ads: Arc<RwLock<Vec<AnnexAdvertisement>>>,
    behaviour: Arc<RwLock<Behaviour>>,
    fetches: AtomicU64,
}

impl InMemoryDirectory {
    pub fn new(ads: Vec<AnnexAdvertisement>) -> Self {
        Self {
            ads: Arc::new(RwLock::new(ads)),
            ..Default::default()
        }
    }

    /// Make every following fetch fail with a transport error
    pub async fn fail_with(&self, reason: impl Into<String>) {
        self.behaviour.write().await.failure = Some(reason.into());
    }

    /// Delay every following fetch
    pub async fn delay_by(&self, delay: Duration) {
        self.behaviour.write().await.delay = Some(delay);
    }

    pub async fn recover(&self) {
        *self.behaviour.write().await = Behaviour::default();
    }

    /// Number of fetches started so far
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnnexDirectory for InMemoryDirectory {
    async fn fetch_annex_ads(&self) -> Result<Vec<AnnexAdvertisement>, DirectoryError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let behaviour = self.behaviour.read().await;
        if let Some(reason) = behaviour.apply().await {
            return Err(DirectoryError::Transport(reason));
        }
        Ok(self.ads.read().await.clone())
    }
}

/// Cloud inventory backed by a stack map
#[derive(Debug, Default)]
pub struct InMemoryStacks {
    stacks: Arc<RwLock<StackMap>>,
    behaviour: Arc<RwLock<Behaviour>>,
    fetches: AtomicU64,
}

impl InMemoryStacks {
    pub fn new(groups: impl IntoIterator<Item = ResourceGroup>) -> Self {
        let stacks = groups
            .into_iter()
            .map(|g| (g.project_id.clone(), g))
            .collect();
        Self {
            stacks: Arc::new(RwLock::new(stacks)),
            ..Default::default()
        }
    }

    pub async fn insert(&self, group: ResourceGroup) {
        self.stacks.write().await.insert(group.project_id.clone(), group);
    }

    /// Make every following fetch fail with a transport error
    pub async fn fail_with(&self, reason: impl Into<String>) {
        self.behaviour.write().await.failure = Some(reason.into());
    }

    /// Delay every following fetch
    pub async fn delay_by(&self, delay: Duration) {
        self.behaviour.write().await.delay = Some(delay);
    }

    pub async fn recover(&self) {
        *self.behaviour.write().await = Behaviour::default();
    }

    /// Number of fetches started so far
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StackInventory for InMemoryStacks {
    async fn fetch_stacks(&self) -> Result<StackMap, StackError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let behaviour = self.behaviour.read().await;
        if let Some(reason) = behaviour.apply().await {
            return Err(StackError::Query(QueryError::Transport(reason)));
        }
        Ok(self.stacks.read().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_directory_failure_injection() {
        let directory = InMemoryDirectory::new(vec![AnnexAdvertisement::for_project("p")]);
        assert_eq!(directory.fetch_annex_ads().await.unwrap().len(), 1);

        directory.fail_with("connection reset").await;
        assert!(matches!(
            directory.fetch_annex_ads().await,
            Err(DirectoryError::Transport(_))
        ));

        directory.recover().await;
        assert!(directory.fetch_annex_ads().await.is_ok());
        assert_eq!(directory.fetch_count(), 3);
    }

    #[tokio::test]
    async fn test_stacks_keyed_by_project() {
        let stacks = InMemoryStacks::new(vec![
            ResourceGroup::new("b", "s-b", 1),
            ResourceGroup::new("a", "s-a", 2),
        ]);
        stacks.insert(ResourceGroup::new("c", "s-c", 3)).await;

        let map = stacks.fetch_stacks().await.unwrap();
        let keys: Vec<_> = map.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }
}
