//! Cloud stacks inventory

use super::StackInventory;
use crate::config::CloudConfig;
use annex_aws::{
    CredentialFiles, DescribeStacks, QueryResult, QueryTransport, StackError, StackFilter,
    TransportConfig, TrustOverrides,
};
use annex_types::StackMap;
use async_trait::async_trait;
use std::time::Duration;

/// Stacks listed through the signed describe-stacks query
#[derive(Debug, Clone)]
pub struct CloudStacks {
    describe: DescribeStacks,
}

impl CloudStacks {
    pub fn new(describe: DescribeStacks) -> Self {
        Self { describe }
    }

    /// Build the transport from configuration, taking CA overrides from the
    /// process environment.
    pub fn from_config(config: &CloudConfig) -> QueryResult<Self> {
        Self::with_trust(config, TrustOverrides::from_env())
    }

    pub fn with_trust(config: &CloudConfig, trust: TrustOverrides) -> QueryResult<Self> {
        let credentials = CredentialFiles::new(&config.access_key_file, &config.secret_key_file);
        let mut transport_config =
            TransportConfig::new(&config.service_url, &config.api_version, credentials)
                .with_trust(trust)
                .with_timeout(Duration::from_secs(config.request_timeout_secs.max(1)));
        if !config.accept.is_empty() {
            transport_config = transport_config.with_accept(&config.accept);
        }

        let filter = StackFilter {
            project_tag: config.project_tag.clone(),
            size_parameter: config.size_parameter.clone(),
        };

        let transport = QueryTransport::new(transport_config)?;
        Ok(Self::new(DescribeStacks::new(transport, filter)))
    }
}

#[async_trait]
impl StackInventory for CloudStacks {
    async fn fetch_stacks(&self) -> Result<StackMap, StackError> {
        self.describe.fetch_all().await
    }
}
