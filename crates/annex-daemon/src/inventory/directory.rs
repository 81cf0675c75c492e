//! Directory ads inventory

use super::AnnexDirectory;
use crate::config::DirectoryConfig;
use crate::error::DirectoryError;
use annex_types::AnnexAdvertisement;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// Variable naming the pool's collector when no endpoint is configured
pub const COLLECTOR_HOST_VAR: &str = "COLLECTOR_HOST";

/// Resolve the directory endpoint: explicit configuration first, then the
/// collector host lookup. A bare `host:port` is given an `http://` scheme.
pub fn locate_collector<F>(explicit: Option<&str>, lookup: F) -> Result<String, DirectoryError>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = explicit
        .map(str::to_string)
        .or_else(|| lookup(COLLECTOR_HOST_VAR))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            tracing::error!("Unable to locate default collector");
            DirectoryError::Locate(format!(
                "no directory endpoint configured and {} is unset",
                COLLECTOR_HOST_VAR
            ))
        })?;

    let endpoint = if raw.contains("://") {
        raw
    } else {
        format!("http://{}", raw)
    };
    let endpoint = endpoint.trim_end_matches('/').to_string();

    tracing::debug!(endpoint = %endpoint, "Found default collector");
    Ok(endpoint)
}

/// HTTP client for the directory's ad query
#[derive(Debug, Clone)]
pub struct DirectoryAds {
    client: Client,
    endpoint: String,
    ad_class: String,
    timeout: Duration,
}

impl DirectoryAds {
    /// Create a client for an already located endpoint
    pub fn new(endpoint: impl Into<String>, ad_class: impl Into<String>, timeout: Duration) -> Result<Self, DirectoryError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DirectoryError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            ad_class: ad_class.into(),
            timeout,
        })
    }

    /// Locate the endpoint from configuration and the process environment
    pub fn from_config(config: &DirectoryConfig) -> Result<Self, DirectoryError> {
        let endpoint = locate_collector(config.endpoint.as_deref(), |name| std::env::var(name).ok())?;
        Self::new(
            endpoint,
            config.ad_class.clone(),
            Duration::from_secs(config.request_timeout_secs.max(1)),
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl AnnexDirectory for DirectoryAds {
    async fn fetch_annex_ads(&self) -> Result<Vec<AnnexAdvertisement>, DirectoryError> {
        let url = format!("{}/v1/ads", self.endpoint);
        let response = self
            .client
            .get(&url)
            .query(&[("type", self.ad_class.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    tracing::warn!(status = status.as_u16(), error = %e, "Failed to read directory error body");
                    format!("<unreadable body: {}>", e)
                }
            };
            tracing::error!(status = status.as_u16(), "Directory query failed");
            return Err(DirectoryError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        let ads: Vec<AnnexAdvertisement> =
            serde_json::from_str(&body).map_err(|e| DirectoryError::Decode(e.to_string()))?;

        tracing::debug!(count = ads.len(), ad_class = %self.ad_class, "Directory query completed");
        Ok(ads)
    }
}
