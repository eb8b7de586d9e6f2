//! Post-commit asset downloads.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::attachments::{AttachmentSource, AttachmentStore};
use super::{AssetFailure, AssetReport, AttachedAsset, PendingAsset};
use crate::metrics;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AssetError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Unsupported source: {0}")]
    Unsupported(String),
}

/// Asset download settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetsConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Extra attempts after the first for transient failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    2
}

fn default_user_agent() -> String {
    concat!("trove/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            user_agent: default_user_agent(),
        }
    }
}

/// Fetches raw bytes for a URL.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, AssetError>;
}

/// reqwest-backed fetcher with exponential backoff on transient errors.
pub struct HttpFetcher {
    client: Client,
    max_retries: u32,
}

impl HttpFetcher {
    pub fn new(config: &AssetsConfig) -> Result<Self, AssetError> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AssetError::Http(e.to_string()))?;
        Ok(Self {
            client,
            max_retries: config.max_retries,
        })
    }

    async fn fetch_once(&self, url: &str) -> Result<Vec<u8>, (AssetError, bool)> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| (AssetError::Http(e.to_string()), true))?;

        let status = response.status();
        if !status.is_success() {
            let retryable = status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS;
            return Err((AssetError::Http(format!("{} for {}", status, url)), retryable));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| (AssetError::Http(e.to_string()), true))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, AssetError> {
        let mut attempt = 0;
        loop {
            match self.fetch_once(url).await {
                Ok(bytes) => return Ok(bytes),
                Err((err, retryable)) if retryable && attempt < self.max_retries => {
                    let delay = Duration::from_millis(250 * 2u64.pow(attempt));
                    debug!(url = %url, attempt, error = %err, "Retrying asset fetch");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err((err, _)) => return Err(err),
            }
        }
    }
}

/// Downloads pending assets and hands them to the attachment store.
#[derive(Clone)]
pub struct AssetDownloader {
    fetcher: Arc<dyn Fetcher>,
    attachments: Arc<dyn AttachmentStore>,
}

impl AssetDownloader {
    pub fn new(fetcher: Arc<dyn Fetcher>, attachments: Arc<dyn AttachmentStore>) -> Self {
        Self {
            fetcher,
            attachments,
        }
    }

    /// Try each URL in order; the first one that downloads and stores wins.
    pub async fn download(&self, asset: &PendingAsset) -> Result<AttachedAsset, AssetFailure> {
        let mut errors = Vec::new();
        for url in &asset.urls {
            let stored = match self.fetcher.fetch(url).await {
                Ok(bytes) => {
                    self.attachments
                        .set_file(
                            &asset.table,
                            &asset.row_id,
                            &asset.field,
                            AttachmentSource::Buffer(bytes),
                        )
                        .await
                }
                Err(e) => Err(e),
            };
            match stored {
                Ok(location) => {
                    metrics::ASSET_DOWNLOADS.with_label_values(&["ok"]).inc();
                    return Ok(AttachedAsset {
                        table: asset.table.clone(),
                        row_id: asset.row_id.clone(),
                        field: asset.field.clone(),
                        url: url.clone(),
                        location,
                    });
                }
                Err(e) => {
                    debug!(url = %url, field = %asset.field, error = %e, "Asset candidate failed");
                    errors.push(format!("{}: {}", url, e));
                }
            }
        }

        metrics::ASSET_DOWNLOADS.with_label_values(&["failed"]).inc();
        warn!(
            table = %asset.table,
            row_id = %asset.row_id,
            field = %asset.field,
            candidates = asset.urls.len(),
            "No asset candidate could be stored"
        );
        Err(AssetFailure {
            table: asset.table.clone(),
            row_id: asset.row_id.clone(),
            field: asset.field.clone(),
            errors,
        })
    }

    pub async fn download_all(&self, assets: &[PendingAsset]) -> AssetReport {
        let results = join_all(assets.iter().map(|asset| self.download(asset))).await;
        let mut report = AssetReport::default();
        for result in results {
            match result {
                Ok(attached) => report.attached.push(attached),
                Err(failure) => report.failed.push(failure),
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryAttachmentStore, MockFetcher};

    fn pending(urls: &[&str]) -> PendingAsset {
        PendingAsset {
            table: "games".to_string(),
            row_id: "g1".to_string(),
            field: "cover".to_string(),
            urls: urls.iter().map(|u| u.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_first_working_candidate_wins() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.set_response("https://a/2.jpg", b"two".to_vec()).await;
        fetcher.set_response("https://a/3.jpg", b"three".to_vec()).await;
        let store = Arc::new(MemoryAttachmentStore::new());
        let downloader = AssetDownloader::new(fetcher.clone(), store.clone());

        let attached = downloader
            .download(&pending(&["https://a/1.jpg", "https://a/2.jpg", "https://a/3.jpg"]))
            .await
            .unwrap();
        assert_eq!(attached.url, "https://a/2.jpg");
        assert_eq!(store.get("games", "g1", "cover").await.unwrap(), b"two".to_vec());
        assert_eq!(
            fetcher.requested().await,
            vec!["https://a/1.jpg".to_string(), "https://a/2.jpg".to_string()]
        );
    }

    #[tokio::test]
    async fn test_all_candidates_fail() {
        let fetcher = Arc::new(MockFetcher::new());
        let store = Arc::new(MemoryAttachmentStore::new());
        let downloader = AssetDownloader::new(fetcher, store);

        let failure = downloader
            .download(&pending(&["https://a/1.jpg", "https://a/2.jpg"]))
            .await
            .unwrap_err();
        assert_eq!(failure.errors.len(), 2);
        assert_eq!(failure.field, "cover");
    }

    #[tokio::test]
    async fn test_download_all_reports_both() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.set_response("https://ok", b"x".to_vec()).await;
        let store = Arc::new(MemoryAttachmentStore::new());
        let downloader = AssetDownloader::new(fetcher, store);

        let mut logo = pending(&["https://missing"]);
        logo.field = "logo".to_string();
        let report = downloader
            .download_all(&[pending(&["https://ok"]), logo])
            .await;
        assert_eq!(report.attached.len(), 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].field, "logo");
    }

    #[test]
    fn test_assets_config_defaults() {
        let config: AssetsConfig = toml::from_str("").unwrap();
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.max_retries, 2);
        assert!(config.user_agent.starts_with("trove/"));
    }
}
