//! Mock fetcher and in-memory attachment store for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::library::{AssetError, AttachmentSource, AttachmentStore, Fetcher};

/// Mock implementation of [`Fetcher`].
///
/// Unknown URLs fail with an HTTP 404 error. Every requested URL is recorded.
#[derive(Default)]
pub struct MockFetcher {
    responses: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    requested: Arc<RwLock<Vec<String>>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_response(&self, url: &str, bytes: Vec<u8>) {
        self.responses.write().await.insert(url.to_string(), bytes);
    }

    pub async fn requested(&self) -> Vec<String> {
        self.requested.read().await.clone()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, AssetError> {
        self.requested.write().await.push(url.to_string());
        self.responses
            .read()
            .await
            .get(url)
            .cloned()
            .ok_or_else(|| AssetError::Http(format!("404 Not Found for {}", url)))
    }
}

/// In-memory [`AttachmentStore`]; `Url` sources are unsupported.
#[derive(Default)]
pub struct MemoryAttachmentStore {
    files: Arc<RwLock<HashMap<(String, String, String), Vec<u8>>>>,
}

impl MemoryAttachmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, table: &str, row_id: &str, field: &str) -> Option<Vec<u8>> {
        self.files
            .read()
            .await
            .get(&(table.to_string(), row_id.to_string(), field.to_string()))
            .cloned()
    }

    pub async fn len(&self) -> usize {
        self.files.read().await.len()
    }
}

#[async_trait]
impl AttachmentStore for MemoryAttachmentStore {
    async fn set_file(
        &self,
        table: &str,
        row_id: &str,
        field: &str,
        source: AttachmentSource,
    ) -> Result<String, AssetError> {
        let bytes = match source {
            AttachmentSource::Buffer(bytes) => bytes,
            AttachmentSource::Path(path) => tokio::fs::read(&path)
                .await
                .map_err(|e| AssetError::Io(e.to_string()))?,
            AttachmentSource::Url(url) => return Err(AssetError::Unsupported(url)),
        };
        self.files.write().await.insert(
            (table.to_string(), row_id.to_string(), field.to_string()),
            bytes,
        );
        Ok(format!("memory://{}/{}/{}", table, row_id, field))
    }
}
