//! Attachment storage: one file per `(table, row, field)`.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use super::assets::{AssetError, Fetcher};

/// Where attachment bytes come from.
#[derive(Debug, Clone)]
pub enum AttachmentSource {
    Buffer(Vec<u8>),
    Url(String),
    Path(PathBuf),
}

#[async_trait]
pub trait AttachmentStore: Send + Sync {
    /// Store the file and return its location.
    async fn set_file(
        &self,
        table: &str,
        row_id: &str,
        field: &str,
        source: AttachmentSource,
    ) -> Result<String, AssetError>;
}

/// Stores attachments under `<root>/<table>/<row_id>/<field>`.
pub struct FsAttachmentStore {
    root: PathBuf,
    fetcher: Option<Arc<dyn Fetcher>>,
}

impl FsAttachmentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            fetcher: None,
        }
    }

    /// Allow `AttachmentSource::Url`.
    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file_path(&self, table: &str, row_id: &str, field: &str) -> Result<PathBuf, AssetError> {
        for part in [table, row_id, field] {
            let mut components = Path::new(part).components();
            let single_normal = matches!(
                (components.next(), components.next()),
                (Some(Component::Normal(_)), None)
            );
            if !single_normal {
                return Err(AssetError::Io(format!("invalid path component '{}'", part)));
            }
        }
        Ok(self.root.join(table).join(row_id).join(field))
    }
}

#[async_trait]
impl AttachmentStore for FsAttachmentStore {
    async fn set_file(
        &self,
        table: &str,
        row_id: &str,
        field: &str,
        source: AttachmentSource,
    ) -> Result<String, AssetError> {
        let target = self.file_path(table, row_id, field)?;
        let bytes = match source {
            AttachmentSource::Buffer(bytes) => bytes,
            AttachmentSource::Path(path) => tokio::fs::read(&path)
                .await
                .map_err(|e| AssetError::Io(format!("{}: {}", path.display(), e)))?,
            AttachmentSource::Url(url) => match &self.fetcher {
                Some(fetcher) => fetcher.fetch(&url).await?,
                None => return Err(AssetError::Unsupported(url)),
            },
        };

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AssetError::Io(e.to_string()))?;
        }
        tokio::fs::write(&target, &bytes)
            .await
            .map_err(|e| AssetError::Io(e.to_string()))?;

        Ok(target.to_string_lossy().into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockFetcher;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_buffer_written_under_root() {
        let dir = TempDir::new().unwrap();
        let store = FsAttachmentStore::new(dir.path());

        let location = store
            .set_file("games", "g1", "cover", AttachmentSource::Buffer(b"img".to_vec()))
            .await
            .unwrap();

        let expected = dir.path().join("games").join("g1").join("cover");
        assert_eq!(location, expected.to_string_lossy());
        assert_eq!(std::fs::read(expected).unwrap(), b"img".to_vec());
    }

    #[tokio::test]
    async fn test_path_source_copied() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src.png");
        std::fs::write(&src, b"png").unwrap();
        let store = FsAttachmentStore::new(dir.path().join("att"));

        store
            .set_file("persons", "p1", "photo", AttachmentSource::Path(src))
            .await
            .unwrap();
        let stored = std::fs::read(dir.path().join("att/persons/p1/photo")).unwrap();
        assert_eq!(stored, b"png".to_vec());
    }

    #[tokio::test]
    async fn test_url_requires_fetcher() {
        let dir = TempDir::new().unwrap();
        let store = FsAttachmentStore::new(dir.path());
        let result = store
            .set_file("games", "g1", "logo", AttachmentSource::Url("https://x".into()))
            .await;
        assert!(matches!(result, Err(AssetError::Unsupported(_))));

        let fetcher = Arc::new(MockFetcher::new());
        fetcher.set_response("https://x", b"logo".to_vec()).await;
        let store = store.with_fetcher(fetcher);
        store
            .set_file("games", "g1", "logo", AttachmentSource::Url("https://x".into()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_rejects_traversal() {
        let dir = TempDir::new().unwrap();
        let store = FsAttachmentStore::new(dir.path());
        let result = store
            .set_file("games", "../etc", "cover", AttachmentSource::Buffer(vec![]))
            .await;
        assert!(matches!(result, Err(AssetError::Io(_))));
    }
}
