//! Artifact publication.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::StoreError;

/// Publishes a rendered artifact and returns its public locator, if any.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// `Ok(None)` means the artifact stays at its local path.
    async fn store(&self, local_path: &Path) -> Result<Option<String>, StoreError>;
}

/// Store that copies artifacts into a directory served under `url_prefix`.
#[derive(Debug, Clone, Default)]
pub struct LocalBlobStore {
    public_dir: Option<PathBuf>,
    url_prefix: String,
}

impl LocalBlobStore {
    pub fn new(public_dir: impl Into<PathBuf>, url_prefix: impl Into<String>) -> Self {
        Self {
            public_dir: Some(public_dir.into()),
            url_prefix: url_prefix.into(),
        }
    }

    /// Store that never publishes.
    pub fn disabled() -> Self {
        Self::default()
    }

    fn locator(&self, file_name: &str) -> String {
        let prefix = self.url_prefix.trim_end_matches('/');
        if prefix.is_empty() {
            file_name.to_string()
        } else {
            format!("{}/{}", prefix, file_name)
        }
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn store(&self, local_path: &Path) -> Result<Option<String>, StoreError> {
        if !tokio::fs::try_exists(local_path).await.unwrap_or(false) {
            return Err(StoreError::Missing(local_path.to_path_buf()));
        }
        let Some(public_dir) = &self.public_dir else {
            return Ok(None);
        };
        let file_name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| StoreError::InvalidPath(local_path.to_path_buf()))?;

        let io_error = |source| StoreError::Io {
            path: local_path.to_path_buf(),
            source,
        };
        tokio::fs::create_dir_all(public_dir).await.map_err(io_error)?;
        tokio::fs::copy(local_path, public_dir.join(file_name))
            .await
            .map_err(io_error)?;

        let locator = self.locator(file_name);
        tracing::debug!(%locator, "published artifact");
        Ok(Some(locator))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_copies_and_returns_locator() {
        let work = tempfile::tempdir().unwrap();
        let artifact = work.path().join("abc.png");
        std::fs::write(&artifact, b"png").unwrap();
        let public = work.path().join("public");

        let store = LocalBlobStore::new(&public, "https://diagrams.example/static/");
        let locator = store.store(&artifact).await.unwrap();

        assert_eq!(locator.as_deref(), Some("https://diagrams.example/static/abc.png"));
        assert_eq!(std::fs::read(public.join("abc.png")).unwrap(), b"png");
    }

    #[tokio::test]
    async fn test_disabled_store_keeps_local_path() {
        let work = tempfile::tempdir().unwrap();
        let artifact = work.path().join("abc.png");
        std::fs::write(&artifact, b"png").unwrap();

        assert_eq!(LocalBlobStore::disabled().store(&artifact).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_missing_artifact() {
        let work = tempfile::tempdir().unwrap();
        let error = LocalBlobStore::disabled()
            .store(&work.path().join("gone.png"))
            .await
            .unwrap_err();
        assert!(matches!(error, StoreError::Missing(_)));
    }
}
