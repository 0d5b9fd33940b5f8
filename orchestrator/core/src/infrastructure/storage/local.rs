// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Local Filesystem Blob Store
//!
//! Filesystem-based implementation of BlobStore for single-node development
//! and testing. Each key maps to a file below the base directory.
//!
//! **Limitations:**
//! - The serverless backend cannot read `file://` URIs, so artifacts staged
//!   here are only useful to local tooling and tests
//! - No replication or retention policy

use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;

use crate::domain::storage::{validate_key, BlobStore, StorageError};

pub struct LocalBlobStore {
    /// Base directory for all objects (e.g., "./.toolsmith/artifacts")
    base_path: PathBuf,
}

impl LocalBlobStore {
    /// Create the store, creating and write-probing `base_path`.
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let base_path = base_path.into();

        std::fs::create_dir_all(&base_path).map_err(|e| {
            StorageError::IoError(format!(
                "Failed to create base directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        let marker = base_path.join(".toolsmith-storage-test");
        std::fs::write(&marker, b"test").map_err(|e| {
            StorageError::IoError(format!(
                "Base directory {} is not writable: {}",
                base_path.display(),
                e
            ))
        })?;
        std::fs::remove_file(&marker)
            .map_err(|e| StorageError::IoError(format!("Failed to cleanup test file: {}", e)))?;

        Ok(Self { base_path })
    }

    fn resolve_path(&self, key: &str) -> PathBuf {
        self.base_path.join(key)
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn upload_buffer(&self, key: &str, bytes: Vec<u8>, _content_type: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        let path = self.resolve_path(key);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write beside the target and rename so readers never see a partial object
        let staging = path.with_extension("partial");
        tokio::fs::write(&staging, &bytes).await?;
        tokio::fs::rename(&staging, &path).await?;

        debug!(key, size = bytes.len(), path = %path.display(), "stored object");
        Ok(())
    }

    async fn download(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        validate_key(key)?;
        match tokio::fs::read(self.resolve_path(key)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn object_uri(&self, key: &str) -> String {
        format!("file://{}", self.resolve_path(key).display())
    }

    async fn health_check(&self) -> Result<(), StorageError> {
        if !self.base_path.exists() {
            return Err(StorageError::IoError(format!(
                "Base directory {} does not exist",
                self.base_path.display()
            )));
        }

        let marker = self.base_path.join(".health-check");
        tokio::fs::write(&marker, b"health-check")
            .await
            .map_err(|e| StorageError::IoError(format!("Health check failed (not writable): {}", e)))?;
        tokio::fs::remove_file(&marker)
            .await
            .map_err(|e| StorageError::IoError(format!("Health check cleanup failed: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_upload_and_download() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalBlobStore::new(temp_dir.path()).unwrap();

        store
            .upload_buffer("functions/abc/function.zip", vec![1, 2, 3], "application/zip")
            .await
            .unwrap();

        let on_disk = temp_dir.path().join("functions").join("abc").join("function.zip");
        assert!(on_disk.exists());
        assert!(!on_disk.with_extension("partial").exists());
        assert_eq!(store.download("functions/abc/function.zip").await.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_upload_replaces_existing_object() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalBlobStore::new(temp_dir.path()).unwrap();

        store.upload_buffer("a/b", vec![1], "text/plain").await.unwrap();
        store.upload_buffer("a/b", vec![2, 2], "text/plain").await.unwrap();

        assert_eq!(store.download("a/b").await.unwrap(), vec![2, 2]);
    }

    #[tokio::test]
    async fn test_download_missing_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalBlobStore::new(temp_dir.path()).unwrap();

        let result = store.download("functions/missing/function.zip").await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_escaping_keys_are_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalBlobStore::new(temp_dir.path()).unwrap();

        let result = store.upload_buffer("../outside", vec![0], "text/plain").await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));
    }

    #[tokio::test]
    async fn test_health_check() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalBlobStore::new(temp_dir.path()).unwrap();

        store.health_check().await.unwrap();
    }
}
