// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Storage Infrastructure Module
//!
//! Provides concrete implementations of the BlobStore trait used to stage
//! function artifacts.

pub mod gcs;
pub mod local;

pub use gcs::GcsBlobStore;
pub use local::LocalBlobStore;
pub use memory::InMemoryBlobStore;

use std::sync::Arc;

use crate::domain::config::{ArtifactStorageBackend, ArtifactStorageConfig, FunctionProviderConfig};
use crate::domain::storage::{BlobStore, StorageError};

/// Factory function to create the blob store selected in configuration
pub fn create_blob_store(
    storage: &ArtifactStorageConfig,
    provider: &FunctionProviderConfig,
) -> Result<Arc<dyn BlobStore>, StorageError> {
    match storage.backend {
        ArtifactStorageBackend::Gcs => Ok(Arc::new(GcsBlobStore::new(
            storage.endpoint.clone(),
            provider.bucket.clone(),
            provider.resolved_access_token(),
        )?)),
        ArtifactStorageBackend::Local => Ok(Arc::new(LocalBlobStore::new(storage.local_path.clone())?)),
        ArtifactStorageBackend::Memory => Ok(Arc::new(InMemoryBlobStore::new())),
    }
}

mod memory {
    use async_trait::async_trait;
    use parking_lot::RwLock;
    use std::collections::HashMap;
    use std::sync::Arc;

    use crate::domain::storage::{validate_key, BlobStore, StorageError};

    /// Process-local blob store for tests and dry runs
    #[derive(Clone, Default)]
    pub struct InMemoryBlobStore {
        objects: Arc<RwLock<HashMap<String, (Vec<u8>, String)>>>,
    }

    impl InMemoryBlobStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn keys(&self) -> Vec<String> {
            let mut keys: Vec<String> = self.objects.read().keys().cloned().collect();
            keys.sort();
            keys
        }

        pub fn content_type(&self, key: &str) -> Option<String> {
            self.objects.read().get(key).map(|(_, content_type)| content_type.clone())
        }
    }

    #[async_trait]
    impl BlobStore for InMemoryBlobStore {
        async fn upload_buffer(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), StorageError> {
            validate_key(key)?;
            self.objects
                .write()
                .insert(key.to_string(), (bytes, content_type.to_string()));
            Ok(())
        }

        async fn download(&self, key: &str) -> Result<Vec<u8>, StorageError> {
            self.objects
                .read()
                .get(key)
                .map(|(bytes, _)| bytes.clone())
                .ok_or_else(|| StorageError::NotFound(key.to_string()))
        }

        fn object_uri(&self, key: &str) -> String {
            format!("memory://{}", key)
        }

        async fn health_check(&self) -> Result<(), StorageError> {
            Ok(())
        }
    }
}
