// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Blob Store Trait - Anti-Corruption Layer for artifact storage
//!
//! Deployment artifacts are staged in a durable key→bytes store before the
//! backend is asked to build them. The domain only needs put/get; concrete
//! stores live in `crate::infrastructure::storage`.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::tool::FunctionId;

/// Content type of packaged function artifacts
pub const ARTIFACT_CONTENT_TYPE: &str = "application/zip";

/// Object key under which a function attempt's artifact is staged
pub fn artifact_key(id: &FunctionId) -> String {
    format!("functions/{}/function.zip", id.as_str())
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under `key`, replacing any existing object.
    async fn upload_buffer(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), StorageError>;

    /// Fetch the object stored under `key`.
    async fn download(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// URI the backend uses to locate the object (e.g. `gs://bucket/key`).
    fn object_uri(&self, key: &str) -> String;

    /// Check health of the storage backend
    async fn health_check(&self) -> Result<(), StorageError>;
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<reqwest::Error> for StorageError {
    fn from(err: reqwest::Error) -> Self {
        StorageError::HttpError(err.to_string())
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::IoError(err.to_string())
    }
}

/// Reject keys that could escape a prefix or address nothing.
pub fn validate_key(key: &str) -> Result<(), StorageError> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("key cannot be empty".to_string()));
    }
    if key.starts_with('/') || key.split('/').any(|segment| segment == ".." || segment.is_empty()) {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}
