// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Google Cloud Storage Blob Store
//!
//! Stages deployment artifacts in a GCS bucket through the JSON API.
//! Implements the BlobStore trait as an Anti-Corruption Layer.
//!
//! # API Endpoints
//!
//! - `POST /upload/storage/v1/b/{bucket}/o?uploadType=media&name={key}` - Upload object
//! - `GET /storage/v1/b/{bucket}/o/{key}?alt=media` - Download object
//! - `GET /storage/v1/b/{bucket}` - Health check (bucket metadata)

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use std::time::Duration;
use tracing::debug;

use crate::domain::storage::{validate_key, BlobStore, StorageError};

pub struct GcsBlobStore {
    client: Client,

    /// API base URL (e.g., "https://storage.googleapis.com")
    endpoint: String,

    bucket: String,

    access_token: Option<String>,
}

impl GcsBlobStore {
    pub fn new(
        endpoint: impl Into<String>,
        bucket: impl Into<String>,
        access_token: Option<String>,
    ) -> Result<Self, StorageError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            bucket: bucket.into(),
            access_token,
        })
    }

    /// URL with each of `segments` appended as one percent-encoded path segment
    fn build_url(&self, segments: &[&str]) -> Result<Url, StorageError> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| StorageError::Unavailable(format!("invalid endpoint {}: {}", self.endpoint, e)))?;
        url.path_segments_mut()
            .map_err(|_| StorageError::Unavailable(format!("endpoint cannot be a base: {}", self.endpoint)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl BlobStore for GcsBlobStore {
    async fn upload_buffer(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), StorageError> {
        validate_key(key)?;

        let url = self.build_url(&["upload", "storage", "v1", "b", &self.bucket, "o"])?;
        let size = bytes.len();
        let response = self
            .authorize(self.client.post(url))
            .query(&[("uploadType", "media"), ("name", key)])
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK | StatusCode::CREATED => {
                debug!(bucket = %self.bucket, key, size, "uploaded object");
                Ok(())
            }
            status => {
                let error_msg = response
                    .text()
                    .await
                    .unwrap_or_else(|_| format!("HTTP {}", status));
                Err(StorageError::HttpError(format!(
                    "Failed to upload {}: {}",
                    key, error_msg
                )))
            }
        }
    }

    async fn download(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        validate_key(key)?;

        let url = self.build_url(&["storage", "v1", "b", &self.bucket, "o", key])?;
        let response = self
            .authorize(self.client.get(url))
            .query(&[("alt", "media")])
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(response.bytes().await?.to_vec()),
            StatusCode::NOT_FOUND => Err(StorageError::NotFound(key.to_string())),
            status => {
                let error_msg = response
                    .text()
                    .await
                    .unwrap_or_else(|_| format!("HTTP {}", status));
                Err(StorageError::HttpError(format!(
                    "Failed to download {}: {}",
                    key, error_msg
                )))
            }
        }
    }

    fn object_uri(&self, key: &str) -> String {
        format!("gs://{}/{}", self.bucket, key)
    }

    async fn health_check(&self) -> Result<(), StorageError> {
        let url = self.build_url(&["storage", "v1", "b", &self.bucket])?;
        let response = self.authorize(self.client.get(url)).send().await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(StorageError::Unavailable(format!(
                "bucket {} health check failed: HTTP {}",
                self.bucket,
                response.status()
            )))
        }
    }
}
