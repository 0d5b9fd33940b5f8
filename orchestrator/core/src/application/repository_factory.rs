// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Repository Factory - Application Layer
//!
//! Creates concrete repository implementations based on storage backend
//! configuration, keeping the domain layer free of infrastructure types.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Select in-memory or PostgreSQL tool records

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::domain::repository::{StorageBackend, ToolRepository};
use crate::infrastructure::db::Database;
use crate::infrastructure::repositories::{InMemoryToolRepository, PostgresToolRepository};

/// Creates a ToolRepository implementation based on the configured backend.
///
/// The PostgreSQL variant connects and applies the tools schema before
/// returning.
pub async fn create_tool_repository(backend: &StorageBackend) -> Result<Arc<dyn ToolRepository>> {
    match backend {
        StorageBackend::InMemory => {
            info!("using in-memory tool records");
            Ok(Arc::new(InMemoryToolRepository::new()))
        }
        StorageBackend::PostgreSQL(config) => {
            let database = Database::new(&config.connection_string).await?;
            let repository = PostgresToolRepository::new(database.get_pool().clone());
            repository
                .ensure_schema()
                .await
                .context("Failed to apply tools schema")?;
            Ok(Arc::new(repository))
        }
    }
}
