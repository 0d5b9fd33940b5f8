// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contracts for each aggregate root, following the DDD Repository
//! pattern: one repository per aggregate, interface defined in the domain layer,
//! implemented in `crate::infrastructure::repositories`.
//!
//! | Trait | Aggregate | Implementations |
//! |-------|-----------|----------------|
//! | `ToolRepository` | `Tool` | `InMemoryToolRepository`, `PostgresToolRepository` |
//! | `AgentRepository` | `Agent` | `InMemoryAgentRepository` |
//! | `NotificationRepository` | `Notification` | `InMemoryNotificationRepository` |
//!
//! ## Conditional updates
//!
//! `ToolRepository::update_one` is the only write path for a stored tool.
//! The write applies iff every field set on the [`ToolFilter`] still matches
//! the stored record, and reports how many records matched. Deployment
//! reconciliation reads a zero match count as "this attempt was superseded";
//! edits guard on the `updated_at` they read and retry on a zero count.
//!
//! A [`ToolPatch`] only writes the fields it sets. A definition-only patch
//! (name, description, kind) never touches `state`, `function_id` or
//! `function_logs`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::agent::{Agent, AgentId};
use crate::domain::notification::Notification;
use crate::domain::tool::{FunctionId, TeamId, Tool, ToolId, ToolRequest, ToolState, ToolType};

/// Storage backend enum for pluggable persistence
#[derive(Debug, Clone)]
pub enum StorageBackend {
    InMemory,
    PostgreSQL(PostgresConfig),
}

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub connection_string: String,
}

impl StorageBackend {
    /// PostgreSQL when a connection string is configured, memory otherwise
    pub fn from_database_url(url: Option<&str>) -> Self {
        match url.map(str::trim).filter(|u| !u.is_empty()) {
            Some(url) => StorageBackend::PostgreSQL(PostgresConfig {
                connection_string: url.to_string(),
            }),
            None => StorageBackend::InMemory,
        }
    }
}

/// Match condition for a single tool record.
///
/// `id` and `team_id` are always required; the optional fields narrow the
/// match to the values a deployment attempt expects to find.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolFilter {
    pub id: ToolId,
    pub team_id: TeamId,
    pub function_id: Option<FunctionId>,
    pub state: Option<ToolState>,
    pub tool_type: Option<ToolType>,
    /// Matches only the revision last read by the caller
    pub updated_at: Option<DateTime<Utc>>,
}

impl ToolFilter {
    pub fn new(id: ToolId, team_id: TeamId) -> Self {
        Self {
            id,
            team_id,
            function_id: None,
            state: None,
            tool_type: None,
            updated_at: None,
        }
    }

    pub fn with_function_id(mut self, function_id: FunctionId) -> Self {
        self.function_id = Some(function_id);
        self
    }

    pub fn with_state(mut self, state: ToolState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_type(mut self, tool_type: ToolType) -> Self {
        self.tool_type = Some(tool_type);
        self
    }

    pub fn with_updated_at(mut self, updated_at: DateTime<Utc>) -> Self {
        self.updated_at = Some(updated_at);
        self
    }

    pub fn matches(&self, tool: &Tool) -> bool {
        if tool.id != self.id || tool.team_id != self.team_id {
            return false;
        }
        if let Some(function_id) = &self.function_id {
            if tool.function_id.as_ref() != Some(function_id) {
                return false;
            }
        }
        if let Some(state) = self.state {
            if tool.state != Some(state) {
                return false;
            }
        }
        if let Some(tool_type) = self.tool_type {
            if tool.tool_type() != tool_type {
                return false;
            }
        }
        if let Some(updated_at) = self.updated_at {
            if tool.updated_at != updated_at {
                return false;
            }
        }
        true
    }
}

/// Fields a conditional update may write. `None` leaves the field alone;
/// `Some(None)` clears a deployment field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolPatch {
    /// Name, description and kind
    pub definition: Option<ToolRequest>,
    pub state: Option<Option<ToolState>>,
    pub function_id: Option<Option<FunctionId>>,
    pub function_logs: Option<Option<String>>,
}

impl ToolPatch {
    pub fn ready() -> Self {
        Self {
            state: Some(Some(ToolState::Ready)),
            function_logs: Some(None),
            ..Default::default()
        }
    }

    pub fn errored(logs: Option<String>) -> Self {
        Self {
            state: Some(Some(ToolState::Error)),
            function_logs: Some(logs),
            ..Default::default()
        }
    }

    /// Rewrite name, description and kind only
    pub fn definition(request: ToolRequest) -> Self {
        Self {
            definition: Some(request),
            ..Default::default()
        }
    }

    /// Mark a new deployment attempt as outstanding
    pub fn pending(mut self) -> Self {
        self.state = Some(Some(ToolState::Pending));
        self
    }

    /// Drop every deployment field, for a tool that is no longer a function tool
    pub fn without_deployment(mut self) -> Self {
        self.state = Some(None);
        self.function_id = Some(None);
        self.function_logs = Some(None);
        self
    }

    pub fn with_function_id(mut self, function_id: FunctionId) -> Self {
        self.function_id = Some(Some(function_id));
        self
    }

    pub fn with_logs_cleared(mut self) -> Self {
        self.function_logs = Some(None);
        self
    }

    /// Apply to a record, returning whether anything changed
    pub fn apply(&self, tool: &mut Tool) -> bool {
        let mut changed = false;
        if let Some(definition) = &self.definition {
            changed |= tool.name != definition.name
                || tool.description != definition.description
                || tool.kind != definition.kind;
            tool.name = definition.name.clone();
            tool.description = definition.description.clone();
            tool.kind = definition.kind.clone();
        }
        if let Some(state) = self.state {
            changed |= tool.state != state;
            tool.state = state;
        }
        if let Some(function_id) = &self.function_id {
            changed |= &tool.function_id != function_id;
            tool.function_id = function_id.clone();
        }
        if let Some(logs) = &self.function_logs {
            changed |= &tool.function_logs != logs;
            tool.function_logs = logs.clone();
        }
        if changed {
            tool.updated_at = Utc::now();
        }
        changed
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateResult {
    pub matched_count: u64,
    pub modified_count: u64,
}

/// Repository interface for Tool aggregates
#[async_trait]
pub trait ToolRepository: Send + Sync {
    /// Save tool (create or replace)
    async fn save(&self, tool: &Tool) -> Result<(), RepositoryError>;

    /// Find tool by ID
    async fn find_by_id(&self, id: ToolId) -> Result<Option<Tool>, RepositoryError>;

    /// Find the tool matching every condition in `filter`
    async fn find_one(&self, filter: &ToolFilter) -> Result<Option<Tool>, RepositoryError>;

    /// Apply `patch` iff the stored record still matches `filter`
    async fn update_one(&self, filter: &ToolFilter, patch: &ToolPatch) -> Result<UpdateResult, RepositoryError>;

    /// List a team's tools
    async fn find_by_team(&self, team_id: &TeamId) -> Result<Vec<Tool>, RepositoryError>;

    /// Function tools with an outstanding deployment attempt
    async fn find_pending(&self) -> Result<Vec<Tool>, RepositoryError>;

    /// Delete tool by ID
    async fn delete(&self, id: ToolId) -> Result<(), RepositoryError>;
}

/// Repository interface for Agent aggregates
#[async_trait]
pub trait AgentRepository: Send + Sync {
    async fn save(&self, agent: &Agent) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: AgentId) -> Result<Option<Agent>, RepositoryError>;

    async fn find_by_team(&self, team_id: &TeamId) -> Result<Vec<Agent>, RepositoryError>;

    /// Detach `tool_id` from every agent of the team; returns agents modified
    async fn remove_tool_references(&self, team_id: &TeamId, tool_id: ToolId) -> Result<u64, RepositoryError>;

    async fn delete(&self, id: AgentId) -> Result<(), RepositoryError>;
}

/// Repository interface for persisted user notifications
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn create(&self, notification: &Notification) -> Result<(), RepositoryError>;

    /// Most recent first
    async fn find_by_team(&self, team_id: &TeamId, limit: usize) -> Result<Vec<Notification>, RepositoryError>;
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("Row not found".to_string()),
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
