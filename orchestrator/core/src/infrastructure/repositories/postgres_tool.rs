// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL Tool Repository
//!
//! `ToolRepository` backed by the `tools` table. The tagged `ToolKind` is
//! stored as JSONB next to a plain `tool_type` column so filters never have to
//! look inside the document.
//!
//! `update_one` locks the matching row (`SELECT ... FOR UPDATE`) inside a
//! transaction, applies the patch in memory and writes back only when
//! something changed. Fields the patch leaves alone are written back as read
//! under the lock. That yields both `matched_count` and `modified_count`
//! and keeps the compare-and-set atomic against concurrent attempts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use tracing::debug;
use uuid::Uuid;

use crate::domain::repository::{RepositoryError, ToolFilter, ToolPatch, ToolRepository, UpdateResult};
use crate::domain::tool::{FunctionId, TeamId, Tool, ToolId, ToolKind, ToolState};

/// Schema applied by [`PostgresToolRepository::ensure_schema`]
pub const SCHEMA: &str = include_str!("../../../migrations/001_create_tools.sql");

const TOOL_COLUMNS: &str = "id, team_id, name, description, kind, state, function_id, function_logs, created_at, updated_at";

pub struct PostgresToolRepository {
    pool: PgPool,
}

impl PostgresToolRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the `tools` table and its indexes if missing
    pub async fn ensure_schema(&self) -> Result<(), RepositoryError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| RepositoryError::Database(format!("Failed to apply schema: {}", e)))?;
        Ok(())
    }

    fn row_to_tool(row: &PgRow) -> Result<Tool, RepositoryError> {
        let id: Uuid = row.get("id");
        let team_id: String = row.get("team_id");
        let kind_json: serde_json::Value = row.get("kind");
        let state: Option<String> = row.get("state");
        let function_id: Option<String> = row.get("function_id");
        let created_at: DateTime<Utc> = row.get("created_at");
        let updated_at: DateTime<Utc> = row.get("updated_at");

        let kind: ToolKind = serde_json::from_value(kind_json)
            .map_err(|e| RepositoryError::Serialization(format!("Failed to deserialize tool kind: {}", e)))?;

        let state = match state {
            Some(s) => Some(ToolState::parse(&s).ok_or_else(|| {
                RepositoryError::Serialization(format!("Unknown tool state '{}'", s))
            })?),
            None => None,
        };

        Ok(Tool {
            id: ToolId(id),
            team_id: TeamId::new(team_id),
            name: row.get("name"),
            description: row.get("description"),
            kind,
            state,
            function_id: function_id.map(FunctionId::new),
            function_logs: row.get("function_logs"),
            created_at,
            updated_at,
        })
    }
}

#[async_trait]
impl ToolRepository for PostgresToolRepository {
    async fn save(&self, tool: &Tool) -> Result<(), RepositoryError> {
        let kind_json = serde_json::to_value(&tool.kind)?;

        sqlx::query(
            r#"
            INSERT INTO tools (
                id, team_id, name, description, tool_type, kind,
                state, function_id, function_logs, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                description = EXCLUDED.description,
                tool_type = EXCLUDED.tool_type,
                kind = EXCLUDED.kind,
                state = EXCLUDED.state,
                function_id = EXCLUDED.function_id,
                function_logs = EXCLUDED.function_logs,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(tool.id.0)
        .bind(tool.team_id.as_str())
        .bind(&tool.name)
        .bind(&tool.description)
        .bind(tool.tool_type().as_str())
        .bind(kind_json)
        .bind(tool.state.map(|s| s.as_str()))
        .bind(tool.function_id.as_ref().map(|f| f.as_str()))
        .bind(tool.function_logs.as_deref())
        .bind(tool.created_at)
        .bind(tool.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to save tool: {}", e)))?;

        Ok(())
    }

    async fn find_by_id(&self, id: ToolId) -> Result<Option<Tool>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {} FROM tools WHERE id = $1", TOOL_COLUMNS))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_tool).transpose()
    }

    async fn find_one(&self, filter: &ToolFilter) -> Result<Option<Tool>, RepositoryError> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM tools
            WHERE id = $1 AND team_id = $2
              AND ($3::TEXT IS NULL OR function_id = $3)
              AND ($4::TEXT IS NULL OR state = $4)
              AND ($5::TEXT IS NULL OR tool_type = $5)
              AND ($6::TIMESTAMPTZ IS NULL OR updated_at = $6)
            "#,
            TOOL_COLUMNS
        ))
        .bind(filter.id.0)
        .bind(filter.team_id.as_str())
        .bind(filter.function_id.as_ref().map(|f| f.as_str()))
        .bind(filter.state.map(|s| s.as_str()))
        .bind(filter.tool_type.map(|t| t.as_str()))
        .bind(filter.updated_at)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_tool).transpose()
    }

    async fn update_one(&self, filter: &ToolFilter, patch: &ToolPatch) -> Result<UpdateResult, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM tools
            WHERE id = $1 AND team_id = $2
              AND ($3::TEXT IS NULL OR function_id = $3)
              AND ($4::TEXT IS NULL OR state = $4)
              AND ($5::TEXT IS NULL OR tool_type = $5)
              AND ($6::TIMESTAMPTZ IS NULL OR updated_at = $6)
            FOR UPDATE
            "#,
            TOOL_COLUMNS
        ))
        .bind(filter.id.0)
        .bind(filter.team_id.as_str())
        .bind(filter.function_id.as_ref().map(|f| f.as_str()))
        .bind(filter.state.map(|s| s.as_str()))
        .bind(filter.tool_type.map(|t| t.as_str()))
        .bind(filter.updated_at)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            debug!(tool_id = %filter.id, "conditional update matched no tool");
            return Ok(UpdateResult::default());
        };

        let mut tool = Self::row_to_tool(&row)?;
        let changed = patch.apply(&mut tool);

        if changed {
            let kind_json = serde_json::to_value(&tool.kind)?;
            sqlx::query(
                r#"
                UPDATE tools
                SET name = $2, description = $3, tool_type = $4, kind = $5,
                    state = $6, function_id = $7, function_logs = $8, updated_at = $9
                WHERE id = $1
                "#,
            )
            .bind(tool.id.0)
            .bind(&tool.name)
            .bind(&tool.description)
            .bind(tool.tool_type().as_str())
            .bind(kind_json)
            .bind(tool.state.map(|s| s.as_str()))
            .bind(tool.function_id.as_ref().map(|f| f.as_str()))
            .bind(tool.function_logs.as_deref())
            .bind(tool.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| RepositoryError::Database(format!("Failed to update tool: {}", e)))?;
        }

        tx.commit().await?;

        Ok(UpdateResult {
            matched_count: 1,
            modified_count: u64::from(changed),
        })
    }

    async fn find_by_team(&self, team_id: &TeamId) -> Result<Vec<Tool>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM tools WHERE team_id = $1 ORDER BY created_at",
            TOOL_COLUMNS
        ))
        .bind(team_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_tool).collect()
    }

    async fn find_pending(&self) -> Result<Vec<Tool>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM tools WHERE tool_type = 'FUNCTION_TOOL' AND state = 'PENDING' ORDER BY updated_at",
            TOOL_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_tool).collect()
    }

    async fn delete(&self, id: ToolId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM tools WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(|e| RepositoryError::Database(format!("Failed to delete tool: {}", e)))?;
        Ok(())
    }
}
