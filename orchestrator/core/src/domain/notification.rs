// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! User-facing notifications about deployment outcomes.
//!
//! A notification is persisted and then broadcast on the owning team's
//! channel under the `notification` event. Delivery is best-effort from the
//! orchestrator's point of view: failures are logged, never propagated.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::repository::RepositoryError;
use crate::domain::tool::{TeamId, ToolId};

/// Event name notifications are broadcast under
pub const NOTIFICATION_EVENT: &str = "notification";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    FunctionDeployed,
    FunctionDeploymentFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub team_id: TeamId,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub tool_id: Option<ToolId>,
    #[serde(default)]
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn function_deployed(team_id: TeamId, tool_id: ToolId, tool_name: &str) -> Self {
        Self::new(
            team_id,
            NotificationKind::FunctionDeployed,
            "Function deployed".to_string(),
            format!("Tool '{}' is ready to use.", tool_name),
            Some(tool_id),
        )
    }

    pub fn function_deployment_failed(team_id: TeamId, tool_id: ToolId, tool_name: &str) -> Self {
        Self::new(
            team_id,
            NotificationKind::FunctionDeploymentFailed,
            "Function deployment failed".to_string(),
            format!("Tool '{}' failed to deploy. Check the function logs for details.", tool_name),
            Some(tool_id),
        )
    }

    fn new(
        team_id: TeamId,
        kind: NotificationKind,
        title: String,
        message: String,
        tool_id: Option<ToolId>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            team_id,
            kind,
            title,
            message,
            tool_id,
            read: false,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Failed to persist notification: {0}")]
    Persistence(#[from] RepositoryError),

    #[error("Failed to broadcast notification: {0}")]
    Broadcast(String),
}

/// Persist-then-broadcast sink for notifications
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn create(&self, notification: &Notification) -> Result<(), NotificationError>;

    async fn broadcast(
        &self,
        channel: &str,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<(), NotificationError>;

    /// Persist `notification`, then broadcast it on its team's channel.
    async fn notify(&self, notification: Notification) -> Result<(), NotificationError> {
        self.create(&notification).await?;
        let payload = serde_json::to_value(&notification)
            .map_err(|e| NotificationError::Broadcast(e.to_string()))?;
        self.broadcast(notification.team_id.as_str(), NOTIFICATION_EVENT, payload)
            .await
    }
}
