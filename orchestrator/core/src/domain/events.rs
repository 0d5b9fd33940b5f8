// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::tool::{FunctionId, TeamId, ToolId};

/// Deployment lifecycle events, one per observable step of an attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DeploymentEvent {
    DeploymentStarted {
        tool_id: ToolId,
        team_id: TeamId,
        function_id: FunctionId,
        started_at: DateTime<Utc>,
    },
    FunctionActivated {
        tool_id: ToolId,
        team_id: TeamId,
        function_id: FunctionId,
        function_name: String,
        activated_at: DateTime<Utc>,
    },
    DeploymentFailed {
        tool_id: ToolId,
        team_id: TeamId,
        function_id: FunctionId,
        reason: String,
        failed_at: DateTime<Utc>,
    },
    /// A later attempt already owns the record; this attempt's function is discarded
    DeploymentSuperseded {
        tool_id: ToolId,
        team_id: TeamId,
        function_id: FunctionId,
        superseded_at: DateTime<Utc>,
    },
    FunctionDeleted {
        tool_id: ToolId,
        function_id: FunctionId,
        deleted_at: DateTime<Utc>,
    },
}

impl DeploymentEvent {
    pub fn tool_id(&self) -> ToolId {
        match self {
            DeploymentEvent::DeploymentStarted { tool_id, .. }
            | DeploymentEvent::FunctionActivated { tool_id, .. }
            | DeploymentEvent::DeploymentFailed { tool_id, .. }
            | DeploymentEvent::DeploymentSuperseded { tool_id, .. }
            | DeploymentEvent::FunctionDeleted { tool_id, .. } => *tool_id,
        }
    }

    pub fn function_id(&self) -> &FunctionId {
        match self {
            DeploymentEvent::DeploymentStarted { function_id, .. }
            | DeploymentEvent::FunctionActivated { function_id, .. }
            | DeploymentEvent::DeploymentFailed { function_id, .. }
            | DeploymentEvent::DeploymentSuperseded { function_id, .. }
            | DeploymentEvent::FunctionDeleted { function_id, .. } => function_id,
        }
    }
}

/// A payload pushed to every subscriber of a channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMessage {
    pub channel: String,
    pub event: String,
    pub payload: serde_json::Value,
    pub sent_at: DateTime<Utc>,
}
