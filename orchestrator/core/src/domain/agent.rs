// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Agents reference the tools they may invoke. The deployment subsystem only
//! touches agents when a tool is deleted and its references must go.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::tool::{TeamId, ToolId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentId(pub Uuid);

impl AgentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: AgentId,
    pub team_id: TeamId,
    pub name: String,
    #[serde(default)]
    pub tool_ids: Vec<ToolId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    pub fn new(team_id: TeamId, name: impl Into<String>, tool_ids: Vec<ToolId>) -> Self {
        let now = Utc::now();
        Self {
            id: AgentId::new(),
            team_id,
            name: name.into(),
            tool_ids,
            created_at: now,
            updated_at: now,
        }
    }

    /// Drop a tool reference; returns whether the agent changed
    pub fn detach_tool(&mut self, tool_id: ToolId) -> bool {
        let before = self.tool_ids.len();
        self.tool_ids.retain(|id| *id != tool_id);
        let changed = self.tool_ids.len() != before;
        if changed {
            self.updated_at = Utc::now();
        }
        changed
    }
}
