// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of the repository traits defined in
//! `crate::domain::repository`.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Persist and retrieve domain aggregates
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)
//!
//! # Available Implementations
//!
//! - **PostgresToolRepository** - Tool records in PostgreSQL
//! - **InMemoryToolRepository** - HashMap-backed tool records
//! - **InMemoryAgentRepository** - HashMap-backed agents
//! - **InMemoryNotificationRepository** - Append-only notification feed
//!
//! Conditional updates on the in-memory store hold the write lock across the
//! match and the write, so they are atomic with respect to each other.

pub mod postgres_tool;

pub use postgres_tool::PostgresToolRepository;

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::agent::{Agent, AgentId};
use crate::domain::notification::Notification;
use crate::domain::repository::{
    AgentRepository, NotificationRepository, RepositoryError, ToolFilter, ToolPatch,
    ToolRepository, UpdateResult,
};
use crate::domain::tool::{TeamId, Tool, ToolId, ToolState};

#[derive(Clone, Default)]
pub struct InMemoryToolRepository {
    tools: Arc<RwLock<HashMap<ToolId, Tool>>>,
}

impl InMemoryToolRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ToolRepository for InMemoryToolRepository {
    async fn save(&self, tool: &Tool) -> Result<(), RepositoryError> {
        self.tools.write().insert(tool.id, tool.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: ToolId) -> Result<Option<Tool>, RepositoryError> {
        Ok(self.tools.read().get(&id).cloned())
    }

    async fn find_one(&self, filter: &ToolFilter) -> Result<Option<Tool>, RepositoryError> {
        Ok(self
            .tools
            .read()
            .get(&filter.id)
            .filter(|tool| filter.matches(tool))
            .cloned())
    }

    async fn update_one(&self, filter: &ToolFilter, patch: &ToolPatch) -> Result<UpdateResult, RepositoryError> {
        let mut tools = self.tools.write();
        match tools.get_mut(&filter.id) {
            Some(tool) if filter.matches(tool) => {
                let changed = patch.apply(tool);
                Ok(UpdateResult {
                    matched_count: 1,
                    modified_count: u64::from(changed),
                })
            }
            _ => Ok(UpdateResult::default()),
        }
    }

    async fn find_by_team(&self, team_id: &TeamId) -> Result<Vec<Tool>, RepositoryError> {
        let mut tools: Vec<Tool> = self
            .tools
            .read()
            .values()
            .filter(|tool| &tool.team_id == team_id)
            .cloned()
            .collect();
        tools.sort_by_key(|tool| tool.created_at);
        Ok(tools)
    }

    async fn find_pending(&self) -> Result<Vec<Tool>, RepositoryError> {
        let mut tools: Vec<Tool> = self
            .tools
            .read()
            .values()
            .filter(|tool| tool.is_function_tool() && tool.state == Some(ToolState::Pending))
            .cloned()
            .collect();
        tools.sort_by_key(|tool| tool.updated_at);
        Ok(tools)
    }

    async fn delete(&self, id: ToolId) -> Result<(), RepositoryError> {
        self.tools.write().remove(&id);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryAgentRepository {
    agents: Arc<RwLock<HashMap<AgentId, Agent>>>,
}

impl InMemoryAgentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AgentRepository for InMemoryAgentRepository {
    async fn save(&self, agent: &Agent) -> Result<(), RepositoryError> {
        self.agents.write().insert(agent.id, agent.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: AgentId) -> Result<Option<Agent>, RepositoryError> {
        Ok(self.agents.read().get(&id).cloned())
    }

    async fn find_by_team(&self, team_id: &TeamId) -> Result<Vec<Agent>, RepositoryError> {
        Ok(self
            .agents
            .read()
            .values()
            .filter(|agent| &agent.team_id == team_id)
            .cloned()
            .collect())
    }

    async fn remove_tool_references(&self, team_id: &TeamId, tool_id: ToolId) -> Result<u64, RepositoryError> {
        let mut agents = self.agents.write();
        let modified = agents
            .values_mut()
            .filter(|agent| &agent.team_id == team_id)
            .map(|agent| agent.detach_tool(tool_id))
            .filter(|changed| *changed)
            .count();
        Ok(modified as u64)
    }

    async fn delete(&self, id: AgentId) -> Result<(), RepositoryError> {
        self.agents.write().remove(&id);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryNotificationRepository {
    notifications: Arc<RwLock<Vec<Notification>>>,
}

impl InMemoryNotificationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationRepository for InMemoryNotificationRepository {
    async fn create(&self, notification: &Notification) -> Result<(), RepositoryError> {
        self.notifications.write().push(notification.clone());
        Ok(())
    }

    async fn find_by_team(&self, team_id: &TeamId, limit: usize) -> Result<Vec<Notification>, RepositoryError> {
        Ok(self
            .notifications
            .read()
            .iter()
            .rev()
            .filter(|notification| &notification.team_id == team_id)
            .take(limit)
            .cloned()
            .collect())
    }
}
