// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use anyhow::{Context, Result};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::domain::function::FunctionProvider;
use crate::domain::repository::{ToolFilter, ToolRepository};
use crate::domain::tool::{TeamId, ToolError, ToolId, ToolState};

/// Invokes deployed function tools on behalf of agents
pub struct ToolInvocationService {
    tools: Arc<dyn ToolRepository>,
    provider: Arc<dyn FunctionProvider>,
}

impl ToolInvocationService {
    pub fn new(tools: Arc<dyn ToolRepository>, provider: Arc<dyn FunctionProvider>) -> Self {
        Self { tools, provider }
    }

    /// Call the tool's current function with `arguments` as the JSON body.
    ///
    /// Only READY function tools can be invoked.
    pub async fn invoke_tool(&self, team_id: &TeamId, tool_id: ToolId, arguments: Value) -> Result<Value> {
        let tool = self
            .tools
            .find_one(&ToolFilter::new(tool_id, team_id.clone()))
            .await
            .context("Failed to load tool")?
            .ok_or(ToolError::NotFound(tool_id))?;

        if !tool.is_function_tool() {
            return Err(ToolError::NotAFunctionTool(tool_id).into());
        }

        let function_id = match (tool.state, &tool.function_id) {
            (Some(ToolState::Ready), Some(function_id)) => function_id,
            (state, _) => {
                return Err(ToolError::NotReady {
                    tool_id,
                    state: state.map(|s| s.to_string()).unwrap_or_else(|| "NONE".to_string()),
                }
                .into())
            }
        };

        let name = self.provider.function_name(function_id);
        debug!(tool_id = %tool_id, function = %name, "invoking function tool");

        self.provider
            .call_function(&name, arguments)
            .await
            .with_context(|| format!("Invocation of tool {} failed", tool.name))
    }
}
