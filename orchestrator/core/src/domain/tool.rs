// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Tool Aggregate
//!
//! A tool is a capability unit an agent can invoke. Tools are polymorphic over
//! [`ToolKind`]; only the `FUNCTION_TOOL` variant is backed by user code that
//! gets deployed to a serverless backend, so only it carries a deployment
//! [`ToolState`] and a current [`FunctionId`].
//!
//! Requests that create or edit tools are validated here, per variant, before
//! any persistence or deployment happens.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::function::DeploymentRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToolId(pub Uuid);

impl ToolId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for ToolId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ToolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Owning team. Also the broadcast channel for that team's notifications.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TeamId(pub String);

impl TeamId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of one deployment attempt and of the backend function it produces.
///
/// Every attempt gets a fresh id, which is what lets reconciliation tell a
/// late attempt apart from the current one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionId(pub String);

impl FunctionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Accept a caller-chosen id: lowercase letters, digits and hyphens
    pub fn parse(raw: &str) -> Result<Self, ToolError> {
        let valid = !raw.is_empty()
            && raw
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        if !valid {
            return Err(ToolError::Validation(format!(
                "function id '{}' may only contain lowercase letters, digits and '-'",
                raw
            )));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ToolType {
    RagTool,
    FunctionTool,
    ApiTool,
}

impl ToolType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolType::RagTool => "RAG_TOOL",
            ToolType::FunctionTool => "FUNCTION_TOOL",
            ToolType::ApiTool => "API_TOOL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "RAG_TOOL" => Some(ToolType::RagTool),
            "FUNCTION_TOOL" => Some(ToolType::FunctionTool),
            "API_TOOL" => Some(ToolType::ApiTool),
            _ => None,
        }
    }
}

impl fmt::Display for ToolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deployment status of a function tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ToolState {
    Pending,
    Ready,
    Error,
}

impl ToolState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolState::Pending => "PENDING",
            ToolState::Ready => "READY",
            ToolState::Error => "ERROR",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(ToolState::Pending),
            "READY" => Some(ToolState::Ready),
            "ERROR" => Some(ToolState::Error),
            _ => None,
        }
    }
}

impl fmt::Display for ToolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Language runtime a function tool is deployed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FunctionRuntime {
    Python310,
    Python311,
    Python312,
}

impl FunctionRuntime {
    /// Backend runtime identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            FunctionRuntime::Python310 => "python310",
            FunctionRuntime::Python311 => "python311",
            FunctionRuntime::Python312 => "python312",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "python310" => Some(FunctionRuntime::Python310),
            "python311" => Some(FunctionRuntime::Python311),
            "python312" => Some(FunctionRuntime::Python312),
            _ => None,
        }
    }
}

impl Default for FunctionRuntime {
    fn default() -> Self {
        FunctionRuntime::Python312
    }
}

impl fmt::Display for FunctionRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source inputs of a function tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionToolSpec {
    pub code: String,

    #[serde(default)]
    pub requirements: String,

    #[serde(default)]
    pub environment_variables: BTreeMap<String, String>,

    #[serde(default)]
    pub runtime: FunctionRuntime,
}

impl FunctionToolSpec {
    /// True when any field that affects the deployed artifact differs.
    ///
    /// Compared fields: environment variables, code, requirements, runtime.
    pub fn deployment_differs(&self, other: &FunctionToolSpec) -> bool {
        self.environment_variables != other.environment_variables
            || self.code != other.code
            || self.requirements != other.requirements
            || self.runtime != other.runtime
    }

    /// Snapshot the source inputs into a request for one deployment attempt
    pub fn to_deployment_request(&self, id: &FunctionId) -> DeploymentRequest {
        DeploymentRequest {
            id: id.clone(),
            code: self.code.clone(),
            requirements: self.requirements.clone(),
            environment_variables: self.environment_variables.clone(),
            runtime: self.runtime,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RagToolSpec {
    pub data_source_ids: Vec<String>,

    #[serde(default = "default_top_k")]
    pub top_k: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiToolSpec {
    pub method: String,
    pub url: String,

    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_schema: Option<serde_json::Value>,
}

/// Capability set of a tool, tagged by `type`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "spec")]
pub enum ToolKind {
    #[serde(rename = "RAG_TOOL")]
    Rag(RagToolSpec),
    #[serde(rename = "FUNCTION_TOOL")]
    Function(FunctionToolSpec),
    #[serde(rename = "API_TOOL")]
    Api(ApiToolSpec),
}

impl ToolKind {
    pub fn tool_type(&self) -> ToolType {
        match self {
            ToolKind::Rag(_) => ToolType::RagTool,
            ToolKind::Function(_) => ToolType::FunctionTool,
            ToolKind::Api(_) => ToolType::ApiTool,
        }
    }

    pub fn as_function(&self) -> Option<&FunctionToolSpec> {
        match self {
            ToolKind::Function(spec) => Some(spec),
            _ => None,
        }
    }

    fn validate(&self) -> Result<(), ToolError> {
        match self {
            ToolKind::Function(spec) => {
                if spec.code.trim().is_empty() {
                    return Err(ToolError::Validation("code cannot be empty".to_string()));
                }
                for key in spec.environment_variables.keys() {
                    if !is_valid_env_key(key) {
                        return Err(ToolError::Validation(format!(
                            "invalid environment variable name '{}'",
                            key
                        )));
                    }
                }
                Ok(())
            }
            ToolKind::Rag(spec) => {
                if spec.data_source_ids.is_empty() {
                    return Err(ToolError::Validation(
                        "a RAG tool needs at least one data source".to_string(),
                    ));
                }
                if spec.top_k == 0 {
                    return Err(ToolError::Validation("topK must be positive".to_string()));
                }
                Ok(())
            }
            ToolKind::Api(spec) => {
                let method = spec.method.to_uppercase();
                if !matches!(method.as_str(), "GET" | "POST" | "PUT" | "PATCH" | "DELETE") {
                    return Err(ToolError::Validation(format!(
                        "unsupported HTTP method '{}'",
                        spec.method
                    )));
                }
                if !(spec.url.starts_with("http://") || spec.url.starts_with("https://")) {
                    return Err(ToolError::Validation(format!(
                        "url must be absolute http(s): '{}'",
                        spec.url
                    )));
                }
                Ok(())
            }
        }
    }
}

/// Persisted tool record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    pub id: ToolId,
    pub team_id: TeamId,
    pub name: String,
    pub description: String,

    #[serde(flatten)]
    pub kind: ToolKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<ToolState>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_id: Option<FunctionId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_logs: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tool {
    /// Build a new tool from a validated request.
    ///
    /// Function tools start `PENDING` with the id of their first attempt.
    pub fn new(team_id: TeamId, request: ToolRequest, function_id: Option<FunctionId>) -> Self {
        let now = Utc::now();
        let is_function = request.kind.tool_type() == ToolType::FunctionTool;
        Self {
            id: ToolId::new(),
            team_id,
            name: request.name,
            description: request.description,
            kind: request.kind,
            state: if is_function { Some(ToolState::Pending) } else { None },
            function_id: if is_function { function_id } else { None },
            function_logs: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn tool_type(&self) -> ToolType {
        self.kind.tool_type()
    }

    pub fn is_function_tool(&self) -> bool {
        self.tool_type() == ToolType::FunctionTool
    }
}

/// Body of a create or edit request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolRequest {
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(flatten)]
    pub kind: ToolKind,
}

impl ToolRequest {
    pub fn validate(&self) -> Result<(), ToolError> {
        if self.name.trim().is_empty() {
            return Err(ToolError::Validation("name cannot be empty".to_string()));
        }
        if self.name.len() > 128 {
            return Err(ToolError::Validation(
                "name must be at most 128 characters".to_string(),
            ));
        }
        self.kind.validate()
    }
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Invalid tool request: {0}")]
    Validation(String),

    #[error("Tool not found: {0}")]
    NotFound(ToolId),

    #[error("Tool {0} is not a function tool")]
    NotAFunctionTool(ToolId),

    #[error("Tool {tool_id} is not ready (state: {state})")]
    NotReady { tool_id: ToolId, state: String },

    #[error("Tool {0} was modified concurrently, retry the edit")]
    Conflict(ToolId),
}

/// Environment variable names: a letter or `_`, then letters, digits or `_`
pub fn is_valid_env_key(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn default_top_k() -> u32 {
    5
}
