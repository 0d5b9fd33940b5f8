// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Tool Deployment Application Service
//!
//! Drives create, edit and delete of tools, coordinating:
//! - Domain layer: Tool aggregate, FunctionProvider and repository traits
//! - Infrastructure layer: EventBus for deployment lifecycle events
//! - NotificationSink for user-facing outcome notifications
//!
//! Each call returns once validation and the initial write are done. Function
//! deployments then run as detached tasks: deploy, wait for activation,
//! conditionally write the outcome, notify, and clean up whichever backend
//! function lost.
//!
//! # Reconciliation
//!
//! Every attempt deploys under a fresh [`FunctionId`]. The outcome is written
//! with [`ToolRepository::update_one`] guarded by the fields the attempt
//! expects to still find:
//!
//! | Flow   | Guard                                        | On success writes            |
//! |--------|----------------------------------------------|------------------------------|
//! | create | `function_id = attempt`, `type = FUNCTION`   | `READY`                      |
//! | edit   | `state = PENDING`, `type = FUNCTION`         | `READY`, `function_id = new` |
//!
//! A guard that matches nothing means a later change owns the record; the
//! attempt deletes its own function and leaves the record alone.
//!
//! Edits never overwrite deployment fields they did not mean to change: the
//! definition and any PENDING transition go through the same `update_one`,
//! guarded by the `updated_at` the edit read.

use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::domain::events::DeploymentEvent;
use crate::domain::function::{DeploymentRequest, FunctionProvider, DEFAULT_MAX_WAIT};
use crate::domain::notification::{Notification, NotificationSink};
use crate::domain::repository::{AgentRepository, ToolFilter, ToolPatch, ToolRepository};
use crate::domain::tool::{
    FunctionId, TeamId, Tool, ToolError, ToolId, ToolKind, ToolRequest, ToolState, ToolType,
};
use crate::infrastructure::event_bus::EventBus;

/// Re-reads an edit tolerates before reporting a conflict
const EDIT_RETRIES: usize = 5;

/// A function id distinct from the one the tool currently holds
fn fresh_function_id(tool: &Tool) -> FunctionId {
    let mut id = FunctionId::generate();
    while Some(&id) == tool.function_id.as_ref() {
        id = FunctionId::generate();
    }
    id
}

/// How a detached deployment attempt ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeploymentOutcome {
    /// Function became ACTIVE and the tool is READY
    Activated { function_id: FunctionId },
    /// Function never became ACTIVE; the tool is ERROR and the function deleted
    ActivationFailed { function_id: FunctionId },
    /// A later change owns the tool; this attempt's function was deleted
    Superseded { function_id: FunctionId },
    /// The backend rejected the deployment
    DeployFailed { function_id: FunctionId, reason: String },
    /// The outcome could not be written to the tool record
    ReconcileFailed { function_id: FunctionId, reason: String },
}

impl DeploymentOutcome {
    pub fn function_id(&self) -> &FunctionId {
        match self {
            DeploymentOutcome::Activated { function_id }
            | DeploymentOutcome::ActivationFailed { function_id }
            | DeploymentOutcome::Superseded { function_id }
            | DeploymentOutcome::DeployFailed { function_id, .. }
            | DeploymentOutcome::ReconcileFailed { function_id, .. } => function_id,
        }
    }
}

/// Handle to a detached deployment task.
///
/// Dropping it leaves the task running.
#[derive(Debug)]
pub struct DeploymentHandle {
    function_id: FunctionId,
    handle: JoinHandle<DeploymentOutcome>,
}

impl DeploymentHandle {
    pub fn function_id(&self) -> &FunctionId {
        &self.function_id
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the attempt to resolve
    pub async fn outcome(self) -> Result<DeploymentOutcome> {
        self.handle
            .await
            .with_context(|| format!("deployment task for function {} did not complete", self.function_id))
    }
}

/// Result of a create or edit: the stored tool and, if one was started, the
/// deployment it triggered
#[derive(Debug)]
pub struct ToolChange {
    pub tool: Tool,
    pub deployment: Option<DeploymentHandle>,
}

#[derive(Debug, Clone)]
enum AttemptKind {
    Create,
    Edit { previous: Option<FunctionId> },
}

/// One deployment attempt and what it expects to find when it resolves
#[derive(Debug, Clone)]
struct Attempt {
    tool_id: ToolId,
    team_id: TeamId,
    tool_name: String,
    request: DeploymentRequest,
    kind: AttemptKind,
}

impl Attempt {
    fn function_id(&self) -> &FunctionId {
        &self.request.id
    }

    fn guard(&self) -> ToolFilter {
        let filter = ToolFilter::new(self.tool_id, self.team_id.clone()).with_type(ToolType::FunctionTool);
        match self.kind {
            AttemptKind::Create => filter.with_function_id(self.request.id.clone()),
            AttemptKind::Edit { .. } => filter.with_state(ToolState::Pending),
        }
    }

    fn activated_patch(&self) -> ToolPatch {
        match self.kind {
            AttemptKind::Create => ToolPatch::ready(),
            AttemptKind::Edit { .. } => ToolPatch::ready().with_function_id(self.request.id.clone()),
        }
    }
}

/// Collaborators a detached attempt needs after the request has returned
#[derive(Clone)]
struct Reconciler {
    tools: Arc<dyn ToolRepository>,
    provider: Arc<dyn FunctionProvider>,
    notifications: Arc<dyn NotificationSink>,
    event_bus: Arc<EventBus>,
    max_wait: Duration,
}

impl Reconciler {
    async fn run(self, attempt: Attempt) -> DeploymentOutcome {
        let function_id = attempt.function_id().clone();
        info!(
            tool_id = %attempt.tool_id,
            function_id = %function_id,
            runtime = %attempt.request.runtime,
            "deploying function"
        );
        self.event_bus.publish_deployment_event(DeploymentEvent::DeploymentStarted {
            tool_id: attempt.tool_id,
            team_id: attempt.team_id.clone(),
            function_id: function_id.clone(),
            started_at: Utc::now(),
        });

        let function_name = match self.provider.deploy_function(&attempt.request).await {
            Ok(name) => name,
            Err(e) => return self.deploy_failed(&attempt, e.to_string()).await,
        };
        debug!(tool_id = %attempt.tool_id, function = %function_name, "deployment accepted");

        let active = self
            .provider
            .wait_for_function_to_be_active(&function_id, self.max_wait)
            .await;

        let patch = if active {
            attempt.activated_patch()
        } else {
            ToolPatch::errored(self.capture_logs(&function_id).await)
        };

        let result = match self.tools.update_one(&attempt.guard(), &patch).await {
            Ok(result) => result,
            Err(e) => {
                error!(tool_id = %attempt.tool_id, function_id = %function_id, "failed to record deployment outcome: {}", e);
                return DeploymentOutcome::ReconcileFailed {
                    function_id,
                    reason: e.to_string(),
                };
            }
        };

        if result.matched_count == 0 {
            return self.superseded(&attempt).await;
        }

        if active {
            info!(tool_id = %attempt.tool_id, function_id = %function_id, "function tool is ready");
            self.event_bus.publish_deployment_event(DeploymentEvent::FunctionActivated {
                tool_id: attempt.tool_id,
                team_id: attempt.team_id.clone(),
                function_id: function_id.clone(),
                function_name,
                activated_at: Utc::now(),
            });
            self.notify(Notification::function_deployed(
                attempt.team_id.clone(),
                attempt.tool_id,
                &attempt.tool_name,
            ))
            .await;

            if let AttemptKind::Edit { previous: Some(previous) } = &attempt.kind {
                if previous != &function_id {
                    self.delete_quietly(attempt.tool_id, previous).await;
                }
            }

            DeploymentOutcome::Activated { function_id }
        } else {
            warn!(tool_id = %attempt.tool_id, function_id = %function_id, "function failed to become active");
            self.event_bus.publish_deployment_event(DeploymentEvent::DeploymentFailed {
                tool_id: attempt.tool_id,
                team_id: attempt.team_id.clone(),
                function_id: function_id.clone(),
                reason: "function did not become active".to_string(),
                failed_at: Utc::now(),
            });
            self.notify(Notification::function_deployment_failed(
                attempt.team_id.clone(),
                attempt.tool_id,
                &attempt.tool_name,
            ))
            .await;
            self.delete_quietly(attempt.tool_id, &function_id).await;

            DeploymentOutcome::ActivationFailed { function_id }
        }
    }

    /// The backend rejected the deployment. Mark the tool ERROR under the
    /// attempt's own guard and remove anything half-created.
    async fn deploy_failed(&self, attempt: &Attempt, reason: String) -> DeploymentOutcome {
        let function_id = attempt.function_id().clone();
        error!(tool_id = %attempt.tool_id, function_id = %function_id, "function deployment failed: {}", reason);

        let patch = ToolPatch::errored(Some(reason.clone()));
        let owned = match self.tools.update_one(&attempt.guard(), &patch).await {
            Ok(result) => result.matched_count > 0,
            Err(e) => {
                error!(tool_id = %attempt.tool_id, function_id = %function_id, "failed to record deployment failure: {}", e);
                false
            }
        };

        self.delete_quietly(attempt.tool_id, &function_id).await;

        if owned {
            self.event_bus.publish_deployment_event(DeploymentEvent::DeploymentFailed {
                tool_id: attempt.tool_id,
                team_id: attempt.team_id.clone(),
                function_id: function_id.clone(),
                reason: reason.clone(),
                failed_at: Utc::now(),
            });
            self.notify(Notification::function_deployment_failed(
                attempt.team_id.clone(),
                attempt.tool_id,
                &attempt.tool_name,
            ))
            .await;
        }

        DeploymentOutcome::DeployFailed { function_id, reason }
    }

    async fn superseded(&self, attempt: &Attempt) -> DeploymentOutcome {
        let function_id = attempt.function_id().clone();
        info!(
            tool_id = %attempt.tool_id,
            function_id = %function_id,
            "deployment superseded by a later change, discarding function"
        );
        self.event_bus.publish_deployment_event(DeploymentEvent::DeploymentSuperseded {
            tool_id: attempt.tool_id,
            team_id: attempt.team_id.clone(),
            function_id: function_id.clone(),
            superseded_at: Utc::now(),
        });
        self.delete_quietly(attempt.tool_id, &function_id).await;

        DeploymentOutcome::Superseded { function_id }
    }

    async fn capture_logs(&self, function_id: &FunctionId) -> Option<String> {
        match self.provider.get_function_logs(function_id).await {
            Ok(logs) if logs.is_empty() => None,
            Ok(logs) => Some(logs),
            Err(e) => {
                warn!(function_id = %function_id, "failed to fetch function logs: {}", e);
                None
            }
        }
    }

    async fn delete_quietly(&self, tool_id: ToolId, function_id: &FunctionId) {
        match self.provider.delete_function(function_id).await {
            Ok(()) => self.event_bus.publish_deployment_event(DeploymentEvent::FunctionDeleted {
                tool_id,
                function_id: function_id.clone(),
                deleted_at: Utc::now(),
            }),
            Err(e) => warn!(tool_id = %tool_id, function_id = %function_id, "failed to delete function: {}", e),
        }
    }

    async fn notify(&self, notification: Notification) {
        let team_id = notification.team_id.clone();
        if let Err(e) = self.notifications.notify(notification).await {
            warn!(team_id = %team_id, "failed to deliver notification: {}", e);
        }
    }
}

/// Create, edit and delete tools, deploying function tools in the background
pub struct ToolDeploymentService {
    agents: Arc<dyn AgentRepository>,
    reconciler: Reconciler,
}

impl ToolDeploymentService {
    pub fn new(
        tools: Arc<dyn ToolRepository>,
        agents: Arc<dyn AgentRepository>,
        provider: Arc<dyn FunctionProvider>,
        notifications: Arc<dyn NotificationSink>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            agents,
            reconciler: Reconciler {
                tools,
                provider,
                notifications,
                event_bus,
                max_wait: DEFAULT_MAX_WAIT,
            },
        }
    }

    /// Upper bound on polling for activation
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.reconciler.max_wait = max_wait;
        self
    }

    fn spawn(&self, attempt: Attempt) -> DeploymentHandle {
        let function_id = attempt.function_id().clone();
        let reconciler = self.reconciler.clone();
        DeploymentHandle {
            function_id,
            handle: tokio::spawn(reconciler.run(attempt)),
        }
    }

    fn attempt(tool: &Tool, function_id: &FunctionId, kind: AttemptKind) -> Option<Attempt> {
        tool.kind.as_function().map(|spec| Attempt {
            tool_id: tool.id,
            team_id: tool.team_id.clone(),
            tool_name: tool.name.clone(),
            request: spec.to_deployment_request(function_id),
            kind,
        })
    }

    async fn find_tool(&self, team_id: &TeamId, tool_id: ToolId) -> Result<Tool> {
        self.reconciler
            .tools
            .find_one(&ToolFilter::new(tool_id, team_id.clone()))
            .await
            .context("Failed to load tool")?
            .ok_or_else(|| ToolError::NotFound(tool_id).into())
    }

    /// Validate and store a new tool. Function tools start PENDING and deploy
    /// in the background.
    pub async fn create_tool(&self, team_id: TeamId, request: ToolRequest) -> Result<ToolChange> {
        request.validate()?;

        let function_id = matches!(request.kind, ToolKind::Function(_)).then(FunctionId::generate);
        let tool = Tool::new(team_id, request, function_id.clone());

        self.reconciler
            .tools
            .save(&tool)
            .await
            .context("Failed to save tool")?;
        info!(tool_id = %tool.id, team_id = %tool.team_id, tool_type = %tool.tool_type(), "created tool");

        let deployment = function_id
            .and_then(|id| Self::attempt(&tool, &id, AttemptKind::Create))
            .map(|attempt| self.spawn(attempt));

        Ok(ToolChange { tool, deployment })
    }

    /// Apply an edit. Redeploys only when a deployment-relevant field of a
    /// function tool changed.
    ///
    /// The write is guarded by the `updated_at` this call read, so a
    /// reconciliation or another edit landing in between forces a re-read
    /// instead of being overwritten.
    pub async fn edit_tool(&self, team_id: TeamId, tool_id: ToolId, request: ToolRequest) -> Result<ToolChange> {
        request.validate()?;
        let mut retired: Option<FunctionId> = None;

        for _ in 0..EDIT_RETRIES {
            let existing = self.find_tool(&team_id, tool_id).await?;

            let mut patch = ToolPatch::definition(request.clone());
            let mut attempt = None;
            match (existing.kind.as_function(), request.kind.as_function()) {
                (Some(_), None) => {
                    if let Some(function_id) = &existing.function_id {
                        if retired.as_ref() != Some(function_id) {
                            self.retire_function(tool_id, function_id).await?;
                            retired = Some(function_id.clone());
                        }
                    }
                    info!(tool_id = %tool_id, tool_type = %request.kind.tool_type(), "tool is no longer a function tool");
                    patch = patch.without_deployment();
                }
                (Some(previous), Some(current)) => {
                    if previous.deployment_differs(current) {
                        patch = patch.pending();
                        attempt = Some((
                            fresh_function_id(&existing),
                            AttemptKind::Edit {
                                previous: existing.function_id.clone(),
                            },
                        ));
                    } else {
                        debug!(tool_id = %tool_id, "deployment fields unchanged, skipping redeploy");
                    }
                }
                (None, Some(_)) => {
                    let function_id = fresh_function_id(&existing);
                    patch = patch.pending().with_function_id(function_id.clone()).with_logs_cleared();
                    attempt = Some((function_id, AttemptKind::Create));
                }
                (None, None) => {}
            }

            let revision = ToolFilter::new(tool_id, team_id.clone()).with_updated_at(existing.updated_at);
            let result = self
                .reconciler
                .tools
                .update_one(&revision, &patch)
                .await
                .context("Failed to update tool")?;
            if result.matched_count == 0 {
                debug!(tool_id = %tool_id, "tool changed since it was read, retrying edit");
                continue;
            }

            let mut tool = existing;
            patch.apply(&mut tool);
            info!(tool_id = %tool_id, redeploy = attempt.is_some(), "edited tool");

            let deployment = attempt
                .and_then(|(function_id, kind)| Self::attempt(&tool, &function_id, kind))
                .map(|attempt| self.spawn(attempt));

            return Ok(ToolChange { tool, deployment });
        }

        warn!(tool_id = %tool_id, retries = EDIT_RETRIES, "giving up on edit of a tool that keeps changing");
        Err(ToolError::Conflict(tool_id).into())
    }

    /// Delete a function from the backend ahead of a record change
    async fn retire_function(&self, tool_id: ToolId, function_id: &FunctionId) -> Result<()> {
        self.reconciler
            .provider
            .delete_function(function_id)
            .await
            .with_context(|| format!("Failed to delete function {}", function_id))?;
        self.reconciler
            .event_bus
            .publish_deployment_event(DeploymentEvent::FunctionDeleted {
                tool_id,
                function_id: function_id.clone(),
                deleted_at: Utc::now(),
            });
        Ok(())
    }

    /// Delete a tool. A function tool's backend function is deleted first; if
    /// that fails the tool is kept.
    pub async fn delete_tool(&self, team_id: TeamId, tool_id: ToolId) -> Result<()> {
        let tool = self.find_tool(&team_id, tool_id).await?;

        if tool.is_function_tool() {
            if let Some(function_id) = &tool.function_id {
                self.retire_function(tool_id, function_id).await?;
            }
        }

        self.reconciler
            .tools
            .delete(tool_id)
            .await
            .context("Failed to delete tool")?;

        let detached = self
            .agents
            .remove_tool_references(&team_id, tool_id)
            .await
            .context("Failed to remove tool from agents")?;

        info!(tool_id = %tool_id, team_id = %team_id, agents_updated = detached, "deleted tool");
        Ok(())
    }
}
