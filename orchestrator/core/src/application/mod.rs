// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod notification_service;
pub mod repository_factory;
pub mod tool_deployment;
pub mod tool_invocation;

pub use notification_service::NotificationService;
pub use tool_deployment::{DeploymentHandle, DeploymentOutcome, ToolChange, ToolDeploymentService};
pub use tool_invocation::ToolInvocationService;
