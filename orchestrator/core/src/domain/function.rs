// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Function Provider Trait - Anti-Corruption Layer for serverless backends
//!
//! Every serverless compute backend (Cloud Functions, and any future vendor)
//! is adapted behind [`FunctionProvider`]. The orchestrator only ever talks to
//! this trait, so tests substitute a scripted fake backend.
//!
//! The readiness wait is a provided method: adapters report states through
//! [`FunctionProvider::get_function_state`] and inherit the polling loop.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::domain::storage::StorageError;
use crate::domain::tool::{FunctionId, FunctionRuntime};

/// Upper bound on how long a deployment is polled before it counts as failed
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_millis(180_000);

/// One deployment attempt's inputs, copied from the tool record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRequest {
    pub id: FunctionId,
    pub code: String,
    pub requirements: String,
    pub environment_variables: BTreeMap<String, String>,
    pub runtime: FunctionRuntime,
}

/// Lifecycle state reported by the backend for a function
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionState {
    Active,
    Deploying,
    Failed,
    Deleting,
    /// A state string this adapter does not model
    Unknown(String),
    /// The status check itself failed
    Error,
}

impl FunctionState {
    pub fn from_backend(state: &str) -> Self {
        match state {
            "ACTIVE" => FunctionState::Active,
            "DEPLOYING" => FunctionState::Deploying,
            "FAILED" => FunctionState::Failed,
            "DELETING" => FunctionState::Deleting,
            other => FunctionState::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for FunctionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunctionState::Active => f.write_str("ACTIVE"),
            FunctionState::Deploying => f.write_str("DEPLOYING"),
            FunctionState::Failed => f.write_str("FAILED"),
            FunctionState::Deleting => f.write_str("DELETING"),
            FunctionState::Unknown(s) => write!(f, "UNKNOWN({})", s),
            FunctionState::Error => f.write_str("ERROR"),
        }
    }
}

/// Exponential backoff between status polls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub initial_delay: Duration,
    pub multiplier: u32,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(5_000),
            multiplier: 2,
            max_delay: Duration::from_millis(60_000),
        }
    }
}

impl BackoffPolicy {
    /// Infinite sequence of poll delays: initial, doubled each step, capped.
    pub fn delays(&self) -> BackoffDelays {
        BackoffDelays {
            next: self.initial_delay.min(self.max_delay),
            multiplier: self.multiplier,
            max_delay: self.max_delay,
        }
    }
}

pub struct BackoffDelays {
    next: Duration,
    multiplier: u32,
    max_delay: Duration,
}

impl Iterator for BackoffDelays {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let current = self.next;
        self.next = current
            .checked_mul(self.multiplier)
            .unwrap_or(self.max_delay)
            .min(self.max_delay);
        Some(current)
    }
}

#[derive(Debug, Error)]
pub enum FunctionError {
    #[error("Function not found: {0}")]
    NotFound(String),

    #[error("Backend returned HTTP {status}: {message}")]
    Backend { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Artifact storage failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Failed to build artifact: {0}")]
    Artifact(String),

    #[error("Invocation of {name} failed: {message}")]
    Invocation { name: String, message: String },

    #[error("Provider misconfigured: {0}")]
    Configuration(String),

    #[error("Unexpected backend response: {0}")]
    Serialization(String),
}

impl From<reqwest::Error> for FunctionError {
    fn from(err: reqwest::Error) -> Self {
        FunctionError::Http(err.to_string())
    }
}

/// Contract every serverless backend adapter satisfies
#[async_trait]
pub trait FunctionProvider: Send + Sync {
    /// Package, upload and create-or-update the function for this attempt.
    ///
    /// Returns the fully qualified backend function name.
    async fn deploy_function(&self, request: &DeploymentRequest) -> Result<String, FunctionError>;

    /// Delete the backend function. Failures are logged and returned.
    async fn delete_function(&self, id: &FunctionId) -> Result<(), FunctionError>;

    /// Current backend state, or [`FunctionState::Error`] if the check failed.
    async fn get_function_state(&self, id: &FunctionId) -> FunctionState;

    /// Synchronously invoke a deployed function by its short name.
    async fn call_function(
        &self,
        name: &str,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, FunctionError>;

    /// Recent backend logs for diagnostics.
    async fn get_function_logs(&self, id: &FunctionId) -> Result<String, FunctionError>;

    /// Short backend name derived from a function id
    fn function_name(&self, id: &FunctionId) -> String {
        format!("tool-{}", id.as_str().to_lowercase())
    }

    fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy::default()
    }

    /// Poll until the function is ACTIVE.
    ///
    /// Returns `false` as soon as a state other than ACTIVE or DEPLOYING is
    /// observed, or once `max_wait` has elapsed.
    async fn wait_for_function_to_be_active(&self, id: &FunctionId, max_wait: Duration) -> bool {
        wait_until_active(self, id, self.backoff_policy(), max_wait).await
    }
}

pub async fn wait_until_active<P>(
    provider: &P,
    id: &FunctionId,
    policy: BackoffPolicy,
    max_wait: Duration,
) -> bool
where
    P: FunctionProvider + ?Sized,
{
    let started = Instant::now();
    let mut delays = policy.delays();

    while started.elapsed() < max_wait {
        match provider.get_function_state(id).await {
            FunctionState::Active => {
                info!(function_id = %id, elapsed_ms = started.elapsed().as_millis() as u64, "function is active");
                return true;
            }
            FunctionState::Deploying => {}
            other => {
                warn!(function_id = %id, state = %other, "function reached a non-deploying state");
                return false;
            }
        }

        let delay = delays.next().unwrap_or(policy.max_delay);
        debug!(function_id = %id, delay_ms = delay.as_millis() as u64, "function still deploying");
        tokio::time::sleep(delay).await;
    }

    warn!(function_id = %id, max_wait_ms = max_wait.as_millis() as u64, "timed out waiting for function");
    false
}
