// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Scripted fakes shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{Notify, Semaphore};
use tokio::time::Instant;

use toolsmith_core::domain::function::{
    BackoffPolicy, DeploymentRequest, FunctionError, FunctionProvider, FunctionState,
};
use toolsmith_core::domain::repository::{
    RepositoryError, ToolFilter, ToolPatch, ToolRepository, UpdateResult,
};
use toolsmith_core::domain::tool::{FunctionId, TeamId, Tool, ToolId};
use toolsmith_core::infrastructure::repositories::InMemoryToolRepository;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Deploy(FunctionId),
    Delete(FunctionId),
    State(FunctionId),
    Logs(FunctionId),
    Invoke(String, Value),
}

/// Serverless backend fake with scripted states and failures
#[derive(Default)]
pub struct FakeFunctionProvider {
    calls: Mutex<Vec<Call>>,
    requests: Mutex<Vec<DeploymentRequest>>,
    states: Mutex<HashMap<FunctionId, VecDeque<FunctionState>>>,
    default_state: Mutex<Option<FunctionState>>,
    deploy_error: Mutex<Option<String>>,
    delete_error: Mutex<Option<String>>,
    logs: Mutex<String>,
    invoke_response: Mutex<Value>,
    poll_times: Mutex<Vec<Instant>>,
    hold_deploys: Mutex<bool>,
    gates: Mutex<HashMap<FunctionId, Arc<Semaphore>>>,
    watched: Mutex<Option<(InMemoryToolRepository, TeamId)>>,
    tools_at_delete: Mutex<Vec<usize>>,
}

impl FakeFunctionProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// State reported for functions without a script (ACTIVE unless set)
    pub fn set_default_state(&self, state: FunctionState) {
        *self.default_state.lock() = Some(state);
    }

    /// States reported by successive polls of `id`; the last one repeats
    pub fn script_states(&self, id: &FunctionId, states: Vec<FunctionState>) {
        self.states.lock().insert(id.clone(), states.into());
    }

    pub fn fail_deploys(&self, message: &str) {
        *self.deploy_error.lock() = Some(message.to_string());
    }

    pub fn fail_deletes(&self, message: &str) {
        *self.delete_error.lock() = Some(message.to_string());
    }

    pub fn set_logs(&self, logs: &str) {
        *self.logs.lock() = logs.to_string();
    }

    pub fn set_invoke_response(&self, response: Value) {
        *self.invoke_response.lock() = response;
    }

    /// Park every deployment until `release` is called for its function id
    pub fn hold_deploys(&self) {
        *self.hold_deploys.lock() = true;
    }

    pub fn release(&self, id: &FunctionId) {
        self.gate(id).add_permits(1);
    }

    /// Record how many of `team`'s tools exist whenever a delete is issued
    pub fn watch_tools(&self, repository: InMemoryToolRepository, team: TeamId) {
        *self.watched.lock() = Some((repository, team));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn requests(&self) -> Vec<DeploymentRequest> {
        self.requests.lock().clone()
    }

    pub fn deployed(&self) -> Vec<FunctionId> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Deploy(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn deleted(&self) -> Vec<FunctionId> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Delete(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn poll_times(&self) -> Vec<Instant> {
        self.poll_times.lock().clone()
    }

    pub fn tools_at_delete(&self) -> Vec<usize> {
        self.tools_at_delete.lock().clone()
    }

    fn gate(&self, id: &FunctionId) -> Arc<Semaphore> {
        self.gates
            .lock()
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Semaphore::new(0)))
            .clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl FunctionProvider for FakeFunctionProvider {
    async fn deploy_function(&self, request: &DeploymentRequest) -> Result<String, FunctionError> {
        let held = *self.hold_deploys.lock();
        if held {
            let gate = self.gate(&request.id);
            let permit = gate.acquire().await.expect("gate closed");
            permit.forget();
        }

        self.record(Call::Deploy(request.id.clone()));
        self.requests.lock().push(request.clone());

        let error = self.deploy_error.lock().clone();
        match error {
            Some(message) => Err(FunctionError::Backend { status: 500, message }),
            None => Ok(format!("projects/test/locations/local/functions/{}", self.function_name(&request.id))),
        }
    }

    async fn delete_function(&self, id: &FunctionId) -> Result<(), FunctionError> {
        self.record(Call::Delete(id.clone()));

        let watched = self.watched.lock().clone();
        if let Some((repository, team)) = watched {
            let count = repository.find_by_team(&team).await.expect("watched repository").len();
            self.tools_at_delete.lock().push(count);
        }

        let error = self.delete_error.lock().clone();
        match error {
            Some(message) => Err(FunctionError::Backend { status: 503, message }),
            None => Ok(()),
        }
    }

    async fn get_function_state(&self, id: &FunctionId) -> FunctionState {
        self.record(Call::State(id.clone()));
        self.poll_times.lock().push(Instant::now());

        let mut states = self.states.lock();
        if let Some(queue) = states.get_mut(id) {
            if queue.len() > 1 {
                if let Some(state) = queue.pop_front() {
                    return state;
                }
            }
            if let Some(state) = queue.front() {
                return state.clone();
            }
        }
        self.default_state.lock().clone().unwrap_or(FunctionState::Active)
    }

    async fn call_function(&self, name: &str, body: Value) -> Result<Value, FunctionError> {
        self.record(Call::Invoke(name.to_string(), body));
        Ok(self.invoke_response.lock().clone())
    }

    async fn get_function_logs(&self, id: &FunctionId) -> Result<String, FunctionError> {
        self.record(Call::Logs(id.clone()));
        Ok(self.logs.lock().clone())
    }

    fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy::default()
    }
}

/// Tool store that can park a caller right after it reads a record, so a
/// test can land other writes between that read and the caller's write
pub struct PausingToolRepository {
    inner: InMemoryToolRepository,
    armed: Mutex<bool>,
    reached: Notify,
    resume: Semaphore,
}

impl PausingToolRepository {
    pub fn new(inner: InMemoryToolRepository) -> Arc<Self> {
        Arc::new(Self {
            inner,
            armed: Mutex::new(false),
            reached: Notify::new(),
            resume: Semaphore::new(0),
        })
    }

    /// Park the next `find_one` after it has read the record
    pub fn pause_next_read(&self) {
        *self.armed.lock() = true;
    }

    /// Resolves once a reader is parked
    pub async fn paused(&self) {
        self.reached.notified().await;
    }

    pub fn resume(&self) {
        self.resume.add_permits(1);
    }
}

#[async_trait]
impl ToolRepository for PausingToolRepository {
    async fn save(&self, tool: &Tool) -> Result<(), RepositoryError> {
        self.inner.save(tool).await
    }

    async fn find_by_id(&self, id: ToolId) -> Result<Option<Tool>, RepositoryError> {
        self.inner.find_by_id(id).await
    }

    async fn find_one(&self, filter: &ToolFilter) -> Result<Option<Tool>, RepositoryError> {
        let found = self.inner.find_one(filter).await?;
        let armed = std::mem::take(&mut *self.armed.lock());
        if armed {
            self.reached.notify_one();
            self.resume.acquire().await.expect("resume gate closed").forget();
        }
        Ok(found)
    }

    async fn update_one(&self, filter: &ToolFilter, patch: &ToolPatch) -> Result<UpdateResult, RepositoryError> {
        self.inner.update_one(filter, patch).await
    }

    async fn find_by_team(&self, team_id: &TeamId) -> Result<Vec<Tool>, RepositoryError> {
        self.inner.find_by_team(team_id).await
    }

    async fn find_pending(&self) -> Result<Vec<Tool>, RepositoryError> {
        self.inner.find_pending().await
    }

    async fn delete(&self, id: ToolId) -> Result<(), RepositoryError> {
        self.inner.delete(id).await
    }
}
