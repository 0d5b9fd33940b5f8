// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Cloud Functions (2nd gen) Function Provider
//!
//! Implements the FunctionProvider trait against the Cloud Functions v2 REST
//! API. Artifacts are staged through a [`BlobStore`] and referenced from the
//! function's build configuration.
//!
//! # API Endpoints
//!
//! - `GET {api}/v2/projects/{p}/locations/{l}/functions/{name}` - Existence check / state
//! - `POST {api}/v2/projects/{p}/locations/{l}/functions?functionId={name}` - Create
//! - `PATCH {api}/v2/projects/{p}/locations/{l}/functions/{name}` - Update
//! - `DELETE {api}/v2/projects/{p}/locations/{l}/functions/{name}` - Delete
//! - `POST {logging}/v2/entries:list` - Recent log entries
//! - `POST https://{location}-{project}.{domain}/{name}` - Invoke

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::domain::config::{FunctionProviderConfig, PollingConfig};
use crate::domain::function::{
    BackoffPolicy, DeploymentRequest, FunctionError, FunctionProvider, FunctionState,
};
use crate::domain::storage::{artifact_key, BlobStore, ARTIFACT_CONTENT_TYPE};
use crate::domain::tool::FunctionId;
use crate::infrastructure::artifact::ArtifactBuilder;

/// Log lines returned by `get_function_logs`
const LOG_PAGE_SIZE: u32 = 50;

/// Long-running operation returned by create, update and delete
#[derive(Debug, Deserialize)]
struct Operation {
    #[serde(default)]
    name: String,
    #[serde(default)]
    done: bool,
    error: Option<OperationStatus>,
}

#[derive(Debug, Deserialize)]
struct OperationStatus {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct FunctionResource {
    #[serde(default)]
    state: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LogEntries {
    #[serde(default)]
    entries: Vec<LogEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogEntry {
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    severity: Option<String>,
    #[serde(default)]
    text_payload: Option<String>,
    #[serde(default)]
    json_payload: Option<serde_json::Value>,
}

impl LogEntry {
    fn render(&self) -> Option<String> {
        let message = match (&self.text_payload, &self.json_payload) {
            (Some(text), _) => text.clone(),
            (None, Some(payload)) => payload
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| payload.to_string()),
            (None, None) => return None,
        };
        Some(format!(
            "{} {} {}",
            self.timestamp.as_deref().unwrap_or("-"),
            self.severity.as_deref().unwrap_or("DEFAULT"),
            message.trim_end()
        ))
    }
}

pub struct CloudFunctionsProvider {
    client: Client,
    config: FunctionProviderConfig,
    access_token: Option<String>,
    blob_store: Arc<dyn BlobStore>,
    artifacts: ArtifactBuilder,
    backoff: BackoffPolicy,
    /// Replaces `https://{location}-{project}.{domain}` (emulators, tests)
    invocation_base: Option<String>,
}

impl CloudFunctionsProvider {
    /// Build the provider once at process start.
    ///
    /// Resolves credentials and the HTTP client; the returned service is meant
    /// to be shared behind an `Arc<dyn FunctionProvider>`.
    pub fn init(
        config: &FunctionProviderConfig,
        polling: &PollingConfig,
        blob_store: Arc<dyn BlobStore>,
    ) -> Result<Self, FunctionError> {
        if config.project_id.is_empty() {
            return Err(FunctionError::Configuration("project_id is required".to_string()));
        }
        if config.location.is_empty() {
            return Err(FunctionError::Configuration("location is required".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;

        info!(
            project = %config.project_id,
            location = %config.location,
            bucket = %config.bucket,
            "initialized Cloud Functions provider"
        );

        Ok(Self {
            client,
            access_token: config.resolved_access_token(),
            config: config.clone(),
            blob_store,
            artifacts: ArtifactBuilder::new(),
            backoff: polling.backoff_policy(),
            invocation_base: None,
        })
    }

    pub fn with_artifact_builder(mut self, artifacts: ArtifactBuilder) -> Self {
        self.artifacts = artifacts;
        self
    }

    pub fn with_invocation_base(mut self, base: impl Into<String>) -> Self {
        self.invocation_base = Some(base.into().trim_end_matches('/').to_string());
        self
    }

    fn parent(&self) -> String {
        format!(
            "projects/{}/locations/{}",
            self.config.project_id, self.config.location
        )
    }

    fn qualified_name(&self, id: &FunctionId) -> String {
        format!("{}/functions/{}", self.parent(), self.function_name(id))
    }

    fn functions_url(&self) -> String {
        format!(
            "{}/v2/{}/functions",
            self.config.functions_endpoint.trim_end_matches('/'),
            self.parent()
        )
    }

    fn function_url(&self, id: &FunctionId) -> String {
        format!(
            "{}/v2/{}",
            self.config.functions_endpoint.trim_end_matches('/'),
            self.qualified_name(id)
        )
    }

    fn invocation_url(&self, name: &str) -> String {
        match &self.invocation_base {
            Some(base) => format!("{}/{}", base, name),
            None => format!(
                "https://{}-{}.{}/{}",
                self.config.location, self.config.project_id, self.config.invocation_domain, name
            ),
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Resource body for create and update; limits are uniform for every tool
    fn function_body(&self, request: &DeploymentRequest, object: &str) -> serde_json::Value {
        let mut service_config = json!({
            "availableMemory": format!("{}M", self.config.memory_mb),
            "timeoutSeconds": self.config.timeout_seconds,
        });
        if !request.environment_variables.is_empty() {
            service_config["environmentVariables"] = json!(request.environment_variables);
        }

        json!({
            "name": self.qualified_name(&request.id),
            "buildConfig": {
                "runtime": request.runtime.as_str(),
                "entryPoint": self.config.entry_point,
                "source": {
                    "storageSource": {
                        "bucket": self.config.bucket,
                        "object": object,
                    }
                }
            },
            "serviceConfig": service_config,
        })
    }

    async fn backend_error(response: reqwest::Response) -> FunctionError {
        let status = response.status().as_u16();
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| format!("HTTP {}", status));
        FunctionError::Backend { status, message }
    }

    /// Accept a create/update response, rejecting operations that already failed
    async fn accept_operation(response: reqwest::Response) -> Result<Operation, FunctionError> {
        if !response.status().is_success() {
            return Err(Self::backend_error(response).await);
        }
        let operation: Operation = response
            .json()
            .await
            .map_err(|e| FunctionError::Serialization(e.to_string()))?;
        if let Some(status) = &operation.error {
            return Err(FunctionError::Backend {
                status: 500,
                message: format!("operation {} failed ({}): {}", operation.name, status.code, status.message),
            });
        }
        Ok(operation)
    }

    /// Whether the function exists. Only a 404 counts as absent; any other
    /// failure is fatal.
    async fn function_exists(&self, id: &FunctionId) -> Result<bool, FunctionError> {
        let response = self
            .authorize(self.client.get(self.function_url(id)))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(Self::backend_error(response).await),
        }
    }
}

#[async_trait]
impl FunctionProvider for CloudFunctionsProvider {
    async fn deploy_function(&self, request: &DeploymentRequest) -> Result<String, FunctionError> {
        let id = &request.id;
        let name = self.function_name(id);

        let archive = self
            .artifacts
            .build(&request.code, &request.requirements)
            .map_err(|e| FunctionError::Artifact(e.to_string()))?;

        let key = artifact_key(id);
        let size = archive.len();
        self.blob_store
            .upload_buffer(&key, archive, ARTIFACT_CONTENT_TYPE)
            .await
            .map_err(|e| {
                error!(function_id = %id, key = %key, "failed to upload artifact: {}", e);
                FunctionError::from(e)
            })?;
        debug!(function_id = %id, uri = %self.blob_store.object_uri(&key), size, "artifact staged");

        let body = self.function_body(request, &key);
        let exists = self.function_exists(id).await.map_err(|e| {
            error!(function_id = %id, function = %name, "failed to look up function: {}", e);
            e
        })?;

        let response = if exists {
            info!(function_id = %id, function = %name, "updating function");
            self.authorize(self.client.patch(self.function_url(id)))
                .query(&[("updateMask", "buildConfig,serviceConfig")])
                .json(&body)
                .send()
                .await?
        } else {
            info!(function_id = %id, function = %name, "creating function");
            self.authorize(self.client.post(self.functions_url()))
                .query(&[("functionId", name.as_str())])
                .json(&body)
                .send()
                .await?
        };

        let operation = Self::accept_operation(response).await.map_err(|e| {
            error!(function_id = %id, function = %name, "deployment rejected: {}", e);
            e
        })?;
        debug!(function_id = %id, operation = %operation.name, done = operation.done, "deployment accepted");

        Ok(self.qualified_name(id))
    }

    async fn delete_function(&self, id: &FunctionId) -> Result<(), FunctionError> {
        let response = match self
            .authorize(self.client.delete(self.function_url(id)))
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                error!(function_id = %id, "failed to delete function: {}", e);
                return Err(e.into());
            }
        };

        match response.status() {
            status if status.is_success() => {
                info!(function_id = %id, "function deletion accepted");
                Ok(())
            }
            StatusCode::NOT_FOUND => {
                debug!(function_id = %id, "function already absent");
                Ok(())
            }
            _ => {
                let err = Self::backend_error(response).await;
                error!(function_id = %id, "failed to delete function: {}", err);
                Err(err)
            }
        }
    }

    async fn get_function_state(&self, id: &FunctionId) -> FunctionState {
        let response = match self
            .authorize(self.client.get(self.function_url(id)))
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(function_id = %id, "status check failed: {}", e);
                return FunctionState::Error;
            }
        };

        if !response.status().is_success() {
            warn!(function_id = %id, status = response.status().as_u16(), "status check failed");
            return FunctionState::Error;
        }

        match response.json::<FunctionResource>().await {
            Ok(FunctionResource { state: Some(state) }) => FunctionState::from_backend(&state),
            Ok(FunctionResource { state: None }) => FunctionState::Unknown(String::new()),
            Err(e) => {
                warn!(function_id = %id, "unreadable function resource: {}", e);
                FunctionState::Error
            }
        }
    }

    async fn call_function(
        &self,
        name: &str,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, FunctionError> {
        let url = self.invocation_url(name);
        debug!(function = %name, url = %url, "invoking function");

        let response = self
            .authorize(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| FunctionError::Invocation {
                name: name.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| format!("HTTP {}", status));
            return Err(FunctionError::Invocation {
                name: name.to_string(),
                message: format!("HTTP {}: {}", status.as_u16(), message),
            });
        }

        response.json().await.map_err(|e| FunctionError::Invocation {
            name: name.to_string(),
            message: format!("invalid JSON response: {}", e),
        })
    }

    async fn get_function_logs(&self, id: &FunctionId) -> Result<String, FunctionError> {
        let url = format!(
            "{}/v2/entries:list",
            self.config.logging_endpoint.trim_end_matches('/')
        );
        let filter = format!(
            "resource.type=\"cloud_run_revision\" AND resource.labels.service_name=\"{}\"",
            self.function_name(id)
        );
        let body = json!({
            "resourceNames": [format!("projects/{}", self.config.project_id)],
            "filter": filter,
            "orderBy": "timestamp desc",
            "pageSize": LOG_PAGE_SIZE,
        });

        let response = self
            .authorize(self.client.post(url))
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::backend_error(response).await);
        }

        let entries: LogEntries = response
            .json()
            .await
            .map_err(|e| FunctionError::Serialization(e.to_string()))?;

        // Newest first on the wire; oldest first in the result
        let lines: Vec<String> = entries
            .entries
            .iter()
            .rev()
            .filter_map(LogEntry::render)
            .collect();
        Ok(lines.join("\n"))
    }

    fn backoff_policy(&self) -> BackoffPolicy {
        self.backoff
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::tool::FunctionRuntime;
    use crate::infrastructure::storage::InMemoryBlobStore;
    use mockito::Matcher;
    use std::collections::BTreeMap;

    const FUNCTION_PATH: &str = "/v2/projects/acme/locations/us-central1/functions/tool-abc";
    const FUNCTIONS_PATH: &str = "/v2/projects/acme/locations/us-central1/functions";

    fn provider(server: &mockito::ServerGuard, store: InMemoryBlobStore) -> CloudFunctionsProvider {
        let config = FunctionProviderConfig {
            project_id: "acme".to_string(),
            bucket: "acme-functions".to_string(),
            access_token: Some("secret".to_string()),
            functions_endpoint: server.url(),
            logging_endpoint: server.url(),
            ..Default::default()
        };
        CloudFunctionsProvider::init(&config, &PollingConfig::default(), Arc::new(store))
            .unwrap()
            .with_invocation_base(format!("{}/invoke", server.url()))
    }

    fn request(environment_variables: BTreeMap<String, String>) -> DeploymentRequest {
        DeploymentRequest {
            id: FunctionId::new("ABC"),
            code: "def handler(): return 1".to_string(),
            requirements: String::new(),
            environment_variables,
            runtime: FunctionRuntime::Python311,
        }
    }

    #[tokio::test]
    async fn test_deploy_creates_missing_function() {
        let mut server = mockito::Server::new_async().await;
        let lookup = server
            .mock("GET", FUNCTION_PATH)
            .match_header("authorization", "Bearer secret")
            .with_status(404)
            .create_async()
            .await;
        let create = server
            .mock("POST", FUNCTIONS_PATH)
            .match_query(Matcher::UrlEncoded("functionId".into(), "tool-abc".into()))
            .match_body(Matcher::PartialJson(json!({
                "name": "projects/acme/locations/us-central1/functions/tool-abc",
                "buildConfig": {
                    "runtime": "python311",
                    "entryPoint": "toolsmith_entrypoint",
                    "source": {"storageSource": {
                        "bucket": "acme-functions",
                        "object": "functions/ABC/function.zip"
                    }}
                },
                "serviceConfig": {"availableMemory": "256M", "timeoutSeconds": 60}
            })))
            .with_status(200)
            .with_body(r#"{"name":"operations/op-1","done":false}"#)
            .create_async()
            .await;

        let store = InMemoryBlobStore::new();
        let provider = provider(&server, store.clone());
        let name = provider.deploy_function(&request(BTreeMap::new())).await.unwrap();

        assert_eq!(name, "projects/acme/locations/us-central1/functions/tool-abc");
        assert_eq!(store.keys(), vec!["functions/ABC/function.zip".to_string()]);
        assert_eq!(
            store.content_type("functions/ABC/function.zip").as_deref(),
            Some(ARTIFACT_CONTENT_TYPE)
        );
        lookup.assert_async().await;
        create.assert_async().await;
    }

    #[tokio::test]
    async fn test_deploy_updates_existing_function_with_env() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", FUNCTION_PATH)
            .with_status(200)
            .with_body(r#"{"state":"ACTIVE"}"#)
            .create_async()
            .await;
        let update = server
            .mock("PATCH", FUNCTION_PATH)
            .match_query(Matcher::Any)
            .match_body(Matcher::PartialJson(json!({
                "serviceConfig": {"environmentVariables": {"API_KEY": "k"}}
            })))
            .with_status(200)
            .with_body(r#"{"name":"operations/op-2"}"#)
            .create_async()
            .await;

        let provider = provider(&server, InMemoryBlobStore::new());
        let env = BTreeMap::from([("API_KEY".to_string(), "k".to_string())]);
        provider.deploy_function(&request(env)).await.unwrap();

        update.assert_async().await;
    }

    #[tokio::test]
    async fn test_deploy_lookup_failure_is_fatal() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", FUNCTION_PATH)
            .with_status(403)
            .with_body("permission denied")
            .create_async()
            .await;
        let create = server
            .mock("POST", FUNCTIONS_PATH)
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let provider = provider(&server, InMemoryBlobStore::new());
        let err = provider.deploy_function(&request(BTreeMap::new())).await.unwrap_err();

        assert!(matches!(err, FunctionError::Backend { status: 403, .. }));
        create.assert_async().await;
    }

    #[tokio::test]
    async fn test_deploy_rejects_failed_operation() {
        let mut server = mockito::Server::new_async().await;
        server.mock("GET", FUNCTION_PATH).with_status(404).create_async().await;
        server
            .mock("POST", FUNCTIONS_PATH)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"name":"operations/op-3","done":true,"error":{"code":3,"message":"bad runtime"}}"#)
            .create_async()
            .await;

        let provider = provider(&server, InMemoryBlobStore::new());
        let err = provider.deploy_function(&request(BTreeMap::new())).await.unwrap_err();
        assert!(err.to_string().contains("bad runtime"));
    }

    #[tokio::test]
    async fn test_function_state_mapping() {
        let mut server = mockito::Server::new_async().await;
        let provider = provider(&server, InMemoryBlobStore::new());
        let id = FunctionId::new("abc");

        let deploying = server
            .mock("GET", FUNCTION_PATH)
            .with_status(200)
            .with_body(r#"{"state":"DEPLOYING"}"#)
            .create_async()
            .await;
        assert_eq!(provider.get_function_state(&id).await, FunctionState::Deploying);
        deploying.remove_async().await;

        let failing = server
            .mock("GET", FUNCTION_PATH)
            .with_status(500)
            .create_async()
            .await;
        assert_eq!(provider.get_function_state(&id).await, FunctionState::Error);
        failing.remove_async().await;
    }

    #[tokio::test]
    async fn test_delete_treats_missing_as_deleted() {
        let mut server = mockito::Server::new_async().await;
        server.mock("DELETE", FUNCTION_PATH).with_status(404).create_async().await;

        let provider = provider(&server, InMemoryBlobStore::new());
        provider.delete_function(&FunctionId::new("abc")).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_failure_is_returned() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("DELETE", FUNCTION_PATH)
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let provider = provider(&server, InMemoryBlobStore::new());
        let err = provider.delete_function(&FunctionId::new("abc")).await.unwrap_err();
        assert!(matches!(err, FunctionError::Backend { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_call_function_posts_json() {
        let mut server = mockito::Server::new_async().await;
        let invoke = server
            .mock("POST", "/invoke/tool-abc")
            .match_body(Matcher::Json(json!({"x": 2})))
            .with_status(200)
            .with_body(r#"{"result":4}"#)
            .create_async()
            .await;

        let provider = provider(&server, InMemoryBlobStore::new());
        let result = provider.call_function("tool-abc", json!({"x": 2})).await.unwrap();

        assert_eq!(result, json!({"result": 4}));
        invoke.assert_async().await;
    }

    #[tokio::test]
    async fn test_call_function_error_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/invoke/tool-abc")
            .with_status(500)
            .with_body(r#"{"error":"division by zero"}"#)
            .create_async()
            .await;

        let provider = provider(&server, InMemoryBlobStore::new());
        let err = provider.call_function("tool-abc", json!({})).await.unwrap_err();
        assert!(matches!(err, FunctionError::Invocation { .. }));
        assert!(err.to_string().contains("division by zero"));
    }

    #[tokio::test]
    async fn test_logs_are_returned_oldest_first() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v2/entries:list")
            .match_body(Matcher::PartialJson(json!({"resourceNames": ["projects/acme"]})))
            .with_status(200)
            .with_body(
                r#"{"entries":[
                    {"timestamp":"t2","severity":"ERROR","textPayload":"ImportError: numpy"},
                    {"timestamp":"t1","jsonPayload":{"message":"build started"}}
                ]}"#,
            )
            .create_async()
            .await;

        let provider = provider(&server, InMemoryBlobStore::new());
        let logs = provider.get_function_logs(&FunctionId::new("abc")).await.unwrap();
        assert_eq!(logs, "t1 DEFAULT build started\nt2 ERROR ImportError: numpy");
    }

    #[test]
    fn test_invocation_url_from_config() {
        let config = FunctionProviderConfig {
            project_id: "acme".to_string(),
            location: "europe-west1".to_string(),
            ..Default::default()
        };
        let provider = CloudFunctionsProvider::init(
            &config,
            &PollingConfig::default(),
            Arc::new(InMemoryBlobStore::new()),
        )
        .unwrap();
        assert_eq!(
            provider.invocation_url("tool-1"),
            "https://europe-west1-acme.cloudfunctions.net/tool-1"
        );
    }

    #[test]
    fn test_init_requires_project() {
        let result = CloudFunctionsProvider::init(
            &FunctionProviderConfig::default(),
            &PollingConfig::default(),
            Arc::new(InMemoryBlobStore::new()),
        );
        assert!(matches!(result, Err(FunctionError::Configuration(_))));
    }
}
