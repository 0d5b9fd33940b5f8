// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Service Configuration Types
//
// Defines the configuration schema for a Toolsmith deployment node:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Serverless backend coordinates (project, region, artifact bucket)
// - Uniform function resource limits
// - Readiness polling (backoff) settings
// - Artifact storage and tool record persistence backends

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::function::BackoffPolicy;

pub const API_VERSION: &str = "toolsmith.dev/v1";
pub const KIND: &str = "ToolsmithConfig";

/// Top-level Kubernetes-style configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsmithConfig {
    /// API version (must be "toolsmith.dev/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "ToolsmithConfig")
    pub kind: String,

    pub metadata: ConfigMetadata,

    pub spec: ToolsmithSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsmithSpec {
    #[serde(default)]
    pub provider: FunctionProviderConfig,

    #[serde(default)]
    pub polling: PollingConfig,

    #[serde(default)]
    pub storage: ArtifactStorageConfig,

    /// PostgreSQL connection string; in-memory tool records when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
}

/// Serverless backend coordinates and uniform limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionProviderConfig {
    #[serde(default)]
    pub project_id: String,

    #[serde(default = "default_location")]
    pub location: String,

    /// Bucket artifacts are staged in
    #[serde(default)]
    pub bucket: String,

    /// OAuth bearer token (supports "env:VAR_NAME")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    #[serde(default = "default_functions_endpoint")]
    pub functions_endpoint: String,

    #[serde(default = "default_logging_endpoint")]
    pub logging_endpoint: String,

    /// Domain of the HTTP invocation endpoint: `https://{location}-{project}.{domain}/{name}`
    #[serde(default = "default_invocation_domain")]
    pub invocation_domain: String,

    #[serde(default = "default_memory_mb")]
    pub memory_mb: u32,

    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u32,

    #[serde(default = "default_entry_point")]
    pub entry_point: String,
}

impl Default for FunctionProviderConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            location: default_location(),
            bucket: String::new(),
            access_token: None,
            functions_endpoint: default_functions_endpoint(),
            logging_endpoint: default_logging_endpoint(),
            invocation_domain: default_invocation_domain(),
            memory_mb: default_memory_mb(),
            timeout_seconds: default_timeout_seconds(),
            entry_point: default_entry_point(),
        }
    }
}

impl FunctionProviderConfig {
    /// Resolve `env:VAR_NAME` indirection in the access token
    pub fn resolved_access_token(&self) -> Option<String> {
        let token = self.access_token.as_ref()?;
        match token.strip_prefix("env:") {
            Some(var) => std::env::var(var).ok(),
            None => Some(token.clone()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_wait_ms: default_max_wait_ms(),
        }
    }
}

impl PollingConfig {
    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            multiplier: 2,
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactStorageBackend {
    /// Google Cloud Storage JSON API
    Gcs,
    /// Local filesystem (development)
    Local,
    /// Process memory (tests)
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactStorageConfig {
    #[serde(default = "default_storage_backend")]
    pub backend: ArtifactStorageBackend,

    #[serde(default = "default_storage_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_local_path")]
    pub local_path: PathBuf,
}

impl Default for ArtifactStorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            endpoint: default_storage_endpoint(),
            local_path: default_local_path(),
        }
    }
}

impl Default for ToolsmithConfig {
    fn default() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "toolsmith-node".to_string());

        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ConfigMetadata {
                name: hostname,
                version: Some("1.0.0".to_string()),
            },
            spec: ToolsmithSpec::default(),
        }
    }
}

impl ToolsmithConfig {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. TOOLSMITH_CONFIG_PATH environment variable
    /// 2. ./toolsmith-config.yaml (working directory)
    /// 3. ~/.toolsmith/config.yaml (user home)
    /// 4. /etc/toolsmith/config.yaml (system, Unix)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("TOOLSMITH_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./toolsmith-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".toolsmith").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        {
            let system_config = PathBuf::from("/etc/toolsmith/config.yaml");
            if system_config.exists() {
                return Some(system_config);
            }
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path fails hard if missing or invalid
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply process environment overrides (container deployments)
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let provider = &mut self.spec.provider;
        if let Some(val) = lookup("FUNCTIONS_PROJECT_ID") {
            tracing::info!("Environment override: FUNCTIONS_PROJECT_ID={}", val);
            provider.project_id = val;
        }
        if let Some(val) = lookup("FUNCTIONS_LOCATION") {
            tracing::info!("Environment override: FUNCTIONS_LOCATION={}", val);
            provider.location = val;
        }
        if let Some(val) = lookup("FUNCTIONS_BUCKET") {
            tracing::info!("Environment override: FUNCTIONS_BUCKET={}", val);
            provider.bucket = val;
        }
        if let Some(val) = lookup("FUNCTIONS_ACCESS_TOKEN") {
            tracing::info!("Environment override: FUNCTIONS_ACCESS_TOKEN=<redacted>");
            provider.access_token = Some(val);
        }
        if let Some(val) = lookup("TOOLSMITH_DATABASE_URL") {
            tracing::info!("Environment override: TOOLSMITH_DATABASE_URL=<redacted>");
            self.spec.database_url = Some(val);
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!("Invalid apiVersion: '{}'. Must be '{}'", self.api_version, API_VERSION);
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        let provider = &self.spec.provider;
        if provider.project_id.is_empty() {
            anyhow::bail!("spec.provider.project_id is required (or set FUNCTIONS_PROJECT_ID)");
        }
        if provider.location.is_empty() {
            anyhow::bail!("spec.provider.location is required (or set FUNCTIONS_LOCATION)");
        }
        if provider.bucket.is_empty() && self.spec.storage.backend == ArtifactStorageBackend::Gcs {
            anyhow::bail!("spec.provider.bucket is required (or set FUNCTIONS_BUCKET)");
        }
        if provider.memory_mb == 0 || provider.timeout_seconds == 0 {
            anyhow::bail!("function memory and timeout limits must be positive");
        }

        let polling = &self.spec.polling;
        if polling.initial_delay_ms == 0 {
            anyhow::bail!("spec.polling.initial_delay_ms must be positive");
        }
        if polling.max_delay_ms < polling.initial_delay_ms {
            anyhow::bail!("spec.polling.max_delay_ms must be >= initial_delay_ms");
        }
        if polling.max_wait_ms == 0 {
            anyhow::bail!("spec.polling.max_wait_ms must be positive");
        }

        Ok(())
    }
}

fn default_location() -> String {
    "us-central1".to_string()
}

fn default_functions_endpoint() -> String {
    "https://cloudfunctions.googleapis.com".to_string()
}

fn default_logging_endpoint() -> String {
    "https://logging.googleapis.com".to_string()
}

fn default_invocation_domain() -> String {
    "cloudfunctions.net".to_string()
}

fn default_memory_mb() -> u32 {
    256
}

fn default_timeout_seconds() -> u32 {
    60
}

fn default_entry_point() -> String {
    "toolsmith_entrypoint".to_string()
}

fn default_initial_delay_ms() -> u64 {
    5_000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_max_wait_ms() -> u64 {
    180_000
}

fn default_storage_backend() -> ArtifactStorageBackend {
    ArtifactStorageBackend::Gcs
}

fn default_storage_endpoint() -> String {
    "https://storage.googleapis.com".to_string()
}

fn default_local_path() -> PathBuf {
    PathBuf::from("./.toolsmith/artifacts")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn configured() -> ToolsmithConfig {
        let mut config = ToolsmithConfig::default();
        config.spec.provider.project_id = "acme-prod".to_string();
        config.spec.provider.bucket = "acme-functions".to_string();
        config
    }

    #[test]
    fn test_default_manifest() {
        let config = ToolsmithConfig::default();
        assert_eq!(config.api_version, API_VERSION);
        assert_eq!(config.kind, KIND);
        assert!(!config.metadata.name.is_empty());
        assert_eq!(config.spec.provider.location, "us-central1");
        assert_eq!(config.spec.polling.max_wait_ms, 180_000);
    }

    #[test]
    fn test_yaml_defaults_fill_missing_fields() {
        let yaml = r#"
apiVersion: toolsmith.dev/v1
kind: ToolsmithConfig
metadata:
  name: edge-1
spec:
  provider:
    project_id: acme
    bucket: acme-fns
  polling:
    max_wait_ms: 60000
"#;
        let config = ToolsmithConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.spec.provider.project_id, "acme");
        assert_eq!(config.spec.provider.memory_mb, 256);
        assert_eq!(config.spec.polling.initial_delay_ms, 5_000);
        assert_eq!(config.spec.polling.max_wait(), Duration::from_secs(60));
        assert_eq!(config.spec.storage.backend, ArtifactStorageBackend::Gcs);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let vars = HashMap::from([
            ("FUNCTIONS_PROJECT_ID", "from-env"),
            ("FUNCTIONS_LOCATION", "europe-west1"),
            ("FUNCTIONS_BUCKET", "env-bucket"),
        ]);
        let mut config = ToolsmithConfig::default();
        config.apply_overrides_from(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.spec.provider.project_id, "from-env");
        assert_eq!(config.spec.provider.location, "europe-west1");
        assert_eq!(config.spec.provider.bucket, "env-bucket");
        assert_eq!(config.spec.database_url, None);
    }

    #[test]
    fn test_validation() {
        let mut config = configured();
        assert!(config.validate().is_ok());

        config.api_version = "wrong/v1".to_string();
        assert!(config.validate().is_err());
        config.api_version = API_VERSION.to_string();

        config.spec.provider.project_id.clear();
        assert!(config.validate().is_err());
        config.spec.provider.project_id = "acme".to_string();

        config.spec.provider.bucket.clear();
        assert!(config.validate().is_err());
        config.spec.storage.backend = ArtifactStorageBackend::Memory;
        assert!(config.validate().is_ok());

        config.spec.polling.max_delay_ms = 1_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backoff_policy_from_polling() {
        let policy = PollingConfig::default().backoff_policy();
        assert_eq!(policy, BackoffPolicy::default());
    }
}
