// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Serverless function commands
//!
//! Commands: deploy, status, wait, invoke, logs, delete

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use toolsmith_core::domain::config::ToolsmithConfig;
use toolsmith_core::domain::function::{DeploymentRequest, FunctionProvider, FunctionState};
use toolsmith_core::domain::tool::{is_valid_env_key, FunctionId, FunctionRuntime};
use toolsmith_core::infrastructure::storage::create_blob_store;
use toolsmith_core::infrastructure::CloudFunctionsProvider;

#[derive(Subcommand)]
pub enum FunctionCommand {
    /// Package and deploy a function from a source file
    Deploy {
        /// Python source defining `handler`
        #[arg(value_name = "CODE")]
        code: PathBuf,

        /// requirements.txt with extra dependencies
        #[arg(short, long, value_name = "FILE")]
        requirements: Option<PathBuf>,

        /// Environment variable for the function (KEY=VALUE, repeatable)
        #[arg(short, long = "env", value_name = "KEY=VALUE", value_parser = parse_env_var)]
        env: Vec<(String, String)>,

        /// Function runtime
        #[arg(long, default_value = "python312", value_parser = parse_runtime)]
        runtime: FunctionRuntime,

        /// Function id, lowercase letters, digits and '-' (default: generated)
        #[arg(long, value_parser = parse_function_id)]
        id: Option<FunctionId>,

        /// Wait for the function to become active
        #[arg(short, long)]
        wait: bool,
    },

    /// Show the backend state of a function
    Status {
        #[arg(value_name = "FUNCTION_ID")]
        id: String,
    },

    /// Poll until a function is active
    Wait {
        #[arg(value_name = "FUNCTION_ID")]
        id: String,

        /// Override the configured maximum wait
        #[arg(long, value_name = "SECONDS")]
        timeout: Option<u64>,
    },

    /// Invoke a deployed function
    Invoke {
        #[arg(value_name = "FUNCTION_ID")]
        id: String,

        /// Input data (JSON string or @file.json)
        #[arg(short, long, value_name = "INPUT")]
        input: Option<String>,
    },

    /// Print recent backend logs
    Logs {
        #[arg(value_name = "FUNCTION_ID")]
        id: String,
    },

    /// Delete a function
    Delete {
        #[arg(value_name = "FUNCTION_ID")]
        id: String,
    },
}

pub async fn handle_command(command: FunctionCommand, config_path: Option<PathBuf>) -> Result<()> {
    let config = ToolsmithConfig::load_or_default(config_path).context("Failed to load configuration")?;
    let max_wait = config.spec.polling.max_wait();
    let provider = build_provider(&config)?;

    match command {
        FunctionCommand::Deploy {
            code,
            requirements,
            env,
            runtime,
            id,
            wait,
        } => {
            let request = load_request(&code, requirements.as_deref(), env, runtime, id)?;
            deploy(provider.as_ref(), request, wait.then_some(max_wait)).await
        }
        FunctionCommand::Status { id } => status(provider.as_ref(), FunctionId::new(id)).await,
        FunctionCommand::Wait { id, timeout } => {
            let max_wait = timeout.map(Duration::from_secs).unwrap_or(max_wait);
            wait_active(provider.as_ref(), FunctionId::new(id), max_wait).await
        }
        FunctionCommand::Invoke { id, input } => {
            let body = parse_input(input.as_deref())?;
            invoke(provider.as_ref(), FunctionId::new(id), body).await
        }
        FunctionCommand::Logs { id } => logs(provider.as_ref(), FunctionId::new(id)).await,
        FunctionCommand::Delete { id } => delete(provider.as_ref(), FunctionId::new(id)).await,
    }
}

fn build_provider(config: &ToolsmithConfig) -> Result<Arc<dyn FunctionProvider>> {
    let blob_store = create_blob_store(&config.spec.storage, &config.spec.provider)
        .context("Failed to initialize artifact storage")?;
    let provider = CloudFunctionsProvider::init(&config.spec.provider, &config.spec.polling, blob_store)
        .context("Failed to initialize function provider")?;
    Ok(Arc::new(provider))
}

/// Assemble a deployment request from files on disk
pub fn load_request(
    code: &Path,
    requirements: Option<&Path>,
    env: Vec<(String, String)>,
    runtime: FunctionRuntime,
    id: Option<FunctionId>,
) -> Result<DeploymentRequest> {
    let code = std::fs::read_to_string(code)
        .with_context(|| format!("Failed to read code from {:?}", code))?;
    let requirements = match requirements {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read requirements from {:?}", path))?,
        None => String::new(),
    };

    Ok(DeploymentRequest {
        id: id.unwrap_or_else(FunctionId::generate),
        code,
        requirements,
        environment_variables: env.into_iter().collect::<BTreeMap<_, _>>(),
        runtime,
    })
}

async fn deploy(
    provider: &dyn FunctionProvider,
    request: DeploymentRequest,
    wait: Option<Duration>,
) -> Result<()> {
    println!("Deploying function {}...", request.id.as_str().bold());

    let name = provider
        .deploy_function(&request)
        .await
        .context("Deployment was rejected")?;

    println!("{}", format!("✓ Deployment accepted: {}", name).green());

    if let Some(max_wait) = wait {
        wait_active(provider, request.id, max_wait).await?;
    } else {
        println!(
            "  Check progress with: toolsmith function status {}",
            request.id.as_str()
        );
    }

    Ok(())
}

async fn status(provider: &dyn FunctionProvider, id: FunctionId) -> Result<()> {
    let state = provider.get_function_state(&id).await;
    let label = match &state {
        FunctionState::Active => state.to_string().green(),
        FunctionState::Deploying => state.to_string().yellow(),
        _ => state.to_string().red(),
    };
    println!("{}: {}", provider.function_name(&id).bold(), label);
    Ok(())
}

async fn wait_active(provider: &dyn FunctionProvider, id: FunctionId, max_wait: Duration) -> Result<()> {
    info!(function_id = %id, max_wait_ms = max_wait.as_millis() as u64, "waiting for function");
    println!("Waiting for {} to become active...", provider.function_name(&id));

    if provider.wait_for_function_to_be_active(&id, max_wait).await {
        println!("{}", "✓ Function is active".green());
        return Ok(());
    }

    eprintln!("{}", "✗ Function did not become active".red());
    match provider.get_function_logs(&id).await {
        Ok(logs) if !logs.is_empty() => eprintln!("{}", logs.dimmed()),
        Ok(_) => {}
        Err(e) => eprintln!("{}", format!("(logs unavailable: {})", e).dimmed()),
    }
    bail!("Function {} is not active", id)
}

async fn invoke(provider: &dyn FunctionProvider, id: FunctionId, body: serde_json::Value) -> Result<()> {
    let name = provider.function_name(&id);
    let result = provider
        .call_function(&name, body)
        .await
        .with_context(|| format!("Failed to invoke {}", name))?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn logs(provider: &dyn FunctionProvider, id: FunctionId) -> Result<()> {
    let logs = provider
        .get_function_logs(&id)
        .await
        .context("Failed to fetch function logs")?;

    if logs.is_empty() {
        println!("{}", "(no log entries)".dimmed());
    } else {
        println!("{}", logs);
    }
    Ok(())
}

async fn delete(provider: &dyn FunctionProvider, id: FunctionId) -> Result<()> {
    provider
        .delete_function(&id)
        .await
        .with_context(|| format!("Failed to delete function {}", id))?;

    println!("{}", format!("✓ Function deleted: {}", provider.function_name(&id)).green());
    Ok(())
}

/// Parse `KEY=VALUE` into a pair
pub fn parse_env_var(raw: &str) -> Result<(String, String), String> {
    let Some((key, value)) = raw.split_once('=') else {
        return Err(format!("expected KEY=VALUE, got '{}'", raw));
    };
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("expected KEY=VALUE, got '{}'", raw));
    }
    if !is_valid_env_key(key) {
        return Err(format!(
            "invalid environment variable name '{}' (letters, digits and '_', not starting with a digit)",
            key
        ));
    }
    Ok((key.to_string(), value.to_string()))
}

pub fn parse_function_id(raw: &str) -> Result<FunctionId, String> {
    FunctionId::parse(raw).map_err(|e| e.to_string())
}

pub fn parse_runtime(raw: &str) -> Result<FunctionRuntime, String> {
    FunctionRuntime::parse(raw)
        .ok_or_else(|| format!("unsupported runtime '{}' (python310, python311, python312)", raw))
}

/// Input is inline JSON, `@path` to a JSON file, or empty for `{}`
pub fn parse_input(input: Option<&str>) -> Result<serde_json::Value> {
    let Some(raw) = input else {
        return Ok(serde_json::json!({}));
    };

    let text = match raw.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read input file {}", path))?,
        None => raw.to_string(),
    };

    serde_json::from_str(&text).context("Input is not valid JSON")
}
