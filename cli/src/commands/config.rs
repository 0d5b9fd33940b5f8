// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use toolsmith_core::domain::config::ToolsmithConfig;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./toolsmith-config.yaml)
        #[arg(short, long, default_value = "./toolsmith-config.yaml")]
        output: PathBuf,

        /// Include examples and comments
        #[arg(long)]
        examples: bool,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate {
            output,
            examples,
            force,
        } => generate(output, examples, force).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = ToolsmithConfig::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. TOOLSMITH_CONFIG_PATH: {}",
            std::env::var("TOOLSMITH_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./toolsmith-config.yaml");
        println!("  4. ~/.toolsmith/config.yaml");
        println!("  5. /etc/toolsmith/config.yaml");
        println!();
    }

    println!("{}", "Current configuration:".bold());
    println!();

    println!("{}", "Node:".bold());
    println!("  Name: {}", config.metadata.name);
    println!();

    let provider = &config.spec.provider;
    println!("{}", "Function Provider:".bold());
    println!("  Project: {}", display_or_unset(&provider.project_id));
    println!("  Location: {}", provider.location);
    println!("  Bucket: {}", display_or_unset(&provider.bucket));
    println!(
        "  Access token: {}",
        if provider.resolved_access_token().is_some() {
            "(set)".to_string()
        } else {
            "(not set)".dimmed().to_string()
        }
    );
    println!("  Limits: {}M memory, {}s timeout", provider.memory_mb, provider.timeout_seconds);
    println!();

    let polling = &config.spec.polling;
    println!("{}", "Readiness Polling:".bold());
    println!(
        "  Delay: {}ms doubling to {}ms",
        polling.initial_delay_ms, polling.max_delay_ms
    );
    println!("  Max wait: {}ms", polling.max_wait_ms);
    println!();

    println!("{}", "Artifact Storage:".bold());
    println!("  Backend: {:?}", config.spec.storage.backend);
    println!(
        "  Tool records: {}",
        if config.spec.database_url.is_some() { "postgres" } else { "in-memory" }
    );
    println!();

    Ok(())
}

fn display_or_unset(value: &str) -> String {
    if value.is_empty() {
        "(not set)".dimmed().to_string()
    } else {
        value.to_string()
    }
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    let source = config_path
        .clone()
        .or_else(ToolsmithConfig::discover_config)
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "built-in defaults".to_string());
    println!("Validating configuration from {}...", source.bold());

    let config = ToolsmithConfig::load_or_default(config_path)
        .context("Failed to load configuration")?;
    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());
    Ok(())
}

async fn generate(output: PathBuf, with_examples: bool, force: bool) -> Result<()> {
    if output.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", output.display());
    }

    let sample = if with_examples {
        include_str!("../../templates/config-with-examples.yaml")
    } else {
        include_str!("../../templates/config-minimal.yaml")
    };

    std::fs::write(&output, sample)
        .with_context(|| format!("Failed to write config to {:?}", output))?;
    println!("{}", format!("✓ Configuration generated: {}", output.display()).green());
    println!("  Fill in spec.provider, then run: toolsmith config validate {}", output.display());

    Ok(())
}
