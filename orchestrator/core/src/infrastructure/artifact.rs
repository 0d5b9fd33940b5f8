// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Function Artifact Builder
//!
//! Packages a function tool's source into the archive the serverless backend
//! builds from. The archive holds exactly two entries:
//!
//! - `main.py`: the user's code followed by a fixed entrypoint adapter, so
//!   every deployed function exposes the same HTTP signature
//! - `requirements.txt`: the user's requirements plus the baseline packages
//!   the adapter needs
//!
//! Output is a zip archive, deflated at level 9. Every entry carries the same
//! fixed timestamp and permissions, so identical inputs give identical bytes.

use std::io::{Cursor, Write};
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

pub const SOURCE_FILE: &str = "main.py";
pub const REQUIREMENTS_FILE: &str = "requirements.txt";

/// Name of the HTTP function the adapter exports
pub const ENTRYPOINT_FUNCTION: &str = "toolsmith_entrypoint";

/// Packages the adapter itself imports
pub const BASELINE_REQUIREMENTS: &[&str] = &["functions-framework==3.*", "flask>=2.2"];

/// Turns raw user code into the source file that gets deployed
pub type EntrypointWrapper = fn(&str) -> String;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Failed to write archive entry {path}: {message}")]
    Entry { path: String, message: String },

    #[error("Failed to finish archive: {0}")]
    Finish(String),
}

#[derive(Debug, Clone, Copy)]
pub struct ArtifactBuilder {
    wrapper: EntrypointWrapper,
}

impl Default for ArtifactBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ArtifactBuilder {
    pub fn new() -> Self {
        Self {
            wrapper: python_entrypoint,
        }
    }

    pub fn with_wrapper(wrapper: EntrypointWrapper) -> Self {
        Self { wrapper }
    }

    /// Build the deployable archive for `code` and `requirements`.
    pub fn build(&self, code: &str, requirements: &str) -> Result<Vec<u8>, ArtifactError> {
        let source = (self.wrapper)(code);
        let manifest = combine_requirements(requirements);

        let mut archive = ZipWriter::new(Cursor::new(Vec::new()));
        append_entry(&mut archive, SOURCE_FILE, source.as_bytes())?;
        append_entry(&mut archive, REQUIREMENTS_FILE, manifest.as_bytes())?;

        let cursor = archive
            .finish()
            .map_err(|e| ArtifactError::Finish(e.to_string()))?;
        Ok(cursor.into_inner())
    }
}

fn entry_options() -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(9))
        .last_modified_time(DateTime::default())
        .unix_permissions(0o644)
}

fn append_entry<W: Write + std::io::Seek>(
    archive: &mut ZipWriter<W>,
    path: &str,
    data: &[u8],
) -> Result<(), ArtifactError> {
    let entry_error = |message: String| ArtifactError::Entry {
        path: path.to_string(),
        message,
    };
    archive
        .start_file(path, entry_options())
        .map_err(|e| entry_error(e.to_string()))?;
    archive.write_all(data).map_err(|e| entry_error(e.to_string()))
}

/// User requirements first, then every baseline package the user did not pin.
pub fn combine_requirements(user: &str) -> String {
    let user_lines: Vec<&str> = user
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    let declared: Vec<String> = user_lines
        .iter()
        .filter(|line| !line.starts_with('#'))
        .map(|line| package_name(line))
        .collect();

    let mut lines: Vec<&str> = user_lines;
    for baseline in BASELINE_REQUIREMENTS {
        if !declared.contains(&package_name(baseline)) {
            lines.push(baseline);
        }
    }

    let mut manifest = lines.join("\n");
    manifest.push('\n');
    manifest
}

fn package_name(requirement: &str) -> String {
    requirement
        .split(|c: char| matches!(c, '=' | '<' | '>' | '!' | '~' | '[' | ';' | ' ' | '@'))
        .next()
        .unwrap_or("")
        .trim()
        .to_lowercase()
        .replace('_', "-")
}

/// Default adapter: calls the user's `handler(**body)` and returns JSON.
pub fn python_entrypoint(code: &str) -> String {
    format!(
        r#"{code}

# ---- toolsmith entrypoint ----
import json as _toolsmith_json
import functions_framework as _toolsmith_ff


@_toolsmith_ff.http
def {entry}(request):
    body = request.get_json(silent=True) or {{}}
    headers = {{"Content-Type": "application/json"}}
    try:
        result = handler(**body)
    except Exception as exc:
        return (_toolsmith_json.dumps({{"error": str(exc)}}), 500, headers)
    return (_toolsmith_json.dumps({{"result": result}}, default=str), 200, headers)
"#,
        code = code.trim_end(),
        entry = ENTRYPOINT_FUNCTION,
    )
}
