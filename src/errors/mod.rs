// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 devloop contributors

//! Error types
//!
//! Errors carry `miette` diagnostics so the CLI can print codes and help
//! text next to the failure.

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for devloop operations
pub type DevloopResult<T> = Result<T, DevloopError>;

/// Main error type for devloop
#[derive(Error, Debug, Diagnostic)]
pub enum DevloopError {
    // ─────────────────────────────────────────────────────────────────────────
    // Tool Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Tool '{tool}' not found")]
    #[diagnostic(code(devloop::tool_not_found), help("{suggestion}"))]
    ToolNotFound { tool: String, suggestion: String },

    #[error("Tool '{tool}' execution failed: {error}")]
    #[diagnostic(code(devloop::tool_execution_failed))]
    ToolExecutionFailed {
        tool: String,
        error: String,
        #[help]
        help: Option<String>,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Project Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Project file not found: {path}")]
    #[diagnostic(
        code(devloop::project_not_found),
        help("Create a .devloop.yaml describing the artifacts to build")
    )]
    ProjectNotFound { path: PathBuf },

    #[error("Invalid project configuration: {reason}")]
    #[diagnostic(code(devloop::invalid_project))]
    InvalidProject {
        reason: String,
        #[help]
        help: Option<String>,
    },

    #[error("Artifact '{artifact}' not found in project")]
    #[diagnostic(code(devloop::artifact_not_found))]
    ArtifactNotFound { artifact: String },

    #[error("Circular artifact requirement detected")]
    #[diagnostic(
        code(devloop::circular_requirement),
        help("Review the 'requires' lists of your artifacts to remove the cycle")
    )]
    CircularRequirement { artifacts: Vec<String> },

    #[error("Artifact '{artifact}' requires unknown artifact '{required}'")]
    #[diagnostic(
        code(devloop::unknown_requirement),
        help("Check that '{required}' is defined in your project")
    )]
    UnknownRequirement { artifact: String, required: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Hashing Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Could not list dependencies of '{artifact}': {reason}")]
    #[diagnostic(code(devloop::dependency_resolution))]
    DependencyResolution { artifact: String, reason: String },

    #[error("Failed to read file '{path}': {error}")]
    #[diagnostic(code(devloop::file_read_error))]
    FileReadError { path: PathBuf, error: String },

    #[error("Failed to hash '{artifact}': {reason}")]
    #[diagnostic(code(devloop::hash_failed))]
    HashFailed { artifact: String, reason: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Build Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Build of '{artifact}' failed: {message}")]
    #[diagnostic(code(devloop::build_failed))]
    BuildFailed {
        artifact: String,
        message: String,
        #[help]
        help: Option<String>,
    },

    #[error("Builder returned no output for '{artifact}'")]
    #[diagnostic(code(devloop::missing_build_output))]
    MissingBuildOutput { artifact: String },

    #[error("Prune failed: {message}")]
    #[diagnostic(code(devloop::prune_failed))]
    PruneFailed { message: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Cache Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Cache error: {message}")]
    #[diagnostic(code(devloop::cache_error))]
    CacheError { message: String },

    // ─────────────────────────────────────────────────────────────────────────
    // IO/System Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("IO error: {message}")]
    #[diagnostic(code(devloop::io_error))]
    Io { message: String },

    #[error("YAML parsing error: {message}")]
    #[diagnostic(code(devloop::yaml_error))]
    Yaml { message: String },

    #[error("JSON parsing error: {message}")]
    #[diagnostic(code(devloop::json_error))]
    Json { message: String },
}

impl From<std::io::Error> for DevloopError {
    fn from(e: std::io::Error) -> Self {
        Self::Io { message: e.to_string() }
    }
}

impl From<serde_yaml::Error> for DevloopError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Yaml { message: e.to_string() }
    }
}

impl From<serde_json::Error> for DevloopError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json { message: e.to_string() }
    }
}

impl DevloopError {
    /// Create a tool not found error with installation suggestion
    pub fn tool_not_found(tool: &str) -> Self {
        let suggestion = match tool {
            "docker" => "Install Docker: https://docs.docker.com/get-docker/".to_string(),
            _ => format!("Install {} and ensure it's in your PATH", tool),
        };

        Self::ToolNotFound {
            tool: tool.to_string(),
            suggestion,
        }
    }

    /// Create a build failed error with a hint derived from builder output
    pub fn build_failed_with_help(artifact: &str, stderr: &str) -> Self {
        Self::BuildFailed {
            artifact: artifact.to_string(),
            message: last_line(stderr),
            help: Self::parse_build_error(stderr),
        }
    }

    fn parse_build_error(stderr: &str) -> Option<String> {
        if stderr.contains("Cannot connect to the Docker daemon") {
            Some("The Docker daemon is not running. Start it and retry.".into())
        } else if stderr.contains("failed to read dockerfile") || stderr.contains("no such file") {
            Some("Check the artifact's 'context' and 'dockerfile' settings.".into())
        } else if stderr.contains("pull access denied") || stderr.contains("unauthorized") {
            Some("A base image could not be pulled. Check registry credentials.".into())
        } else {
            None
        }
    }
}

fn last_line(stderr: &str) -> String {
    stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("builder exited with an error")
        .to_string()
}
