// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 devloop contributors

//! Validate command - check project configuration

use colored::Colorize;
use miette::Result;
use std::path::PathBuf;

use crate::artifact::{Project, ProjectValidator};
use crate::errors::DevloopError;

/// Run the validate command
pub async fn run(project_path: PathBuf, verbose: bool) -> Result<()> {
    println!("{}", "Validating project...".bold());
    println!();

    if !project_path.exists() {
        return Err(DevloopError::ProjectNotFound { path: project_path }.into());
    }

    let project = match Project::from_file(&project_path) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("  {} Failed to parse project", "✗".red());
            eprintln!();
            return Err(miette::miette!("Parse error: {}", e));
        }
    };

    println!("  {} Project file is valid YAML", "✓".green());

    let validation = ProjectValidator::validate(&project);

    let base = match project_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let missing_contexts = ProjectValidator::validate_contexts(&project, &base);

    if !validation.errors.is_empty() {
        println!();
        println!("{}:", "Errors".red().bold());
        for error in &validation.errors {
            println!("  {} {}", "✗".red(), error);
        }
    }

    let has_warnings = validation.has_warnings() || !missing_contexts.is_empty();
    if has_warnings {
        println!();
        println!("{}:", "Warnings".yellow().bold());
        for warning in validation.warnings.iter().chain(&missing_contexts) {
            println!("  {} {}", "⚠".yellow(), warning);
        }
    }

    if verbose {
        println!();
        println!("{}:", "Project summary".bold());
        println!("  Name: {}", project.name);
        println!("  Artifacts: {}", project.artifacts.len());
        for artifact in &project.artifacts {
            let requires = if artifact.requires.is_empty() {
                String::new()
            } else {
                format!(" [requires: {}]", artifact.requires.join(", "))
            };
            println!("    - {} ({}){}", artifact.name, artifact.image, requires.dimmed());
        }
    }

    println!();

    if !validation.is_valid() {
        return Err(miette::miette!("Project validation failed"));
    }

    if has_warnings {
        println!("{}", "Project is valid but has warnings.".yellow().bold());
    } else {
        println!("{}", "Project is valid!".green().bold());
    }
    Ok(())
}
