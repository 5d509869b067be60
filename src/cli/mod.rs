// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 devloop contributors

//! CLI command definitions and handlers
//!
//! Defines the command-line interface for devloop.

pub mod build;
pub mod cache;
pub mod plan;
pub mod validate;

use clap::{ArgAction, Args, Parser, Subcommand};
use colored::Colorize;
use miette::Result;
use std::path::{Path, PathBuf};

use crate::artifact::{Artifact, BuildSettings, Project, ProjectValidator};
use crate::config::{default_cache_file, RunMode, RunOptions};
use crate::errors::DevloopError;

/// Default project file name
pub const PROJECT_FILE: &str = ".devloop.yaml";

/// Incremental container image builds
#[derive(Parser, Debug)]
#[clap(
    name = "devloop",
    version,
    about = "Incremental container image builds with an artifact cache",
    long_about = None,
    after_help = "Examples:\n\
        devloop build                   Build everything that changed\n\
        devloop build -a web --force    Rebuild one artifact unconditionally\n\
        devloop plan                    Show what would be rebuilt\n\
        devloop cache stats             Inspect the artifact cache\n\n\
        See 'devloop <command> --help' for more information on a specific command."
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[clap(short, long, global = true)]
    pub verbose: bool,

    /// Change to directory before executing
    #[clap(short = 'C', long, global = true, value_name = "DIR")]
    pub directory: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build artifacts, reusing cached images where inputs are unchanged
    Build {
        #[clap(flatten)]
        target: TargetArgs,

        #[clap(flatten)]
        run: RunArgs,
    },

    /// Show which artifacts would be rebuilt, without building
    Plan {
        #[clap(flatten)]
        target: TargetArgs,

        #[clap(flatten)]
        run: RunArgs,
    },

    /// Validate the project file
    Validate {
        /// Project file to validate
        #[clap(default_value = PROJECT_FILE)]
        file: PathBuf,
    },

    /// Artifact cache management
    Cache {
        #[clap(subcommand)]
        action: CacheAction,

        /// Cache file (defaults to the current project's file)
        #[clap(long, global = true, value_name = "FILE")]
        cache_file: Option<PathBuf>,
    },
}

/// Which project and artifacts to operate on
#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    /// Project file
    #[clap(short, long, default_value = PROJECT_FILE)]
    pub file: PathBuf,

    /// Only these artifacts (and the artifacts they require)
    #[clap(short, long = "artifact", value_name = "NAME")]
    pub artifacts: Vec<String>,
}

/// Options for a build round
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Cache file (defaults to a per-project file in the user cache directory)
    #[clap(long, value_name = "FILE")]
    pub cache_file: Option<PathBuf>,

    /// Reuse images whose inputs are unchanged
    #[clap(long, default_value_t = true, action = ArgAction::Set, value_name = "BOOL")]
    pub cache_artifacts: bool,

    /// Never prune intermediate build state
    #[clap(long)]
    pub no_prune: bool,

    /// Rebuild every artifact
    #[clap(long)]
    pub force: bool,

    /// Invocation mode (dev, run, build)
    #[clap(long, default_value = "build")]
    pub mode: RunMode,

    /// Also check cached images against the registry
    #[clap(long)]
    pub verify_remote: bool,

    /// Maximum parallel builds (defaults to the project setting)
    #[clap(short = 'j', long)]
    pub concurrency: Option<usize>,

    /// Stop all builds after the first failure
    #[clap(long)]
    pub fail_fast: bool,

    /// Extra image label, as KEY=VALUE
    #[clap(short, long = "label", value_name = "KEY=VALUE")]
    pub labels: Vec<String>,

    /// Target namespace
    #[clap(short, long)]
    pub namespace: Option<String>,

    /// Active profiles
    #[clap(short, long = "profile", value_name = "NAME")]
    pub profiles: Vec<String>,

    /// Mark outputs for cleanup on exit
    #[clap(long)]
    pub cleanup: bool,

    /// Mark outputs for log tailing
    #[clap(long)]
    pub tail: bool,
}

impl RunArgs {
    /// Resolve into run options, falling back to project settings
    pub fn into_options(self, settings: &BuildSettings, project_dir: &Path) -> RunOptions {
        RunOptions {
            cache_file: self
                .cache_file
                .unwrap_or_else(|| default_cache_file(project_dir)),
            cache_artifacts: self.cache_artifacts,
            no_prune: self.no_prune,
            force: self.force,
            mode: self.mode,
            verify_remote: self.verify_remote,
            concurrency: self.concurrency.unwrap_or(settings.concurrency).max(1),
            fail_fast: self.fail_fast,
            cleanup: self.cleanup,
            tail: self.tail,
            namespace: self.namespace,
            profiles: self.profiles,
            custom_labels: self.labels,
        }
    }
}

/// Cache management actions
#[derive(Subcommand, Debug, Clone)]
pub enum CacheAction {
    /// Show cache statistics
    Stats,

    /// Clear the cache
    Clear {
        /// Skip confirmation
        #[clap(short, long)]
        yes: bool,
    },

    /// List cached entries
    List,
}

/// Load and validate a project, returning the selected artifacts and the
/// directory artifact contexts are relative to
pub(crate) fn load_project(
    target: &TargetArgs,
    verbose: bool,
) -> Result<(Project, Vec<Artifact>, PathBuf)> {
    if !target.file.exists() {
        return Err(DevloopError::ProjectNotFound {
            path: target.file.clone(),
        }
        .into());
    }

    let project = Project::from_file(&target.file)?;

    let validation = ProjectValidator::validate(&project);
    if !validation.is_valid() {
        eprintln!("{}", "Project validation failed:".red().bold());
        for error in &validation.errors {
            eprintln!("  {} {}", "✗".red(), error);
        }
        return Err(DevloopError::InvalidProject {
            reason: format!("{} error(s) in {}", validation.errors.len(), target.file.display()),
            help: Some("Run 'devloop validate' for details".to_string()),
        }
        .into());
    }

    if validation.has_warnings() && verbose {
        eprintln!("{}", "Project warnings:".yellow().bold());
        for warning in &validation.warnings {
            eprintln!("  {} {}", "⚠".yellow(), warning);
        }
        eprintln!();
    }

    let artifacts = project.select(&target.artifacts)?;
    let base_dir = project_dir(&target.file)?;

    Ok((project, artifacts, base_dir))
}

/// Directory containing the project file
fn project_dir(file: &Path) -> Result<PathBuf> {
    let cwd = std::env::current_dir()
        .map_err(|e| miette::miette!("Failed to get current directory: {}", e))?;

    Ok(match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => cwd.join(parent),
        _ => cwd,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_build() {
        let cli = Cli::try_parse_from([
            "devloop",
            "build",
            "-a",
            "web",
            "--cache-artifacts=false",
            "-j",
            "4",
            "--label",
            "team=core",
        ])
        .unwrap();

        let Commands::Build { target, run } = cli.command else {
            panic!("expected build");
        };
        assert_eq!(target.artifacts, vec!["web"]);
        assert_eq!(target.file, PathBuf::from(PROJECT_FILE));

        let options = run.into_options(&BuildSettings::default(), Path::new("."));
        assert!(!options.cache_artifacts);
        assert_eq!(options.concurrency, 4);
        assert_eq!(options.custom_labels, vec!["team=core"]);
    }

    #[test]
    fn test_run_args_defaults() {
        let cli = Cli::try_parse_from(["devloop", "plan"]).unwrap();
        let Commands::Plan { run, .. } = cli.command else {
            panic!("expected plan");
        };

        let settings = BuildSettings {
            concurrency: 3,
            ..Default::default()
        };
        let options = run.into_options(&settings, Path::new("."));

        assert!(options.cache_artifacts);
        assert!(!options.force);
        assert_eq!(options.mode, RunMode::Build);
        assert_eq!(options.concurrency, 3);
        assert_eq!(options.cache_file, default_cache_file(Path::new(".")));
    }

    #[test]
    fn test_dev_mode_forces_deploy() {
        let cli = Cli::try_parse_from(["devloop", "build", "--mode", "dev"]).unwrap();
        let Commands::Build { run, .. } = cli.command else {
            panic!("expected build");
        };

        let options = run.into_options(&BuildSettings::default(), Path::new("."));
        assert!(options.force_deploy());
        assert!(!options.force);
    }

    #[test]
    fn test_cache_file_is_global_to_cache_actions() {
        let cli =
            Cli::try_parse_from(["devloop", "cache", "stats", "--cache-file", "c.json"]).unwrap();
        let Commands::Cache { action, cache_file } = cli.command else {
            panic!("expected cache");
        };
        assert!(matches!(action, CacheAction::Stats));
        assert_eq!(cache_file, Some(PathBuf::from("c.json")));
    }
}
