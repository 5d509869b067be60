// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 devloop contributors

//! devloop - Incremental container image builds
//!
//! Rebuild only the images whose inputs changed.

use clap::Parser;
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use devloop::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let default_filter = if cli.verbose { "devloop=debug" } else { "devloop=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    // Change to specified directory if provided
    if let Some(ref dir) = cli.directory {
        std::env::set_current_dir(dir).map_err(|e| {
            miette::miette!("Failed to change to directory '{}': {}", dir.display(), e)
        })?;
    }

    // Dispatch to command handlers
    match cli.command {
        Commands::Build { target, run } => devloop::cli::build::run(target, run, cli.verbose).await,
        Commands::Plan { target, run } => devloop::cli::plan::run(target, run, cli.verbose).await,
        Commands::Validate { file } => devloop::cli::validate::run(file, cli.verbose).await,
        Commands::Cache { action, cache_file } => {
            devloop::cli::cache::run(action, cache_file, cli.verbose).await
        }
    }
}
