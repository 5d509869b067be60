// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 devloop contributors

//! Plan command - show cache decisions without building

use colored::Colorize;
use miette::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

use super::{load_project, RunArgs, TargetArgs};
use crate::builder::DockerBuilder;
use crate::cache::{ArtifactHasher, CacheController, CacheStatus, CacheStore};

/// Run the plan command
pub async fn run(target: TargetArgs, run: RunArgs, verbose: bool) -> Result<()> {
    let (project, artifacts, base_dir) = load_project(&target, verbose)?;
    let options = run.into_options(&project.build, &base_dir);

    // Dependencies are listed without docker; only hits need it for verification.
    let builder = Arc::new(match DockerBuilder::new(base_dir.clone()) {
        Ok(builder) => builder,
        Err(e) => {
            warn!("{}; cached images cannot be verified", e);
            DockerBuilder::with_binary(PathBuf::from("docker"), base_dir)
        }
    });

    let store = if options.cache_artifacts {
        CacheStore::load(&options.cache_file).await
    } else {
        CacheStore::disabled()
    };

    let controller = CacheController::new(
        Arc::new(store),
        ArtifactHasher::default(),
        builder.clone(),
        builder,
        options,
    );

    let plan = controller.plan(&artifacts).await;

    println!("{} {}", "Build plan for".bold(), project.name);
    println!("{}", "═".repeat(40));

    let width = plan.iter().map(|c| c.artifact.len()).max().unwrap_or(0);
    let mut rebuild = 0;

    for classification in &plan {
        let label = match classification.status {
            CacheStatus::Hit { .. } => classification.status.label().green(),
            CacheStatus::Miss(_) => classification.status.label().yellow(),
            CacheStatus::Stale { .. } => classification.status.label().red(),
        };
        if classification.status.needs_build() {
            rebuild += 1;
        }

        let digest = classification
            .digest
            .as_ref()
            .map(|d| d.as_str().chars().take(12).collect::<String>())
            .unwrap_or_else(|| "-".to_string());

        println!(
            "  {:<5} {:<width$}  {}  {}",
            label,
            classification.artifact,
            digest.dimmed(),
            classification.status.to_string().dimmed(),
            width = width
        );
    }

    println!();
    println!(
        "{} of {} artifacts would be built",
        rebuild,
        plan.len()
    );

    if verbose {
        println!(
            "{}",
            format!("Cache file: {}", controller.options().cache_file.display()).dimmed()
        );
    }

    Ok(())
}
