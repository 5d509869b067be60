// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 devloop contributors

//! Build command - run one build round

use colored::Colorize;
use miette::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::{load_project, RunArgs, TargetArgs};
use crate::builder::{tags, DockerBuilder, ImageTags};
use crate::cache::{
    ArtifactHasher, CacheController, CacheStore, Outcome, PruneOutcome, RoundReport,
};
use crate::utils;

/// Run the build command
pub async fn run(target: TargetArgs, run: RunArgs, verbose: bool) -> Result<()> {
    let (project, artifacts, base_dir) = load_project(&target, verbose)?;
    let options = run.into_options(&project.build, &base_dir);

    let builder = Arc::new(
        DockerBuilder::new(base_dir)?
            .with_push(project.build.push)
            .with_labels(options.labels()),
    );

    let store = if options.cache_artifacts {
        CacheStore::load(&options.cache_file).await
    } else {
        CacheStore::disabled()
    };

    let image_tags = match project.build.tag {
        Some(ref tag) => tags::fixed_tags(&artifacts, tag),
        None => ImageTags::new(),
    };

    let controller = CacheController::new(
        Arc::new(store),
        ArtifactHasher::default(),
        builder.clone(),
        builder,
        options,
    );

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling builds");
            interrupt.cancel();
        }
    });

    println!(
        "{} {} ({} artifacts)",
        "Building".bold(),
        project.name,
        artifacts.len()
    );
    println!();

    let spinner = utils::create_spinner("Building artifacts...");
    let report = controller.build_round(&artifacts, &image_tags, &cancel).await;
    spinner.finish_and_clear();
    let report = report?;

    print_report(&report, verbose);

    if report.cancelled && report.failures() == 0 {
        return Err(miette::miette!("Build round was cancelled"));
    }
    if !report.success() {
        return Err(miette::miette!(
            "{} of {} artifacts failed",
            report.results.len() - report.images().len(),
            report.results.len()
        ));
    }

    Ok(())
}

fn print_report(report: &RoundReport, verbose: bool) {
    for result in &report.results {
        match &result.outcome {
            Outcome::Hit { image } => {
                utils::print_success(&format!("{} {} {}", result.name, utils::dimmed("cached"), image));
            }
            Outcome::Built { image, .. } => {
                let elapsed = format!("({:.2}s)", result.duration.as_secs_f64());
                utils::print_success(&format!(
                    "{} built {} {}",
                    result.name,
                    image,
                    utils::dimmed(&elapsed)
                ));
                if let (true, Some(status)) = (verbose, &result.status) {
                    println!("      {}", utils::dimmed(&status.to_string()));
                }
            }
            Outcome::Failed { error } => {
                utils::print_error(&format!("{} {}", result.name, error));
            }
            Outcome::Cancelled => {
                utils::print_skipped(&format!("{} cancelled", result.name));
            }
            Outcome::Skipped { required } => {
                utils::print_skipped(&format!("{} skipped, {} has no image", result.name, required));
            }
        }

        if verbose {
            if let Some(ref digest) = result.digest {
                println!("      {}", utils::dimmed(&format!("digest {}", digest)));
            }
        }
    }

    println!();
    println!(
        "{} cached, {} built, {} failed in {:.2}s",
        report.hits(),
        report.built(),
        report.failures(),
        report.duration.as_secs_f64()
    );

    if let PruneOutcome::Failed(ref message) = report.prune {
        utils::print_warning(&format!("Prune failed: {}", message));
    }

    if verbose && !report.labels.is_empty() {
        let mut labels: Vec<_> = report.labels.iter().collect();
        labels.sort();
        println!();
        println!("{}:", "Labels".bold());
        for (k, v) in labels {
            println!("  {}={}", k, v);
        }
    }
}
