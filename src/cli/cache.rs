// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 devloop contributors

//! Cache command - manage the artifact cache

use colored::Colorize;
use miette::Result;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::SystemTime;

use super::CacheAction;
use crate::cache::CacheStore;
use crate::config::default_cache_file;

/// Run the cache command
pub async fn run(action: CacheAction, cache_file: Option<PathBuf>, verbose: bool) -> Result<()> {
    let cache_file = match cache_file {
        Some(file) => file,
        None => {
            let cwd = std::env::current_dir()
                .map_err(|e| miette::miette!("Failed to get current directory: {}", e))?;
            default_cache_file(&cwd)
        }
    };
    let store = CacheStore::load(&cache_file).await;

    match action {
        CacheAction::Stats => {
            let stats = store.stats().await;

            println!("{}", "Cache Statistics".bold());
            println!("{}", "═".repeat(40));
            println!("  Location: {}", cache_file.display());
            println!("  Entries:  {}", stats.entries);
            println!("  Size:     {}", stats.formatted_size());

            if let Some(oldest) = stats.oldest_entry.and_then(age) {
                println!("  Oldest:   {} ago", oldest);
            }

            if let Some(newest) = stats.newest_entry.and_then(age) {
                println!("  Newest:   {} ago", newest);
            }

            Ok(())
        }

        CacheAction::Clear { yes } => {
            let stats = store.stats().await;

            if stats.entries == 0 {
                println!("{}", "Cache is already empty.".dimmed());
                return Ok(());
            }

            if !yes {
                print!(
                    "Clear {} cache entries ({})? [y/N] ",
                    stats.entries,
                    stats.formatted_size()
                );
                io::stdout().flush().ok();

                let mut input = String::new();
                io::stdin().read_line(&mut input).ok();

                if !input.trim().eq_ignore_ascii_case("y") {
                    println!("{}", "Cancelled.".dimmed());
                    return Ok(());
                }
            }

            store.clear().await;
            store.flush().await?;
            println!("{}", "Cache cleared.".green());

            Ok(())
        }

        CacheAction::List => {
            let entries = store.entries().await;

            println!("{}", "Cached Artifacts".bold());
            println!("{}", "═".repeat(40));

            if entries.is_empty() {
                println!("{}", "  No cached entries.".dimmed());
                return Ok(());
            }

            for (name, entry) in &entries {
                let built = age(entry.built_at)
                    .map(|a| format!("{} ago", a))
                    .unwrap_or_else(|| "unknown".to_string());

                println!("  {} {} {}", name.bold(), entry.image, built.dimmed());
                if verbose {
                    println!("      digest {}", entry.digest.as_str().dimmed());
                    if let Some(ref remote) = entry.remote_digest {
                        println!("      remote {}", remote.dimmed());
                    }
                }
            }

            println!();
            println!(
                "{}",
                "  Run 'devloop build --force' to rebuild regardless of the cache.".dimmed()
            );

            Ok(())
        }
    }
}

/// Time since `at`, `None` for unknown or future timestamps
fn age(at: SystemTime) -> Option<String> {
    if at == SystemTime::UNIX_EPOCH {
        return None;
    }
    at.elapsed().ok().map(format_duration)
}

fn format_duration(duration: std::time::Duration) -> String {
    let secs = duration.as_secs();

    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else if secs < 86400 {
        format!("{}h", secs / 3600)
    } else {
        format!("{}d", secs / 86400)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(42)), "42s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m");
        assert_eq!(format_duration(Duration::from_secs(7200)), "2h");
        assert_eq!(format_duration(Duration::from_secs(3 * 86400)), "3d");
    }

    #[test]
    fn test_age_of_unknown_timestamp() {
        assert_eq!(age(SystemTime::UNIX_EPOCH), None);
        assert!(age(SystemTime::now() - Duration::from_secs(5)).is_some());
    }
}
