// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 devloop contributors

//! Post-round pruning of intermediate build state

use tracing::{info, warn};

use crate::builder::Builder;
use crate::config::RunOptions;

/// Decides whether to prune after a build round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    no_prune: bool,
    cache_artifacts: bool,
}

/// What the retention step did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PruneOutcome {
    /// Pruning was not wanted this round
    Skipped,
    /// The builder pruned successfully
    Pruned,
    /// The builder failed to prune; the round is unaffected
    Failed(String),
}

impl RetentionPolicy {
    pub fn new(no_prune: bool, cache_artifacts: bool) -> Self {
        Self {
            no_prune,
            cache_artifacts,
        }
    }

    pub fn from_options(options: &RunOptions) -> Self {
        Self::new(options.no_prune, options.cache_artifacts)
    }

    /// Prune runs only when neither `no_prune` nor artifact caching is set
    pub fn should_prune(&self) -> bool {
        !self.no_prune && !self.cache_artifacts
    }

    /// Prune through the builder if the policy allows it
    pub async fn apply(&self, builder: &dyn Builder) -> PruneOutcome {
        if !self.should_prune() {
            return PruneOutcome::Skipped;
        }

        match builder.prune().await {
            Ok(()) => {
                info!("Pruned intermediate build state");
                PruneOutcome::Pruned
            }
            Err(e) => {
                warn!("Prune failed: {}", e);
                PruneOutcome::Failed(e.to_string())
            }
        }
    }
}
