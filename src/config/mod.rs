// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 devloop contributors

//! Run-level options
//!
//! Options set on the command line for a single invocation. They are
//! resolved once and handed to the cache controller and retention policy
//! as an immutable value.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::cache::hash::hash_string;

/// Label key prefix for labels derived from run options
pub const LABEL_PREFIX: &str = "devloop.dev";

/// How the tool was invoked
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Continuous development loop
    Dev,
    /// Build and deploy once
    Run,
    /// Build only
    #[default]
    Build,
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dev => write!(f, "dev"),
            Self::Run => write!(f, "run"),
            Self::Build => write!(f, "build"),
        }
    }
}

impl std::str::FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Self::Dev),
            "run" => Ok(Self::Run),
            "build" => Ok(Self::Build),
            _ => Err(format!("Unknown run mode: {}", s)),
        }
    }
}

/// Options for one invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Location of the persisted cache
    pub cache_file: PathBuf,
    /// Whether artifact caching is active
    pub cache_artifacts: bool,
    /// Suppress pruning after a round
    pub no_prune: bool,
    /// Rebuild every artifact regardless of digest match
    pub force: bool,
    /// Invocation mode
    pub mode: RunMode,
    /// Also confirm cached images against the registry
    pub verify_remote: bool,
    /// Maximum number of artifacts processed at once
    pub concurrency: usize,
    /// Cancel sibling builds after the first failure
    pub fail_fast: bool,
    /// Clean up deployed resources on exit
    pub cleanup: bool,
    /// Tail logs after deploying
    pub tail: bool,
    /// Target namespace
    pub namespace: Option<String>,
    /// Active profiles
    pub profiles: Vec<String>,
    /// Extra labels, as `key=value` or `key`
    pub custom_labels: Vec<String>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            cache_file: default_cache_file(Path::new(".")),
            cache_artifacts: true,
            no_prune: false,
            force: false,
            mode: RunMode::default(),
            verify_remote: false,
            concurrency: 1,
            fail_fast: false,
            cleanup: false,
            tail: false,
            namespace: None,
            profiles: vec![],
            custom_labels: vec![],
        }
    }
}

impl RunOptions {
    /// Whether intermediate build state should be pruned after a round.
    ///
    /// Pruning is off when the user asked for `--no-prune`, and also while
    /// artifacts are cached, since cached images rely on the layers a prune
    /// would discard.
    pub fn prune(&self) -> bool {
        !self.no_prune && !self.cache_artifacts
    }

    /// Whether downstream deploy steps must redeploy unconditionally
    pub fn force_deploy(&self) -> bool {
        self.mode == RunMode::Dev || self.force
    }

    /// Labels to attach to everything produced during this run
    pub fn labels(&self) -> BTreeMap<String, String> {
        let mut labels = BTreeMap::new();

        if self.cleanup {
            labels.insert(format!("{}/cleanup", LABEL_PREFIX), "true".to_string());
        }
        if self.tail {
            labels.insert(format!("{}/tail", LABEL_PREFIX), "true".to_string());
        }
        if let Some(ref ns) = self.namespace {
            if !ns.is_empty() {
                labels.insert(format!("{}/namespace", LABEL_PREFIX), ns.clone());
            }
        }
        if !self.profiles.is_empty() {
            labels.insert(
                format!("{}/profiles", LABEL_PREFIX),
                self.profiles.join("__"),
            );
        }

        for label in &self.custom_labels {
            match label.split_once('=') {
                Some((k, v)) => labels.insert(k.to_string(), v.to_string()),
                None => labels.insert(label.clone(), String::new()),
            };
        }

        labels
    }
}

/// Default cache file for the project rooted at `project_dir`
///
/// Each project gets its own file under the per-user cache directory,
/// named after a hash of the canonical project path, since entries are
/// keyed by artifact name only. Falls back to a project-local file when
/// no home directory can be determined.
pub fn default_cache_file(project_dir: &Path) -> PathBuf {
    let root = std::fs::canonicalize(project_dir).unwrap_or_else(|_| project_dir.to_path_buf());
    let key = hash_string(&root.to_string_lossy());
    let name = format!("{}.json", &key.as_str()[..16]);

    directories::ProjectDirs::from("dev", "devloop", "devloop")
        .map(|dirs| dirs.cache_dir().join("projects").join(name))
        .unwrap_or_else(|| root.join(".devloop").join("cache.json"))
}
