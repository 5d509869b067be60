// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 devloop contributors

//! Cache controller
//!
//! Decides per artifact whether the previous build output can be reused and
//! drives the builder for everything else.
//!
//! For each artifact the steps run strictly in order: hash, look up,
//! verify, build, record. Artifacts are processed concurrently, bounded by
//! the configured concurrency and ordered by their `requires` lists.
//! Results are recorded into the store one at a time after each wave, and
//! the store is flushed once at the end of the round.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{ArtifactHasher, CacheEntry, CacheStore, Digest, PruneOutcome, RetentionPolicy};
use crate::artifact::{Artifact, ArtifactGraph};
use crate::builder::{tags, Builder, ImageTags, ImageVerifier};
use crate::config::RunOptions;
use crate::errors::DevloopError;

/// Why an artifact has to be built
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissReason {
    /// Artifact caching is turned off for this run
    CacheDisabled,
    /// The run asked for every artifact to be rebuilt
    Forced,
    /// No entry for this artifact
    NotCached,
    /// Dependencies or configuration changed
    DigestChanged,
    /// The digest could not be computed
    HashFailed(String),
}

impl std::fmt::Display for MissReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CacheDisabled => write!(f, "cache disabled"),
            Self::Forced => write!(f, "forced"),
            Self::NotCached => write!(f, "not cached"),
            Self::DigestChanged => write!(f, "inputs changed"),
            Self::HashFailed(reason) => write!(f, "hash failed: {}", reason),
        }
    }
}

/// Cache decision for one artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheStatus {
    /// Digest matches and the image is present
    Hit { image: String },
    /// Must build
    Miss(MissReason),
    /// Digest matches but the image is gone or the reference now points at
    /// a different image; the entry is kept until a new build replaces it
    Stale { image: String },
}

impl CacheStatus {
    pub fn needs_build(&self) -> bool {
        !matches!(self, Self::Hit { .. })
    }

    /// Short uppercase label for display
    pub fn label(&self) -> &'static str {
        match self {
            Self::Hit { .. } => "HIT",
            Self::Miss(_) => "MISS",
            Self::Stale { .. } => "STALE",
        }
    }
}

impl std::fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hit { image } => write!(f, "cached as {}", image),
            Self::Miss(reason) => write!(f, "{}", reason),
            Self::Stale { image } => write!(f, "{} missing or replaced", image),
        }
    }
}

/// Digest and decision for one artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub artifact: String,
    /// `None` when hashing failed
    pub digest: Option<Digest>,
    pub status: CacheStatus,
}

/// How an artifact ended the round
#[derive(Debug)]
pub enum Outcome {
    /// Reused the cached image
    Hit { image: String },
    /// Built a new image
    Built {
        image: String,
        image_id: Option<String>,
        remote_digest: Option<String>,
    },
    /// The build failed
    Failed { error: DevloopError },
    /// The round was cancelled before this artifact finished
    Cancelled,
    /// A required artifact did not produce an image
    Skipped { required: String },
}

/// Result for one artifact
#[derive(Debug)]
pub struct ArtifactResult {
    pub name: String,
    pub digest: Option<Digest>,
    /// Cache decision, `None` if the artifact never got that far
    pub status: Option<CacheStatus>,
    pub outcome: Outcome,
    pub duration: Duration,
}

impl ArtifactResult {
    fn new(name: String, outcome: Outcome) -> Self {
        Self {
            name,
            digest: None,
            status: None,
            outcome,
            duration: Duration::ZERO,
        }
    }

    fn classified(classification: Classification, outcome: Outcome, duration: Duration) -> Self {
        Self {
            name: classification.artifact,
            digest: classification.digest,
            status: Some(classification.status),
            outcome,
            duration,
        }
    }

    /// Image this artifact resolved to, if any
    pub fn image(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Hit { image } | Outcome::Built { image, .. } => Some(image),
            _ => None,
        }
    }

    pub fn is_cache_hit(&self) -> bool {
        matches!(self.outcome, Outcome::Hit { .. })
    }
}

/// Summary of a build round
#[derive(Debug)]
pub struct RoundReport {
    /// Per-artifact results, in build order
    pub results: Vec<ArtifactResult>,
    /// Labels reported by the builder
    pub labels: HashMap<String, String>,
    /// Whether the cache file was rewritten
    pub flushed: bool,
    /// What the retention step did
    pub prune: PruneOutcome,
    /// Whether the round was cancelled
    pub cancelled: bool,
    pub duration: Duration,
}

impl RoundReport {
    pub fn get(&self, name: &str) -> Option<&ArtifactResult> {
        self.results.iter().find(|r| r.name == name)
    }

    pub fn hits(&self) -> usize {
        self.results.iter().filter(|r| r.is_cache_hit()).count()
    }

    pub fn built(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, Outcome::Built { .. }))
            .count()
    }

    pub fn failures(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, Outcome::Failed { .. }))
            .count()
    }

    /// Every artifact resolved to an image
    pub fn success(&self) -> bool {
        self.results.iter().all(|r| r.image().is_some())
    }

    /// Artifact name to resolved image
    pub fn images(&self) -> ImageTags {
        self.results
            .iter()
            .filter_map(|r| r.image().map(|i| (r.name.clone(), i.to_string())))
            .collect()
    }
}

/// Cache controller
#[derive(Clone)]
pub struct CacheController {
    store: Arc<CacheStore>,
    hasher: ArtifactHasher,
    builder: Arc<dyn Builder>,
    verifier: Arc<dyn ImageVerifier>,
    options: Arc<RunOptions>,
}

impl CacheController {
    pub fn new(
        store: Arc<CacheStore>,
        hasher: ArtifactHasher,
        builder: Arc<dyn Builder>,
        verifier: Arc<dyn ImageVerifier>,
        options: RunOptions,
    ) -> Self {
        Self {
            store,
            hasher,
            builder,
            verifier,
            options: Arc::new(options),
        }
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    /// Hash an artifact and decide whether it must be built
    pub async fn classify(&self, artifact: &Artifact) -> Classification {
        let digest = match self
            .hasher
            .hash_artifact(self.builder.as_ref(), artifact)
            .await
        {
            Ok(digest) => digest,
            Err(e) => {
                warn!("Could not hash {}: {}; it will be rebuilt", artifact.name, e);
                return Classification {
                    artifact: artifact.name.clone(),
                    digest: None,
                    status: CacheStatus::Miss(MissReason::HashFailed(e.to_string())),
                };
            }
        };

        let status = self.decide(&artifact.name, &digest).await;
        debug!("{} {} ({})", artifact.name, status.label(), digest);

        Classification {
            artifact: artifact.name.clone(),
            digest: Some(digest),
            status,
        }
    }

    async fn decide(&self, name: &str, digest: &Digest) -> CacheStatus {
        if !self.options.cache_artifacts {
            return CacheStatus::Miss(MissReason::CacheDisabled);
        }
        if self.options.force {
            return CacheStatus::Miss(MissReason::Forced);
        }

        let Some(entry) = self.store.lookup(name).await else {
            return CacheStatus::Miss(MissReason::NotCached);
        };

        if entry.digest != *digest {
            return CacheStatus::Miss(MissReason::DigestChanged);
        }

        if self.output_present(&entry).await {
            CacheStatus::Hit { image: entry.image }
        } else {
            CacheStatus::Stale { image: entry.image }
        }
    }

    /// The image must exist locally and, when the entry recorded an image
    /// ID, the reference must still point at that image. With remote
    /// verification on, an entry that recorded a registry digest must also
    /// still be served with that digest.
    async fn output_present(&self, entry: &CacheEntry) -> bool {
        let current = match self.verifier.local_image_id(&entry.image).await {
            Ok(Some(id)) => id,
            Ok(None) => {
                debug!("{} not found locally", entry.image);
                return false;
            }
            Err(e) => {
                warn!("Could not check for {}: {}", entry.image, e);
                return false;
            }
        };

        if let Some(ref recorded) = entry.image_id {
            if *recorded != current {
                debug!("{} was retagged: {} != {}", entry.image, current, recorded);
                return false;
            }
        }

        if !self.options.verify_remote {
            return true;
        }

        let Some(ref expected) = entry.remote_digest else {
            return true;
        };

        match self.verifier.remote_digest(&entry.image).await {
            Ok(Some(actual)) if actual == *expected => true,
            Ok(Some(actual)) => {
                debug!("{} moved in registry: {} != {}", entry.image, actual, expected);
                false
            }
            Ok(None) => {
                debug!("{} not found in registry", entry.image);
                false
            }
            Err(e) => {
                warn!("Could not verify {} in registry: {}", entry.image, e);
                false
            }
        }
    }

    /// Classify artifacts without building anything
    pub async fn plan(&self, artifacts: &[Artifact]) -> Vec<Classification> {
        let mut plan = Vec::with_capacity(artifacts.len());
        for artifact in artifacts {
            plan.push(self.classify(artifact).await);
        }
        plan
    }

    /// Run one build round.
    ///
    /// `tags` overrides the image reference per artifact; artifacts without
    /// an override are tagged from their digest. Only an invalid
    /// requirement graph is returned as an error; per-artifact failures
    /// are reported in the [`RoundReport`].
    pub async fn build_round(
        &self,
        artifacts: &[Artifact],
        tags: &ImageTags,
        cancel: &CancellationToken,
    ) -> Result<RoundReport, DevloopError> {
        let start = Instant::now();
        let waves = ArtifactGraph::build(artifacts)?.waves()?;
        let semaphore = Arc::new(Semaphore::new(self.options.concurrency.max(1)));

        let mut results = Vec::with_capacity(artifacts.len());
        let mut unavailable: HashSet<String> = HashSet::new();

        for wave in waves {
            let mut handles = Vec::with_capacity(wave.len());

            for idx in wave {
                let artifact = artifacts[idx].clone();

                if let Some(required) = artifact.requires.iter().find(|r| unavailable.contains(*r)) {
                    info!("Skipping {}: {} has no image", artifact.name, required);
                    unavailable.insert(artifact.name.clone());
                    results.push(ArtifactResult::new(
                        artifact.name.clone(),
                        Outcome::Skipped {
                            required: required.clone(),
                        },
                    ));
                    continue;
                }

                let controller = self.clone();
                let tag = tags.get(&artifact.name).cloned();
                let cancel = cancel.clone();
                let semaphore = Arc::clone(&semaphore);
                let name = artifact.name.clone();

                let handle = tokio::spawn(async move {
                    controller.process(artifact, tag, cancel, semaphore).await
                });
                handles.push((name, handle));
            }

            for (name, handle) in handles {
                let result = match handle.await {
                    Ok(result) => result,
                    Err(e) => ArtifactResult::new(
                        name.clone(),
                        Outcome::Failed {
                            error: DevloopError::BuildFailed {
                                artifact: name,
                                message: format!("worker task failed: {}", e),
                                help: None,
                            },
                        },
                    ),
                };

                self.record(&result).await;
                if result.image().is_none() {
                    unavailable.insert(result.name.clone());
                }
                results.push(result);
            }
        }

        let flushed = if self.options.cache_artifacts {
            match self.store.flush().await {
                Ok(written) => written,
                Err(e) => {
                    warn!("Could not persist the artifact cache: {}", e);
                    false
                }
            }
        } else {
            false
        };

        let cancelled = cancel.is_cancelled();
        let prune = if cancelled {
            PruneOutcome::Skipped
        } else {
            RetentionPolicy::from_options(&self.options)
                .apply(self.builder.as_ref())
                .await
        };

        Ok(RoundReport {
            results,
            labels: self.builder.labels(),
            flushed,
            prune,
            cancelled,
            duration: start.elapsed(),
        })
    }

    /// Hash, decide and, on a miss, build a single artifact
    async fn process(
        &self,
        artifact: Artifact,
        tag: Option<String>,
        cancel: CancellationToken,
        semaphore: Arc<Semaphore>,
    ) -> ArtifactResult {
        let start = Instant::now();

        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return ArtifactResult::new(artifact.name, Outcome::Cancelled);
            }
            permit = semaphore.acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return ArtifactResult::new(artifact.name, Outcome::Cancelled),
            },
        };

        let classification = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return ArtifactResult::new(artifact.name, Outcome::Cancelled);
            }
            classification = self.classify(&artifact) => classification,
        };

        if let CacheStatus::Hit { ref image } = classification.status {
            info!("{} is up to date ({})", artifact.name, image);
            let outcome = Outcome::Hit {
                image: image.clone(),
            };
            return ArtifactResult::classified(classification, outcome, start.elapsed());
        }

        let tag = tag.unwrap_or_else(|| match classification.digest {
            Some(ref digest) => tags::digest_tag(&artifact, digest),
            None => format!("{}:latest", artifact.image),
        });
        info!("Building {} as {} ({})", artifact.name, tag, classification.status);

        let mut build_tags = ImageTags::new();
        build_tags.insert(artifact.name.clone(), tag);

        let built = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("Build of {} cancelled", artifact.name);
                return ArtifactResult::classified(classification, Outcome::Cancelled, start.elapsed());
            }
            built = self.builder.build(std::slice::from_ref(&artifact), &build_tags) => built,
        };

        let built = built.and_then(|list| {
            list.into_iter()
                .find(|b| b.name == artifact.name)
                .ok_or_else(|| DevloopError::MissingBuildOutput {
                    artifact: artifact.name.clone(),
                })
        });

        let outcome = match built {
            Ok(b) => Outcome::Built {
                image: b.image,
                image_id: b.image_id,
                remote_digest: b.remote_digest,
            },
            Err(error) => {
                warn!("{}", error);
                if self.options.fail_fast {
                    cancel.cancel();
                }
                Outcome::Failed { error }
            }
        };

        ArtifactResult::classified(classification, outcome, start.elapsed())
    }

    /// Apply one artifact's result to the store
    async fn record(&self, result: &ArtifactResult) {
        if !self.options.cache_artifacts {
            return;
        }

        if let (
            Outcome::Built {
                image,
                image_id,
                remote_digest,
            },
            Some(digest),
        ) = (&result.outcome, &result.digest)
        {
            let entry = CacheEntry::new(digest.clone(), image.clone(), remote_digest.clone())
                .with_image_id(image_id.clone());
            self.store.put(&result.name, entry).await;
        }

        if matches!(
            result.status,
            Some(CacheStatus::Miss(MissReason::HashFailed(_)))
        ) && self.store.invalidate(&result.name).await
        {
            debug!("Invalidated cache entry for {}", result.name);
        }
    }
}
