// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 devloop contributors

//! Artifact build cache
//!
//! Computes a digest for every artifact from its build inputs and
//! configuration, remembers which image was produced for which digest,
//! and skips builds whose digest and image are unchanged.

pub mod controller;
pub mod hash;
pub mod retention;
pub mod store;

pub use controller::{
    ArtifactResult, CacheController, CacheStatus, Classification, MissReason, Outcome,
    RoundReport,
};
pub use hash::{ArtifactHasher, Blake3FileHasher, FileHasher};
pub use retention::{PruneOutcome, RetentionPolicy};
pub use store::CacheStore;

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Opaque content digest (lowercase hex)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Digest(String);

impl Digest {
    /// Wrap an already computed hex digest
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// Digest of a finished BLAKE3 hasher
    pub(crate) fn from_hasher(hasher: &blake3::Hasher) -> Self {
        Self(hasher.finalize().to_hex().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Last known build result for an artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Artifact digest the image was built from
    pub digest: Digest,
    /// Image reference that was produced
    pub image: String,
    /// Local image ID the reference pointed at after the build
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
    /// Registry digest recorded when the image was pushed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_digest: Option<String>,
    /// When the image was built
    #[serde(default = "unix_epoch")]
    pub built_at: SystemTime,
}

fn unix_epoch() -> SystemTime {
    SystemTime::UNIX_EPOCH
}

impl CacheEntry {
    pub fn new(digest: Digest, image: impl Into<String>, remote_digest: Option<String>) -> Self {
        Self {
            digest,
            image: image.into(),
            image_id: None,
            remote_digest,
            built_at: SystemTime::now(),
        }
    }

    /// Pin the entry to the local image ID the build produced
    pub fn with_image_id(mut self, image_id: Option<String>) -> Self {
        self.image_id = image_id;
        self
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Number of cached entries
    pub entries: usize,
    /// Size of the cache file in bytes
    pub size_bytes: u64,
    /// Oldest entry timestamp
    pub oldest_entry: Option<SystemTime>,
    /// Newest entry timestamp
    pub newest_entry: Option<SystemTime>,
}

impl CacheStats {
    /// Format size for display
    pub fn formatted_size(&self) -> String {
        const KB: u64 = 1024;
        const MB: u64 = KB * 1024;

        if self.size_bytes >= MB {
            format!("{:.2} MB", self.size_bytes as f64 / MB as f64)
        } else if self.size_bytes >= KB {
            format!("{:.2} KB", self.size_bytes as f64 / KB as f64)
        } else {
            format!("{} bytes", self.size_bytes)
        }
    }
}
