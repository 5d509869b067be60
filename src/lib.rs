// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 devloop contributors

//! # devloop - Incremental Container Image Builds
//!
//! `devloop` builds container images for a set of artifacts and skips every
//! build whose inputs have not changed since the image was last produced.
//!
//! ## Features
//!
//! - **Content digests** - Each artifact is hashed from its dependency files and build configuration
//! - **Persistent cache** - Digest to image mappings survive across runs
//! - **Verified hits** - A cached image is reused only while it still exists
//! - **Parallel builds** - Independent artifacts build concurrently
//!
//! ## Quick Start
//!
//! ```bash
//! # Check the project file
//! devloop validate
//!
//! # See what would be rebuilt
//! devloop plan
//!
//! # Build
//! devloop build
//! ```

pub mod artifact;
pub mod builder;
pub mod cache;
pub mod cli;
pub mod config;
pub mod errors;
pub mod utils;

// Re-export commonly used types
pub use artifact::{Artifact, Project};
pub use cache::{CacheController, CacheStore, Digest};
pub use config::RunOptions;
pub use errors::{DevloopError, DevloopResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
