// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 devloop contributors

//! Build engine capabilities
//!
//! The cache never builds images itself. It talks to a [`Builder`] for
//! dependency enumeration, builds and pruning, and to an [`ImageVerifier`]
//! to confirm that a cached image still exists.

mod docker;
pub mod tags;

pub use docker::DockerBuilder;
pub use tags::ImageTags;

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::artifact::Artifact;
use crate::errors::DevloopError;

/// Output of a successful build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltArtifact {
    /// Artifact name
    pub name: String,
    /// Full image reference that was produced (`repo:tag`)
    pub image: String,
    /// Local image ID the reference pointed at right after the build
    pub image_id: Option<String>,
    /// Registry digest, when the image was pushed
    pub remote_digest: Option<String>,
}

/// Trait for build engines
#[async_trait]
pub trait Builder: Send + Sync {
    /// List the files the artifact's build depends on. Order is not
    /// significant.
    async fn dependencies_for(&self, artifact: &Artifact) -> Result<Vec<PathBuf>, DevloopError>;

    /// Build the given artifacts with the given tags
    async fn build(
        &self,
        artifacts: &[Artifact],
        tags: &ImageTags,
    ) -> Result<Vec<BuiltArtifact>, DevloopError>;

    /// Reclaim intermediate build state
    async fn prune(&self) -> Result<(), DevloopError>;

    /// Labels attached to build outputs
    fn labels(&self) -> HashMap<String, String>;
}

/// Trait for checking that a previously built image still exists
#[async_trait]
pub trait ImageVerifier: Send + Sync {
    /// ID of the image the reference currently points at in the local
    /// image store, `None` when it is absent
    async fn local_image_id(&self, image: &str) -> Result<Option<String>, DevloopError>;

    /// Digest the registry currently serves for the image, if any
    async fn remote_digest(&self, image: &str) -> Result<Option<String>, DevloopError>;
}

/// Resolve an artifact's dependency patterns to file paths.
///
/// Patterns are relative to the artifact's context, which is itself
/// relative to `base_dir`. Only regular files are returned, sorted and
/// deduplicated.
pub fn resolve_dependencies(
    artifact: &Artifact,
    base_dir: &Path,
) -> Result<Vec<PathBuf>, DevloopError> {
    let context = base_dir.join(&artifact.context);

    if !context.is_dir() {
        return Err(DevloopError::DependencyResolution {
            artifact: artifact.name.clone(),
            reason: format!("context directory not found: {}", context.display()),
        });
    }

    let mut files = Vec::new();

    for pattern in &artifact.dependencies {
        let full_pattern = if Path::new(pattern).is_absolute() {
            pattern.to_string()
        } else {
            context.join(pattern).to_string_lossy().to_string()
        };

        let matches = glob::glob(&full_pattern).map_err(|e| DevloopError::DependencyResolution {
            artifact: artifact.name.clone(),
            reason: format!("invalid pattern '{}': {}", pattern, e),
        })?;

        for entry in matches {
            let path = entry.map_err(|e| DevloopError::DependencyResolution {
                artifact: artifact.name.clone(),
                reason: e.to_string(),
            })?;

            if path.is_file() {
                files.push(path);
            }
        }
    }

    files.sort();
    files.dedup();

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_dependencies() {
        let dir = TempDir::new().unwrap();
        let ctx = dir.path().join("web");
        std::fs::create_dir_all(ctx.join("src")).unwrap();
        std::fs::write(ctx.join("Dockerfile"), "FROM scratch").unwrap();
        std::fs::write(ctx.join("src/main.go"), "package main").unwrap();
        std::fs::write(ctx.join("README.md"), "docs").unwrap();

        let mut artifact = Artifact::new("web", "web");
        artifact.context = "web".into();
        artifact.dependencies = vec!["Dockerfile".into(), "src/**/*".into(), "Dockerfile".into()];

        let files = resolve_dependencies(&artifact, dir.path()).unwrap();
        assert_eq!(files, vec![ctx.join("Dockerfile"), ctx.join("src/main.go")]);
    }

    #[test]
    fn test_resolve_default_pattern_skips_directories() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("a/b")).unwrap();
        std::fs::write(dir.path().join("a/b/file"), "x").unwrap();

        let artifact = Artifact::new("root", "root");
        let files = resolve_dependencies(&artifact, dir.path()).unwrap();

        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("a/b/file"));
    }

    #[test]
    fn test_resolve_invalid_pattern() {
        let dir = TempDir::new().unwrap();
        let mut artifact = Artifact::new("web", "web");
        artifact.dependencies = vec!["src/[".into()];

        let err = resolve_dependencies(&artifact, dir.path()).unwrap_err();
        assert!(matches!(err, DevloopError::DependencyResolution { .. }));
        assert!(err.to_string().contains("src/["));
    }

    #[test]
    fn test_resolve_missing_context() {
        let dir = TempDir::new().unwrap();
        let mut artifact = Artifact::new("web", "web");
        artifact.context = "missing".into();

        assert!(matches!(
            resolve_dependencies(&artifact, dir.path()),
            Err(DevloopError::DependencyResolution { .. })
        ));
    }
}
