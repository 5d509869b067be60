// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 devloop contributors

//! Docker CLI builder
//!
//! Builds images by running the `docker` command line client.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Instant;
use tokio::process::Command;
use tracing::{debug, info};

use super::{resolve_dependencies, BuiltArtifact, Builder, ImageTags, ImageVerifier};
use crate::artifact::Artifact;
use crate::errors::DevloopError;

/// Builder driving the docker CLI
pub struct DockerBuilder {
    /// Path to the docker binary
    docker_path: PathBuf,
    /// Directory that artifact contexts are relative to
    base_dir: PathBuf,
    /// Push images after building
    push: bool,
    /// Labels applied to every image
    labels: BTreeMap<String, String>,
}

impl DockerBuilder {
    /// Create a docker builder, locating `docker` on the PATH
    pub fn new(base_dir: PathBuf) -> Result<Self, DevloopError> {
        let docker_path =
            which::which("docker").map_err(|_| DevloopError::tool_not_found("docker"))?;

        Ok(Self::with_binary(docker_path, base_dir))
    }

    /// Create a docker builder using a specific binary
    pub fn with_binary(docker_path: PathBuf, base_dir: PathBuf) -> Self {
        Self {
            docker_path,
            base_dir,
            push: false,
            labels: BTreeMap::new(),
        }
    }

    /// Push images to their registry after building
    pub fn with_push(mut self, push: bool) -> Self {
        self.push = push;
        self
    }

    /// Labels applied to every built image
    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels = labels;
        self
    }

    /// Arguments for `docker build`
    fn build_args(&self, artifact: &Artifact, tag: &str) -> Vec<String> {
        let context = self.base_dir.join(&artifact.context);
        let dockerfile = context.join(&artifact.dockerfile);

        let mut args = vec![
            "build".to_string(),
            "--tag".to_string(),
            tag.to_string(),
            "--file".to_string(),
            dockerfile.to_string_lossy().to_string(),
        ];

        for (k, v) in &artifact.build_args {
            args.push("--build-arg".to_string());
            args.push(format!("{}={}", k, v));
        }

        if let Some(ref target) = artifact.target {
            args.push("--target".to_string());
            args.push(target.clone());
        }

        for (k, v) in &self.labels {
            args.push("--label".to_string());
            args.push(format!("{}={}", k, v));
        }

        args.push(context.to_string_lossy().to_string());
        args
    }

    async fn run(&self, args: &[String]) -> Result<std::process::Output, DevloopError> {
        debug!("docker {}", args.join(" "));

        Command::new(&self.docker_path)
            .args(args)
            .current_dir(&self.base_dir)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| DevloopError::ToolExecutionFailed {
                tool: "docker".to_string(),
                error: e.to_string(),
                help: Some(format!(
                    "Could not run '{}'",
                    self.docker_path.display()
                )),
            })
    }

    async fn build_one(&self, artifact: &Artifact, tag: &str) -> Result<BuiltArtifact, DevloopError> {
        let start = Instant::now();
        let output = self.run(&self.build_args(artifact, tag)).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DevloopError::build_failed_with_help(&artifact.name, &stderr));
        }

        info!(
            "Built {} as {} in {:.2}s",
            artifact.name,
            tag,
            start.elapsed().as_secs_f64()
        );

        // The tag can be moved later by another build; the ID pins this output.
        let image_id = self.local_image_id(tag).await?;

        let remote_digest = if self.push {
            self.push_image(&artifact.name, tag).await?;
            self.remote_digest(tag).await?
        } else {
            None
        };

        Ok(BuiltArtifact {
            name: artifact.name.clone(),
            image: tag.to_string(),
            image_id,
            remote_digest,
        })
    }

    async fn push_image(&self, artifact: &str, tag: &str) -> Result<(), DevloopError> {
        let output = self.run(&["push".to_string(), tag.to_string()]).await?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(DevloopError::build_failed_with_help(artifact, &stderr))
        }
    }
}

#[async_trait]
impl Builder for DockerBuilder {
    async fn dependencies_for(&self, artifact: &Artifact) -> Result<Vec<PathBuf>, DevloopError> {
        let mut files = resolve_dependencies(artifact, &self.base_dir)?;

        // The Dockerfile is always an input, even when the patterns miss it.
        let dockerfile = self.base_dir.join(&artifact.context).join(&artifact.dockerfile);
        if dockerfile.is_file() && !files.contains(&dockerfile) {
            files.push(dockerfile);
        }

        Ok(files)
    }

    async fn build(
        &self,
        artifacts: &[Artifact],
        tags: &ImageTags,
    ) -> Result<Vec<BuiltArtifact>, DevloopError> {
        let mut built = Vec::with_capacity(artifacts.len());

        for artifact in artifacts {
            let tag = tags
                .get(&artifact.name)
                .cloned()
                .unwrap_or_else(|| format!("{}:latest", artifact.image));

            built.push(self.build_one(artifact, &tag).await?);
        }

        Ok(built)
    }

    async fn prune(&self) -> Result<(), DevloopError> {
        let output = self
            .run(&["builder".to_string(), "prune".to_string(), "--force".to_string()])
            .await?;

        if output.status.success() {
            Ok(())
        } else {
            Err(DevloopError::PruneFailed {
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    fn labels(&self) -> HashMap<String, String> {
        let mut labels: HashMap<String, String> = self
            .labels
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        labels.insert("devloop.dev/builder".to_string(), "docker".to_string());
        labels
    }
}

#[async_trait]
impl ImageVerifier for DockerBuilder {
    async fn local_image_id(&self, image: &str) -> Result<Option<String>, DevloopError> {
        let output = self
            .run(&[
                "image".to_string(),
                "inspect".to_string(),
                "--format".to_string(),
                "{{.Id}}".to_string(),
                image.to_string(),
            ])
            .await?;

        Ok(stdout_value(&output))
    }

    async fn remote_digest(&self, image: &str) -> Result<Option<String>, DevloopError> {
        let output = self
            .run(&[
                "buildx".to_string(),
                "imagetools".to_string(),
                "inspect".to_string(),
                "--format".to_string(),
                "{{.Manifest.Digest}}".to_string(),
                image.to_string(),
            ])
            .await?;

        Ok(stdout_value(&output))
    }
}

/// Trimmed stdout of a successful command, `None` on failure or no output
fn stdout_value(output: &std::process::Output) -> Option<String> {
    if !output.status.success() {
        return None;
    }

    let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}
