// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 devloop contributors

//! Project validation
//!
//! Validates project configuration before a build round.

use regex::Regex;
use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;

use crate::artifact::{Artifact, ArtifactGraph, Project};
use crate::errors::DevloopError;

/// Image repository reference: optional registry host[:port], then
/// lowercase path components. Tags and digests are not allowed here.
fn image_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^(?:[a-zA-Z0-9.-]+(?::[0-9]+)?/)?[a-z0-9]+(?:[._-][a-z0-9]+)*(?:/[a-z0-9]+(?:[._-][a-z0-9]+)*)*$",
        )
        .expect("image reference pattern is valid")
    })
}

/// Project validator
pub struct ProjectValidator;

impl ProjectValidator {
    /// Validate a project configuration
    pub fn validate(project: &Project) -> ValidationResult {
        let mut result = ValidationResult::new();

        if project.artifacts.is_empty() {
            result.add_error("Project has no artifacts defined");
        }

        let mut seen_names = HashSet::new();
        for artifact in &project.artifacts {
            if !seen_names.insert(&artifact.name) {
                result.add_error(&format!("Duplicate artifact name: '{}'", artifact.name));
            }
        }

        // A fixed tag gives artifacts sharing a repository the same reference.
        if let Some(ref tag) = project.build.tag {
            let mut seen_images = HashSet::new();
            for artifact in &project.artifacts {
                if !seen_images.insert(&artifact.image) {
                    result.add_error(&format!(
                        "Artifact '{}': image '{}:{}' is already produced by another artifact",
                        artifact.name, artifact.image, tag
                    ));
                }
            }
        }

        match ArtifactGraph::build(&project.artifacts) {
            Ok(_) => {}
            Err(DevloopError::CircularRequirement { artifacts }) => {
                result.add_error(&format!("Circular requirement: {}", artifacts.join(" → ")));
            }
            Err(DevloopError::UnknownRequirement { artifact, required }) => {
                result.add_error(&format!(
                    "Artifact '{}' requires unknown artifact '{}'",
                    artifact, required
                ));
            }
            Err(e) => {
                result.add_error(&format!("Requirement graph error: {}", e));
            }
        }

        for artifact in &project.artifacts {
            Self::validate_artifact(artifact, &mut result);
        }

        if project.build.concurrency == 0 {
            result.add_warning("build.concurrency is 0; artifacts will be built one at a time");
        }

        result
    }

    fn validate_artifact(artifact: &Artifact, result: &mut ValidationResult) {
        if artifact.name.is_empty() {
            result.add_error("Artifact with empty name");
        }

        if artifact.image.is_empty() {
            result.add_error(&format!("Artifact '{}': image is empty", artifact.name));
        } else if !image_pattern().is_match(&artifact.image) {
            result.add_error(&format!(
                "Artifact '{}': '{}' is not a valid image repository (omit tags and digests)",
                artifact.name, artifact.image
            ));
        }

        if artifact.dependencies.iter().any(|p| p.trim().is_empty()) {
            result.add_error(&format!(
                "Artifact '{}': dependency pattern is empty",
                artifact.name
            ));
        }

        if artifact.requires.contains(&artifact.name) {
            result.add_error(&format!("Artifact '{}' requires itself", artifact.name));
        }
    }

    /// Check that build contexts exist (runtime validation)
    pub fn validate_contexts(project: &Project, base_path: &Path) -> Vec<String> {
        let mut missing = Vec::new();

        for artifact in &project.artifacts {
            let context = base_path.join(&artifact.context);
            if !context.is_dir() {
                missing.push(format!(
                    "Artifact '{}': context directory not found: {}",
                    artifact.name,
                    artifact.context.display()
                ));
                continue;
            }

            let dockerfile = context.join(&artifact.dockerfile);
            if !dockerfile.is_file() {
                missing.push(format!(
                    "Artifact '{}': Dockerfile not found: {}",
                    artifact.name,
                    dockerfile.display()
                ));
            }
        }

        missing
    }
}

/// Result of project validation
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }

    pub fn add_warning(&mut self, message: &str) {
        self.warnings.push(message.to_string());
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::BuildSettings;
    use tempfile::TempDir;

    fn project(artifacts: Vec<Artifact>) -> Project {
        Project {
            version: "1".into(),
            name: "test".into(),
            description: None,
            build: BuildSettings::default(),
            artifacts,
        }
    }

    #[test]
    fn test_validate_empty_project() {
        let result = ProjectValidator::validate(&project(vec![]));
        assert!(!result.is_valid());
        assert!(result.errors[0].contains("no artifacts"));
    }

    #[test]
    fn test_validate_duplicate_names() {
        let result = ProjectValidator::validate(&project(vec![
            Artifact::new("web", "web"),
            Artifact::new("web", "web2"),
        ]));

        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.contains("Duplicate")));
    }

    #[test]
    fn test_validate_shared_image_with_fixed_tag() {
        let mut shared = project(vec![Artifact::new("web", "shop"), Artifact::new("api", "shop")]);
        assert!(ProjectValidator::validate(&shared).is_valid());

        shared.build.tag = Some("dev".into());
        let result = ProjectValidator::validate(&shared);
        assert!(!result.is_valid());
        assert!(result.errors[0].contains("'shop:dev'"));
        assert!(result.errors[0].contains("'api'"));
    }

    #[test]
    fn test_validate_image_references() {
        let valid = [
            "web",
            "library/nginx",
            "registry.example.com:5000/team/web-app",
            "gcr.io/proj/api_v2",
        ];
        for image in valid {
            let result = ProjectValidator::validate(&project(vec![Artifact::new("a", image)]));
            assert!(result.is_valid(), "{image} should be valid: {:?}", result.errors);
        }

        let invalid = ["Web", "web:latest", "web@sha256:abc", "-web"];
        for image in invalid {
            let result = ProjectValidator::validate(&project(vec![Artifact::new("a", image)]));
            assert!(!result.is_valid(), "{image} should be invalid");
        }
    }

    #[test]
    fn test_validate_unknown_requirement() {
        let mut api = Artifact::new("api", "api");
        api.requires = vec!["base".into()];

        let result = ProjectValidator::validate(&project(vec![api]));
        assert!(result.errors.iter().any(|e| e.contains("unknown artifact 'base'")));
    }

    #[test]
    fn test_validate_contexts() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("web")).unwrap();
        std::fs::write(dir.path().join("web/Dockerfile"), "FROM scratch\n").unwrap();
        std::fs::create_dir(dir.path().join("api")).unwrap();

        let mut web = Artifact::new("web", "web");
        web.context = "web".into();
        let mut api = Artifact::new("api", "api");
        api.context = "api".into();
        let mut ghost = Artifact::new("ghost", "ghost");
        ghost.context = "ghost".into();

        let missing = ProjectValidator::validate_contexts(&project(vec![web, api, ghost]), dir.path());
        assert_eq!(missing.len(), 2);
        assert!(missing[0].contains("Dockerfile not found"));
        assert!(missing[1].contains("context directory not found"));
    }
}
