// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 devloop contributors

//! Project definition structures
//!
//! Defines the schema for .devloop.yaml files.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::errors::DevloopError;

/// Project definition from .devloop.yaml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    /// Project file version (for future compatibility)
    #[serde(default = "default_version")]
    pub version: String,

    /// Project name
    pub name: String,

    /// Project description
    #[serde(default)]
    pub description: Option<String>,

    /// Build settings shared by all artifacts
    #[serde(default)]
    pub build: BuildSettings,

    /// Artifacts to build
    pub artifacts: Vec<Artifact>,
}

fn default_version() -> String {
    "1".to_string()
}

impl Project {
    /// Load project from a YAML file
    pub fn from_file(path: &Path) -> Result<Self, DevloopError> {
        let content = std::fs::read_to_string(path).map_err(|e| DevloopError::FileReadError {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::from_yaml(&content)
    }

    /// Parse project from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, DevloopError> {
        serde_yaml::from_str(yaml).map_err(Into::into)
    }

    /// Serialize project to YAML
    pub fn to_yaml(&self) -> Result<String, DevloopError> {
        serde_yaml::to_string(self).map_err(Into::into)
    }

    /// Get an artifact by name
    pub fn get_artifact(&self, name: &str) -> Option<&Artifact> {
        self.artifacts.iter().find(|a| a.name == name)
    }

    /// Get all artifact names
    pub fn artifact_names(&self) -> Vec<&str> {
        self.artifacts.iter().map(|a| a.name.as_str()).collect()
    }

    /// Restrict the project to the named artifacts.
    ///
    /// Required artifacts of a selected artifact are kept as well, so the
    /// resulting set still builds in a valid order.
    pub fn select(&self, names: &[String]) -> Result<Vec<Artifact>, DevloopError> {
        if names.is_empty() {
            return Ok(self.artifacts.clone());
        }

        let mut wanted: Vec<&str> = Vec::new();
        let mut queue: Vec<&str> = names.iter().map(String::as_str).collect();

        while let Some(name) = queue.pop() {
            if wanted.contains(&name) {
                continue;
            }
            let artifact = self
                .get_artifact(name)
                .ok_or_else(|| DevloopError::ArtifactNotFound {
                    artifact: name.to_string(),
                })?;
            wanted.push(name);
            queue.extend(artifact.requires.iter().map(String::as_str));
        }

        Ok(self
            .artifacts
            .iter()
            .filter(|a| wanted.contains(&a.name.as_str()))
            .cloned()
            .collect())
    }
}

/// Build settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildSettings {
    /// Number of artifacts built at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Push built images to their registry
    #[serde(default)]
    pub push: bool,

    /// Fixed tag for every image instead of digest-derived tags
    #[serde(default)]
    pub tag: Option<String>,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            push: false,
            tag: None,
        }
    }
}

fn default_concurrency() -> usize {
    1
}

/// A buildable container image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Artifact name (must be unique within the project)
    pub name: String,

    /// Image repository, without tag
    pub image: String,

    /// Build context directory
    #[serde(default = "default_context")]
    pub context: PathBuf,

    /// Dockerfile path, relative to the context
    #[serde(default = "default_dockerfile")]
    pub dockerfile: PathBuf,

    /// Build arguments
    #[serde(default)]
    pub build_args: BTreeMap<String, String>,

    /// Multi-stage build target
    #[serde(default)]
    pub target: Option<String>,

    /// Glob patterns, relative to the context, selecting the build inputs
    #[serde(default = "default_dependencies")]
    pub dependencies: Vec<String>,

    /// Artifacts that must be built before this one
    #[serde(default)]
    pub requires: Vec<String>,
}

fn default_context() -> PathBuf {
    PathBuf::from(".")
}

fn default_dockerfile() -> PathBuf {
    PathBuf::from("Dockerfile")
}

fn default_dependencies() -> Vec<String> {
    vec!["**/*".to_string()]
}

impl Artifact {
    /// Create an artifact with default build settings
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            context: default_context(),
            dockerfile: default_dockerfile(),
            build_args: BTreeMap::new(),
            target: None,
            dependencies: default_dependencies(),
            requires: vec![],
        }
    }

    /// The part of the artifact that affects the build output.
    ///
    /// Dependency patterns are excluded: the files they select are hashed
    /// directly.
    pub fn build_config(&self) -> BuildConfig<'_> {
        BuildConfig {
            image: &self.image,
            context: &self.context,
            dockerfile: &self.dockerfile,
            build_args: &self.build_args,
            target: self.target.as_deref(),
        }
    }
}

/// Build-configuration fragment hashed into an artifact's digest
#[derive(Debug, Clone, Serialize)]
pub struct BuildConfig<'a> {
    pub image: &'a str,
    pub context: &'a Path,
    pub dockerfile: &'a Path,
    pub build_args: &'a BTreeMap<String, String>,
    pub target: Option<&'a str>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_project() {
        let yaml = r#"
version: "1"
name: "shop"
artifacts:
  - name: "web"
    image: "registry.example.com/web"
    context: web
"#;

        let project = Project::from_yaml(yaml).unwrap();
        assert_eq!(project.name, "shop");
        assert_eq!(project.artifacts.len(), 1);

        let web = &project.artifacts[0];
        assert_eq!(web.dockerfile, PathBuf::from("Dockerfile"));
        assert_eq!(web.dependencies, vec!["**/*".to_string()]);
        assert_eq!(project.build.concurrency, 1);
    }

    #[test]
    fn test_parse_build_settings_and_args() {
        let yaml = r#"
name: "shop"
build:
  concurrency: 4
  push: true
  tag: dev
artifacts:
  - name: api
    image: api
    build_args:
      MODE: dev
    target: runtime
    requires: [base]
  - name: base
    image: base
"#;

        let project = Project::from_yaml(yaml).unwrap();
        assert_eq!(project.build.concurrency, 4);
        assert!(project.build.push);
        assert_eq!(project.build.tag.as_deref(), Some("dev"));

        let api = project.get_artifact("api").unwrap();
        assert_eq!(api.build_args["MODE"], "dev");
        assert_eq!(api.target.as_deref(), Some("runtime"));
        assert_eq!(api.requires, vec!["base".to_string()]);
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let yaml = r#"
name: "shop"
deploy:
  kubectl: {}
artifacts:
  - name: web
    image: web
    sync: true
"#;

        assert!(Project::from_yaml(yaml).is_ok());
    }

    #[test]
    fn test_select_includes_requirements() {
        let mut api = Artifact::new("api", "api");
        api.requires = vec!["base".into()];
        let project = Project {
            version: "1".into(),
            name: "shop".into(),
            description: None,
            build: BuildSettings::default(),
            artifacts: vec![Artifact::new("base", "base"), api, Artifact::new("web", "web")],
        };

        let selected = project.select(&["api".to_string()]).unwrap();
        let names: Vec<_> = selected.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["base", "api"]);

        assert!(matches!(
            project.select(&["nope".to_string()]),
            Err(DevloopError::ArtifactNotFound { .. })
        ));
    }

    #[test]
    fn test_round_trip_yaml() {
        let project = Project {
            version: "1".into(),
            name: "test".into(),
            description: Some("A test project".into()),
            build: BuildSettings::default(),
            artifacts: vec![Artifact::new("web", "web")],
        };

        let yaml = project.to_yaml().unwrap();
        let parsed = Project::from_yaml(&yaml).unwrap();

        assert_eq!(parsed.name, project.name);
        assert_eq!(parsed.artifacts, project.artifacts);
    }
}
