// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 devloop contributors

//! Content hashing for artifact digests
//!
//! Uses BLAKE3 for fast, secure content hashing.

use blake3::Hasher;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::Digest;
use crate::artifact::Artifact;
use crate::builder::Builder;
use crate::errors::DevloopError;

/// Strategy for hashing a single dependency
pub trait FileHasher: Send + Sync {
    /// Digest of the path and its content. Renaming or editing the file
    /// must change the result.
    fn hash(&self, path: &Path) -> Result<Digest, DevloopError>;
}

/// Default file hasher
///
/// Hashes the path string together with the BLAKE3 digest of the file's
/// bytes. Directories are hashed as a tree.
#[derive(Debug, Clone, Copy, Default)]
pub struct Blake3FileHasher;

impl FileHasher for Blake3FileHasher {
    fn hash(&self, path: &Path) -> Result<Digest, DevloopError> {
        let metadata = std::fs::metadata(path).map_err(|e| read_error(path, e))?;

        let content = if metadata.is_dir() {
            hash_tree(path)?
        } else {
            hash_file(path)?
        };

        let mut hasher = Hasher::new();
        hasher.update(path.to_string_lossy().as_bytes());
        hasher.update(content.as_bytes());
        Ok(Digest::from_hasher(&hasher))
    }
}

/// Combines dependency digests and configuration into an artifact digest
#[derive(Clone)]
pub struct ArtifactHasher {
    file_hasher: Arc<dyn FileHasher>,
}

impl ArtifactHasher {
    pub fn new(file_hasher: Arc<dyn FileHasher>) -> Self {
        Self { file_hasher }
    }

    /// Compute the digest of an artifact.
    ///
    /// Dependencies come from the builder in no particular order. File reads
    /// run on the blocking pool.
    pub async fn hash_artifact(
        &self,
        builder: &dyn Builder,
        artifact: &Artifact,
    ) -> Result<Digest, DevloopError> {
        let dependencies = builder.dependencies_for(artifact).await?;
        let config = config_digest(artifact)?;
        let file_hasher = Arc::clone(&self.file_hasher);

        tokio::task::spawn_blocking(move || {
            hash_dependencies(file_hasher.as_ref(), &config, &dependencies)
        })
        .await
        .map_err(|e| DevloopError::HashFailed {
            artifact: artifact.name.clone(),
            reason: e.to_string(),
        })?
    }
}

impl Default for ArtifactHasher {
    fn default() -> Self {
        Self::new(Arc::new(Blake3FileHasher))
    }
}

/// Combine a configuration digest with the digests of `dependencies`.
///
/// Dependency digests are sorted before combining, so the order of
/// `dependencies` does not matter. An empty list hashes the configuration
/// alone.
pub fn hash_dependencies(
    file_hasher: &dyn FileHasher,
    config: &Digest,
    dependencies: &[PathBuf],
) -> Result<Digest, DevloopError> {
    let mut digests = dependencies
        .iter()
        .map(|dep| file_hasher.hash(dep))
        .collect::<Result<Vec<_>, _>>()?;
    digests.sort();

    let mut hasher = Hasher::new();
    hasher.update(config.as_str().as_bytes());
    for digest in &digests {
        hasher.update(digest.as_str().as_bytes());
    }

    Ok(Digest::from_hasher(&hasher))
}

/// Digest of the artifact's build configuration
pub fn config_digest(artifact: &Artifact) -> Result<Digest, DevloopError> {
    let json = serde_json::to_string(&artifact.build_config()).map_err(|e| {
        DevloopError::HashFailed {
            artifact: artifact.name.clone(),
            reason: format!("Failed to serialize build config: {}", e),
        }
    })?;

    Ok(hash_string(&json))
}

/// Compute a quick hash of a string
pub fn hash_string(s: &str) -> Digest {
    let mut hasher = Hasher::new();
    hasher.update(s.as_bytes());
    Digest::from_hasher(&hasher)
}

fn hash_file(path: &Path) -> Result<String, DevloopError> {
    let content = std::fs::read(path).map_err(|e| read_error(path, e))?;

    let mut hasher = Hasher::new();
    hasher.update(&content);
    Ok(hasher.finalize().to_hex().to_string())
}

/// Canonical digest of a directory tree: entries in sorted order, each
/// contributing its relative path and content digest.
///
/// Symbolic links inside the tree are never followed. They contribute
/// their target path instead, so link cycles terminate and retargeting a
/// link changes the digest.
fn hash_tree(root: &Path) -> Result<String, DevloopError> {
    let mut hasher = Hasher::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let mut entries = std::fs::read_dir(&dir)
            .map_err(|e| read_error(&dir, e))?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| read_error(&dir, e))?;
        entries.sort();

        let mut subdirs = Vec::new();
        for entry in entries {
            let relative = entry.strip_prefix(root).unwrap_or(&entry);
            hasher.update(relative.to_string_lossy().as_bytes());
            hasher.update(&[0]);

            let file_type = std::fs::symlink_metadata(&entry)
                .map_err(|e| read_error(&entry, e))?
                .file_type();

            if file_type.is_symlink() {
                let target = std::fs::read_link(&entry).map_err(|e| read_error(&entry, e))?;
                hasher.update(b"link:");
                hasher.update(target.to_string_lossy().as_bytes());
            } else if file_type.is_dir() {
                subdirs.push(entry);
            } else {
                hasher.update(hash_file(&entry)?.as_bytes());
            }
        }

        // Reversed so the stack visits subdirectories in sorted order.
        stack.extend(subdirs.into_iter().rev());
    }

    Ok(hasher.finalize().to_hex().to_string())
}

fn read_error(path: &Path, e: std::io::Error) -> DevloopError {
    DevloopError::FileReadError {
        path: path.to_path_buf(),
        error: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{BuiltArtifact, ImageTags};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Uses the path itself as the digest
    struct PathEchoHasher;

    impl FileHasher for PathEchoHasher {
        fn hash(&self, path: &Path) -> Result<Digest, DevloopError> {
            Ok(Digest::from_hex(path.to_string_lossy()))
        }
    }

    struct DepsBuilder {
        dependencies: Mutex<Vec<PathBuf>>,
    }

    impl DepsBuilder {
        fn new(deps: Vec<PathBuf>) -> Self {
            Self {
                dependencies: Mutex::new(deps),
            }
        }

        fn set(&self, deps: Vec<PathBuf>) {
            *self.dependencies.lock().unwrap() = deps;
        }
    }

    #[async_trait]
    impl Builder for DepsBuilder {
        async fn dependencies_for(&self, _: &Artifact) -> Result<Vec<PathBuf>, DevloopError> {
            Ok(self.dependencies.lock().unwrap().clone())
        }

        async fn build(&self, _: &[Artifact], _: &ImageTags) -> Result<Vec<BuiltArtifact>, DevloopError> {
            Ok(vec![])
        }

        async fn prune(&self) -> Result<(), DevloopError> {
            Ok(())
        }

        fn labels(&self) -> HashMap<String, String> {
            HashMap::new()
        }
    }

    #[tokio::test]
    async fn test_dependency_order_does_not_matter() {
        let hasher = ArtifactHasher::new(Arc::new(PathEchoHasher));
        let artifact = Artifact::new("web", "web");

        let builder = DepsBuilder::new(vec!["a".into(), "b".into()]);
        let first = hasher.hash_artifact(&builder, &artifact).await.unwrap();

        builder.set(vec!["b".into(), "a".into()]);
        let second = hasher.hash_artifact(&builder, &artifact).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.as_str().len(), 64);
    }

    #[tokio::test]
    async fn test_empty_dependencies_are_stable() {
        let hasher = ArtifactHasher::new(Arc::new(PathEchoHasher));
        let builder = DepsBuilder::new(vec![]);
        let artifact = Artifact::new("web", "web");

        let first = hasher.hash_artifact(&builder, &artifact).await.unwrap();
        let second = hasher.hash_artifact(&builder, &artifact).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_config_changes_digest() {
        let hasher = ArtifactHasher::new(Arc::new(PathEchoHasher));
        let builder = DepsBuilder::new(vec!["a".into()]);

        let plain = Artifact::new("web", "web");
        let mut with_arg = plain.clone();
        with_arg.build_args.insert("MODE".into(), "dev".into());
        let mut with_target = plain.clone();
        with_target.target = Some("debug".into());

        let a = hasher.hash_artifact(&builder, &plain).await.unwrap();
        let b = hasher.hash_artifact(&builder, &with_arg).await.unwrap();
        let c = hasher.hash_artifact(&builder, &with_target).await.unwrap();

        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(b, c);
    }

    #[tokio::test]
    async fn test_rename_and_content_changes() {
        let dir = TempDir::new().unwrap();
        let hasher = ArtifactHasher::default();
        let artifact = Artifact::new("web", "web");

        let foo = dir.path().join("foo");
        std::fs::write(&foo, "contents").unwrap();
        let builder = DepsBuilder::new(vec![foo.clone()]);
        let original = hasher.hash_artifact(&builder, &artifact).await.unwrap();

        // Unchanged
        let again = hasher.hash_artifact(&builder, &artifact).await.unwrap();
        assert_eq!(original, again);

        // Content change
        std::fs::write(&foo, "newcontents").unwrap();
        let edited = hasher.hash_artifact(&builder, &artifact).await.unwrap();
        assert_ne!(original, edited);

        // Rename only
        std::fs::write(&foo, "contents").unwrap();
        let newfoo = dir.path().join("newfoo");
        std::fs::rename(&foo, &newfoo).unwrap();
        builder.set(vec![newfoo.clone()]);
        let renamed = hasher.hash_artifact(&builder, &artifact).await.unwrap();
        assert_ne!(original, renamed);

        // Rename and content change
        std::fs::write(&newfoo, "newcontents").unwrap();
        let both = hasher.hash_artifact(&builder, &artifact).await.unwrap();
        assert_ne!(original, both);
        assert_ne!(renamed, both);
    }

    #[tokio::test]
    async fn test_unreadable_dependency_fails() {
        let dir = TempDir::new().unwrap();
        let hasher = ArtifactHasher::default();
        let builder = DepsBuilder::new(vec![dir.path().join("vanished")]);

        let result = hasher.hash_artifact(&builder, &Artifact::new("web", "web")).await;
        assert!(matches!(result, Err(DevloopError::FileReadError { .. })));
    }

    #[test]
    fn test_directory_tree_digest() {
        let dir = TempDir::new().unwrap();
        let tree = dir.path().join("assets");
        std::fs::create_dir_all(tree.join("img")).unwrap();
        std::fs::write(tree.join("img/logo.svg"), "<svg/>").unwrap();
        std::fs::write(tree.join("style.css"), "body{}").unwrap();

        let first = Blake3FileHasher.hash(&tree).unwrap();
        assert_eq!(first, Blake3FileHasher.hash(&tree).unwrap());

        std::fs::rename(tree.join("img/logo.svg"), tree.join("img/brand.svg")).unwrap();
        let renamed = Blake3FileHasher.hash(&tree).unwrap();
        assert_ne!(first, renamed);

        std::fs::write(tree.join("style.css"), "body{margin:0}").unwrap();
        assert_ne!(renamed, Blake3FileHasher.hash(&tree).unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn test_directory_symlinks_are_not_followed() {
        use std::os::unix::fs::symlink;

        let dir = TempDir::new().unwrap();
        let tree = dir.path().join("src");
        std::fs::create_dir_all(tree.join("nested")).unwrap();
        std::fs::write(tree.join("main.rs"), "fn main() {}").unwrap();
        std::fs::write(tree.join("other.rs"), "").unwrap();

        // A link back to the tree root would loop forever if followed.
        symlink(&tree, tree.join("nested/loop")).unwrap();
        // A dangling link is hashed by its target, not read.
        symlink(tree.join("missing"), tree.join("dangling")).unwrap();

        let first = Blake3FileHasher.hash(&tree).unwrap();
        assert_eq!(first, Blake3FileHasher.hash(&tree).unwrap());

        std::fs::remove_file(tree.join("nested/loop")).unwrap();
        symlink(tree.join("other.rs"), tree.join("nested/loop")).unwrap();
        assert_ne!(first, Blake3FileHasher.hash(&tree).unwrap());
    }

    #[test]
    fn test_hash_string() {
        assert_eq!(hash_string("hello"), hash_string("hello"));
        assert_ne!(hash_string("hello"), hash_string("world"));
    }
}
