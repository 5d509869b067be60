// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 devloop contributors

//! Image tag generation

use std::collections::HashMap;

use crate::artifact::Artifact;
use crate::cache::Digest;

/// Artifact name to full image reference
pub type ImageTags = HashMap<String, String>;

/// Number of digest characters used in a digest tag
const DIGEST_TAG_LEN: usize = 12;

/// Tag an image with the leading characters of its artifact digest
pub fn digest_tag(artifact: &Artifact, digest: &Digest) -> String {
    let short = &digest.as_str()[..DIGEST_TAG_LEN.min(digest.as_str().len())];
    format!("{}:{}", artifact.image, short)
}

/// Tag every artifact with the same fixed tag
pub fn fixed_tags(artifacts: &[Artifact], tag: &str) -> ImageTags {
    artifacts
        .iter()
        .map(|a| (a.name.clone(), format!("{}:{}", a.image, tag)))
        .collect()
}
