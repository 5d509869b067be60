// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 devloop contributors

//! Artifact definitions
//!
//! The project file describes the images to build. This module loads it,
//! validates it and orders its artifacts by their declared requirements.

mod definition;
mod graph;
mod validation;

pub use definition::*;
pub use graph::ArtifactGraph;
pub use validation::{ProjectValidator, ValidationResult};
