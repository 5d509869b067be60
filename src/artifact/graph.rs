// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 devloop contributors

//! Artifact requirement graph
//!
//! Orders artifacts so that every artifact is built after the artifacts it
//! requires, and groups them into waves that can be built in parallel.

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::HashMap;

use crate::artifact::Artifact;
use crate::errors::DevloopError;

/// Requirement graph over a set of artifacts
pub struct ArtifactGraph {
    graph: DiGraph<usize, ()>,
    name_to_index: HashMap<String, NodeIndex>,
    index_to_name: HashMap<NodeIndex, String>,
}

impl ArtifactGraph {
    /// Build the graph, rejecting unknown requirements and cycles.
    ///
    /// Requirements naming an artifact outside `artifacts` are an error.
    pub fn build(artifacts: &[Artifact]) -> Result<Self, DevloopError> {
        let mut builder = Self {
            graph: DiGraph::new(),
            name_to_index: HashMap::new(),
            index_to_name: HashMap::new(),
        };

        for (idx, artifact) in artifacts.iter().enumerate() {
            let node = builder.graph.add_node(idx);
            builder.name_to_index.insert(artifact.name.clone(), node);
            builder.index_to_name.insert(node, artifact.name.clone());
        }

        for artifact in artifacts {
            let node = builder.name_to_index[&artifact.name];

            for required in &artifact.requires {
                let dep = builder.name_to_index.get(required).ok_or_else(|| {
                    DevloopError::UnknownRequirement {
                        artifact: artifact.name.clone(),
                        required: required.clone(),
                    }
                })?;

                if !builder.graph.contains_edge(*dep, node) {
                    builder.graph.add_edge(*dep, node, ());
                }
            }
        }

        builder.topological_order()?;

        Ok(builder)
    }

    /// Artifact indices in build order
    pub fn topological_order(&self) -> Result<Vec<usize>, DevloopError> {
        toposort(&self.graph, None)
            .map(|nodes| nodes.into_iter().map(|n| self.graph[n]).collect())
            .map_err(|cycle| DevloopError::CircularRequirement {
                artifacts: self.cycle_members(cycle.node_id()),
            })
    }

    /// Artifact indices grouped into waves.
    ///
    /// Every artifact in a wave only requires artifacts from earlier waves.
    pub fn waves(&self) -> Result<Vec<Vec<usize>>, DevloopError> {
        let order = toposort(&self.graph, None).map_err(|cycle| {
            DevloopError::CircularRequirement {
                artifacts: self.cycle_members(cycle.node_id()),
            }
        })?;

        let mut level: HashMap<NodeIndex, usize> = HashMap::new();
        let mut waves: Vec<Vec<usize>> = Vec::new();

        for node in order {
            let depth = self
                .graph
                .neighbors_directed(node, Direction::Incoming)
                .map(|n| level[&n] + 1)
                .max()
                .unwrap_or(0);

            level.insert(node, depth);
            if waves.len() <= depth {
                waves.resize_with(depth + 1, Vec::new);
            }
            waves[depth].push(self.graph[node]);
        }

        for wave in &mut waves {
            wave.sort_unstable();
        }

        Ok(waves)
    }

    fn cycle_members(&self, start: NodeIndex) -> Vec<String> {
        let mut members = vec![self.index_to_name[&start].clone()];
        let mut current = start;

        // Walk requirement edges until we return to the start.
        for _ in 0..self.graph.node_count() {
            let next = self
                .graph
                .neighbors_directed(current, Direction::Outgoing)
                .find(|n| petgraph::algo::has_path_connecting(&self.graph, *n, start, None));

            match next {
                Some(n) if n == start => break,
                Some(n) => {
                    members.push(self.index_to_name[&n].clone());
                    current = n;
                }
                None => break,
            }
        }

        members
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_artifacts(specs: Vec<(&str, Vec<&str>)>) -> Vec<Artifact> {
        specs
            .into_iter()
            .map(|(name, requires)| {
                let mut a = Artifact::new(name, name);
                a.requires = requires.into_iter().map(String::from).collect();
                a
            })
            .collect()
    }

    #[test]
    fn test_linear_order() {
        let artifacts = make_artifacts(vec![("c", vec!["b"]), ("b", vec!["a"]), ("a", vec![])]);

        let graph = ArtifactGraph::build(&artifacts).unwrap();
        let order: Vec<_> = graph
            .topological_order()
            .unwrap()
            .into_iter()
            .map(|i| artifacts[i].name.as_str())
            .collect();

        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_diamond_waves() {
        let artifacts = make_artifacts(vec![
            ("base", vec![]),
            ("api", vec!["base"]),
            ("web", vec!["base"]),
            ("e2e", vec!["api", "web"]),
            ("docs", vec![]),
        ]);

        let graph = ArtifactGraph::build(&artifacts).unwrap();
        let waves = graph.waves().unwrap();

        assert_eq!(waves, vec![vec![0, 4], vec![1, 2], vec![3]]);
    }

    #[test]
    fn test_cycle_detection() {
        let artifacts = make_artifacts(vec![("a", vec!["b"]), ("b", vec!["a"])]);

        match ArtifactGraph::build(&artifacts) {
            Err(DevloopError::CircularRequirement { artifacts }) => {
                assert_eq!(artifacts.len(), 2);
            }
            other => panic!("Expected CircularRequirement, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_unknown_requirement() {
        let artifacts = make_artifacts(vec![("a", vec!["ghost"])]);

        assert!(matches!(
            ArtifactGraph::build(&artifacts),
            Err(DevloopError::UnknownRequirement { .. })
        ));
    }
}
