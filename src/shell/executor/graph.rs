use std::collections::BTreeSet;
use std::fmt;

use log::debug;

use super::hazard::HazardSet;
use crate::shell::parser::ast::Command;

/// One top-level tree of the forest, referenced by its position.
#[derive(Debug, Clone)]
pub struct GraphNode {
    pub index: usize,
    pub label: String,
    pub hazards: HazardSet,
    /// Earlier trees that must finish first.
    pub dependencies: BTreeSet<usize>,
    /// Later trees waiting on this one.
    pub dependents: BTreeSet<usize>,
}

/// Dependency DAG over a forest. Edges always point from a later tree to
/// an earlier one, so program order is a valid serialization.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: Vec<GraphNode>,
}

impl DependencyGraph {
    pub fn build(forest: &[Command]) -> Self {
        let mut nodes: Vec<GraphNode> = forest
            .iter()
            .enumerate()
            .map(|(index, command)| GraphNode {
                index,
                label: command.to_string(),
                hazards: HazardSet::of(command),
                dependencies: BTreeSet::new(),
                dependents: BTreeSet::new(),
            })
            .collect();

        for later in 0..nodes.len() {
            for earlier in 0..later {
                if let Some(hazard) = nodes[later].hazards.hazard_with(&nodes[earlier].hazards) {
                    debug!("依赖边 {} -> {} ({})", later, earlier, hazard);
                    nodes[later].dependencies.insert(earlier);
                    nodes[earlier].dependents.insert(later);
                }
            }
        }

        DependencyGraph { nodes }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, index: usize) -> Option<&GraphNode> {
        self.nodes.get(index)
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    /// Nodes with no dependencies: the first wave.
    pub fn roots(&self) -> impl Iterator<Item = usize> + '_ {
        self.nodes
            .iter()
            .filter(|node| node.dependencies.is_empty())
            .map(|node| node.index)
    }

    pub fn depends_on(&self, later: usize, earlier: usize) -> bool {
        self.node(later)
            .is_some_and(|node| node.dependencies.contains(&earlier))
    }
}

impl fmt::Display for DependencyGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for node in &self.nodes {
            let deps: Vec<String> = node.dependencies.iter().map(|d| d.to_string()).collect();
            writeln!(f, "{}: {} <- [{}]", node.index, node.label, deps.join(", "))?;
        }
        Ok(())
    }
}
