use indexmap::{IndexMap, IndexSet};
use itertools::Itertools;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;

use crate::system::{Arg, System};

/// A vertex of the dependency graph: a declared type, or the synthesised
/// vertex standing for sequences over a declared type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Vertex {
    Type(String),
    Seq(String),
}

impl std::fmt::Display for Vertex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Type(name) => write!(f, "{name}"),
            Self::Seq(name) => write!(f, "[{name}]"),
        }
    }
}

/// The dependency graph of a system. Vertices are the declared types plus
/// one sequence vertex per sequence type. For every constructor of type `u`
/// there is an edge from `u` to each referenced vertex; references to
/// atomic types additionally get the reverse edge, since atoms are terminal
/// and always reachable from any dependent. Every sequence vertex carries a
/// self-loop and an edge to its element type.
pub struct DependencyGraph {
    graph: DiGraph<Vertex, ()>,
    indices: IndexMap<Vertex, NodeIndex>,
}

impl DependencyGraph {
    /// Builds the dependency graph of `system`.
    pub fn of(system: &System) -> Self {
        let mut graph = DiGraph::new();
        let mut indices = IndexMap::new();
        for name in system.types() {
            let vertex = Vertex::Type(name.to_string());
            let idx = graph.add_node(vertex.clone());
            indices.insert(vertex, idx);
        }
        for name in system.seq_types() {
            let vertex = Vertex::Seq(name.to_string());
            let idx = graph.add_node(vertex.clone());
            indices.insert(vertex, idx);
        }

        let atomic = system.atomic_types();
        for (ty, constructor) in system.constructors() {
            let from = indices[&Vertex::Type(ty.to_string())];
            for arg in &constructor.args {
                match arg {
                    Arg::Type(target) => {
                        let to = indices[&Vertex::Type(target.clone())];
                        graph.update_edge(from, to, ());
                        if atomic.contains(target.as_str()) {
                            graph.update_edge(to, from, ());
                        }
                    }
                    Arg::List(target) => {
                        let to = indices[&Vertex::Seq(target.clone())];
                        graph.update_edge(from, to, ());
                    }
                }
            }
        }
        for name in system.seq_types() {
            let seq = indices[&Vertex::Seq(name.to_string())];
            let elem = indices[&Vertex::Type(name.to_string())];
            graph.update_edge(seq, seq, ());
            graph.update_edge(seq, elem, ());
        }

        Self { graph, indices }
    }

    /// Number of vertices.
    pub fn vertex_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of (deduplicated) edges.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Returns `true` iff the graph has a vertex for `vertex`.
    pub fn contains(&self, vertex: &Vertex) -> bool {
        self.indices.contains_key(vertex)
    }

    /// The strongly connected components, each given as a set of vertices.
    pub fn sccs(&self) -> Vec<Vec<&Vertex>> {
        tarjan_scc(&self.graph)
            .into_iter()
            .map(|component| {
                component
                    .into_iter()
                    .map(|idx| &self.graph[idx])
                    .sorted()
                    .collect()
            })
            .collect()
    }

    /// Number of strongly connected components.
    pub fn scc_count(&self) -> usize {
        tarjan_scc(&self.graph).len()
    }

    /// Returns `true` iff every sequence vertex is reachable from some
    /// non-sequence vertex. This holds for every validated system, since a
    /// sequence vertex only exists because a constructor references it.
    pub fn sequences_reachable(&self) -> bool {
        let mut seen = IndexSet::new();
        for (vertex, idx) in &self.indices {
            if matches!(vertex, Vertex::Type(_)) {
                let mut dfs = Dfs::new(&self.graph, *idx);
                while let Some(node) = dfs.next(&self.graph) {
                    seen.insert(node);
                }
            }
        }
        self.indices
            .iter()
            .all(|(vertex, idx)| !matches!(vertex, Vertex::Seq(_)) || seen.contains(idx))
    }
}

impl std::fmt::Debug for DependencyGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}]",
            self.sccs()
                .into_iter()
                .map(|component| format!("{{{}}}", component.iter().join(", ")))
                .join(", ")
        )
    }
}
