//! Sample lineage graph: breadth-first construction from the remote
//! parent/child links, plus ancestor/descendant/path queries.
//!
//! Nodes are sample unique ids and edges always point parent -> child. The
//! remote service does not guarantee an acyclic lineage, so traversal relies on
//! a visited set and queries never assume a DAG.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Bfs, Reversed};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::crucible::CrucibleClient;
use crate::domain::Sample;
use crate::error::CrucibleError;

#[derive(Debug, Clone, Default)]
pub struct LineageGraph {
    graph: DiGraph<String, ()>,
    index: HashMap<String, NodeIndex>,
}

impl LineageGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `id` if absent and returns its index.
    pub fn add_node(&mut self, id: &str) -> NodeIndex {
        if let Some(idx) = self.index.get(id) {
            return *idx;
        }
        let idx = self.graph.add_node(id.to_string());
        self.index.insert(id.to_string(), idx);
        idx
    }

    /// Adds the edge `parent -> child`, creating either endpoint if needed.
    /// Repeated edges collapse into one.
    pub fn add_edge(&mut self, parent: &str, child: &str) {
        let from = self.add_node(parent);
        let to = self.add_node(child);
        self.graph.update_edge(from, to, ());
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn contains_edge(&self, parent: &str, child: &str) -> bool {
        match (self.index.get(parent), self.index.get(child)) {
            (Some(from), Some(to)) => self.graph.contains_edge(*from, *to),
            _ => false,
        }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Node ids in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &str> + '_ {
        self.graph.node_indices().map(|idx| self.graph[idx].as_str())
    }

    /// `(parent, child)` pairs in insertion order.
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.graph.raw_edges().iter().map(|edge| {
            (
                self.graph[edge.source()].as_str(),
                self.graph[edge.target()].as_str(),
            )
        })
    }

    pub fn node_set(&self) -> BTreeSet<String> {
        self.nodes().map(str::to_string).collect()
    }

    pub fn edge_set(&self) -> BTreeSet<(String, String)> {
        self.edges()
            .map(|(parent, child)| (parent.to_string(), child.to_string()))
            .collect()
    }

    /// Merges every node and edge of `other` into `self`.
    pub fn merge(&mut self, other: &LineageGraph) {
        for id in other.nodes() {
            self.add_node(id);
        }
        for (parent, child) in other.edges() {
            self.add_edge(parent, child);
        }
    }

    pub fn union(mut self, other: &LineageGraph) -> Self {
        self.merge(other);
        self
    }

    fn node_index(&self, id: &str) -> Result<NodeIndex, CrucibleError> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| CrucibleError::SampleNotInGraph(id.to_string()))
    }

    /// All nodes with a directed path to `id`. Never contains `id` itself,
    /// even when it sits on a cycle.
    pub fn ancestors(&self, id: &str) -> Result<BTreeSet<String>, CrucibleError> {
        let start = self.node_index(id)?;
        let reversed = Reversed(&self.graph);
        let mut bfs = Bfs::new(reversed, start);
        let mut found = BTreeSet::new();
        while let Some(idx) = bfs.next(reversed) {
            if idx != start {
                found.insert(self.graph[idx].clone());
            }
        }
        Ok(found)
    }

    /// All nodes reachable from `id`, excluding `id`.
    pub fn descendants(&self, id: &str) -> Result<BTreeSet<String>, CrucibleError> {
        let start = self.node_index(id)?;
        let mut bfs = Bfs::new(&self.graph, start);
        let mut found = BTreeSet::new();
        while let Some(idx) = bfs.next(&self.graph) {
            if idx != start {
                found.insert(self.graph[idx].clone());
            }
        }
        Ok(found)
    }

    /// First simple path from `from` to `to`.
    ///
    /// Paths are enumerated depth-first with children visited in ascending id
    /// order, so among several lineages the lexicographically smallest one by
    /// node ids wins. `path(x, x)` is `[x]`; `None` means no path exists.
    pub fn path(&self, from: &str, to: &str) -> Result<Option<Vec<String>>, CrucibleError> {
        let start = self.node_index(from)?;
        let goal = self.node_index(to)?;
        if start == goal {
            return Ok(Some(vec![from.to_string()]));
        }

        // Only nodes that can still reach `goal` are worth descending into.
        let mut reaches_goal = HashSet::new();
        let reversed = Reversed(&self.graph);
        let mut bfs = Bfs::new(reversed, goal);
        while let Some(idx) = bfs.next(reversed) {
            reaches_goal.insert(idx);
        }

        // A node exhausted without reaching `goal` stays a dead end for every
        // later prefix, so it is never descended into again.
        let mut dead_ends: HashSet<NodeIndex> = HashSet::new();
        let mut path = vec![start];
        let mut on_path: HashSet<NodeIndex> = HashSet::from([start]);
        let mut stack = vec![self.sorted_children(start)];
        while let Some(frontier) = stack.last_mut() {
            let Some(next) = frontier.pop_front() else {
                stack.pop();
                if let Some(done) = path.pop() {
                    on_path.remove(&done);
                    dead_ends.insert(done);
                }
                continue;
            };
            if next == goal {
                path.push(next);
                return Ok(Some(
                    path.into_iter()
                        .map(|idx| self.graph[idx].clone())
                        .collect(),
                ));
            }
            if reaches_goal.contains(&next)
                && !dead_ends.contains(&next)
                && on_path.insert(next)
            {
                path.push(next);
                stack.push(self.sorted_children(next));
            }
        }
        Ok(None)
    }

    fn sorted_children(&self, idx: NodeIndex) -> VecDeque<NodeIndex> {
        let mut children: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(idx, Direction::Outgoing)
            .collect();
        children.sort_by(|a, b| self.graph[*a].cmp(&self.graph[*b]));
        children.dedup();
        children.into()
    }

    /// Induced subgraph over the given ids. Ids absent from the graph are
    /// ignored.
    pub fn subgraph<'a, I>(&self, ids: I) -> LineageGraph
    where
        I: IntoIterator<Item = &'a str>,
    {
        let keep: HashSet<&str> = ids
            .into_iter()
            .filter(|id| self.contains_node(id))
            .collect();
        let mut sub = LineageGraph::new();
        for id in self.nodes().filter(|id| keep.contains(id)) {
            sub.add_node(id);
        }
        for (parent, child) in self.edges() {
            if keep.contains(parent) && keep.contains(child) {
                sub.add_edge(parent, child);
            }
        }
        sub
    }

    pub fn to_node_link(&self) -> NodeLinkData {
        NodeLinkData {
            directed: true,
            multigraph: false,
            graph: Map::new(),
            nodes: self
                .nodes()
                .map(|id| NodeLinkNode { id: id.to_string() })
                .collect(),
            links: self
                .edges()
                .map(|(source, target)| NodeLinkEdge {
                    source: source.to_string(),
                    target: target.to_string(),
                })
                .collect(),
        }
    }

    pub fn from_node_link(data: &NodeLinkData) -> Self {
        let mut graph = LineageGraph::new();
        for node in &data.nodes {
            graph.add_node(&node.id);
        }
        for link in &data.links {
            graph.add_edge(&link.source, &link.target);
        }
        graph
    }
}

/// Node-link document, compatible with the networkx `node_link_data` layout.
/// Both `links` and `edges` are accepted when reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeLinkData {
    #[serde(default = "default_directed")]
    pub directed: bool,
    #[serde(default)]
    pub multigraph: bool,
    #[serde(default)]
    pub graph: Map<String, Value>,
    pub nodes: Vec<NodeLinkNode>,
    #[serde(alias = "edges")]
    pub links: Vec<NodeLinkEdge>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeLinkNode {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeLinkEdge {
    pub source: String,
    pub target: String,
}

fn default_directed() -> bool {
    true
}

/// Breadth-first expansion from `seeds`.
///
/// `neighbours` lists the samples linked to an id in `direction`: outgoing
/// means children (edge `id -> child`), incoming means parents (edge
/// `parent -> id`). The visited check happens when an id is popped, so ids
/// may be queued more than once. A failed lookup keeps the node and whatever
/// edges it already has and the traversal moves on.
fn breadth_first<F>(
    seeds: impl IntoIterator<Item = String>,
    direction: Direction,
    mut neighbours: F,
) -> LineageGraph
where
    F: FnMut(&str) -> Result<Vec<Sample>, CrucibleError>,
{
    let mut graph = LineageGraph::new();
    let mut queue: VecDeque<String> = seeds.into_iter().collect();
    let mut visited: HashSet<String> = HashSet::new();

    while let Some(sample_id) = queue.pop_front() {
        if visited.contains(&sample_id) {
            tracing::trace!(%sample_id, "already graphed");
            continue;
        }
        graph.add_node(&sample_id);
        visited.insert(sample_id.clone());

        let linked = match neighbours(&sample_id) {
            Ok(linked) => linked,
            Err(err) => {
                tracing::warn!(
                    %sample_id,
                    ?direction,
                    error = %err,
                    "failed to read linked samples"
                );
                continue;
            }
        };
        tracing::debug!(%sample_id, ?direction, linked = linked.len(), "graphing sample");
        for sample in linked {
            match direction {
                Direction::Outgoing => graph.add_edge(&sample_id, &sample.unique_id),
                Direction::Incoming => graph.add_edge(&sample.unique_id, &sample_id),
            }
            queue.push_back(sample.unique_id);
        }
    }
    graph
}

/// Descendant edges reachable from `seeds` through repeated child lookups.
pub fn expand_children<C>(client: &C, seeds: impl IntoIterator<Item = String>) -> LineageGraph
where
    C: CrucibleClient + ?Sized,
{
    breadth_first(seeds, Direction::Outgoing, |id| {
        client.list_children_of_sample(id)
    })
}

/// Ancestor edges reachable from `seeds` through repeated parent lookups.
pub fn expand_parents<C>(client: &C, seeds: impl IntoIterator<Item = String>) -> LineageGraph
where
    C: CrucibleClient + ?Sized,
{
    breadth_first(seeds, Direction::Incoming, |id| {
        client.list_parents_of_sample(id)
    })
}

/// Whole-project graph seeded with every project sample. Every seed ends up
/// as a node even if it has no links.
pub fn build_project_graph<C>(client: &C, samples: &[Sample]) -> LineageGraph
where
    C: CrucibleClient + ?Sized,
{
    let graph = expand_children(
        client,
        samples.iter().map(|sample| sample.unique_id.clone()),
    );
    tracing::info!(
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        "built project lineage graph"
    );
    graph
}

/// Lineage around a single sample: descendants and ancestors walked
/// independently and merged.
pub fn build_sample_graph<C>(client: &C, sample_id: &str) -> LineageGraph
where
    C: CrucibleClient + ?Sized,
{
    let down = expand_children(client, [sample_id.to_string()]);
    let up = expand_parents(client, [sample_id.to_string()]);
    down.union(&up)
}

/// Orders ids by unique id, which is time ordered upstream.
pub fn sort_by_creation(ids: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut ids: Vec<String> = ids.into_iter().collect();
    ids.sort();
    ids.dedup();
    ids
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn graph(edges: &[(&str, &str)]) -> LineageGraph {
        let mut graph = LineageGraph::new();
        for (parent, child) in edges {
            graph.add_edge(parent, child);
        }
        graph
    }

    #[test]
    fn duplicate_edges_collapse() {
        let mut g = graph(&[("A", "B"), ("A", "B")]);
        g.add_node("A");
        assert_eq!(g.node_count(), 2);
        assert_eq!(g.edge_count(), 1);
    }

    #[test]
    fn ancestors_exclude_self_on_cycle() {
        let g = graph(&[("A", "B"), ("B", "A")]);
        assert_eq!(g.ancestors("A").unwrap(), BTreeSet::from(["B".to_string()]));
        assert_eq!(g.descendants("A").unwrap(), BTreeSet::from(["B".to_string()]));
    }

    #[test]
    fn unknown_node_is_not_found() {
        let g = graph(&[("A", "B")]);
        assert_matches!(g.ancestors("Z"), Err(CrucibleError::SampleNotInGraph(_)));
        assert_matches!(g.descendants("Z"), Err(CrucibleError::SampleNotInGraph(_)));
        assert_matches!(g.path("A", "Z"), Err(CrucibleError::SampleNotInGraph(_)));
    }

    #[test]
    fn isolated_node_has_no_relatives() {
        let mut g = LineageGraph::new();
        g.add_node("A");
        assert!(g.ancestors("A").unwrap().is_empty());
        assert!(g.descendants("A").unwrap().is_empty());
    }

    #[test]
    fn path_prefers_smallest_child_first() {
        // Diamond: A -> C -> D and A -> B -> D.
        let g = graph(&[("A", "C"), ("C", "D"), ("A", "B"), ("B", "D")]);
        assert_eq!(
            g.path("A", "D").unwrap(),
            Some(vec!["A".to_string(), "B".to_string(), "D".to_string()])
        );
    }

    #[test]
    fn path_is_depth_first_not_shortest() {
        // A -> B -> C -> E and A -> D -> E; DFS through B wins although
        // the path through D is shorter.
        let g = graph(&[("A", "D"), ("D", "E"), ("A", "B"), ("B", "C"), ("C", "E")]);
        assert_eq!(
            g.path("A", "E").unwrap(),
            Some(vec![
                "A".to_string(),
                "B".to_string(),
                "C".to_string(),
                "E".to_string()
            ])
        );
    }

    #[test]
    fn path_survives_cycles() {
        let g = graph(&[("A", "B"), ("B", "A"), ("B", "C")]);
        assert_eq!(
            g.path("A", "C").unwrap(),
            Some(vec!["A".to_string(), "B".to_string(), "C".to_string()])
        );
        assert_eq!(g.path("C", "A").unwrap(), None);
        assert_eq!(g.path("A", "A").unwrap(), Some(vec!["A".to_string()]));
    }

    #[test]
    fn path_through_blocked_cycle_stays_fast() {
        // Fourteen fully connected nodes whose only way to `z` runs back
        // through `a`, which is already on the path. Without remembering dead
        // ends every ordering of the clique would be tried.
        let clique: Vec<String> = (1..=14).map(|i| format!("k{i:02}")).collect();
        let mut g = LineageGraph::new();
        g.add_edge("a", "z");
        for from in &clique {
            g.add_edge("a", from);
            g.add_edge(from, "a");
            for to in &clique {
                if from != to {
                    g.add_edge(from, to);
                }
            }
        }
        assert_eq!(
            g.path("a", "z").unwrap(),
            Some(vec!["a".to_string(), "z".to_string()])
        );
        assert_eq!(
            g.path("k07", "z").unwrap(),
            Some(vec!["k07".to_string(), "a".to_string(), "z".to_string()])
        );
    }

    #[test]
    fn subgraph_is_induced() {
        let g = graph(&[("A", "B"), ("B", "C"), ("A", "C"), ("C", "D")]);
        let sub = g.subgraph(["A", "C", "D", "missing"]);
        assert_eq!(
            sub.node_set(),
            BTreeSet::from(["A".to_string(), "C".to_string(), "D".to_string()])
        );
        assert!(sub.contains_edge("A", "C"));
        assert!(sub.contains_edge("C", "D"));
        assert!(!sub.contains_node("B"));
        assert_eq!(sub.edge_count(), 2);
    }

    #[test]
    fn node_link_accepts_edges_alias() {
        let data: NodeLinkData = serde_json::from_str(
            r#"{"nodes":[{"id":"A"},{"id":"B"},{"id":"C"}],"edges":[{"source":"A","target":"B"}]}"#,
        )
        .unwrap();
        let g = LineageGraph::from_node_link(&data);
        assert_eq!(g.node_count(), 3);
        assert!(g.contains_edge("A", "B"));

        let back = g.to_node_link();
        assert!(back.directed);
        assert_eq!(back.links.len(), 1);
    }

    #[test]
    fn sort_by_creation_orders_ids() {
        let sorted = sort_by_creation(["0c".to_string(), "0a".to_string(), "0b".to_string()]);
        assert_eq!(sorted, vec!["0a", "0b", "0c"]);
    }
}
