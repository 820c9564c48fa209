use std::collections::{BTreeSet, HashMap, HashSet};

use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::cache::ProjectCache;
use crate::crucible::CrucibleClient;
use crate::domain::{Dataset, short_id};
use crate::error::CrucibleError;
use crate::lineage::LineageGraph;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Sample,
    Dataset,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisNode {
    pub id: String,
    pub label: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<NodeKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measurement: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisEdge {
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visualization {
    pub nodes: Vec<VisNode>,
    pub edges: Vec<VisEdge>,
    #[serde(rename = "centerNodeId")]
    pub center_node_id: String,
    #[serde(
        rename = "centerNodeType",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub center_node_type: Option<NodeKind>,
}

#[derive(Debug, Clone, Copy)]
pub struct VisualizationOptions {
    pub include_datasets: bool,
    pub thumbnail_workers: usize,
}

/// Lineage neighbourhood of `center` as a node/edge payload.
///
/// Sample nodes are ordered by unique id, then dataset nodes in order of first
/// reference. Sample details come from `project`; samples outside it keep a
/// truncated-id label.
pub fn build_visualization<C>(
    client: &C,
    graph: &LineageGraph,
    project: &ProjectCache,
    center: &str,
    options: VisualizationOptions,
) -> Result<Visualization, CrucibleError>
where
    C: CrucibleClient + ?Sized,
{
    let mut members = graph.ancestors(center)?;
    members.extend(graph.descendants(center)?);
    members.insert(center.to_string());

    let sub = graph.subgraph(members.iter().map(String::as_str));
    let mut nodes: Vec<VisNode> = members
        .iter()
        .map(|id| sample_node(project, id))
        .collect();
    let mut edges: Vec<VisEdge> = sub
        .edge_set()
        .into_iter()
        .map(|(source, target)| VisEdge { source, target })
        .collect();

    if options.include_datasets {
        let (dataset_nodes, dataset_edges) = dataset_layer(project, &members);
        let ids: Vec<String> = dataset_nodes.iter().map(|node| node.id.clone()).collect();
        let thumbnails = fetch_thumbnails(client, &ids, options.thumbnail_workers);
        nodes.extend(dataset_nodes.into_iter().map(|mut node| {
            node.thumbnail = thumbnails.get(&node.id).cloned();
            node
        }));
        edges.extend(dataset_edges);
    }

    tracing::debug!(
        center,
        nodes = nodes.len(),
        edges = edges.len(),
        "built lineage visualization"
    );
    Ok(Visualization {
        nodes,
        edges,
        center_node_id: center.to_string(),
        center_node_type: Some(NodeKind::Sample),
    })
}

fn sample_node(project: &ProjectCache, id: &str) -> VisNode {
    let sample = project.samples_by_id.get(id);
    VisNode {
        id: id.to_string(),
        label: sample
            .map(|sample| sample.display_label())
            .unwrap_or_else(|| short_id(id)),
        kind: Some(NodeKind::Sample),
        description: sample.and_then(|sample| sample.description.clone()),
        measurement: None,
        thumbnail: None,
    }
}

fn dataset_layer(
    project: &ProjectCache,
    samples: &BTreeSet<String>,
) -> (Vec<VisNode>, Vec<VisEdge>) {
    let mut nodes = Vec::new();
    let mut edges = Vec::new();
    let mut seen = HashSet::new();
    let mut linked = HashSet::new();
    for sample_id in samples {
        let Some(sample) = project.samples_by_id.get(sample_id) else {
            continue;
        };
        for reference in &sample.datasets {
            if seen.insert(reference.unique_id.clone()) {
                let dataset = project
                    .datasets_by_id
                    .get(&reference.unique_id)
                    .cloned()
                    .unwrap_or_else(|| Dataset::from(reference));
                nodes.push(VisNode {
                    id: dataset.unique_id.clone(),
                    label: dataset.display_label(),
                    kind: Some(NodeKind::Dataset),
                    description: None,
                    measurement: dataset.measurement.or_else(|| reference.measurement.clone()),
                    thumbnail: None,
                });
            }
            if linked.insert((sample_id.clone(), reference.unique_id.clone())) {
                edges.push(VisEdge {
                    source: sample_id.clone(),
                    target: reference.unique_id.clone(),
                });
            }
        }
    }
    (nodes, edges)
}

/// Fetches the first thumbnail of each dataset with at most `max_workers`
/// requests in flight. Datasets whose fetch fails, or that have no thumbnail,
/// are absent from the result.
pub fn fetch_thumbnails<C>(
    client: &C,
    dataset_ids: &[String],
    max_workers: usize,
) -> HashMap<String, String>
where
    C: CrucibleClient + ?Sized,
{
    if dataset_ids.is_empty() {
        return HashMap::new();
    }
    let workers = max_workers.clamp(1, dataset_ids.len());
    match ThreadPoolBuilder::new().num_threads(workers).build() {
        Ok(pool) => pool.install(|| {
            dataset_ids
                .par_iter()
                .filter_map(|dataset_id| first_thumbnail(client, dataset_id))
                .collect()
        }),
        Err(err) => {
            tracing::warn!(error = %err, "thumbnail pool unavailable, fetching sequentially");
            dataset_ids
                .iter()
                .filter_map(|dataset_id| first_thumbnail(client, dataset_id))
                .collect()
        }
    }
}

fn first_thumbnail<C>(client: &C, dataset_id: &str) -> Option<(String, String)>
where
    C: CrucibleClient + ?Sized,
{
    match client.get_thumbnails(dataset_id) {
        Ok(thumbnails) => thumbnails
            .into_iter()
            .next()
            .map(|thumbnail| (dataset_id.to_string(), thumbnail.thumbnail_b64str)),
        Err(err) => {
            tracing::warn!(%dataset_id, error = %err, "thumbnail fetch failed");
            None
        }
    }
}
