use std::collections::BTreeSet;
use std::sync::Arc;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::cache::{CacheOptions, Invalidation, ProjectCache, ProjectCacheService, SearchHit};
use crate::crucible::CrucibleClient;
use crate::domain::{Dataset, Project, ProjectId, Sample, SampleQuery};
use crate::error::CrucibleError;
use crate::lineage::{LineageGraph, build_sample_graph, sort_by_creation};
use crate::store::Store;
use crate::visualize::{Visualization, VisualizationOptions, build_visualization};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum GraphScope {
    /// The persisted whole-project graph.
    #[default]
    Project,
    /// A fresh two-way walk around the sample.
    Sample,
}

/// Which project records a search looks at.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum SearchKind {
    #[default]
    Samples,
    Datasets,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub project_id: String,
    pub kind: SearchKind,
    pub query: String,
    pub hits: Vec<SearchHit>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectsResult {
    pub projects: Vec<Project>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OverviewResult {
    pub project_id: String,
    pub generated_at: Option<String>,
    pub sample_count: usize,
    pub dataset_count: usize,
    pub samples: Vec<SampleSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleSummary {
    pub unique_id: String,
    pub sample_name: Option<String>,
    pub sample_type: Option<String>,
    pub description: Option<String>,
    pub dataset_count: usize,
}

impl From<&Sample> for SampleSummary {
    fn from(sample: &Sample) -> Self {
        Self {
            unique_id: sample.unique_id.clone(),
            sample_name: (!sample.sample_name.is_empty()).then(|| sample.sample_name.clone()),
            sample_type: sample.sample_type.clone(),
            description: sample.description.clone(),
            dataset_count: sample.datasets.len(),
        }
    }
}

impl SampleSummary {
    fn unresolved(id: &str) -> Self {
        Self {
            unique_id: id.to_string(),
            sample_name: None,
            sample_type: None,
            description: None,
            dataset_count: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LineageEntry {
    pub sample: SampleSummary,
    /// Path between this relative and the focus sample, in edge direction.
    pub path: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LineageResult {
    pub project_id: String,
    pub sample: SampleSummary,
    pub datasets: Vec<Dataset>,
    pub ancestors: Vec<LineageEntry>,
    pub descendants: Vec<LineageEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetResult {
    pub project_id: String,
    pub dataset: Dataset,
    pub samples: Vec<SampleSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphResult {
    pub project_id: String,
    pub nodes: usize,
    pub edges: usize,
    pub roots: Vec<String>,
}

/// Boundary facade: every user-facing operation on projects, samples and
/// datasets. Holds the cache service so callers share one set of snapshots.
pub struct App<C: CrucibleClient> {
    cache: ProjectCacheService<C>,
    thumbnail_workers: usize,
}

impl<C: CrucibleClient> App<C> {
    pub fn new(client: C, store: Store, options: CacheOptions, thumbnail_workers: usize) -> Self {
        Self {
            cache: ProjectCacheService::new(client, store, options),
            thumbnail_workers: thumbnail_workers.max(1),
        }
    }

    pub fn cache(&self) -> &ProjectCacheService<C> {
        &self.cache
    }

    pub fn projects(&self, owner: Option<&str>) -> Result<ProjectsResult, CrucibleError> {
        let projects = self.cache.client().list_projects(owner)?;
        Ok(ProjectsResult { projects })
    }

    pub fn overview(&self, project_id: &ProjectId) -> Result<OverviewResult, CrucibleError> {
        let project = self.cache.get_or_build(project_id)?;
        let mut samples: Vec<&Sample> = project.samples_by_name.values().collect();
        samples.sort_by(|a, b| a.sample_name.cmp(&b.sample_name));
        Ok(OverviewResult {
            project_id: project.project_id.clone(),
            generated_at: project.generated_at.clone(),
            sample_count: project.samples.len(),
            dataset_count: project.datasets.len(),
            samples: samples.into_iter().map(SampleSummary::from).collect(),
        })
    }

    /// Ancestors and descendants of a project sample, each with the first
    /// path connecting it to the sample, ordered by unique id.
    pub fn lineage(
        &self,
        project_id: &ProjectId,
        sample_id: &str,
    ) -> Result<LineageResult, CrucibleError> {
        let project = self.cache.get_or_build(project_id)?;
        let sample = project.sample(sample_id)?;
        let graph = self.cache.project_graph(project_id)?;

        let ancestors = sort_by_creation(graph.ancestors(sample_id)?)
            .into_iter()
            .map(|id| -> Result<LineageEntry, CrucibleError> {
                let path = graph.path(&id, sample_id)?.unwrap_or_default();
                Ok(LineageEntry {
                    sample: self.summarize(&project, &id),
                    path,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let descendants = sort_by_creation(graph.descendants(sample_id)?)
            .into_iter()
            .map(|id| -> Result<LineageEntry, CrucibleError> {
                let path = graph.path(sample_id, &id)?.unwrap_or_default();
                Ok(LineageEntry {
                    sample: self.summarize(&project, &id),
                    path,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let datasets = sample
            .datasets
            .iter()
            .filter_map(|reference| project.datasets_by_id.get(&reference.unique_id).cloned())
            .collect();

        Ok(LineageResult {
            project_id: project.project_id.clone(),
            sample: SampleSummary::from(sample),
            datasets,
            ancestors,
            descendants,
        })
    }

    fn summarize(&self, project: &ProjectCache, sample_id: &str) -> SampleSummary {
        if let Some(sample) = project.samples_by_id.get(sample_id) {
            return SampleSummary::from(sample);
        }
        match self.cache.client().get_sample(sample_id) {
            Ok(sample) => SampleSummary::from(&sample),
            Err(err) => {
                tracing::warn!(%sample_id, error = %err, "sample outside project could not be resolved");
                SampleSummary::unresolved(sample_id)
            }
        }
    }

    pub fn dataset(
        &self,
        project_id: &ProjectId,
        dataset_id: &str,
    ) -> Result<DatasetResult, CrucibleError> {
        let project = self.cache.get_or_build(project_id)?;
        let dataset = project.dataset(dataset_id)?.clone();
        let samples = self
            .cache
            .client()
            .list_samples(&SampleQuery::for_dataset(dataset_id))?;
        Ok(DatasetResult {
            project_id: project.project_id.clone(),
            dataset,
            samples: samples.iter().map(SampleSummary::from).collect(),
        })
    }

    pub fn search(
        &self,
        project_id: &ProjectId,
        kind: SearchKind,
        query: &str,
    ) -> Result<SearchResult, CrucibleError> {
        let project = self.cache.get_or_build(project_id)?;
        let hits = match kind {
            SearchKind::Samples => project.search_samples(query),
            SearchKind::Datasets => project.search_datasets(query),
        };
        tracing::debug!(%project_id, ?kind, query, hits = hits.len(), "searched project");
        Ok(SearchResult {
            project_id: project.project_id.clone(),
            kind,
            query: query.to_string(),
            hits,
        })
    }

    pub fn visualize(
        &self,
        project_id: &ProjectId,
        sample_id: &str,
        include_datasets: bool,
        scope: GraphScope,
    ) -> Result<Visualization, CrucibleError> {
        let project = self.cache.get_or_build(project_id)?;
        let graph = match scope {
            GraphScope::Project => self.cache.project_graph(project_id)?,
            GraphScope::Sample => Arc::new(build_sample_graph(self.cache.client(), sample_id)),
        };
        build_visualization(
            self.cache.client(),
            &graph,
            &project,
            sample_id,
            VisualizationOptions {
                include_datasets,
                thumbnail_workers: self.thumbnail_workers,
            },
        )
    }

    pub fn graph(&self, project_id: &ProjectId) -> Result<GraphResult, CrucibleError> {
        let graph = self.cache.project_graph(project_id)?;
        Ok(GraphResult {
            project_id: project_id.as_str().to_string(),
            nodes: graph.node_count(),
            edges: graph.edge_count(),
            roots: roots(&graph),
        })
    }

    pub fn regenerate(&self, project_id: &ProjectId) -> Result<Invalidation, CrucibleError> {
        self.cache.invalidate(project_id)
    }
}

fn roots(graph: &LineageGraph) -> Vec<String> {
    let children: BTreeSet<&str> = graph.edges().map(|(_, child)| child).collect();
    sort_by_creation(
        graph
            .nodes()
            .filter(|id| !children.contains(id))
            .map(str::to_string),
    )
}
