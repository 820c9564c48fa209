//! Project snapshots: samples and datasets of one project with their lookup
//! indices, plus the service that builds, persists and invalidates them along
//! with the project lineage graph.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::crucible::CrucibleClient;
use crate::domain::{
    Dataset, DatasetQuery, ProjectId, Sample, SampleQuery, metadata_from_response,
};
use crate::error::CrucibleError;
use crate::lineage::{LineageGraph, NodeLinkData, build_project_graph};
use crate::store::Store;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectCache {
    pub project_id: String,
    #[serde(default)]
    pub generated_at: Option<String>,
    pub samples: Vec<Sample>,
    pub datasets: Vec<Dataset>,
    #[serde(default)]
    pub samples_by_id: BTreeMap<String, Sample>,
    #[serde(default)]
    pub samples_by_name: BTreeMap<String, Sample>,
    #[serde(default)]
    pub datasets_by_id: BTreeMap<String, Dataset>,
}

impl ProjectCache {
    /// Indexes the listings and reconciles datasets that samples reference but
    /// the bulk dataset listing left out.
    pub fn from_listings(
        project_id: &ProjectId,
        samples: Vec<Sample>,
        datasets: Vec<Dataset>,
    ) -> Self {
        let mut cache = Self {
            project_id: project_id.as_str().to_string(),
            generated_at: Some(chrono::Utc::now().to_rfc3339()),
            samples,
            datasets,
            samples_by_id: BTreeMap::new(),
            samples_by_name: BTreeMap::new(),
            datasets_by_id: BTreeMap::new(),
        };
        cache.reindex();
        cache.reconcile_orphans();
        cache
    }

    fn insert_dataset(&mut self, dataset: Dataset) {
        self.datasets_by_id
            .insert(dataset.unique_id.clone(), dataset.clone());
        self.datasets.push(dataset);
    }

    /// Rebuilds every index from the sample and dataset lists, dropping
    /// repeated dataset ids.
    pub fn reindex(&mut self) {
        let datasets = std::mem::take(&mut self.datasets);
        self.datasets_by_id.clear();
        for dataset in datasets {
            if !self.datasets_by_id.contains_key(&dataset.unique_id) {
                self.insert_dataset(dataset);
            }
        }
        self.reindex_samples();
    }

    /// Rebuilds both sample indices. With duplicate names the later sample in
    /// listing order owns the name.
    pub fn reindex_samples(&mut self) {
        self.samples_by_id.clear();
        self.samples_by_name.clear();
        for sample in &self.samples {
            self.samples_by_id
                .insert(sample.unique_id.clone(), sample.clone());
            self.samples_by_name
                .insert(sample.sample_name.clone(), sample.clone());
        }
    }

    /// Appends every dataset referenced by a sample but missing from the
    /// dataset index. Returns how many were added.
    pub fn reconcile_orphans(&mut self) -> usize {
        let orphans: Vec<Dataset> = self
            .samples
            .iter()
            .flat_map(|sample| sample.datasets.iter())
            .filter(|reference| !self.datasets_by_id.contains_key(&reference.unique_id))
            .map(Dataset::from)
            .collect();
        let mut added = 0;
        for orphan in orphans {
            if self.datasets_by_id.contains_key(&orphan.unique_id) {
                continue;
            }
            tracing::debug!(dataset_id = %orphan.unique_id, "adding orphan dataset");
            self.insert_dataset(orphan);
            added += 1;
        }
        added
    }

    /// Fetches scientific metadata for every dataset. A failed fetch records
    /// an empty object for that dataset and the rest continue.
    pub fn load_scientific_metadata<C>(&mut self, client: &C)
    where
        C: CrucibleClient + ?Sized,
    {
        tracing::info!(datasets = self.datasets.len(), "loading scientific metadata");
        for dataset in &mut self.datasets {
            let metadata = match client.get_scientific_metadata(&dataset.unique_id) {
                Ok(payload) => metadata_from_response(payload),
                Err(err) => {
                    tracing::warn!(
                        dataset_id = %dataset.unique_id,
                        error = %err,
                        "scientific metadata unavailable"
                    );
                    Value::Object(Map::new())
                }
            };
            dataset.scientific_metadata = Some(metadata);
            self.datasets_by_id
                .insert(dataset.unique_id.clone(), dataset.clone());
        }
    }

    pub fn sample(&self, sample_id: &str) -> Result<&Sample, CrucibleError> {
        self.samples_by_id
            .get(sample_id)
            .ok_or_else(|| CrucibleError::SampleNotFound(sample_id.to_string()))
    }

    pub fn sample_by_name(&self, sample_name: &str) -> Result<&Sample, CrucibleError> {
        self.samples_by_name
            .get(sample_name)
            .ok_or_else(|| CrucibleError::SampleNotFound(sample_name.to_string()))
    }

    /// Samples whose name or id contains `query`, ignoring case. An empty
    /// query matches every sample.
    pub fn search_samples(&self, query: &str) -> Vec<SearchHit> {
        search_hits(
            query,
            self.samples_by_id.values().map(|sample| {
                (
                    sample.unique_id.as_str(),
                    sample.sample_name.as_str(),
                    sample.display_label(),
                )
            }),
        )
    }

    /// Datasets whose name or id contains `query`, ignoring case.
    pub fn search_datasets(&self, query: &str) -> Vec<SearchHit> {
        search_hits(
            query,
            self.datasets_by_id.values().map(|dataset| {
                (
                    dataset.unique_id.as_str(),
                    dataset.dataset_name.as_deref().unwrap_or_default(),
                    dataset.display_label(),
                )
            }),
        )
    }

    pub fn dataset(&self, dataset_id: &str) -> Result<&Dataset, CrucibleError> {
        self.datasets_by_id
            .get(dataset_id)
            .ok_or_else(|| CrucibleError::DatasetNotFound(dataset_id.to_string()))
    }
}

/// Id and display name of a record matched by a project search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub name: String,
}

fn search_hits<'a, I>(query: &str, records: I) -> Vec<SearchHit>
where
    I: Iterator<Item = (&'a str, &'a str, String)>,
{
    let needle = query.trim().to_lowercase();
    let mut hits: Vec<SearchHit> = records
        .filter(|(id, name, _)| {
            needle.is_empty()
                || name.to_lowercase().contains(&needle)
                || id.to_lowercase().contains(&needle)
        })
        .map(|(id, _, label)| SearchHit {
            id: id.to_string(),
            name: label,
        })
        .collect();
    hits.sort_by(|a, b| {
        a.name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.id.cmp(&b.id))
    });
    hits
}

#[derive(Debug, Clone)]
pub struct CacheOptions {
    pub include_metadata: bool,
    pub persist: bool,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            include_metadata: false,
            persist: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Invalidation {
    pub project_id: String,
    pub removed_cache_file: bool,
    pub removed_graph_file: bool,
    pub removed_from_memory: bool,
}

/// Owner of every project snapshot and project graph in the process.
///
/// Lookups go memory, then disk, then the remote service. Builds for the same
/// project are not serialized: two concurrent misses both fetch and the last
/// atomic file write wins.
pub struct ProjectCacheService<C: CrucibleClient> {
    client: C,
    store: Store,
    options: CacheOptions,
    projects: Mutex<HashMap<ProjectId, Arc<ProjectCache>>>,
    graphs: Mutex<HashMap<ProjectId, Arc<LineageGraph>>>,
}

impl<C: CrucibleClient> ProjectCacheService<C> {
    pub fn new(client: C, store: Store, options: CacheOptions) -> Self {
        Self {
            client,
            store,
            options,
            projects: Mutex::new(HashMap::new()),
            graphs: Mutex::new(HashMap::new()),
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn get_or_build(&self, project_id: &ProjectId) -> Result<Arc<ProjectCache>, CrucibleError> {
        if let Some(cache) = lock(&self.projects).get(project_id) {
            return Ok(Arc::clone(cache));
        }

        let cache = match self.load(project_id) {
            Ok(cache) => cache,
            Err(err) => {
                tracing::info!(%project_id, error = %err, "project cache unavailable, regenerating");
                self.build(project_id)?
            }
        };
        let cache = Arc::new(cache);
        lock(&self.projects).insert(project_id.clone(), Arc::clone(&cache));
        Ok(cache)
    }

    fn load(&self, project_id: &ProjectId) -> Result<ProjectCache, CrucibleError> {
        let path = self.store.project_cache_path(project_id);
        let mut cache: ProjectCache = Store::read_json(&path)?;
        cache.reindex();
        cache.reconcile_orphans();
        tracing::debug!(%project_id, path = %path, "loaded project cache");
        Ok(cache)
    }

    fn build(&self, project_id: &ProjectId) -> Result<ProjectCache, CrucibleError> {
        tracing::info!(%project_id, "fetching samples and datasets from Crucible");
        let samples = self
            .client
            .list_samples(&SampleQuery::for_project(project_id))?;
        let datasets = self
            .client
            .list_datasets(&DatasetQuery::for_project(project_id))?;
        let mut cache = ProjectCache::from_listings(project_id, samples, datasets);
        if self.options.include_metadata {
            cache.load_scientific_metadata(&self.client);
        }

        if self.options.persist {
            let path = self.store.project_cache_path(project_id);
            Store::write_json_atomic(&path, &cache)?;
            tracing::info!(%project_id, path = %path, "saved project cache");
        }
        Ok(cache)
    }

    /// Project graph seeded with every project sample, loaded from disk when
    /// possible. Samples missing from a persisted graph are added as nodes.
    pub fn project_graph(&self, project_id: &ProjectId) -> Result<Arc<LineageGraph>, CrucibleError> {
        if let Some(graph) = lock(&self.graphs).get(project_id) {
            return Ok(Arc::clone(graph));
        }

        let cache = self.get_or_build(project_id)?;
        let path = self.store.project_graph_path(project_id);
        let mut graph = match Store::read_json::<NodeLinkData>(&path) {
            Ok(data) => LineageGraph::from_node_link(&data),
            Err(err) => {
                tracing::info!(%project_id, error = %err, "project graph unavailable, rebuilding");
                let graph = build_project_graph(&self.client, &cache.samples);
                if self.options.persist {
                    Store::write_json_atomic(&path, &graph.to_node_link())?;
                }
                graph
            }
        };
        for sample in &cache.samples {
            graph.add_node(&sample.unique_id);
        }

        let graph = Arc::new(graph);
        lock(&self.graphs).insert(project_id.clone(), Arc::clone(&graph));
        Ok(graph)
    }

    /// Drops the persisted and in-memory copies of the project cache and
    /// graph; the next lookup refetches from Crucible.
    pub fn invalidate(&self, project_id: &ProjectId) -> Result<Invalidation, CrucibleError> {
        let removed_cache_file =
            Store::remove_if_exists(&self.store.project_cache_path(project_id))?;
        let removed_graph_file =
            Store::remove_if_exists(&self.store.project_graph_path(project_id))?;
        let cached = lock(&self.projects).remove(project_id).is_some();
        let graphed = lock(&self.graphs).remove(project_id).is_some();
        tracing::info!(%project_id, removed_cache_file, removed_graph_file, "invalidated project cache");
        Ok(Invalidation {
            project_id: project_id.as_str().to_string(),
            removed_cache_file,
            removed_graph_file,
            removed_from_memory: cached || graphed,
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
