#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use serde_json::{Value, json};

use crucible_graph_explorer::crucible::CrucibleClient;
use crucible_graph_explorer::domain::{
    Dataset, DatasetQuery, Project, Sample, SampleQuery, Thumbnail,
};
use crucible_graph_explorer::error::CrucibleError;

pub fn sample(id: &str, name: &str, datasets: &[(&str, &str)]) -> Sample {
    serde_json::from_value(json!({
        "unique_id": id,
        "sample_name": name,
        "sample_type": "wafer",
        "description": format!("{name} description"),
        "datasets": datasets
            .iter()
            .map(|(ds, measurement)| json!({"unique_id": ds, "measurement": measurement}))
            .collect::<Vec<_>>(),
    }))
    .unwrap()
}

pub fn dataset(id: &str, name: &str, measurement: &str) -> Dataset {
    serde_json::from_value(json!({
        "unique_id": id,
        "dataset_name": name,
        "measurement": measurement,
    }))
    .unwrap()
}

/// In-memory stand-in for the Crucible service. Links are parent -> child.
#[derive(Default)]
pub struct MockCrucible {
    pub samples: Vec<Sample>,
    pub datasets: Vec<Dataset>,
    pub links: Vec<(String, String)>,
    pub failing_children: HashSet<String>,
    pub failing_parents: HashSet<String>,
    pub metadata: HashMap<String, Value>,
    pub thumbnails: HashMap<String, String>,
    pub failing_thumbnails: HashSet<String>,
    pub denied: bool,
    /// Time each thumbnail fetch holds its slot.
    pub thumbnail_delay: Option<Duration>,
    pub thumbnails_in_flight: AtomicUsize,
    pub peak_thumbnails_in_flight: AtomicUsize,
    pub calls: Mutex<HashMap<&'static str, usize>>,
}

impl MockCrucible {
    pub fn with_links(links: &[(&str, &str)]) -> Self {
        Self {
            links: links
                .iter()
                .map(|(parent, child)| (parent.to_string(), child.to_string()))
                .collect(),
            ..Self::default()
        }
    }

    pub fn calls(&self, name: &str) -> usize {
        self.calls.lock().unwrap().get(name).copied().unwrap_or(0)
    }

    fn record(&self, name: &'static str) {
        *self.calls.lock().unwrap().entry(name).or_insert(0) += 1;
    }

    fn lookup(&self, id: &str) -> Sample {
        self.samples
            .iter()
            .find(|sample| sample.unique_id == id)
            .cloned()
            .unwrap_or_else(|| sample(id, "", &[]))
    }

    fn check_access(&self) -> Result<(), CrucibleError> {
        if self.denied {
            return Err(CrucibleError::AccessDenied {
                status: 403,
                message: "project not shared".to_string(),
            });
        }
        Ok(())
    }
}

impl CrucibleClient for MockCrucible {
    fn list_projects(&self, _owner: Option<&str>) -> Result<Vec<Project>, CrucibleError> {
        self.record("list_projects");
        self.check_access()?;
        Ok(vec![
            serde_json::from_value(json!({"project_id": "P", "title": "Project P"})).unwrap(),
        ])
    }

    fn list_samples(&self, query: &SampleQuery) -> Result<Vec<Sample>, CrucibleError> {
        self.record("list_samples");
        self.check_access()?;
        if let Some(dataset_id) = &query.dataset_id {
            return Ok(self
                .samples
                .iter()
                .filter(|sample| sample.datasets.iter().any(|ds| &ds.unique_id == dataset_id))
                .cloned()
                .collect());
        }
        Ok(self.samples.clone())
    }

    fn list_datasets(&self, _query: &DatasetQuery) -> Result<Vec<Dataset>, CrucibleError> {
        self.record("list_datasets");
        self.check_access()?;
        Ok(self.datasets.clone())
    }

    fn list_children_of_sample(&self, sample_id: &str) -> Result<Vec<Sample>, CrucibleError> {
        self.record("list_children_of_sample");
        if self.failing_children.contains(sample_id) {
            return Err(CrucibleError::CrucibleStatus {
                status: 500,
                message: "boom".to_string(),
            });
        }
        Ok(self
            .links
            .iter()
            .filter(|(parent, _)| parent == sample_id)
            .map(|(_, child)| self.lookup(child))
            .collect())
    }

    fn list_parents_of_sample(&self, sample_id: &str) -> Result<Vec<Sample>, CrucibleError> {
        self.record("list_parents_of_sample");
        if self.failing_parents.contains(sample_id) {
            return Err(CrucibleError::CrucibleHttp("connection reset".to_string()));
        }
        Ok(self
            .links
            .iter()
            .filter(|(_, child)| child == sample_id)
            .map(|(parent, _)| self.lookup(parent))
            .collect())
    }

    fn get_sample(&self, sample_id: &str) -> Result<Sample, CrucibleError> {
        self.record("get_sample");
        self.samples
            .iter()
            .find(|sample| sample.unique_id == sample_id)
            .cloned()
            .ok_or_else(|| CrucibleError::CrucibleStatus {
                status: 404,
                message: sample_id.to_string(),
            })
    }

    fn get_dataset(
        &self,
        dataset_id: &str,
        _include_metadata: bool,
    ) -> Result<Dataset, CrucibleError> {
        self.record("get_dataset");
        self.datasets
            .iter()
            .find(|dataset| dataset.unique_id == dataset_id)
            .cloned()
            .ok_or_else(|| CrucibleError::CrucibleStatus {
                status: 404,
                message: dataset_id.to_string(),
            })
    }

    fn get_scientific_metadata(&self, dataset_id: &str) -> Result<Value, CrucibleError> {
        self.record("get_scientific_metadata");
        self.metadata
            .get(dataset_id)
            .cloned()
            .ok_or_else(|| CrucibleError::CrucibleStatus {
                status: 404,
                message: dataset_id.to_string(),
            })
    }

    fn get_thumbnails(&self, dataset_id: &str) -> Result<Vec<Thumbnail>, CrucibleError> {
        self.record("get_thumbnails");
        let in_flight = self.thumbnails_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_thumbnails_in_flight
            .fetch_max(in_flight, Ordering::SeqCst);
        if let Some(delay) = self.thumbnail_delay {
            thread::sleep(delay);
        }
        self.thumbnails_in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing_thumbnails.contains(dataset_id) {
            return Err(CrucibleError::CrucibleHttp("timeout".to_string()));
        }
        Ok(self
            .thumbnails
            .get(dataset_id)
            .map(|b64| {
                vec![Thumbnail {
                    caption: None,
                    thumbnail_b64str: b64.clone(),
                }]
            })
            .unwrap_or_default())
    }
}

/// Four-sample lineage: A -> B, A -> C, B -> D.
pub fn abcd() -> MockCrucible {
    let mut mock = MockCrucible::with_links(&[("A", "B"), ("A", "C"), ("B", "D")]);
    mock.samples = vec![
        sample("A", "alpha", &[("d1", "spin_run")]),
        sample("B", "beta", &[("d1", "spin_run"), ("d2", "MDNote")]),
        sample("C", "gamma", &[]),
        sample("D", "delta", &[("d3", "sample well image")]),
    ];
    mock.datasets = vec![dataset("d1", "spin 1", "spin_run")];
    mock
}
