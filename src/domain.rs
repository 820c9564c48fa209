use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CrucibleError;

pub const SCIENTIFIC_METADATA_KEY: &str = "scientific_metadata";

/// Number of id characters kept when a record has no usable name.
const SHORT_ID_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProjectId(String);

impl ProjectId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Storage key for this project: `.` and `/` become `-`.
    pub fn cache_key(&self) -> String {
        self.0.replace(['.', '/'], "-")
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ProjectId {
    type Err = CrucibleError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(CrucibleError::InvalidProjectId(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub project_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Reference to a dataset as embedded in a sample record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetRef {
    pub unique_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measurement: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub unique_id: String,
    #[serde(default)]
    pub sample_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_type: Option<String>,
    #[serde(default)]
    pub datasets: Vec<DatasetRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Sample {
    pub fn display_label(&self) -> String {
        if self.sample_name.trim().is_empty() {
            short_id(&self.unique_id)
        } else {
            self.sample_name.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub unique_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measurement: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scientific_metadata: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub associated_files: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub download_links: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Dataset {
    pub fn display_label(&self) -> String {
        match self.dataset_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name.to_string(),
            _ => short_id(&self.unique_id),
        }
    }

    /// Applies [`unwrap_scientific_metadata`] to the embedded metadata, if any.
    pub fn normalize_metadata(&mut self) {
        if let Some(metadata) = self.scientific_metadata.take() {
            self.scientific_metadata = Some(unwrap_scientific_metadata(metadata));
        }
    }
}

impl From<&DatasetRef> for Dataset {
    fn from(value: &DatasetRef) -> Self {
        Self {
            unique_id: value.unique_id.clone(),
            dataset_name: value.dataset_name.clone(),
            measurement: value.measurement.clone(),
            scientific_metadata: None,
            associated_files: Vec::new(),
            download_links: Vec::new(),
            extra: value.extra.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thumbnail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    pub thumbnail_b64str: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleQuery {
    pub project_id: Option<String>,
    pub parent_id: Option<String>,
    pub dataset_id: Option<String>,
}

impl SampleQuery {
    pub fn for_project(project_id: &ProjectId) -> Self {
        Self {
            project_id: Some(project_id.as_str().to_string()),
            ..Self::default()
        }
    }

    pub fn for_dataset(dataset_id: &str) -> Self {
        Self {
            dataset_id: Some(dataset_id.to_string()),
            ..Self::default()
        }
    }

    pub fn pairs(&self) -> Vec<(&'static str, &str)> {
        let mut pairs = Vec::new();
        if let Some(value) = &self.project_id {
            pairs.push(("project_id", value.as_str()));
        }
        if let Some(value) = &self.parent_id {
            pairs.push(("parent_id", value.as_str()));
        }
        if let Some(value) = &self.dataset_id {
            pairs.push(("dataset_id", value.as_str()));
        }
        pairs
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatasetQuery {
    pub project_id: Option<String>,
    pub measurement: Option<String>,
}

impl DatasetQuery {
    pub fn for_project(project_id: &ProjectId) -> Self {
        Self {
            project_id: Some(project_id.as_str().to_string()),
            ..Self::default()
        }
    }

    pub fn pairs(&self) -> Vec<(&'static str, &str)> {
        let mut pairs = Vec::new();
        if let Some(value) = &self.project_id {
            pairs.push(("project_id", value.as_str()));
        }
        if let Some(value) = &self.measurement {
            pairs.push(("measurement", value.as_str()));
        }
        pairs
    }
}

/// Strips exactly one `scientific_metadata` wrapper from a fetched payload.
///
/// The metadata endpoint returns the document nested under its own key, so a
/// dataset would otherwise end up with `scientific_metadata.scientific_metadata`.
/// Payloads without the key are returned unchanged.
pub fn unwrap_scientific_metadata(payload: Value) -> Value {
    match payload {
        Value::Object(mut map) if map.contains_key(SCIENTIFIC_METADATA_KEY) => map
            .remove(SCIENTIFIC_METADATA_KEY)
            .unwrap_or(Value::Null),
        other => other,
    }
}

/// Metadata document carried by a scientific-metadata response.
///
/// The response nests the document under `scientific_metadata`, and some
/// stored documents carry a second wrapper of the same name. Both are removed;
/// flat payloads pass through unchanged.
pub fn metadata_from_response(payload: Value) -> Value {
    unwrap_scientific_metadata(unwrap_scientific_metadata(payload))
}

pub fn short_id(id: &str) -> String {
    if id.chars().count() <= SHORT_ID_LEN {
        return id.to_string();
    }
    let prefix: String = id.chars().take(SHORT_ID_LEN).collect();
    format!("{prefix}…")
}
