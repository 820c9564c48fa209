use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::domain::ProjectId;
use crate::error::CrucibleError;

/// On-disk home of project caches and lineage graphs, one pair of JSON files
/// per project.
#[derive(Debug, Clone)]
pub struct Store {
    cache_root: Utf8PathBuf,
}

impl Store {
    pub fn new() -> Result<Self, CrucibleError> {
        let cache_root = BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(
                    dirs.home_dir()
                        .join(".cache")
                        .join("crucible-graph-explorer"),
                )
                .ok()
            })
            .ok_or_else(|| {
                CrucibleError::Filesystem("unable to resolve cache directory".to_string())
            })?;
        Ok(Self { cache_root })
    }

    pub fn new_with_root(cache_root: Utf8PathBuf) -> Self {
        Self { cache_root }
    }

    pub fn cache_root(&self) -> &Utf8Path {
        &self.cache_root
    }

    pub fn project_cache_path(&self, project_id: &ProjectId) -> Utf8PathBuf {
        self.cache_root
            .join(format!("{}.json", project_id.cache_key()))
    }

    pub fn project_graph_path(&self, project_id: &ProjectId) -> Utf8PathBuf {
        self.cache_root
            .join(format!("{}_project_sample_graph.json", project_id.cache_key()))
    }

    pub fn ensure_cache_root(&self) -> Result<(), CrucibleError> {
        fs::create_dir_all(self.cache_root.as_std_path())
            .map_err(|err| CrucibleError::Filesystem(err.to_string()))
    }

    /// Serializes `value` next to `path` and renames it into place, so a
    /// concurrent reader sees either the old file or the new one.
    pub fn write_json_atomic<T: Serialize>(path: &Utf8Path, value: &T) -> Result<(), CrucibleError> {
        let parent = path
            .parent()
            .ok_or_else(|| CrucibleError::Filesystem(format!("invalid cache path {path}")))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| CrucibleError::Filesystem(err.to_string()))?;
        let content = serde_json::to_vec_pretty(value)
            .map_err(|err| CrucibleError::Filesystem(err.to_string()))?;
        let mut temp = tempfile::Builder::new()
            .prefix(".crucible-graph")
            .suffix(".json.tmp")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| CrucibleError::Filesystem(err.to_string()))?;
        temp.as_file_mut()
            .write_all(&content)
            .and_then(|()| temp.as_file_mut().sync_all())
            .map_err(|err| CrucibleError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| CrucibleError::Filesystem(err.to_string()))?;
        Ok(())
    }

    pub fn read_json<T: DeserializeOwned>(path: &Utf8Path) -> Result<T, CrucibleError> {
        let content = fs::read_to_string(path.as_std_path()).map_err(|err| {
            CrucibleError::CacheRead {
                path: path.to_string(),
                message: err.to_string(),
            }
        })?;
        serde_json::from_str(&content).map_err(|err| CrucibleError::CacheRead {
            path: path.to_string(),
            message: err.to_string(),
        })
    }

    /// Removes `path` if it exists. Returns whether a file was removed.
    pub fn remove_if_exists(path: &Utf8Path) -> Result<bool, CrucibleError> {
        if !path.as_std_path().exists() {
            return Ok(false);
        }
        fs::remove_file(path.as_std_path())
            .map_err(|err| CrucibleError::Filesystem(err.to_string()))?;
        Ok(true)
    }
}
