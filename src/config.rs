use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::crucible::DEFAULT_API_URL;
use crate::error::CrucibleError;

pub const DEFAULT_CONFIG_FILE: &str = "crucible-graph.json";
pub const DEFAULT_THUMBNAIL_WORKERS: usize = 10;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default)]
    pub cache_dir: Option<String>,
    #[serde(default)]
    pub include_metadata: Option<bool>,
    #[serde(default)]
    pub persist: Option<bool>,
    #[serde(default)]
    pub thumbnail_workers: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub api_url: String,
    /// `None` means the per-user default under `~/.cache`.
    pub cache_dir: Option<Utf8PathBuf>,
    pub include_metadata: bool,
    pub persist: bool,
    pub thumbnail_workers: usize,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads `path`, or `crucible-graph.json` in the working directory when no
    /// path is given. A missing default file yields the defaults; an explicit
    /// path must exist.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, CrucibleError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            tracing::debug!("no config file, using defaults");
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| CrucibleError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| CrucibleError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, CrucibleError> {
        let api_url = config
            .api_url
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        if !api_url.starts_with("http://") && !api_url.starts_with("https://") {
            return Err(CrucibleError::ConfigParse(format!(
                "api_url must be an http(s) URL: {api_url}"
            )));
        }

        Ok(ResolvedConfig {
            api_url,
            cache_dir: config.cache_dir.map(Utf8PathBuf::from),
            include_metadata: config.include_metadata.unwrap_or(false),
            persist: config.persist.unwrap_or(true),
            thumbnail_workers: config
                .thumbnail_workers
                .unwrap_or(DEFAULT_THUMBNAIL_WORKERS)
                .max(1),
        })
    }
}
