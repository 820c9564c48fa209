use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum CrucibleError {
    #[error("invalid project id: {0:?}")]
    InvalidProjectId(String),

    #[error("Crucible request failed: {0}")]
    CrucibleHttp(String),

    #[error("Crucible returned status {status}: {message}")]
    CrucibleStatus { status: u16, message: String },

    #[error("access denied by Crucible (status {status}): {message}")]
    #[diagnostic(help("check CRUCIBLE_API_KEY and that the project is shared with you"))]
    AccessDenied { status: u16, message: String },

    #[error("malformed Crucible response: {0}")]
    MalformedResponse(String),

    #[error("sample not found in lineage graph: {0}")]
    SampleNotInGraph(String),

    #[error("sample not found in project: {0}")]
    SampleNotFound(String),

    #[error("dataset not found in project: {0}")]
    DatasetNotFound(String),

    #[error("missing CRUCIBLE_API_KEY environment variable")]
    MissingApiKey,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("failed to read cache file {path}: {message}")]
    CacheRead { path: String, message: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("invalid arguments for tool {tool}: {message}")]
    InvalidToolArguments { tool: String, message: String },
}

impl CrucibleError {
    /// Errors that mean the requested entity does not exist, as opposed to a
    /// failure talking to the remote service.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CrucibleError::SampleNotInGraph(_)
                | CrucibleError::SampleNotFound(_)
                | CrucibleError::DatasetNotFound(_)
        )
    }
}
