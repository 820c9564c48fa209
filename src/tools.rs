//! Tools exposed to a chat assistant so its answers are grounded in project
//! data. Each call is a single bounded query against the cache or the lineage
//! graph; the conversation loop that issues them lives outside this crate.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::app::{App, GraphScope, SampleSummary, SearchKind};
use crate::crucible::CrucibleClient;
use crate::domain::ProjectId;
use crate::error::CrucibleError;

/// Tool definition in the JSON-schema form chat models expect.
#[derive(Debug, Clone, Serialize)]
pub struct Tool {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

#[derive(Debug, Deserialize)]
struct SampleArgs {
    sample_id: String,
}

#[derive(Debug, Deserialize)]
struct SampleNameArgs {
    sample_name: String,
}

#[derive(Debug, Deserialize)]
struct DatasetArgs {
    dataset_id: String,
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
    #[serde(default)]
    kind: SearchKind,
}

#[derive(Debug, Deserialize)]
struct VisualizeArgs {
    sample_id: String,
    #[serde(default)]
    include_datasets: bool,
}

pub fn tool_definitions() -> Vec<Tool> {
    vec![
        tool(
            "get_sample",
            "Look up one sample of the current project by unique id.",
            json!({
                "type": "object",
                "properties": {
                    "sample_id": {"type": "string", "description": "Sample unique id"}
                },
                "required": ["sample_id"],
                "additionalProperties": false
            }),
        ),
        tool(
            "find_sample_by_name",
            "Find a sample of the current project by its sample name.",
            json!({
                "type": "object",
                "properties": {
                    "sample_name": {"type": "string", "description": "Exact sample name"}
                },
                "required": ["sample_name"],
                "additionalProperties": false
            }),
        ),
        tool(
            "search_project",
            "Search samples or datasets of the current project by partial name or id.",
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "Text contained in the name or id"},
                    "kind": {
                        "type": "string",
                        "enum": ["samples", "datasets"],
                        "description": "Records to search, samples by default"
                    }
                },
                "required": ["query"],
                "additionalProperties": false
            }),
        ),
        tool(
            "get_lineage",
            "List the ancestors and descendants of a sample, oldest first, with the path connecting each one.",
            json!({
                "type": "object",
                "properties": {
                    "sample_id": {"type": "string", "description": "Sample unique id"}
                },
                "required": ["sample_id"],
                "additionalProperties": false
            }),
        ),
        tool(
            "get_dataset",
            "Describe a dataset of the current project, including its scientific metadata and the samples that reference it.",
            json!({
                "type": "object",
                "properties": {
                    "dataset_id": {"type": "string", "description": "Dataset unique id"}
                },
                "required": ["dataset_id"],
                "additionalProperties": false
            }),
        ),
        tool(
            "visualize_lineage",
            "Build a node/edge graph of a sample's lineage for display.",
            json!({
                "type": "object",
                "properties": {
                    "sample_id": {"type": "string", "description": "Center sample unique id"},
                    "include_datasets": {"type": "boolean", "description": "Add dataset nodes"}
                },
                "required": ["sample_id"],
                "additionalProperties": false
            }),
        ),
    ]
}

fn tool(name: &str, description: &str, input_schema: Value) -> Tool {
    Tool {
        name: name.to_string(),
        description: description.to_string(),
        input_schema,
    }
}

/// Runs one tool call for `project_id` and returns its JSON result.
pub fn call_tool<C: CrucibleClient>(
    app: &App<C>,
    project_id: &ProjectId,
    name: &str,
    arguments: Value,
) -> Result<Value, CrucibleError> {
    tracing::info!(tool = %name, %project_id, "routing tool call");
    match name {
        "get_sample" => {
            let args: SampleArgs = parse_args(name, arguments)?;
            let project = app.cache().get_or_build(project_id)?;
            to_value(name, project.sample(&args.sample_id)?)
        }
        "find_sample_by_name" => {
            let args: SampleNameArgs = parse_args(name, arguments)?;
            let project = app.cache().get_or_build(project_id)?;
            let sample = project.sample_by_name(&args.sample_name)?;
            to_value(name, &SampleSummary::from(sample))
        }
        "search_project" => {
            let args: SearchArgs = parse_args(name, arguments)?;
            to_value(name, &app.search(project_id, args.kind, &args.query)?)
        }
        "get_lineage" => {
            let args: SampleArgs = parse_args(name, arguments)?;
            to_value(name, &app.lineage(project_id, &args.sample_id)?)
        }
        "get_dataset" => {
            let args: DatasetArgs = parse_args(name, arguments)?;
            to_value(name, &app.dataset(project_id, &args.dataset_id)?)
        }
        "visualize_lineage" => {
            let args: VisualizeArgs = parse_args(name, arguments)?;
            let visualization = app.visualize(
                project_id,
                &args.sample_id,
                args.include_datasets,
                GraphScope::Project,
            )?;
            to_value(name, &visualization)
        }
        other => Err(CrucibleError::UnknownTool(other.to_string())),
    }
}

fn parse_args<T: for<'de> Deserialize<'de>>(tool: &str, arguments: Value) -> Result<T, CrucibleError> {
    serde_json::from_value(arguments).map_err(|err| CrucibleError::InvalidToolArguments {
        tool: tool.to_string(),
        message: err.to_string(),
    })
}

fn to_value<T: Serialize + ?Sized>(tool: &str, value: &T) -> Result<Value, CrucibleError> {
    serde_json::to_value(value).map_err(|err| CrucibleError::InvalidToolArguments {
        tool: tool.to_string(),
        message: err.to_string(),
    })
}
