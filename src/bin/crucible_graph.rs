use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use crucible_graph_explorer::app::{App, GraphScope, SearchKind};
use crucible_graph_explorer::cache::CacheOptions;
use crucible_graph_explorer::config::{ConfigLoader, ResolvedConfig};
use crucible_graph_explorer::crucible::CrucibleHttpClient;
use crucible_graph_explorer::domain::ProjectId;
use crucible_graph_explorer::error::CrucibleError;
use crucible_graph_explorer::output::JsonOutput;
use crucible_graph_explorer::store::Store;
use crucible_graph_explorer::tools::{call_tool, tool_definitions};

#[derive(Parser)]
#[command(name = "crucible-graph")]
#[command(about = "Explore sample lineage of Crucible projects")]
#[command(version, author)]
struct Cli {
    /// Config file (defaults to ./crucible-graph.json when present)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "List projects visible to the API key")]
    Projects(ProjectsArgs),
    #[command(about = "Show samples and dataset counts of a project")]
    Overview(ProjectArgs),
    #[command(about = "Show ancestors and descendants of a sample")]
    Lineage(SampleArgs),
    #[command(about = "Show a dataset and the samples that reference it")]
    Dataset(DatasetArgs),
    #[command(about = "Search project samples or datasets by name or id")]
    Search(SearchArgs),
    #[command(about = "Emit the visualization payload for a sample")]
    Visualize(VisualizeArgs),
    #[command(about = "Build (or load) the project lineage graph")]
    Graph(ProjectArgs),
    #[command(about = "Drop cached project data so it is refetched")]
    Regenerate(ProjectArgs),
    #[command(about = "List chat tool definitions")]
    Tools,
    #[command(about = "Run one chat tool call against a project")]
    Tool(ToolArgs),
}

#[derive(Args)]
struct ProjectsArgs {
    /// Only projects owned by this ORCID
    #[arg(long)]
    owner: Option<String>,
}

#[derive(Args)]
struct ProjectArgs {
    project: String,
}

#[derive(Args)]
struct SampleArgs {
    project: String,
    sample: String,
}

#[derive(Args)]
struct DatasetArgs {
    project: String,
    dataset: String,
}

#[derive(Args)]
struct SearchArgs {
    project: String,
    /// Text contained in the name or id; empty lists everything
    #[arg(default_value = "")]
    query: String,

    #[arg(long, value_enum, default_value_t = SearchKind::Samples)]
    kind: SearchKind,
}

#[derive(Args)]
struct VisualizeArgs {
    project: String,
    sample: String,

    #[arg(long)]
    datasets: bool,

    #[arg(long, value_enum, default_value_t = GraphScope::Project)]
    scope: GraphScope,
}

#[derive(Args)]
struct ToolArgs {
    project: String,
    name: String,

    /// JSON object with the tool arguments
    #[arg(default_value = "{}")]
    arguments: String,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<CrucibleError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &CrucibleError) -> u8 {
    match error {
        err if err.is_not_found() => 2,
        CrucibleError::CrucibleHttp(_)
        | CrucibleError::CrucibleStatus { .. }
        | CrucibleError::AccessDenied { .. }
        | CrucibleError::MalformedResponse(_)
        | CrucibleError::MissingApiKey => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Commands::Tools = cli.command {
        return JsonOutput::print(&tool_definitions()).into_diagnostic();
    }

    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let app = build_app(&config)?;

    match cli.command {
        Commands::Projects(args) => print(&app.projects(args.owner.as_deref())?),
        Commands::Overview(args) => print(&app.overview(&args.project.parse()?)?),
        Commands::Lineage(args) => print(&app.lineage(&args.project.parse()?, &args.sample)?),
        Commands::Dataset(args) => print(&app.dataset(&args.project.parse()?, &args.dataset)?),
        Commands::Search(args) => {
            print(&app.search(&args.project.parse()?, args.kind, &args.query)?)
        }
        Commands::Visualize(args) => {
            let project: ProjectId = args.project.parse()?;
            print(&app.visualize(&project, &args.sample, args.datasets, args.scope)?)
        }
        Commands::Graph(args) => print(&app.graph(&args.project.parse()?)?),
        Commands::Regenerate(args) => print(&app.regenerate(&args.project.parse()?)?),
        Commands::Tool(args) => {
            let project: ProjectId = args.project.parse()?;
            let arguments = serde_json::from_str(&args.arguments).map_err(|err| {
                CrucibleError::InvalidToolArguments {
                    tool: args.name.clone(),
                    message: err.to_string(),
                }
            })?;
            print(&call_tool(&app, &project, &args.name, arguments)?)
        }
        Commands::Tools => Ok(()),
    }
}

fn build_app(config: &ResolvedConfig) -> miette::Result<App<CrucibleHttpClient>> {
    let store = match &config.cache_dir {
        Some(dir) => Store::new_with_root(dir.clone()),
        None => Store::new()?,
    };
    store.ensure_cache_root()?;
    let client = CrucibleHttpClient::new(&config.api_url)?;
    let options = CacheOptions {
        include_metadata: config.include_metadata,
        persist: config.persist,
    };
    Ok(App::new(client, store, options, config.thumbnail_workers))
}

fn print<T: serde::Serialize>(value: &T) -> miette::Result<()> {
    JsonOutput::print(value).into_diagnostic()
}
