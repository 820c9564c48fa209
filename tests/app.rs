mod support;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use serde_json::json;

use crucible_graph_explorer::app::{App, GraphScope, SearchKind};
use crucible_graph_explorer::cache::CacheOptions;
use crucible_graph_explorer::domain::ProjectId;
use crucible_graph_explorer::error::CrucibleError;
use crucible_graph_explorer::store::Store;
use crucible_graph_explorer::tools::call_tool;

use support::{MockCrucible, abcd};

fn app(mock: MockCrucible, temp: &tempfile::TempDir) -> App<MockCrucible> {
    let store = Store::new_with_root(Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap());
    App::new(mock, store, CacheOptions::default(), 4)
}

fn project() -> ProjectId {
    "P".parse().unwrap()
}

#[test]
fn overview_sorts_by_name() {
    let temp = tempfile::tempdir().unwrap();
    let app = app(abcd(), &temp);
    let overview = app.overview(&project()).unwrap();
    let names: Vec<_> = overview
        .samples
        .iter()
        .map(|s| s.sample_name.clone().unwrap())
        .collect();
    assert_eq!(names, vec!["alpha", "beta", "delta", "gamma"]);
    assert_eq!(overview.sample_count, 4);
    assert_eq!(overview.dataset_count, 3);
}

#[test]
fn lineage_lists_sorted_relatives_with_paths() {
    let temp = tempfile::tempdir().unwrap();
    let app = app(abcd(), &temp);

    let lineage = app.lineage(&project(), "D").unwrap();
    let ancestors: Vec<&str> = lineage
        .ancestors
        .iter()
        .map(|entry| entry.sample.unique_id.as_str())
        .collect();
    assert_eq!(ancestors, vec!["A", "B"]);
    assert_eq!(lineage.ancestors[0].path, vec!["A", "B", "D"]);
    assert_eq!(lineage.ancestors[1].path, vec!["B", "D"]);
    assert!(lineage.descendants.is_empty());
    assert_eq!(lineage.datasets.len(), 1);

    let root = app.lineage(&project(), "A").unwrap();
    let descendants: Vec<&str> = root
        .descendants
        .iter()
        .map(|entry| entry.sample.unique_id.as_str())
        .collect();
    assert_eq!(descendants, vec!["B", "C", "D"]);
    assert_eq!(root.descendants[2].path, vec!["A", "B", "D"]);
}

#[test]
fn lineage_resolves_samples_outside_project() {
    // X is a child of A reported by the remote service but not listed in the
    // project and unknown to get_sample.
    let mut mock = abcd();
    mock.links.push(("A".to_string(), "X".to_string()));
    let temp = tempfile::tempdir().unwrap();
    let app = app(mock, &temp);

    let lineage = app.lineage(&project(), "A").unwrap();
    let outsider = lineage
        .descendants
        .iter()
        .find(|entry| entry.sample.unique_id == "X")
        .unwrap();
    assert_eq!(outsider.sample.sample_name, None);
    assert_eq!(app.cache().client().calls("get_sample"), 1);
}

#[test]
fn lineage_of_unknown_sample_is_not_found() {
    let temp = tempfile::tempdir().unwrap();
    let app = app(abcd(), &temp);
    let err = app.lineage(&project(), "nope").unwrap_err();
    assert_matches!(err, CrucibleError::SampleNotFound(_));
    assert!(err.is_not_found());
}

#[test]
fn dataset_view_lists_referencing_samples() {
    let temp = tempfile::tempdir().unwrap();
    let app = app(abcd(), &temp);
    let view = app.dataset(&project(), "d1").unwrap();
    let ids: Vec<&str> = view.samples.iter().map(|s| s.unique_id.as_str()).collect();
    assert_eq!(ids, vec!["A", "B"]);

    let err = app.dataset(&project(), "missing").unwrap_err();
    assert_matches!(err, CrucibleError::DatasetNotFound(_));
}

#[test]
fn search_finds_samples_and_datasets_by_fragment() {
    let temp = tempfile::tempdir().unwrap();
    let app = app(abcd(), &temp);

    let samples = app.search(&project(), SearchKind::Samples, "TA").unwrap();
    let ids: Vec<&str> = samples.hits.iter().map(|hit| hit.id.as_str()).collect();
    assert_eq!(ids, vec!["B", "D"]);
    assert_eq!(samples.hits[0].name, "beta");

    let by_id = app.search(&project(), SearchKind::Samples, "c").unwrap();
    assert_eq!(by_id.hits.len(), 1);
    assert_eq!(by_id.hits[0].id, "C");

    let datasets = app.search(&project(), SearchKind::Datasets, "SPIN").unwrap();
    assert_eq!(datasets.hits.len(), 1);
    assert_eq!(datasets.hits[0].id, "d1");
    assert_eq!(datasets.hits[0].name, "spin 1");

    let all = app.search(&project(), SearchKind::Datasets, "").unwrap();
    assert_eq!(all.hits.len(), 3);
    assert_eq!(app.cache().client().calls("list_samples"), 1);
}

#[test]
fn visualize_sample_scope_walks_remote_links() {
    let temp = tempfile::tempdir().unwrap();
    let app = app(abcd(), &temp);
    let vis = app
        .visualize(&project(), "B", false, GraphScope::Sample)
        .unwrap();
    let ids: Vec<&str> = vis.nodes.iter().map(|node| node.id.as_str()).collect();
    assert_eq!(ids, vec!["A", "B", "D"]);
    assert!(app.cache().client().calls("list_parents_of_sample") >= 2);
}

#[test]
fn graph_summary_and_regenerate() {
    let temp = tempfile::tempdir().unwrap();
    let app = app(abcd(), &temp);
    let summary = app.graph(&project()).unwrap();
    assert_eq!(summary.nodes, 4);
    assert_eq!(summary.edges, 3);
    assert_eq!(summary.roots, vec!["A"]);

    let invalidation = app.regenerate(&project()).unwrap();
    assert!(invalidation.removed_cache_file);
    app.graph(&project()).unwrap();
    assert_eq!(app.cache().client().calls("list_samples"), 2);
}

#[test]
fn projects_propagate_access_denied() {
    let mut mock = abcd();
    mock.denied = true;
    let temp = tempfile::tempdir().unwrap();
    let app = app(mock, &temp);
    assert_matches!(
        app.projects(None),
        Err(CrucibleError::AccessDenied { .. })
    );
}

#[test]
fn tool_calls_route_to_queries() {
    let temp = tempfile::tempdir().unwrap();
    let app = app(abcd(), &temp);

    let found = call_tool(&app, &project(), "find_sample_by_name", json!({"sample_name": "delta"}))
        .unwrap();
    assert_eq!(found["unique_id"], "D");

    let search = call_tool(
        &app,
        &project(),
        "search_project",
        json!({"query": "spin", "kind": "datasets"}),
    )
    .unwrap();
    assert_eq!(search["kind"], "datasets");
    assert_eq!(search["hits"][0], json!({"id": "d1", "name": "spin 1"}));

    let lineage = call_tool(&app, &project(), "get_lineage", json!({"sample_id": "D"})).unwrap();
    assert_eq!(lineage["ancestors"][0]["sample"]["unique_id"], "A");

    let vis = call_tool(
        &app,
        &project(),
        "visualize_lineage",
        json!({"sample_id": "A", "include_datasets": true}),
    )
    .unwrap();
    assert_eq!(vis["centerNodeId"], "A");

    assert_matches!(
        call_tool(&app, &project(), "get_sample", json!({})),
        Err(CrucibleError::InvalidToolArguments { .. })
    );
    assert_matches!(
        call_tool(&app, &project(), "delete_everything", json!({})),
        Err(CrucibleError::UnknownTool(_))
    );
}
