//! End-to-end comparison runs over the fixture rounds

use reconcile_core::compare::Agreement;
use reconcile_core::config::load_config_from;
use reconcile_core::engine::ComparisonOptions;
use reconcile_core::overrides::OverrideOutcome;
use reconcile_core::projection::{project, RowQuery, RowStatusFilter};
use reconcile_core::store::Record;
use reconcile_core::{
    ComparisonEngine, ComparisonRequest, ComparisonResult, Dataset, MissingRowPolicy, OverrideMap,
    ReconcileError, RowKey,
};
use serde_json::{json, Value};

mod common;
use common::TestFixtures;

fn run(request: ComparisonRequest) -> ComparisonResult {
    ComparisonEngine::default().compare(request).unwrap()
}

fn key(id: &str) -> RowKey {
    RowKey::from(id)
}

#[test]
fn test_rounds_alignment_and_verdicts() {
    let result = run(TestFixtures::new().rounds_request());

    let ids: Vec<&str> = result.results.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "2", "3", "4", "5"]);

    let verdicts: Vec<bool> = result.results.iter().map(|r| r.compare.equal).collect();
    assert_eq!(verdicts, vec![true, false, false, true, true]);

    let row2 = result.row(&key("2")).unwrap();
    let status = &row2.compare.columns["status"];
    assert_eq!(status.agreement, Agreement::PartialEqual);
    assert_eq!(status.different_from_ref, Some(vec![true, true]));

    let row3 = result.row(&key("3")).unwrap();
    assert_eq!(row3.compare.columns["label"].agreement, Agreement::AllDifferent);
    // "ok " is trimmed before comparison
    assert!(row3.compare.columns["status"].all_equal);
    assert_eq!(row3.compare.mismatch_count, 1);

    // row 4 is missing from round B, which abstains
    let row4 = result.row(&key("4")).unwrap();
    assert!(row4.compare.equal);
    assert_eq!(row4.compare.missing_from(), vec![1]);
    assert_eq!(row4.compare.columns["label"].different_from_ref, Some(vec![false, false]));
    assert!(row4.rows[1].row_data.is_none());

    // row 5 only exists in round B
    let row5 = result.row(&key("5")).unwrap();
    assert!(row5.compare.equal);
    assert_eq!(row5.final_values["label"], Value::Null);
}

#[test]
fn test_rounds_summary() {
    let result = run(TestFixtures::new().rounds_request());
    let summary = &result.summary;

    assert_eq!(summary.overall.total_rows, 5);
    assert_eq!(summary.overall.rows_all_same, 3);
    assert_eq!(summary.overall.rows_any_diff, 2);

    let label = &summary.columns["label"];
    assert_eq!((label.total_rows, label.same_count, label.diff_count), (5, 4, 1));
    assert_eq!((label.partial_equal_rows, label.all_diff_rows), (0, 1));

    let status = &summary.columns["status"];
    assert_eq!((status.same_count, status.diff_count), (4, 1));
    assert_eq!((status.partial_equal_rows, status.all_diff_rows), (1, 0));

    for stats in summary.columns.values() {
        assert_eq!(stats.same_count + stats.diff_count, stats.total_rows);
        assert_eq!(stats.partial_equal_rows + stats.all_diff_rows, stats.diff_count);
    }
}

#[test]
fn test_dataset_info_and_skipped_rows() {
    let result = run(TestFixtures::new().rounds_request());
    let labels: Vec<&str> = result.datasets_info.iter().map(|d| d.label.as_str()).collect();
    assert_eq!(labels, common::ROUND_LABELS);

    let round_c = &result.datasets_info[2];
    assert_eq!(round_c.rows, 5);
    assert_eq!(round_c.skipped_rows, 1);
    assert_eq!(round_c.data_id.as_deref(), Some("round_c.json"));
    assert_eq!(result.results[0].rows[2].data_id.as_deref(), Some("round_c.json"));
}

#[test]
fn test_identical_inputs_give_identical_output() {
    let fixtures = TestFixtures::new();
    let first = run(fixtures.rounds_request());
    let second = ComparisonEngine::new(ComparisonOptions {
        batch_size: 1,
        worker_threads: Some(3),
        ..ComparisonOptions::default()
    })
    .compare(fixtures.rounds_request())
    .unwrap();

    assert_eq!(first.fingerprint().unwrap(), second.fingerprint().unwrap());
    assert_eq!(
        serde_json::to_string(&first.results).unwrap(),
        serde_json::to_string(&second.results).unwrap()
    );
    assert_eq!(first.summary, second.summary);
    assert_ne!(first.metadata.run_id, second.metadata.run_id);
}

#[test]
fn test_row_count_matches_id_union() {
    let result = run(TestFixtures::new().rounds_request());
    assert_eq!(result.results.len(), 5);
    assert_eq!(result.summary.overall.total_rows, result.results.len());
}

#[test]
fn test_two_dataset_example() {
    let ok = Dataset::new("a", vec![record(1, "ok")]);
    let fail = Dataset::new("b", vec![record(1, "fail")]);
    let result = run(ComparisonRequest::new(vec![ok, fail], "id", vec!["status".to_string()]));

    let row = &result.results[0];
    let status = &row.compare.columns["status"];
    assert_eq!(status.values, vec![json!("ok"), json!("fail")]);
    assert!(!status.all_equal);
    assert_eq!(status.different_from_ref, Some(vec![true]));
    assert!(!row.compare.equal);

    let stats = &result.summary.columns["status"];
    assert_eq!(
        (stats.total_rows, stats.same_count, stats.diff_count, stats.partial_equal_rows, stats.all_diff_rows),
        (1, 0, 1, 0, 1)
    );
}

#[test]
fn test_similar_string_identifiers_are_separate_rows() {
    let make = |id: &str, status: &str| {
        let mut r = Record::new();
        r.insert("id".to_string(), json!(id));
        r.insert("status".to_string(), json!(status));
        r
    };
    let a = Dataset::new("a", vec![make("1.1", "x"), make("1.10", "y"), make("A", "p")]);
    let b = Dataset::new("b", vec![make("1.1", "x"), make(" A", "q")]);
    let result = run(ComparisonRequest::new(vec![a, b], "id", vec!["status".to_string()]));

    let ids: Vec<&str> = result.results.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["1.1", "1.10", "A", " A"]);
    assert!(result.warnings.is_empty());
    assert_eq!(result.summary.overall.total_rows, 4);
}

#[test]
fn test_override_set_then_clear_restores_reference() {
    let ok = Dataset::new("a", vec![record(1, "ok")]);
    let fail = Dataset::new("b", vec![record(1, "fail")]);
    let result = run(ComparisonRequest::new(vec![ok, fail], "id", vec!["status".to_string()]));
    let row = &result.results[0];

    let mut overrides = OverrideMap::new();
    let outcome = result
        .set_override(&mut overrides, &key("1"), "status", json!("fail"))
        .unwrap();
    assert_eq!(outcome, OverrideOutcome::Stored);
    assert_eq!(result.final_value(row, "status", &overrides), json!("fail"));

    assert!(result.clear_override(&mut overrides, &key("1"), "status").unwrap());
    assert_eq!(result.final_value(row, "status", &overrides), json!("ok"));
    assert!(overrides.is_empty());
}

#[test]
fn test_override_to_reference_value_is_idempotent() {
    let result = run(TestFixtures::new().rounds_request());
    let row = result.row(&key("2")).unwrap();
    let before = OverrideMap::new();
    let mut overrides = before.clone();

    let reference = result.final_value(row, "status", &overrides);
    let outcome = result
        .set_override(&mut overrides, &key("2"), "status", reference.clone())
        .unwrap();
    assert_eq!(outcome, OverrideOutcome::Cleared);
    assert_eq!(result.final_value(row, "status", &overrides), reference);
    result.clear_override(&mut overrides, &key("2"), "status").unwrap();
    assert_eq!(overrides, before);
}

#[test]
fn test_override_rejects_unknown_cells() {
    let result = run(TestFixtures::new().rounds_request());
    let mut overrides = OverrideMap::new();
    assert!(matches!(
        result.set_override(&mut overrides, &key("99"), "status", json!("x")),
        Err(ReconcileError::InvalidInput(_))
    ));
    assert!(matches!(
        result.set_override(&mut overrides, &key("1"), "image", json!("x")),
        Err(ReconcileError::InvalidInput(_))
    ));
}

#[test]
fn test_single_dataset_is_always_equal() {
    let fixtures = TestFixtures::new();
    let request = ComparisonRequest::new(
        vec![fixtures.dataset("round_a.json", "Only")],
        "id",
        vec!["label".to_string(), "status".to_string()],
    );
    let result = run(request);
    assert!(result.results.iter().all(|r| r.compare.equal));
    assert_eq!(result.summary.overall.rows_any_diff, 0);
}

#[test]
fn test_configured_missing_row_policy() {
    let fixtures = TestFixtures::new();
    let config = load_config_from(&fixtures.config_file("no_value.toml")).unwrap();
    assert_eq!(config.comparison.missing_rows, MissingRowPolicy::NoValue);

    let request = fixtures
        .rounds_request()
        .with_reference(config.comparison.reference_index);
    let result = ComparisonEngine::new(ComparisonOptions::from_config(&config))
        .compare(request)
        .unwrap();

    // rows 4 and 5 are incomplete, so a missing round now counts as a disagreement
    let verdicts: Vec<bool> = result.results.iter().map(|r| r.compare.equal).collect();
    assert_eq!(verdicts, vec![true, false, false, false, false]);
    assert_eq!(result.results[4].final_values["label"], json!("cow"));
}

#[test]
fn test_schema_mismatch_is_reported_before_running() {
    let fixtures = TestFixtures::new();
    let mut request = fixtures.rounds_request();
    request.compare_columns.push("image".to_string());

    match ComparisonEngine::default().compare(request) {
        Err(ReconcileError::SchemaMismatch { dataset_index, missing, .. }) => {
            assert_eq!(dataset_index, 2);
            assert_eq!(missing, vec!["image".to_string()]);
        }
        other => panic!("expected schema mismatch, got {other:?}"),
    }
}

#[test]
fn test_media_and_projections() {
    let fixtures = TestFixtures::new();
    let request = fixtures
        .rounds_request()
        .with_media("image", fixtures.media_catalog());
    let result = run(request);

    let with_media: Vec<&str> = result
        .results
        .iter()
        .filter(|r| r.has_media())
        .map(|r| r.id.as_str())
        .collect();
    assert_eq!(with_media, vec!["1", "3"]);
    assert_eq!(result.results[0].media.as_ref().unwrap().filename, "IMG_0001.JPG");

    let diff_rows = project(
        &result.results,
        &RowQuery {
            status: RowStatusFilter::Diff,
            ..Default::default()
        },
    );
    let ids: Vec<&str> = diff_rows.rows.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["2", "3"]);
}

#[test]
fn test_result_round_trips_through_disk() {
    let workspace = common::TestWorkspace::new();
    let result = run(TestFixtures::new().rounds_request());
    let path = workspace.file("nested/result.json");

    result.save(&path).unwrap();
    let loaded = ComparisonResult::load(&path).unwrap();
    assert_eq!(loaded.results, result.results);
    assert_eq!(loaded.datasets_info, result.datasets_info);
    assert_eq!(loaded.recompute_summary(), result.summary);
}

fn record(id: i64, status: &str) -> Record {
    let mut r = Record::new();
    r.insert("id".to_string(), json!(id));
    r.insert("status".to_string(), json!(status));
    r
}
