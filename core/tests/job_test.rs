//! Job lifecycle through the manager

use reconcile_core::engine::ComparisonOptions;
use reconcile_core::{
    ComparisonEngine, ExportFormat, ExportOptions, JobManager, JobState, OverrideMap, ReconcileError,
};

mod common;
use common::TestFixtures;

#[test]
fn test_job_runs_to_completion() {
    let manager = JobManager::default();
    let id = manager.start(TestFixtures::new().rounds_request()).unwrap();

    let status = manager.wait(id).unwrap();
    assert_eq!(status.state, JobState::Completed);
    assert_eq!((status.processed, status.total), (5, 5));
    assert!(status.error.is_none());

    let result = manager.result(id).unwrap();
    assert_eq!(result.summary.overall.rows_any_diff, 2);
    assert_eq!(manager.list().len(), 1);
}

#[test]
fn test_invalid_request_fails_at_start() {
    let manager = JobManager::default();
    let mut request = TestFixtures::new().rounds_request();
    request.compare_columns = vec!["missing".to_string()];

    let err = manager.start(request).unwrap_err();
    assert!(err.is_configuration_error());
    assert!(manager.list().is_empty());
}

#[test]
fn test_export_uses_manager_defaults() {
    let options = ExportOptions {
        include_audit_columns: false,
        delimiter: '\t',
        ..ExportOptions::default()
    };
    let manager = JobManager::new(
        ComparisonEngine::new(ComparisonOptions::default()),
        options,
    );
    let id = manager.start(TestFixtures::new().rounds_request()).unwrap();
    manager.wait(id).unwrap();

    let bytes = manager.export(id, &OverrideMap::new(), ExportFormat::Csv).unwrap();
    let text = String::from_utf8(bytes).unwrap();
    assert_eq!(text.lines().next(), Some("id\tlabel\tstatus"));
}

#[test]
fn test_failed_row_fails_the_job() {
    let fixtures = TestFixtures::new();
    let mut request = fixtures.rounds_request();
    if let Some(row) = request.datasets[1].rows.first_mut() {
        row.insert("label".to_string(), serde_json::json!({ "nested": true }));
    }

    let manager = JobManager::default();
    let id = manager.start(request).unwrap();
    let status = manager.wait(id).unwrap();

    assert_eq!(status.state, JobState::Failed);
    assert!(!status.cancelled);
    assert!(status.error.unwrap().contains("label"));
    assert!(matches!(
        manager.result(id),
        Err(ReconcileError::ExportPrecondition(_))
    ));
}
