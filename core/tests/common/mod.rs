//! Common test utilities and fixtures

#![allow(dead_code)]

use reconcile_core::media::MediaCatalog;
use reconcile_core::{ComparisonRequest, Dataset, Record};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Labels of the three fixture rounds, in dataset order
pub const ROUND_LABELS: [&str; 3] = ["Round A", "Round B", "Round C"];

/// Test fixture paths and utilities
pub struct TestFixtures {
    pub fixtures_dir: PathBuf,
    pub data_dir: PathBuf,
    pub configs_dir: PathBuf,
    pub media_dir: PathBuf,
}

impl TestFixtures {
    /// Get the test fixtures directory
    pub fn new() -> Self {
        let fixtures_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures");

        Self {
            data_dir: fixtures_dir.join("data"),
            configs_dir: fixtures_dir.join("configs"),
            media_dir: fixtures_dir.join("media"),
            fixtures_dir,
        }
    }

    /// Get path to a test data file
    pub fn data_file(&self, name: &str) -> PathBuf {
        self.data_dir.join(name)
    }

    /// Get path to a test config file
    pub fn config_file(&self, name: &str) -> PathBuf {
        self.configs_dir.join(name)
    }

    /// Load a JSON array of records as a labelled dataset
    pub fn dataset(&self, name: &str, label: &str) -> Dataset {
        let content = fs::read_to_string(self.data_file(name)).expect("Failed to read data file");
        let rows: Vec<Record> = serde_json::from_str(&content).expect("Invalid data fixture");
        Dataset {
            data_id: Some(name.to_string()),
            ..Dataset::new(label, rows)
        }
    }

    pub fn media_catalog(&self) -> MediaCatalog {
        let content = fs::read_to_string(self.media_dir.join("batch.json"))
            .expect("Failed to read media fixture");
        serde_json::from_str(&content).expect("Invalid media fixture")
    }

    /// The three labelling rounds compared on `label` and `status`
    pub fn rounds_request(&self) -> ComparisonRequest {
        let datasets = ["round_a.json", "round_b.json", "round_c.json"]
            .iter()
            .zip(ROUND_LABELS)
            .map(|(file, label)| self.dataset(file, label))
            .collect();
        ComparisonRequest::new(
            datasets,
            "id",
            vec!["label".to_string(), "status".to_string()],
        )
    }
}

/// Temporary directory for files written by a test
pub struct TestWorkspace {
    pub temp_dir: TempDir,
    pub path: PathBuf,
}

impl TestWorkspace {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().to_path_buf();
        Self { temp_dir, path }
    }

    /// Get the workspace path
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixtures_exist() {
        let fixtures = TestFixtures::new();
        assert!(fixtures.fixtures_dir.exists());
        assert!(fixtures.data_file("round_a.json").exists());
        assert!(fixtures.config_file("no_value.toml").exists());
        assert_eq!(fixtures.media_catalog().batch_id, "batch-42");
    }
}
