//! Result assembler: the interactive result object of a comparison run

use crate::compare::MissingRowPolicy;
use crate::error::{ReconcileError, Result};
use crate::media::MediaRef;
use crate::overrides::{reference_value, resolve_final_value, OverrideMap, OverrideOutcome};
use crate::row::RowComparison;
use crate::store::{DatasetInfo, DuplicateIdentifierWarning, Record};
use crate::summary::SummaryStats;
use crate::value::{NormalizationOptions, Normalizer, RowKey, Value};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use uuid::Uuid;

/// One dataset's raw row for an aligned identifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetRow {
    pub data_id: Option<String>,
    /// `None` when the dataset lacks this row
    pub row_data: Option<Record>,
}

/// One aligned row of the interactive result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowResult {
    /// Position in identifier order
    pub row_index: usize,
    pub id: RowKey,
    /// Identifier value as it appeared in the first dataset containing the row
    pub id_value: Value,
    pub rows: Vec<DatasetRow>,
    pub compare: RowComparison,
    /// Reference values per compare column, before overrides
    pub final_values: IndexMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaRef>,
}

impl RowResult {
    pub fn has_media(&self) -> bool {
        self.media.is_some()
    }
}

/// Bookkeeping for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub worker_threads: usize,
}

/// Everything a caller needs to display, filter and export one comparison run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub format_version: String,
    pub metadata: RunMetadata,
    pub identifier_column: String,
    pub compare_columns: Vec<String>,
    pub reference_index: Option<usize>,
    pub missing_rows: MissingRowPolicy,
    pub normalization: NormalizationOptions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_column: Option<String>,
    pub datasets_info: Vec<DatasetInfo>,
    pub results: Vec<RowResult>,
    pub summary: SummaryStats,
    #[serde(default)]
    pub warnings: Vec<DuplicateIdentifierWarning>,
}

impl ComparisonResult {
    /// Load a result previously written with [`ComparisonResult::save`]
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let result: Self = serde_json::from_str(&content)?;
        Ok(result)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn dataset_count(&self) -> usize {
        self.datasets_info.len()
    }

    pub fn row(&self, id: &RowKey) -> Option<&RowResult> {
        self.results.iter().find(|row| &row.id == id)
    }

    /// Look a row up by a raw identifier, aligned the same way as during the run
    pub fn row_by_value(&self, id_value: &Value) -> Option<&RowResult> {
        RowKey::from_value(Some(id_value)).and_then(|key| self.row(&key))
    }

    pub fn normalizer(&self) -> Normalizer {
        Normalizer::new(self.normalization.clone())
    }

    pub fn final_value(&self, row: &RowResult, column: &str, overrides: &OverrideMap) -> Value {
        resolve_final_value(&row.compare, column, self.reference_index, overrides)
    }

    /// Final value of every compare column of a row, in configured order
    pub fn resolved_final_values(
        &self,
        row: &RowResult,
        overrides: &OverrideMap,
    ) -> IndexMap<String, Value> {
        self.compare_columns
            .iter()
            .map(|column| (column.clone(), self.final_value(row, column, overrides)))
            .collect()
    }

    /// Record a user's chosen final value. Setting the reference value (or null)
    /// clears any existing override for the cell.
    pub fn set_override(
        &self,
        overrides: &mut OverrideMap,
        id: &RowKey,
        column: &str,
        value: Value,
    ) -> Result<OverrideOutcome> {
        let row = self.checked_cell(id, column)?;
        let reference = reference_value(&row.compare, column, self.reference_index);
        Ok(overrides.set(id.clone(), column, value, Some(&reference), &self.normalizer()))
    }

    pub fn clear_override(&self, overrides: &mut OverrideMap, id: &RowKey, column: &str) -> Result<bool> {
        self.checked_cell(id, column)?;
        Ok(overrides.clear(id, column))
    }

    fn checked_cell(&self, id: &RowKey, column: &str) -> Result<&RowResult> {
        if !self.compare_columns.iter().any(|c| c == column) {
            return Err(ReconcileError::invalid_input(format!(
                "'{column}' is not a compare column"
            )));
        }
        self.row(id)
            .ok_or_else(|| ReconcileError::invalid_input(format!("No row with identifier '{id}'")))
    }

    /// Summary recomputed from the row comparisons
    pub fn recompute_summary(&self) -> SummaryStats {
        SummaryStats::from_rows(&self.compare_columns, self.results.iter().map(|r| &r.compare))
    }

    /// Content hash of the row comparisons and summary. Two runs over identical
    /// inputs and configuration have the same fingerprint.
    pub fn fingerprint(&self) -> Result<String> {
        let mut hasher = blake3::Hasher::new();
        for row in &self.results {
            hasher.update(&serde_json::to_vec(&row.compare)?);
        }
        hasher.update(&serde_json::to_vec(&self.summary)?);
        Ok(hasher.finalize().to_hex().to_string())
    }
}
