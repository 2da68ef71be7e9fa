//! Record store: per-dataset row lookup by identifier and the aligned id set

use crate::error::{ReconcileError, Result};
use crate::value::{RowKey, Value};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

/// Maximum number of datasets that can be compared in one run
pub const MAX_DATASETS: usize = 5;

/// One parsed row: column name -> raw value, in source column order
pub type Record = IndexMap<String, Value>;

/// One version of the tabular data being compared.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dataset {
    /// Opaque identifier of the uploaded source, passed through to results
    #[serde(default)]
    pub data_id: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    /// Declared header. When empty, columns are inferred from the rows.
    #[serde(default)]
    pub columns: Vec<String>,
    pub rows: Vec<Record>,
}

impl Dataset {
    pub fn new(label: impl Into<String>, rows: Vec<Record>) -> Self {
        Self {
            label: Some(label.into()),
            rows,
            ..Default::default()
        }
    }

    /// Declared header, or every column seen in any row (first-seen order).
    pub fn column_names(&self) -> IndexSet<&str> {
        if !self.columns.is_empty() {
            return self.columns.iter().map(String::as_str).collect();
        }
        self.rows
            .iter()
            .flat_map(|row| row.keys().map(String::as_str))
            .collect()
    }

    /// A dataset with no rows and no declared header has no schema to contradict.
    fn has_schema(&self) -> bool {
        !self.columns.is_empty() || !self.rows.is_empty()
    }
}

/// Static description of one dataset, carried into results and exports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub index: usize,
    pub data_id: Option<String>,
    pub label: String,
    /// Rows in the source dataset
    pub rows: usize,
    /// Rows dropped because their identifier was null or absent
    pub skipped_rows: usize,
}

/// Non-fatal: an identifier occurred more than once in one dataset.
/// The last occurrence is kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateIdentifierWarning {
    pub dataset_index: usize,
    pub id: RowKey,
    pub occurrences: usize,
}

#[derive(Debug)]
struct StoredDataset {
    info: DatasetInfo,
    rows: IndexMap<RowKey, Record>,
}

/// Read-only row index for one comparison run.
#[derive(Debug)]
pub struct RecordStore {
    datasets: Vec<StoredDataset>,
    /// Union of ids in first-seen order, with the raw identifier value first seen
    ids: IndexMap<RowKey, Value>,
    warnings: Vec<DuplicateIdentifierWarning>,
}

/// Check dataset count, compare columns and schema compatibility.
pub fn validate_schema(
    datasets: &[Dataset],
    identifier_column: &str,
    compare_columns: &[String],
) -> Result<()> {
    if datasets.is_empty() || datasets.len() > MAX_DATASETS {
        return Err(ReconcileError::invalid_input(format!(
            "Expected between 1 and {MAX_DATASETS} datasets, got {}",
            datasets.len()
        )));
    }
    if identifier_column.trim().is_empty() {
        return Err(ReconcileError::invalid_input("Identifier column must not be empty"));
    }
    if compare_columns.is_empty() {
        return Err(ReconcileError::EmptyComparison);
    }

    let mut seen = IndexSet::new();
    for column in compare_columns {
        if !seen.insert(column.as_str()) {
            return Err(ReconcileError::invalid_input(format!(
                "Compare column '{column}' is listed more than once"
            )));
        }
    }

    for (index, dataset) in datasets.iter().enumerate() {
        if !dataset.has_schema() {
            continue;
        }
        let columns = dataset.column_names();
        let missing: Vec<String> = std::iter::once(identifier_column)
            .chain(compare_columns.iter().map(String::as_str))
            .filter(|column| !columns.contains(column))
            .map(str::to_string)
            .collect();
        if !missing.is_empty() {
            return Err(ReconcileError::schema_mismatch(
                index,
                default_label(dataset, index),
                missing,
            ));
        }
    }

    Ok(())
}

fn default_label(dataset: &Dataset, index: usize) -> String {
    dataset
        .label
        .clone()
        .filter(|l| !l.trim().is_empty())
        .unwrap_or_else(|| format!("File {}", index + 1))
}

impl RecordStore {
    /// Validate and index the datasets. Consumes them; rows are moved, not copied.
    pub fn build(
        datasets: Vec<Dataset>,
        identifier_column: &str,
        compare_columns: &[String],
    ) -> Result<Self> {
        validate_schema(&datasets, identifier_column, compare_columns)?;

        let mut stored = Vec::with_capacity(datasets.len());
        let mut ids: IndexMap<RowKey, Value> = IndexMap::new();
        let mut warnings = Vec::new();

        for (index, dataset) in datasets.into_iter().enumerate() {
            let label = default_label(&dataset, index);
            let total_rows = dataset.rows.len();
            let mut rows: IndexMap<RowKey, Record> = IndexMap::with_capacity(total_rows);
            let mut occurrences: IndexMap<RowKey, usize> = IndexMap::new();
            let mut skipped_rows = 0;

            for row in dataset.rows {
                let raw_id = row.get(identifier_column);
                let Some(key) = RowKey::from_value(raw_id) else {
                    skipped_rows += 1;
                    continue;
                };
                if !ids.contains_key(&key) {
                    ids.insert(key.clone(), raw_id.cloned().unwrap_or(Value::Null));
                }
                *occurrences.entry(key.clone()).or_insert(0) += 1;
                rows.insert(key, row);
            }

            if skipped_rows > 0 {
                log::warn!(
                    "Dataset {index} ('{label}'): skipped {skipped_rows} row(s) without a value in '{identifier_column}'"
                );
            }

            for (id, count) in occurrences.into_iter().filter(|(_, count)| *count > 1) {
                log::warn!(
                    "Dataset {index} ('{label}'): identifier '{id}' occurs {count} times, keeping the last occurrence"
                );
                warnings.push(DuplicateIdentifierWarning {
                    dataset_index: index,
                    id,
                    occurrences: count,
                });
            }

            stored.push(StoredDataset {
                info: DatasetInfo {
                    index,
                    data_id: dataset.data_id,
                    label,
                    rows: total_rows,
                    skipped_rows,
                },
                rows,
            });
        }

        Ok(Self {
            datasets: stored,
            ids,
            warnings,
        })
    }

    /// Number of datasets (K)
    pub fn dataset_count(&self) -> usize {
        self.datasets.len()
    }

    pub fn lookup(&self, dataset_index: usize, id: &RowKey) -> Option<&Record> {
        self.datasets
            .get(dataset_index)
            .and_then(|dataset| dataset.rows.get(id))
    }

    /// Union of ids across datasets: dataset 0 first-seen order, then new ids of
    /// dataset 1, and so on.
    pub fn all_ids(&self) -> impl ExactSizeIterator<Item = &RowKey> {
        self.ids.keys()
    }

    pub fn id_count(&self) -> usize {
        self.ids.len()
    }

    /// Identifier value as it appeared in the first dataset containing the row
    pub fn raw_id(&self, id: &RowKey) -> Option<&Value> {
        self.ids.get(id)
    }

    pub fn dataset_infos(&self) -> Vec<DatasetInfo> {
        self.datasets.iter().map(|d| d.info.clone()).collect()
    }

    pub fn warnings(&self) -> &[DuplicateIdentifierWarning] {
        &self.warnings
    }
}
