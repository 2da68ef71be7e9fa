//! Row aggregator: folds column comparisons into a row verdict

use crate::compare::{ColumnComparator, ColumnComparison};
use crate::error::{ReconcileError, Result};
use crate::store::RecordStore;
use crate::value::RowKey;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Comparison of every configured column for one aligned row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowComparison {
    pub id: RowKey,
    /// Exactly the configured compare columns, in configured order
    pub columns: IndexMap<String, ColumnComparison>,
    /// True iff every column is all-equal
    pub equal: bool,
    /// Number of columns that are not all-equal
    pub mismatch_count: usize,
    /// Whether each dataset contains this row
    pub present: Vec<bool>,
}

impl RowComparison {
    pub fn column(&self, name: &str) -> Option<&ColumnComparison> {
        self.columns.get(name)
    }

    /// Column lookup that also accepts a differently-cased or padded name
    pub fn column_loose(&self, name: &str) -> Option<&ColumnComparison> {
        if let Some(found) = self.columns.get(name) {
            return Some(found);
        }
        let target = name.trim().to_lowercase();
        self.columns
            .iter()
            .find(|(key, _)| key.trim().to_lowercase() == target)
            .map(|(_, cmp)| cmp)
    }

    /// Columns that are not all-equal, in configured order
    pub fn mismatched_columns(&self) -> impl Iterator<Item = &ColumnComparison> {
        self.columns.values().filter(|cmp| !cmp.all_equal)
    }

    pub fn missing_from(&self) -> Vec<usize> {
        self.present
            .iter()
            .enumerate()
            .filter_map(|(i, &present)| (!present).then_some(i))
            .collect()
    }
}

/// Compares all configured columns of one row.
#[derive(Debug, Clone)]
pub struct RowComparer<'a> {
    store: &'a RecordStore,
    comparator: &'a ColumnComparator,
    compare_columns: &'a [String],
}

impl<'a> RowComparer<'a> {
    pub fn new(
        store: &'a RecordStore,
        comparator: &'a ColumnComparator,
        compare_columns: &'a [String],
    ) -> Self {
        Self {
            store,
            comparator,
            compare_columns,
        }
    }

    pub fn compare_row(&self, id: &RowKey) -> Result<RowComparison> {
        let rows: Vec<_> = (0..self.store.dataset_count())
            .map(|index| self.store.lookup(index, id))
            .collect();

        let mut columns = IndexMap::with_capacity(self.compare_columns.len());
        let mut mismatch_count = 0;

        for column in self.compare_columns {
            let cells: Vec<_> = rows
                .iter()
                .map(|row| row.map(|record| record.get(column)))
                .collect();
            let comparison = self
                .comparator
                .compare(column, &cells)
                .map_err(|message| ReconcileError::row_processing(id.as_str(), column.as_str(), message))?;
            if !comparison.all_equal {
                mismatch_count += 1;
            }
            columns.insert(column.clone(), comparison);
        }

        Ok(RowComparison {
            id: id.clone(),
            columns,
            equal: mismatch_count == 0,
            mismatch_count,
            present: rows.iter().map(Option::is_some).collect(),
        })
    }
}
