//! Override overlay and final value resolution
//!
//! Overrides are a sparse `row -> column -> value` overlay supplied by the caller
//! after a run. They never live inside a comparison result; every resolution and
//! export takes an immutable snapshot of the map.

use crate::row::RowComparison;
use crate::value::{Normalizer, RowKey, Value};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One override cell. In JSON a `null` is the clear marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OverrideEntry {
    Clear,
    Set(Value),
}

impl OverrideEntry {
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Clear => None,
            Self::Set(value) => Some(value),
        }
    }
}

/// What a call to [`OverrideMap::set`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideOutcome {
    Stored,
    /// The value matched the reference (or was null), so no override is kept
    Cleared,
}

/// Sparse override map keyed by row then column.
///
/// Rows never hold an empty column map: removing the last override of a row
/// removes the row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OverrideMap(BTreeMap<RowKey, BTreeMap<String, OverrideEntry>>);

impl OverrideMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of (row, column) entries
    pub fn len(&self) -> usize {
        self.0.values().map(BTreeMap::len).sum()
    }

    pub fn rows(&self) -> impl Iterator<Item = (&RowKey, &BTreeMap<String, OverrideEntry>)> {
        self.0.iter()
    }

    /// The override value for a cell, ignoring clear markers
    pub fn get(&self, id: &RowKey, column: &str) -> Option<&Value> {
        self.0
            .get(id)
            .and_then(|row| row.get(column))
            .and_then(OverrideEntry::value)
    }

    /// Set an override. A value equal to the reference value after normalization,
    /// or a null value, removes the override instead of storing a redundant entry.
    pub fn set(
        &mut self,
        id: RowKey,
        column: &str,
        value: Value,
        reference: Option<&Value>,
        normalizer: &Normalizer,
    ) -> OverrideOutcome {
        let same_as_reference = match (normalizer.normalize(Some(&value)), normalizer.normalize(reference)) {
            (Ok(new), Ok(reference)) => new == reference,
            _ => false,
        };

        if value.is_null() || same_as_reference {
            self.clear(&id, column);
            return OverrideOutcome::Cleared;
        }

        self.0
            .entry(id)
            .or_default()
            .insert(column.to_string(), OverrideEntry::Set(value));
        OverrideOutcome::Stored
    }

    /// Remove an override. Returns true if one existed.
    pub fn clear(&mut self, id: &RowKey, column: &str) -> bool {
        let Some(row) = self.0.get_mut(id) else {
            return false;
        };
        let removed = row.remove(column).is_some();
        if row.is_empty() {
            self.0.remove(id);
        }
        removed
    }

    /// Drop every override of a row
    pub fn clear_row(&mut self, id: &RowKey) -> bool {
        self.0.remove(id).is_some()
    }

    /// Copy without clear markers or empty rows
    pub fn normalized(&self) -> Self {
        let rows = self
            .0
            .iter()
            .filter_map(|(id, columns)| {
                let kept: BTreeMap<String, OverrideEntry> = columns
                    .iter()
                    .filter(|(_, entry)| matches!(entry, OverrideEntry::Set(_)))
                    .map(|(column, entry)| (column.clone(), entry.clone()))
                    .collect();
                (!kept.is_empty()).then(|| (id.clone(), kept))
            })
            .collect();
        Self(rows)
    }
}

/// Override row in the list form `{ "id_value": .., "final_values": { col: value|null } }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverrideRow {
    pub id_value: Value,
    #[serde(default)]
    pub final_values: IndexMap<String, OverrideEntry>,
}

/// Overrides as supplied by a caller: either the map form or the list form.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OverridePayload {
    Map(OverrideMap),
    Rows(Vec<OverrideRow>),
}

impl OverridePayload {
    /// Convert to a normalized map. Rows whose id is null are ignored; later rows
    /// for the same id replace earlier ones column by column. Map keys and list
    /// `id_value`s resolve to row keys the same way.
    pub fn into_map(self) -> OverrideMap {
        let rows: Vec<(Value, Vec<(String, OverrideEntry)>)> = match self {
            Self::Map(map) => map
                .0
                .into_iter()
                .map(|(id, columns)| {
                    let id_value = Value::String(id.as_str().to_string());
                    (id_value, columns.into_iter().collect())
                })
                .collect(),
            Self::Rows(rows) => rows
                .into_iter()
                .map(|row| (row.id_value, row.final_values.into_iter().collect()))
                .collect(),
        };

        let mut map = OverrideMap::new();
        for (id_value, columns) in rows {
            let Some(id) = RowKey::from_value(Some(&id_value)) else {
                log::debug!("Ignoring override row without id_value");
                continue;
            };
            map.0.entry(id).or_default().extend(columns);
        }
        map.normalized()
    }
}

/// The reference dataset's raw value for a cell, or null
pub fn reference_value(
    row: &RowComparison,
    column: &str,
    reference_index: Option<usize>,
) -> Value {
    reference_index
        .and_then(|reference| {
            row.columns
                .get(column)
                .and_then(|cmp| cmp.values.get(reference))
        })
        .cloned()
        .unwrap_or(Value::Null)
}

/// Final value of a cell: the override if one is set, else the reference value.
pub fn resolve_final_value(
    row: &RowComparison,
    column: &str,
    reference_index: Option<usize>,
    overrides: &OverrideMap,
) -> Value {
    match overrides.get(&row.id, column) {
        Some(value) => value.clone(),
        None => reference_value(row, column, reference_index),
    }
}
