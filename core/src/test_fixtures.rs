//! Small dataset builders shared by unit tests, integration tests and the CLI tests

use crate::engine::ComparisonRequest;
use crate::store::{Dataset, Record};
use crate::value::Value;
use serde_json::json;

/// Build a record from `(column, value)` pairs
pub fn record(pairs: &[(&str, Value)]) -> Record {
    pairs
        .iter()
        .map(|(column, value)| (column.to_string(), value.clone()))
        .collect()
}

pub fn columns(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

/// A dataset with `id` and `status` columns
pub fn status_dataset(label: &str, rows: &[(i64, &str)]) -> Dataset {
    Dataset::new(
        label,
        rows.iter()
            .map(|(id, status)| record(&[("id", json!(id)), ("status", json!(status))]))
            .collect(),
    )
}

/// Two datasets disagreeing on row 1: `ok` vs `fail`
pub fn two_way_disagreement() -> ComparisonRequest {
    ComparisonRequest::new(
        vec![
            status_dataset("File 1", &[(1, "ok")]),
            status_dataset("File 2", &[(1, "fail")]),
        ],
        "id",
        columns(&["status"]),
    )
}

/// Three annotators labelling the same items, with partial and full disagreement
pub fn three_annotators() -> ComparisonRequest {
    let labels = [
        ("Round A", ["cat", "dog", "bird", "fish"]),
        ("Round B", ["cat", "dog", "bat", "fish"]),
        ("Round C", ["cat", "cow", "ant", "fish"]),
    ];
    let datasets = labels
        .iter()
        .map(|(label, values)| {
            Dataset::new(
                *label,
                values
                    .iter()
                    .enumerate()
                    .map(|(i, value)| {
                        record(&[
                            ("id", json!(i + 1)),
                            ("label", json!(value)),
                            ("score", json!(i)),
                        ])
                    })
                    .collect(),
            )
        })
        .collect();
    ComparisonRequest::new(datasets, "id", columns(&["label", "score"]))
}
