//! Column comparator: equality of one column across the K datasets of a row

use crate::value::{NormalizedValue, Normalizer, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How a dataset that lacks a row entirely takes part in equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingRowPolicy {
    /// The dataset does not vote. A row present in a single dataset is all-equal.
    #[default]
    Abstain,
    /// The dataset votes with "no value", like a null cell.
    NoValue,
}

/// How the normalized values of one column relate to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Agreement {
    AllEqual,
    /// At least two values agree, but not all of them
    PartialEqual,
    /// Every value differs from every other
    AllDifferent,
}

/// Comparison of one column for one aligned row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnComparison {
    pub column: String,
    /// Raw value per dataset; null when the cell is null/absent or the row is missing
    pub values: Vec<Value>,
    pub all_equal: bool,
    pub agreement: Agreement,
    /// One flag per non-reference dataset, in dataset order. Absent without a reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub different_from_ref: Option<Vec<bool>>,
}

impl ColumnComparison {
    /// True if at least one dataset holds a non-null value for this column
    pub fn has_value(&self) -> bool {
        self.values.iter().any(|v| !v.is_null())
    }

    /// Dataset indices (not flag positions) whose value differs from the reference
    pub fn datasets_differing_from_ref(&self, reference_index: usize) -> Vec<usize> {
        let Some(flags) = &self.different_from_ref else {
            return Vec::new();
        };
        (0..self.values.len())
            .filter(|&i| i != reference_index)
            .zip(flags)
            .filter_map(|(i, &differs)| differs.then_some(i))
            .collect()
    }
}

/// Settings shared by every column comparison of a run.
#[derive(Debug, Clone)]
pub struct ColumnComparator {
    normalizer: Normalizer,
    reference_index: Option<usize>,
    missing_rows: MissingRowPolicy,
}

impl ColumnComparator {
    pub fn new(
        normalizer: Normalizer,
        reference_index: Option<usize>,
        missing_rows: MissingRowPolicy,
    ) -> Self {
        Self {
            normalizer,
            reference_index,
            missing_rows,
        }
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    pub fn reference_index(&self) -> Option<usize> {
        self.reference_index
    }

    /// Compare one column. `cells[i]` is `None` when dataset `i` lacks the row,
    /// `Some(None)` when the row exists but the cell is absent.
    ///
    /// Fails with a message when a cell holds a value with no comparison form.
    pub fn compare(
        &self,
        column: &str,
        cells: &[Option<Option<&Value>>],
    ) -> std::result::Result<ColumnComparison, String> {
        let mut normalized = Vec::with_capacity(cells.len());
        for cell in cells {
            let value = cell.flatten();
            normalized.push(self.normalizer.normalize(value)?);
        }

        let voters: Vec<&NormalizedValue> = cells
            .iter()
            .zip(&normalized)
            .filter(|(cell, _)| cell.is_some() || self.missing_rows == MissingRowPolicy::NoValue)
            .map(|(_, value)| value)
            .collect();
        let agreement = classify(&voters);

        let different_from_ref = self.reference_index.map(|reference| {
            (0..cells.len())
                .filter(|&j| j != reference)
                .map(|j| {
                    if self.missing_rows == MissingRowPolicy::Abstain && cells[j].is_none() {
                        return false;
                    }
                    match normalized.get(reference) {
                        Some(ref_value) => normalized[j] != *ref_value,
                        None => !normalized[j].is_no_value(),
                    }
                })
                .collect()
        });

        Ok(ColumnComparison {
            column: column.to_string(),
            values: cells
                .iter()
                .map(|cell| cell.flatten().cloned().unwrap_or(Value::Null))
                .collect(),
            all_equal: agreement == Agreement::AllEqual,
            agreement,
            different_from_ref,
        })
    }
}

fn classify(voters: &[&NormalizedValue]) -> Agreement {
    if voters.len() <= 1 {
        return Agreement::AllEqual;
    }

    let mut groups: HashMap<&NormalizedValue, usize> = HashMap::with_capacity(voters.len());
    for value in voters {
        *groups.entry(*value).or_insert(0) += 1;
    }

    let largest_group = groups.values().copied().max().unwrap_or(0);
    if groups.len() <= 1 {
        Agreement::AllEqual
    } else if largest_group >= 2 {
        Agreement::PartialEqual
    } else {
        Agreement::AllDifferent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn comparator(reference: Option<usize>) -> ColumnComparator {
        ColumnComparator::new(Normalizer::default(), reference, MissingRowPolicy::Abstain)
    }

    fn present(values: &[Value]) -> Vec<Option<Option<&Value>>> {
        values.iter().map(|v| Some(Some(v))).collect()
    }

    #[test]
    fn test_two_datasets_disagree() {
        let values = [json!("ok"), json!("fail")];
        let cmp = comparator(Some(0)).compare("status", &present(&values)).unwrap();

        assert_eq!(cmp.values, vec![json!("ok"), json!("fail")]);
        assert!(!cmp.all_equal);
        assert_eq!(cmp.agreement, Agreement::AllDifferent);
        assert_eq!(cmp.different_from_ref, Some(vec![true]));
    }

    #[test]
    fn test_three_datasets_partial_agreement() {
        let values = [json!("a"), json!("a"), json!("b")];
        let cmp = comparator(Some(0)).compare("label", &present(&values)).unwrap();

        assert!(!cmp.all_equal);
        assert_eq!(cmp.agreement, Agreement::PartialEqual);
        assert_eq!(cmp.different_from_ref, Some(vec![false, true]));
        assert_eq!(cmp.datasets_differing_from_ref(0), vec![2]);
    }

    #[test]
    fn test_reference_in_the_middle() {
        let values = [json!("x"), json!("y"), json!("y")];
        let cmp = comparator(Some(1)).compare("c", &present(&values)).unwrap();
        assert_eq!(cmp.different_from_ref, Some(vec![true, false]));
        assert_eq!(cmp.datasets_differing_from_ref(1), vec![0]);
    }

    #[test]
    fn test_single_dataset_is_always_equal() {
        let values = [json!("anything")];
        let cmp = comparator(Some(0)).compare("c", &present(&values)).unwrap();
        assert!(cmp.all_equal);
        assert_eq!(cmp.different_from_ref, Some(vec![]));
    }

    #[test]
    fn test_no_reference_omits_flags() {
        let values = [json!(1), json!(2)];
        let cmp = comparator(None).compare("c", &present(&values)).unwrap();
        assert_eq!(cmp.different_from_ref, None);

        let serialized = serde_json::to_value(&cmp).unwrap();
        assert!(serialized.get("different_from_ref").is_none());
    }

    #[test]
    fn test_missing_rows_abstain() {
        let value = json!("only");
        let cells = vec![None, Some(Some(&value)), None];
        let cmp = comparator(Some(0)).compare("c", &cells).unwrap();

        assert!(cmp.all_equal);
        assert_eq!(cmp.values, vec![Value::Null, json!("only"), Value::Null]);
        // reference is missing, dataset 1 has a value, dataset 2 is missing too
        assert_eq!(cmp.different_from_ref, Some(vec![true, false]));
    }

    #[test]
    fn test_missing_rows_vote_as_no_value() {
        let value = json!("only");
        let cells = vec![None, Some(Some(&value)), None];
        let cmp = ColumnComparator::new(Normalizer::default(), Some(0), MissingRowPolicy::NoValue)
            .compare("c", &cells)
            .unwrap();

        assert!(!cmp.all_equal);
        assert_eq!(cmp.agreement, Agreement::PartialEqual);
        assert_eq!(cmp.different_from_ref, Some(vec![true, false]));
    }

    #[test]
    fn test_null_cells_vote() {
        let a = json!("x");
        let cells = vec![Some(Some(&a)), Some(None)];
        let cmp = comparator(Some(0)).compare("c", &cells).unwrap();
        assert!(!cmp.all_equal);
        assert!(cmp.has_value());

        let null = Value::Null;
        let cells = vec![Some(None), Some(Some(&null))];
        let cmp = comparator(Some(0)).compare("c", &cells).unwrap();
        assert!(cmp.all_equal);
        assert!(!cmp.has_value());
        assert_eq!(cmp.different_from_ref, Some(vec![false]));
    }

    #[test]
    fn test_numeric_normalization_applies() {
        let values = [json!(1), json!("1.0"), json!(1.0)];
        let cmp = comparator(Some(0)).compare("c", &present(&values)).unwrap();
        assert!(cmp.all_equal);
        assert_eq!(cmp.different_from_ref, Some(vec![false, false]));
    }

    #[test]
    fn test_non_scalar_cell_is_an_error() {
        let values = [json!("a"), json!(["a"])];
        assert!(comparator(Some(0)).compare("c", &present(&values)).is_err());
    }
}
