//! Read-side projections over a finished result: filtering and ordering rows.
//!
//! These never re-run a comparison; they only select and reorder existing rows.

use crate::result::RowResult;
use crate::value::display_value;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowStatusFilter {
    #[default]
    All,
    /// Rows where every compare column agrees
    Equal,
    /// Rows with at least one mismatching column
    Diff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaFilter {
    #[default]
    Any,
    Has,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowSort {
    /// Identifier order
    #[default]
    None,
    FewDiffFirst,
    ManyDiffFirst,
}

/// Which rows to show and in what order.
///
/// `column` serves two purposes: with `contains` it filters rows whose raw values
/// in that column contain the needle (case-insensitive), and on its own it moves
/// rows that mismatch in that column to the front.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RowQuery {
    pub status: RowStatusFilter,
    pub media: MediaFilter,
    pub column: Option<String>,
    pub contains: Option<String>,
    pub sort: RowSort,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl RowQuery {
    fn focus_column(&self) -> Option<&str> {
        self.column.as_deref().map(str::trim).filter(|c| !c.is_empty())
    }

    fn needle(&self) -> Option<String> {
        self.contains
            .as_deref()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
    }

    fn keeps(&self, row: &RowResult, needle: Option<&str>) -> bool {
        let status_ok = match self.status {
            RowStatusFilter::All => true,
            RowStatusFilter::Equal => row.compare.equal,
            RowStatusFilter::Diff => !row.compare.equal,
        };
        let media_ok = match self.media {
            MediaFilter::Any => true,
            MediaFilter::Has => row.has_media(),
            MediaFilter::None => !row.has_media(),
        };
        if !status_ok || !media_ok {
            return false;
        }

        match (self.focus_column(), needle) {
            (Some(column), Some(needle)) => row
                .compare
                .column_loose(column)
                .map(|cmp| {
                    cmp.values
                        .iter()
                        .filter(|v| !v.is_null())
                        .any(|v| display_value(Some(v)).to_lowercase().contains(needle))
                })
                .unwrap_or(false),
            _ => true,
        }
    }

    fn focus_mismatch(&self, row: &RowResult) -> bool {
        self.focus_column()
            .and_then(|column| row.compare.column_loose(column))
            .map(|cmp| !cmp.all_equal)
            .unwrap_or(false)
    }

    fn order(&self, a: &RowResult, b: &RowResult) -> Ordering {
        // mismatching in the focus column first
        let focus = self.focus_mismatch(b).cmp(&self.focus_mismatch(a));
        if focus != Ordering::Equal {
            return focus;
        }
        match self.sort {
            RowSort::None => Ordering::Equal,
            RowSort::FewDiffFirst => a.compare.mismatch_count.cmp(&b.compare.mismatch_count),
            RowSort::ManyDiffFirst => b.compare.mismatch_count.cmp(&a.compare.mismatch_count),
        }
    }
}

/// Rows selected by a query, with the count before paging
#[derive(Debug, Clone)]
pub struct Projection<'a> {
    pub rows: Vec<&'a RowResult>,
    /// Matching rows before `offset`/`limit` were applied
    pub total: usize,
}

/// Filter and order rows. Ties keep identifier order.
pub fn project<'a>(rows: &'a [RowResult], query: &RowQuery) -> Projection<'a> {
    let needle = query.needle();
    let mut selected: Vec<&RowResult> = rows
        .iter()
        .filter(|row| query.keeps(row, needle.as_deref()))
        .collect();
    selected.sort_by(|a, b| query.order(a, b));

    let total = selected.len();
    let rows = selected
        .into_iter()
        .skip(query.offset)
        .take(query.limit.unwrap_or(usize::MAX))
        .collect();
    Projection { rows, total }
}
