//! Summary aggregator: overall and per-column agreement statistics

use crate::compare::Agreement;
use crate::row::RowComparison;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverallStats {
    pub total_rows: usize,
    pub rows_all_same: usize,
    pub rows_any_diff: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnStats {
    /// Rows with a non-null value for this column in at least one dataset
    pub total_rows: usize,
    pub same_count: usize,
    pub diff_count: usize,
    pub partial_equal_rows: usize,
    pub all_diff_rows: usize,
    pub same_rate: f64,
    pub partial_rate: f64,
    pub all_diff_rate: f64,
}

impl ColumnStats {
    pub fn diff_rate(&self) -> f64 {
        ratio(self.diff_count, self.total_rows)
    }

    fn finish_rates(&mut self) {
        self.same_rate = ratio(self.same_count, self.total_rows);
        self.partial_rate = ratio(self.partial_equal_rows, self.total_rows);
        self.all_diff_rate = ratio(self.all_diff_rows, self.total_rows);
    }

    fn merge(&mut self, other: &ColumnStats) {
        self.total_rows += other.total_rows;
        self.same_count += other.same_count;
        self.diff_count += other.diff_count;
        self.partial_equal_rows += other.partial_equal_rows;
        self.all_diff_rows += other.all_diff_rows;
    }
}

fn ratio(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    pub overall: OverallStats,
    pub columns: IndexMap<String, ColumnStats>,
}

impl SummaryStats {
    /// Recompute statistics from an existing set of row comparisons.
    pub fn from_rows<'a>(
        compare_columns: &[String],
        rows: impl IntoIterator<Item = &'a RowComparison>,
    ) -> Self {
        let mut acc = SummaryAccumulator::new(compare_columns);
        for row in rows {
            acc.add(row);
        }
        acc.finish()
    }

    /// Columns ordered by diff rate, highest first; ties keep configured order
    pub fn columns_by_diff_rate(&self, descending: bool) -> Vec<(&String, &ColumnStats)> {
        let mut entries: Vec<_> = self.columns.iter().collect();
        entries.sort_by(|(_, a), (_, b)| {
            let ord = a.diff_rate().total_cmp(&b.diff_rate());
            if descending {
                ord.reverse()
            } else {
                ord
            }
        });
        entries
    }
}

/// Running counts over row comparisons. Partial accumulators built on separate
/// workers combine with [`SummaryAccumulator::merge`]; rates are computed once in
/// [`SummaryAccumulator::finish`].
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryAccumulator {
    overall: OverallStats,
    columns: IndexMap<String, ColumnStats>,
}

impl SummaryAccumulator {
    pub fn new(compare_columns: &[String]) -> Self {
        Self {
            overall: OverallStats::default(),
            columns: compare_columns
                .iter()
                .map(|c| (c.clone(), ColumnStats::default()))
                .collect(),
        }
    }

    pub fn add(&mut self, row: &RowComparison) {
        self.overall.total_rows += 1;
        if row.equal {
            self.overall.rows_all_same += 1;
        } else {
            self.overall.rows_any_diff += 1;
        }

        for (column, stats) in self.columns.iter_mut() {
            let Some(cmp) = row.columns.get(column) else {
                continue;
            };
            if !cmp.has_value() {
                continue;
            }
            stats.total_rows += 1;
            match cmp.agreement {
                Agreement::AllEqual => stats.same_count += 1,
                Agreement::PartialEqual => {
                    stats.diff_count += 1;
                    stats.partial_equal_rows += 1;
                }
                Agreement::AllDifferent => {
                    stats.diff_count += 1;
                    stats.all_diff_rows += 1;
                }
            }
        }
    }

    pub fn merge(mut self, other: SummaryAccumulator) -> Self {
        self.overall.total_rows += other.overall.total_rows;
        self.overall.rows_all_same += other.overall.rows_all_same;
        self.overall.rows_any_diff += other.overall.rows_any_diff;
        for (column, stats) in &other.columns {
            if let Some(mine) = self.columns.get_mut(column) {
                mine.merge(stats);
            }
        }
        self
    }

    pub fn finish(mut self) -> SummaryStats {
        for stats in self.columns.values_mut() {
            stats.finish_rates();
        }
        SummaryStats {
            overall: self.overall,
            columns: self.columns,
        }
    }
}
