//! Output formatting utilities

use reconcile_core::config::Config;
use reconcile_core::projection::Projection;
use reconcile_core::summary::ColumnStats;
use reconcile_core::value::display_value;
use reconcile_core::{ComparisonResult, OverrideMap, Result, RowResult};
use serde_json::json;

/// Mismatching columns listed per row before eliding the rest
const MAX_COLUMNS_PER_ROW: usize = 5;

/// Pretty printer for reconcile output
pub struct PrettyPrinter;

impl PrettyPrinter {
    /// Print the outcome of a comparison run
    pub fn print_comparison_summary(result: &ComparisonResult) {
        let overall = &result.summary.overall;
        println!("🔍 Comparison {}", result.metadata.run_id);
        println!("├─ Identifier: {}", result.identifier_column);
        println!(
            "├─ Reference: {}",
            result
                .reference_index
                .and_then(|i| result.datasets_info.get(i))
                .map(|d| d.label.as_str())
                .unwrap_or("none")
        );
        println!("├─ Datasets: {}", result.datasets_info.len());
        for (i, info) in result.datasets_info.iter().enumerate() {
            let marker = if i == result.datasets_info.len() - 1 { "└─" } else { "├─" };
            let skipped = if info.skipped_rows > 0 {
                format!(", {} skipped", info.skipped_rows)
            } else {
                String::new()
            };
            println!("│  {} {}: {} rows{}", marker, info.label, info.rows, skipped);
        }
        println!("├─ Rows: {}", overall.total_rows);
        println!(
            "│  ├─ All same: {} ({})",
            overall.rows_all_same,
            format_rate(overall.rows_all_same, overall.total_rows)
        );
        println!(
            "│  └─ Any diff: {} ({})",
            overall.rows_any_diff,
            format_rate(overall.rows_any_diff, overall.total_rows)
        );
        if !result.warnings.is_empty() {
            println!("├─ ⚠️  Duplicate identifiers: {}", result.warnings.len());
        }

        let columns = result.summary.columns_by_diff_rate(true);
        println!("└─ Columns (most disagreement first):");
        for (i, (name, stats)) in columns.iter().enumerate() {
            let is_last = i == columns.len() - 1;
            print_column_stats(name, stats, if is_last { "   └─" } else { "   ├─" });
        }
        println!("⏱️  {} ms", result.metadata.duration_ms);
    }

    /// Print a page of rows with their mismatching columns and final values
    pub fn print_rows(result: &ComparisonResult, projection: &Projection, overrides: &OverrideMap) {
        if projection.rows.is_empty() {
            println!("No matching rows.");
            return;
        }

        println!(
            "📋 Rows: showing {} of {}",
            projection.rows.len(),
            projection.total
        );
        for (i, row) in projection.rows.iter().enumerate() {
            let is_last = i == projection.rows.len() - 1;
            print_row(result, row, overrides, is_last);
        }
    }

    pub fn print_config(config: &Config) {
        let comparison = &config.comparison;
        println!("Current comparison configuration:");
        match comparison.reference_index {
            Some(index) => println!("  Reference dataset: {index}"),
            None => println!("  Reference dataset: none"),
        }
        println!("  Missing rows: {:?}", comparison.missing_rows);
        println!("  Batch size: {}", comparison.batch_size);
        println!("  Worker threads: {}", comparison.effective_worker_threads());

        let normalization = &config.normalization;
        println!("Current normalization configuration:");
        println!("  Trim whitespace: {}", normalization.trim_whitespace);
        println!("  Case sensitive: {}", normalization.case_sensitive);
        println!("  Numeric strings as numbers: {}", normalization.numeric_strings);

        println!("Current export configuration:");
        println!("  Audit columns: {}", config.export.include_audit_columns);
        println!("  Delimiter: '{}'", config.export.delimiter);
    }
}

fn print_column_stats(name: &str, stats: &ColumnStats, marker: &str) {
    println!(
        "{} {}: {} diff / {} rows ({:.1}% same, {:.1}% partial, {:.1}% all different)",
        marker,
        name,
        stats.diff_count,
        stats.total_rows,
        stats.same_rate * 100.0,
        stats.partial_rate * 100.0,
        stats.all_diff_rate * 100.0
    );
}

fn print_row(result: &ComparisonResult, row: &RowResult, overrides: &OverrideMap, is_last: bool) {
    let marker = if is_last { "└─" } else { "├─" };
    let prefix = if is_last { "   " } else { "│  " };
    let verdict = if row.compare.equal { "✅" } else { "❌" };
    let media = row
        .media
        .as_ref()
        .map(|m| format!(" [{}]", m.filename))
        .unwrap_or_default();
    println!("{marker} {verdict} {}{}", row.id, media);

    let finals = result.resolved_final_values(row, overrides);
    let mismatched: Vec<_> = row.compare.mismatched_columns().collect();
    for (j, cmp) in mismatched.iter().take(MAX_COLUMNS_PER_ROW).enumerate() {
        let last_change = j == mismatched.len().min(MAX_COLUMNS_PER_ROW) - 1
            && mismatched.len() <= MAX_COLUMNS_PER_ROW;
        let change_marker = if last_change { "└─" } else { "├─" };
        let values: Vec<String> = cmp
            .values
            .iter()
            .map(|v| format!("'{}'", display_value(Some(v))))
            .collect();
        let overridden = if overrides.get(&row.id, &cmp.column).is_some() { " (override)" } else { "" };
        println!(
            "{}{} {}: {} → '{}'{}",
            prefix,
            change_marker,
            cmp.column,
            values.join(" | "),
            finals.get(&cmp.column).map(|v| display_value(Some(v))).unwrap_or_default(),
            overridden
        );
    }
    if mismatched.len() > MAX_COLUMNS_PER_ROW {
        println!(
            "{}└─ ... and {} more",
            prefix,
            mismatched.len() - MAX_COLUMNS_PER_ROW
        );
    }
}

fn format_rate(count: usize, total: usize) -> String {
    if total == 0 {
        return "0.0%".to_string();
    }
    format!("{:.1}%", count as f64 * 100.0 / total as f64)
}

/// JSON formatter for machine-readable output
pub struct JsonFormatter;

impl JsonFormatter {
    /// Summary, dataset descriptions and run metadata of a result
    pub fn format_comparison_summary(result: &ComparisonResult) -> Result<String> {
        let json = json!({
            "metadata": result.metadata,
            "identifier_column": result.identifier_column,
            "compare_columns": result.compare_columns,
            "reference_index": result.reference_index,
            "datasets_info": result.datasets_info,
            "summary": result.summary,
            "warnings": result.warnings,
        });
        Ok(serde_json::to_string_pretty(&json)?)
    }

    /// Selected rows with their final values resolved against the overrides
    pub fn format_rows(
        result: &ComparisonResult,
        projection: &Projection,
        overrides: &OverrideMap,
    ) -> Result<String> {
        let rows: Vec<_> = projection
            .rows
            .iter()
            .map(|row| {
                json!({
                    "row_index": row.row_index,
                    "id": row.id,
                    "id_value": row.id_value,
                    "equal": row.compare.equal,
                    "mismatch_count": row.compare.mismatch_count,
                    "columns": row.compare.columns,
                    "final_values": result.resolved_final_values(row, overrides),
                    "media": row.media,
                })
            })
            .collect();
        let json = json!({ "total": projection.total, "rows": rows });
        Ok(serde_json::to_string_pretty(&json)?)
    }
}
