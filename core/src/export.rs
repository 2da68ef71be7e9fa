//! Export of a comparison result as a flat table of final values
//!
//! One row per aligned identifier: the identifier, optionally every dataset's
//! raw value of each compare column, then the final value of each compare column.
//! Overrides are applied from an immutable snapshot passed in by the caller.

use crate::config::ExportConfig;
use crate::error::{ReconcileError, Result};
use crate::overrides::OverrideMap;
use crate::result::ComparisonResult;
use crate::value::Value;
use indexmap::{IndexMap, IndexSet};
use rust_xlsxwriter::{Format, Workbook};
use std::fs;
use std::path::Path;

/// Supported export formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Comma-separated values format
    Csv,
    /// JSON array of row objects
    Json,
    /// Microsoft Excel format (XLSX)
    Excel,
}

impl ExportFormat {
    /// Determine format from file extension
    pub fn from_extension(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase());

        match extension.as_deref() {
            Some("csv") => Ok(ExportFormat::Csv),
            Some("json") => Ok(ExportFormat::Json),
            Some("xlsx") => Ok(ExportFormat::Excel),
            Some(ext) => Err(ReconcileError::invalid_input(format!(
                "Unsupported file extension: {ext}"
            ))),
            None => Err(ReconcileError::invalid_input("No file extension provided")),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
            ExportFormat::Excel => "xlsx",
        }
    }
}

/// Export options for customizing output
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Include each dataset's raw value next to the final values
    pub include_audit_columns: bool,
    /// CSV delimiter character (only applies to CSV format)
    pub delimiter: char,
    /// Whether to force overwrite existing files
    pub force: bool,
    /// Worksheet name (only applies to Excel format)
    pub sheet_name: String,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            include_audit_columns: true,
            delimiter: ',',
            force: false,
            sheet_name: "Comparison".to_string(),
        }
    }
}

impl ExportOptions {
    pub fn from_config(config: &ExportConfig) -> Self {
        Self {
            include_audit_columns: config.include_audit_columns,
            delimiter: config.delimiter,
            ..Self::default()
        }
    }
}

/// The flattened table, independent of output format.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ExportTable {
    pub fn column_index(&self, header: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == header)
    }

    /// Rows as header -> value objects
    pub fn records(&self) -> Vec<IndexMap<&str, &Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.headers
                    .iter()
                    .map(String::as_str)
                    .zip(row.iter())
                    .collect()
            })
            .collect()
    }
}

/// Header prefix per dataset: the label with spaces replaced by underscores.
/// Colliding prefixes get the dataset number appended.
fn audit_prefixes(result: &ComparisonResult) -> Vec<String> {
    let base: Vec<String> = result
        .datasets_info
        .iter()
        .map(|info| info.label.replace(' ', "_"))
        .collect();

    let mut seen = IndexSet::new();
    let duplicated: IndexSet<&str> = base
        .iter()
        .filter(|prefix| !seen.insert(prefix.as_str()))
        .map(String::as_str)
        .collect();

    base.iter()
        .enumerate()
        .map(|(i, prefix)| {
            if duplicated.contains(prefix.as_str()) {
                format!("{prefix}_{}", i + 1)
            } else {
                prefix.clone()
            }
        })
        .collect()
}

/// Flatten a result into an export table. Fails if there is no result yet.
pub fn build_export_table(
    result: Option<&ComparisonResult>,
    overrides: &OverrideMap,
    options: &ExportOptions,
) -> Result<ExportTable> {
    let result = result.ok_or_else(|| {
        ReconcileError::export_precondition("no completed comparison result to export")
    })?;

    let prefixes = audit_prefixes(result);
    let mut headers = vec![result.identifier_column.clone()];
    if options.include_audit_columns {
        for prefix in &prefixes {
            for column in &result.compare_columns {
                headers.push(format!("{prefix}_{column}"));
            }
        }
        headers.extend(result.compare_columns.iter().map(|c| format!("Final_{c}")));
    } else {
        headers.extend(result.compare_columns.iter().cloned());
    }

    let rows = result
        .results
        .iter()
        .map(|row| {
            let mut out = Vec::with_capacity(headers.len());
            out.push(row.id_value.clone());
            if options.include_audit_columns {
                for dataset_row in &row.rows {
                    for column in &result.compare_columns {
                        let value = dataset_row
                            .row_data
                            .as_ref()
                            .and_then(|data| data.get(column))
                            .cloned()
                            .unwrap_or(Value::Null);
                        out.push(value);
                    }
                }
            }
            out.extend(result.resolved_final_values(row, overrides).into_values());
            out
        })
        .collect();

    log::debug!(
        "Built export table: {} column(s), {} row(s), {} override(s)",
        headers.len(),
        result.results.len(),
        overrides.len()
    );

    Ok(ExportTable { headers, rows })
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn to_csv(table: &ExportTable, delimiter: char) -> Result<Vec<u8>> {
    if !delimiter.is_ascii() {
        return Err(ReconcileError::invalid_input(format!(
            "CSV delimiter must be a single ASCII character, got '{delimiter}'"
        )));
    }

    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter as u8)
        .from_writer(Vec::new());
    writer.write_record(&table.headers)?;
    for row in &table.rows {
        writer.write_record(row.iter().map(cell_text))?;
    }
    writer
        .into_inner()
        .map_err(|e| ReconcileError::data_processing(format!("Failed to finish CSV output: {e}")))
}

fn to_json(table: &ExportTable) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(&table.records())?)
}

fn to_xlsx(table: &ExportTable, sheet_name: &str) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let header_format = Format::new().set_bold();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(sheet_name)?;

    for (col, header) in table.headers.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, header, &header_format)?;
    }

    for (row_index, row) in table.rows.iter().enumerate() {
        let row32 = (row_index + 1) as u32;
        for (col, value) in row.iter().enumerate() {
            let col16 = col as u16;
            match value {
                Value::Null => {}
                Value::Bool(b) => {
                    worksheet.write_boolean(row32, col16, *b)?;
                }
                Value::Number(n) => match n.as_f64() {
                    Some(f) => {
                        worksheet.write_number(row32, col16, f)?;
                    }
                    None => {
                        worksheet.write_string(row32, col16, n.to_string())?;
                    }
                },
                other => {
                    worksheet.write_string(row32, col16, cell_text(other))?;
                }
            }
        }
    }

    Ok(workbook.save_to_buffer()?)
}

/// Render a table in the given format.
pub fn render(table: &ExportTable, format: ExportFormat, options: &ExportOptions) -> Result<Vec<u8>> {
    match format {
        ExportFormat::Csv => to_csv(table, options.delimiter),
        ExportFormat::Json => to_json(table),
        ExportFormat::Excel => to_xlsx(table, &options.sheet_name),
    }
}

/// Build and render an export in one step.
pub fn export_bytes(
    result: Option<&ComparisonResult>,
    overrides: &OverrideMap,
    format: ExportFormat,
    options: &ExportOptions,
) -> Result<Vec<u8>> {
    let table = build_export_table(result, overrides, options)?;
    render(&table, format, options)
}

/// Export to a file; the format follows the file extension.
pub fn export_to_path(
    result: Option<&ComparisonResult>,
    overrides: &OverrideMap,
    output_path: &Path,
    options: &ExportOptions,
) -> Result<()> {
    let format = ExportFormat::from_extension(output_path)?;

    if output_path.exists() && !options.force {
        return Err(ReconcileError::invalid_input(format!(
            "Output file already exists: {}. Use force option to overwrite.",
            output_path.display()
        )));
    }

    // Build everything before touching the file so a failed export leaves nothing behind
    let bytes = export_bytes(result, overrides, format, options)?;

    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(output_path, bytes)?;
    log::info!("Exported comparison to {}", output_path.display());
    Ok(())
}
