//! Command implementations for reconcile CLI

use crate::cli::{CellArgs, Commands, ConfigCommand, MediaArg, OverrideCommand, SortArg, StatusArg};
use crate::output::{JsonFormatter, PrettyPrinter};
use crate::progress::ProgressReporter;
use anyhow::{bail, Context, Result};
use reconcile_core::config::{self, Config};
use reconcile_core::engine::ComparisonProgress;
use reconcile_core::export::export_to_path;
use reconcile_core::media::MediaCatalog;
use reconcile_core::overrides::OverrideOutcome;
use reconcile_core::projection::{project, RowQuery};
use reconcile_core::{
    ComparisonEngine, ComparisonOptions, ComparisonRequest, ComparisonResult, Dataset,
    ExportOptions, OverrideMap, OverridePayload, Record, RowKey, Value,
};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;

/// Execute a command
pub fn execute_command(command: Commands) -> Result<()> {
    match command {
        Commands::Compare {
            datasets,
            labels,
            identifier,
            columns,
            reference,
            no_reference,
            media_column,
            media,
            output,
            json,
        } => {
            let reference = if no_reference { Some(None) } else { reference.map(Some) };
            compare_command(CompareArgs {
                datasets,
                labels,
                identifier,
                columns,
                reference,
                media_column,
                media,
                output,
                json,
            })
        }
        Commands::Rows {
            result,
            status,
            media,
            column,
            contains,
            sort,
            offset,
            limit,
            overrides,
            json,
        } => rows_command(
            &result,
            rows_query(status, media, column, contains, sort, offset, limit),
            overrides.as_deref(),
            json,
        ),
        Commands::Override { command } => match command {
            OverrideCommand::Set { cell, value } => override_set_command(&cell, &value),
            OverrideCommand::Clear { cell } => override_clear_command(&cell),
        },
        Commands::Export {
            result,
            file,
            overrides,
            no_audit,
            delimiter,
            force,
        } => export_command(&result, &file, overrides.as_deref(), no_audit, delimiter, force),
        Commands::Config { command } => match command {
            ConfigCommand::Show => show_current_config(),
        },
    }
}

struct CompareArgs {
    datasets: Vec<PathBuf>,
    labels: Vec<String>,
    identifier: String,
    columns: Vec<String>,
    /// `None` = use the configured reference; `Some(None)` = no reference
    reference: Option<Option<usize>>,
    media_column: Option<String>,
    media: Option<PathBuf>,
    output: PathBuf,
    json: bool,
}

/// A dataset file: either a bare array of records or an object carrying its own label
#[derive(Deserialize)]
#[serde(untagged)]
enum DatasetFile {
    Records(Vec<Record>),
    Dataset(Dataset),
}

fn load_dataset(path: &Path, label: Option<&String>) -> Result<Dataset> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read dataset {}", path.display()))?;
    let parsed: DatasetFile = serde_json::from_str(&content).with_context(|| {
        format!(
            "{} is not a JSON array of records or a dataset object",
            path.display()
        )
    })?;

    let mut dataset = match parsed {
        DatasetFile::Records(rows) => Dataset {
            rows,
            ..Dataset::default()
        },
        DatasetFile::Dataset(dataset) => dataset,
    };
    if dataset.data_id.is_none() {
        dataset.data_id = path.file_name().map(|name| name.to_string_lossy().into_owned());
    }
    if let Some(label) = label {
        dataset.label = Some(label.clone());
    }
    log::debug!("Loaded {} row(s) from {}", dataset.rows.len(), path.display());
    Ok(dataset)
}

fn load_media_catalog(path: &Path) -> Result<MediaCatalog> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read media catalog {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Invalid media catalog {}", path.display()))
}

fn compare_command(args: CompareArgs) -> Result<()> {
    if args.labels.len() > args.datasets.len() {
        bail!(
            "Got {} labels for {} datasets",
            args.labels.len(),
            args.datasets.len()
        );
    }

    let config = config::get_config()?;
    let mut reporter = ProgressReporter::new_for_comparison(!args.json);

    let datasets = args
        .datasets
        .iter()
        .enumerate()
        .map(|(i, path)| load_dataset(path, args.labels.get(i)))
        .collect::<Result<Vec<_>>>()?;

    let reference = args.reference.unwrap_or(config.comparison.reference_index);
    let mut request =
        ComparisonRequest::new(datasets, args.identifier, args.columns).with_reference(reference);
    if let (Some(column), Some(path)) = (args.media_column, args.media.as_deref()) {
        request = request.with_media(column, load_media_catalog(path)?);
    }

    let engine = ComparisonEngine::new(ComparisonOptions::from_config(&config));
    let prepared = engine.prepare(request)?;
    reporter.finish_loading(
        &format!(
            "Loaded {} dataset(s), {} aligned row(s)",
            prepared.dataset_count(),
            prepared.total_rows()
        ),
        prepared.total_rows() as u64,
    );

    let cancel = AtomicBool::new(false);
    let result = {
        let callback = |progress: ComparisonProgress| reporter.update(progress);
        engine.run(&prepared, &cancel, Some(&callback))?
    };
    reporter.finish_rows("Comparison complete");

    result
        .save(&args.output)
        .with_context(|| format!("Failed to write result to {}", args.output.display()))?;

    if args.json {
        println!("{}", JsonFormatter::format_comparison_summary(&result)?);
    } else {
        PrettyPrinter::print_comparison_summary(&result);
        println!("💾 Result saved to {}", args.output.display());
    }
    Ok(())
}

fn rows_query(
    status: StatusArg,
    media: MediaArg,
    column: Option<String>,
    contains: Option<String>,
    sort: SortArg,
    offset: usize,
    limit: Option<usize>,
) -> RowQuery {
    RowQuery {
        status: status.into(),
        media: media.into(),
        column,
        contains,
        sort: sort.into(),
        offset,
        limit,
    }
}

fn load_result(path: &Path) -> Result<ComparisonResult> {
    ComparisonResult::load(path)
        .with_context(|| format!("Failed to load comparison result {}", path.display()))
}

/// Overrides from a file; a missing file means no overrides yet
fn load_overrides(path: &Path) -> Result<OverrideMap> {
    if !path.exists() {
        return Ok(OverrideMap::new());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read overrides {}", path.display()))?;
    let payload: OverridePayload = serde_json::from_str(&content)
        .with_context(|| format!("Invalid overrides file {}", path.display()))?;
    Ok(payload.into_map())
}

fn save_overrides(path: &Path, overrides: &OverrideMap) -> Result<()> {
    let content = serde_json::to_string_pretty(overrides)?;
    fs::write(path, content)
        .with_context(|| format!("Failed to write overrides {}", path.display()))?;
    Ok(())
}

fn rows_command(
    result_path: &Path,
    query: RowQuery,
    overrides_path: Option<&Path>,
    json: bool,
) -> Result<()> {
    let result = load_result(result_path)?;
    let overrides = match overrides_path {
        Some(path) => load_overrides(path)?,
        None => OverrideMap::new(),
    };
    let projection = project(&result.results, &query);

    if json {
        println!("{}", JsonFormatter::format_rows(&result, &projection, &overrides)?);
    } else {
        PrettyPrinter::print_rows(&result, &projection, &overrides);
    }
    Ok(())
}

/// Parse a value given on the command line: JSON when it parses, text otherwise
fn parse_cli_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn find_row_key(result: &ComparisonResult, id: &str) -> Result<RowKey> {
    let row = result
        .row_by_value(&Value::String(id.to_string()))
        .with_context(|| format!("No row with identifier '{id}' in the result"))?;
    Ok(row.id.clone())
}

fn override_set_command(cell: &CellArgs, raw_value: &str) -> Result<()> {
    let result = load_result(&cell.result)?;
    let mut overrides = load_overrides(&cell.overrides)?;
    let key = find_row_key(&result, &cell.id)?;

    let outcome = result.set_override(&mut overrides, &key, &cell.column, parse_cli_value(raw_value))?;
    save_overrides(&cell.overrides, &overrides)?;

    match outcome {
        OverrideOutcome::Stored => {
            println!("✅ Final value of {}/{} set to {}", key, cell.column, raw_value)
        }
        OverrideOutcome::Cleared => println!(
            "✅ {}/{} matches the reference value; override removed",
            key, cell.column
        ),
    }
    Ok(())
}

fn override_clear_command(cell: &CellArgs) -> Result<()> {
    let result = load_result(&cell.result)?;
    let mut overrides = load_overrides(&cell.overrides)?;
    let key = find_row_key(&result, &cell.id)?;

    if result.clear_override(&mut overrides, &key, &cell.column)? {
        save_overrides(&cell.overrides, &overrides)?;
        println!("✅ Override of {}/{} cleared", key, cell.column);
    } else {
        println!("No override set for {}/{}", key, cell.column);
    }
    Ok(())
}

fn export_command(
    result_path: &Path,
    file: &Path,
    overrides_path: Option<&Path>,
    no_audit: bool,
    delimiter: Option<char>,
    force: bool,
) -> Result<()> {
    let config = config::get_config()?;
    let result = load_result(result_path)?;
    let overrides = match overrides_path {
        Some(path) => load_overrides(path)?,
        None => OverrideMap::new(),
    };

    let mut options = ExportOptions::from_config(&config.export);
    options.force = force;
    if no_audit {
        options.include_audit_columns = false;
    }
    if let Some(delimiter) = delimiter {
        options.delimiter = delimiter;
    }

    export_to_path(Some(&result), &overrides, file, &options)?;
    println!(
        "✅ Exported {} row(s) to {}",
        result.results.len(),
        file.display()
    );
    Ok(())
}

fn show_current_config() -> Result<()> {
    let config: Config = config::get_config()?;
    PrettyPrinter::print_config(&config);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reconcile_core::test_fixtures::two_way_disagreement;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_parse_cli_value() {
        assert_eq!(parse_cli_value("12"), json!(12));
        assert_eq!(parse_cli_value("null"), Value::Null);
        assert_eq!(parse_cli_value("\"quoted\""), json!("quoted"));
        assert_eq!(parse_cli_value("plain text"), json!("plain text"));
        assert_eq!(parse_cli_value("007"), json!("007"));
    }

    #[test]
    fn test_load_dataset_forms() {
        let dir = TempDir::new().unwrap();
        let bare = dir.path().join("bare.json");
        fs::write(&bare, r#"[{"id": 1, "status": "ok"}]"#).unwrap();
        let wrapped = dir.path().join("wrapped.json");
        fs::write(&wrapped, r#"{"label": "Inner", "rows": [{"id": 2}]}"#).unwrap();

        let first = load_dataset(&bare, Some(&"Outer".to_string())).unwrap();
        assert_eq!(first.label.as_deref(), Some("Outer"));
        assert_eq!(first.data_id.as_deref(), Some("bare.json"));
        assert_eq!(first.rows.len(), 1);

        let second = load_dataset(&wrapped, None).unwrap();
        assert_eq!(second.label.as_deref(), Some("Inner"));
        assert_eq!(second.rows[0]["id"], json!(2));
    }

    #[test]
    fn test_override_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let result_path = dir.path().join("result.json");
        let overrides_path = dir.path().join("overrides.json");
        ComparisonEngine::default()
            .compare(two_way_disagreement())
            .unwrap()
            .save(&result_path)
            .unwrap();

        let cell = CellArgs {
            result: result_path.clone(),
            overrides: overrides_path.clone(),
            id: "1".to_string(),
            column: "status".to_string(),
        };
        override_set_command(&cell, "fail").unwrap();
        let stored = load_overrides(&overrides_path).unwrap();
        assert_eq!(stored.get(&RowKey::from("1"), "status"), Some(&json!("fail")));

        override_clear_command(&cell).unwrap();
        assert!(load_overrides(&overrides_path).unwrap().is_empty());
    }

    #[test]
    fn test_compare_writes_result() {
        let dir = TempDir::new().unwrap();
        let first = dir.path().join("first.json");
        let second = dir.path().join("second.json");
        fs::write(&first, r#"[{"id": 1, "status": "ok"}, {"id": 2, "status": "ok"}]"#).unwrap();
        fs::write(&second, r#"[{"id": 1, "status": "fail"}, {"id": 2, "status": "ok"}]"#).unwrap();
        let output = dir.path().join("out/result.json");

        compare_command(CompareArgs {
            datasets: vec![first, second],
            labels: vec!["Round A".to_string()],
            identifier: "id".to_string(),
            columns: vec!["status".to_string()],
            reference: Some(Some(0)),
            media_column: None,
            media: None,
            output: output.clone(),
            json: true,
        })
        .unwrap();

        let result = ComparisonResult::load(&output).unwrap();
        assert_eq!(result.results.len(), 2);
        assert_eq!(result.summary.overall.rows_any_diff, 1);
        assert_eq!(result.datasets_info[0].label, "Round A");
        assert_eq!(result.datasets_info[1].data_id.as_deref(), Some("second.json"));
    }

    #[test]
    fn test_export_refuses_to_overwrite() {
        let dir = TempDir::new().unwrap();
        let result_path = dir.path().join("result.json");
        let out = dir.path().join("final.csv");
        ComparisonEngine::default()
            .compare(two_way_disagreement())
            .unwrap()
            .save(&result_path)
            .unwrap();

        export_command(&result_path, &out, None, true, None, false).unwrap();
        let content = fs::read_to_string(&out).unwrap();
        assert_eq!(content.lines().next(), Some("id,status"));
        assert!(export_command(&result_path, &out, None, true, None, false).is_err());
        export_command(&result_path, &out, None, true, Some(';'), true).unwrap();
    }
}
