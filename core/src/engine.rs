//! Comparison engine: validates a request, then runs the comparator over every
//! aligned row in parallel batches.

use crate::compare::{ColumnComparator, MissingRowPolicy};
use crate::config::Config;
use crate::error::{ReconcileError, Result};
use crate::media::{MediaCatalog, MediaIndex};
use crate::overrides::reference_value;
use crate::result::{ComparisonResult, DatasetRow, RowResult, RunMetadata};
use crate::row::RowComparer;
use crate::store::{Dataset, DatasetInfo, Record, RecordStore};
use crate::summary::SummaryAccumulator;
use crate::value::{NormalizationOptions, Normalizer, RowKey};
use chrono::Utc;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use uuid::Uuid;

/// Media linking for a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaOptions {
    /// Column whose cells name a media file
    pub media_column: String,
    pub catalog: MediaCatalog,
}

/// What to compare.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonRequest {
    pub datasets: Vec<Dataset>,
    pub identifier_column: String,
    pub compare_columns: Vec<String>,
    /// Dataset supplying default final values; `None` disables reference diffs
    #[serde(default)]
    pub reference_index: Option<usize>,
    #[serde(default)]
    pub media: Option<MediaOptions>,
}

impl ComparisonRequest {
    pub fn new(
        datasets: Vec<Dataset>,
        identifier_column: impl Into<String>,
        compare_columns: Vec<String>,
    ) -> Self {
        Self {
            datasets,
            identifier_column: identifier_column.into(),
            compare_columns,
            reference_index: Some(0),
            media: None,
        }
    }

    pub fn with_reference(mut self, reference_index: Option<usize>) -> Self {
        self.reference_index = reference_index;
        self
    }

    pub fn with_media(mut self, media_column: impl Into<String>, catalog: MediaCatalog) -> Self {
        self.media = Some(MediaOptions {
            media_column: media_column.into(),
            catalog,
        });
        self
    }
}

/// Engine settings that don't change what is compared, only how.
#[derive(Debug, Clone)]
pub struct ComparisonOptions {
    pub missing_rows: MissingRowPolicy,
    pub normalization: NormalizationOptions,
    /// Rows per batch; cancellation is checked between batches
    pub batch_size: usize,
    /// Worker threads (None = available cores)
    pub worker_threads: Option<usize>,
}

impl Default for ComparisonOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl ComparisonOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            missing_rows: config.comparison.missing_rows,
            normalization: config.normalization.clone(),
            batch_size: config.comparison.batch_size,
            worker_threads: Some(config.comparison.effective_worker_threads()),
        }
    }

    fn thread_count(&self) -> usize {
        self.worker_threads
            .filter(|n| *n > 0)
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1)
            })
    }
}

/// Phase of a running comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonPhase {
    ComparingRows,
    Completed,
}

/// Progress information during a comparison
#[derive(Debug, Clone)]
pub struct ComparisonProgress {
    pub phase: ComparisonPhase,
    pub processed_rows: u64,
    pub total_rows: u64,
    pub message: String,
}

pub type ProgressCallback<'a> = dyn Fn(ComparisonProgress) + Send + Sync + 'a;

/// A validated request with its record store built, ready to run.
#[derive(Debug)]
pub struct PreparedComparison {
    store: RecordStore,
    datasets_info: Vec<DatasetInfo>,
    identifier_column: String,
    compare_columns: Vec<String>,
    reference_index: Option<usize>,
    media: Option<(String, MediaIndex)>,
}

impl PreparedComparison {
    /// Number of aligned rows the run will produce
    pub fn total_rows(&self) -> usize {
        self.store.id_count()
    }

    pub fn dataset_count(&self) -> usize {
        self.store.dataset_count()
    }
}

/// Per-worker partial output: rows in identifier order plus their summary counts
struct BatchOutput {
    rows: Vec<RowResult>,
    summary: SummaryAccumulator,
}

impl BatchOutput {
    fn new(compare_columns: &[String]) -> Self {
        Self {
            rows: Vec::new(),
            summary: SummaryAccumulator::new(compare_columns),
        }
    }

    fn push(mut self, row: RowResult) -> Self {
        self.summary.add(&row.compare);
        self.rows.push(row);
        self
    }

    fn merge(mut self, other: BatchOutput) -> Self {
        self.rows.extend(other.rows);
        self.summary = self.summary.merge(other.summary);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct ComparisonEngine {
    options: ComparisonOptions,
}

impl ComparisonEngine {
    pub fn new(options: ComparisonOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ComparisonOptions {
        &self.options
    }

    /// Validate the request and index its datasets. Every configuration error is
    /// reported here, before any row is compared.
    pub fn prepare(&self, request: ComparisonRequest) -> Result<PreparedComparison> {
        let ComparisonRequest {
            datasets,
            identifier_column,
            compare_columns,
            reference_index,
            media,
        } = request;

        if let Some(reference) = reference_index {
            if reference >= datasets.len() {
                return Err(ReconcileError::invalid_input(format!(
                    "Reference index {reference} is out of range for {} dataset(s)",
                    datasets.len()
                )));
            }
        }

        let store = RecordStore::build(datasets, &identifier_column, &compare_columns)?;
        let media = media
            .filter(|m| !m.media_column.trim().is_empty())
            .map(|m| (m.media_column, MediaIndex::build(m.catalog)));

        Ok(PreparedComparison {
            datasets_info: store.dataset_infos(),
            store,
            identifier_column,
            compare_columns,
            reference_index,
            media,
        })
    }

    /// Prepare and run in one call, without cancellation or progress reporting.
    pub fn compare(&self, request: ComparisonRequest) -> Result<ComparisonResult> {
        let prepared = self.prepare(request)?;
        self.run(&prepared, &AtomicBool::new(false), None)
    }

    /// Compare every aligned row. The run is atomic: on cancellation or a row
    /// fault no partial result is returned.
    pub fn run(
        &self,
        prepared: &PreparedComparison,
        cancel: &AtomicBool,
        progress: Option<&ProgressCallback<'_>>,
    ) -> Result<ComparisonResult> {
        let started_at = Utc::now();
        let timer = Instant::now();
        let threads = self.options.thread_count();
        let total = prepared.total_rows();
        let batch_size = self.options.batch_size.max(1);

        log::info!(
            "Comparing {} row(s) across {} dataset(s) on {} column(s) with {} worker thread(s)",
            total,
            prepared.dataset_count(),
            prepared.compare_columns.len(),
            threads
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| ReconcileError::data_processing(format!("Failed to start worker pool: {e}")))?;

        let comparator = ColumnComparator::new(
            Normalizer::new(self.options.normalization.clone()),
            prepared.reference_index,
            self.options.missing_rows,
        );
        let comparer = RowComparer::new(&prepared.store, &comparator, &prepared.compare_columns);

        let ids: Vec<&RowKey> = prepared.store.all_ids().collect();
        let mut results = Vec::with_capacity(total);
        let mut summary = SummaryAccumulator::new(&prepared.compare_columns);

        for (batch_number, batch) in ids.chunks(batch_size).enumerate() {
            if cancel.load(Ordering::Relaxed) {
                log::info!("Comparison cancelled after {} of {} row(s)", results.len(), total);
                return Err(ReconcileError::Cancelled);
            }

            let offset = batch_number * batch_size;
            let output = pool.install(|| {
                batch
                    .par_iter()
                    .enumerate()
                    .try_fold(
                        || BatchOutput::new(&prepared.compare_columns),
                        |acc, (i, id)| {
                            let row = assemble_row(prepared, &comparer, offset + i, id)?;
                            Ok::<_, ReconcileError>(acc.push(row))
                        },
                    )
                    .try_reduce(
                        || BatchOutput::new(&prepared.compare_columns),
                        |left, right| Ok(left.merge(right)),
                    )
            })?;

            let mut rows = output.rows;
            rows.sort_unstable_by_key(|row| row.row_index);
            results.extend(rows);
            summary = summary.merge(output.summary);

            log::debug!("Batch {} done: {}/{} row(s)", batch_number + 1, results.len(), total);
            if let Some(callback) = progress {
                callback(ComparisonProgress {
                    phase: ComparisonPhase::ComparingRows,
                    processed_rows: results.len() as u64,
                    total_rows: total as u64,
                    message: format!("Compared {} of {} rows", results.len(), total),
                });
            }
        }

        let summary = summary.finish();
        let duration = timer.elapsed();
        log::info!(
            "Comparison finished in {:.2}s: {} row(s), {} with differences",
            duration.as_secs_f64(),
            summary.overall.total_rows,
            summary.overall.rows_any_diff
        );

        if let Some(callback) = progress {
            callback(ComparisonProgress {
                phase: ComparisonPhase::Completed,
                processed_rows: total as u64,
                total_rows: total as u64,
                message: "Comparison complete".to_string(),
            });
        }

        Ok(ComparisonResult {
            format_version: crate::RESULT_FORMAT_VERSION.to_string(),
            metadata: RunMetadata {
                run_id: Uuid::new_v4(),
                started_at,
                finished_at: Utc::now(),
                duration_ms: duration.as_millis() as u64,
                worker_threads: threads,
            },
            identifier_column: prepared.identifier_column.clone(),
            compare_columns: prepared.compare_columns.clone(),
            reference_index: prepared.reference_index,
            missing_rows: self.options.missing_rows,
            normalization: self.options.normalization.clone(),
            media_column: prepared.media.as_ref().map(|(column, _)| column.clone()),
            datasets_info: prepared.datasets_info.clone(),
            results,
            summary,
            warnings: prepared.store.warnings().to_vec(),
        })
    }
}

fn assemble_row(
    prepared: &PreparedComparison,
    comparer: &RowComparer<'_>,
    row_index: usize,
    id: &RowKey,
) -> Result<RowResult> {
    let compare = comparer.compare_row(id)?;

    let records: Vec<Option<&Record>> = (0..prepared.store.dataset_count())
        .map(|index| prepared.store.lookup(index, id))
        .collect();

    let rows = records
        .iter()
        .zip(&prepared.datasets_info)
        .map(|(record, info)| DatasetRow {
            data_id: info.data_id.clone(),
            row_data: record.cloned(),
        })
        .collect();

    let final_values = prepared
        .compare_columns
        .iter()
        .map(|column| {
            (
                column.clone(),
                reference_value(&compare, column, prepared.reference_index),
            )
        })
        .collect();

    let media = prepared
        .media
        .as_ref()
        .and_then(|(column, index)| index.resolve_row(&records, column));

    Ok(RowResult {
        row_index,
        id: id.clone(),
        id_value: prepared.store.raw_id(id).cloned().unwrap_or_default(),
        rows,
        compare,
        final_values,
        media,
    })
}
