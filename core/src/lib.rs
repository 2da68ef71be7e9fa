//! # reconcile-core
//!
//! Core library for reconcile - compares 1 to 5 versions of the same tabular data,
//! aligned by an identifier column, and resolves a single final value per field.
//!
//! This crate provides the reconciliation engine that can be used by different
//! interfaces (CLI, services, etc.). It does no file-format parsing and no terminal I/O.
//!
//! Data flows one way: [`store`] indexes the datasets, [`compare`] and [`row`] judge
//! each aligned row, [`summary`] folds the rows into statistics and [`engine`]
//! assembles a [`ComparisonResult`]. [`overrides`] and [`export`] work on a finished
//! result with a caller-supplied override snapshot.

pub mod compare;
pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod job;
pub mod media;
pub mod overrides;
pub mod projection;
pub mod result;
pub mod row;
pub mod store;
pub mod summary;
pub mod value;

#[cfg(any(test, feature = "test-fixtures"))]
pub mod test_fixtures;

// Re-export the most commonly used types for convenience
pub use compare::{Agreement, ColumnComparison, MissingRowPolicy};
pub use config::Config;
pub use engine::{ComparisonEngine, ComparisonOptions, ComparisonRequest};
pub use error::{ReconcileError, Result};
pub use export::{ExportFormat, ExportOptions, ExportTable};
pub use job::{JobManager, JobState, JobStatus};
pub use overrides::{OverrideMap, OverridePayload};
pub use result::{ComparisonResult, RowResult};
pub use row::RowComparison;
pub use store::{Dataset, Record};
pub use summary::SummaryStats;
pub use value::{RowKey, Value};

/// Current format version of serialized comparison results
pub const RESULT_FORMAT_VERSION: &str = "1.0.0";
