//! Error types for reconcile-core

use thiserror::Error;

/// Result alias used throughout reconcile-core
pub type Result<T> = std::result::Result<T, ReconcileError>;

/// All failures the reconciliation engine can surface.
///
/// Configuration problems (`SchemaMismatch`, `EmptyComparison`, `InvalidInput`) are
/// raised before any row is processed. `RowProcessing` identifies the row and column
/// that stopped a run.
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Schema mismatch: dataset {dataset_index} ('{label}') is missing compare column(s): {}", missing.join(", "))]
    SchemaMismatch {
        dataset_index: usize,
        label: String,
        missing: Vec<String>,
    },

    #[error("No compare columns configured")]
    EmptyComparison,

    #[error("Export unavailable: {0}")]
    ExportPrecondition(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Row '{row}', column '{column}': {message}")]
    RowProcessing {
        row: String,
        column: String,
        message: String,
    },

    #[error("Comparison run was cancelled")]
    Cancelled,

    #[error("Comparison job not found: {0}")]
    JobNotFound(String),

    #[error("Data processing error: {0}")]
    DataProcessing(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Excel error: {0}")]
    Excel(#[from] rust_xlsxwriter::XlsxError),
}

impl ReconcileError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn data_processing(msg: impl Into<String>) -> Self {
        Self::DataProcessing(msg.into())
    }

    pub fn schema_mismatch(dataset_index: usize, label: impl Into<String>, missing: Vec<String>) -> Self {
        Self::SchemaMismatch {
            dataset_index,
            label: label.into(),
            missing,
        }
    }

    pub fn export_precondition(msg: impl Into<String>) -> Self {
        Self::ExportPrecondition(msg.into())
    }

    pub fn row_processing(
        row: impl Into<String>,
        column: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::RowProcessing {
            row: row.into(),
            column: column.into(),
            message: message.into(),
        }
    }

    /// True for errors detected while validating a request, before any row work.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::SchemaMismatch { .. } | Self::EmptyComparison | Self::InvalidInput(_)
        )
    }
}

impl From<toml::de::Error> for ReconcileError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for ReconcileError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Config(err.to_string())
    }
}
