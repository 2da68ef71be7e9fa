//! Command-line interface for reconcile

use clap::{Parser, Subcommand, ValueEnum};
use reconcile_core::projection::{MediaFilter, RowSort, RowStatusFilter};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "reconcile")]
#[command(about = "Compare tabular datasets row by row and reconcile their final values")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compare two or more datasets keyed by an identifier column
    Compare {
        /// Dataset file (JSON array of records); repeat for each dataset, in order
        #[arg(short, long = "dataset", required = true, num_args = 1)]
        datasets: Vec<PathBuf>,

        /// Display label per dataset, in the same order as --dataset
        #[arg(short, long = "label")]
        labels: Vec<String>,

        /// Identifier column used to align rows
        #[arg(long = "id")]
        identifier: String,

        /// Columns to compare (comma separated)
        #[arg(short, long, value_delimiter = ',', required = true)]
        columns: Vec<String>,

        /// Index of the reference dataset (defaults to the configured one)
        #[arg(long, conflicts_with = "no_reference")]
        reference: Option<usize>,

        /// Run without a reference dataset
        #[arg(long)]
        no_reference: bool,

        /// Column holding the media identifier
        #[arg(long, requires = "media")]
        media_column: Option<String>,

        /// Media catalog file (JSON with batch_id and files)
        #[arg(long, requires = "media_column")]
        media: Option<PathBuf>,

        /// Where to write the comparison result
        #[arg(short, long, default_value = "result.json")]
        output: PathBuf,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// List rows of a saved result
    Rows {
        /// Comparison result file
        #[arg(short, long, default_value = "result.json")]
        result: PathBuf,

        /// Keep only equal or only differing rows
        #[arg(long, value_enum, default_value = "all")]
        status: StatusArg,

        /// Keep only rows with or without resolved media
        #[arg(long, value_enum, default_value = "any")]
        media: MediaArg,

        /// Column to focus on; its mismatches are listed first
        #[arg(long)]
        column: Option<String>,

        /// Keep rows whose values in --column contain this text
        #[arg(long, requires = "column")]
        contains: Option<String>,

        /// Order rows by number of mismatching columns
        #[arg(long, value_enum, default_value = "none")]
        sort: SortArg,

        /// Rows to skip
        #[arg(long, default_value = "0")]
        offset: usize,

        /// Maximum rows to show
        #[arg(long)]
        limit: Option<usize>,

        /// Overrides file used to resolve final values
        #[arg(long)]
        overrides: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage final-value overrides
    Override {
        #[command(subcommand)]
        command: OverrideCommand,
    },

    /// Export final values to CSV, Excel or JSON
    Export {
        /// Comparison result file
        #[arg(short, long, default_value = "result.json")]
        result: PathBuf,

        /// Output file (format is taken from the extension: .csv, .xlsx, .json)
        #[arg(short, long)]
        file: PathBuf,

        /// Overrides file to apply
        #[arg(long)]
        overrides: Option<PathBuf>,

        /// Only emit the identifier and final values
        #[arg(long)]
        no_audit: bool,

        /// CSV delimiter (defaults to the configured one)
        #[arg(long)]
        delimiter: Option<char>,

        /// Overwrite the output file if it exists
        #[arg(long)]
        force: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand)]
pub enum OverrideCommand {
    /// Set the final value of one cell
    Set {
        #[command(flatten)]
        cell: CellArgs,

        /// New value; parsed as JSON when possible, otherwise taken as text
        #[arg(long)]
        value: String,
    },

    /// Remove the override of one cell
    Clear {
        #[command(flatten)]
        cell: CellArgs,
    },
}

#[derive(clap::Args)]
pub struct CellArgs {
    /// Comparison result file
    #[arg(short, long, default_value = "result.json")]
    pub result: PathBuf,

    /// Overrides file (created if missing)
    #[arg(long, default_value = "overrides.json")]
    pub overrides: PathBuf,

    /// Row identifier
    #[arg(long)]
    pub id: String,

    /// Compare column
    #[arg(long)]
    pub column: String,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StatusArg {
    All,
    Equal,
    Diff,
}

impl From<StatusArg> for RowStatusFilter {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::All => RowStatusFilter::All,
            StatusArg::Equal => RowStatusFilter::Equal,
            StatusArg::Diff => RowStatusFilter::Diff,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MediaArg {
    Any,
    Has,
    None,
}

impl From<MediaArg> for MediaFilter {
    fn from(arg: MediaArg) -> Self {
        match arg {
            MediaArg::Any => MediaFilter::Any,
            MediaArg::Has => MediaFilter::Has,
            MediaArg::None => MediaFilter::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SortArg {
    None,
    FewDiffFirst,
    ManyDiffFirst,
}

impl From<SortArg> for RowSort {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::None => RowSort::None,
            SortArg::FewDiffFirst => RowSort::FewDiffFirst,
            SortArg::ManyDiffFirst => RowSort::ManyDiffFirst,
        }
    }
}
