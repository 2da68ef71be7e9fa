use crate::compare::MissingRowPolicy;
use crate::error::{ReconcileError, Result};
use crate::value::NormalizationOptions;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// File name of the project-local configuration
pub const LOCAL_CONFIG_FILE: &str = "reconcile.toml";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub comparison: ComparisonConfig,
    #[serde(default)]
    pub normalization: NormalizationOptions,
    #[serde(default)]
    pub export: ExportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ComparisonConfig {
    /// Dataset whose values are the default final values
    pub reference_index: Option<usize>,

    /// How a dataset lacking a row takes part in equality
    pub missing_rows: MissingRowPolicy,

    /// Rows per batch; cancellation is checked between batches
    pub batch_size: usize,

    /// Worker threads for row comparison (None = available cores)
    pub worker_threads: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExportConfig {
    /// Emit one column per dataset per compare column next to the final values
    pub include_audit_columns: bool,

    /// CSV delimiter character
    pub delimiter: char,
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            reference_index: Some(0),
            missing_rows: MissingRowPolicy::default(),
            batch_size: 10_000,
            worker_threads: None,
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            include_audit_columns: true,
            delimiter: ',',
        }
    }
}

impl ComparisonConfig {
    /// Thread count actually used for a run
    pub fn effective_worker_threads(&self) -> usize {
        self.worker_threads
            .filter(|n| *n > 0)
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1)
            })
    }
}

fn global_config_dir() -> PathBuf {
    if let Some(home_dir) = dirs::home_dir() {
        home_dir.join(".reconcile")
    } else {
        PathBuf::from(".reconcile")
    }
}

/// Read a configuration file, failing on unreadable or malformed content.
pub fn load_config_from(path: &Path) -> Result<Config> {
    let content = fs::read_to_string(path)?;
    let config = toml::from_str::<Config>(&content)?;
    Ok(config)
}

fn try_load(path: &Path) -> Option<Config> {
    if !path.exists() {
        return None;
    }
    match load_config_from(path) {
        Ok(config) => Some(config),
        Err(e) => {
            log::warn!("Ignoring config file {}: {e}", path.display());
            None
        }
    }
}

pub fn get_config() -> Result<Config> {
    // Priority order (highest to lowest):
    // 1. Explicit config file via RECONCILE_CONFIG env var
    // 2. Local config file (reconcile.toml)
    // 3. Saved global config file (~/.reconcile/global.toml)
    // 4. Default configuration
    // Environment overrides are applied on top of whichever was chosen.

    let mut config = if let Ok(config_path) = env::var("RECONCILE_CONFIG") {
        load_config_from(Path::new(&config_path))?
    } else {
        let local = env::current_dir()
            .ok()
            .and_then(|dir| try_load(&dir.join(LOCAL_CONFIG_FILE)));
        local
            .or_else(|| try_load(&global_config_dir().join("global.toml")))
            .unwrap_or_default()
    };

    apply_env_overrides(&mut config)?;
    Ok(config)
}

fn apply_env_overrides(config: &mut Config) -> Result<()> {
    if let Ok(threads) = env::var("RECONCILE_WORKER_THREADS") {
        let threads = threads.trim().parse::<usize>().map_err(|_| {
            ReconcileError::Config(format!("RECONCILE_WORKER_THREADS must be a number, got '{threads}'"))
        })?;
        config.comparison.worker_threads = Some(threads);
    }
    if let Ok(batch) = env::var("RECONCILE_BATCH_SIZE") {
        let batch = batch.trim().parse::<usize>().map_err(|_| {
            ReconcileError::Config(format!("RECONCILE_BATCH_SIZE must be a number, got '{batch}'"))
        })?;
        config.comparison.batch_size = batch;
    }
    Ok(())
}

pub fn save_config(config: &Config) -> Result<PathBuf> {
    let config_dir = global_config_dir();
    fs::create_dir_all(&config_dir)?;

    let config_path = config_dir.join("global.toml");
    let config_toml = toml::to_string_pretty(config)?;
    fs::write(&config_path, config_toml)?;

    Ok(config_path)
}
