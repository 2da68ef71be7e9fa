//! Progress reporting utilities

use indicatif::{ProgressBar, ProgressStyle};
use reconcile_core::engine::{ComparisonPhase, ComparisonProgress};
use std::sync::Mutex;
use std::time::Duration;

/// Progress reporter for a comparison run.
///
/// Starts as a spinner while datasets are loaded and indexed, then switches to a
/// bar once the number of aligned rows is known.
#[derive(Debug)]
pub struct ProgressReporter {
    load_pb: Option<ProgressBar>,
    rows_pb: Mutex<Option<ProgressBar>>,
    show_progress: bool,
}

impl ProgressReporter {
    pub fn new_for_comparison(show_progress: bool) -> Self {
        let load_pb = show_progress.then(|| create_spinner("Loading datasets..."));
        Self {
            load_pb,
            rows_pb: Mutex::new(None),
            show_progress,
        }
    }

    /// Finish loading and show the row bar
    pub fn finish_loading(&mut self, message: &str, total_rows: u64) {
        if let Some(pb) = self.load_pb.take() {
            pb.finish_with_message(message.to_string());
        }
        if self.show_progress {
            if let Ok(mut rows_pb) = self.rows_pb.lock() {
                *rows_pb = Some(create_rows_progress(total_rows, "Comparing rows"));
            }
        }
    }

    /// Feed a progress event from the engine
    pub fn update(&self, progress: ComparisonProgress) {
        let Ok(rows_pb) = self.rows_pb.lock() else {
            return;
        };
        if let Some(pb) = rows_pb.as_ref() {
            pb.set_length(progress.total_rows);
            pb.set_position(progress.processed_rows);
            if progress.phase == ComparisonPhase::Completed {
                pb.set_message(progress.message);
            }
        }
    }

    pub fn finish_rows(&mut self, message: &str) {
        if let Ok(mut rows_pb) = self.rows_pb.lock() {
            if let Some(pb) = rows_pb.take() {
                pb.finish_with_message(message.to_string());
            }
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        if let Some(pb) = self.load_pb.take() {
            pb.finish_and_clear();
        }
        if let Ok(mut rows_pb) = self.rows_pb.lock() {
            if let Some(pb) = rows_pb.take() {
                pb.finish_and_clear();
            }
        }
    }
}

/// Create a spinner progress bar
pub fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
            .template("{spinner:.green} {msg}")
            .expect("Invalid progress template"),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Create a row counter bar
fn create_rows_progress(total: u64, message: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>7}/{len:7} {msg}")
            .expect("Invalid progress template")
            .progress_chars("#>-"),
    );
    pb.set_message(message.to_string());
    pb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_reporter_ignores_updates() {
        let mut reporter = ProgressReporter::new_for_comparison(false);
        reporter.finish_loading("loaded", 10);
        reporter.update(ComparisonProgress {
            phase: ComparisonPhase::ComparingRows,
            processed_rows: 5,
            total_rows: 10,
            message: String::new(),
        });
        assert!(reporter.rows_pb.lock().unwrap().is_none());
    }
}
