//! Progress bar for download runs.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use netdrive_core::{BatchProgress, TaskError};

/// Counts files across every batch and single transfer of a run.
///
/// Each `batch_started` grows the bar's length, so nested directory and
/// composite downloads accumulate into one bar. Standalone transfers are
/// registered once, up front, by the caller.
pub(crate) struct FileProgress {
    bar: ProgressBar,
}

impl FileProgress {
    /// Visible bar on stderr, or a hidden one when `visible` is false.
    pub(crate) fn new(visible: bool) -> Self {
        let bar = if visible {
            let bar = ProgressBar::new(0);
            bar.set_style(
                ProgressStyle::with_template("{spinner} [{pos}/{len}] {wide_msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        } else {
            // Keeps a length so `inc_length` still counts while nothing is drawn.
            ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::hidden())
        };
        Self { bar }
    }

    /// Removes the bar from the terminal.
    pub(crate) fn finish(&self) {
        self.bar.finish_and_clear();
    }

    #[cfg(test)]
    fn counts(&self) -> (u64, u64) {
        (self.bar.position(), self.bar.length().unwrap_or(0))
    }
}

impl BatchProgress for FileProgress {
    fn batch_started(&self, total: usize) {
        self.bar.inc_length(total as u64);
    }

    fn task_completed(&self, url: &str, bytes: u64) {
        self.bar.set_message(format!("{url} ({bytes} bytes)"));
        self.bar.inc(1);
    }

    fn task_failed(&self, url: &str, error: &TaskError) {
        self.bar.println(format!("failed: {url}: {error}"));
        self.bar.inc(1);
    }
}
