// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Terminal progress bar driven by batch progress events.

use indicatif::{ProgressBar, ProgressStyle};
use scriptorium_batch::report::FolderStatus;
use scriptorium_batch::{BatchProgress, FolderReport};
use scriptorium_core::ConversionOutcome;

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

/// One bar per folder, reset as each folder starts. Failures and folder
/// summaries are printed above the bar.
pub struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    pub fn new(visible: bool) -> Self {
        let bar = if visible {
            ProgressBar::new(0)
        } else {
            ProgressBar::hidden()
        };
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:40.green/238}] {pos:>4}/{len} tasks  {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);
        bar.set_style(style);
        Self { bar }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl BatchProgress for CliProgress {
    fn on_run_start(&self, folders: usize) {
        self.bar.println(format!("◆ {folders} eligible folder(s)"));
    }

    fn on_folder_start(&self, folder: &str, tasks: usize) {
        self.bar.reset();
        self.bar.set_length(tasks as u64);
        self.bar.set_prefix(folder.to_string());
    }

    fn on_task_complete(&self, _folder: &str, outcome: &ConversionOutcome) {
        let failed = !outcome.success && !outcome.is_skipped() && !outcome.is_cancelled();
        if failed && let Some(err) = &outcome.error {
            self.bar.println(format!(
                "  ✗ {} {}: {err}",
                outcome.format,
                outcome.source.file_name()
            ));
        }
        self.bar.set_message(outcome.source.file_name());
        self.bar.inc(1);
    }

    fn on_folder_complete(&self, report: &FolderReport) {
        let mark = match report.status {
            FolderStatus::Succeeded if report.counts.failed == 0 => "✔",
            FolderStatus::Succeeded => "⚠",
            FolderStatus::UpToDate => "=",
            FolderStatus::Empty => "·",
            FolderStatus::Failed | FolderStatus::Cancelled => "✘",
        };
        let counts = &report.counts;
        self.bar.println(format!(
            "{mark} {}  {} ok, {} failed, {} skipped, {} cancelled",
            report.folder, counts.succeeded, counts.failed, counts.skipped, counts.cancelled
        ));
    }
}
