// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Progress callbacks for batch runs.
//
// Inject an `Arc<dyn BatchProgress>` into the pipeline to receive events as
// folders and tasks complete. The CLI drives a terminal progress bar through
// it; library users can forward events anywhere.

use scriptorium_core::ConversionOutcome;

use crate::report::FolderReport;

/// Called by the pipeline as it works through folders and tasks.
///
/// Tasks of one folder run concurrently, so `on_task_complete` may be called
/// while other tasks are still in flight; it is always called from the
/// orchestrator's control flow, never from inside a worker. All methods have
/// default no-op implementations.
pub trait BatchProgress: Send + Sync {
    /// Called once after discovery.
    fn on_run_start(&self, folders: usize) {
        let _ = folders;
    }

    /// Called before the first task of a folder is submitted.
    ///
    /// `tasks` is the full (file x format) count, skipped tasks included.
    fn on_folder_start(&self, folder: &str, tasks: usize) {
        let _ = (folder, tasks);
    }

    /// Called once per recorded outcome, including skipped and cancelled ones.
    fn on_task_complete(&self, folder: &str, outcome: &ConversionOutcome) {
        let _ = (folder, outcome);
    }

    /// Called after the folder's postconversion stage.
    fn on_folder_complete(&self, report: &FolderReport) {
        let _ = report;
    }
}

/// A [`BatchProgress`] that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

impl BatchProgress for NoopProgress {}
