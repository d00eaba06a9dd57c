// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// scriptorium-batch: the batch conversion orchestrator.
//
// Discovers eligible folders, expands each into its (file x format) task
// matrix, runs the tasks on a bounded worker pool, and then consolidates and
// describes what was produced.

pub mod context;
pub mod converters;
pub mod discovery;
pub mod mets;
pub mod pipeline;
pub mod postconvert;
pub mod progress;
pub mod report;
pub mod runlog;
pub mod scheduler;

pub use context::{CancelFlag, RunContext};
pub use converters::{ConverterRegistry, FormatConverter};
pub use discovery::{find_eligible_folders, list_source_files};
pub use pipeline::Pipeline;
pub use postconvert::run_postconversion;
pub use progress::{BatchProgress, NoopProgress};
pub use report::{FolderReport, FolderStatus, PostconversionEntry, RunReport};
pub use runlog::RunLog;
pub use scheduler::Scheduler;
