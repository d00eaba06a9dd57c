// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Task scheduler — expands a folder batch into its (file x format) task
// matrix and runs it on a bounded pool of blocking workers.
//
// Every task yields exactly one outcome. Skips are decided before
// submission, converter errors and worker panics become failed outcomes, and
// tasks still queued when shutdown is requested are recorded as cancelled.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use scriptorium_core::config::ProcessingConfig;
use scriptorium_core::error::Result;
use scriptorium_core::{ConversionOutcome, ConversionTask, FolderBatch, OutcomeError};
use tokio::task::JoinError;
use tracing::{error, info, instrument, warn};

use crate::context::RunContext;
use crate::converters::{ConverterRegistry, FormatConverter};
use crate::postconvert::ReservedNames;

/// A task after the pre-submission checks.
enum Planned {
    Run(ConversionTask, Arc<dyn FormatConverter>),
    /// Outcome known without running anything.
    Done(ConversionOutcome),
}

pub struct Scheduler {
    registry: Arc<ConverterRegistry>,
    concurrency: usize,
    overwrite: bool,
    reserved: ReservedNames,
}

impl Scheduler {
    pub fn new(registry: Arc<ConverterRegistry>, processing: &ProcessingConfig) -> Self {
        Self {
            registry,
            concurrency: processing.max_workers.max(1),
            overwrite: processing.overwrite_existing,
            reserved: ReservedNames::default(),
        }
    }

    /// Refuse per-file artifacts whose names the postconversion steps use.
    pub fn with_reserved_names(mut self, reserved: ReservedNames) -> Self {
        self.reserved = reserved;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Expand the batch into tasks and decide which ones actually run.
    ///
    /// Creates each format directory. A format whose directory cannot be
    /// created, or that has no converter, fails all of its tasks. Within a
    /// format, a destination name is owned by the first source that maps to
    /// it (compared case-insensitively), so `a.tif` and `a.tiff` never share
    /// an artifact.
    fn plan(&self, batch: &FolderBatch) -> Vec<Planned> {
        let mut planned = Vec::with_capacity(batch.task_count());

        for format in &batch.formats {
            let dir = batch.format_dir(format);
            let ready = self
                .registry
                .require(format)
                .and_then(|converter| {
                    std::fs::create_dir_all(&dir)?;
                    Ok(converter)
                });
            let mut claimed: HashMap<String, String> = HashMap::new();

            for source in &batch.sources {
                let extension = match &ready {
                    Ok(converter) => converter.target_extension(),
                    Err(_) => "out",
                };
                let name = format!("{}.{}", source.stem, extension);
                let task = ConversionTask {
                    source: Arc::clone(source),
                    format: format.clone(),
                    destination: dir.join(&name),
                };

                let converter = match &ready {
                    Ok(converter) => converter,
                    Err(err) => {
                        planned.push(Planned::Done(ConversionOutcome::failed(
                            &task,
                            OutcomeError::Converter(err.to_string()),
                        )));
                        continue;
                    }
                };

                if let Some(conflict) = self.name_conflict(batch, &task, &name, &mut claimed) {
                    warn!(
                        file = %source.file_name(),
                        format = %format,
                        %conflict,
                        "Artifact name conflict"
                    );
                    planned.push(Planned::Done(ConversionOutcome::failed(
                        &task,
                        OutcomeError::NameConflict(conflict),
                    )));
                } else if !self.overwrite && task.destination.exists() {
                    planned.push(Planned::Done(ConversionOutcome::skipped_existing(&task)));
                } else {
                    planned.push(Planned::Run(task, Arc::clone(converter)));
                }
            }
        }
        planned
    }

    /// Why `task` may not write `name`, if it may not. Claims the name
    /// otherwise.
    fn name_conflict(
        &self,
        batch: &FolderBatch,
        task: &ConversionTask,
        name: &str,
        claimed: &mut HashMap<String, String>,
    ) -> Option<String> {
        if let Some(step) = self.reserved.owner(&batch.name, &task.format, name) {
            return Some(format!("{name} is reserved for the {step:?} output"));
        }
        match claimed.get(&name.to_lowercase()) {
            Some(owner) => Some(format!("{name} is already produced from {owner}")),
            None => {
                claimed.insert(name.to_lowercase(), task.source.file_name());
                None
            }
        }
    }

    /// Run every task of `batch` and return it with its outcomes filled in.
    ///
    /// Returns only after all submitted tasks have finished.
    #[instrument(skip_all, fields(folder = %batch.name, tasks = batch.task_count()))]
    pub async fn run_batch(&self, mut batch: FolderBatch, ctx: &RunContext) -> FolderBatch {
        ctx.progress.on_folder_start(&batch.name, batch.task_count());

        let mut outcomes = Vec::with_capacity(batch.task_count());
        let mut runnable = Vec::new();
        for planned in self.plan(&batch) {
            match planned {
                Planned::Run(task, converter) => runnable.push((task, converter)),
                Planned::Done(outcome) => {
                    record(ctx, &batch.name, &outcome);
                    outcomes.push(outcome);
                }
            }
        }

        let submitted = runnable.len();
        info!(submitted, workers = self.concurrency, "Submitting tasks");

        let tasks = runnable.into_iter().map(|(task, converter)| {
            let cancel = ctx.cancel.clone();
            async move {
                // Checked when the pool pulls the task, not when it is queued.
                if cancel.is_cancelled() {
                    return ConversionOutcome::failed(&task, OutcomeError::Cancelled);
                }
                execute(task, converter).await
            }
        });
        let mut results = std::pin::pin!(stream::iter(tasks).buffer_unordered(self.concurrency));

        while let Some(outcome) = results.next().await {
            record(ctx, &batch.name, &outcome);
            outcomes.push(outcome);
        }

        batch.outcomes = outcomes;
        info!(
            outcomes = batch.outcomes.len(),
            succeeded = batch.succeeded_count(),
            "Folder tasks complete"
        );
        batch
    }
}

fn record(ctx: &RunContext, folder: &str, outcome: &ConversionOutcome) {
    ctx.log.record_outcome(folder, outcome);
    ctx.progress.on_task_complete(folder, outcome);
}

/// `<dir>/.<stem>.<ext>.partial`, in the same directory so the final rename
/// stays on one filesystem.
fn partial_path(destination: &Path) -> PathBuf {
    let name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    destination.with_file_name(format!(".{name}.partial"))
}

/// Convert into the partial path, then move it into place. Nothing is left at
/// either path when the converter fails.
fn write_artifact(converter: &dyn FormatConverter, task: &ConversionTask) -> Result<u64> {
    let partial = partial_path(&task.destination);
    let result = converter
        .convert(&task.source, &partial)
        .and_then(|()| {
            std::fs::rename(&partial, &task.destination)?;
            Ok(std::fs::metadata(&task.destination)?.len())
        });
    if result.is_err() {
        let _ = std::fs::remove_file(&partial);
    }
    result
}

async fn execute(task: ConversionTask, converter: Arc<dyn FormatConverter>) -> ConversionOutcome {
    let job = task.clone();
    let joined = tokio::task::spawn_blocking(move || write_artifact(converter.as_ref(), &job)).await;

    match joined {
        Ok(Ok(size)) => ConversionOutcome::succeeded(&task, size),
        Ok(Err(err)) => {
            warn!(
                file = %task.source.file_name(),
                format = %task.format,
                %err,
                "Conversion failed"
            );
            ConversionOutcome::failed(&task, err.into())
        }
        Err(join_err) => {
            let _ = std::fs::remove_file(partial_path(&task.destination));
            let message = panic_message(join_err);
            error!(
                file = %task.source.file_name(),
                format = %task.format,
                panic = %message,
                "Conversion worker panicked"
            );
            ConversionOutcome::failed(&task, OutcomeError::Panicked(message))
        }
    }
}

fn panic_message(err: JoinError) -> String {
    if err.is_cancelled() {
        return "worker task was cancelled".to_string();
    }
    match err.try_into_panic() {
        Ok(payload) => payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "worker panicked".to_string()),
        Err(err) => err.to_string(),
    }
}
