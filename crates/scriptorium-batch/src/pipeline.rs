// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Top-level batch run: discovery, then for each eligible folder the task
// matrix, then that folder's postconversion stage.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use scriptorium_core::error::{Result, ScriptoriumError};
use scriptorium_core::{FolderBatch, FormatId, RunConfig};
use tracing::{error, info, instrument, warn};

use crate::context::{CancelFlag, RunContext};
use crate::converters::ConverterRegistry;
use crate::discovery::{find_eligible_folders, list_source_files};
use crate::postconvert::{ReservedNames, run_postconversion};
use crate::progress::BatchProgress;
use crate::report::{FolderReport, RunReport};
use crate::runlog::{RunLog, new_run_id};
use crate::scheduler::Scheduler;

/// A validated configuration and the converters built from it.
///
/// Converters (and any recognition engine) are built once here and reused
/// for every folder of every run.
pub struct Pipeline {
    config: Arc<RunConfig>,
    registry: Arc<ConverterRegistry>,
}

impl Pipeline {
    /// Validate `config` and build one converter per enabled format.
    pub fn new(config: RunConfig) -> Result<Self> {
        config.validate()?;
        let registry = ConverterRegistry::from_config(&config)?;
        Self::assemble(config, registry)
    }

    /// Use a prepared converter table instead of building one from `config`.
    pub fn with_registry(config: RunConfig, registry: ConverterRegistry) -> Result<Self> {
        config.validate()?;
        Self::assemble(config, registry)
    }

    fn assemble(config: RunConfig, registry: ConverterRegistry) -> Result<Self> {
        if registry.is_empty() {
            return Err(ScriptoriumError::Config(
                "no target format is enabled".to_string(),
            ));
        }
        Ok(Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
        })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Enabled formats that have a converter, in stable order.
    pub fn formats(&self) -> Vec<FormatId> {
        self.config
            .enabled_formats()
            .into_iter()
            .map(|(id, _)| id)
            .filter(|id| self.registry.get(id).is_some())
            .collect()
    }

    /// Convert every eligible folder under `input` into `output`.
    ///
    /// # Errors
    ///
    /// Only failures that happen before any task runs: a missing or
    /// non-directory input root, or an output directory or run log that
    /// cannot be created. Everything after that is recorded in the returned
    /// report instead.
    #[instrument(skip_all, fields(input = %input.display(), output = %output.display()))]
    pub async fn run(
        &self,
        input: &Path,
        output: &Path,
        progress: Arc<dyn BatchProgress>,
        cancel: CancelFlag,
    ) -> Result<RunReport> {
        let folders = find_eligible_folders(input, &self.config.discovery)?;
        std::fs::create_dir_all(output)?;

        let run_id = new_run_id();
        let log = RunLog::open(output, &run_id)?;
        let ctx = RunContext::new(run_id.clone(), log)
            .with_progress(progress)
            .with_cancel(cancel);

        let formats = self.formats();
        let scheduler = Scheduler::new(Arc::clone(&self.registry), &self.config.processing)
            .with_reserved_names(ReservedNames::from_config(&self.config));
        let format_list = formats.iter().map(FormatId::as_str).collect::<Vec<_>>().join(",");
        info!(
            run_id = %run_id,
            folders = folders.len(),
            formats = %format_list,
            workers = scheduler.concurrency(),
            "Run started"
        );
        ctx.log.note(&format!(
            "INPUT  {} OUTPUT {} FOLDERS {} FORMATS {format_list}",
            input.display(),
            output.display(),
            folders.len()
        ));
        ctx.progress.on_run_start(folders.len());

        let mut report = RunReport::new(run_id.as_str());
        for (name, source_dir) in folders {
            if ctx.cancel.is_cancelled() {
                warn!(folder = %name, "Shutdown requested, not starting further folders");
                break;
            }
            let folder = self
                .process_folder(&scheduler, &ctx, name, source_dir, output, &formats)
                .await;
            ctx.log.record_folder(&folder);
            ctx.progress.on_folder_complete(&folder);
            report.push(folder);
        }

        report.cancelled = ctx.cancel.is_cancelled();
        report.finish();
        let report_path = ctx.log.close(&report)?;
        info!(
            succeeded = report.folders_succeeded(),
            failed = report.folders_failed(),
            cancelled = report.cancelled,
            report = %report_path.display(),
            "Run finished"
        );
        Ok(report)
    }

    #[instrument(skip_all, fields(folder = %name))]
    async fn process_folder(
        &self,
        scheduler: &Scheduler,
        ctx: &RunContext,
        name: String,
        source_dir: PathBuf,
        output: &Path,
        formats: &[FormatId],
    ) -> FolderReport {
        let sources = match list_source_files(&source_dir, &self.config.discovery) {
            Ok(sources) => sources,
            Err(err) => {
                warn!(%err, "Cannot list source files");
                return FolderReport::unreadable(name, err.to_string());
            }
        };

        let batch = FolderBatch::new(name, source_dir, output, sources, formats.to_vec());
        if batch.sources.is_empty() {
            info!("No source files");
            return FolderReport::from_batch(&batch, Vec::new());
        }

        let batch = Arc::new(scheduler.run_batch(batch, ctx).await);
        if ctx.cancel.is_cancelled() {
            info!("Shutdown requested, skipping postconversion");
            return FolderReport::from_batch(&batch, Vec::new());
        }

        let shared = Arc::clone(&batch);
        let config = Arc::clone(&self.config);
        let joined = tokio::task::spawn_blocking(move || run_postconversion(&shared, &config)).await;

        match joined {
            Ok(entries) => {
                for entry in &entries {
                    ctx.log.record_postconversion(&batch.name, entry);
                }
                FolderReport::from_batch(&batch, entries)
            }
            Err(err) => {
                error!(%err, "Postconversion worker panicked");
                let detail = format!("postconversion aborted: {err}");
                ctx.log.note(&format!("PFAIL  {} {detail}", batch.name));
                let mut folder = FolderReport::from_batch(&batch, Vec::new());
                folder.error = Some(detail);
                folder
            }
        }
    }
}
