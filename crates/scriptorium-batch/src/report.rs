// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-folder and run-wide result reports.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use scriptorium_core::{FolderBatch, FormatId, OutcomeError};
use serde::{Deserialize, Serialize};

/// Which postconversion step produced an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostconversionStep {
    Consolidation,
    Compression,
    Aggregation,
}

/// One postconversion result. Failures are recorded here instead of being
/// propagated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostconversionEntry {
    pub step: PostconversionStep,
    pub format: FormatId,
    pub artifact: Option<PathBuf>,
    pub ok: bool,
    pub detail: Option<String>,
}

impl PostconversionEntry {
    pub fn ok(step: PostconversionStep, format: &FormatId, artifact: PathBuf) -> Self {
        Self {
            step,
            format: format.clone(),
            artifact: Some(artifact),
            ok: true,
            detail: None,
        }
    }

    pub fn failed(step: PostconversionStep, format: &FormatId, detail: impl Into<String>) -> Self {
        Self {
            step,
            format: format.clone(),
            artifact: None,
            ok: false,
            detail: Some(detail.into()),
        }
    }

    /// The step succeeded but something was kept as a fallback.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FolderStatus {
    /// At least one task produced an artifact.
    Succeeded,
    /// Every task was skipped because its artifact already existed.
    UpToDate,
    /// No task produced an artifact.
    Failed,
    /// The folder held no source files.
    Empty,
    /// Shutdown was requested while the folder was being processed.
    Cancelled,
}

/// A task that did not produce an artifact, with its cause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureEntry {
    pub file: String,
    pub format: FormatId,
    pub cause: OutcomeError,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counts {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cancelled: usize,
}

impl Counts {
    fn add(&mut self, other: &Counts) {
        self.processed += other.processed;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.cancelled += other.cancelled;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FolderReport {
    pub folder: String,
    pub sources: usize,
    pub counts: Counts,
    pub status: FolderStatus,
    pub failures: Vec<FailureEntry>,
    pub postconversion: Vec<PostconversionEntry>,
    /// Set when the folder could not be processed at all.
    pub error: Option<String>,
}

impl FolderReport {
    /// Summarise a batch whose outcomes are complete.
    pub fn from_batch(batch: &FolderBatch, postconversion: Vec<PostconversionEntry>) -> Self {
        let mut counts = Counts::default();
        let mut failures = Vec::new();

        for outcome in &batch.outcomes {
            counts.processed += 1;
            if outcome.success {
                counts.succeeded += 1;
                continue;
            }
            match &outcome.error {
                Some(OutcomeError::Exists) => counts.skipped += 1,
                Some(OutcomeError::Cancelled) => counts.cancelled += 1,
                other => {
                    counts.failed += 1;
                    failures.push(FailureEntry {
                        file: outcome.source.file_name(),
                        format: outcome.format.clone(),
                        cause: other
                            .clone()
                            .unwrap_or_else(|| OutcomeError::Converter("unknown".into())),
                    });
                }
            }
        }

        let status = if batch.sources.is_empty() {
            FolderStatus::Empty
        } else if counts.cancelled > 0 {
            FolderStatus::Cancelled
        } else if counts.succeeded > 0 {
            FolderStatus::Succeeded
        } else if counts.failed == 0 && counts.skipped > 0 {
            FolderStatus::UpToDate
        } else {
            FolderStatus::Failed
        };

        Self {
            folder: batch.name.clone(),
            sources: batch.sources.len(),
            counts,
            status,
            failures,
            postconversion,
            error: None,
        }
    }

    /// Report for a folder that could not be read.
    pub fn unreadable(folder: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            folder: folder.into(),
            sources: 0,
            counts: Counts::default(),
            status: FolderStatus::Failed,
            failures: Vec::new(),
            postconversion: Vec::new(),
            error: Some(error.into()),
        }
    }

    /// Succeeded or already up to date.
    pub fn is_success(&self) -> bool {
        matches!(self.status, FolderStatus::Succeeded | FolderStatus::UpToDate)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub folders: Vec<FolderReport>,
    pub totals: Counts,
    pub cancelled: bool,
}

impl RunReport {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            started_at: Utc::now(),
            finished_at: None,
            folders: Vec::new(),
            totals: Counts::default(),
            cancelled: false,
        }
    }

    pub fn push(&mut self, folder: FolderReport) {
        self.totals.add(&folder.counts);
        self.folders.push(folder);
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn folders_succeeded(&self) -> usize {
        self.folders.iter().filter(|f| f.is_success()).count()
    }

    pub fn folders_failed(&self) -> usize {
        self.folders.len() - self.folders_succeeded()
    }

    /// True when at least one folder was processed successfully.
    pub fn is_success(&self) -> bool {
        self.folders_succeeded() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scriptorium_core::{ConversionOutcome, ConversionTask, SourceFile};
    use std::path::Path;
    use std::sync::Arc;

    fn batch_with(errors: &[Option<OutcomeError>]) -> FolderBatch {
        let sources: Vec<SourceFile> = (0..errors.len())
            .map(|i| SourceFile {
                path: PathBuf::from(format!("/in/p{i}.tif")),
                stem: format!("p{i}"),
                size_bytes: 1,
                modified: Utc::now(),
            })
            .collect();
        let format = FormatId::new("PDF");
        let mut batch = FolderBatch::new(
            "box",
            "/in",
            Path::new("/out"),
            sources,
            vec![format.clone()],
        );
        for (source, error) in batch.sources.clone().into_iter().zip(errors) {
            let task = ConversionTask {
                destination: PathBuf::from(format!("/out/box/PDF/{}.pdf", source.stem)),
                source: Arc::clone(&source),
                format: format.clone(),
            };
            let outcome = match error {
                None => ConversionOutcome::succeeded(&task, 10),
                Some(OutcomeError::Exists) => ConversionOutcome::skipped_existing(&task),
                Some(err) => ConversionOutcome::failed(&task, err.clone()),
            };
            batch.outcomes.push(outcome);
        }
        batch
    }

    #[test]
    fn counts_split_by_cause() {
        let batch = batch_with(&[
            None,
            Some(OutcomeError::Exists),
            Some(OutcomeError::Converter("bad tiff".into())),
        ]);
        let report = FolderReport::from_batch(&batch, Vec::new());
        assert_eq!(report.counts.processed, 3);
        assert_eq!(report.counts.succeeded, 1);
        assert_eq!(report.counts.skipped, 1);
        assert_eq!(report.counts.failed, 1);
        assert_eq!(report.status, FolderStatus::Succeeded);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].file, "p2.tif");
    }

    #[test]
    fn zero_successes_is_failed() {
        let batch = batch_with(&[Some(OutcomeError::Converter("x".into()))]);
        let report = FolderReport::from_batch(&batch, Vec::new());
        assert_eq!(report.status, FolderStatus::Failed);
        assert!(!report.is_success());
    }

    #[test]
    fn all_skipped_is_up_to_date() {
        let batch = batch_with(&[Some(OutcomeError::Exists), Some(OutcomeError::Exists)]);
        let report = FolderReport::from_batch(&batch, Vec::new());
        assert_eq!(report.status, FolderStatus::UpToDate);
        assert!(report.is_success());
    }

    #[test]
    fn empty_batch_is_empty() {
        let batch = batch_with(&[]);
        assert_eq!(
            FolderReport::from_batch(&batch, Vec::new()).status,
            FolderStatus::Empty
        );
    }

    #[test]
    fn run_totals_accumulate() {
        let mut run = RunReport::new("run_test");
        run.push(FolderReport::from_batch(&batch_with(&[None, None]), Vec::new()));
        run.push(FolderReport::unreadable("broken", "permission denied"));
        run.finish();

        assert_eq!(run.totals.succeeded, 2);
        assert_eq!(run.folders_succeeded(), 1);
        assert_eq!(run.folders_failed(), 1);
        assert!(run.is_success());
        assert!(run.finished_at.is_some());
    }
}
