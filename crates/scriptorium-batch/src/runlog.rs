// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Persistent run log at `<output>/logs/<run-id>.log`, plus the JSON report
// written beside it when the run closes.
//
// Lifecycle: `open` at run start, one flushed line per recorded outcome, and
// `close` at run end.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{SecondsFormat, Utc};
use scriptorium_core::ConversionOutcome;
use scriptorium_core::error::Result;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::report::{FolderReport, PostconversionEntry, RunReport};

/// Directory under the output root that holds run logs.
pub const LOG_DIR: &str = "logs";

/// `run_<YYYYmmdd_HHMMSS>_<8 hex chars>`.
pub fn new_run_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("run_{}_{}", Utc::now().format("%Y%m%d_%H%M%S"), &suffix[..8])
}

pub struct RunLog {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl RunLog {
    /// Create `<output>/logs/<run_id>.log` and write the header line.
    pub fn open(output_root: &Path, run_id: &str) -> Result<Self> {
        let dir = output_root.join(LOG_DIR);
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{run_id}.log"));
        let file = File::create(&path)?;

        let log = Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        };
        log.line(&format!("START {run_id}"));
        debug!(path = %log.path.display(), "Run log opened");
        Ok(log)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one timestamped line and flush. Write failures are reported
    /// through `tracing` and otherwise ignored.
    fn line(&self, message: &str) {
        let stamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let mut writer = self.writer.lock().unwrap_or_else(|p| p.into_inner());
        let result = writeln!(writer, "{stamp} {message}").and_then(|_| writer.flush());
        if let Err(err) = result {
            warn!(path = %self.path.display(), %err, "Failed to write run log");
        }
    }

    pub fn note(&self, message: &str) {
        self.line(message);
    }

    pub fn record_outcome(&self, folder: &str, outcome: &ConversionOutcome) {
        let file = outcome.source.file_name();
        let message = match (&outcome.error, &outcome.artifact) {
            (None, Some(artifact)) => format!(
                "OK     {folder} {} {file} -> {} ({} bytes)",
                outcome.format,
                artifact.display(),
                outcome.size_bytes
            ),
            (Some(err), _) if outcome.is_skipped() || outcome.is_cancelled() => {
                format!("SKIP   {folder} {} {file}: {err}", outcome.format)
            }
            (Some(err), _) => format!("FAIL   {folder} {} {file}: {err}", outcome.format),
            (None, None) => format!("FAIL   {folder} {} {file}: no artifact", outcome.format),
        };
        self.line(&message);
    }

    pub fn record_postconversion(&self, folder: &str, entry: &PostconversionEntry) {
        let step = format!("{:?}", entry.step).to_lowercase();
        let target = entry
            .artifact
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        let detail = entry.detail.as_deref().unwrap_or("");
        let tag = if entry.ok { "POST" } else { "PFAIL" };
        self.line(&format!(
            "{tag:<6} {folder} {} {step} {target} {detail}",
            entry.format
        ));
    }

    pub fn record_folder(&self, report: &FolderReport) {
        let status = format!("{:?}", report.status).to_lowercase();
        let mut message = format!(
            "FOLDER {} {status}: processed={} succeeded={} failed={} skipped={} cancelled={}",
            report.folder,
            report.counts.processed,
            report.counts.succeeded,
            report.counts.failed,
            report.counts.skipped,
            report.counts.cancelled,
        );
        if let Some(err) = &report.error {
            message.push_str(&format!(" error={err}"));
        }
        self.line(&message);
    }

    /// Write the summary line and the JSON report, then flush.
    pub fn close(self, report: &RunReport) -> Result<PathBuf> {
        self.line(&format!(
            "END    {} folders={} ok={} failed={} tasks={} succeeded={} task_failures={} cancelled={}",
            report.run_id,
            report.folders.len(),
            report.folders_succeeded(),
            report.folders_failed(),
            report.totals.processed,
            report.totals.succeeded,
            report.totals.failed,
            report.cancelled,
        ));

        let json_path = self.path.with_extension("json");
        std::fs::write(&json_path, serde_json::to_vec_pretty(report)?)?;

        let mut writer = self.writer.into_inner().unwrap_or_else(|p| p.into_inner());
        writer.flush()?;
        debug!(path = %json_path.display(), "Run log closed");
        Ok(json_path)
    }
}
