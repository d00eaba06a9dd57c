// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Scriptorium batch converter.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{OutcomeError, Result};

/// Identifier of a target format (`JPGHIGH`, `PDF`, `METS`, ...).
///
/// Always stored upper-case so that lookups from the command line and from
/// configuration files agree regardless of how the user typed them.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct FormatId(String);

impl FormatId {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(name.as_ref().trim().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for FormatId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for FormatId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<FormatId> for String {
    fn from(value: FormatId) -> Self {
        value.0
    }
}

impl std::fmt::Display for FormatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The three families of derived artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatKind {
    /// Resized, re-encoded raster copy.
    Raster,
    /// Page image plus invisible text layer.
    Searchable,
    /// Per-file preservation metadata record.
    Metadata,
}

impl FormatKind {
    /// File extension (without dot) of artifacts of this kind.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Raster => "jpg",
            Self::Searchable => "pdf",
            Self::Metadata => "xml",
        }
    }

    /// MIME type reported in metadata records.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Raster => "image/jpeg",
            Self::Searchable => "application/pdf",
            Self::Metadata => "application/xml",
        }
    }
}

/// One discovered source image. Immutable after discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub path: PathBuf,
    /// File name without its extension.
    pub stem: String,
    pub size_bytes: u64,
    pub modified: DateTime<Utc>,
}

impl SourceFile {
    /// Stat `path` and capture its identity.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path)?;
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let modified = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        Ok(Self {
            path: path.to_path_buf(),
            stem,
            size_bytes: metadata.len(),
            modified,
        })
    }

    /// File name including extension.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.stem.clone())
    }

    /// Lower-cased extension without the dot.
    pub fn extension(&self) -> String {
        self.path
            .extension()
            .map(|s| s.to_string_lossy().to_lowercase())
            .unwrap_or_default()
    }
}

/// A single (file, format) unit of work.
#[derive(Debug, Clone)]
pub struct ConversionTask {
    pub source: Arc<SourceFile>,
    pub format: FormatId,
    /// Where the artifact will be written.
    pub destination: PathBuf,
}

/// The recorded result of exactly one [`ConversionTask`].
#[derive(Debug, Clone)]
pub struct ConversionOutcome {
    pub source: Arc<SourceFile>,
    pub format: FormatId,
    pub artifact: Option<PathBuf>,
    pub success: bool,
    pub error: Option<OutcomeError>,
    pub size_bytes: u64,
}

impl ConversionOutcome {
    pub fn succeeded(task: &ConversionTask, size_bytes: u64) -> Self {
        Self {
            source: Arc::clone(&task.source),
            format: task.format.clone(),
            artifact: Some(task.destination.clone()),
            success: true,
            error: None,
            size_bytes,
        }
    }

    pub fn failed(task: &ConversionTask, error: OutcomeError) -> Self {
        Self {
            source: Arc::clone(&task.source),
            format: task.format.clone(),
            artifact: None,
            success: false,
            error: Some(error),
            size_bytes: 0,
        }
    }

    /// Outcome for a task whose artifact is already on disk.
    pub fn skipped_existing(task: &ConversionTask) -> Self {
        let mut outcome = Self::failed(task, OutcomeError::Exists);
        outcome.artifact = Some(task.destination.clone());
        outcome
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.error, Some(OutcomeError::Exists))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.error, Some(OutcomeError::Cancelled))
    }
}

/// Everything needed to process one eligible folder.
///
/// Built by discovery, filled with outcomes by the scheduler, and consumed by
/// the postconversion stage. Dropped once that stage completes.
#[derive(Debug, Clone)]
pub struct FolderBatch {
    pub name: String,
    /// Directory holding the source files.
    pub source_dir: PathBuf,
    /// `<output>/<name>`.
    pub output_dir: PathBuf,
    /// Sorted by file name.
    pub sources: Vec<Arc<SourceFile>>,
    pub formats: Vec<FormatId>,
    pub outcomes: Vec<ConversionOutcome>,
}

impl FolderBatch {
    pub fn new(
        name: impl Into<String>,
        source_dir: impl Into<PathBuf>,
        output_root: &Path,
        sources: Vec<SourceFile>,
        formats: Vec<FormatId>,
    ) -> Self {
        let name = name.into();
        Self {
            output_dir: output_root.join(&name),
            name,
            source_dir: source_dir.into(),
            sources: sources.into_iter().map(Arc::new).collect(),
            formats,
            outcomes: Vec::new(),
        }
    }

    /// `<output>/<folder>/<FORMAT>`.
    pub fn format_dir(&self, format: &FormatId) -> PathBuf {
        self.output_dir.join(format.as_str())
    }

    /// Number of tasks in the full (file x format) matrix.
    pub fn task_count(&self) -> usize {
        self.sources.len() * self.formats.len()
    }

    /// Successful outcomes for `format`, in ascending source file name order
    /// (case-insensitive, the same order discovery uses).
    pub fn successful(&self, format: &FormatId) -> Vec<&ConversionOutcome> {
        let mut found: Vec<&ConversionOutcome> = self
            .outcomes
            .iter()
            .filter(|o| o.success && &o.format == format)
            .collect();
        found.sort_by_cached_key(|o| o.source.file_name().to_lowercase());
        found
    }

    /// Outcomes of `format` that have an artifact: produced by this run, or
    /// skipped because an earlier run left it on disk. Same order as
    /// [`successful`](Self::successful). Failed outcomes are never included.
    pub fn available(&self, format: &FormatId) -> Vec<&ConversionOutcome> {
        let mut found: Vec<&ConversionOutcome> = self
            .outcomes
            .iter()
            .filter(|o| &o.format == format)
            .filter(|o| {
                o.success || (o.is_skipped() && o.artifact.as_deref().is_some_and(Path::is_file))
            })
            .collect();
        found.sort_by_cached_key(|o| o.source.file_name().to_lowercase());
        found
    }

    pub fn succeeded_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.success).count()
    }
}
