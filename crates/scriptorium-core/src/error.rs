// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Scriptorium.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level error type for all Scriptorium operations.
#[derive(Debug, Error)]
pub enum ScriptoriumError {
    // -- Run setup --
    #[error("configuration error: {0}")]
    Config(String),

    #[error("unknown target format: {0}")]
    UnknownFormat(String),

    // -- Conversion --
    #[error("image processing failed: {0}")]
    ImageError(String),

    #[error("PDF operation failed: {0}")]
    PdfError(String),

    #[error("OCR failed: {0}")]
    OcrError(String),

    #[error("metadata generation failed: {0}")]
    Metadata(String),

    // -- Storage / persistence --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ScriptoriumError {
    /// True for errors that must stop the run before any task is submitted.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::UnknownFormat(_))
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ScriptoriumError>;

/// Why a single (file, format) task did not produce an artifact.
///
/// Stored inside the task's outcome rather than propagated, so one failed
/// task never unwinds past the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum OutcomeError {
    /// The artifact already exists and overwriting is disabled.
    #[error("exists")]
    Exists,

    /// The task was never submitted because shutdown was requested.
    #[error("cancelled")]
    Cancelled,

    /// The converter returned an error.
    #[error("{0}")]
    Converter(String),

    /// Another task of the same folder and format, or a postconversion
    /// output, already owns the destination name.
    #[error("name conflict: {0}")]
    NameConflict(String),

    /// The worker running the converter panicked or was aborted.
    #[error("worker panicked: {0}")]
    Panicked(String),
}

impl From<ScriptoriumError> for OutcomeError {
    fn from(err: ScriptoriumError) -> Self {
        Self::Converter(err.to_string())
    }
}
