// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-format aggregate metadata records for a folder.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use scriptorium_core::config::AggregationConfig;
use scriptorium_core::error::{Result, ScriptoriumError};
use scriptorium_core::{ConversionOutcome, FolderBatch, FormatId, FormatKind, RunConfig, SourceFile};
use scriptorium_document::{ChecksumKind, ImageInfo, hash_file};
use tracing::{debug, info, instrument, warn};

use crate::mets::{self, Provenance};
use crate::report::{PostconversionEntry, PostconversionStep};

/// `<FORMAT>.xml`, written next to the format's per-file artifacts.
pub fn record_file_name(format: &FormatId) -> String {
    format!("{}.{}", format, FormatKind::Metadata.extension())
}

/// One (source file, artifact) pair of a successful conversion.
#[derive(Debug, Clone)]
pub struct AggregateEntry {
    pub source: Arc<SourceFile>,
    pub source_md5: String,
    pub source_info: Option<ImageInfo>,
    pub artifact: PathBuf,
    pub artifact_size: u64,
    pub artifact_md5: String,
    pub artifact_created: DateTime<Utc>,
    /// Only probed for raster artifacts.
    pub artifact_info: Option<ImageInfo>,
}

impl AggregateEntry {
    fn from_outcome(outcome: &ConversionOutcome, kind: FormatKind, probe_images: bool) -> Result<Self> {
        let artifact = outcome.artifact.clone().ok_or_else(|| {
            ScriptoriumError::Metadata(format!(
                "{}: successful outcome without an artifact",
                outcome.source.file_name()
            ))
        })?;
        let metadata = std::fs::metadata(&artifact)?;
        let artifact_created = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        let source_info = probe_images
            .then(|| ImageInfo::probe(&outcome.source.path).ok())
            .flatten();
        let artifact_info = (probe_images && kind == FormatKind::Raster)
            .then(|| ImageInfo::probe(&artifact).ok())
            .flatten();

        Ok(Self {
            source: Arc::clone(&outcome.source),
            source_md5: hash_file(ChecksumKind::Md5, &outcome.source.path)?,
            source_info,
            artifact_md5: hash_file(ChecksumKind::Md5, &artifact)?,
            artifact_size: metadata.len(),
            artifact,
            artifact_created,
            artifact_info,
        })
    }
}

/// Every successful artifact of one format in one folder, plus provenance.
#[derive(Debug, Clone)]
pub struct AggregateMetadataRecord {
    pub folder: String,
    pub format: FormatId,
    pub kind: FormatKind,
    pub provenance: Provenance,
    pub created: DateTime<Utc>,
    pub include_file_info: bool,
    pub include_image_info: bool,
    /// Ascending source name order.
    pub entries: Vec<AggregateEntry>,
}

impl AggregateMetadataRecord {
    /// Collect every artifact of `format` on disk, whether produced now or
    /// kept from an earlier run. Returns `None` when there are none.
    pub fn from_batch(
        batch: &FolderBatch,
        format: &FormatId,
        kind: FormatKind,
        config: &AggregationConfig,
    ) -> Result<Option<Self>> {
        let available = batch.available(format);
        if available.is_empty() {
            return Ok(None);
        }

        let entries = available
            .into_iter()
            .map(|outcome| AggregateEntry::from_outcome(outcome, kind, config.include_image_info))
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(Self {
            folder: batch.name.clone(),
            format: format.clone(),
            kind,
            provenance: Provenance::from(config),
            created: Utc::now(),
            include_file_info: config.include_file_info,
            include_image_info: config.include_image_info,
            entries,
        }))
    }

    /// `MET_<FORMAT>_<YYYYmmdd_HHMMSS>`.
    pub fn objid(&self) -> String {
        format!("MET_{}_{}", self.format, self.created.format("%Y%m%d_%H%M%S"))
    }

    pub fn file_name(&self) -> String {
        record_file_name(&self.format)
    }
}

/// Write one aggregate record per format that produced anything. A failure
/// for one format is recorded and does not stop the others.
#[instrument(skip_all, fields(folder = %batch.name))]
pub fn aggregate(batch: &FolderBatch, config: &RunConfig) -> Vec<PostconversionEntry> {
    let mut entries = Vec::new();
    for format in &batch.formats {
        let Some(kind) = config.format(format).map(|f| f.kind()) else {
            debug!(format = %format, "Format not configured, no aggregate record");
            continue;
        };
        match write_record(batch, format, kind, &config.aggregation) {
            Ok(Some(path)) => entries.push(PostconversionEntry::ok(
                PostconversionStep::Aggregation,
                format,
                path,
            )),
            Ok(None) => debug!(format = %format, "No successful artifacts, no aggregate record"),
            Err(err) => {
                warn!(format = %format, %err, "Aggregate record failed");
                entries.push(PostconversionEntry::failed(
                    PostconversionStep::Aggregation,
                    format,
                    err.to_string(),
                ));
            }
        }
    }
    entries
}

fn write_record(
    batch: &FolderBatch,
    format: &FormatId,
    kind: FormatKind,
    config: &AggregationConfig,
) -> Result<Option<PathBuf>> {
    let Some(record) = AggregateMetadataRecord::from_batch(batch, format, kind, config)? else {
        return Ok(None);
    };
    let xml = mets::aggregate_record(&record)?;
    let path = batch.format_dir(format).join(record.file_name());
    std::fs::write(&path, &xml)?;
    info!(
        format = %format,
        files = record.entries.len(),
        path = %path.display(),
        "Aggregate record written"
    );
    Ok(Some(path))
}
