// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Consolidation of a folder's per-file PDFs into size-bounded documents.
//
// Output size is only known after merging, so capacity is estimated by
// count: `max(1, floor(max_size_mb / estimated_mb_per_file))` files per
// document, filled in source-name order. The size bound is approximate.

use std::io::Write;
use std::path::{Path, PathBuf};

use scriptorium_core::config::ConsolidationConfig;
use scriptorium_core::error::Result;
use scriptorium_core::{FolderBatch, FormatId};
use scriptorium_document::{CompressOptions, ImageRecompression, PdfReader};
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument, warn};

use crate::report::{PostconversionEntry, PostconversionStep};

/// Rewrites a merged document, returning the new bytes.
pub type Compressor = dyn Fn(&[u8]) -> Result<Vec<u8>> + Send + Sync;

/// Files that fit one consolidated document under the size estimate.
pub fn files_per_document(max_size_mb: u32, estimated_mb_per_file: f64) -> usize {
    if estimated_mb_per_file <= 0.0 {
        return 1;
    }
    let fit = (f64::from(max_size_mb) / estimated_mb_per_file).floor();
    (fit as usize).max(1)
}

/// `<folder>_consolidated` or `<folder>_NN`: stems of consolidated documents.
pub fn is_consolidated_stem(folder: &str, stem: &str) -> bool {
    let stem = stem.to_lowercase();
    let Some(suffix) = stem.strip_prefix(&format!("{}_", folder.to_lowercase())) else {
        return false;
    };
    suffix == "consolidated" || (suffix.len() >= 2 && suffix.bytes().all(|b| b.is_ascii_digit()))
}

/// One output document and the inputs merged into it, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedDocument {
    pub file_name: String,
    pub inputs: Vec<PathBuf>,
}

/// Ordered, count-based partition of a folder's per-file documents.
///
/// Every input lands in exactly one document and input order is preserved
/// across documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsolidatedDocumentPlan {
    documents: Vec<PlannedDocument>,
}

impl ConsolidatedDocumentPlan {
    /// `<folder>_consolidated.<ext>` when one document holds everything,
    /// otherwise `<folder>_01.<ext>`, `<folder>_02.<ext>`, ...
    pub fn new(folder: &str, extension: &str, inputs: Vec<PathBuf>, per_document: usize) -> Self {
        let per_document = per_document.max(1);
        let chunks: Vec<Vec<PathBuf>> = inputs
            .chunks(per_document)
            .map(<[PathBuf]>::to_vec)
            .collect();

        let single = chunks.len() == 1;
        let documents = chunks
            .into_iter()
            .enumerate()
            .map(|(index, inputs)| PlannedDocument {
                file_name: if single {
                    format!("{folder}_consolidated.{extension}")
                } else {
                    format!("{folder}_{:02}.{extension}", index + 1)
                },
                inputs,
            })
            .collect();

        Self { documents }
    }

    pub fn documents(&self) -> &[PlannedDocument] {
        &self.documents
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Write `bytes` to `path` through a temporary sibling file.
fn replace_file(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|err| err.error)?;
    Ok(())
}

fn compress_options(config: &ConsolidationConfig) -> CompressOptions {
    CompressOptions {
        images: Some(ImageRecompression {
            target_dpi: config.target_dpi,
            quality: config.image_quality,
        }),
        remove_metadata: config.remove_metadata,
    }
}

/// Consolidate every document of `config.format` the batch has on disk.
pub fn consolidate(batch: &FolderBatch, config: &ConsolidationConfig) -> Vec<PostconversionEntry> {
    let options = compress_options(config);
    let compressor = move |bytes: &[u8]| PdfReader::from_bytes(bytes)?.compress(&options);
    consolidate_with(batch, config, &compressor)
}

/// Like [`consolidate`] with a caller-supplied compression step.
#[instrument(skip_all, fields(folder = %batch.name, format = %config.format))]
pub fn consolidate_with(
    batch: &FolderBatch,
    config: &ConsolidationConfig,
    compressor: &Compressor,
) -> Vec<PostconversionEntry> {
    let format = &config.format;
    // Documents kept from earlier runs belong in the consolidated output too.
    let inputs: Vec<PathBuf> = batch
        .available(format)
        .into_iter()
        .filter_map(|outcome| outcome.artifact.clone())
        .collect();
    if inputs.is_empty() {
        debug!("No documents to consolidate");
        return Vec::new();
    }

    let extension = inputs[0]
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "pdf".to_string());
    let per_document = files_per_document(config.max_size_mb, config.estimated_mb_per_file);
    let plan = ConsolidatedDocumentPlan::new(&batch.name, &extension, inputs, per_document);
    info!(documents = plan.len(), per_document, "Consolidating");

    let dir = batch.format_dir(format);
    let mut entries = Vec::new();
    for document in plan.documents() {
        let target = dir.join(&document.file_name);
        match write_document(document, &target, format, config.compress, compressor) {
            Ok(mut written) => entries.append(&mut written),
            Err(err) => {
                warn!(document = %document.file_name, %err, "Consolidation failed");
                entries.push(PostconversionEntry::failed(
                    PostconversionStep::Consolidation,
                    format,
                    format!("{}: {err}", document.file_name),
                ));
            }
        }
    }
    entries
}

fn write_document(
    document: &PlannedDocument,
    target: &Path,
    format: &FormatId,
    compress: bool,
    compressor: &Compressor,
) -> Result<Vec<PostconversionEntry>> {
    let merged = PdfReader::merge_files(&document.inputs)?;
    replace_file(target, &merged)?;

    let mut entries = vec![
        PostconversionEntry::ok(PostconversionStep::Consolidation, format, target.to_path_buf())
            .with_detail(format!("{} files, {} bytes", document.inputs.len(), merged.len())),
    ];
    if compress {
        entries.push(compress_in_place(target, &merged, format, compressor));
    }
    Ok(entries)
}

/// Replace `target` with its compressed form when that succeeds and is not
/// larger. Otherwise the merged document stays as written.
fn compress_in_place(
    target: &Path,
    merged: &[u8],
    format: &FormatId,
    compressor: &Compressor,
) -> PostconversionEntry {
    let step = PostconversionStep::Compression;
    let result = compressor(merged).and_then(|compressed| {
        if compressed.len() > merged.len() {
            return Ok(None);
        }
        replace_file(target, &compressed)?;
        Ok(Some(compressed.len()))
    });

    match result {
        Ok(Some(size)) => {
            debug!(before = merged.len(), after = size, "Consolidated document compressed");
            PostconversionEntry::ok(step, format, target.to_path_buf())
                .with_detail(format!("{} -> {size} bytes", merged.len()))
        }
        Ok(None) => PostconversionEntry::ok(step, format, target.to_path_buf())
            .with_detail("kept uncompressed: compressed output was larger"),
        Err(err) => {
            warn!(target = %target.display(), %err, "Compression failed, keeping uncompressed document");
            let mut entry = PostconversionEntry::failed(
                step,
                format,
                format!("kept uncompressed: {err}"),
            );
            entry.artifact = Some(target.to_path_buf());
            entry
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};
    use scriptorium_core::error::ScriptoriumError;
    use scriptorium_core::{ConversionOutcome, ConversionTask, SourceFile};
    use scriptorium_document::PdfWriter;
    use std::sync::Arc;

    /// Batch with one successful single-page PDF per stem; the page of the
    /// n-th stem is (n + 1) * 10 pt wide.
    fn pdf_batch(root: &Path, stems: &[&str]) -> FolderBatch {
        let mut batch = FolderBatch::new(
            "box",
            root.join("in"),
            root,
            Vec::new(),
            vec![FormatId::new("PDF")],
        );
        let dir = batch.format_dir(&FormatId::new("PDF"));
        std::fs::create_dir_all(&dir).unwrap();

        let writer = PdfWriter::new(72, 8.0);
        for (index, stem) in stems.iter().enumerate() {
            let width = (index as u32 + 1) * 10;
            let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, 10, Rgb([255, 255, 255])));
            let destination = dir.join(format!("{stem}.pdf"));
            writer.write_searchable_page(&image, &[], &destination).unwrap();

            let source = Arc::new(SourceFile {
                path: root.join(format!("in/{stem}.tif")),
                stem: stem.to_string(),
                size_bytes: 1,
                modified: chrono::Utc::now(),
            });
            let task = ConversionTask {
                source: Arc::clone(&source),
                format: FormatId::new("PDF"),
                destination,
            };
            batch.sources.push(source);
            batch.outcomes.push(ConversionOutcome::succeeded(&task, 1));
        }
        batch
    }

    fn widths(path: &Path) -> Vec<u32> {
        PdfReader::open(path)
            .unwrap()
            .page_sizes()
            .iter()
            .map(|(w, _)| w.round() as u32)
            .collect()
    }

    fn config(max_size_mb: u32) -> ConsolidationConfig {
        ConsolidationConfig {
            max_size_mb,
            estimated_mb_per_file: 3.0,
            compress: false,
            ..ConsolidationConfig::default()
        }
    }

    #[test]
    fn capacity_estimate() {
        assert_eq!(files_per_document(10, 3.0), 3);
        assert_eq!(files_per_document(6, 3.0), 2);
        assert_eq!(files_per_document(1, 3.0), 1);
    }

    #[test]
    fn plan_preserves_order_across_documents() {
        let inputs: Vec<PathBuf> = ["a", "b", "c", "d", "e"].iter().map(PathBuf::from).collect();
        let plan = ConsolidatedDocumentPlan::new("box", "pdf", inputs, 2);
        let names: Vec<&str> = plan.documents().iter().map(|d| d.file_name.as_str()).collect();
        assert_eq!(names, vec!["box_01.pdf", "box_02.pdf", "box_03.pdf"]);
        assert_eq!(plan.documents()[2].inputs, vec![PathBuf::from("e")]);
        assert!(ConsolidatedDocumentPlan::new("box", "pdf", Vec::new(), 2).is_empty());
    }

    #[test]
    fn single_document_when_everything_fits() {
        let dir = tempfile::tempdir().unwrap();
        let batch = pdf_batch(dir.path(), &["a", "b", "c"]);

        let entries = consolidate(&batch, &config(100));

        let out = dir.path().join("box/PDF/box_consolidated.pdf");
        assert_eq!(widths(&out), vec![10, 20, 30]);
        assert_eq!(entries.len(), 1);
        assert!(entries[0].ok);
    }

    #[test]
    fn splits_into_numbered_documents() {
        let dir = tempfile::tempdir().unwrap();
        let batch = pdf_batch(dir.path(), &["a", "b", "c"]);

        consolidate(&batch, &config(6));

        let pdf_dir = dir.path().join("box/PDF");
        assert_eq!(widths(&pdf_dir.join("box_01.pdf")), vec![10, 20]);
        assert_eq!(widths(&pdf_dir.join("box_02.pdf")), vec![30]);
        assert!(!pdf_dir.join("box_consolidated.pdf").exists());
    }

    #[test]
    fn compression_failure_keeps_merged_document() {
        let dir = tempfile::tempdir().unwrap();
        let batch = pdf_batch(dir.path(), &["a", "b"]);
        let mut cfg = config(100);
        cfg.compress = true;

        let entries = consolidate_with(&batch, &cfg, &|_| {
            Err(ScriptoriumError::PdfError("compressor crashed".into()))
        });

        let out = dir.path().join("box/PDF/box_consolidated.pdf");
        assert_eq!(widths(&out), vec![10, 20]);
        let compression = entries
            .iter()
            .find(|e| e.step == PostconversionStep::Compression)
            .unwrap();
        assert!(!compression.ok);
        assert_eq!(compression.artifact.as_deref(), Some(out.as_path()));
    }

    #[test]
    fn larger_compressed_output_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let batch = pdf_batch(dir.path(), &["a"]);
        let mut cfg = config(100);
        cfg.compress = true;

        let entries = consolidate_with(&batch, &cfg, &|bytes| {
            let mut bigger = bytes.to_vec();
            bigger.extend_from_slice(&[0u8; 64]);
            Ok(bigger)
        });

        let out = dir.path().join("box/PDF/box_consolidated.pdf");
        assert_eq!(widths(&out), vec![10]);
        assert!(entries.iter().all(|e| e.ok));
    }

    #[test]
    fn real_compression_keeps_pages() {
        let dir = tempfile::tempdir().unwrap();
        let batch = pdf_batch(dir.path(), &["a", "b"]);
        let mut cfg = config(100);
        cfg.compress = true;

        let entries = consolidate(&batch, &cfg);

        assert!(entries.iter().all(|e| e.ok));
        let out = dir.path().join("box/PDF/box_consolidated.pdf");
        assert_eq!(widths(&out), vec![10, 20]);
    }

    #[test]
    fn nothing_to_do_without_successes() {
        let dir = tempfile::tempdir().unwrap();
        let batch = FolderBatch::new("box", dir.path(), dir.path(), Vec::new(), Vec::new());
        assert!(consolidate(&batch, &config(10)).is_empty());
    }
}
