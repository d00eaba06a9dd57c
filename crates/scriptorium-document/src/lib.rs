// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// scriptorium-document — Document operations for the Scriptorium batch converter.
//
// Provides image processing (probe, DPI rescale, JPEG encoding), searchable PDF
// creation with an invisible text layer, PDF merging and recompression, text
// recognition behind a narrow trait, and file checksums.

pub mod image;
pub mod integrity;
pub mod pdf;
pub mod scan;

// Re-export the primary structs so callers can use `scriptorium_document::PdfReader` etc.
pub use self::image::processor::{ImageInfo, ImageProcessor};
pub use integrity::{ChecksumKind, hash_bytes, hash_file};
pub use pdf::reader::{CompressOptions, ImageRecompression, PdfReader};
pub use pdf::writer::PdfWriter;
pub use scan::layer::{PlacedText, TextSpan, place_spans};
pub use scan::recognize::{FixedRecognizer, TextRecognizer};

#[cfg(feature = "ocr")]
pub use scan::ocr::OcrEngine;
