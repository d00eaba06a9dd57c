// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Searchable PDF pages: the scan at its physical size with an invisible,
// positioned text layer from the recognition engine.

use std::path::Path;
use std::sync::Mutex;

use scriptorium_core::config::SearchableSettings;
use scriptorium_core::error::{Result, ScriptoriumError};
use scriptorium_core::{FormatId, FormatKind, SourceFile};
use scriptorium_document::{ImageProcessor, PdfWriter, TextRecognizer, TextSpan, place_spans};
use tracing::{debug, info, instrument, warn};

use super::FormatConverter;

pub struct SearchableConverter {
    format: FormatId,
    settings: SearchableSettings,
    /// The engine is loaded once and shared by all workers. It need not be
    /// safe for concurrent use, so every call goes through this lock.
    recognizer: Option<Mutex<Box<dyn TextRecognizer>>>,
}

impl SearchableConverter {
    pub fn new(
        format: FormatId,
        settings: SearchableSettings,
        recognizer: Option<Box<dyn TextRecognizer>>,
    ) -> Self {
        match &recognizer {
            Some(engine) => info!(format = %format, engine = engine.name(), "Recognition engine ready"),
            None if settings.ocr => {
                warn!(format = %format, "No recognition engine available, pages will have no text layer")
            }
            None => {}
        }
        Self {
            format,
            settings,
            recognizer: recognizer.map(Mutex::new),
        }
    }

    pub fn has_text_layer(&self) -> bool {
        self.recognizer.is_some()
    }

    fn recognize(&self, image: &image::DynamicImage) -> Result<Vec<TextSpan>> {
        let Some(recognizer) = &self.recognizer else {
            return Ok(Vec::new());
        };
        let mut engine = recognizer
            .lock()
            .map_err(|_| ScriptoriumError::OcrError("recognition engine lock poisoned".to_string()))?;
        engine.recognize(image)
    }
}

impl FormatConverter for SearchableConverter {
    fn format(&self) -> &FormatId {
        &self.format
    }

    fn kind(&self) -> FormatKind {
        FormatKind::Searchable
    }

    #[instrument(skip_all, fields(format = %self.format, file = %source.stem))]
    fn convert(&self, source: &SourceFile, destination: &Path) -> Result<()> {
        let image = ImageProcessor::open(&source.path)?.into_dynamic();
        let spans = self.recognize(&image)?;
        let placed = place_spans(
            &spans,
            image.height(),
            self.settings.dpi,
            self.settings.confidence_threshold,
        );

        let mut writer = PdfWriter::new(self.settings.dpi, self.settings.font_size);
        writer.set_title(source.stem.clone());
        let bytes = writer.write_searchable_page(&image, &placed, destination)?;

        debug!(spans = spans.len(), placed = placed.len(), bytes, "Searchable page written");
        Ok(())
    }
}

/// The recognition engine used when none is injected: `ocrs` when built with
/// the `ocr` feature and its models load, otherwise nothing.
#[cfg(feature = "ocr")]
pub fn default_recognizer(
    format: &FormatId,
    settings: &SearchableSettings,
) -> Option<Box<dyn TextRecognizer>> {
    match scriptorium_document::OcrEngine::from_model_dir(settings.model_dir.as_deref()) {
        Ok(engine) => Some(Box::new(engine)),
        Err(err) => {
            warn!(format = %format, %err, "OCR engine unavailable");
            None
        }
    }
}

#[cfg(not(feature = "ocr"))]
pub fn default_recognizer(
    format: &FormatId,
    _settings: &SearchableSettings,
) -> Option<Box<dyn TextRecognizer>> {
    warn!(format = %format, "Built without the `ocr` feature");
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};
    use scriptorium_document::{FixedRecognizer, PdfReader};

    struct BrokenRecognizer;

    impl TextRecognizer for BrokenRecognizer {
        fn name(&self) -> &str {
            "broken"
        }

        fn recognize(&mut self, _image: &DynamicImage) -> Result<Vec<TextSpan>> {
            Err(ScriptoriumError::OcrError("model crashed".into()))
        }
    }

    fn tiff(dir: &Path, width: u32, height: u32) -> SourceFile {
        let path = dir.join("page.tif");
        RgbImage::from_pixel(width, height, Rgb([250, 250, 250]))
            .save(&path)
            .unwrap();
        SourceFile::from_path(&path).unwrap()
    }

    #[test]
    fn page_matches_image_size_at_dpi() {
        let dir = tempfile::tempdir().unwrap();
        let source = tiff(dir.path(), 150, 300);
        let converter = SearchableConverter::new(
            FormatId::new("PDF"),
            SearchableSettings {
                dpi: 150,
                ..SearchableSettings::default()
            },
            Some(Box::new(FixedRecognizer::new(vec![TextSpan::from_box(
                "Acta", 10.0, 10.0, 60.0, 30.0, 0.9,
            )]))),
        );
        assert!(converter.has_text_layer());

        let out = dir.path().join("page.pdf");
        converter.convert(&source, &out).unwrap();

        let reader = PdfReader::open(&out).unwrap();
        let (w, h) = reader.page_sizes()[0];
        assert!((w - 72.0).abs() < 0.5);
        assert!((h - 144.0).abs() < 0.5);
    }

    #[test]
    fn recognition_failure_fails_the_task() {
        let dir = tempfile::tempdir().unwrap();
        let source = tiff(dir.path(), 10, 10);
        let converter = SearchableConverter::new(
            FormatId::new("PDF"),
            SearchableSettings::default(),
            Some(Box::new(BrokenRecognizer)),
        );
        let err = converter
            .convert(&source, &dir.path().join("page.pdf"))
            .unwrap_err();
        assert!(matches!(err, ScriptoriumError::OcrError(_)));
    }

    #[test]
    fn image_only_page_without_engine() {
        let dir = tempfile::tempdir().unwrap();
        let source = tiff(dir.path(), 10, 10);
        let converter = SearchableConverter::new(
            FormatId::new("PDF"),
            SearchableSettings {
                ocr: false,
                ..SearchableSettings::default()
            },
            None,
        );
        let out = dir.path().join("page.pdf");
        converter.convert(&source, &out).unwrap();
        assert_eq!(PdfReader::open(&out).unwrap().page_count(), 1);
    }
}
