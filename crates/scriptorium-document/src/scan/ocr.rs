// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Word recognition with `ocrs`, behind the `ocr` feature.
//
// The engine needs a detection model and a recognition model, both `.rten`
// files in one directory. `ocrs-cli` downloads them into
// `$XDG_CACHE_HOME/ocrs` on first use, which is where we look by default.
// Build `ocrs` and `rten` with optimisations: debug builds are far too slow
// for a batch of full-page scans.

use std::path::{Path, PathBuf};

use image::DynamicImage;
use ocrs::{ImageSource, OcrEngine as OcrsEngine, OcrEngineParams, TextItem};
use rten::Model;
use scriptorium_core::error::ScriptoriumError;
use tracing::{debug, info, instrument};

use super::layer::TextSpan;
use super::recognize::TextRecognizer;

/// `ocrs` does not score its output; every recognised word is reported with
/// this confidence.
pub const OCRS_CONFIDENCE: f32 = 1.0;

const DETECTION_MODEL: &str = "text-detection.rten";
const RECOGNITION_MODEL: &str = "text-recognition.rten";

fn ocr_error(context: &str, err: impl std::fmt::Display) -> ScriptoriumError {
    ScriptoriumError::OcrError(format!("{context}: {err}"))
}

/// Where `ocrs-cli` caches its models.
fn cache_dir() -> PathBuf {
    std::env::var_os("XDG_CACHE_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".cache")))
        .map(|cache| cache.join("ocrs"))
        .unwrap_or_else(|| PathBuf::from("ocrs-models"))
}

/// Resolve a model file inside `dir`, failing early with a hint if absent.
fn model_file(dir: &Path, name: &str) -> Result<PathBuf, ScriptoriumError> {
    let path = dir.join(name);
    if path.is_file() {
        Ok(path)
    } else {
        Err(ScriptoriumError::OcrError(format!(
            "model not found at {}; run `ocrs-cli` once to download models",
            path.display()
        )))
    }
}

fn load_model(path: &Path) -> Result<Model, ScriptoriumError> {
    info!(model = %path.display(), "Loading OCR model");
    Model::load_file(path)
        .map_err(|err| ocr_error(&format!("failed to load {}", path.display()), err))
}

/// Word-level text recognition for scanned pages.
///
/// Loading the models dominates start-up, so one engine serves the whole run.
pub struct OcrEngine {
    engine: OcrsEngine,
}

impl OcrEngine {
    /// Load the models from `dir`, or from the `ocrs` cache when `None`.
    #[instrument(skip_all, fields(dir = ?dir))]
    pub fn from_model_dir(dir: Option<&Path>) -> Result<Self, ScriptoriumError> {
        let dir = dir.map(Path::to_path_buf).unwrap_or_else(cache_dir);
        let detection = model_file(&dir, DETECTION_MODEL)?;
        let recognition = model_file(&dir, RECOGNITION_MODEL)?;

        let engine = OcrsEngine::new(OcrEngineParams {
            detection_model: Some(load_model(&detection)?),
            recognition_model: Some(load_model(&recognition)?),
            ..Default::default()
        })
        .map_err(|err| ocr_error("failed to initialise OCR engine", err))?;

        info!(dir = %dir.display(), "OCR engine initialised");
        Ok(Self { engine })
    }

    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    fn recognize_words(&self, image: &DynamicImage) -> Result<Vec<TextSpan>, ScriptoriumError> {
        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();

        let source = ImageSource::from_bytes(rgb.as_raw(), (width, height))
            .map_err(|err| ocr_error(&format!("bad image source ({width}x{height})"), err))?;
        let input = self
            .engine
            .prepare_input(source)
            .map_err(|err| ocr_error("OCR preprocessing failed", err))?;

        let word_rects = self
            .engine
            .detect_words(&input)
            .map_err(|err| ocr_error("word detection failed", err))?;
        let line_rects = self.engine.find_text_lines(&input, &word_rects);
        let lines = self
            .engine
            .recognize_text(&input, &line_rects)
            .map_err(|err| ocr_error("line recognition failed", err))?;

        let mut spans = Vec::new();
        for line in lines.iter().flatten() {
            for word in line.words() {
                let text = word.to_string();
                if text.trim().is_empty() {
                    continue;
                }
                let rect = word.bounding_rect();
                spans.push(TextSpan::from_box(
                    text,
                    rect.left() as f32,
                    rect.top() as f32,
                    rect.right() as f32,
                    rect.bottom() as f32,
                    OCRS_CONFIDENCE,
                ));
            }
        }

        debug!(
            lines = line_rects.len(),
            words = spans.len(),
            "OCR recognition complete"
        );
        Ok(spans)
    }
}

impl TextRecognizer for OcrEngine {
    fn name(&self) -> &str {
        "ocrs"
    }

    fn recognize(&mut self, image: &DynamicImage) -> Result<Vec<TextSpan>, ScriptoriumError> {
        self.recognize_words(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_lookup_names_the_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = model_file(dir.path(), DETECTION_MODEL).unwrap_err();
        assert!(err.to_string().contains(DETECTION_MODEL));

        std::fs::write(dir.path().join(DETECTION_MODEL), b"").unwrap();
        assert_eq!(
            model_file(dir.path(), DETECTION_MODEL).unwrap(),
            dir.path().join(DETECTION_MODEL)
        );
    }

    #[test]
    fn missing_models_fail_to_load() {
        let result = OcrEngine::from_model_dir(Some(Path::new("/nonexistent/ocr-models")));
        assert!(matches!(result, Err(ScriptoriumError::OcrError(_))));
    }
}
