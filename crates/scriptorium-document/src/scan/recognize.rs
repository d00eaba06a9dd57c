// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Text recognition seam. The searchable-PDF converter depends only on this
// trait, so any engine (or a fixed fake in tests) can supply the spans.

use image::DynamicImage;
use scriptorium_core::error::ScriptoriumError;

use super::layer::TextSpan;

/// Something that turns a page image into positioned text spans.
///
/// Engines are loaded once and reused for every page. They are not required
/// to be `Sync`: callers that share one across threads serialise access.
pub trait TextRecognizer: Send {
    /// Short engine name for logs.
    fn name(&self) -> &str;

    /// Recognise the text on `image`. Polygons are in `image` pixel space.
    fn recognize(&mut self, image: &DynamicImage) -> Result<Vec<TextSpan>, ScriptoriumError>;
}

/// A recogniser that always returns the same spans. Handy for tests and for
/// re-rendering pages whose text is already known.
#[derive(Debug, Clone, Default)]
pub struct FixedRecognizer {
    spans: Vec<TextSpan>,
}

impl FixedRecognizer {
    pub fn new(spans: Vec<TextSpan>) -> Self {
        Self { spans }
    }
}

impl TextRecognizer for FixedRecognizer {
    fn name(&self) -> &str {
        "fixed"
    }

    fn recognize(&mut self, _image: &DynamicImage) -> Result<Vec<TextSpan>, ScriptoriumError> {
        Ok(self.spans.clone())
    }
}
