// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scanning pipeline — text recognition and placement of the recognised text
// on the PDF page.

pub mod layer;
pub mod recognize;

#[cfg(feature = "ocr")]
pub mod ocr;

pub use layer::{PlacedText, TextSpan, place_spans};
pub use recognize::{FixedRecognizer, TextRecognizer};

#[cfg(feature = "ocr")]
pub use ocr::OcrEngine;
