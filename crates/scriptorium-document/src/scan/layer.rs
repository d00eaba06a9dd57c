// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Text-layer placement — maps recognised spans from image pixel space onto
// PDF page space.
//
// Image coordinates have their origin at the top-left and grow downward; PDF
// page coordinates have their origin at the bottom-left and grow upward. A
// span's baseline anchor is therefore its left-most x and its lowest (largest)
// y, flipped against the image height:
//
//   pdf_x = min(x) * 72 / dpi
//   pdf_y = (image_height - max(y)) * 72 / dpi

use serde::{Deserialize, Serialize};
use tracing::debug;

/// PDF user-space units per inch.
pub const POINTS_PER_INCH: f32 = 72.0;

/// A piece of text reported by a recognition engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextSpan {
    pub text: String,
    /// Bounding polygon in source-image pixels.
    pub polygon: Vec<(f32, f32)>,
    /// Engine confidence in 0.0..=1.0.
    pub confidence: f32,
}

impl TextSpan {
    /// Span covering the axis-aligned box `(left, top)`..`(right, bottom)`.
    pub fn from_box(
        text: impl Into<String>,
        left: f32,
        top: f32,
        right: f32,
        bottom: f32,
        confidence: f32,
    ) -> Self {
        Self {
            text: text.into(),
            polygon: vec![(left, top), (right, top), (right, bottom), (left, bottom)],
            confidence,
        }
    }
}

/// A span positioned on the page, ready to be drawn.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedText {
    pub text: String,
    /// Points from the left page edge.
    pub x: f32,
    /// Points from the bottom page edge.
    pub y: f32,
}

/// Page size in points for an image of `pixels` rendered at `dpi`.
pub fn pixels_to_points(pixels: f32, dpi: u32) -> f32 {
    pixels * POINTS_PER_INCH / dpi as f32
}

/// Place every span whose confidence reaches `threshold`.
///
/// Spans with blank text or an empty polygon are dropped as well.
pub fn place_spans(
    spans: &[TextSpan],
    image_height_px: u32,
    dpi: u32,
    threshold: f32,
) -> Vec<PlacedText> {
    let height = image_height_px as f32;
    let placed: Vec<PlacedText> = spans
        .iter()
        .filter(|span| span.confidence >= threshold)
        .filter(|span| !span.text.trim().is_empty())
        .filter_map(|span| {
            let min_x = span
                .polygon
                .iter()
                .map(|&(x, _)| x)
                .reduce(f32::min)?;
            let max_y = span
                .polygon
                .iter()
                .map(|&(_, y)| y)
                .reduce(f32::max)?;
            Some(PlacedText {
                text: span.text.clone(),
                x: pixels_to_points(min_x, dpi),
                y: pixels_to_points(height - max_y, dpi),
            })
        })
        .collect();

    debug!(
        spans = spans.len(),
        placed = placed.len(),
        threshold,
        "Text layer placed"
    );
    placed
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f32 = 1e-3;

    #[test]
    fn span_is_flipped_and_scaled() {
        // 300 dpi, 3000 px tall page; box from (150, 600) to (450, 900).
        let spans = vec![TextSpan::from_box("Archivo", 150.0, 600.0, 450.0, 900.0, 0.9)];
        let placed = place_spans(&spans, 3000, 300, 0.5);

        assert_eq!(placed.len(), 1);
        assert!((placed[0].x - 36.0).abs() < TOLERANCE);
        assert!((placed[0].y - 504.0).abs() < TOLERANCE);
        assert_eq!(placed[0].text, "Archivo");
    }

    #[test]
    fn rotated_polygon_uses_extremes() {
        let span = TextSpan {
            text: "tilted".into(),
            polygon: vec![(110.0, 210.0), (300.0, 190.0), (305.0, 240.0), (100.0, 260.0)],
            confidence: 0.8,
        };
        let placed = place_spans(&[span], 1000, 144, 0.5);
        assert!((placed[0].x - 50.0).abs() < TOLERANCE);
        assert!((placed[0].y - 370.0).abs() < TOLERANCE);
    }

    #[test]
    fn low_confidence_spans_are_dropped() {
        let spans = vec![
            TextSpan::from_box("keep", 0.0, 0.0, 10.0, 10.0, 0.5),
            TextSpan::from_box("drop", 0.0, 20.0, 10.0, 30.0, 0.49),
        ];
        let placed = place_spans(&spans, 100, 72, 0.5);
        let texts: Vec<&str> = placed.iter().map(|p| p.text.as_str()).collect();
        assert_eq!(texts, vec!["keep"]);
    }

    #[test]
    fn blank_or_shapeless_spans_are_dropped() {
        let spans = vec![
            TextSpan::from_box("   ", 0.0, 0.0, 10.0, 10.0, 1.0),
            TextSpan {
                text: "nowhere".into(),
                polygon: Vec::new(),
                confidence: 1.0,
            },
        ];
        assert!(place_spans(&spans, 100, 72, 0.0).is_empty());
    }

    #[test]
    fn page_points_match_physical_size() {
        // 2550 px at 300 dpi is 8.5 in, i.e. 612 pt.
        assert!((pixels_to_points(2550.0, 300) - 612.0).abs() < TOLERANCE);
    }
}
