// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF writer — one scanned page per document, sized so the scan prints at
// its capture resolution, with recognised words laid over it as invisible
// text (render mode 3) for search and copy.

use std::path::Path;

use image::DynamicImage;
use printpdf::{
    BuiltinFont, Mm, Op, PdfDocument, PdfPage, PdfSaveOptions, PdfWarnMsg, Point, Pt, RawImage,
    RawImageData, RawImageFormat, TextItem, TextRenderingMode, XObjectId, XObjectTransform,
};
use scriptorium_core::error::ScriptoriumError;
use tracing::{debug, instrument};

use crate::scan::layer::{PlacedText, pixels_to_points};

const MM_PER_INCH: f32 = 25.4;

/// Creates searchable PDF pages: the scan drawn at its native physical size,
/// with an optional invisible text layer on top.
pub struct PdfWriter {
    /// Resolution the page is sized at.
    dpi: u32,
    /// Font size of the invisible text, in points.
    font_size: f32,
    /// /Title of the document info dictionary.
    title: Option<String>,
}

impl PdfWriter {
    pub fn new(dpi: u32, font_size: f32) -> Self {
        Self {
            dpi: dpi.max(1),
            font_size,
            title: None,
        }
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = Some(title.into());
    }

    pub fn dpi(&self) -> u32 {
        self.dpi
    }

    /// Page size in points for an image of the given pixel size.
    pub fn page_size_pt(&self, width_px: u32, height_px: u32) -> (f32, f32) {
        (
            pixels_to_points(width_px as f32, self.dpi),
            pixels_to_points(height_px as f32, self.dpi),
        )
    }

    fn page_size_mm(&self, width_px: u32, height_px: u32) -> (Mm, Mm) {
        let dpi = self.dpi as f32;
        (
            Mm(width_px as f32 / dpi * MM_PER_INCH),
            Mm(height_px as f32 / dpi * MM_PER_INCH),
        )
    }

    /// Operations for one page: the image at the origin at `dpi`, then each
    /// placed text item in its own invisible text section.
    pub fn page_ops(&self, image_id: XObjectId, text: &[PlacedText]) -> Vec<Op> {
        let mut ops = Vec::with_capacity(1 + text.len() * 6);
        ops.push(Op::UseXobject {
            id: image_id,
            transform: XObjectTransform {
                translate_x: Some(Pt(0.0)),
                translate_y: Some(Pt(0.0)),
                scale_x: None,
                scale_y: None,
                dpi: Some(self.dpi as f32),
                rotate: None,
            },
        });

        ops.extend(text.iter().flat_map(|placed| self.invisible_text(placed)));
        ops
    }

    fn invisible_text(&self, placed: &PlacedText) -> [Op; 6] {
        [
            Op::StartTextSection,
            Op::SetTextRenderingMode {
                mode: TextRenderingMode::Invisible,
            },
            Op::SetFontSizeBuiltinFont {
                size: Pt(self.font_size),
                font: BuiltinFont::Helvetica,
            },
            Op::SetTextCursor {
                pos: Point {
                    x: Pt(placed.x),
                    y: Pt(placed.y),
                },
            },
            Op::WriteTextBuiltinFont {
                items: vec![TextItem::Text(placed.text.clone())],
                font: BuiltinFont::Helvetica,
            },
            Op::EndTextSection,
        ]
    }

    /// Render `image` onto a page of exactly its physical size and overlay
    /// `text`, returning the serialised PDF.
    #[instrument(skip_all, fields(width = image.width(), height = image.height(), spans = text.len()))]
    pub fn create_searchable_page(
        &self,
        image: &DynamicImage,
        text: &[PlacedText],
    ) -> Result<Vec<u8>, ScriptoriumError> {
        let (width, height) = (image.width(), image.height());
        if width == 0 || height == 0 {
            return Err(ScriptoriumError::PdfError(
                "cannot place an empty image on a page".to_string(),
            ));
        }
        let title = self.title.as_deref().unwrap_or("Scriptorium Page");

        let mut doc = PdfDocument::new(title);
        let scan = doc.add_image(&RawImage {
            pixels: RawImageData::U8(image.to_rgb8().into_raw()),
            width: width as usize,
            height: height as usize,
            data_format: RawImageFormat::RGB8,
            tag: Vec::new(),
        });
        let (page_w, page_h) = self.page_size_mm(width, height);
        doc.with_pages(vec![PdfPage::new(page_w, page_h, self.page_ops(scan, text))]);

        let mut warnings: Vec<PdfWarnMsg> = Vec::new();
        let bytes = doc.save(&PdfSaveOptions::default(), &mut warnings);
        debug!(
            dpi = self.dpi,
            page = ?self.page_size_pt(width, height),
            warnings = warnings.len(),
            "Searchable page rendered"
        );
        Ok(bytes)
    }

    /// Create a searchable page and write it to `path`, returning its size in bytes.
    pub fn write_searchable_page(
        &self,
        image: &DynamicImage,
        text: &[PlacedText],
        path: impl AsRef<Path>,
    ) -> Result<u64, ScriptoriumError> {
        let pdf = self.create_searchable_page(image, text)?;
        std::fs::write(path, &pdf)?;
        Ok(pdf.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::reader::PdfReader;
    use image::{Rgb, RgbImage};

    fn placed(text: &str, x: f32, y: f32) -> PlacedText {
        PlacedText {
            text: text.to_string(),
            x,
            y,
        }
    }

    #[test]
    fn page_size_follows_dpi() {
        let writer = PdfWriter::new(300, 8.0);
        let (w, h) = writer.page_size_pt(2550, 3300);
        assert!((w - 612.0).abs() < 1e-3);
        assert!((h - 792.0).abs() < 1e-3);
    }

    #[test]
    fn text_is_invisible_and_positioned() {
        let writer = PdfWriter::new(300, 8.0);
        let mut doc = PdfDocument::new("t");
        let raw = RawImage {
            pixels: RawImageData::U8(vec![255; 3]),
            width: 1,
            height: 1,
            data_format: RawImageFormat::RGB8,
            tag: Vec::new(),
        };
        let id = doc.add_image(&raw);
        let ops = writer.page_ops(id, &[placed("folio", 36.0, 504.0)]);

        let invisible = ops.iter().any(|op| {
            matches!(
                op,
                Op::SetTextRenderingMode {
                    mode: TextRenderingMode::Invisible
                }
            )
        });
        assert!(invisible, "text layer must use the invisible rendering mode");

        let cursor = ops.iter().find_map(|op| match op {
            Op::SetTextCursor { pos } => Some((pos.x.0, pos.y.0)),
            _ => None,
        });
        assert_eq!(cursor, Some((36.0, 504.0)));

        let written: Vec<String> = ops
            .iter()
            .filter_map(|op| match op {
                Op::WriteTextBuiltinFont { items, .. } => Some(items),
                _ => None,
            })
            .flatten()
            .filter_map(|item| match item {
                TextItem::Text(t) => Some(t.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(written, vec!["folio".to_string()]);
    }

    #[test]
    fn image_only_page_has_no_text_sections() {
        let writer = PdfWriter::new(72, 8.0);
        let mut doc = PdfDocument::new("t");
        let raw = RawImage {
            pixels: RawImageData::U8(vec![0; 3]),
            width: 1,
            height: 1,
            data_format: RawImageFormat::RGB8,
            tag: Vec::new(),
        };
        let id = doc.add_image(&raw);
        let ops = writer.page_ops(id, &[]);
        assert_eq!(ops.len(), 1);
        assert!(matches!(ops[0], Op::UseXobject { .. }));
    }

    #[test]
    fn created_page_is_a_loadable_single_page_pdf() {
        let writer = PdfWriter::new(72, 8.0);
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 20, Rgb([10, 20, 30])));
        let bytes = writer
            .create_searchable_page(&image, &[placed("x", 1.0, 1.0)])
            .unwrap();

        let reader = PdfReader::from_bytes(&bytes).unwrap();
        assert_eq!(reader.page_count(), 1);
        let sizes = reader.page_sizes();
        assert!((sizes[0].0 - 40.0).abs() < 0.5);
        assert!((sizes[0].1 - 20.0).abs() < 0.5);
    }
}
