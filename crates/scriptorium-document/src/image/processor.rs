// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image processor — open scans, rescale them between resolutions, and encode
// JPEG output with a DPI density header. Operates on in-memory images using
// the `image` crate.

use std::path::Path;

use image::codecs::jpeg::{JpegEncoder, PixelDensity};
use image::imageops::FilterType;
use image::{DynamicImage, ImageDecoder, ImageReader};
use scriptorium_core::error::ScriptoriumError;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Pixel attributes of an image file, read from its header without decoding
/// the pixel data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    /// Colour layout, e.g. `Rgb8` or `L8`.
    pub color: String,
    /// Detected container format, e.g. `Tiff`.
    pub format: String,
}

impl ImageInfo {
    /// Read dimensions, colour type and format from the file header.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn probe(path: impl AsRef<Path>) -> Result<Self, ScriptoriumError> {
        let path = path.as_ref();
        let reader = ImageReader::open(path)
            .and_then(|r| r.with_guessed_format())
            .map_err(|err| {
                ScriptoriumError::ImageError(format!("failed to open {}: {}", path.display(), err))
            })?;
        let format = reader
            .format()
            .map(|f| format!("{f:?}"))
            .unwrap_or_else(|| "Unknown".to_string());

        let decoder = reader.into_decoder().map_err(|err| {
            ScriptoriumError::ImageError(format!(
                "failed to read header of {}: {}",
                path.display(),
                err
            ))
        })?;
        let (width, height) = decoder.dimensions();
        let color = format!("{:?}", decoder.color_type());

        debug!(width, height, %color, %format, "Image probed");
        Ok(Self {
            width,
            height,
            color,
            format,
        })
    }
}

/// A decoded scan, resampled and encoded by value.
///
/// ```ignore
/// ImageProcessor::open("page.tif")?
///     .rescale_dpi(400, 200)
///     .save_jpeg("page.jpg", 90, Some(200))?;
/// ```
pub struct ImageProcessor {
    image: DynamicImage,
}

impl From<DynamicImage> for ImageProcessor {
    fn from(image: DynamicImage) -> Self {
        Self { image }
    }
}

impl ImageProcessor {
    /// Decode the whole file into memory.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ScriptoriumError> {
        let path = path.as_ref();
        let image = image::open(path).map_err(|err| {
            ScriptoriumError::ImageError(format!("cannot decode {}: {err}", path.display()))
        })?;
        debug!(width = image.width(), height = image.height(), "Image decoded");
        Ok(image.into())
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn into_dynamic(self) -> DynamicImage {
        self.image
    }

    /// Scale both axes by `factor`, never collapsing a side below one pixel.
    /// A factor of 1.0 returns the image untouched.
    #[instrument(skip(self), fields(factor))]
    pub fn scale(self, factor: f64) -> Self {
        if (factor - 1.0).abs() < f64::EPSILON {
            return self;
        }
        let new_w = ((self.image.width() as f64 * factor).round() as u32).max(1);
        let new_h = ((self.image.height() as f64 * factor).round() as u32).max(1);
        debug!(
            width = self.image.width(),
            height = self.image.height(),
            new_w,
            new_h,
            "Resampling"
        );
        self.image
            .resize_exact(new_w, new_h, FilterType::Lanczos3)
            .into()
    }

    /// Rescale an image captured at `source_dpi` so it prints at the same
    /// physical size at `target_dpi`.
    pub fn rescale_dpi(self, source_dpi: u32, target_dpi: u32) -> Self {
        if source_dpi == 0 {
            return self;
        }
        self.scale(target_dpi as f64 / source_dpi as f64)
    }

    /// Encode the current image as JPEG bytes with the given quality (1-100),
    /// optionally stamping the JFIF density header with `dpi`.
    pub fn to_jpeg_bytes(&self, quality: u8, dpi: Option<u32>) -> Result<Vec<u8>, ScriptoriumError> {
        let mut jpeg = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut jpeg, quality);
        if let Some(dpi) = dpi {
            let density = u16::try_from(dpi).unwrap_or(u16::MAX);
            encoder.set_pixel_density(PixelDensity::dpi(density));
        }
        self.image
            .to_rgb8()
            .write_with_encoder(encoder)
            .map_err(|err| ScriptoriumError::ImageError(format!("JPEG encoding failed: {err}")))?;
        Ok(jpeg)
    }

    /// Encode as JPEG and write to `path`, returning the number of bytes written.
    pub fn save_jpeg(
        &self,
        path: impl AsRef<Path>,
        quality: u8,
        dpi: Option<u32>,
    ) -> Result<u64, ScriptoriumError> {
        let jpeg = self.to_jpeg_bytes(quality, dpi)?;
        std::fs::write(path, &jpeg)?;
        Ok(jpeg.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn sample(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([200, 180, 160])))
    }

    #[test]
    fn rescale_halves_dimensions() {
        let out = ImageProcessor::from(sample(80, 40)).rescale_dpi(400, 200);
        assert_eq!((out.width(), out.height()), (40, 20));
    }

    #[test]
    fn rescale_same_dpi_is_identity() {
        let out = ImageProcessor::from(sample(33, 17)).rescale_dpi(300, 300);
        assert_eq!((out.width(), out.height()), (33, 17));
    }

    #[test]
    fn scale_never_collapses_to_zero() {
        let out = ImageProcessor::from(sample(3, 3)).scale(0.01);
        assert_eq!((out.width(), out.height()), (1, 1));
    }

    #[test]
    fn jpeg_output_starts_with_soi_marker() {
        let bytes = ImageProcessor::from(sample(16, 16))
            .to_jpeg_bytes(90, Some(200))
            .unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn probe_reads_tiff_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.tif");
        sample(12, 7).save(&path).unwrap();

        let info = ImageInfo::probe(&path).unwrap();
        assert_eq!((info.width, info.height), (12, 7));
        assert_eq!(info.format, "Tiff");
        assert_eq!(info.color, "Rgb8");
    }

    #[test]
    fn open_reports_missing_file() {
        let err = ImageProcessor::open("/nonexistent/scan.tif").err().unwrap();
        assert!(matches!(err, ScriptoriumError::ImageError(_)));
    }
}
