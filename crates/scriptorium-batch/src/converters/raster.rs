// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Resized JPEG copies of each scan.

use std::path::Path;

use scriptorium_core::config::RasterSettings;
use scriptorium_core::error::Result;
use scriptorium_core::{FormatId, FormatKind, SourceFile};
use scriptorium_document::ImageProcessor;
use tracing::{debug, instrument};

use super::FormatConverter;

/// Rescales a scan from its capture resolution to the target resolution and
/// writes it as JPEG.
pub struct RasterConverter {
    format: FormatId,
    settings: RasterSettings,
}

impl RasterConverter {
    pub fn new(format: FormatId, settings: RasterSettings) -> Self {
        Self { format, settings }
    }
}

impl FormatConverter for RasterConverter {
    fn format(&self) -> &FormatId {
        &self.format
    }

    fn kind(&self) -> FormatKind {
        FormatKind::Raster
    }

    #[instrument(skip_all, fields(format = %self.format, file = %source.stem))]
    fn convert(&self, source: &SourceFile, destination: &Path) -> Result<()> {
        let processor = ImageProcessor::open(&source.path)?
            .rescale_dpi(self.settings.source_dpi, self.settings.dpi);
        let bytes = processor.save_jpeg(destination, self.settings.quality, Some(self.settings.dpi))?;
        debug!(
            width = processor.width(),
            height = processor.height(),
            bytes,
            "JPEG written"
        );
        Ok(())
    }
}
