// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-file METS records describing each source scan.

use std::path::Path;

use chrono::Utc;
use scriptorium_core::config::{AggregationConfig, MetadataSettings};
use scriptorium_core::error::Result;
use scriptorium_core::{FormatId, FormatKind, SourceFile};
use scriptorium_document::{ChecksumKind, ImageInfo, hash_file};
use tracing::{debug, instrument};

use super::FormatConverter;
use crate::mets::{self, Provenance};

pub struct MetadataConverter {
    format: FormatId,
    settings: MetadataSettings,
    provenance: Provenance,
}

impl MetadataConverter {
    pub fn new(format: FormatId, settings: MetadataSettings, aggregation: &AggregationConfig) -> Self {
        Self {
            format,
            settings,
            provenance: Provenance::from(aggregation),
        }
    }
}

impl FormatConverter for MetadataConverter {
    fn format(&self) -> &FormatId {
        &self.format
    }

    fn kind(&self) -> FormatKind {
        FormatKind::Metadata
    }

    #[instrument(skip_all, fields(format = %self.format, file = %source.stem))]
    fn convert(&self, source: &SourceFile, destination: &Path) -> Result<()> {
        let md5 = hash_file(ChecksumKind::Md5, &source.path)?;
        let info = if self.settings.include_technical_info {
            Some(ImageInfo::probe(&source.path)?)
        } else {
            None
        };

        let xml = mets::file_record(source, &md5, info.as_ref(), &self.provenance, Utc::now())?;
        std::fs::write(destination, &xml)?;
        debug!(bytes = xml.len(), "METS record written");
        Ok(())
    }
}
