// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Format converters — one per target format, selected through a lookup table
// keyed by format identifier.

pub mod metadata;
pub mod raster;
pub mod searchable;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use scriptorium_core::config::{FormatSettings, SearchableSettings};
use scriptorium_core::error::{Result, ScriptoriumError};
use scriptorium_core::{FormatId, FormatKind, RunConfig, SourceFile};
use scriptorium_document::TextRecognizer;
use tracing::info;

pub use metadata::MetadataConverter;
pub use raster::RasterConverter;
pub use searchable::SearchableConverter;

/// A per-file transform from one source image to one artifact.
///
/// Implementations keep no per-call state. Expensive setup (such as loading a
/// recognition engine) happens once at construction and is shared by every
/// call, possibly from several worker threads at once.
pub trait FormatConverter: Send + Sync {
    fn format(&self) -> &FormatId;

    fn kind(&self) -> FormatKind;

    /// Extension of produced artifacts, without the dot.
    fn target_extension(&self) -> &str {
        self.kind().extension()
    }

    /// Write the artifact for `source` to `destination`.
    fn convert(&self, source: &SourceFile, destination: &Path) -> Result<()>;
}

/// Builds the recognition engine for a searchable format, if one is wanted.
pub type RecognizerFactory<'a> =
    dyn Fn(&FormatId, &SearchableSettings) -> Option<Box<dyn TextRecognizer>> + 'a;

/// Format identifier to converter lookup table.
#[derive(Default, Clone)]
pub struct ConverterRegistry {
    converters: HashMap<FormatId, Arc<dyn FormatConverter>>,
}

impl ConverterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// One converter per enabled format, with the default recognition engine
    /// for searchable formats.
    pub fn from_config(config: &RunConfig) -> Result<Self> {
        Self::from_config_with(config, &searchable::default_recognizer)
    }

    /// Like [`from_config`](Self::from_config) with a caller-supplied
    /// recognition engine factory.
    pub fn from_config_with(
        config: &RunConfig,
        recognizers: &RecognizerFactory<'_>,
    ) -> Result<Self> {
        let mut registry = Self::new();
        for (id, format) in config.enabled_formats() {
            let converter: Arc<dyn FormatConverter> = match &format.settings {
                FormatSettings::Raster(settings) => {
                    Arc::new(RasterConverter::new(id.clone(), settings.clone()))
                }
                FormatSettings::Searchable(settings) => {
                    let recognizer = if settings.ocr {
                        recognizers(&id, settings)
                    } else {
                        None
                    };
                    Arc::new(SearchableConverter::new(
                        id.clone(),
                        settings.clone(),
                        recognizer,
                    ))
                }
                FormatSettings::Metadata(settings) => Arc::new(MetadataConverter::new(
                    id.clone(),
                    settings.clone(),
                    &config.aggregation,
                )),
            };
            registry.register(converter);
        }
        info!(converters = registry.len(), "Converter registry built");
        Ok(registry)
    }

    /// Add or replace the converter for its format.
    pub fn register(&mut self, converter: Arc<dyn FormatConverter>) {
        self.converters.insert(converter.format().clone(), converter);
    }

    pub fn get(&self, format: &FormatId) -> Option<Arc<dyn FormatConverter>> {
        self.converters.get(format).cloned()
    }

    pub fn require(&self, format: &FormatId) -> Result<Arc<dyn FormatConverter>> {
        self.get(format)
            .ok_or_else(|| ScriptoriumError::UnknownFormat(format.to_string()))
    }

    pub fn len(&self) -> usize {
        self.converters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.converters.is_empty()
    }
}
