// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Run configuration, loaded from JSON and merged onto built-in defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, ScriptoriumError};
use crate::types::{FormatId, FormatKind};

/// Settings for one whole batch run.
///
/// Every section falls back to its default when omitted, so a config file
/// only needs to mention what it changes. The `formats` table is replaced as
/// a whole when present.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub processing: ProcessingConfig,
    pub discovery: DiscoveryConfig,
    pub formats: BTreeMap<FormatId, FormatConfig>,
    pub consolidation: ConsolidationConfig,
    pub aggregation: AggregationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Upper bound on concurrently running conversion tasks.
    pub max_workers: usize,
    pub overwrite_existing: bool,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            overwrite_existing: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Name of the subfolder that marks its parent as eligible (case-insensitive).
    pub source_folder_name: String,
    /// Recognised source extensions, without dots (case-insensitive).
    pub extensions: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            source_folder_name: "TIFF".to_string(),
            extensions: vec!["tif".to_string(), "tiff".to_string()],
        }
    }
}

/// One entry of the `formats` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormatConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(flatten)]
    pub settings: FormatSettings,
}

impl FormatConfig {
    pub fn kind(&self) -> FormatKind {
        self.settings.kind()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FormatSettings {
    Raster(RasterSettings),
    Searchable(SearchableSettings),
    Metadata(MetadataSettings),
}

impl FormatSettings {
    pub fn kind(&self) -> FormatKind {
        match self {
            Self::Raster(_) => FormatKind::Raster,
            Self::Searchable(_) => FormatKind::Searchable,
            Self::Metadata(_) => FormatKind::Metadata,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RasterSettings {
    /// Output resolution.
    pub dpi: u32,
    /// JPEG quality, 1-100.
    pub quality: u8,
    /// Resolution the scans were captured at; the resize factor is `dpi / source_dpi`.
    pub source_dpi: u32,
}

impl Default for RasterSettings {
    fn default() -> Self {
        Self {
            dpi: 200,
            quality: 90,
            source_dpi: 400,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchableSettings {
    /// Resolution used to size the page: `points = pixels * 72 / dpi`.
    pub dpi: u32,
    /// Whether to run text recognition and add the invisible text layer.
    pub ocr: bool,
    /// Spans with a lower confidence are dropped.
    pub confidence_threshold: f32,
    pub font_size: f32,
    /// Directory holding the recognition models; engine default when unset.
    pub model_dir: Option<PathBuf>,
}

impl Default for SearchableSettings {
    fn default() -> Self {
        Self {
            dpi: 300,
            ocr: true,
            confidence_threshold: 0.5,
            font_size: 8.0,
            model_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataSettings {
    /// Emit the `techMD` section with the source image's pixel attributes.
    pub include_technical_info: bool,
}

impl Default for MetadataSettings {
    fn default() -> Self {
        Self {
            include_technical_info: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsolidationConfig {
    pub enabled: bool,
    /// Format whose per-file documents are merged.
    pub format: FormatId,
    pub max_size_mb: u32,
    /// Empirical size of one rendered page, used to decide the chunk size.
    pub estimated_mb_per_file: f64,
    /// Run the recompression pass on each merged document.
    pub compress: bool,
    /// Resolution embedded scans are downsampled to by the compression pass.
    pub target_dpi: u32,
    /// JPEG quality (1-100) of re-encoded scans.
    pub image_quality: u8,
    /// Strip the document information dictionary and XMP metadata.
    pub remove_metadata: bool,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            format: FormatId::new("PDF"),
            max_size_mb: 10,
            estimated_mb_per_file: 3.0,
            compress: true,
            target_dpi: 200,
            image_quality: 85,
            remove_metadata: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    pub enabled: bool,
    pub organization: String,
    pub creator: String,
    pub include_file_info: bool,
    pub include_image_info: bool,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            organization: "Conversor TIFF".to_string(),
            creator: "Sistema Automatizado".to_string(),
            include_file_info: true,
            include_image_info: true,
        }
    }
}

fn default_true() -> bool {
    true
}

impl Default for RunConfig {
    fn default() -> Self {
        let mut formats = BTreeMap::new();
        formats.insert(
            FormatId::new("JPGHIGH"),
            FormatConfig {
                enabled: true,
                settings: FormatSettings::Raster(RasterSettings {
                    dpi: 400,
                    quality: 95,
                    source_dpi: 400,
                }),
            },
        );
        formats.insert(
            FormatId::new("JPGLOW"),
            FormatConfig {
                enabled: true,
                settings: FormatSettings::Raster(RasterSettings::default()),
            },
        );
        formats.insert(
            FormatId::new("PDF"),
            FormatConfig {
                enabled: true,
                settings: FormatSettings::Searchable(SearchableSettings::default()),
            },
        );
        formats.insert(
            FormatId::new("METS"),
            FormatConfig {
                enabled: true,
                settings: FormatSettings::Metadata(MetadataSettings::default()),
            },
        );

        Self {
            processing: ProcessingConfig::default(),
            discovery: DiscoveryConfig::default(),
            formats,
            consolidation: ConsolidationConfig::default(),
            aggregation: AggregationConfig::default(),
        }
    }
}

impl RunConfig {
    /// Read a JSON config file. The result is not yet validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|err| {
            ScriptoriumError::Config(format!("cannot read {}: {}", path.display(), err))
        })?;
        let config = Self::from_json_str(&text)?;
        debug!(path = %path.display(), formats = config.formats.len(), "Config loaded");
        Ok(config)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn format(&self, id: &FormatId) -> Option<&FormatConfig> {
        self.formats.get(id)
    }

    /// Enabled formats in stable (alphabetical) order.
    pub fn enabled_formats(&self) -> Vec<(FormatId, FormatConfig)> {
        self.formats
            .iter()
            .filter(|(_, cfg)| cfg.enabled)
            .map(|(id, cfg)| (id.clone(), cfg.clone()))
            .collect()
    }

    /// Enable exactly the named formats and disable the rest.
    ///
    /// Unknown names are ignored with a warning; if none of the names is
    /// known the call fails.
    pub fn restrict_formats<S: AsRef<str>>(&mut self, names: &[S]) -> Result<()> {
        let mut wanted: Vec<FormatId> = Vec::new();
        for name in names {
            let id = FormatId::new(name);
            if id.as_str().is_empty() {
                continue;
            }
            if self.formats.contains_key(&id) {
                wanted.push(id);
            } else {
                warn!(format = %id, "Ignoring unknown format");
            }
        }

        if wanted.is_empty() {
            return Err(ScriptoriumError::Config(
                "none of the requested formats is configured".to_string(),
            ));
        }

        for (id, cfg) in self.formats.iter_mut() {
            cfg.enabled = wanted.contains(id);
        }
        Ok(())
    }

    /// Check the settings that would otherwise fail deep inside a run.
    pub fn validate(&self) -> Result<()> {
        if self.processing.max_workers == 0 {
            return Err(ScriptoriumError::Config(
                "processing.max_workers must be at least 1".to_string(),
            ));
        }
        if self.discovery.source_folder_name.trim().is_empty() {
            return Err(ScriptoriumError::Config(
                "discovery.source_folder_name must not be empty".to_string(),
            ));
        }
        if self.discovery.extensions.is_empty() {
            return Err(ScriptoriumError::Config(
                "discovery.extensions must list at least one extension".to_string(),
            ));
        }

        for (id, cfg) in &self.formats {
            match &cfg.settings {
                FormatSettings::Raster(raster) => {
                    if raster.dpi == 0 || raster.source_dpi == 0 {
                        return Err(ScriptoriumError::Config(format!(
                            "{id}: dpi and source_dpi must be positive"
                        )));
                    }
                    if !(1..=100).contains(&raster.quality) {
                        return Err(ScriptoriumError::Config(format!(
                            "{id}: quality must be within 1..=100, got {}",
                            raster.quality
                        )));
                    }
                }
                FormatSettings::Searchable(searchable) => {
                    if searchable.dpi == 0 {
                        return Err(ScriptoriumError::Config(format!(
                            "{id}: dpi must be positive"
                        )));
                    }
                    if !(0.0..=1.0).contains(&searchable.confidence_threshold) {
                        return Err(ScriptoriumError::Config(format!(
                            "{id}: confidence_threshold must be within [0, 1], got {}",
                            searchable.confidence_threshold
                        )));
                    }
                    if searchable.font_size <= 0.0 {
                        return Err(ScriptoriumError::Config(format!(
                            "{id}: font_size must be positive"
                        )));
                    }
                }
                FormatSettings::Metadata(_) => {}
            }
        }

        let consolidation = &self.consolidation;
        if consolidation.enabled {
            if consolidation.max_size_mb == 0 {
                return Err(ScriptoriumError::Config(
                    "consolidation.max_size_mb must be at least 1".to_string(),
                ));
            }
            if consolidation.estimated_mb_per_file <= 0.0 {
                return Err(ScriptoriumError::Config(
                    "consolidation.estimated_mb_per_file must be positive".to_string(),
                ));
            }
            if consolidation.compress {
                if consolidation.target_dpi == 0 {
                    return Err(ScriptoriumError::Config(
                        "consolidation.target_dpi must be positive".to_string(),
                    ));
                }
                if !(1..=100).contains(&consolidation.image_quality) {
                    return Err(ScriptoriumError::Config(format!(
                        "consolidation.image_quality must be within 1..=100, got {}",
                        consolidation.image_quality
                    )));
                }
            }
            match self.formats.get(&consolidation.format) {
                Some(cfg) if cfg.kind() == FormatKind::Searchable => {}
                Some(_) => {
                    return Err(ScriptoriumError::Config(format!(
                        "consolidation.format {} is not a searchable document format",
                        consolidation.format
                    )));
                }
                None => {
                    return Err(ScriptoriumError::Config(format!(
                        "consolidation.format {} is not configured",
                        consolidation.format
                    )));
                }
            }
        }

        Ok(())
    }
}
