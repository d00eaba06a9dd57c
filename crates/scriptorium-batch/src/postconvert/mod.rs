// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Folder-level steps that run once every task of the folder has finished:
// document consolidation, then aggregate metadata records.
//
// Nothing here returns an error. Each step reports through
// `PostconversionEntry` values and falls back to whatever it already wrote.

pub mod aggregate;
pub mod consolidate;

use std::path::Path;

use scriptorium_core::{FolderBatch, FormatId, RunConfig};
use tracing::debug;

use crate::report::{PostconversionEntry, PostconversionStep};

pub use aggregate::{AggregateEntry, AggregateMetadataRecord};
pub use consolidate::{ConsolidatedDocumentPlan, PlannedDocument};

/// File names the postconversion steps write into a folder's format
/// directories. A per-file artifact under one of these names would be
/// overwritten by, or merged into, the step's output.
#[derive(Debug, Clone, Default)]
pub struct ReservedNames {
    aggregate: bool,
    consolidated: Option<FormatId>,
}

impl ReservedNames {
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            aggregate: config.aggregation.enabled,
            consolidated: config
                .consolidation
                .enabled
                .then(|| config.consolidation.format.clone()),
        }
    }

    /// The step that writes `file_name` into `folder`'s `format` directory.
    /// Compared case-insensitively.
    pub fn owner(
        &self,
        folder: &str,
        format: &FormatId,
        file_name: &str,
    ) -> Option<PostconversionStep> {
        if self.aggregate && file_name.eq_ignore_ascii_case(&aggregate::record_file_name(format)) {
            return Some(PostconversionStep::Aggregation);
        }
        let stem = Path::new(file_name).file_stem()?.to_string_lossy();
        let consolidated = self.consolidated.as_ref() == Some(format)
            && consolidate::is_consolidated_stem(folder, &stem);
        consolidated.then_some(PostconversionStep::Consolidation)
    }
}

/// Run the enabled postconversion steps for a completed batch.
///
/// Runs only when this pass produced something new. The outputs then cover
/// every artifact on disk, including those skipped as already present.
pub fn run_postconversion(batch: &FolderBatch, config: &RunConfig) -> Vec<PostconversionEntry> {
    if batch.succeeded_count() == 0 {
        debug!(folder = %batch.name, "No new artifacts, skipping postconversion");
        return Vec::new();
    }

    let mut entries = Vec::new();
    if config.consolidation.enabled && batch.formats.contains(&config.consolidation.format) {
        entries.extend(consolidate::consolidate(batch, &config.consolidation));
    }
    if config.aggregation.enabled {
        entries.extend(aggregate::aggregate(batch, config));
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_names_follow_enabled_steps() {
        let mut config = RunConfig::default();
        let names = ReservedNames::from_config(&config);
        let (pdf, mets) = (FormatId::new("PDF"), FormatId::new("METS"));

        assert_eq!(
            names.owner("box1", &mets, "METS.xml"),
            Some(PostconversionStep::Aggregation)
        );
        assert_eq!(
            names.owner("box1", &mets, "mets.XML"),
            Some(PostconversionStep::Aggregation)
        );
        assert_eq!(
            names.owner("box1", &pdf, "box1_consolidated.pdf"),
            Some(PostconversionStep::Consolidation)
        );
        assert_eq!(
            names.owner("box1", &pdf, "BOX1_07.pdf"),
            Some(PostconversionStep::Consolidation)
        );
        assert_eq!(names.owner("box1", &pdf, "box1_7.pdf"), None);
        assert_eq!(names.owner("box1", &pdf, "page_01.pdf"), None);
        // Consolidated names only matter for the consolidated format.
        assert_eq!(names.owner("box1", &mets, "box1_01.xml"), None);

        config.aggregation.enabled = false;
        config.consolidation.enabled = false;
        let names = ReservedNames::from_config(&config);
        assert_eq!(names.owner("box1", &mets, "METS.xml"), None);
        assert_eq!(names.owner("box1", &pdf, "box1_consolidated.pdf"), None);
    }
}
