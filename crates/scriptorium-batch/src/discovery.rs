// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Discovery — find eligible folders under an input root and list the source
// images inside each.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use scriptorium_core::SourceFile;
use scriptorium_core::config::DiscoveryConfig;
use scriptorium_core::error::{Result, ScriptoriumError};
use tracing::{debug, info, instrument, warn};

/// Walk `root` and return every eligible folder keyed by its name.
///
/// A folder is eligible when it contains a subdirectory whose name matches
/// `source_folder_name` case-insensitively. The key is the eligible folder's
/// own name and the value is the path of the matching subdirectory. Matching
/// subdirectories are found at any depth; the first one (in sorted path order)
/// wins when two share a parent name.
///
/// # Errors
///
/// A root that does not exist or is not a directory is a
/// [`ScriptoriumError::Config`] error.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn find_eligible_folders(
    root: &Path,
    config: &DiscoveryConfig,
) -> Result<BTreeMap<String, PathBuf>> {
    if !root.exists() {
        return Err(ScriptoriumError::Config(format!(
            "input directory {} does not exist",
            root.display()
        )));
    }
    if !root.is_dir() {
        return Err(ScriptoriumError::Config(format!(
            "input path {} is not a directory",
            root.display()
        )));
    }

    let wanted = config.source_folder_name.to_lowercase();
    let mut matches = Vec::new();
    collect_matching_dirs(root, &wanted, &mut matches)?;
    matches.sort();

    let mut folders = BTreeMap::new();
    for source_dir in matches {
        let Some(name) = source_dir
            .parent()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned())
        else {
            continue;
        };
        if folders.contains_key(&name) {
            warn!(folder = %name, path = %source_dir.display(), "Duplicate folder name, skipping");
            continue;
        }
        folders.insert(name, source_dir);
    }

    info!(folders = folders.len(), "Eligible folders found");
    Ok(folders)
}

fn collect_matching_dirs(dir: &Path, wanted: &str, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let path = entry.path();
        if entry.file_name().to_string_lossy().to_lowercase() == wanted {
            out.push(path.clone());
        }
        collect_matching_dirs(&path, wanted, out)?;
    }
    Ok(())
}

/// List the source images directly inside `folder` (non-recursive).
///
/// Extensions are matched case-insensitively against `config.extensions`.
/// The result is sorted by lower-cased file name.
#[instrument(skip_all, fields(folder = %folder.display()))]
pub fn list_source_files(folder: &Path, config: &DiscoveryConfig) -> Result<Vec<SourceFile>> {
    let extensions: Vec<String> = config
        .extensions
        .iter()
        .map(|e| e.trim_start_matches('.').to_lowercase())
        .collect();

    let mut files = Vec::new();
    for entry in std::fs::read_dir(folder)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        let matches = path
            .extension()
            .map(|ext| extensions.contains(&ext.to_string_lossy().to_lowercase()))
            .unwrap_or(false);
        if matches {
            files.push(SourceFile::from_path(&path)?);
        }
    }

    files.sort_by_cached_key(|f| f.file_name().to_lowercase());
    debug!(files = files.len(), "Source files listed");
    Ok(files)
}
