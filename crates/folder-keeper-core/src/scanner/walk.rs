use dashmap::DashMap;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fs::{self, ReadDir};
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

use super::exclude::ExcludeSet;
use crate::error::{io_err, Error, Result};

/// A regular file observed by a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    pub absolute_path: PathBuf,
    pub size_bytes: u64,
}

/// A subtree or entry that could not be read. The scan carried on without it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanWarning {
    pub path: PathBuf,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// Keyed by forward-slash relative route, so iteration is lexicographic.
    pub files: BTreeMap<String, ScannedFile>,
    pub warnings: Vec<ScanWarning>,
}

impl ScanOutcome {
    pub fn total_bytes(&self) -> u64 {
        self.files.values().map(|f| f.size_bytes).sum()
    }
}

/// Parallel, exclusion-aware walk of `root`.
///
/// Excluded directories are not descended into. Symlinks are skipped. A
/// missing or non-directory root fails with `NotFound`; an unreadable root
/// fails with `Io`. Unreadable subdirectories become warnings.
pub fn scan<S: AsRef<str>>(root: &Path, exclude_patterns: &[S]) -> Result<ScanOutcome> {
    match fs::metadata(root) {
        Ok(metadata) if metadata.is_dir() => {}
        Ok(_) => {
            return Err(Error::NotFound(format!(
                "root path is not a directory: {}",
                root.display()
            )))
        }
        Err(_) => {
            return Err(Error::NotFound(format!(
                "root path does not exist: {}",
                root.display()
            )))
        }
    }

    let excludes = ExcludeSet::new(exclude_patterns);
    let entries = fs::read_dir(root).map_err(|e| io_err(root, e))?;

    let files: DashMap<String, ScannedFile> = DashMap::new();
    let warnings: DashMap<PathBuf, String> = DashMap::new();
    visit_entries(root, "", entries, &excludes, &files, &warnings);

    let mut outcome = ScanOutcome {
        files: files.into_iter().collect(),
        warnings: warnings
            .into_iter()
            .map(|(path, message)| ScanWarning { path, message })
            .collect(),
    };
    outcome.warnings.sort_by(|a, b| a.path.cmp(&b.path));

    debug!(
        "Scanned {}: {} files, {} bytes, {} warnings",
        root.display(),
        outcome.files.len(),
        outcome.total_bytes(),
        outcome.warnings.len()
    );
    Ok(outcome)
}

fn visit_dir(
    dir: &Path,
    relative: &str,
    excludes: &ExcludeSet,
    files: &DashMap<String, ScannedFile>,
    warnings: &DashMap<PathBuf, String>,
) {
    match fs::read_dir(dir) {
        Ok(entries) => visit_entries(dir, relative, entries, excludes, files, warnings),
        Err(err) => {
            warn!("Skipping unreadable directory {}: {}", dir.display(), err);
            warnings.insert(dir.to_path_buf(), err.to_string());
        }
    }
}

fn visit_entries(
    dir: &Path,
    relative: &str,
    entries: ReadDir,
    excludes: &ExcludeSet,
    files: &DashMap<String, ScannedFile>,
    warnings: &DashMap<PathBuf, String>,
) {
    entries.par_bridge().for_each(|entry_result| {
        let entry = match entry_result {
            Ok(entry) => entry,
            Err(err) => {
                warn!("Error reading entry in directory {}: {}", dir.display(), err);
                warnings.insert(dir.to_path_buf(), err.to_string());
                return;
            }
        };

        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        let route = if relative.is_empty() {
            name
        } else {
            format!("{}/{}", relative, name)
        };

        if excludes.is_excluded(&route) {
            trace!("Excluded {}", route);
            return;
        }

        let file_type = match entry.file_type() {
            Ok(file_type) => file_type,
            Err(err) => {
                warn!("Error getting file type for {}: {}", path.display(), err);
                warnings.insert(path, err.to_string());
                return;
            }
        };

        if file_type.is_dir() {
            visit_dir(&path, &route, excludes, files, warnings);
        } else if file_type.is_file() {
            match entry.metadata() {
                Ok(metadata) => {
                    files.insert(
                        route,
                        ScannedFile {
                            absolute_path: path,
                            size_bytes: metadata.len(),
                        },
                    );
                }
                Err(err) => {
                    warn!("Error getting metadata for {}: {}", path.display(), err);
                    warnings.insert(path, err.to_string());
                }
            }
        } else {
            trace!("Skipping non-regular entry {}", path.display());
        }
    });
}
