use chrono::Utc;
use rayon::prelude::*;
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use super::locks::FolderLocks;
use super::phase::{PhaseTracker, SyncPhase};
use crate::config::SettingsProvider;
use crate::error::{Error, Result};
use crate::hasher;
use crate::progress::ProgressReporter;
use crate::scanner::{self, ScanWarning, ScannedFile};
use crate::storage::{Catalog, FileItem, Folder, SyncChangeSet};

/// Outcome of one successful sync.
#[derive(Debug, Clone)]
pub struct SyncReport {
    /// The folder as persisted, with its new summary.
    pub folder: Folder,
    pub inserted: usize,
    pub updated: usize,
    pub removed: usize,
    pub unchanged: usize,
    /// Subtrees and files the scan could not read.
    pub warnings: Vec<ScanWarning>,
    pub scan_duration: Duration,
    pub hash_duration: Duration,
    pub persist_duration: Duration,
}

impl SyncReport {
    pub fn mutation_count(&self) -> usize {
        self.inserted + self.updated + self.removed
    }
}

/// Scan + checksum + diff against the inventory, then persist the new
/// inventory and folder summary as one unit.
pub struct SyncEngine<S: Catalog> {
    store: Arc<S>,
    settings: Arc<dyn SettingsProvider>,
    locks: FolderLocks,
    phases: PhaseTracker,
}

impl<S: Catalog> SyncEngine<S> {
    pub fn new(store: Arc<S>, settings: Arc<dyn SettingsProvider>, locks: FolderLocks) -> Self {
        Self {
            store,
            settings,
            locks,
            phases: PhaseTracker::default(),
        }
    }

    pub fn phase(&self, folder_id: Uuid) -> SyncPhase {
        self.phases.get(folder_id)
    }

    /// Sync one folder. A concurrent operation on the same folder is
    /// rejected with `Busy`.
    pub fn sync(&self, folder_id: Uuid, reporter: &dyn ProgressReporter) -> Result<SyncReport> {
        let _guard = self.locks.try_acquire(folder_id, "sync")?;
        self.sync_locked(folder_id, reporter)
    }

    /// Sync a folder whose lock the caller already holds.
    pub(crate) fn sync_locked(
        &self,
        folder_id: Uuid,
        reporter: &dyn ProgressReporter,
    ) -> Result<SyncReport> {
        // Unknown ids never enter the phase table.
        let folder = self
            .store
            .get_folder(folder_id)?
            .ok_or_else(|| Error::NotFound(format!("folder {}", folder_id)))?;

        let result = self.run(folder, reporter);
        match &result {
            Ok(_) => self.phases.set(folder_id, SyncPhase::Idle),
            Err(e) => {
                warn!("Sync of folder {} failed: {}", folder_id, e);
                self.phases.set(folder_id, SyncPhase::Failed);
            }
        }
        result
    }

    fn run(&self, folder: Folder, reporter: &dyn ProgressReporter) -> Result<SyncReport> {
        let folder_id = folder.id;

        // Phase 1: Scan
        self.phases.set(folder_id, SyncPhase::Scanning);
        let patterns = merged_patterns(&self.settings.global_exclude_patterns(), &folder);
        info!("Syncing {} ({})", folder.root_path.display(), folder_id);
        debug!("Exclude patterns: {:?}", patterns);

        reporter.on_scan_start(&folder.root_path.to_string_lossy());
        let scan_start = Instant::now();
        let outcome = scanner::scan(&folder.root_path, &patterns)?;
        let scan_duration = scan_start.elapsed();
        reporter.on_scan_complete(outcome.files.len(), scan_duration.as_secs_f64());
        let mut warnings = outcome.warnings;

        // Phase 2: Hash + diff
        self.phases.set(folder_id, SyncPhase::Reconciling);
        let hash_start = Instant::now();
        let hashed = hash_scanned_files(&outcome.files, reporter, &mut warnings)?;
        let hash_duration = hash_start.elapsed();
        reporter.on_hash_complete(hash_duration.as_secs_f64());

        let existing = self.store.list_by_folder(folder_id)?;
        let reconciled = reconcile(folder_id, &hashed, existing);

        let mut updated_folder = folder.clone();
        updated_folder.last_sync_time = Some(reconciled.synced_at);
        updated_folder.file_count = Some(hashed.len() as u64);
        updated_folder.total_bytes = Some(hashed.iter().map(|h| h.size_bytes).sum());
        updated_folder.aggregate_checksum = Some(hasher::aggregate_checksum(
            hashed
                .iter()
                .map(|h| (h.route.as_str(), h.checksum.as_str())),
        ));

        // Phase 3: Persist
        self.phases.set(folder_id, SyncPhase::Persisting);
        reporter.on_persist_start();
        let persist_start = Instant::now();
        self.store.commit_sync(&updated_folder, &reconciled.changes)?;
        let persist_duration = persist_start.elapsed();
        reporter.on_persist_complete(
            reconciled.changes.mutation_count(),
            persist_duration.as_secs_f64(),
        );

        info!(
            "Synced {}: {} files, {} bytes, +{} ~{} -{} ({} unchanged) in {:.2}s",
            folder.root_path.display(),
            hashed.len(),
            updated_folder.total_bytes.unwrap_or(0),
            reconciled.changes.inserts.len(),
            reconciled.changes.updates.len(),
            reconciled.changes.deletes.len(),
            reconciled.unchanged,
            (scan_duration + hash_duration + persist_duration).as_secs_f64(),
        );

        Ok(SyncReport {
            folder: updated_folder,
            inserted: reconciled.changes.inserts.len(),
            updated: reconciled.changes.updates.len(),
            removed: reconciled.changes.deletes.len(),
            unchanged: reconciled.unchanged,
            warnings,
            scan_duration,
            hash_duration,
            persist_duration,
        })
    }
}

/// Global patterns first, then the folder's own. Each pattern matches
/// independently.
pub fn merged_patterns(global: &[String], folder: &Folder) -> Vec<String> {
    global
        .iter()
        .chain(folder.exclude_patterns.iter())
        .cloned()
        .collect()
}

#[derive(Debug)]
struct HashedFile {
    route: String,
    checksum: String,
    size_bytes: u64,
}

/// Full-content SHA-256 of every scanned file, in parallel, in route order.
///
/// A file that disappeared between scan and hash is dropped with a warning,
/// exactly as if the scan had not seen it. Any other read failure aborts.
fn hash_scanned_files(
    files: &std::collections::BTreeMap<String, ScannedFile>,
    reporter: &dyn ProgressReporter,
    warnings: &mut Vec<ScanWarning>,
) -> Result<Vec<HashedFile>> {
    let total = files.len();
    reporter.on_hash_start(total);
    let hashed_count = AtomicUsize::new(0);

    let entries: Vec<(&String, &ScannedFile)> = files.iter().collect();
    let results: Vec<(String, &ScannedFile, Result<String>)> = entries
        .par_iter()
        .map(|(route, file)| {
            trace!("Hashing {}", file.absolute_path.display());
            let checksum = hasher::file_checksum(&file.absolute_path);
            let done = hashed_count.fetch_add(1, Ordering::Relaxed) + 1;
            reporter.on_hash_progress(done, total);
            ((*route).clone(), *file, checksum)
        })
        .collect();

    let mut hashed = Vec::with_capacity(results.len());
    for (route, file, checksum) in results {
        match checksum {
            Ok(checksum) => hashed.push(HashedFile {
                route,
                checksum,
                size_bytes: file.size_bytes,
            }),
            Err(Error::Io { path, source }) if source.kind() == io::ErrorKind::NotFound => {
                warn!("File vanished before hashing: {}", path.display());
                warnings.push(ScanWarning {
                    path,
                    message: source.to_string(),
                });
            }
            Err(e) => return Err(e),
        }
    }
    Ok(hashed)
}

struct Reconciled {
    changes: SyncChangeSet,
    unchanged: usize,
    synced_at: chrono::DateTime<Utc>,
}

/// Diff the hashed scan against the stored inventory.
///
/// Unchanged items are left alone so their timestamps do not churn.
fn reconcile(folder_id: Uuid, hashed: &[HashedFile], existing: Vec<FileItem>) -> Reconciled {
    let synced_at = Utc::now();
    let mut by_route: HashMap<String, FileItem> = existing
        .into_iter()
        .map(|item| (item.relative_route.clone(), item))
        .collect();

    let mut changes = SyncChangeSet::default();
    let mut unchanged = 0;

    for file in hashed {
        match by_route.remove(&file.route) {
            Some(item)
                if item.content_checksum == file.checksum && item.size_bytes == file.size_bytes =>
            {
                unchanged += 1;
            }
            Some(item) => changes.updates.push(FileItem {
                content_checksum: file.checksum.clone(),
                size_bytes: file.size_bytes,
                last_sync_time: synced_at,
                ..item
            }),
            None => {
                let mut item = FileItem::new(
                    folder_id,
                    file.route.clone(),
                    file.checksum.clone(),
                    file.size_bytes,
                );
                item.last_sync_time = synced_at;
                changes.inserts.push(item);
            }
        }
    }

    // Whatever is left was not observed by this scan.
    let mut stale: Vec<FileItem> = by_route.into_values().collect();
    stale.sort_by(|a, b| a.relative_route.cmp(&b.relative_route));
    changes.deletes = stale.into_iter().map(|item| item.id).collect();

    Reconciled {
        changes,
        unchanged,
        synced_at,
    }
}
