use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::locks::FolderLocks;
use super::phase::SyncPhase;
use super::sync::{SyncEngine, SyncReport};
use crate::analysis::{self, ComparedFolder, Comparison};
use crate::config::{validate_patterns, SettingsProvider};
use crate::error::{io_err, Error, Result};
use crate::holding::{HoldingArea, HoldingKind, RetiredFolderSnapshot};
use crate::progress::ProgressReporter;
use crate::storage::{Catalog, FileItem, Folder};

/// Entry point for every folder operation.
///
/// Sync, retire, restore, hard delete and copy share one per-folder lock
/// table, so they never interleave on the same folder id. Different folders
/// proceed independently.
pub struct Keeper<S: Catalog> {
    store: Arc<S>,
    settings: Arc<dyn SettingsProvider>,
    locks: FolderLocks,
    sync: SyncEngine<S>,
}

impl<S: Catalog> Keeper<S> {
    pub fn new(store: Arc<S>, settings: Arc<dyn SettingsProvider>) -> Self {
        let locks = FolderLocks::new();
        let sync = SyncEngine::new(Arc::clone(&store), Arc::clone(&settings), locks.clone());
        Self {
            store,
            settings,
            locks,
            sync,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn holding_area(&self, kind: HoldingKind) -> HoldingArea {
        match kind {
            HoldingKind::Archive => HoldingArea::new(self.settings.archive_holding_root(), kind),
            HoldingKind::Trash => HoldingArea::new(self.settings.trash_holding_root(), kind),
        }
    }

    // ── Registry ─────────────────────────────────────────────

    /// Register a directory. The path must be absolute and not yet tracked.
    pub fn add_folder(&self, root_path: impl AsRef<Path>) -> Result<Folder> {
        let root_path = normalize_root(root_path.as_ref())?;
        if self.store.find_by_root(&root_path)?.is_some() {
            return Err(Error::Conflict(format!(
                "folder already registered: {}",
                root_path.display()
            )));
        }
        let folder = Folder::new(root_path);
        self.store.insert_folder(&folder)?;
        info!("Added folder {} ({})", folder.root_path.display(), folder.id);
        Ok(folder)
    }

    pub fn get_folder(&self, id: Uuid) -> Result<Folder> {
        self.store
            .get_folder(id)?
            .ok_or_else(|| Error::NotFound(format!("folder {}", id)))
    }

    pub fn list_folders(&self) -> Result<Vec<Folder>> {
        self.store.list_folders()
    }

    pub fn list_files(&self, id: Uuid) -> Result<Vec<FileItem>> {
        self.get_folder(id)?;
        self.store.list_by_folder(id)
    }

    /// Replace a folder's own exclusion patterns. Applies from the next sync.
    pub fn set_exclude_patterns(&self, id: Uuid, patterns: Vec<String>) -> Result<Folder> {
        validate_patterns(&patterns)?;
        self.store.set_exclude_patterns(id, &patterns)?;
        debug!("Folder {} exclude patterns: {:?}", id, patterns);
        self.get_folder(id)
    }

    /// Mark (or unmark) the primary folder of a merge session. At most one
    /// folder carries the flag.
    pub fn set_merge_target(&self, id: Uuid, flag: bool) -> Result<()> {
        self.store.set_merge_target(id, flag)
    }

    // ── Sync ─────────────────────────────────────────────────

    pub fn sync(&self, id: Uuid, reporter: &dyn ProgressReporter) -> Result<SyncReport> {
        self.sync.sync(id, reporter)
    }

    /// Sync every registered folder in turn. A failure is recorded for its
    /// folder and the rest still run.
    pub fn sync_all(
        &self,
        reporter: &dyn ProgressReporter,
    ) -> Result<Vec<(Uuid, Result<SyncReport>)>> {
        let folders = self.store.list_folders()?;
        Ok(folders
            .into_iter()
            .map(|folder| (folder.id, self.sync.sync(folder.id, reporter)))
            .collect())
    }

    pub fn phase(&self, id: Uuid) -> SyncPhase {
        self.sync.phase(id)
    }

    // ── Retire / restore ─────────────────────────────────────

    pub fn archive(&self, id: Uuid) -> Result<RetiredFolderSnapshot> {
        self.retire(id, HoldingKind::Archive)
    }

    pub fn trash(&self, id: Uuid) -> Result<RetiredFolderSnapshot> {
        self.retire(id, HoldingKind::Trash)
    }

    pub fn retire(&self, id: Uuid, kind: HoldingKind) -> Result<RetiredFolderSnapshot> {
        let _guard = self.locks.try_acquire(id, "retire")?;
        self.holding_area(kind).retire(self.store.as_ref(), id)
    }

    pub fn restore(&self, id: Uuid, kind: HoldingKind) -> Result<Folder> {
        let _guard = self.locks.try_acquire(id, "restore")?;
        self.holding_area(kind).restore(self.store.as_ref(), id)
    }

    /// Irreversibly remove a retired folder from a holding area.
    pub fn hard_delete(&self, id: Uuid, kind: HoldingKind) -> Result<()> {
        let _guard = self.locks.try_acquire(id, "hard delete")?;
        self.holding_area(kind).hard_delete(id)
    }

    pub fn list_retired(&self, kind: HoldingKind) -> Result<Vec<RetiredFolderSnapshot>> {
        self.holding_area(kind).list()
    }

    // ── Compare / merge ──────────────────────────────────────

    /// Compare the committed inventories of two or more folders. The merge
    /// target, if it is among them, is the primary column.
    pub fn compare(&self, ids: &[Uuid]) -> Result<Comparison> {
        let mut unique = ids.to_vec();
        unique.sort();
        unique.dedup();
        if unique.len() != ids.len() || ids.len() < 2 {
            return Err(Error::Validation(
                "compare needs at least two distinct folders".to_string(),
            ));
        }

        let mut columns = Vec::with_capacity(ids.len());
        let mut primary = None;
        for id in ids {
            let folder = self.get_folder(*id)?;
            if folder.is_merge_target {
                primary = Some(folder.id);
            }
            let items = self.store.list_by_folder(*id)?;
            columns.push(ComparedFolder::from_items(*id, &items));
        }
        Ok(analysis::compare(&columns, primary))
    }

    /// Copy every inventoried file of `source` into `target` at the same
    /// relative route, overwriting, then sync `target`.
    pub fn copy_files(
        &self,
        source: Uuid,
        target: Uuid,
        reporter: &dyn ProgressReporter,
    ) -> Result<SyncReport> {
        if source == target {
            return Err(Error::Validation(
                "source and target folder are the same".to_string(),
            ));
        }
        let _guards = self.locks.try_acquire_all(&[source, target], "copy")?;

        let source_folder = self.get_folder(source)?;
        let target_folder = self.get_folder(target)?;
        let items = self.store.list_by_folder(source)?;

        for item in &items {
            let from = source_folder.root_path.join(&item.relative_route);
            let to = target_folder.root_path.join(&item.relative_route);
            if let Some(parent) = to.parent() {
                fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
            }
            fs::copy(&from, &to).map_err(|e| {
                error!("Copy {} -> {} failed: {}", from.display(), to.display(), e);
                io_err(&from, e)
            })?;
        }
        info!(
            "Copied {} files from {} to {}",
            items.len(),
            source_folder.root_path.display(),
            target_folder.root_path.display()
        );

        self.sync.sync_locked(target, reporter)
    }
}

fn normalize_root(path: &Path) -> Result<PathBuf> {
    if path.as_os_str().is_empty() {
        return Err(Error::Validation("folder path is required".to_string()));
    }
    if !path.is_absolute() {
        return Err(Error::Validation(format!(
            "folder path must be absolute: {}",
            path.display()
        )));
    }
    // Trailing separators and interior `.` components are dropped.
    Ok(path.components().collect())
}
