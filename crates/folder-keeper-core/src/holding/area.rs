use chrono::Utc;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::snapshot::{HoldingKind, RetiredFolderSnapshot, SIDECAR_FILE_NAME};
use crate::error::{io_err, Error, Result};
use crate::storage::{Catalog, Folder};

/// A holding root for retired folders.
///
/// Layout: `<root>/<folder_id>/<original_basename>/...` plus
/// `<root>/<folder_id>/folder.json`.
#[derive(Debug, Clone)]
pub struct HoldingArea {
    root: PathBuf,
    kind: HoldingKind,
}

impl HoldingArea {
    pub fn new(root: impl Into<PathBuf>, kind: HoldingKind) -> Self {
        Self {
            root: root.into(),
            kind,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn kind(&self) -> HoldingKind {
        self.kind
    }

    pub fn entry_dir(&self, folder_id: Uuid) -> PathBuf {
        self.root.join(folder_id.to_string())
    }

    pub fn sidecar_path(&self, folder_id: Uuid) -> PathBuf {
        self.entry_dir(folder_id).join(SIDECAR_FILE_NAME)
    }

    /// Move a registered folder's directory into this area and drop it from
    /// the registry and inventory.
    ///
    /// The directory moves first with a single rename; registry rows are only
    /// removed once the move and the side-car write have succeeded. If a later
    /// step fails the move is undone.
    pub fn retire<S: Catalog + ?Sized>(
        &self,
        store: &S,
        folder_id: Uuid,
    ) -> Result<RetiredFolderSnapshot> {
        let folder = store
            .get_folder(folder_id)?
            .ok_or_else(|| Error::NotFound(format!("folder {}", folder_id)))?;

        if !folder.root_path.is_dir() {
            return Err(Error::NotFound(format!(
                "root path does not exist: {}",
                folder.root_path.display()
            )));
        }

        let entry_dir = self.entry_dir(folder_id);
        let created_entry_dir = !entry_dir.exists();
        fs::create_dir_all(&entry_dir).map_err(|e| io_err(&entry_dir, e))?;

        let destination = entry_dir.join(folder.display_name());
        if destination.symlink_metadata().is_ok() {
            return Err(Error::Conflict(format!(
                "{} already holds {}",
                self.kind,
                destination.display()
            )));
        }

        if let Err(e) = fs::rename(&folder.root_path, &destination) {
            if created_entry_dir {
                let _ = fs::remove_dir(&entry_dir);
            }
            return Err(io_err(&folder.root_path, e));
        }
        debug!(
            "Moved {} -> {}",
            folder.root_path.display(),
            destination.display()
        );

        let snapshot = RetiredFolderSnapshot::capture(&folder, self.kind, Utc::now());
        let finish = self
            .write_sidecar(&snapshot)
            .and_then(|_| store.commit_retire(folder_id));
        if let Err(e) = finish {
            error!("Retiring folder {} failed, moving it back: {}", folder_id, e);
            self.undo_retire(&folder, &destination, created_entry_dir);
            return Err(e);
        }

        info!(
            "Moved folder {} ({}) to {}",
            folder_id,
            folder.root_path.display(),
            self.kind
        );
        Ok(snapshot)
    }

    /// Move a retired folder back to its original path and re-register it
    /// under its original id, with an empty inventory. A folder retired as the
    /// merge target gets the flag back unless another folder holds it.
    pub fn restore<S: Catalog + ?Sized>(&self, store: &S, folder_id: Uuid) -> Result<Folder> {
        let snapshot = self.read_sidecar(folder_id)?;
        let original = snapshot.absolute_route.clone();

        if original.symlink_metadata().is_ok() {
            return Err(Error::Conflict(format!(
                "restore destination already exists: {}",
                original.display()
            )));
        }
        if store.get_folder(snapshot.id)?.is_some() || store.find_by_root(&original)?.is_some() {
            return Err(Error::Conflict(format!(
                "folder {} or root path {} is already registered",
                snapshot.id,
                original.display()
            )));
        }

        let entry_dir = self.entry_dir(folder_id);
        let held = entry_dir.join(snapshot.held_dir_name());
        if !held.is_dir() {
            return Err(Error::NotFound(format!(
                "held directory missing: {}",
                held.display()
            )));
        }

        if let Some(parent) = original.parent() {
            fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
        fs::rename(&held, &original).map_err(|e| io_err(&held, e))?;
        debug!("Moved {} -> {}", held.display(), original.display());

        if let Err(e) = fs::remove_dir_all(&entry_dir) {
            warn!(
                "Could not remove holding entry {}: {}",
                entry_dir.display(),
                e
            );
        }

        let mut folder = snapshot.to_restored_folder();
        if let Err(e) = store.insert_folder(&folder) {
            error!("Re-registering folder {} failed, moving it back: {}", folder_id, e);
            self.undo_restore(&snapshot, &original, &held);
            return Err(e);
        }
        if snapshot.merging {
            folder.is_merge_target = reinstate_merge_target(store, folder_id);
        }

        info!(
            "Restored folder {} from {} to {}",
            folder_id,
            self.kind,
            original.display()
        );
        Ok(folder)
    }

    /// Permanently remove a retired folder and its side-car.
    pub fn hard_delete(&self, folder_id: Uuid) -> Result<()> {
        let entry_dir = self.entry_dir(folder_id);
        match fs::remove_dir_all(&entry_dir) {
            Ok(()) => {
                info!("Permanently deleted {} entry {}", self.kind, folder_id);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(Error::NotFound(format!(
                "{} entry {}",
                self.kind, folder_id
            ))),
            Err(e) => Err(io_err(&entry_dir, e)),
        }
    }

    /// Every readable side-car in this area, newest retirement first.
    /// Entries with a missing or corrupt side-car are skipped.
    pub fn list(&self) -> Result<Vec<RetiredFolderSnapshot>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err(&self.root, e)),
        };

        let mut snapshots = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(
                        "Skipping unreadable {} entry in {}: {}",
                        self.kind,
                        self.root.display(),
                        e
                    );
                    continue;
                }
            };
            if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                continue;
            }
            let sidecar = entry.path().join(SIDECAR_FILE_NAME);
            match load_sidecar(&sidecar) {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(e) => warn!("Skipping {} entry {}: {}", self.kind, entry.path().display(), e),
            }
        }

        snapshots.sort_by(|a, b| b.retired_at().cmp(&a.retired_at()));
        Ok(snapshots)
    }

    pub fn read_sidecar(&self, folder_id: Uuid) -> Result<RetiredFolderSnapshot> {
        let path = self.sidecar_path(folder_id);
        load_sidecar(&path).map_err(|e| {
            Error::NotFound(format!("{} entry {}: {}", self.kind, folder_id, e))
        })
    }

    /// Written to a temp file and renamed into place.
    fn write_sidecar(&self, snapshot: &RetiredFolderSnapshot) -> Result<()> {
        let path = self.sidecar_path(snapshot.id);
        let json = serde_json::to_string_pretty(snapshot)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| io_err(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
        Ok(())
    }

    fn undo_retire(&self, folder: &Folder, destination: &Path, created_entry_dir: bool) {
        if let Err(e) = fs::rename(destination, &folder.root_path) {
            error!(
                "Could not move {} back to {}: {}",
                destination.display(),
                folder.root_path.display(),
                e
            );
            return;
        }
        let entry_dir = self.entry_dir(folder.id);
        let _ = fs::remove_file(entry_dir.join(SIDECAR_FILE_NAME));
        if created_entry_dir {
            let _ = fs::remove_dir(&entry_dir);
        }
    }

    fn undo_restore(&self, snapshot: &RetiredFolderSnapshot, original: &Path, held: &Path) {
        let entry_dir = self.entry_dir(snapshot.id);
        let moved_back = fs::create_dir_all(&entry_dir)
            .and_then(|_| fs::rename(original, held));
        if let Err(e) = moved_back {
            error!(
                "Could not move {} back to {}: {}",
                original.display(),
                held.display(),
                e
            );
            return;
        }
        if let Err(e) = self.write_sidecar(snapshot) {
            error!("Could not rewrite side-car for {}: {}", snapshot.id, e);
        }
    }
}

/// The flag only comes back if no other folder took it in the meantime.
fn reinstate_merge_target<S: Catalog + ?Sized>(store: &S, folder_id: Uuid) -> bool {
    let taken = match store.list_folders() {
        Ok(folders) => folders.iter().any(|f| f.is_merge_target),
        Err(e) => {
            warn!("Could not check merge target for {}: {}", folder_id, e);
            return false;
        }
    };
    if taken {
        debug!("Merge target already held, restored {} without it", folder_id);
        return false;
    }
    match store.set_merge_target(folder_id, true) {
        Ok(()) => true,
        Err(e) => {
            warn!("Could not reinstate merge target for {}: {}", folder_id, e);
            false
        }
    }
}

fn load_sidecar(path: &Path) -> Result<RetiredFolderSnapshot> {
    let contents = fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    Ok(serde_json::from_str(&contents)?)
}
