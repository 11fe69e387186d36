//! Repository traits the engine is written against.
//!
//! Implementations: [`Database`](super::Database) (SQLite) and
//! [`MemoryStore`](super::MemoryStore) (tests).

use std::path::Path;
use uuid::Uuid;

use super::models::{FileItem, Folder, SyncChangeSet};
use crate::error::Result;

/// The folder registry. Owns `Folder` rows.
pub trait FolderRegistry: Send + Sync {
    fn get_folder(&self, id: Uuid) -> Result<Option<Folder>>;

    /// All folders ordered by root path.
    fn list_folders(&self) -> Result<Vec<Folder>>;

    fn find_by_root(&self, root_path: &Path) -> Result<Option<Folder>>;

    /// `Conflict` if the id or the root path is already registered.
    fn insert_folder(&self, folder: &Folder) -> Result<()>;

    /// `NotFound` if no folder has this id.
    fn update_folder(&self, folder: &Folder) -> Result<()>;

    /// `NotFound` if no folder has this id.
    fn delete_folder(&self, id: Uuid) -> Result<()>;
}

/// The inventory store. Owns `FileItem` rows, keyed by folder id.
pub trait InventoryStore: Send + Sync {
    fn list_by_folder(&self, folder_id: Uuid) -> Result<Vec<FileItem>>;

    /// `Conflict` if the folder already has an item at this route.
    fn insert_item(&self, item: &FileItem) -> Result<()>;

    /// `NotFound` if no item has this id.
    fn update_item(&self, item: &FileItem) -> Result<()>;

    /// `NotFound` if no item has this id.
    fn delete_item(&self, id: Uuid) -> Result<()>;

    /// Returns the number of items removed.
    fn delete_items_for_folder(&self, folder_id: Uuid) -> Result<usize>;
}

/// Registry and inventory together, plus the multi-row writes that must land
/// as one unit.
pub trait Catalog: FolderRegistry + InventoryStore {
    /// Apply a reconciliation pass and write the folder's sync summary
    /// (`last_sync_time`, `total_bytes`, `file_count`, `aggregate_checksum`).
    /// Other folder fields are left as currently stored.
    ///
    /// This default applies item mutations first and the summary last, so a
    /// crash leaves a stale summary, never one that references missing items.
    /// The compound defaults here read then write; stores shared across
    /// threads override them with a single atomic unit.
    fn commit_sync(&self, folder: &Folder, changes: &SyncChangeSet) -> Result<()> {
        for id in &changes.deletes {
            self.delete_item(*id)?;
        }
        for item in &changes.updates {
            self.update_item(item)?;
        }
        for item in &changes.inserts {
            self.insert_item(item)?;
        }
        let mut current = self
            .get_folder(folder.id)?
            .ok_or_else(|| crate::Error::NotFound(format!("folder {}", folder.id)))?;
        current.last_sync_time = folder.last_sync_time;
        current.total_bytes = folder.total_bytes;
        current.file_count = folder.file_count;
        current.aggregate_checksum = folder.aggregate_checksum.clone();
        self.update_folder(&current)
    }

    /// Drop a folder's inventory and then its registry row.
    fn commit_retire(&self, folder_id: Uuid) -> Result<()> {
        self.delete_items_for_folder(folder_id)?;
        self.delete_folder(folder_id)
    }

    /// Replace a folder's own exclusion patterns, leaving every other column
    /// as currently stored.
    fn set_exclude_patterns(&self, id: Uuid, patterns: &[String]) -> Result<()> {
        let mut current = self
            .get_folder(id)?
            .ok_or_else(|| crate::Error::NotFound(format!("folder {}", id)))?;
        current.exclude_patterns = patterns.to_vec();
        self.update_folder(&current)
    }

    /// Flag `id` as the merge target, clearing the flag everywhere else.
    /// With `flag == false` only `id` is cleared.
    fn set_merge_target(&self, id: Uuid, flag: bool) -> Result<()> {
        if self.get_folder(id)?.is_none() {
            return Err(crate::Error::NotFound(format!("folder {}", id)));
        }
        for mut folder in self.list_folders()? {
            let wanted = if folder.id == id {
                flag
            } else {
                folder.is_merge_target && !flag
            };
            if folder.is_merge_target != wanted {
                folder.is_merge_target = wanted;
                self.update_folder(&folder)?;
            }
        }
        Ok(())
    }
}
