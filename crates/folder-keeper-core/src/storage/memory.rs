//! In-memory implementation of the registry and inventory traits.
//!
//! Same semantics as the SQLite store, nothing persisted. Used by tests and
//! by callers that want an isolated throwaway catalog.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use super::models::{FileItem, Folder, SyncChangeSet};
use super::traits::{Catalog, FolderRegistry, InventoryStore};
use crate::error::{Error, Result};

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default, Clone)]
struct MemoryStoreInner {
    folders: HashMap<Uuid, Folder>,
    /// Items indexed by id.
    items: HashMap<Uuid, FileItem>,
    /// Route index: (folder_id, relative_route) -> item id.
    routes: BTreeMap<(Uuid, String), Uuid>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, MemoryStoreInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, MemoryStoreInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl FolderRegistry for MemoryStore {
    fn get_folder(&self, id: Uuid) -> Result<Option<Folder>> {
        Ok(self.read().folders.get(&id).cloned())
    }

    fn list_folders(&self) -> Result<Vec<Folder>> {
        let mut folders: Vec<Folder> = self.read().folders.values().cloned().collect();
        folders.sort_by(|a, b| a.root_path.cmp(&b.root_path));
        Ok(folders)
    }

    fn find_by_root(&self, root_path: &Path) -> Result<Option<Folder>> {
        Ok(self
            .read()
            .folders
            .values()
            .find(|f| f.root_path == root_path)
            .cloned())
    }

    fn insert_folder(&self, folder: &Folder) -> Result<()> {
        let mut inner = self.write();
        if inner.folders.contains_key(&folder.id)
            || inner.folders.values().any(|f| f.root_path == folder.root_path)
        {
            return Err(Error::Conflict(format!(
                "folder {} or root path {} already registered",
                folder.id,
                folder.root_path.display()
            )));
        }
        inner.folders.insert(folder.id, folder.clone());
        Ok(())
    }

    fn update_folder(&self, folder: &Folder) -> Result<()> {
        let mut inner = self.write();
        match inner.folders.get_mut(&folder.id) {
            Some(existing) => {
                *existing = folder.clone();
                Ok(())
            }
            None => Err(Error::NotFound(format!("folder {}", folder.id))),
        }
    }

    fn delete_folder(&self, id: Uuid) -> Result<()> {
        let mut inner = self.write();
        if inner.folders.remove(&id).is_none() {
            return Err(Error::NotFound(format!("folder {}", id)));
        }
        // Mirror ON DELETE CASCADE.
        inner.delete_items_for_folder(id);
        Ok(())
    }
}

fn remove_item(inner: &mut MemoryStoreInner, id: Uuid) -> Option<FileItem> {
    let item = inner.items.remove(&id)?;
    inner
        .routes
        .remove(&(item.folder_id, item.relative_route.clone()));
    Some(item)
}

impl MemoryStoreInner {
    fn folder_mut(&mut self, id: Uuid) -> Result<&mut Folder> {
        self.folders
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("folder {}", id)))
    }

    fn insert_item(&mut self, item: &FileItem) -> Result<()> {
        if !self.folders.contains_key(&item.folder_id) {
            return Err(Error::NotFound(format!("folder {}", item.folder_id)));
        }
        let key = (item.folder_id, item.relative_route.clone());
        if self.items.contains_key(&item.id) || self.routes.contains_key(&key) {
            return Err(Error::Conflict(format!(
                "file item {} already tracked in folder {}",
                item.relative_route, item.folder_id
            )));
        }
        self.routes.insert(key, item.id);
        self.items.insert(item.id, item.clone());
        Ok(())
    }

    fn update_item(&mut self, item: &FileItem) -> Result<()> {
        let previous = remove_item(self, item.id)
            .ok_or_else(|| Error::NotFound(format!("file item {}", item.id)))?;
        let updated = FileItem {
            folder_id: previous.folder_id,
            ..item.clone()
        };
        self.routes
            .insert((updated.folder_id, updated.relative_route.clone()), updated.id);
        self.items.insert(updated.id, updated);
        Ok(())
    }

    fn delete_item(&mut self, id: Uuid) -> Result<()> {
        remove_item(self, id)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("file item {}", id)))
    }

    fn delete_items_for_folder(&mut self, folder_id: Uuid) -> usize {
        let ids: Vec<Uuid> = self
            .items
            .values()
            .filter(|item| item.folder_id == folder_id)
            .map(|item| item.id)
            .collect();
        for id in &ids {
            remove_item(self, *id);
        }
        ids.len()
    }
}

impl InventoryStore for MemoryStore {
    fn list_by_folder(&self, folder_id: Uuid) -> Result<Vec<FileItem>> {
        let inner = self.read();
        // BTreeMap range keeps the result sorted by route.
        let items = inner
            .routes
            .range((folder_id, String::new())..)
            .take_while(|((owner, _), _)| *owner == folder_id)
            .filter_map(|(_, id)| inner.items.get(id).cloned())
            .collect();
        Ok(items)
    }

    fn insert_item(&self, item: &FileItem) -> Result<()> {
        self.write().insert_item(item)
    }

    fn update_item(&self, item: &FileItem) -> Result<()> {
        self.write().update_item(item)
    }

    fn delete_item(&self, id: Uuid) -> Result<()> {
        self.write().delete_item(id)
    }

    fn delete_items_for_folder(&self, folder_id: Uuid) -> Result<usize> {
        Ok(self.write().delete_items_for_folder(folder_id))
    }
}

/// Every compound write runs under one write lock. `commit_sync` is staged on
/// a copy and swapped in only when all mutations succeed.
impl Catalog for MemoryStore {
    fn commit_sync(&self, folder: &Folder, changes: &SyncChangeSet) -> Result<()> {
        let mut inner = self.write();
        let mut staged = inner.clone();
        for id in &changes.deletes {
            staged.delete_item(*id)?;
        }
        for item in &changes.updates {
            staged.update_item(item)?;
        }
        for item in &changes.inserts {
            staged.insert_item(item)?;
        }
        let current = staged.folder_mut(folder.id)?;
        current.last_sync_time = folder.last_sync_time;
        current.total_bytes = folder.total_bytes;
        current.file_count = folder.file_count;
        current.aggregate_checksum = folder.aggregate_checksum.clone();
        *inner = staged;
        Ok(())
    }

    fn commit_retire(&self, folder_id: Uuid) -> Result<()> {
        let mut inner = self.write();
        if !inner.folders.contains_key(&folder_id) {
            return Err(Error::NotFound(format!("folder {}", folder_id)));
        }
        inner.delete_items_for_folder(folder_id);
        inner.folders.remove(&folder_id);
        Ok(())
    }

    fn set_exclude_patterns(&self, id: Uuid, patterns: &[String]) -> Result<()> {
        self.write().folder_mut(id)?.exclude_patterns = patterns.to_vec();
        Ok(())
    }

    fn set_merge_target(&self, id: Uuid, flag: bool) -> Result<()> {
        let mut inner = self.write();
        inner.folder_mut(id)?.is_merge_target = flag;
        if flag {
            for folder in inner.folders.values_mut().filter(|f| f.id != id) {
                folder.is_merge_target = false;
            }
        }
        Ok(())
    }
}
