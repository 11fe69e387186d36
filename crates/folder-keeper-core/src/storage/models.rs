use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// A tracked directory.
///
/// `total_bytes`, `file_count` and `aggregate_checksum` stay `None` until the
/// first successful sync and always describe the folder's current inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub id: Uuid,
    pub root_path: PathBuf,
    pub exclude_patterns: Vec<String>,
    pub last_sync_time: Option<DateTime<Utc>>,
    pub total_bytes: Option<u64>,
    pub file_count: Option<u64>,
    pub aggregate_checksum: Option<String>,
    pub is_merge_target: bool,
}

impl Folder {
    pub fn new(root_path: impl Into<PathBuf>) -> Self {
        Self {
            id: Uuid::new_v4(),
            root_path: root_path.into(),
            exclude_patterns: Vec::new(),
            last_sync_time: None,
            total_bytes: None,
            file_count: None,
            aggregate_checksum: None,
            is_merge_target: false,
        }
    }

    /// Basename of the root path.
    pub fn display_name(&self) -> String {
        display_name_of(&self.root_path)
    }

    pub fn is_synced(&self) -> bool {
        self.last_sync_time.is_some()
    }
}

pub(crate) fn display_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// One file in a folder's inventory. `relative_route` is unique per folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileItem {
    pub id: Uuid,
    pub folder_id: Uuid,
    pub relative_route: String,
    pub content_checksum: String,
    pub size_bytes: u64,
    pub last_sync_time: DateTime<Utc>,
}

impl FileItem {
    pub fn new(
        folder_id: Uuid,
        relative_route: impl Into<String>,
        content_checksum: impl Into<String>,
        size_bytes: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            folder_id,
            relative_route: relative_route.into(),
            content_checksum: content_checksum.into(),
            size_bytes,
            last_sync_time: Utc::now(),
        }
    }
}

/// Inventory mutations produced by one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncChangeSet {
    pub inserts: Vec<FileItem>,
    pub updates: Vec<FileItem>,
    pub deletes: Vec<Uuid>,
}

impl SyncChangeSet {
    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }

    pub fn mutation_count(&self) -> usize {
        self.inserts.len() + self.updates.len() + self.deletes.len()
    }
}
