//! Side-car metadata written next to a retired folder's directory.
//!
//! `<holding_root>/<folder_id>/folder.json`, camelCase keys. The exclude
//! patterns are stored as a JSON-encoded string array, the retirement time
//! as `archivedAt` or `deletedAt` depending on the holding area.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::storage::models::display_name_of;
use crate::storage::Folder;

pub const SIDECAR_FILE_NAME: &str = "folder.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HoldingKind {
    /// Long-term storage.
    Archive,
    /// Recoverable delete.
    Trash,
}

impl fmt::Display for HoldingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HoldingKind::Archive => write!(f, "archive"),
            HoldingKind::Trash => write!(f, "trash"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetiredFolderSnapshot {
    pub id: Uuid,
    pub absolute_route: PathBuf,
    #[serde(with = "encoded_patterns", default)]
    pub exclude_patterns: Vec<String>,
    pub last_sync: Option<DateTime<Utc>>,
    pub total_bytes: Option<u64>,
    pub count_files: Option<u64>,
    pub checksum: Option<String>,
    #[serde(default)]
    pub merging: bool,
    #[serde(alias = "name")]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl RetiredFolderSnapshot {
    pub fn capture(folder: &Folder, kind: HoldingKind, retired_at: DateTime<Utc>) -> Self {
        let (archived_at, deleted_at) = match kind {
            HoldingKind::Archive => (Some(retired_at), None),
            HoldingKind::Trash => (None, Some(retired_at)),
        };
        Self {
            id: folder.id,
            absolute_route: folder.root_path.clone(),
            exclude_patterns: folder.exclude_patterns.clone(),
            last_sync: folder.last_sync_time,
            total_bytes: folder.total_bytes,
            count_files: folder.file_count,
            checksum: folder.aggregate_checksum.clone(),
            merging: folder.is_merge_target,
            display_name: folder.display_name(),
            archived_at,
            deleted_at,
        }
    }

    pub fn retired_at(&self) -> Option<DateTime<Utc>> {
        self.archived_at.or(self.deleted_at)
    }

    /// Name of the moved directory inside the holding subdirectory.
    pub fn held_dir_name(&self) -> String {
        let name = display_name_of(&self.absolute_route);
        if name.is_empty() {
            self.display_name.clone()
        } else {
            name
        }
    }

    /// The folder as it re-enters the registry.
    ///
    /// The inventory was discarded at retirement, so the summary starts out
    /// empty until the next sync. The merge-target flag starts cleared; the
    /// holding area reinstates it after registration if it is still free.
    pub fn to_restored_folder(&self) -> Folder {
        Folder {
            id: self.id,
            root_path: self.absolute_route.clone(),
            exclude_patterns: self.exclude_patterns.clone(),
            last_sync_time: None,
            total_bytes: None,
            file_count: None,
            aggregate_checksum: None,
            is_merge_target: false,
        }
    }
}

mod encoded_patterns {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(patterns: &[String], serializer: S) -> Result<S::Ok, S::Error> {
        let encoded = serde_json::to_string(patterns).map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&encoded)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            Some(encoded) if !encoded.trim().is_empty() => {
                serde_json::from_str(&encoded).map_err(serde::de::Error::custom)
            }
            _ => Ok(Vec::new()),
        }
    }
}
