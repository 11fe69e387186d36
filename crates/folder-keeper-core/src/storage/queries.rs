use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

use super::models::{FileItem, Folder, SyncChangeSet};
use super::sqlite::Database;
use super::traits::{Catalog, FolderRegistry, InventoryStore};
use crate::error::{Error, Result};

const FOLDER_COLUMNS: &str = "id, root_path, exclude_patterns, last_sync_time, total_bytes, \
     file_count, aggregate_checksum, is_merge_target";

const FILE_ITEM_COLUMNS: &str =
    "id, folder_id, relative_route, content_checksum, size_bytes, last_sync_time";

// ── Row mapping ──────────────────────────────────────────────

fn folder_from_row(row: &Row<'_>) -> rusqlite::Result<Folder> {
    let root_path: String = row.get(1)?;
    let patterns_json: String = row.get(2)?;
    let exclude_patterns: Vec<String> = serde_json::from_str(&patterns_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;

    Ok(Folder {
        id: row.get(0)?,
        root_path: PathBuf::from(root_path),
        exclude_patterns,
        last_sync_time: row.get(3)?,
        total_bytes: row.get::<_, Option<i64>>(4)?.map(|v| v as u64),
        file_count: row.get::<_, Option<i64>>(5)?.map(|v| v as u64),
        aggregate_checksum: row.get(6)?,
        is_merge_target: row.get(7)?,
    })
}

fn file_item_from_row(row: &Row<'_>) -> rusqlite::Result<FileItem> {
    Ok(FileItem {
        id: row.get(0)?,
        folder_id: row.get(1)?,
        relative_route: row.get(2)?,
        content_checksum: row.get(3)?,
        size_bytes: row.get::<_, i64>(4)? as u64,
        last_sync_time: row.get(5)?,
    })
}

fn path_text(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

// ── Statements shared by plain calls and transactions ───────

fn insert_folder_on(conn: &Connection, folder: &Folder) -> Result<()> {
    let patterns_json = serde_json::to_string(&folder.exclude_patterns)?;
    conn.execute(
        "INSERT INTO folder (id, root_path, exclude_patterns, last_sync_time, total_bytes, \
         file_count, aggregate_checksum, is_merge_target) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            folder.id,
            path_text(&folder.root_path),
            patterns_json,
            folder.last_sync_time,
            folder.total_bytes.map(|v| v as i64),
            folder.file_count.map(|v| v as i64),
            folder.aggregate_checksum,
            folder.is_merge_target,
        ],
    )
    .map_err(|e| {
        if is_constraint_violation(&e) {
            Error::Conflict(format!(
                "folder {} or root path {} already registered",
                folder.id,
                folder.root_path.display()
            ))
        } else {
            Error::Database(e)
        }
    })?;
    Ok(())
}

fn update_folder_on(conn: &Connection, folder: &Folder) -> Result<()> {
    let patterns_json = serde_json::to_string(&folder.exclude_patterns)?;
    let changed = conn.execute(
        "UPDATE folder SET root_path = ?1, exclude_patterns = ?2, last_sync_time = ?3, \
         total_bytes = ?4, file_count = ?5, aggregate_checksum = ?6, is_merge_target = ?7 \
         WHERE id = ?8",
        params![
            path_text(&folder.root_path),
            patterns_json,
            folder.last_sync_time,
            folder.total_bytes.map(|v| v as i64),
            folder.file_count.map(|v| v as i64),
            folder.aggregate_checksum,
            folder.is_merge_target,
            folder.id,
        ],
    )?;
    if changed == 0 {
        return Err(Error::NotFound(format!("folder {}", folder.id)));
    }
    Ok(())
}

fn update_summary_on(conn: &Connection, folder: &Folder) -> Result<()> {
    let changed = conn.execute(
        "UPDATE folder SET last_sync_time = ?1, total_bytes = ?2, file_count = ?3, \
         aggregate_checksum = ?4 WHERE id = ?5",
        params![
            folder.last_sync_time,
            folder.total_bytes.map(|v| v as i64),
            folder.file_count.map(|v| v as i64),
            folder.aggregate_checksum,
            folder.id,
        ],
    )?;
    if changed == 0 {
        return Err(Error::NotFound(format!("folder {}", folder.id)));
    }
    Ok(())
}

fn insert_item_on(conn: &Connection, item: &FileItem) -> Result<()> {
    conn.prepare_cached(
        "INSERT INTO file_item \
         (id, folder_id, relative_route, content_checksum, size_bytes, last_sync_time) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?
    .execute(params![
        item.id,
        item.folder_id,
        item.relative_route,
        item.content_checksum,
        item.size_bytes as i64,
        item.last_sync_time,
    ])
    .map_err(|e| {
        if is_constraint_violation(&e) {
            Error::Conflict(format!(
                "file item {} already tracked in folder {}",
                item.relative_route, item.folder_id
            ))
        } else {
            Error::Database(e)
        }
    })?;
    Ok(())
}

fn update_item_on(conn: &Connection, item: &FileItem) -> Result<()> {
    let changed = conn
        .prepare_cached(
            "UPDATE file_item SET relative_route = ?1, content_checksum = ?2, \
             size_bytes = ?3, last_sync_time = ?4 WHERE id = ?5",
        )?
        .execute(params![
            item.relative_route,
            item.content_checksum,
            item.size_bytes as i64,
            item.last_sync_time,
            item.id,
        ])?;
    if changed == 0 {
        return Err(Error::NotFound(format!("file item {}", item.id)));
    }
    Ok(())
}

fn delete_item_on(conn: &Connection, id: Uuid) -> Result<()> {
    let changed = conn
        .prepare_cached("DELETE FROM file_item WHERE id = ?1")?
        .execute(params![id])?;
    if changed == 0 {
        return Err(Error::NotFound(format!("file item {}", id)));
    }
    Ok(())
}

fn delete_folder_on(conn: &Connection, id: Uuid) -> Result<()> {
    let changed = conn.execute("DELETE FROM folder WHERE id = ?1", params![id])?;
    if changed == 0 {
        return Err(Error::NotFound(format!("folder {}", id)));
    }
    Ok(())
}

// ── Folder registry ──────────────────────────────────────────

impl FolderRegistry for Database {
    fn get_folder(&self, id: Uuid) -> Result<Option<Folder>> {
        let conn = self.connection()?;
        let folder = conn
            .query_row(
                &format!("SELECT {} FROM folder WHERE id = ?1", FOLDER_COLUMNS),
                params![id],
                folder_from_row,
            )
            .optional()?;
        Ok(folder)
    }

    fn list_folders(&self) -> Result<Vec<Folder>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM folder ORDER BY root_path ASC",
            FOLDER_COLUMNS
        ))?;
        let folders = stmt
            .query_map([], folder_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(folders)
    }

    fn find_by_root(&self, root_path: &Path) -> Result<Option<Folder>> {
        let conn = self.connection()?;
        let folder = conn
            .query_row(
                &format!("SELECT {} FROM folder WHERE root_path = ?1", FOLDER_COLUMNS),
                params![path_text(root_path)],
                folder_from_row,
            )
            .optional()?;
        Ok(folder)
    }

    fn insert_folder(&self, folder: &Folder) -> Result<()> {
        let conn = self.connection()?;
        insert_folder_on(&conn, folder)
    }

    fn update_folder(&self, folder: &Folder) -> Result<()> {
        let conn = self.connection()?;
        update_folder_on(&conn, folder)
    }

    fn delete_folder(&self, id: Uuid) -> Result<()> {
        let conn = self.connection()?;
        delete_folder_on(&conn, id)
    }
}

// ── Inventory ────────────────────────────────────────────────

impl InventoryStore for Database {
    fn list_by_folder(&self, folder_id: Uuid) -> Result<Vec<FileItem>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM file_item WHERE folder_id = ?1 ORDER BY relative_route ASC",
            FILE_ITEM_COLUMNS
        ))?;
        let items = stmt
            .query_map(params![folder_id], file_item_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    fn insert_item(&self, item: &FileItem) -> Result<()> {
        let conn = self.connection()?;
        insert_item_on(&conn, item)
    }

    fn update_item(&self, item: &FileItem) -> Result<()> {
        let conn = self.connection()?;
        update_item_on(&conn, item)
    }

    fn delete_item(&self, id: Uuid) -> Result<()> {
        let conn = self.connection()?;
        delete_item_on(&conn, id)
    }

    fn delete_items_for_folder(&self, folder_id: Uuid) -> Result<usize> {
        let removed = self.connection()?.execute(
            "DELETE FROM file_item WHERE folder_id = ?1",
            params![folder_id],
        )?;
        Ok(removed)
    }
}

// ── Multi-row units ──────────────────────────────────────────

impl Catalog for Database {
    fn commit_sync(&self, folder: &Folder, changes: &SyncChangeSet) -> Result<()> {
        let mut conn = self.connection()?;
        let tx = conn.transaction()?;
        for id in &changes.deletes {
            delete_item_on(&tx, *id)?;
        }
        for item in &changes.updates {
            update_item_on(&tx, item)?;
        }
        for item in &changes.inserts {
            insert_item_on(&tx, item)?;
        }
        update_summary_on(&tx, folder)?;
        tx.commit()?;
        debug!(
            "Committed sync for folder {}: {} inserts, {} updates, {} deletes",
            folder.id,
            changes.inserts.len(),
            changes.updates.len(),
            changes.deletes.len()
        );
        Ok(())
    }

    fn commit_retire(&self, folder_id: Uuid) -> Result<()> {
        let mut conn = self.connection()?;
        let tx = conn.transaction()?;
        let removed = tx.execute(
            "DELETE FROM file_item WHERE folder_id = ?1",
            params![folder_id],
        )?;
        delete_folder_on(&tx, folder_id)?;
        tx.commit()?;
        debug!("Removed folder {} and {} file items", folder_id, removed);
        Ok(())
    }

    fn set_exclude_patterns(&self, id: Uuid, patterns: &[String]) -> Result<()> {
        let patterns_json = serde_json::to_string(patterns)?;
        let changed = self.connection()?.execute(
            "UPDATE folder SET exclude_patterns = ?1 WHERE id = ?2",
            params![patterns_json, id],
        )?;
        if changed == 0 {
            return Err(Error::NotFound(format!("folder {}", id)));
        }
        Ok(())
    }

    fn set_merge_target(&self, id: Uuid, flag: bool) -> Result<()> {
        let mut conn = self.connection()?;
        let tx = conn.transaction()?;
        if flag {
            tx.execute(
                "UPDATE folder SET is_merge_target = 0 WHERE id != ?1",
                params![id],
            )?;
        }
        let changed = tx.execute(
            "UPDATE folder SET is_merge_target = ?1 WHERE id = ?2",
            params![flag, id],
        )?;
        if changed == 0 {
            return Err(Error::NotFound(format!("folder {}", id)));
        }
        tx.commit()?;
        Ok(())
    }
}
