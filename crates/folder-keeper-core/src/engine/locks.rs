use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Per-folder mutual exclusion for sync, retire, restore and copy.
///
/// Acquisition never blocks: a folder that is already held is rejected with
/// `Busy`. Clones share the same lock table.
#[derive(Debug, Clone, Default)]
pub struct FolderLocks {
    held: Arc<DashMap<Uuid, &'static str>>,
}

/// Releases its folder when dropped.
#[derive(Debug)]
pub struct FolderGuard {
    held: Arc<DashMap<Uuid, &'static str>>,
    id: Uuid,
}

impl FolderLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self, id: Uuid, operation: &'static str) -> Result<FolderGuard> {
        match self.held.entry(id) {
            Entry::Occupied(entry) => Err(Error::Busy(format!(
                "{} already in progress for folder {}",
                entry.get(),
                id
            ))),
            Entry::Vacant(entry) => {
                entry.insert(operation);
                Ok(FolderGuard {
                    held: Arc::clone(&self.held),
                    id,
                })
            }
        }
    }

    /// All or nothing: on failure the guards taken so far are released.
    pub fn try_acquire_all(
        &self,
        ids: &[Uuid],
        operation: &'static str,
    ) -> Result<Vec<FolderGuard>> {
        let mut guards = Vec::with_capacity(ids.len());
        for id in ids {
            guards.push(self.try_acquire(*id, operation)?);
        }
        Ok(guards)
    }

    pub fn is_locked(&self, id: Uuid) -> bool {
        self.held.contains_key(&id)
    }
}

impl FolderGuard {
    pub fn folder_id(&self) -> Uuid {
        self.id
    }
}

impl Drop for FolderGuard {
    fn drop(&mut self) {
        self.held.remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_is_busy_until_release() {
        let locks = FolderLocks::new();
        let id = Uuid::new_v4();

        let guard = locks.try_acquire(id, "sync").unwrap();
        assert!(locks.is_locked(id));
        let err = locks.try_acquire(id, "retire").unwrap_err();
        assert!(matches!(err, Error::Busy(msg) if msg.contains("sync")));

        drop(guard);
        assert!(!locks.is_locked(id));
        assert!(locks.try_acquire(id, "retire").is_ok());
    }

    #[test]
    fn test_different_folders_are_independent() {
        let locks = FolderLocks::new();
        let _a = locks.try_acquire(Uuid::new_v4(), "sync").unwrap();
        let _b = locks.try_acquire(Uuid::new_v4(), "sync").unwrap();
    }

    #[test]
    fn test_acquire_all_releases_on_failure() {
        let locks = FolderLocks::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let _held = locks.try_acquire(b, "sync").unwrap();

        assert!(locks.try_acquire_all(&[a, b], "copy").is_err());
        assert!(!locks.is_locked(a));
    }
}
