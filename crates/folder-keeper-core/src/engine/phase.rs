use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Where a folder's most recent sync attempt stands.
///
/// `Idle -> Scanning -> Reconciling -> Persisting -> Idle`. A failed attempt
/// parks in `Failed` until the next attempt starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncPhase {
    #[default]
    Idle,
    Scanning,
    Reconciling,
    Persisting,
    Failed,
}

#[derive(Debug, Clone, Default)]
pub struct PhaseTracker {
    phases: Arc<DashMap<Uuid, SyncPhase>>,
}

impl PhaseTracker {
    pub fn get(&self, id: Uuid) -> SyncPhase {
        self.phases.get(&id).map(|p| *p).unwrap_or_default()
    }

    /// Number of folders not currently `Idle`.
    pub fn len(&self) -> usize {
        self.phases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    pub fn set(&self, id: Uuid, phase: SyncPhase) {
        if phase == SyncPhase::Idle {
            self.phases.remove(&id);
        } else {
            self.phases.insert(id, phase);
        }
    }
}
