pub mod keeper;
pub mod locks;
pub mod phase;
pub mod sync;

pub use keeper::Keeper;
pub use locks::{FolderGuard, FolderLocks};
pub use phase::{PhaseTracker, SyncPhase};
pub use sync::{SyncEngine, SyncReport};
