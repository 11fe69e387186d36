pub mod memory;
pub mod models;
pub mod queries;
pub mod sqlite;
pub mod traits;

pub use memory::MemoryStore;
pub use models::{FileItem, Folder, SyncChangeSet};
pub use sqlite::Database;
pub use traits::{Catalog, FolderRegistry, InventoryStore};
