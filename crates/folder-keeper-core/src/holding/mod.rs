pub mod area;
pub mod snapshot;

pub use area::HoldingArea;
pub use snapshot::{HoldingKind, RetiredFolderSnapshot, SIDECAR_FILE_NAME};
