pub mod exclude;
pub mod walk;

pub use exclude::ExcludeSet;
pub use walk::{scan, ScanOutcome, ScanWarning, ScannedFile};
