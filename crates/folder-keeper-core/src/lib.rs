pub mod analysis;
pub mod config;
pub mod engine;
pub mod error;
pub mod hasher;
pub mod holding;
pub mod progress;
pub mod scanner;
pub mod storage;

pub use config::{AppConfig, SettingsProvider};
pub use engine::{Keeper, SyncEngine, SyncPhase, SyncReport};
pub use error::{Error, Result};
pub use holding::{HoldingArea, HoldingKind, RetiredFolderSnapshot};
pub use progress::{ProgressReporter, SilentReporter};
