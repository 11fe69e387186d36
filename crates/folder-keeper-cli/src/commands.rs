use clap::{Parser, Subcommand, ValueEnum};
use folder_keeper_core::HoldingKind;
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "folder-keeper")]
#[command(about = "Track folder inventories, retire and restore folders", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Register a folder by absolute path
    Add { path: PathBuf },
    /// List registered folders
    List,
    /// List the inventoried files of a folder
    Files { id: Uuid },
    /// Rebuild a folder's inventory from disk
    Sync { id: Uuid },
    /// Sync every registered folder
    SyncAll,
    /// Replace a folder's exclusion patterns (none clears them)
    Exclude { id: Uuid, patterns: Vec<String> },
    /// Mark a folder as the merge target
    MergeTarget {
        id: Uuid,
        /// Remove the flag instead of setting it
        #[arg(long)]
        clear: bool,
    },
    /// Compare the inventories of two or more folders
    Compare {
        #[arg(num_args = 2.., required = true)]
        ids: Vec<Uuid>,
    },
    /// Copy every file of one folder into another, then sync the target
    Copy { source: Uuid, target: Uuid },
    /// Move a folder into the archive
    Archive { id: Uuid },
    /// Move a folder into the trash
    Trash { id: Uuid },
    /// Move a retired folder back to its original path
    Restore {
        id: Uuid,
        #[arg(long, value_enum)]
        from: Area,
    },
    /// Permanently delete a retired folder
    Purge {
        id: Uuid,
        #[arg(long, value_enum)]
        from: Area,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// List retired folders, newest first
    Retired {
        #[arg(long, value_enum)]
        from: Area,
    },
    /// Print configuration values
    PrintConfig,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Area {
    Archive,
    Trash,
}

impl From<Area> for HoldingKind {
    fn from(area: Area) -> Self {
        match area {
            Area::Archive => HoldingKind::Archive,
            Area::Trash => HoldingKind::Trash,
        }
    }
}
