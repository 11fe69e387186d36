use config::{Config, ConfigError, Environment, File as ConfigFile};
use glob::Pattern;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub const DEFAULT_DATABASE_PATH: &str = "folder_keeper.db";
pub const DEFAULT_ARCHIVE_DIR: &str = "./.archive";
pub const DEFAULT_TRASH_DIR: &str = "./.trash";
pub const DEFAULT_EXCLUDE_PATTERNS: [&str; 2] = [".git", "node_modules"];

/// Global settings consumed by the engine: exclusion patterns that apply to
/// every folder and the two holding areas used by archive and trash.
pub trait SettingsProvider: Send + Sync {
    fn global_exclude_patterns(&self) -> Vec<String>;
    fn archive_holding_root(&self) -> PathBuf;
    fn trash_holding_root(&self) -> PathBuf;
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_path: String,
    pub global_exclude_patterns: Vec<String>,
    pub archive_dir: String,
    pub trash_dir: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: DEFAULT_DATABASE_PATH.to_string(),
            global_exclude_patterns: DEFAULT_EXCLUDE_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
            archive_dir: DEFAULT_ARCHIVE_DIR.to_string(),
            trash_dir: DEFAULT_TRASH_DIR.to_string(),
        }
    }
}

impl SettingsProvider for AppConfig {
    fn global_exclude_patterns(&self) -> Vec<String> {
        self.global_exclude_patterns.clone()
    }

    fn archive_holding_root(&self) -> PathBuf {
        PathBuf::from(&self.archive_dir)
    }

    fn trash_holding_root(&self) -> PathBuf {
        PathBuf::from(&self.trash_dir)
    }
}

/// Load `FolderKeeper.toml` from the working directory (optional), then
/// `FOLDER_KEEPER_*` environment variables on top.
pub fn load_configuration() -> std::result::Result<AppConfig, ConfigError> {
    build_configuration(ConfigFile::with_name("FolderKeeper").required(false))
}

/// Same as [`load_configuration`] but with an explicit file, which must exist.
pub fn load_configuration_from(path: &Path) -> std::result::Result<AppConfig, ConfigError> {
    build_configuration(ConfigFile::from(path).required(true))
}

fn build_configuration<S>(file: S) -> std::result::Result<AppConfig, ConfigError>
where
    S: config::Source + Send + Sync + 'static,
{
    let defaults = AppConfig::default();
    Config::builder()
        .set_default("database_path", defaults.database_path)?
        .set_default("global_exclude_patterns", defaults.global_exclude_patterns)?
        .set_default("archive_dir", defaults.archive_dir)?
        .set_default("trash_dir", defaults.trash_dir)?
        .add_source(file)
        .add_source(
            Environment::with_prefix("FOLDER_KEEPER")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("global_exclude_patterns"),
        )
        .build()?
        .try_deserialize::<AppConfig>()
}

/// Reject exclusion patterns that are empty or do not compile as globs.
pub fn validate_patterns(patterns: &[String]) -> Result<()> {
    for pattern in patterns {
        if pattern.trim().is_empty() {
            return Err(Error::Validation("empty exclude pattern".to_string()));
        }
        Pattern::new(pattern).map_err(|e| {
            Error::Validation(format!("invalid exclude pattern '{}': {}", pattern, e))
        })?;
    }
    Ok(())
}
