use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::scheduler::DEFAULT_FLUSH_INTERVAL;
use crate::shutdown::DEFAULT_SHUTDOWN_TIMEOUT;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DizznemConfig {
    pub database: Option<String>,
    pub flush_interval_secs: Option<u64>,
    pub shutdown_timeout_secs: Option<u64>,
    pub log_file: Option<String>,
}

/// Effective settings after merging CLI flags over the config file.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub database: PathBuf,
    pub flush_interval: Duration,
    pub shutdown_timeout: Duration,
}

impl Settings {
    /// CLI values win over the file, the file wins over defaults.
    pub fn resolve(
        file: Option<&DizznemConfig>,
        database: Option<PathBuf>,
        flush_interval_secs: Option<u64>,
        shutdown_timeout_secs: Option<u64>,
    ) -> anyhow::Result<Self> {
        let file = file.cloned().unwrap_or_default();

        let flush_interval = flush_interval_secs
            .or(file.flush_interval_secs)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_FLUSH_INTERVAL);
        if flush_interval.is_zero() {
            anyhow::bail!("flush interval must be at least one second");
        }

        Ok(Self {
            database: database
                .or_else(|| file.database.map(PathBuf::from))
                .unwrap_or_else(default_database_path),
            flush_interval,
            shutdown_timeout: shutdown_timeout_secs
                .or(file.shutdown_timeout_secs)
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT),
        })
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("dizznem.toml")
}

pub fn default_database_path() -> PathBuf {
    PathBuf::from("data").join("users.db")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<DizznemConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: DizznemConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &DizznemConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

pub fn ensure_db_dir(db_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
