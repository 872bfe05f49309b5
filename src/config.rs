use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::feed::DEFAULT_FEED_CAPACITY;

pub const ENV_DB: &str = "HEARTHKEEP_DB";
pub const ENV_LOG: &str = "HEARTHKEEP_LOG";
pub const ENV_LOG_DIR: &str = "HEARTHKEEP_LOG_DIR";
pub const ENV_FEED_CAPACITY: &str = "HEARTHKEEP_FEED_CAPACITY";

pub const DEFAULT_LOG_FILTER: &str = "hearthkeep=info,sqlx=warn";
const APP_DIR: &str = "hearthkeep";
const DB_FILE: &str = "hearthkeep.sqlite3";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub db_path: PathBuf,
    pub log_filter: String,
    /// When set, logs are also written to a daily rolling file here.
    pub log_dir: Option<PathBuf>,
    pub feed_capacity: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolves settings through `lookup`; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let db_path = match get(ENV_DB) {
            Some(path) => PathBuf::from(path),
            None => default_db_path()?,
        };
        let feed_capacity = match get(ENV_FEED_CAPACITY) {
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .with_context(|| format!("{ENV_FEED_CAPACITY} must be a positive integer, got {raw:?}"))?,
            None => DEFAULT_FEED_CAPACITY,
        };

        Ok(Config {
            db_path,
            log_filter: get(ENV_LOG).unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
            log_dir: get(ENV_LOG_DIR).map(PathBuf::from),
            feed_capacity,
        })
    }
}

pub fn default_db_path() -> Result<PathBuf> {
    let base = match dirs::data_dir() {
        Some(dir) => dir,
        None => std::env::current_dir().context("resolve current directory")?,
    };
    Ok(base.join(APP_DIR).join(DB_FILE))
}
