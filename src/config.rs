use std::path::{Path, PathBuf};

use crate::logging::{DEFAULT_FILTER, LOG_ENV};

pub const DB_ENV: &str = "BIRTHDAYS_DB";
pub const APP_DIR: &str = "birthdays";
pub const DB_FILE: &str = "birthdays.sqlite3";

/// Where things live on disk and how chatty the logs are.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub log_dir: PathBuf,
    pub log_filter: String,
}

impl AppConfig {
    /// Resolve from the command line, then the environment, then the platform data dir.
    pub fn resolve(cli_db: Option<PathBuf>) -> anyhow::Result<Self> {
        let base = match dirs::data_dir() {
            Some(dir) => dir,
            None => std::env::current_dir()?,
        };
        Ok(Self::resolve_with(cli_db, |key| std::env::var(key).ok(), &base))
    }

    pub fn resolve_with(
        cli_db: Option<PathBuf>,
        env: impl Fn(&str) -> Option<String>,
        data_dir: &Path,
    ) -> Self {
        let db_path = cli_db
            .or_else(|| env(DB_ENV).filter(|v| !v.is_empty()).map(PathBuf::from))
            .unwrap_or_else(|| data_dir.join(APP_DIR).join(DB_FILE));
        let log_dir = db_path
            .parent()
            .map(|p| p.join("logs"))
            .unwrap_or_else(|| PathBuf::from("logs"));
        let log_filter = env(LOG_ENV).unwrap_or_else(|| DEFAULT_FILTER.to_string());
        Self {
            db_path,
            log_dir,
            log_filter,
        }
    }
}
