use crate::domain::{ErrorTrace, RepoRecord};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Persistent list of known repositories.
///
/// Implementations whose storage is shared between processes lock it
/// themselves; within a process the service and the operation worker are
/// the only writers.
pub trait RecordStore: Send + Sync {
    /// Whether a record with this folder exists
    fn exists(&self, folder: &str) -> Result<bool>;

    /// Insert a new record and return it with its assigned id.
    /// Fails when the folder is already taken.
    fn add(&self, record: &RepoRecord) -> Result<RepoRecord>;

    /// Partial update keyed by folder: size, state and error only
    fn update(&self, record: &RepoRecord) -> Result<()>;

    /// Remove the record for `folder`, if any
    fn delete(&self, folder: &str) -> Result<()>;

    /// All records ordered by name
    fn list_all(&self) -> Result<Vec<RepoRecord>>;

    /// Look a single record up by folder
    fn find(&self, folder: &str) -> Result<Option<RepoRecord>> {
        Ok(self.list_all()?.into_iter().find(|r| r.folder == folder))
    }
}

/// Configuration store interface
pub trait ConfigStore: Send + Sync {
    /// Load configuration from storage
    fn load(&self) -> Result<AppConfig>;

    /// Save configuration to storage
    fn save(&self, config: &AppConfig) -> Result<()>;
}

/// Keeps the last git failure
pub trait TraceStore: Send + Sync {
    /// Replace the stored trace
    fn save(&self, trace: &ErrorTrace) -> Result<()>;

    /// The last stored trace, `None` when nothing failed yet
    fn load(&self) -> Result<Option<ErrorTrace>>;
}

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub version: u32,
    /// Parent directory of every cloned repository
    pub repos_dir: PathBuf,
    /// Where the record store keeps its data
    pub records_file: PathBuf,
    #[serde(default)]
    pub git: GitConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    /// Default tracing filter when RUST_LOG is not set
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

/// Git transport configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitConfig {
    /// Connect timeout for remote servers
    pub connect_timeout_secs: u64,
}

/// History view configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Max commits shown by the log query
    pub log_limit: usize,
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Defaults rooted at `data_dir`
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            version: 1,
            repos_dir: data_dir.join("repos"),
            records_file: data_dir.join("records.toml"),
            git: GitConfig::default(),
            history: HistoryConfig::default(),
            log_filter: default_log_filter(),
        }
    }

    /// The last-error trace lives next to the records
    pub fn trace_file(&self) -> PathBuf {
        self.records_file.with_file_name("last_error.toml")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::with_data_dir(".")
    }
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 30,
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { log_limit: 50 }
    }
}
