use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use super::lock::StoreLock;
use repodeck_core::domain::{ErrorTrace, RepoId, RepoRecord};
use repodeck_core::ports::{AppConfig, ConfigStore, RecordStore, TraceStore};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// File-based configuration store that implements ConfigStore
pub struct FileConfigStore {
    config_path: PathBuf,
}

impl FileConfigStore {
    pub fn new() -> Result<Self> {
        let config_path = Self::get_default_config_path()?;
        Ok(Self { config_path })
    }

    pub fn with_path<P: AsRef<Path>>(config_path: P) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    fn get_default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("", "", "repodeck")
            .context("Failed to determine project directories")?;

        let config_dir = proj_dirs.config_dir();
        Ok(config_dir.join("repodeck.toml"))
    }

    /// Data directory for repositories and records when nothing is configured
    fn default_data_dir() -> PathBuf {
        ProjectDirs::from("", "", "repodeck")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .or_else(|| dirs::home_dir().map(|home| home.join(".repodeck")))
            .unwrap_or_else(|| PathBuf::from(".repodeck"))
    }

    /// Create default config if it doesn't exist
    fn ensure_config_exists(&self, default_config: &AppConfig) -> Result<()> {
        if !self.config_path.exists() {
            if let Some(parent) = self.config_path.parent() {
                fs::create_dir_all(parent).context("Failed to create config directory")?;
            }
            self.save(default_config)?;
        }
        Ok(())
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Result<AppConfig> {
        let default_config = AppConfig::with_data_dir(Self::default_data_dir());

        self.ensure_config_exists(&default_config)?;

        let contents = fs::read_to_string(&self.config_path).with_context(|| {
            format!("Failed to read config file: {}", self.config_path.display())
        })?;

        let config: AppConfig = toml::from_str(&contents).with_context(|| {
            format!("Failed to parse config file: {}", self.config_path.display())
        })?;

        Ok(config)
    }

    fn save(&self, config: &AppConfig) -> Result<()> {
        let contents =
            toml::to_string_pretty(config).context("Failed to serialize config to TOML")?;

        fs::write(&self.config_path, contents).with_context(|| {
            format!("Failed to write config file: {}", self.config_path.display())
        })?;

        Ok(())
    }
}

/// Serialized shape of the record store
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct RecordTable {
    #[serde(default)]
    next_id: u64,
    #[serde(default)]
    records: Vec<RepoRecord>,
}

impl RecordTable {
    fn exists(&self, folder: &str) -> bool {
        self.records.iter().any(|r| r.folder == folder)
    }

    fn add(&mut self, record: &RepoRecord) -> Result<RepoRecord> {
        if self.exists(&record.folder) {
            bail!("Record with folder {} already exists", record.folder);
        }
        self.next_id += 1;
        let mut stored = record.clone();
        stored.id = Some(RepoId(self.next_id));
        self.records.push(stored.clone());
        Ok(stored)
    }

    fn update(&mut self, record: &RepoRecord) -> Result<()> {
        let stored = self
            .records
            .iter_mut()
            .find(|r| r.folder == record.folder)
            .with_context(|| format!("No record with folder {}", record.folder))?;
        stored.size = record.size;
        stored.state = record.state;
        stored.error = record.error.clone();
        Ok(())
    }

    fn delete(&mut self, folder: &str) {
        self.records.retain(|r| r.folder != folder);
    }

    fn sorted(&self) -> Vec<RepoRecord> {
        let mut records = self.records.clone();
        records.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.folder.cmp(&b.folder)));
        records
    }
}

/// Record store persisted as a single TOML document.
///
/// Every call reads the file, applies the change and writes it back. Reads
/// take a shared lock on `<records>.lock` and changes an exclusive one, so
/// several processes can share the file. A missing file is an empty store.
pub struct FileRecordStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileRecordStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    fn read(&self) -> Result<RecordTable> {
        if !self.path.exists() {
            return Ok(RecordTable::default());
        }
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read records file: {}", self.path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse records file: {}", self.path.display()))
    }

    fn write(&self, table: &RecordTable) -> Result<()> {
        let contents =
            toml::to_string_pretty(table).context("Failed to serialize records to TOML")?;
        write_replacing(&self.path, &contents)
    }

    fn snapshot(&self) -> Result<RecordTable> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let _file_lock = StoreLock::shared(&self.path)?;
        self.read()
    }

    fn modify<T>(&self, change: impl FnOnce(&mut RecordTable) -> Result<T>) -> Result<T> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let _file_lock = StoreLock::exclusive(&self.path)?;
        let mut table = self.read()?;
        let value = change(&mut table)?;
        self.write(&table)?;
        Ok(value)
    }
}

// Write through a temporary file and rename, so readers never see half a file.
fn write_replacing(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, contents)
        .with_context(|| format!("Failed to write file: {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("Failed to replace file: {}", path.display()))
}

impl RecordStore for FileRecordStore {
    fn exists(&self, folder: &str) -> Result<bool> {
        Ok(self.snapshot()?.exists(folder))
    }

    fn add(&self, record: &RepoRecord) -> Result<RepoRecord> {
        self.modify(|table| table.add(record))
    }

    fn update(&self, record: &RepoRecord) -> Result<()> {
        self.modify(|table| table.update(record))
    }

    fn delete(&self, folder: &str) -> Result<()> {
        self.modify(|table| {
            table.delete(folder);
            Ok(())
        })
    }

    fn list_all(&self) -> Result<Vec<RepoRecord>> {
        Ok(self.snapshot()?.sorted())
    }
}

/// Record store kept in memory, for tests and throwaway sessions
#[derive(Default)]
pub struct MemoryRecordStore {
    table: Mutex<RecordTable>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_table<T>(&self, f: impl FnOnce(&mut RecordTable) -> Result<T>) -> Result<T> {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut table)
    }
}

impl RecordStore for MemoryRecordStore {
    fn exists(&self, folder: &str) -> Result<bool> {
        self.with_table(|table| Ok(table.exists(folder)))
    }

    fn add(&self, record: &RepoRecord) -> Result<RepoRecord> {
        self.with_table(|table| table.add(record))
    }

    fn update(&self, record: &RepoRecord) -> Result<()> {
        self.with_table(|table| table.update(record))
    }

    fn delete(&self, folder: &str) -> Result<()> {
        self.with_table(|table| {
            table.delete(folder);
            Ok(())
        })
    }

    fn list_all(&self) -> Result<Vec<RepoRecord>> {
        self.with_table(|table| Ok(table.sorted()))
    }
}

/// The last git failure as a small TOML document, replaced on every failure
pub struct FileTraceStore {
    path: PathBuf,
}

impl FileTraceStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl TraceStore for FileTraceStore {
    fn save(&self, trace: &ErrorTrace) -> Result<()> {
        let contents =
            toml::to_string_pretty(trace).context("Failed to serialize error trace to TOML")?;
        write_replacing(&self.path, &contents)
    }

    fn load(&self) -> Result<Option<ErrorTrace>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read error trace: {}", self.path.display()))?;
        let trace = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse error trace: {}", self.path.display()))?;
        Ok(Some(trace))
    }
}

#[derive(Default)]
pub struct MemoryTraceStore {
    last: Mutex<Option<ErrorTrace>>,
}

impl MemoryTraceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TraceStore for MemoryTraceStore {
    fn save(&self, trace: &ErrorTrace) -> Result<()> {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Some(trace.clone());
        Ok(())
    }

    fn load(&self) -> Result<Option<ErrorTrace>> {
        Ok(self.last.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }
}
