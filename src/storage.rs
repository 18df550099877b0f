use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::clock::{Clock, SystemClock};
use crate::models::{Settings, TasksFile};
use crate::store::TaskStore;

const DATA_FILE: &str = "data.json";
const SETTINGS_FILE: &str = "settings.json";
const BACKUP_DIR: &str = "backups";
const BACKUP_PREFIX: &str = "data-";
const BACKUP_LIMIT: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid backup name: {0}")]
    BackupName(String),
}

/// Load/save contract the core relies on. Loading never fails: unreadable data yields the
/// empty store or default settings. Saving reports failure but never panics.
pub trait Persistence: Send + Sync {
    fn load_tasks(&self) -> TaskStore;
    fn save_tasks(&self, data: &TasksFile) -> Result<(), StorageError>;
    fn load_settings(&self) -> Settings;
    fn save_settings(&self, settings: &Settings) -> Result<(), StorageError>;
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct BackupEntry {
    pub name: String,
    pub modified_at: i64,
}

/// JSON files under one data directory, with daily snapshots of the task file. The clock
/// decides which day a snapshot belongs to and names it.
pub struct Storage {
    root: PathBuf,
    clock: Arc<dyn Clock>,
}

impl Storage {
    pub fn new(root: PathBuf) -> Self {
        Self::with_clock(root, Arc::new(SystemClock))
    }

    pub fn with_clock(root: PathBuf, clock: Arc<dyn Clock>) -> Self {
        Self { root, clock }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ensure_dirs(&self) -> Result<(), StorageError> {
        fs::create_dir_all(self.root.join(BACKUP_DIR))?;
        Ok(())
    }

    pub fn read_tasks(&self) -> Result<TasksFile, StorageError> {
        self.load_json(self.root.join(DATA_FILE))
    }

    pub fn read_settings(&self) -> Result<Settings, StorageError> {
        self.load_json(self.root.join(SETTINGS_FILE))
    }

    pub fn write_tasks(&self, data: &TasksFile) -> Result<(), StorageError> {
        let path = self.root.join(DATA_FILE);
        if path.exists() && !self.has_backup_for_today()? {
            self.create_backup(&path)?;
        }
        self.write_atomic(path, data)
    }

    pub fn write_settings(&self, data: &Settings) -> Result<(), StorageError> {
        self.write_atomic(self.root.join(SETTINGS_FILE), data)
    }

    fn load_json<T: DeserializeOwned>(&self, path: PathBuf) -> Result<T, StorageError> {
        let mut file = File::open(path)?;
        let mut buf = String::new();
        file.read_to_string(&mut buf)?;
        Ok(serde_json::from_str(&buf)?)
    }

    fn write_atomic<T: Serialize>(&self, path: PathBuf, data: &T) -> Result<(), StorageError> {
        let json = serde_json::to_vec_pretty(data)?;
        write_atomic_bytes(&path, &json)
    }

    fn has_backup_for_today(&self) -> Result<bool, StorageError> {
        let today = format!("{BACKUP_PREFIX}{}", self.clock.now().format("%Y%m%d"));
        Ok(self
            .list_backups()?
            .iter()
            .any(|entry| entry.name.starts_with(&today)))
    }

    pub fn create_backup(&self, path: &Path) -> Result<(), StorageError> {
        fs::create_dir_all(self.root.join(BACKUP_DIR))?;
        let timestamp = self.clock.now().format("%Y%m%d-%H%M%S").to_string();
        let backup_name = format!("{BACKUP_PREFIX}{timestamp}.json");
        let backup_path = self.root.join(BACKUP_DIR).join(backup_name);
        fs::copy(path, backup_path)?;
        self.trim_backups()?;
        Ok(())
    }

    /// Backups oldest first.
    pub fn list_backups(&self) -> Result<Vec<BackupEntry>, StorageError> {
        let dir = self.root.join(BACKUP_DIR);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut results = Vec::new();
        for entry in fs::read_dir(dir)?.filter_map(|entry| entry.ok()) {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if !name.starts_with(BACKUP_PREFIX) {
                continue;
            }
            let modified_at = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .and_then(|time| time.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|dur| dur.as_secs() as i64)
                .unwrap_or(0);
            results.push(BackupEntry { name, modified_at });
        }
        // Names embed the timestamp, so they order chronologically.
        results.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(results)
    }

    pub fn restore_backup(&self, filename: &str) -> Result<TasksFile, StorageError> {
        if filename.contains(['/', '\\']) || filename.contains("..") {
            return Err(StorageError::BackupName(filename.to_string()));
        }
        let path = self.root.join(BACKUP_DIR).join(filename);
        let data: TasksFile = self.load_json(path)?;
        self.write_atomic(self.root.join(DATA_FILE), &data)?;
        Ok(data)
    }

    fn trim_backups(&self) -> Result<(), StorageError> {
        let entries = self.list_backups()?;
        let to_remove = entries.len().saturating_sub(BACKUP_LIMIT);
        for entry in entries.into_iter().take(to_remove) {
            let _ = fs::remove_file(self.root.join(BACKUP_DIR).join(entry.name));
        }
        Ok(())
    }
}

impl Persistence for Storage {
    fn load_tasks(&self) -> TaskStore {
        match self.read_tasks() {
            Ok(file) => TaskStore::from_file(file),
            Err(StorageError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
                TaskStore::new()
            }
            Err(err) => {
                log::warn!("load tasks failed, starting empty: {err}");
                TaskStore::new()
            }
        }
    }

    fn save_tasks(&self, data: &TasksFile) -> Result<(), StorageError> {
        self.ensure_dirs()?;
        self.write_tasks(data)
    }

    fn load_settings(&self) -> Settings {
        match self.read_settings() {
            Ok(settings) => settings.normalized(),
            Err(StorageError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
                Settings::default()
            }
            Err(err) => {
                log::warn!("load settings failed, using defaults: {err}");
                Settings::default()
            }
        }
    }

    fn save_settings(&self, settings: &Settings) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root)?;
        self.write_settings(settings)
    }
}

/// Writes through a sibling temp file and renames it into place.
pub fn write_atomic_bytes(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let temp_path = path.with_extension("tmp");
    {
        let mut file = File::create(&temp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(temp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::models::TaskState;
    use crate::test_support::{at, make_task};

    fn sample_store() -> TaskStore {
        let mut pending = make_task("p", Some("2024-07-01 10:00"));
        pending.tags = vec!["a".into(), "b".into()];
        pending.category = "work".into();
        let overdue = make_task("o", Some("2024-01-01"));
        let mut done = make_task("d", None);
        done.done_time = Some("2024-02-01 12:00:00".into());
        TaskStore::from_file(TasksFile {
            pending: vec![pending],
            overdue: vec![overdue],
            done: vec![done],
        })
    }

    #[test]
    fn missing_files_load_as_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf());
        assert!(storage.load_tasks().is_empty());
        assert_eq!(storage.load_settings(), Settings::default());
    }

    #[test]
    fn corrupt_files_fail_soft() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(DATA_FILE), "{ not json").unwrap();
        fs::write(dir.path().join(SETTINGS_FILE), "[]").unwrap();
        let storage = Storage::new(dir.path().to_path_buf());
        assert!(storage.read_tasks().is_err());
        assert!(storage.load_tasks().is_empty());
        assert_eq!(storage.load_settings(), Settings::default());
    }

    #[test]
    fn save_then_load_round_trips_field_for_field() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf());
        let store = sample_store();

        storage.save_tasks(&store.to_file()).unwrap();
        let loaded = storage.load_tasks();
        assert_eq!(loaded, store);
        assert_eq!(loaded.state_of("o"), Some(TaskState::Overdue));

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join(DATA_FILE)).unwrap())
                .unwrap();
        assert!(raw["pending"].is_array());
        assert_eq!(raw["done"][0]["deadline"], "no deadline");
        assert_eq!(raw["done"][0]["done_time"], "2024-02-01 12:00:00");
        assert!(raw["pending"][0].get("done_time").is_none());
        assert!(!dir.path().join("data.tmp").exists());
    }

    #[test]
    fn loads_files_written_by_older_versions() {
        let dir = tempfile::tempdir().unwrap();
        let legacy = r#"{
          "todo": [{ "name": "a", "deadline": "2024-01-01 10:00", "importance": 3, "urgency": 2,
                     "create_time": "2023-12-30 08:00:00" }],
          "done": [{ "name": "b", "deadline": "无截止日期", "importance": 1, "urgency": 5,
                     "create_time": "2023-12-30 08:00:00", "done_time": "2023-12-31 08:00:00" }],
          "overdue": []
        }"#;
        fs::write(dir.path().join(DATA_FILE), legacy).unwrap();
        let storage = Storage::new(dir.path().to_path_buf());
        let store = storage.load_tasks();
        assert_eq!(store.partition(TaskState::Pending).len(), 1);
        assert_eq!(store.partition(TaskState::Done)[0].deadline, None);
        assert_eq!(store.total_tasks(), 2);
    }

    #[test]
    fn settings_round_trip_and_clamp_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf());
        let settings = Settings {
            refresh_interval_seconds: 120,
            categories: vec!["work".into()],
            tags: vec!["urgent".into()],
            show_notifications: false,
        };
        storage.save_settings(&settings).unwrap();
        assert_eq!(storage.load_settings(), settings);

        fs::write(
            dir.path().join(SETTINGS_FILE),
            r#"{ "update_interval": 99999 }"#,
        )
        .unwrap();
        assert_eq!(storage.load_settings().refresh_interval_seconds, 3600);
    }

    #[test]
    fn first_save_of_the_day_creates_one_backup() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(FixedClock::new(at(2024, 3, 1, 23, 58, 0)));
        let storage = Storage::with_clock(dir.path().to_path_buf(), clock.clone());
        let store = sample_store();

        storage.save_tasks(&store.to_file()).unwrap();
        assert!(storage.list_backups().unwrap().is_empty());

        storage.save_tasks(&store.to_file()).unwrap();
        clock.advance(chrono::Duration::minutes(1));
        storage.save_tasks(&TasksFile::default()).unwrap();
        let backups = storage.list_backups().unwrap();
        assert_eq!(backups.len(), 1);
        assert_eq!(backups[0].name, "data-20240301-235800.json");

        let restored = storage.restore_backup(&backups[0].name).unwrap();
        assert_eq!(TaskStore::from_file(restored), store);
        assert_eq!(storage.load_tasks(), store);
    }

    #[test]
    fn backup_day_follows_the_injected_clock() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(FixedClock::new(at(2024, 3, 1, 23, 59, 30)));
        let storage = Storage::with_clock(dir.path().to_path_buf(), clock.clone());
        let store = sample_store();

        storage.save_tasks(&store.to_file()).unwrap();
        storage.save_tasks(&store.to_file()).unwrap();
        clock.advance(chrono::Duration::seconds(45));
        storage.save_tasks(&store.to_file()).unwrap();
        storage.save_tasks(&store.to_file()).unwrap();

        let names: Vec<_> = storage
            .list_backups()
            .unwrap()
            .into_iter()
            .map(|entry| entry.name)
            .collect();
        assert_eq!(
            names,
            vec!["data-20240301-235930.json", "data-20240302-000015.json"]
        );
    }

    #[test]
    fn trim_keeps_newest_backups() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf());
        storage.ensure_dirs().unwrap();
        for day in 1..=7 {
            let name = format!("data-202401{day:02}-120000.json");
            fs::write(dir.path().join(BACKUP_DIR).join(name), "{}").unwrap();
        }
        storage.trim_backups().unwrap();
        let names: Vec<_> = storage
            .list_backups()
            .unwrap()
            .into_iter()
            .map(|entry| entry.name)
            .collect();
        assert_eq!(names.len(), BACKUP_LIMIT);
        assert_eq!(names[0], "data-20240103-120000.json");
    }

    #[test]
    fn restore_rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf());
        assert!(matches!(
            storage.restore_backup("../data.json"),
            Err(StorageError::BackupName(_))
        ));
    }
}
