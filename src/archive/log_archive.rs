use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use log::{debug, error, info, warn};

use crate::error::PersistenceError;
use crate::models::log_entry::LogEntry;
use crate::models::process::ProcessInfo;

/// Append-only run history, one JSON document per job id.
pub struct LogArchive {
    dir: PathBuf,
    entries: HashMap<String, Vec<LogEntry>>,
}

impl LogArchive {
    /// Opens the archive directory and loads every persisted history.
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        if let Err(e) = fs::create_dir_all(&dir) {
            error!("Cannot create logs directory {}: {}", dir.display(), e);
        }
        let mut archive = Self {
            dir,
            entries: HashMap::new(),
        };
        archive.reload();
        archive
    }

    fn reload(&mut self) {
        let read_dir = match fs::read_dir(&self.dir) {
            Ok(read_dir) => read_dir,
            Err(e) => {
                error!("Cannot list logs directory {}: {}", self.dir.display(), e);
                return;
            }
        };
        for dir_entry in read_dir.flatten() {
            let path = dir_entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            match read_history(&path) {
                Ok(history) => {
                    debug!("Loaded {} log entries for '{}'", history.len(), id);
                    self.entries.insert(id.to_string(), history);
                }
                Err(e) => warn!("Ignoring unreadable history: {}", e),
            }
        }
        info!("Loaded run history for {} jobs", self.entries.len());
    }

    /// Records a terminal snapshot. Disk failures are logged; the in-memory
    /// history is updated regardless.
    pub fn append(&mut self, snapshot: &ProcessInfo) -> &LogEntry {
        let created_at = Utc::now();
        let path = self.path_for(&snapshot.id);
        let history = self.entries.entry(snapshot.id.clone()).or_default();

        let base = format!("{}_{}", snapshot.id, created_at.timestamp_millis());
        let mut log_id = base.clone();
        let mut suffix = 1;
        while history.iter().any(|entry| entry.log_id == log_id) {
            log_id = format!("{}_{}", base, suffix);
            suffix += 1;
        }

        history.push(LogEntry::from_snapshot(log_id, snapshot, created_at));
        if let Err(e) = write_history(&path, history) {
            error!("Failed to persist history for '{}': {}", snapshot.id, e);
        }
        let last = history.len() - 1;
        &history[last]
    }

    pub fn list_for(&self, id: &str) -> &[LogEntry] {
        self.entries.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn get(&self, id: &str, log_id: &str) -> Option<&LogEntry> {
        self.list_for(id).iter().find(|entry| entry.log_id == log_id)
    }

    pub fn latest_for(&self, id: &str) -> Option<&LogEntry> {
        self.list_for(id).last()
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }
}

fn read_history(path: &Path) -> Result<Vec<LogEntry>, PersistenceError> {
    let content = fs::read_to_string(path).map_err(|source| PersistenceError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| PersistenceError::Serde {
        path: path.to_path_buf(),
        source,
    })
}

fn write_history(path: &Path, history: &[LogEntry]) -> Result<(), PersistenceError> {
    let json = serde_json::to_string_pretty(history).map_err(|source| PersistenceError::Serde {
        path: path.to_path_buf(),
        source,
    })?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json)
        .and_then(|_| fs::rename(&tmp, path))
        .map_err(|source| PersistenceError::Write {
            path: path.to_path_buf(),
            source,
        })
}
