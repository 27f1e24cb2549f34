//! Persisted settings and download history.
//!
//! The record is kept as an opaque JSON key/value object with three keys
//! (`destination`, `lastFormat`, `history`). Each key is read on its own, so a
//! missing or malformed key falls back to its default without affecting the
//! others. Saving merges only the keys present in the patch.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use time::macros::format_description;
use time::OffsetDateTime;

use crate::config::default_download_dir;
use crate::downloader::models::{DownloadResult, MediaFormat};

const KEY_DESTINATION: &str = "destination";
const KEY_LAST_FORMAT: &str = "lastFormat";
const KEY_HISTORY: &str = "history";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to write settings file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode settings: {0}")]
    Json(#[from] serde_json::Error),
}

/// The persisted record, with defaults already applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub destination: String,
    pub last_format: MediaFormat,
    /// Newest first
    pub history: Vec<HistoryEntry>,
}

/// Partial update for [`SettingsStore::save`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsPatch {
    pub destination: Option<String>,
    pub last_format: Option<MediaFormat>,
    pub history: Option<Vec<HistoryEntry>>,
}

/// One completed download
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub date: String,
    /// Old entries stored the folder under `path`
    #[serde(default, alias = "path")]
    pub file_path: String,
    #[serde(default)]
    pub format: MediaFormat,
}

impl HistoryEntry {
    /// Entry stamped with the current time. Falls back to `url` when the
    /// download produced no title.
    pub fn new(result: &DownloadResult, url: &str, format: MediaFormat) -> Self {
        let now = now_local();
        let title = if result.title.is_empty() {
            url.to_string()
        } else {
            result.title.clone()
        };

        Self {
            id: (now.unix_timestamp_nanos() / 1_000_000) as i64,
            title,
            date: format_date(now),
            file_path: result.file_path.clone(),
            format,
        }
    }
}

fn now_local() -> OffsetDateTime {
    // The local offset is unavailable on some platforms once threads exist
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

fn format_date(at: OffsetDateTime) -> String {
    let description = format_description!("[year]/[month]/[day] [hour]:[minute]:[second]");
    at.format(&description)
        .unwrap_or_else(|_| at.unix_timestamp().to_string())
}

/// Storage for [`Settings`]
pub trait SettingsStore: Send + Sync {
    /// Current record; defaults fill in anything missing
    fn load(&self) -> Settings;

    /// Merge the fields present in `patch` and persist
    fn save(&self, patch: &SettingsPatch) -> Result<(), SettingsError>;
}

/// Build [`Settings`] from the raw key/value map
fn settings_from_map(values: &Map<String, Value>, default_destination: &Path) -> Settings {
    let destination = read_key::<String>(values, KEY_DESTINATION)
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| default_destination.to_string_lossy().into_owned());
    let last_format = read_key::<MediaFormat>(values, KEY_LAST_FORMAT).unwrap_or_default();
    let history = read_history(values).0;

    Settings {
        destination,
        last_format,
        history,
    }
}

fn read_key<T: for<'de> Deserialize<'de>>(values: &Map<String, Value>, key: &str) -> Option<T> {
    let value = values.get(key)?;
    match serde_json::from_value(value.clone()) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            tracing::warn!(key, error = %e, "ignoring unreadable settings value");
            None
        }
    }
}

/// History entries that parse, plus the raw records that don't. One bad
/// record is skipped instead of taking the whole list with it.
fn read_history(values: &Map<String, Value>) -> (Vec<HistoryEntry>, Vec<Value>) {
    let Some(raw) = values.get(KEY_HISTORY) else {
        return (Vec::new(), Vec::new());
    };
    let Some(records) = raw.as_array() else {
        tracing::warn!(key = KEY_HISTORY, "ignoring history that is not a list");
        return (Vec::new(), Vec::new());
    };

    let mut entries = Vec::with_capacity(records.len());
    let mut unreadable = Vec::new();
    for (index, record) in records.iter().enumerate() {
        match serde_json::from_value::<HistoryEntry>(record.clone()) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                tracing::warn!(index, error = %e, "skipping unreadable history entry");
                unreadable.push(record.clone());
            }
        }
    }
    (entries, unreadable)
}

/// Apply a patch. An empty destination is treated as absent; an empty
/// history is a real value and clears the list. A non-empty history keeps
/// the stored records that could not be read, after the new entries.
fn merge_patch(values: &mut Map<String, Value>, patch: &SettingsPatch) -> Result<(), SettingsError> {
    if let Some(destination) = patch.destination.as_deref().filter(|d| !d.is_empty()) {
        values.insert(KEY_DESTINATION.into(), Value::String(destination.to_string()));
    }
    if let Some(format) = patch.last_format {
        values.insert(KEY_LAST_FORMAT.into(), serde_json::to_value(format)?);
    }
    if let Some(history) = &patch.history {
        let mut records = Vec::with_capacity(history.len());
        for entry in history {
            records.push(serde_json::to_value(entry)?);
        }
        if !history.is_empty() {
            records.extend(read_history(values).1);
        }
        values.insert(KEY_HISTORY.into(), Value::Array(records));
    }
    Ok(())
}

/// Settings in a single JSON file
pub struct JsonFileStore {
    path: PathBuf,
    default_destination: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_default_destination(path, default_download_dir())
    }

    pub fn with_default_destination(path: impl Into<PathBuf>, default_destination: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            default_destination: default_destination.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Map<String, Value> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Map::new(),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "cannot read settings, using defaults");
                return Map::new();
            }
        };

        match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(map)) => map,
            Ok(_) | Err(_) => {
                tracing::warn!(path = %self.path.display(), "settings file is corrupt, using defaults");
                Map::new()
            }
        }
    }

    fn write_map(&self, values: &Map<String, Value>) -> Result<(), SettingsError> {
        let io_err = |source| SettingsError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let body = serde_json::to_string_pretty(values)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, body).map_err(io_err)?;
        std::fs::rename(&tmp, &self.path).map_err(io_err)?;
        Ok(())
    }
}

impl SettingsStore for JsonFileStore {
    fn load(&self) -> Settings {
        settings_from_map(&self.read_map(), &self.default_destination)
    }

    fn save(&self, patch: &SettingsPatch) -> Result<(), SettingsError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut values = self.read_map();
        merge_patch(&mut values, patch)?;
        self.write_map(&values)?;
        tracing::debug!(path = %self.path.display(), "settings saved");
        Ok(())
    }
}

/// Settings kept in memory for the lifetime of the process
pub struct MemoryStore {
    values: Mutex<Map<String, Value>>,
    default_destination: PathBuf,
}

impl MemoryStore {
    pub fn new(default_destination: impl Into<PathBuf>) -> Self {
        Self {
            values: Mutex::new(Map::new()),
            default_destination: default_destination.into(),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(default_download_dir())
    }
}

impl SettingsStore for MemoryStore {
    fn load(&self) -> Settings {
        let values = self.values.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        settings_from_map(&values, &self.default_destination)
    }

    fn save(&self, patch: &SettingsPatch) -> Result<(), SettingsError> {
        let mut values = self.values.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        merge_patch(&mut values, patch)
    }
}
