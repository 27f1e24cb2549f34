//! Operations exposed to the front end.
//!
//! These mirror what the desktop UI used to call: read/write settings, start a
//! download, watch its progress, and inspect or open entries of the history.

use std::io;
use std::path::Path;

use regex::Regex;

use crate::config::AppConfig;
use crate::downloader::utils::{containing_folder, open_folder, path_exists};
use crate::downloader::{
    DownloadError, DownloadRequest, DownloadResult, Downloader, ProgressEmitter,
    ProgressSubscription, ToolInfo,
};
use crate::settings::{HistoryEntry, Settings, SettingsError, SettingsPatch, SettingsStore};

lazy_static::lazy_static! {
    static ref YOUTUBE_URL_RE: Regex =
        Regex::new(r"^(https?://)?(www\.)?(youtube\.com|youtu\.be)/.+").unwrap();
}

/// `youtube.com/...` or `youtu.be/...`, scheme and `www.` optional
pub fn is_valid_youtube_url(url: &str) -> bool {
    YOUTUBE_URL_RE.is_match(url.trim())
}

pub struct App<S: SettingsStore> {
    store: S,
    downloader: Downloader,
    progress: ProgressEmitter,
}

impl<S: SettingsStore> App<S> {
    pub fn new(store: S, downloader: Downloader) -> Self {
        Self {
            store,
            downloader,
            progress: ProgressEmitter::new(),
        }
    }

    pub fn from_config(config: &AppConfig, store: S) -> Self {
        Self::new(
            store,
            Downloader::new(config.tool_locator(), config.probe_timeout),
        )
    }

    pub fn get_settings(&self) -> Settings {
        self.store.load()
    }

    pub fn save_settings(&self, patch: &SettingsPatch) -> Result<(), SettingsError> {
        self.store.save(patch)
    }

    /// Start listening to progress of downloads run through this app
    pub fn subscribe_progress(&self) -> ProgressSubscription {
        self.progress.subscribe()
    }

    pub async fn download(&self, request: &DownloadRequest) -> Result<DownloadResult, DownloadError> {
        if !is_valid_youtube_url(&request.url) {
            return Err(DownloadError::InvalidUrl(request.url.clone()));
        }

        self.downloader
            .download(request, &self.progress)
            .await
            .map_err(|e| {
                tracing::error!(kind = e.kind(), error = %e, "download error");
                e
            })
    }

    /// Prepend a history entry for a finished download and remember the format
    pub fn record_download(
        &self,
        request: &DownloadRequest,
        result: &DownloadResult,
    ) -> Result<HistoryEntry, SettingsError> {
        let mut entry = HistoryEntry::new(result, &request.url, request.format);

        let mut history = self.store.load().history;
        // Ids are millisecond stamps; two downloads in the same millisecond
        // (or a clock step back) must still get distinct ids.
        if let Some(newest) = history.iter().map(|e| e.id).max() {
            if entry.id <= newest {
                entry.id = newest + 1;
            }
        }
        history.insert(0, entry.clone());

        self.store.save(&SettingsPatch {
            last_format: Some(request.format),
            history: Some(history),
            ..SettingsPatch::default()
        })?;
        Ok(entry)
    }

    pub fn clear_history(&self) -> Result<(), SettingsError> {
        self.store.save(&SettingsPatch {
            history: Some(Vec::new()),
            ..SettingsPatch::default()
        })
    }

    pub fn find_history_entry(&self, id: i64) -> Option<HistoryEntry> {
        self.store.load().history.into_iter().find(|e| e.id == id)
    }

    pub fn path_exists(&self, path: &Path) -> bool {
        path_exists(path)
    }

    pub fn open_containing_folder(&self, folder: &Path) -> io::Result<()> {
        open_folder(folder)
    }

    /// Open the folder holding a history entry's file.
    /// Returns `false` without opening anything if the path is gone.
    pub fn open_history_entry(&self, entry: &HistoryEntry) -> io::Result<bool> {
        if entry.file_path.is_empty() {
            return Ok(false);
        }

        let recorded = Path::new(&entry.file_path);
        if !path_exists(recorded) {
            tracing::info!(id = entry.id, path = %entry.file_path, "history entry no longer on disk");
            return Ok(false);
        }

        self.open_containing_folder(&containing_folder(recorded))?;
        Ok(true)
    }

    pub async fn tool_status(&self) -> Vec<ToolInfo> {
        self.downloader.locator().get_all_tools().await
    }
}
