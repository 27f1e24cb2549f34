// Common data models for downloader

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Output format picked by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MediaFormat {
    /// Best video + best audio merged into an mp4 container
    #[default]
    #[serde(rename = "mp4")]
    Video,
    /// Audio extracted to mp3
    #[serde(rename = "mp3")]
    Audio,
}

impl MediaFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "mp4",
            Self::Audio => "mp3",
        }
    }

    pub fn is_audio(&self) -> bool {
        matches!(self, Self::Audio)
    }
}

impl fmt::Display for MediaFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One download request coming from the UI layer
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub url: String,
    pub format: MediaFormat,
    /// Reserved, yt-dlp always picks the best quality
    pub quality: Option<String>,
    pub destination: PathBuf,
}

impl DownloadRequest {
    pub fn new(url: impl Into<String>, format: MediaFormat, destination: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            format,
            quality: None,
            destination: destination.into(),
        }
    }
}

/// Outcome of a finished download
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadResult {
    pub success: bool,
    pub title: String,
    pub file_path: String,
}

/// Subset of `yt-dlp --dump-json` we care about
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VideoInfo {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub ext: Option<String>,
}

impl VideoInfo {
    pub fn parse(stdout: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(stdout.trim())
    }

    /// Probed title, or "Unknown" when yt-dlp gave nothing useful
    pub fn display_title(&self) -> String {
        non_empty(self.title.as_deref()).unwrap_or("Unknown").to_string()
    }

    /// Extension used when the final path has to be rebuilt.
    /// Audio is always converted to mp3; video keeps the probed container.
    pub fn bookkeeping_ext(&self, format: MediaFormat) -> String {
        if format.is_audio() {
            return MediaFormat::Audio.as_str().to_string();
        }
        non_empty(self.ext.as_deref())
            .unwrap_or(MediaFormat::Video.as_str())
            .to_string()
    }

    /// `<destination>/<title>.<ext>`
    pub fn reconstruct_path(&self, destination: &Path, format: MediaFormat) -> PathBuf {
        destination.join(format!("{}.{}", self.display_title(), self.bookkeeping_ext(format)))
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}
