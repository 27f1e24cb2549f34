// Locating the bundled yt-dlp / ffmpeg executables

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;

use super::errors::DownloadError;
use super::utils::{path_exists, run_output_with_timeout};
use crate::config::RunMode;

const VERSION_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum ToolType {
    YtDlp,
    Ffmpeg,
}

impl ToolType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolType::YtDlp => "yt-dlp",
            ToolType::Ffmpeg => "ffmpeg",
        }
    }

    /// Executable file name on this platform
    pub fn file_name(&self) -> String {
        if cfg!(windows) {
            format!("{}.exe", self.as_str())
        } else {
            self.as_str().to_string()
        }
    }

    fn version_arg(&self) -> &'static str {
        match self {
            ToolType::YtDlp => "--version",
            ToolType::Ffmpeg => "-version", // ffmpeg uses a single dash
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub tool_type: ToolType,
    pub version: Option<String>,
    pub path: PathBuf,
    pub is_available: bool,
}

/// Absolute executable paths for one download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub ytdlp: PathBuf,
    pub ffmpeg: PathBuf,
}

/// Directory holding the executables for the given run mode.
///
/// An explicit directory always wins. Development builds use `./bin` under
/// the working directory, packaged installs use `resources/bin` next to the
/// running executable.
pub fn resolve_bin_dir(run_mode: RunMode, explicit: Option<&Path>) -> PathBuf {
    if let Some(dir) = explicit {
        return dir.to_path_buf();
    }
    match run_mode {
        RunMode::Development => std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join("bin"),
        RunMode::Packaged => std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("resources")
            .join("bin"),
    }
}

#[derive(Debug, Clone)]
pub struct ToolLocator {
    bin_dir: PathBuf,
}

impl ToolLocator {
    pub fn new(bin_dir: impl Into<PathBuf>) -> Self {
        Self {
            bin_dir: bin_dir.into(),
        }
    }

    pub fn bin_dir(&self) -> &Path {
        &self.bin_dir
    }

    pub fn path_of(&self, tool: ToolType) -> PathBuf {
        self.bin_dir.join(tool.file_name())
    }

    /// Paths for both executables. Only yt-dlp has to exist; ffmpeg is just
    /// handed to yt-dlp, which complains on its own if it needs it.
    pub fn resolve(&self) -> Result<ToolPaths, DownloadError> {
        let ytdlp = self.path_of(ToolType::YtDlp);
        let ffmpeg = self.path_of(ToolType::Ffmpeg);

        tracing::debug!(ytdlp = %ytdlp.display(), ffmpeg = %ffmpeg.display(), "resolved tool paths");

        if !path_exists(&ytdlp) {
            return Err(DownloadError::BinaryNotFound {
                tool: ToolType::YtDlp.as_str(),
                path: ytdlp,
            });
        }

        Ok(ToolPaths { ytdlp, ffmpeg })
    }

    pub async fn tool_info(&self, tool_type: ToolType) -> ToolInfo {
        let path = self.path_of(tool_type);
        let is_available = path_exists(&path);
        let version = if is_available {
            self.get_version(&path, tool_type).await
        } else {
            None
        };

        ToolInfo {
            name: tool_type.as_str().to_string(),
            tool_type,
            version,
            path,
            is_available,
        }
    }

    pub async fn get_all_tools(&self) -> Vec<ToolInfo> {
        vec![
            self.tool_info(ToolType::YtDlp).await,
            self.tool_info(ToolType::Ffmpeg).await,
        ]
    }

    async fn get_version(&self, path: &Path, tool_type: ToolType) -> Option<String> {
        let args = vec![tool_type.version_arg().to_string()];
        match run_output_with_timeout(path, &args, VERSION_TIMEOUT).await {
            Ok(output) if output.status.success() => {
                // ffmpeg prints a banner; the first line carries the version
                String::from_utf8_lossy(&output.stdout)
                    .lines()
                    .next()
                    .map(|line| line.trim().to_string())
                    .filter(|line| !line.is_empty())
            }
            Ok(output) => {
                tracing::warn!(tool = tool_type.as_str(), status = %output.status, "version query failed");
                None
            }
            Err(e) => {
                tracing::warn!(tool = tool_type.as_str(), error = %e, "version query failed");
                None
            }
        }
    }
}
