//! Runtime configuration.
//!
//! Values come from command-line flags or their environment variables (see
//! [`crate::cli::GlobalArgs`]); anything unset falls back to platform paths.

use std::path::PathBuf;
use std::time::Duration;

use crate::downloader::tools::{resolve_bin_dir, ToolLocator};

/// Application directory name under the platform config dir
pub const APP_DIR_NAME: &str = "tubegrab";

/// Settings file name, one JSON object
pub const SETTINGS_FILE_NAME: &str = "config.json";

pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 120;

/// Where the bundled executables live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Running from a source checkout, tools under `./bin`
    Development,
    /// Installed build, tools under `resources/bin` next to the executable
    #[default]
    Packaged,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub run_mode: RunMode,
    pub bin_dir: Option<PathBuf>,
    pub settings_path: PathBuf,
    pub probe_timeout: Duration,
}

impl AppConfig {
    pub fn tool_locator(&self) -> ToolLocator {
        ToolLocator::new(resolve_bin_dir(self.run_mode, self.bin_dir.as_deref()))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            run_mode: RunMode::default(),
            bin_dir: None,
            settings_path: default_settings_path(),
            probe_timeout: Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS),
        }
    }
}

/// `<config dir>/tubegrab/config.json`
pub fn default_settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
        .join(SETTINGS_FILE_NAME)
}

/// The user's downloads folder, used when no destination was saved yet
pub fn default_download_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join("Downloads")))
        .unwrap_or_else(|| PathBuf::from("."))
}
