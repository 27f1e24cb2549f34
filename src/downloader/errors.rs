// Error types for the download pipeline

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DownloadError {
    /// yt-dlp is missing at the resolved location
    #[error("{tool} not found at {}", path.display())]
    BinaryNotFound { tool: &'static str, path: PathBuf },

    /// URL rejected before anything runs
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Metadata probe failed or printed something we could not parse
    #[error("Failed to read video info: {0}")]
    Probe(String),

    /// The download process failed
    #[error("Download failed: {0}")]
    Download(String),
}

impl DownloadError {
    /// Short machine-friendly tag, used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BinaryNotFound { .. } => "binary_not_found",
            Self::InvalidUrl(_) => "invalid_url",
            Self::Probe(_) => "probe",
            Self::Download(_) => "download",
        }
    }
}
