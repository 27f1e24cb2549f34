// Downloader module - drives yt-dlp and reports progress

pub mod errors;
pub mod models;
pub mod orchestrator;
pub mod parser;
pub mod progress;
pub mod tools;
pub mod utils;

pub use errors::DownloadError;
pub use models::{DownloadRequest, DownloadResult, MediaFormat, VideoInfo};
pub use orchestrator::Downloader;
pub use progress::{ProgressEmitter, ProgressSubscription};
pub use tools::{ToolInfo, ToolLocator, ToolPaths, ToolType};
