//! Command-line front end.
//!
//! Stands in for the desktop window: every subcommand maps onto one of the
//! operations in [`crate::commands`].

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};

use crate::commands::App;
use crate::config::{default_settings_path, AppConfig, RunMode, DEFAULT_PROBE_TIMEOUT_SECS};
use crate::downloader::{DownloadRequest, MediaFormat};
use crate::settings::{SettingsPatch, SettingsStore};

#[derive(Debug, Parser)]
#[command(name = "tubegrab", version, about = "Download YouTube videos or audio with yt-dlp")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Look for yt-dlp/ffmpeg in ./bin instead of the install's resources/bin
    #[arg(long, env = "TUBEGRAB_DEV", global = true)]
    pub dev: bool,

    /// Directory containing yt-dlp and ffmpeg (overrides --dev)
    #[arg(long, env = "TUBEGRAB_BIN_DIR", global = true)]
    pub bin_dir: Option<PathBuf>,

    /// Settings file to use
    #[arg(long, env = "TUBEGRAB_SETTINGS", global = true)]
    pub settings: Option<PathBuf>,

    /// Seconds to wait for the metadata probe
    #[arg(long, env = "TUBEGRAB_PROBE_TIMEOUT", default_value_t = DEFAULT_PROBE_TIMEOUT_SECS, global = true)]
    pub probe_timeout: u64,

    /// More logging (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
}

impl GlobalArgs {
    pub fn to_config(&self) -> AppConfig {
        AppConfig {
            run_mode: if self.dev {
                RunMode::Development
            } else {
                RunMode::Packaged
            },
            bin_dir: self.bin_dir.clone(),
            settings_path: self.settings.clone().unwrap_or_else(default_settings_path),
            probe_timeout: Duration::from_secs(self.probe_timeout),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    /// Video (best video + best audio, merged to mp4)
    Mp4,
    /// Audio only, converted to mp3
    Mp3,
}

impl From<FormatArg> for MediaFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Mp4 => MediaFormat::Video,
            FormatArg::Mp3 => MediaFormat::Audio,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Download a video and add it to the history
    Download {
        url: String,
        /// Output format, defaults to the last one used
        #[arg(short, long, value_enum)]
        format: Option<FormatArg>,
        /// Destination folder, defaults to the saved one
        #[arg(short, long)]
        dest: Option<PathBuf>,
    },
    /// Show or change saved settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// Inspect the download history
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
    /// Print whether a path exists
    Exists { path: PathBuf },
    /// Show where yt-dlp and ffmpeg are expected and their versions
    Tools,
}

#[derive(Debug, Subcommand)]
pub enum SettingsAction {
    Show,
    Set {
        #[arg(long)]
        destination: Option<String>,
        #[arg(long, value_enum)]
        format: Option<FormatArg>,
    },
}

#[derive(Debug, Subcommand)]
pub enum HistoryAction {
    List,
    Clear,
    /// Open the folder containing a downloaded file
    Open { id: i64 },
}

pub async fn execute<S: SettingsStore>(app: &App<S>, command: Command) -> Result<()> {
    match command {
        Command::Download { url, format, dest } => download(app, url, format, dest).await,
        Command::Settings { action } => settings(app, action),
        Command::History { action } => history(app, action),
        Command::Exists { path } => {
            println!("{}", app.path_exists(&path));
            Ok(())
        }
        Command::Tools => {
            for tool in app.tool_status().await {
                println!(
                    "{:<8} {:<10} {:<24} {}",
                    tool.name,
                    if tool.is_available { "found" } else { "missing" },
                    tool.version.as_deref().unwrap_or("-"),
                    tool.path.display()
                );
            }
            Ok(())
        }
    }
}

async fn download<S: SettingsStore>(
    app: &App<S>,
    url: String,
    format: Option<FormatArg>,
    dest: Option<PathBuf>,
) -> Result<()> {
    let settings = app.get_settings();
    let format = format.map(MediaFormat::from).unwrap_or(settings.last_format);
    let destination = dest.unwrap_or_else(|| PathBuf::from(&settings.destination));
    let request = DownloadRequest::new(url, format, destination);

    let bar = progress_bar();
    let mut subscription = app.subscribe_progress();

    let download = app.download(&request);
    tokio::pin!(download);

    let outcome = loop {
        tokio::select! {
            result = &mut download => break Some(result),
            Some(percent) = subscription.next() => show_progress(&bar, percent),
            _ = tokio::signal::ctrl_c() => break None,
        }
    };
    while let Some(percent) = subscription.try_next() {
        show_progress(&bar, percent);
    }
    subscription.unsubscribe();

    let Some(outcome) = outcome else {
        bar.abandon_with_message("cancelled");
        anyhow::bail!("download cancelled");
    };

    match outcome {
        Ok(result) => {
            bar.finish_and_clear();
            app.record_download(&request, &result)
                .context("download finished but the history could not be saved")?;
            println!("Downloaded \"{}\" to {}", result.title, result.file_path);
            Ok(())
        }
        Err(e) => {
            bar.abandon();
            Err(e.into())
        }
    }
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(1000);
    let style = ProgressStyle::with_template("{bar:40.cyan/blue} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    bar.set_message("starting...");
    bar
}

fn show_progress(bar: &ProgressBar, percent: f64) {
    bar.set_position((percent.clamp(0.0, 100.0) * 10.0).round() as u64);
    bar.set_message(format!("{percent:.1}%"));
}

fn settings<S: SettingsStore>(app: &App<S>, action: SettingsAction) -> Result<()> {
    match action {
        SettingsAction::Show => {
            let settings = app.get_settings();
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
        SettingsAction::Set {
            destination,
            format,
        } => {
            app.save_settings(&SettingsPatch {
                destination,
                last_format: format.map(MediaFormat::from),
                history: None,
            })
            .context("failed to save settings")?;
        }
    }
    Ok(())
}

fn history<S: SettingsStore>(app: &App<S>, action: HistoryAction) -> Result<()> {
    match action {
        HistoryAction::List => {
            let history = app.get_settings().history;
            if history.is_empty() {
                println!("No downloads yet");
            }
            for entry in history {
                let on_disk = app.path_exists(entry.file_path.as_ref());
                println!(
                    "{}  {}  {}  {}  {}  {}",
                    entry.id,
                    entry.date,
                    entry.format,
                    if on_disk { "ok  " } else { "gone" },
                    entry.title,
                    entry.file_path
                );
            }
        }
        HistoryAction::Clear => {
            app.clear_history().context("failed to clear history")?;
        }
        HistoryAction::Open { id } => {
            let entry = app
                .find_history_entry(id)
                .with_context(|| format!("no history entry with id {id}"))?;
            let opened = app
                .open_history_entry(&entry)
                .with_context(|| format!("failed to open folder for {}", entry.file_path))?;
            if !opened {
                anyhow::bail!("{} no longer exists", entry.file_path);
            }
        }
    }
    Ok(())
}
