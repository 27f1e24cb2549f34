pub mod cli;
pub mod commands;
pub mod config;
pub mod downloader;
pub mod logging;
pub mod settings;

use anyhow::Result;
use clap::Parser;

use crate::cli::Cli;
use crate::commands::App;
use crate::settings::JsonFileStore;

/// Parse arguments, wire the store and downloader together, run one command
pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(cli.global.verbose);

    let config = cli.global.to_config();
    tracing::debug!(?config, "configuration loaded");

    let store = JsonFileStore::new(&config.settings_path);
    let app = App::from_config(&config, store);

    cli::execute(&app, cli.command).await
}
