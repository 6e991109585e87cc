// Entry point: wires config, logging, the download folder and the console
// chat together, then serves actions until the operator quits.
mod bot;
mod config;
mod console;
mod error;
mod loader;
mod navigator;
mod output;
mod reports;
mod source;
mod types;
mod util;

use bot::{Action, Bot};
use config::Config;
use console::{ChatUi, ConsoleUi};
use error::Result;
use source::FolderSource;
use std::fs::{self, File};
use std::io;
use std::sync::Mutex;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

/// Log to stderr and to a per-day file under `log_dir`.
fn init_logging(cfg: &Config) -> Result<()> {
    fs::create_dir_all(&cfg.log_dir)?;
    let file_name = format!("bot_log_{}.log", chrono::Local::now().format("%Y-%m-%d"));
    let file = File::options()
        .create(true)
        .append(true)
        .open(cfg.log_dir.join(file_name))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(io::stderr.and(Mutex::new(file)))
        .try_init();
    Ok(())
}

fn run() -> Result<()> {
    let cfg = config::init()?;
    init_logging(cfg)?;
    tracing::info!(
        download_dir = %cfg.download_dir.display(),
        page_size = cfg.page_size,
        "bot started"
    );

    let bot = Bot::new(FolderSource::from_config(cfg), cfg.page_size)
        .with_export_dir(cfg.export_dir.clone());
    let stdin = io::stdin();
    let mut ui = ConsoleUi::new(stdin.lock(), io::stdout());

    ui.send(&bot.dispatch(&Action::Start));
    while let Some(action) = ui.next_action() {
        let reply = bot.dispatch(&action);
        ui.send(&reply);
    }
    tracing::info!("bot stopped");
    Ok(())
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Failed to start: {}", e);
        std::process::exit(1);
    }
}
