// Where the spreadsheets come from. The real download is done by an external
// tool that drops files into a folder; this side only waits for them.
use crate::config::Config;
use crate::error::{AppError, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::thread;
use std::time::{Duration, SystemTime};

/// Files making up one load.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFiles {
    pub sheet: PathBuf,
    pub mapping: PathBuf,
}

pub trait DataSource {
    fn fetch(&self) -> Result<SourceFiles>;
}

/// Suffixes browsers and office tools use while a file is still being written.
const PARTIAL_SUFFIXES: [&str; 3] = [".crdownload", ".part", ".tmp"];

pub struct FolderSource {
    dir: PathBuf,
    mapping_file: String,
    attempts: u32,
    backoff: Duration,
    command: Option<String>,
}

impl FolderSource {
    pub fn new(dir: impl Into<PathBuf>, mapping_file: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            mapping_file: mapping_file.into(),
            attempts: 10,
            backoff: Duration::from_secs(1),
            command: None,
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        let mut source = Self::new(cfg.download_dir.clone(), cfg.mapping_file.clone())
            .with_polling(cfg.fetch_attempts, cfg.fetch_backoff);
        source.command = cfg.download_command.clone();
        source
    }

    pub fn with_polling(mut self, attempts: u32, backoff: Duration) -> Self {
        self.attempts = attempts.max(1);
        self.backoff = backoff;
        self
    }

    /// Run the configured download tool. A failing tool is logged, not fatal:
    /// an earlier download may still be in the folder.
    fn run_download_command(&self, command: &str) {
        tracing::info!(%command, "running download command");
        let status = if cfg!(windows) {
            Command::new("cmd").args(["/C", command]).status()
        } else {
            Command::new("sh").args(["-c", command]).status()
        };
        match status {
            Ok(s) if s.success() => tracing::info!("download command finished"),
            Ok(s) => tracing::warn!(code = ?s.code(), "download command failed"),
            Err(e) => tracing::warn!(error = %e, "could not start download command"),
        }
    }

    fn is_candidate(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        let lower = name.to_lowercase();
        name != self.mapping_file
            && !name.starts_with("~$")
            && !name.starts_with('.')
            && !PARTIAL_SUFFIXES.iter().any(|s| lower.ends_with(s))
    }

    /// Most recently modified finished file in the folder, if any.
    pub fn latest_file(&self) -> Result<Option<PathBuf>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut best: Option<(SystemTime, PathBuf)> = None;
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            let meta = entry.metadata()?;
            if !meta.is_file() || !self.is_candidate(&path) {
                continue;
            }
            let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            if best.as_ref().map_or(true, |(t, _)| modified > *t) {
                best = Some((modified, path));
            }
        }
        Ok(best.map(|(_, p)| p))
    }
}

impl DataSource for FolderSource {
    fn fetch(&self) -> Result<SourceFiles> {
        if let Some(command) = &self.command {
            self.run_download_command(command);
        }
        for attempt in 1..=self.attempts {
            if let Some(sheet) = self.latest_file()? {
                tracing::info!(path = %sheet.display(), attempt, "found downloaded file");
                return Ok(SourceFiles {
                    sheet,
                    mapping: self.dir.join(&self.mapping_file),
                });
            }
            tracing::debug!(attempt, "no downloaded file yet");
            if attempt < self.attempts {
                thread::sleep(self.backoff);
            }
        }
        Err(AppError::NoFileAvailable { attempts: self.attempts })
    }
}
