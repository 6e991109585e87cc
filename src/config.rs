// Runtime settings, read once from the environment (and `.env` if present).
use crate::error::{AppError, Result};
use once_cell::sync::OnceCell;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

static CONFIG: OnceCell<Config> = OnceCell::new();

#[derive(Debug, Clone)]
pub struct Config {
    pub download_dir: PathBuf,
    pub mapping_file: String,
    pub page_size: usize,
    pub fetch_attempts: u32,
    pub fetch_backoff: Duration,
    pub download_command: Option<String>,
    pub log_dir: PathBuf,
    pub export_dir: Option<PathBuf>,
}

impl Config {
    /// Build a config from an arbitrary variable lookup. `from_env` passes
    /// `std::env::var`; tests pass a map.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            download_dir: PathBuf::from(
                non_empty("DOWNLOAD_DIR").unwrap_or_else(|| "data".to_string()),
            ),
            mapping_file: non_empty("MAPPING_FILE")
                .unwrap_or_else(|| "parking_mapping.csv".to_string()),
            page_size: parse_number(&lookup, "PAGE_SIZE", 5usize)?,
            fetch_attempts: parse_number(&lookup, "FETCH_ATTEMPTS", 10u32)?,
            fetch_backoff: Duration::from_millis(parse_number(
                &lookup,
                "FETCH_BACKOFF_MS",
                1000u64,
            )?),
            download_command: non_empty("DOWNLOAD_COMMAND"),
            log_dir: PathBuf::from(non_empty("LOG_DIR").unwrap_or_else(|| "logs".to_string())),
            export_dir: non_empty("REPORT_EXPORT_DIR").map(PathBuf::from),
        })
    }

    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }
}

fn parse_number<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("{key} must be a number, got {raw:?}"))),
        _ => Ok(default),
    }
}

/// Load the process-wide config on first call and hand out the shared copy.
pub fn init() -> Result<&'static Config> {
    CONFIG.get_or_try_init(Config::from_env)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = config_from(&[]).unwrap();
        assert_eq!(cfg.page_size, 5);
        assert_eq!(cfg.fetch_attempts, 10);
        assert_eq!(cfg.fetch_backoff, Duration::from_millis(1000));
        assert_eq!(cfg.download_dir, PathBuf::from("data"));
        assert_eq!(cfg.mapping_file, "parking_mapping.csv");
        assert!(cfg.download_command.is_none());
        assert!(cfg.export_dir.is_none());
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = config_from(&[
            ("PAGE_SIZE", "8"),
            ("FETCH_ATTEMPTS", " 3 "),
            ("DOWNLOAD_DIR", "/tmp/sheets"),
            ("REPORT_EXPORT_DIR", "/tmp/out"),
        ])
        .unwrap();
        assert_eq!(cfg.page_size, 8);
        assert_eq!(cfg.fetch_attempts, 3);
        assert_eq!(cfg.download_dir, PathBuf::from("/tmp/sheets"));
        assert_eq!(cfg.export_dir, Some(PathBuf::from("/tmp/out")));
    }

    #[test]
    fn bad_number_is_a_config_error() {
        let err = config_from(&[("PAGE_SIZE", "five")]).unwrap_err();
        assert!(matches!(err, AppError::Config(msg) if msg.contains("PAGE_SIZE")));
    }
}
