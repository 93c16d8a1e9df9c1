//! `key=value` configuration file loader.
//!
//! Blank lines and `#` comments are ignored; whitespace around keys and
//! values is trimmed; unknown keys are skipped so old servers tolerate new
//! config files.

use crate::error::ConfigError;
use std::fs;
use std::path::{Path, PathBuf};

/// Validated server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the corpus file (`linuxpath`).
    pub corpus_path: PathBuf,
    /// `REREAD_ON_QUERY`: re-read the corpus on every query instead of
    /// building an index at startup.
    pub reread_on_query: bool,
    /// `USE_SSL`: wrap the listener in TLS.
    pub use_ssl: bool,
    /// `PORT`: TCP listen port, 1-65535.
    pub port: u16,
}

impl Config {
    /// Load and validate a config file. The corpus path must resolve to a
    /// readable regular file at load time.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Config::parse(&text)?;

        let readable = fs::File::open(&config.corpus_path).is_ok();
        let regular = fs::metadata(&config.corpus_path)
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !readable || !regular {
            return Err(ConfigError::BadCorpusPath(config.corpus_path));
        }
        Ok(config)
    }

    /// Parse config text without touching the filesystem.
    pub fn parse(text: &str) -> Result<Config, ConfigError> {
        let mut corpus_path: Option<PathBuf> = None;
        let mut reread_on_query: Option<bool> = None;
        let mut use_ssl: Option<bool> = None;
        let mut port: Option<u16> = None;

        for raw in text.lines() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let (key, value) = (key.trim(), value.trim());
            match key {
                "linuxpath" => corpus_path = Some(PathBuf::from(value)),
                "REREAD_ON_QUERY" => {
                    reread_on_query = Some(parse_bool("REREAD_ON_QUERY", value)?);
                }
                "USE_SSL" => use_ssl = Some(parse_bool("USE_SSL", value)?),
                "PORT" => port = Some(parse_port(value)?),
                _ => {}
            }
        }

        Ok(Config {
            corpus_path: corpus_path.ok_or(ConfigError::MissingKey("linuxpath"))?,
            reread_on_query: reread_on_query
                .ok_or(ConfigError::MissingKey("REREAD_ON_QUERY"))?,
            use_ssl: use_ssl.ok_or(ConfigError::MissingKey("USE_SSL"))?,
            port: port.ok_or(ConfigError::MissingKey("PORT"))?,
        })
    }
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    if value.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if value.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(ConfigError::BadBool { key, value: value.to_string() })
    }
}

fn parse_port(value: &str) -> Result<u16, ConfigError> {
    match value.parse::<u32>() {
        Ok(p) if (1..=65_535).contains(&p) => Ok(p as u16),
        _ => Err(ConfigError::BadPort(value.to_string())),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
