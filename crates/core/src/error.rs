//! Typed error kinds. Startup errors are fatal and map to process exit
//! codes in the server binary; search errors are contained to one query.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration file problems. Fatal at startup (exit code 1).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("missing required key `{0}`")]
    MissingKey(&'static str),

    #[error("key `{key}` is not a boolean: `{value}` (expected true or false)")]
    BadBool { key: &'static str, value: String },

    #[error("`PORT` is not a valid port (1-65535): `{0}`")]
    BadPort(String),

    #[error("`linuxpath` does not resolve to a readable regular file: {0}")]
    BadCorpusPath(PathBuf),

    #[error("unknown search algorithm `{0}`")]
    UnknownAlgorithm(String),
}

/// Corpus open/read problems at index build time. Fatal at startup
/// (exit code 4).
#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("could not open corpus {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not read corpus {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Per-query search failures. The connection answers `ERROR` (or
/// `STRING NOT FOUND` for contained worker panics); the server keeps running.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("scan failed on {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Corpus(#[from] CorpusError),

    #[error("search worker panicked")]
    WorkerPanic,
}

impl SearchError {
    /// Stable identifier for the `err_kind` query-log field.
    pub fn kind(&self) -> &'static str {
        match self {
            SearchError::Scan { .. } => "scan_io",
            SearchError::Corpus(_) => "corpus_io",
            SearchError::WorkerPanic => "worker_panic",
        }
    }
}
