//! Core library for linesearch — corpus loading, membership indices,
//! reread-mode search algorithms, and the configuration loader.
//!
//! Everything here is synchronous; the server crate owns the reactor and
//! bridges into this code through its worker pool.

pub mod config;
pub mod corpus;
pub mod error;
pub mod index;
pub mod reread;

pub use config::Config;
pub use error::{ConfigError, CorpusError, SearchError};
pub use index::{build_index, IndexKind, LineIndex};
pub use reread::{resolve_algorithm, Algorithm};
