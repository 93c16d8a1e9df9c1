//! Reread-mode search algorithms and the algorithm registry.
//!
//! Every scan opens the corpus fresh so each query observes live filesystem
//! state — no caching of any kind is allowed here. Registry names are
//! resolved once at startup into a plain function handle; the resolved
//! handle, not the name, is what the supervisor stores.

use crate::corpus::line_records;
use crate::error::{ConfigError, SearchError};
use crate::index::{build_index, IndexKind};
use memmap2::Mmap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::{Command, Stdio};

/// A reread-mode scan: fresh file access, first-equality exit where the
/// algorithm allows one.
pub type RereadFn = fn(&Path, &[u8]) -> Result<bool, SearchError>;

/// Registry entry. `index_kind` is the preloaded-mode equivalent, for
/// algorithms that have one.
pub struct Algorithm {
    pub name: &'static str,
    pub scan: RereadFn,
    pub index_kind: Option<IndexKind>,
}

/// Selectable algorithms, keyed by display name (case-insensitive).
pub const REGISTRY: &[Algorithm] = &[
    Algorithm { name: "Shell Grep", scan: shell_grep, index_kind: None },
    Algorithm { name: "Line Scan", scan: line_scan, index_kind: None },
    Algorithm { name: "Mmap Scan", scan: mmap_scan, index_kind: Some(IndexKind::MmapScan) },
    Algorithm { name: "Hash Set", scan: hash_set_scan, index_kind: Some(IndexKind::Hash) },
    Algorithm { name: "Native Set", scan: native_set_scan, index_kind: Some(IndexKind::NativeSet) },
    Algorithm { name: "Trie", scan: trie_scan, index_kind: Some(IndexKind::Trie) },
    Algorithm { name: "Binary Search", scan: binary_search_scan, index_kind: Some(IndexKind::Sorted) },
];

/// Look up a registry entry by name, case-insensitively. An unrecognized
/// name is a configuration error (fatal at startup).
pub fn resolve_algorithm(name: &str) -> Result<&'static Algorithm, ConfigError> {
    REGISTRY
        .iter()
        .find(|a| a.name.eq_ignore_ascii_case(name))
        .ok_or_else(|| ConfigError::UnknownAlgorithm(name.to_string()))
}

/// Registry names, for CLI error messages.
pub fn algorithm_names() -> Vec<&'static str> {
    REGISTRY.iter().map(|a| a.name).collect()
}

// ---------------------------------------------------------------------------
// Scans
// ---------------------------------------------------------------------------

fn io_error(path: &Path, source: std::io::Error) -> SearchError {
    SearchError::Scan { path: path.to_path_buf(), source }
}

/// `grep -Fxq -- <query> <path>`. Exit 0 is a match, 1 is a clean miss.
/// Queries that argv cannot carry faithfully (interior NULs, non-UTF-8) and
/// the empty query fall back to the native line scan.
fn shell_grep(path: &Path, q: &[u8]) -> Result<bool, SearchError> {
    let pattern = match std::str::from_utf8(q) {
        Ok(s) if !s.is_empty() && !s.contains('\0') => s,
        _ => {
            tracing::debug!("query not expressible as a grep argument; using line scan");
            return line_scan(path, q);
        }
    };
    let status = Command::new("grep")
        .arg("-Fxq")
        .arg("--")
        .arg(pattern)
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(|e| io_error(path, e))?;
    match status.code() {
        Some(0) => Ok(true),
        Some(1) => Ok(false),
        other => Err(io_error(
            path,
            std::io::Error::other(format!("grep exited with {other:?}")),
        )),
    }
}

/// Buffered sequential read, returning on the first equal line.
fn line_scan(path: &Path, q: &[u8]) -> Result<bool, SearchError> {
    let file = File::open(path).map_err(|e| io_error(path, e))?;
    let mut reader = BufReader::new(file);
    let mut buf = Vec::with_capacity(256);
    loop {
        buf.clear();
        let n = reader.read_until(b'\n', &mut buf).map_err(|e| io_error(path, e))?;
        if n == 0 {
            return Ok(false);
        }
        let mut line = buf.as_slice();
        if let Some(rest) = line.strip_suffix(b"\n") {
            line = rest.strip_suffix(b"\r").unwrap_or(rest);
        }
        if line == q {
            return Ok(true);
        }
    }
}

/// Fresh memory map + record walk, returning on the first equal record.
fn mmap_scan(path: &Path, q: &[u8]) -> Result<bool, SearchError> {
    let file = File::open(path).map_err(|e| io_error(path, e))?;
    let len = file.metadata().map_err(|e| io_error(path, e))?.len();
    if len == 0 {
        return Ok(false);
    }
    let map = unsafe { Mmap::map(&file) }.map_err(|e| io_error(path, e))?;
    Ok(line_records(&map)
        .into_iter()
        .any(|(off, rec_len)| rec_len == q.len() && &map[off..off + rec_len] == q))
}

// The structure-building scans pay the full build cost on every query. That
// is the point: they exist so preloaded-vs-reread costs of each structure
// can be compared from the same benchmark driver.

fn hash_set_scan(path: &Path, q: &[u8]) -> Result<bool, SearchError> {
    probe(IndexKind::Hash, path, q)
}

fn native_set_scan(path: &Path, q: &[u8]) -> Result<bool, SearchError> {
    probe(IndexKind::NativeSet, path, q)
}

fn trie_scan(path: &Path, q: &[u8]) -> Result<bool, SearchError> {
    probe(IndexKind::Trie, path, q)
}

fn binary_search_scan(path: &Path, q: &[u8]) -> Result<bool, SearchError> {
    probe(IndexKind::Sorted, path, q)
}

fn probe(kind: IndexKind, path: &Path, q: &[u8]) -> Result<bool, SearchError> {
    let index = build_index(kind, path)?;
    Ok(index.contains(q))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn corpus(content: &[u8]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().expect("temp corpus");
        f.write_all(content).expect("write corpus");
        f
    }

    #[test]
    fn test_resolve_is_case_insensitive() {
        assert!(resolve_algorithm("shell grep").is_ok());
        assert!(resolve_algorithm("SHELL GREP").is_ok());
        assert!(resolve_algorithm("Binary Search").is_ok());
        assert!(matches!(
            resolve_algorithm("bogosort"),
            Err(ConfigError::UnknownAlgorithm(name)) if name == "bogosort"
        ));
    }

    #[test]
    fn test_all_algorithms_agree_on_membership() {
        let f = corpus(b"alpha\nbeta\ngamma delta\n\n");
        for algo in REGISTRY {
            let scan = algo.scan;
            assert!(scan(f.path(), b"beta").expect(algo.name), "{}: beta", algo.name);
            assert!(scan(f.path(), b"gamma delta").expect(algo.name), "{}: spaces", algo.name);
            assert!(scan(f.path(), b"").expect(algo.name), "{}: empty line", algo.name);
            assert!(!scan(f.path(), b"bet").expect(algo.name), "{}: prefix", algo.name);
            assert!(!scan(f.path(), b"delta").expect(algo.name), "{}: partial", algo.name);
        }
    }

    #[test]
    fn test_empty_corpus_never_matches() {
        let f = corpus(b"");
        for algo in REGISTRY {
            assert!(!(algo.scan)(f.path(), b"").expect(algo.name), "{}", algo.name);
            assert!(!(algo.scan)(f.path(), b"x").expect(algo.name), "{}", algo.name);
        }
    }

    #[test]
    fn test_shell_grep_falls_back_on_interior_nul() {
        let f = corpus(b"be\x00ta\n");
        assert!(shell_grep(f.path(), b"be\x00ta").expect("scan"));
        assert!(!shell_grep(f.path(), b"beta").expect("scan"));
    }

    #[test]
    fn test_scans_observe_live_file_state() {
        let f = corpus(b"old\n");
        assert!(line_scan(f.path(), b"old").expect("scan"));
        assert!(!line_scan(f.path(), b"new").expect("scan"));
        std::fs::write(f.path(), b"new\n").expect("rewrite");
        assert!(line_scan(f.path(), b"new").expect("scan"));
        assert!(!line_scan(f.path(), b"old").expect("scan"));
    }

    #[test]
    fn test_scan_missing_file_is_an_error() {
        let err = line_scan(Path::new("/nonexistent/corpus"), b"x").unwrap_err();
        assert_eq!(err.kind(), "scan_io");
    }
}
