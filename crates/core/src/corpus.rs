//! Corpus line handling and query normalization.
//!
//! A corpus line is the byte sequence between line terminators, with the
//! terminator (`\n` or `\r\n`) removed. Lookups are byte-exact: no case
//! folding, no whitespace trimming, no unicode normalization.

use crate::error::CorpusError;
use memchr::memchr_iter;
use std::fs;
use std::path::Path;

/// Maximum query length in bytes, enforced at the connection framer.
pub const MAX_QUERY_LEN: usize = 1024;

// ---------------------------------------------------------------------------
// Query normalization
// ---------------------------------------------------------------------------

/// Normalize a raw wire query: strip one trailing `\n`, then one trailing
/// `\r`, then all trailing NUL padding. Interior NULs are preserved and
/// matched literally.
pub fn normalize_query(q: &[u8]) -> &[u8] {
    let q = q.strip_suffix(b"\n").unwrap_or(q);
    let mut q = q.strip_suffix(b"\r").unwrap_or(q);
    while let Some(rest) = q.strip_suffix(&[0u8]) {
        q = rest;
    }
    q
}

// ---------------------------------------------------------------------------
// Line splitting
// ---------------------------------------------------------------------------

/// Compute `(offset, len)` records for each line of `data`.
///
/// A `\r` immediately before the terminating `\n` is excluded from the
/// record. A final fragment without a terminator is kept as-is; a trailing
/// `\n` at end-of-file does not produce an empty record.
pub fn line_records(data: &[u8]) -> Vec<(usize, usize)> {
    let mut records = Vec::new();
    let mut start = 0usize;
    for nl in memchr_iter(b'\n', data) {
        let mut end = nl;
        if end > start && data[end - 1] == b'\r' {
            end -= 1;
        }
        records.push((start, end - start));
        start = nl + 1;
    }
    if start < data.len() {
        records.push((start, data.len() - start));
    }
    records
}

/// Read the corpus into owned lines, preserving order and duplicates.
/// Empty lines are valid members.
pub fn read_lines(path: &Path) -> Result<Vec<Vec<u8>>, CorpusError> {
    let data = fs::read(path).map_err(|source| CorpusError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(line_records(&data)
        .into_iter()
        .map(|(off, len)| data[off..off + len].to_vec())
        .collect())
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
    fn test_normalize_strips_terminator_then_nuls() {
        assert_eq!(normalize_query(b"beta\n"), b"beta");
        assert_eq!(normalize_query(b"beta\r\n"), b"beta");
        assert_eq!(normalize_query(b"beta\x00\x00"), b"beta");
        assert_eq!(normalize_query(b"beta\x00\x00\n"), b"beta");
        assert_eq!(normalize_query(b"beta"), b"beta");
    }

    #[test]
    fn test_normalize_preserves_interior_nuls() {
        assert_eq!(normalize_query(b"be\x00ta\x00"), b"be\x00ta");
    }

    #[test]
    fn test_normalize_empty_inputs() {
        assert_eq!(normalize_query(b""), b"");
        assert_eq!(normalize_query(b"\n"), b"");
        assert_eq!(normalize_query(b"\x00\x00"), b"");
    }

    #[test]
    fn test_normalize_idempotent() {
        for q in [
            &b"beta"[..],
            b"beta\x00\x00",
            b"beta\r\n",
            b"be\x00ta",
            b"",
            b"\x00",
        ] {
            let once = normalize_query(q);
            assert_eq!(normalize_query(once), once, "input {q:?}");
        }
    }

    #[test]
    fn test_line_records_basic() {
        let data = b"alpha\nbeta\ngamma\n";
        let records = line_records(data);
        let lines: Vec<&[u8]> =
            records.iter().map(|&(o, l)| &data[o..o + l]).collect();
        assert_eq!(lines, vec![&b"alpha"[..], b"beta", b"gamma"]);
    }

    #[test]
    fn test_line_records_crlf_and_empty_lines() {
        let data = b"a\r\n\r\nb\n";
        let records = line_records(data);
        let lines: Vec<&[u8]> =
            records.iter().map(|&(o, l)| &data[o..o + l]).collect();
        assert_eq!(lines, vec![&b"a"[..], b"", b"b"]);
    }

    #[test]
    fn test_line_records_unterminated_tail() {
        let data = b"a\nb";
        let records = line_records(data);
        let lines: Vec<&[u8]> =
            records.iter().map(|&(o, l)| &data[o..o + l]).collect();
        assert_eq!(lines, vec![&b"a"[..], b"b"]);
    }

    #[test]
    fn test_line_records_empty_file() {
        assert!(line_records(b"").is_empty());
    }

    #[test]
    fn test_read_lines_keeps_order_and_duplicates() {
        let f = corpus(b"dup\nunique\ndup\n");
        let lines = read_lines(f.path()).expect("read");
        assert_eq!(lines, vec![b"dup".to_vec(), b"unique".to_vec(), b"dup".to_vec()]);
    }
}
