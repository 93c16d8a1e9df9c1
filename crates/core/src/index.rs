//! Membership indices over the corpus (preloaded mode).
//!
//! Every variant answers the same question — does this exact byte sequence
//! appear as a complete line of the corpus — through a different structure,
//! so their per-query cost can be compared under identical load. Indices are
//! built once at startup and shared immutably across workers.

use crate::corpus::{line_records, read_lines};
use crate::error::CorpusError;
use memmap2::Mmap;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

/// Byte-exact line membership test. Implementations are immutable after
/// build and shared across workers without locking.
pub trait LineIndex: Send + Sync {
    fn contains(&self, q: &[u8]) -> bool;

    /// Number of stored entries. Scan variants count line records
    /// (duplicates included); set variants count distinct lines.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Short label used in query-log records.
    fn name(&self) -> &'static str;
}

// ---------------------------------------------------------------------------
// Index selection
// ---------------------------------------------------------------------------

/// The selectable index variants. The first four map to the `--buffer`
/// flag; `Sorted` is reached through the algorithm registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexKind {
    NativeSet,
    Hash,
    Trie,
    MmapScan,
    Sorted,
}

impl IndexKind {
    /// Map the `--buffer` CLI flag: 0=native-set, 1=hash, 2=trie,
    /// 3=mmap-scan.
    pub fn from_buffer_flag(flag: u8) -> Option<IndexKind> {
        match flag {
            0 => Some(IndexKind::NativeSet),
            1 => Some(IndexKind::Hash),
            2 => Some(IndexKind::Trie),
            3 => Some(IndexKind::MmapScan),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            IndexKind::NativeSet => "native-set",
            IndexKind::Hash => "hash",
            IndexKind::Trie => "trie",
            IndexKind::MmapScan => "mmap-scan",
            IndexKind::Sorted => "sorted",
        }
    }
}

/// Build the chosen index over the corpus file.
pub fn build_index(kind: IndexKind, path: &Path) -> Result<Arc<dyn LineIndex>, CorpusError> {
    let index: Arc<dyn LineIndex> = match kind {
        IndexKind::NativeSet => Arc::new(NativeSetIndex::build(path)?),
        IndexKind::Hash => Arc::new(HashIndex::build(path)?),
        IndexKind::Trie => Arc::new(TrieIndex::build(path)?),
        IndexKind::MmapScan => Arc::new(MmapScanIndex::build(path)?),
        IndexKind::Sorted => Arc::new(SortedIndex::build(path)?),
    };
    tracing::debug!(kind = index.name(), entries = index.len(), "Index built");
    Ok(index)
}

// ---------------------------------------------------------------------------
// HashIndex — std hash set, O(1) expected lookup
// ---------------------------------------------------------------------------

pub struct HashIndex {
    lines: std::collections::HashSet<Vec<u8>>,
}

impl HashIndex {
    pub fn build(path: &Path) -> Result<HashIndex, CorpusError> {
        let lines = read_lines(path)?.into_iter().collect();
        Ok(HashIndex { lines })
    }
}

impl LineIndex for HashIndex {
    fn contains(&self, q: &[u8]) -> bool {
        self.lines.contains(q)
    }

    fn len(&self) -> usize {
        self.lines.len()
    }

    fn name(&self) -> &'static str {
        "hash"
    }
}

// ---------------------------------------------------------------------------
// NativeSetIndex — open-addressing set, identical contract to HashIndex
// ---------------------------------------------------------------------------

/// Kept as a separate selectable variant so benchmark comparisons between
/// the std table and the open-addressing table stay meaningful.
pub struct NativeSetIndex {
    lines: hashbrown::HashSet<Vec<u8>>,
}

impl NativeSetIndex {
    pub fn build(path: &Path) -> Result<NativeSetIndex, CorpusError> {
        let lines = read_lines(path)?.into_iter().collect();
        Ok(NativeSetIndex { lines })
    }
}

impl LineIndex for NativeSetIndex {
    fn contains(&self, q: &[u8]) -> bool {
        self.lines.contains(q)
    }

    fn len(&self) -> usize {
        self.lines.len()
    }

    fn name(&self) -> &'static str {
        "native-set"
    }
}

// ---------------------------------------------------------------------------
// TrieIndex — ordered byte tree, O(|q|) lookup
// ---------------------------------------------------------------------------

#[derive(Default)]
struct TrieNode {
    children: BTreeMap<u8, u32>,
    terminal: bool,
}

/// Arena-backed byte trie. A node is accepting only at the terminal byte of
/// an inserted line, so substrings of corpus lines do not match.
pub struct TrieIndex {
    nodes: Vec<TrieNode>,
    entries: usize,
}

impl TrieIndex {
    pub fn build(path: &Path) -> Result<TrieIndex, CorpusError> {
        let mut trie = TrieIndex { nodes: vec![TrieNode::default()], entries: 0 };
        for line in read_lines(path)? {
            trie.insert(&line);
        }
        Ok(trie)
    }

    fn insert(&mut self, line: &[u8]) {
        let mut node = 0usize;
        for &byte in line {
            node = match self.nodes[node].children.get(&byte).copied() {
                Some(next) => next as usize,
                None => {
                    let next = self.nodes.len();
                    self.nodes.push(TrieNode::default());
                    self.nodes[node].children.insert(byte, next as u32);
                    next
                }
            };
        }
        if !self.nodes[node].terminal {
            self.nodes[node].terminal = true;
            self.entries += 1;
        }
    }
}

impl LineIndex for TrieIndex {
    fn contains(&self, q: &[u8]) -> bool {
        let mut node = 0usize;
        for byte in q {
            match self.nodes[node].children.get(byte) {
                Some(&next) => node = next as usize,
                None => return false,
            }
        }
        self.nodes[node].terminal
    }

    fn len(&self) -> usize {
        self.entries
    }

    fn name(&self) -> &'static str {
        "trie"
    }
}

// ---------------------------------------------------------------------------
// SortedIndex — sorted unique lines, O(log N) lookup
// ---------------------------------------------------------------------------

pub struct SortedIndex {
    lines: Vec<Vec<u8>>,
}

impl SortedIndex {
    pub fn build(path: &Path) -> Result<SortedIndex, CorpusError> {
        let mut lines = read_lines(path)?;
        lines.sort();
        lines.dedup();
        Ok(SortedIndex { lines })
    }
}

impl LineIndex for SortedIndex {
    fn contains(&self, q: &[u8]) -> bool {
        self.lines.binary_search_by(|line| line.as_slice().cmp(q)).is_ok()
    }

    fn len(&self) -> usize {
        self.lines.len()
    }

    fn name(&self) -> &'static str {
        "sorted"
    }
}

// ---------------------------------------------------------------------------
// MmapScanIndex — read-only map + line record table, linear scan
// ---------------------------------------------------------------------------

/// Memory-maps the corpus and precomputes `(offset, len)` records. Lookup is
/// a linear scan with early exit; duplicates are preserved in the record
/// table but irrelevant to membership. The map is shared read-only; page
/// cache concurrency is the OS's problem.
pub struct MmapScanIndex {
    // None for a zero-length corpus: mapping an empty file is an error on
    // most platforms.
    map: Option<Mmap>,
    records: Vec<(usize, usize)>,
}

impl MmapScanIndex {
    pub fn build(path: &Path) -> Result<MmapScanIndex, CorpusError> {
        let file = File::open(path).map_err(|source| CorpusError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let len = file
            .metadata()
            .map_err(|source| CorpusError::Open { path: path.to_path_buf(), source })?
            .len();
        if len == 0 {
            return Ok(MmapScanIndex { map: None, records: Vec::new() });
        }
        let map = unsafe { Mmap::map(&file) }.map_err(|source| CorpusError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let records = line_records(&map);
        Ok(MmapScanIndex { map: Some(map), records })
    }

    fn data(&self) -> &[u8] {
        self.map.as_deref().unwrap_or(&[])
    }
}

impl LineIndex for MmapScanIndex {
    fn contains(&self, q: &[u8]) -> bool {
        let data = self.data();
        self.records
            .iter()
            .any(|&(off, len)| len == q.len() && &data[off..off + len] == q)
    }

    fn len(&self) -> usize {
        self.records.len()
    }

    fn name(&self) -> &'static str {
        "mmap-scan"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
