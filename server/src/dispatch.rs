//! Search dispatcher — bridges the I/O reactor onto the CPU worker pool.
//!
//! Workers run true OS-level parallelism and never suspend; the reactor
//! awaits results through a oneshot channel. A slow scan therefore cannot
//! starve the acceptor, even in preloaded mode.

use linesearch_core::reread::RereadFn;
use linesearch_core::{LineIndex, SearchError};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::oneshot;
use tracing::{error, warn};

/// Queue soft limit, as a multiple of pool parallelism. Work past the limit
/// still enqueues; the per-query log makes the overload observable instead.
const QUEUE_SOFT_LIMIT_FACTOR: usize = 4;

// ---------------------------------------------------------------------------
// Resolved search strategy
// ---------------------------------------------------------------------------

/// The single resolved search handle, fixed for the process lifetime:
/// either a prebuilt index or a reread scan function plus the corpus path.
pub enum Strategy {
    Preloaded { index: Arc<dyn LineIndex> },
    Reread { scan: RereadFn, path: PathBuf },
}

impl Strategy {
    pub fn mode(&self) -> &'static str {
        match self {
            Strategy::Preloaded { .. } => "preloaded",
            Strategy::Reread { .. } => "reread",
        }
    }

    fn run(&self, q: &[u8]) -> Result<bool, SearchError> {
        match self {
            Strategy::Preloaded { index } => Ok(index.contains(q)),
            Strategy::Reread { scan, path } => scan(path, q),
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatch outcome
// ---------------------------------------------------------------------------

/// Result of one dispatched query. `elapsed_ns` covers only the
/// `contains`/scan call on the worker, measured with a monotonic clock;
/// queueing and socket I/O are excluded.
pub struct SearchOutcome {
    pub matched: bool,
    pub elapsed_ns: u64,
    pub queue_depth: usize,
    pub err_kind: Option<&'static str>,
}

impl SearchOutcome {
    /// True when the wire response must be `ERROR`. A contained worker
    /// panic is reported as a plain miss, not as an error.
    pub fn is_error(&self) -> bool {
        matches!(self.err_kind, Some(kind) if kind != SearchError::WorkerPanic.kind())
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

pub struct Dispatcher {
    pool: rayon::ThreadPool,
    strategy: Arc<Strategy>,
    queued: Arc<AtomicUsize>,
    soft_limit: usize,
}

impl Dispatcher {
    /// Build a dispatcher with one worker per hardware core.
    pub fn new(strategy: Strategy) -> Dispatcher {
        Dispatcher::with_parallelism(strategy, 0)
    }

    /// `parallelism` of 0 means one worker per core.
    pub fn with_parallelism(strategy: Strategy, parallelism: usize) -> Dispatcher {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(parallelism)
            .thread_name(|i| format!("search-worker-{i}"))
            .build()
            .expect("failed to build search worker pool");
        let soft_limit = QUEUE_SOFT_LIMIT_FACTOR * pool.current_num_threads().max(1);
        Dispatcher {
            pool,
            strategy: Arc::new(strategy),
            queued: Arc::new(AtomicUsize::new(0)),
            soft_limit,
        }
    }

    pub fn mode(&self) -> &'static str {
        self.strategy.mode()
    }

    /// Run one query on the pool. Never rejects work; a caller that
    /// disconnects mid-query leaves the worker to finish and discard.
    pub async fn dispatch(&self, query: Vec<u8>) -> SearchOutcome {
        let queue_depth = self.queued.fetch_add(1, Ordering::Relaxed) + 1;
        if queue_depth > self.soft_limit {
            warn!(queue_depth, soft_limit = self.soft_limit, "Worker queue past soft limit");
        }

        let (tx, rx) = oneshot::channel();
        let strategy = Arc::clone(&self.strategy);
        let queued = Arc::clone(&self.queued);
        self.pool.spawn(move || {
            let started = Instant::now();
            let result = catch_unwind(AssertUnwindSafe(|| strategy.run(&query)));
            let elapsed_ns = started.elapsed().as_nanos() as u64;
            queued.fetch_sub(1, Ordering::Relaxed);
            let _ = tx.send((result, elapsed_ns));
        });

        let (result, elapsed_ns) = match rx.await {
            Ok((caught, elapsed_ns)) => {
                (caught.unwrap_or_else(|_panic| Err(SearchError::WorkerPanic)), elapsed_ns)
            }
            // The sender is dropped only if the worker died before sending,
            // which catch_unwind prevents; treat it like a panic anyway.
            Err(_) => (Err(SearchError::WorkerPanic), 0),
        };

        match result {
            Ok(matched) => SearchOutcome { matched, elapsed_ns, queue_depth, err_kind: None },
            Err(err) => {
                error!(error = %err, "Search failed; pool preserved");
                SearchOutcome {
                    matched: false,
                    elapsed_ns,
                    queue_depth,
                    err_kind: Some(err.kind()),
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
