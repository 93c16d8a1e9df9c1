//! Per-query structured log — one JSON object per line, suitable for
//! post-hoc benchmark aggregation.
//!
//! Handlers hand records to a bounded channel drained by a single writer
//! task. Under backpressure the send awaits, so records are never dropped
//! and file order matches completion order.

use serde::Serialize;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tracing::warn;

const LOG_CHANNEL_CAPACITY: usize = 1024;

/// One completed query. Field order here is the serialized field order.
#[derive(Debug, Serialize)]
pub struct QueryRecord {
    /// Unix milliseconds at completion.
    pub ts: u64,
    pub peer: String,
    pub mode: &'static str,
    pub algorithm: &'static str,
    pub query_len: usize,
    pub matched: bool,
    pub elapsed_ns: u64,
    pub queue_depth: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub err_kind: Option<&'static str>,
}

pub fn now_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Cloneable handle held by connection tasks. Dropping every handle closes
/// the channel and lets the writer task flush and exit.
#[derive(Clone)]
pub struct QueryLog {
    tx: mpsc::Sender<QueryRecord>,
}

impl QueryLog {
    /// Open (append) the log file and spawn the writer task. The returned
    /// join handle completes once the channel closes and the file is
    /// flushed; await it during shutdown.
    pub fn open(path: &Path) -> std::io::Result<(QueryLog, tokio::task::JoinHandle<()>)> {
        let file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
        let (tx, rx) = mpsc::channel(LOG_CHANNEL_CAPACITY);
        let task = tokio::spawn(writer_task(rx, BufWriter::new(file)));
        Ok((QueryLog { tx }, task))
    }

    pub async fn record(&self, record: QueryRecord) {
        // Only fails once the writer task is gone, during shutdown.
        let _ = self.tx.send(record).await;
    }
}

async fn writer_task(mut rx: mpsc::Receiver<QueryRecord>, mut out: BufWriter<std::fs::File>) {
    while let Some(record) = rx.recv().await {
        if let Err(e) = write_record(&mut out, &record) {
            warn!(error = %e, "Query log write failed");
        }
        // Flush whenever the queue drains so tail -f stays useful.
        if rx.is_empty() {
            if let Err(e) = out.flush() {
                warn!(error = %e, "Query log flush failed");
            }
        }
    }
    let _ = out.flush();
}

fn write_record(out: &mut impl Write, record: &QueryRecord) -> std::io::Result<()> {
    serde_json::to_writer(&mut *out, record)?;
    out.write_all(b"\n")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
