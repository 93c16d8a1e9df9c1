//! Per-connection framing and response writing.
//!
//! The protocol is one-shot: read one query (first `\n` or 1024 bytes,
//! whichever comes first), answer with exactly one fixed token, close.
//! The handler is generic over the stream so plaintext and TLS share it.

use crate::dispatch::Dispatcher;
use crate::qlog::{now_unix_ms, QueryLog, QueryRecord};
use linesearch_core::corpus::{normalize_query, MAX_QUERY_LEN};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::debug;

pub const RESP_EXISTS: &[u8] = b"STRING EXISTS\n";
pub const RESP_NOT_FOUND: &[u8] = b"STRING NOT FOUND\n";
pub const RESP_ERROR: &[u8] = b"ERROR\n";

/// Inactivity limit on each socket read and write. A stalled peer is cut
/// off without a response; in-flight worker searches are not cancelled.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything a connection task needs, shared across all connections.
pub struct ConnContext {
    pub dispatcher: Dispatcher,
    pub qlog: QueryLog,
    pub mode: &'static str,
    pub algorithm: &'static str,
}

/// Serve one accepted connection to completion.
pub async fn handle_connection<S>(mut stream: S, peer: SocketAddr, ctx: Arc<ConnContext>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let Some(raw) = read_query(&mut stream, peer).await else {
        return;
    };
    let query = normalize_query(&raw).to_vec();
    let query_len = query.len();

    let outcome = ctx.dispatcher.dispatch(query).await;
    let response: &[u8] = if outcome.is_error() {
        RESP_ERROR
    } else if outcome.matched {
        RESP_EXISTS
    } else {
        RESP_NOT_FOUND
    };

    match timeout(IDLE_TIMEOUT, stream.write_all(response)).await {
        Ok(Ok(())) => {
            let _ = stream.shutdown().await;
        }
        Ok(Err(e)) => debug!(peer = %peer, error = %e, "Response write failed"),
        Err(_) => debug!(peer = %peer, "Response write timed out"),
    }

    ctx.qlog
        .record(QueryRecord {
            ts: now_unix_ms(),
            peer: peer.to_string(),
            mode: ctx.mode,
            algorithm: ctx.algorithm,
            query_len,
            matched: outcome.matched,
            elapsed_ns: outcome.elapsed_ns,
            queue_depth: outcome.queue_depth,
            err_kind: outcome.err_kind,
        })
        .await;
}

/// Read one raw query. Returns `None` for every silent-close case: zero
/// bytes before EOF, 1024 bytes with no terminator, read error, timeout.
/// EOF after some bytes but before `\n` yields those bytes — fixed-buffer
/// clients pad with NULs and never send a terminator.
async fn read_query<S>(stream: &mut S, peer: SocketAddr) -> Option<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    let mut buf = [0u8; MAX_QUERY_LEN];
    let mut filled = 0usize;
    loop {
        if filled == MAX_QUERY_LEN {
            debug!(peer = %peer, "Query exceeded {MAX_QUERY_LEN} bytes without terminator");
            return None;
        }
        let n = match timeout(IDLE_TIMEOUT, stream.read(&mut buf[filled..])).await {
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                debug!(peer = %peer, error = %e, "Read failed");
                return None;
            }
            Err(_) => {
                debug!(peer = %peer, "Read timed out");
                return None;
            }
        };
        if n == 0 {
            return if filled == 0 { None } else { Some(buf[..filled].to_vec()) };
        }
        let start = filled;
        filled += n;
        if let Some(nl) = buf[start..filled].iter().position(|&b| b == b'\n') {
            // Anything after the terminator is discarded; the protocol is
            // strictly one query per connection.
            return Some(buf[..start + nl].to_vec());
        }
    }
}

// ---------------------------------------------------------------------------
// Tests (framing only; full protocol runs live in tests/protocol.rs)
// ---------------------------------------------------------------------------
