//! Server supervisor — owns the listening socket and the connection tasks;
//! orchestrates serving, graceful drain, and shutdown.
//!
//! Lifecycle: bind (SO_REUSEADDR, backlog 128) → serve (one task per
//! accepted socket) → drain (grace window, then abort) → stopped.

use crate::conn::{self, ConnContext};
use socket2::{Domain, Protocol, Socket, Type};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

/// Listen backlog. Overload beyond this queues in the kernel, which is the
/// intended backpressure point for connection bursts.
const LISTEN_BACKLOG: i32 = 128;

/// Grace window for in-flight handlers once shutdown begins.
const DRAIN_GRACE: Duration = Duration::from_secs(5);

pub struct Server {
    listener: TcpListener,
}

impl Server {
    /// Bind the listening socket with `SO_REUSEADDR` set. Port 0 binds an
    /// ephemeral port (the config loader enforces 1-65535 for file-supplied
    /// ports; tests rely on 0).
    pub fn bind(addr: SocketAddr) -> std::io::Result<Server> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;
        socket.listen(LISTEN_BACKLOG)?;
        let listener = TcpListener::from_std(socket.into())?;
        Ok(Server { listener })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept loop. Runs until a termination signal fires, then drains.
    pub async fn run(self, ctx: Arc<ConnContext>, tls: Option<TlsAcceptor>) {
        let Server { listener } = self;
        let mut connections: JoinSet<()> = JoinSet::new();
        let shutdown = termination_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                signal = &mut shutdown => {
                    info!(signal, "Termination requested; no longer accepting connections");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let ctx = Arc::clone(&ctx);
                        let tls = tls.clone();
                        connections.spawn(async move {
                            let _ = stream.set_nodelay(true);
                            match tls {
                                Some(acceptor) => match acceptor.accept(stream).await {
                                    Ok(tls_stream) => {
                                        conn::handle_connection(tls_stream, peer, ctx).await;
                                    }
                                    // Handshake failures drop the connection
                                    // silently; plaintext probes against a TLS
                                    // listener land here constantly.
                                    Err(e) => debug!(peer = %peer, error = %e, "TLS handshake failed"),
                                },
                                None => conn::handle_connection(stream, peer, ctx).await,
                            }
                        });
                        // Reap finished handlers so the set stays small.
                        while connections.try_join_next().is_some() {}
                    }
                    Err(e) if is_transient_accept_error(&e) => {
                        warn!(error = %e, "Accept failed; continuing");
                    }
                    Err(e) => {
                        error!(error = %e, "Listener failed; shutting down");
                        break;
                    }
                },
            }
        }

        // Draining: stop accepting, give handlers the grace window.
        drop(listener);
        let active = connections.len();
        if active > 0 {
            info!(active, "Draining connections");
        }
        let drained = tokio::time::timeout(DRAIN_GRACE, async {
            while connections.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(
                remaining = connections.len(),
                "Drain window elapsed; aborting remaining handlers"
            );
            connections.abort_all();
            while connections.join_next().await.is_some() {}
        }
        info!("Server stopped");
    }
}

/// A per-connection accept hiccup (peer reset before we got to it) is not a
/// listener failure.
fn is_transient_accept_error(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::Interrupted
    )
}

/// Resolves with the name of whichever termination signal arrives first.
async fn termination_signal() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm =
            signal(SignalKind::terminate()).expect("SIGTERM handler registration failed");
        let mut sigint =
            signal(SignalKind::interrupt()).expect("SIGINT handler registration failed");
        tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.expect("interrupt handler registration failed");
        "interrupt"
    }
}
