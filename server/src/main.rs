//! linesearch binary — thin CLI shell over the [`linesearch_server`] crate.

use clap::{Parser, ValueEnum};
use linesearch_core::{build_index, resolve_algorithm, Config, IndexKind};
use linesearch_server::conn::ConnContext;
use linesearch_server::daemon;
use linesearch_server::dispatch::{Dispatcher, Strategy};
use linesearch_server::qlog::QueryLog;
use linesearch_server::supervisor::Server;
use linesearch_server::tls;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

// ---------------------------------------------------------------------------
// Exit codes
// ---------------------------------------------------------------------------

mod exit {
    pub const OK: i32 = 0;
    pub const CONFIG: i32 = 1;
    pub const BIND: i32 = 2;
    pub const TLS: i32 = 3;
    pub const CORPUS: i32 = 4;
}

// ---------------------------------------------------------------------------
// CLI definition (clap derive)
// ---------------------------------------------------------------------------

/// Exact line-membership TCP query server over plaintext or TLS.
#[derive(Parser)]
#[command(name = "linesearch", version, about, long_about = None)]
struct Cli {
    /// Foreground vs. detached daemon
    #[arg(long, value_enum, default_value_t = RunMode::Normal)]
    mode: RunMode,

    /// Index variant for preloaded mode: 0=native-set, 1=hash, 2=trie,
    /// 3=mmap-scan. Ignored when REREAD_ON_QUERY=true.
    #[arg(long, default_value_t = 1)]
    buffer: u8,

    /// Bind to 0.0.0.0 (public) or 127.0.0.1 (local)
    #[arg(long, value_enum, default_value_t = BindScope::Public)]
    ip: BindScope,

    /// Path to the key=value config file
    #[arg(long = "config_path", default_value = "config.txt")]
    config_path: PathBuf,

    /// Search algorithm by registry name (drives reread mode; in preloaded
    /// mode, names with an index form override --buffer)
    #[arg(long, default_value = "Shell Grep")]
    algorithm: String,

    /// Per-query log destination (one JSON record per line)
    #[arg(long = "query_log", default_value = "query.log")]
    query_log: PathBuf,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum RunMode {
    Normal,
    Daemon,
}

#[derive(Clone, Copy, ValueEnum)]
enum BindScope {
    Public,
    Local,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() {
    let cli = Cli::parse();

    // Detach before any threads exist: the runtime and the worker pool are
    // both built after this point.
    if cli.mode == RunMode::Daemon {
        if let Err(e) = daemon::daemonize() {
            eprintln!("Error: failed to daemonize: {e}");
            std::process::exit(exit::CONFIG);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("linesearch_server=info".parse().unwrap())
                .add_directive("linesearch_core=info".parse().unwrap()),
        )
        .with_target(false)
        .init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to build tokio runtime");
    let code = runtime.block_on(run(&cli));

    if cli.mode == RunMode::Daemon {
        daemon::remove_pid_file();
    }
    std::process::exit(code);
}

async fn run(cli: &Cli) -> i32 {
    // Config
    let config = match Config::load(&cli.config_path) {
        Ok(c) => c,
        Err(e) => {
            error!(config = %cli.config_path.display(), error = %e, "Invalid configuration");
            return exit::CONFIG;
        }
    };

    // Algorithm + index selection
    let algorithm = match resolve_algorithm(&cli.algorithm) {
        Ok(a) => a,
        Err(e) => {
            error!(
                error = %e,
                available = ?linesearch_core::reread::algorithm_names(),
                "Invalid configuration"
            );
            return exit::CONFIG;
        }
    };
    let Some(buffer_kind) = IndexKind::from_buffer_flag(cli.buffer) else {
        error!(buffer = cli.buffer, "Invalid --buffer value (expected 0-3)");
        return exit::CONFIG;
    };

    let (strategy, algorithm_label) = if config.reread_on_query {
        info!(algorithm = algorithm.name, "Reread mode: corpus is re-read on every query");
        (
            Strategy::Reread { scan: algorithm.scan, path: config.corpus_path.clone() },
            algorithm.name,
        )
    } else {
        let kind = algorithm.index_kind.unwrap_or(buffer_kind);
        let started = Instant::now();
        match build_index(kind, &config.corpus_path) {
            Ok(index) => {
                info!(
                    kind = index.name(),
                    entries = index.len(),
                    build_ms = started.elapsed().as_millis() as u64,
                    "Index built"
                );
                (Strategy::Preloaded { index }, kind.label())
            }
            Err(e) => {
                error!(corpus = %config.corpus_path.display(), error = %e, "Index build failed");
                return exit::CORPUS;
            }
        }
    };
    let mode = strategy.mode();

    // TLS
    let tls = if config.use_ssl {
        let dir = cli.config_path.parent().filter(|p| !p.as_os_str().is_empty());
        match tls::build_acceptor(dir.unwrap_or(Path::new("."))) {
            Ok(acceptor) => Some(acceptor),
            Err(e) => {
                error!(error = %e, "TLS setup failed");
                return exit::TLS;
            }
        }
    } else {
        None
    };

    // Query log
    let (qlog, qlog_task) = match QueryLog::open(&cli.query_log) {
        Ok(pair) => pair,
        Err(e) => {
            error!(path = %cli.query_log.display(), error = %e, "Could not open query log");
            return exit::CONFIG;
        }
    };

    // Bind
    let bind_ip: IpAddr = match cli.ip {
        BindScope::Public => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        BindScope::Local => IpAddr::V4(Ipv4Addr::LOCALHOST),
    };
    let server = match Server::bind(SocketAddr::new(bind_ip, config.port)) {
        Ok(s) => s,
        Err(e) => {
            error!(addr = %bind_ip, port = config.port, error = %e, "Could not bind");
            return exit::BIND;
        }
    };
    let addr = server.local_addr().expect("listener has a local address");
    info!(
        addr = %addr,
        tls = tls.is_some(),
        mode,
        algorithm = algorithm_label,
        "Serving"
    );

    let ctx = Arc::new(ConnContext {
        dispatcher: Dispatcher::new(strategy),
        qlog,
        mode,
        algorithm: algorithm_label,
    });

    server.run(ctx, tls).await;

    // All QueryLog clones are gone once the handlers are; the writer task
    // flushes and exits when the channel closes.
    let _ = qlog_task.await;
    exit::OK
}
