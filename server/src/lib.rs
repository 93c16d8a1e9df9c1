//! linesearch server — reactor, worker-pool dispatcher, TLS, supervision.
//!
//! The binary in `main.rs` is a thin CLI shell; everything it wires together
//! lives here so the integration tests can drive a real server in-process.

pub mod conn;
pub mod daemon;
pub mod dispatch;
pub mod qlog;
pub mod supervisor;
pub mod tls;
