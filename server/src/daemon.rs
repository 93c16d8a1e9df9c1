//! Daemon-mode plumbing: detach from the terminal, redirect stdio to the
//! fixed log paths, and maintain the PID file.
//!
//! Must run before the tokio runtime or the worker pool exist — forked
//! children do not inherit threads.

use nix::sys::stat::Mode;
use nix::unistd::{fork, setsid, ForkResult};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::fd::AsRawFd;

pub const PID_FILE: &str = "/tmp/server_daemon.pid";
pub const STDOUT_LOG: &str = "/tmp/server_stdout.log";
pub const STDERR_LOG: &str = "/tmp/server_stderr.log";

fn errno(e: nix::errno::Errno) -> io::Error {
    io::Error::from_raw_os_error(e as i32)
}

/// Double-fork detach. The caller continues as the daemon; both
/// intermediate parents exit 0. Stdout/stderr land in the fixed log files,
/// stdin reads from /dev/null, and the daemon PID is written to
/// [`PID_FILE`].
pub fn daemonize() -> io::Result<()> {
    // First fork: the shell's child exits immediately.
    match unsafe { fork() }.map_err(errno)? {
        ForkResult::Parent { .. } => std::process::exit(0),
        ForkResult::Child => {}
    }

    // New session, away from the controlling terminal.
    setsid().map_err(errno)?;

    // Second fork: the session leader exits so the daemon can never
    // reacquire a terminal.
    match unsafe { fork() }.map_err(errno)? {
        ForkResult::Parent { .. } => std::process::exit(0),
        ForkResult::Child => {}
    }

    // umask for the artifact files, then stdio redirection.
    nix::sys::stat::umask(Mode::from_bits_truncate(0o022));

    let devnull = File::open("/dev/null")?;
    let stdout = OpenOptions::new().create(true).append(true).open(STDOUT_LOG)?;
    let stderr = OpenOptions::new().create(true).append(true).open(STDERR_LOG)?;
    redirect(devnull.as_raw_fd(), 0)?;
    redirect(stdout.as_raw_fd(), 1)?;
    redirect(stderr.as_raw_fd(), 2)?;

    fs::write(PID_FILE, format!("{}\n", std::process::id()))?;
    Ok(())
}

fn redirect(from: i32, to: i32) -> io::Result<()> {
    nix::unistd::dup2(from, to).map_err(errno)?;
    Ok(())
}

/// Remove the PID file on orderly shutdown. Missing file is fine — stop
/// scripts may have cleaned up first.
pub fn remove_pid_file() {
    let _ = fs::remove_file(PID_FILE);
}
