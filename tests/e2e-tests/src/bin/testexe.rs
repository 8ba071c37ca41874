//! Stand-in service for end-to-end tests.
//!
//! Optionally listens on a port, records every termination signal it
//! receives, and can be told to ignore them or to exit on its own.

use clap::Parser;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::sleep;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "testexe")]
#[command(about = "Stand-in service for devstack end-to-end tests", long_about = None)]
struct Args {
    /// Port to accept TCP connections on
    #[arg(long)]
    port: Option<u16>,

    /// Delay before binding the port
    #[arg(long, default_value = "0")]
    startup_delay_ms: u64,

    /// Exit on its own after this long
    #[arg(long)]
    exit_after_ms: Option<u64>,

    /// Exit code used when exiting
    #[arg(long, default_value = "0")]
    exit_code: i32,

    /// Keep running when asked to terminate
    #[arg(long)]
    ignore_sigterm: bool,

    /// Append one line per termination signal received
    #[arg(long)]
    signal_log: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(false)
        .with_ansi(false)
        .init();

    let args = Args::parse();
    let signals = Signals::install();
    info!("Starting testexe with args: {:?}", args);

    if args.startup_delay_ms > 0 {
        sleep(Duration::from_millis(args.startup_delay_ms)).await;
    }

    if let Some(port) = args.port {
        let listener = match TcpListener::bind(("127.0.0.1", port)).await {
            Ok(listener) => listener,
            Err(e) => {
                error!("Failed to bind port {}: {}", port, e);
                std::process::exit(2);
            }
        };
        info!("Listening on port {}", port);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                drop(stream);
            }
        });
    }

    info!("Testexe is ready");

    let exit_after = async {
        match args.exit_after_ms {
            Some(ms) => sleep(Duration::from_millis(ms)).await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        _ = exit_after => info!("Exit timer elapsed"),
        _ = wait_for_termination(signals, args.ignore_sigterm, args.signal_log.as_deref()) => {}
    }

    info!("Testexe stopped");
    std::process::exit(args.exit_code);
}

/// Termination signals, installed before anything else so none is missed.
struct Signals {
    #[cfg(unix)]
    term: tokio::signal::unix::Signal,
    #[cfg(unix)]
    int: tokio::signal::unix::Signal,
    #[cfg(windows)]
    brk: tokio::signal::windows::CtrlBreak,
    #[cfg(windows)]
    c: tokio::signal::windows::CtrlC,
}

impl Signals {
    #[cfg(unix)]
    fn install() -> Self {
        use tokio::signal::unix::{signal, SignalKind};
        Self {
            term: signal(SignalKind::terminate()).expect("Failed to setup SIGTERM handler"),
            int: signal(SignalKind::interrupt()).expect("Failed to setup SIGINT handler"),
        }
    }

    #[cfg(windows)]
    fn install() -> Self {
        use tokio::signal::windows::{ctrl_break, ctrl_c};
        Self {
            brk: ctrl_break().expect("Failed to setup Ctrl+Break handler"),
            c: ctrl_c().expect("Failed to setup Ctrl+C handler"),
        }
    }

    #[cfg(unix)]
    async fn next(&mut self) -> &'static str {
        tokio::select! {
            _ = self.term.recv() => "SIGTERM",
            _ = self.int.recv() => "SIGINT",
        }
    }

    #[cfg(windows)]
    async fn next(&mut self) -> &'static str {
        tokio::select! {
            _ = self.brk.recv() => "CTRL_BREAK",
            _ = self.c.recv() => "CTRL_C",
        }
    }
}

/// Returns on the first termination signal, unless told to ignore them.
async fn wait_for_termination(mut signals: Signals, ignore: bool, signal_log: Option<&Path>) {
    loop {
        let signal = signals.next().await;
        info!("Received {}", signal);
        if let Some(path) = signal_log {
            if let Err(e) = append_line(path, signal) {
                error!("Failed to record signal in {}: {}", path.display(), e);
            }
        }
        if !ignore {
            return;
        }
        warn!("Ignoring {}", signal);
    }
}

fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    writeln!(file, "{}", line)
}
