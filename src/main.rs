//! Agent stream bridge binary
//!
//! Run with: cargo run -- "your prompt"
//!
//! For help: cargo run -- --help

use agent_bridge::{cli::Cli, run_with_cli};
use clap::Parser;
use std::io::IsTerminal;
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // SIGINT/SIGTERM interrupt the running send instead of killing the bridge,
    // so the agent process group is always cleaned up
    let shutdown = CancellationToken::new();
    let signals = tokio::spawn(forward_signals(shutdown.clone()));

    let result = run_with_cli(&cli, shutdown).await;
    signals.abort();

    if let Err(e) = result {
        // stdout carries the reply; errors go to stderr
        eprintln!("Error: {}", e);

        if std::io::stdin().is_terminal() {
            eprintln!("\nFor debugging, run with --diagnostic to log to a file.");
            eprintln!("Or use -v/-vv/-vvv for more verbose logging.");
        }

        std::process::exit(1);
    }

    Ok(())
}

async fn forward_signals(shutdown: CancellationToken) {
    tokio::select! {
        _ = signal::ctrl_c() => {
            eprintln!("Received SIGINT, shutting down...");
        }
        () = sigterm() => {
            eprintln!("Received SIGTERM, shutting down...");
        }
    }
    shutdown.cancel();
}

#[cfg(unix)]
async fn sigterm() {
    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            eprintln!("Failed to register SIGTERM handler: {e}");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn sigterm() {
    std::future::pending::<()>().await
}
