//! Binary entry point logic
//!
//! Sets up logging, runs one send through a [`SessionBridge`], prints the
//! streamed reply to stdout and asks permission questions on stderr.

use std::str::FromStr;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::bridge::{BridgeUpdate, ChannelCallback, SessionBridge};
use crate::cli::Cli;
use crate::permission::{ChannelPresenter, PermissionDecision, PermissionPrompt, PermissionRendezvous};
use crate::protocol::DecodedEvent;
use crate::types::SessionResult;

/// Build EnvFilter with RUST_LOG priority
///
/// If RUST_LOG is set, use it directly (ignoring CLI args).
/// Otherwise, use CLI verbosity level.
fn build_env_filter(cli: &Cli) -> tracing_subscriber::EnvFilter {
    if let Ok(rust_log) = std::env::var("RUST_LOG") {
        if !rust_log.is_empty() {
            return tracing_subscriber::EnvFilter::new(rust_log);
        }
    }

    let level = cli.log_level();
    tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into())
}

/// Initialize logging with file output (diagnostic mode)
fn init_logging_to_file(cli: &Cli) -> anyhow::Result<()> {
    let filter = build_env_filter(cli);

    let log_path = cli.log_path();

    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = std::fs::File::create(&log_path)?;

    eprintln!("Diagnostic mode: logging to {}", log_path.display());

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::sync::Mutex::new(file))
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();

    Ok(())
}

/// Initialize logging with stderr output
fn init_logging_to_stderr(cli: &Cli) {
    let filter = build_env_filter(cli);

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

fn init_logging(cli: &Cli) -> anyhow::Result<()> {
    if cli.is_diagnostic() {
        init_logging_to_file(cli)
    } else {
        init_logging_to_stderr(cli);
        Ok(())
    }
}

/// Run one send with CLI arguments
///
/// Cancelling `shutdown` interrupts the running send; every process the
/// bridge started is cleaned up before returning.
pub async fn run_with_cli(cli: &Cli, shutdown: CancellationToken) -> anyhow::Result<()> {
    init_logging(cli)?;

    {
        let startup_span = tracing::info_span!(
            "bridge_startup",
            version = %env!("CARGO_PKG_VERSION"),
            pid = %std::process::id(),
            diagnostic = %cli.is_diagnostic(),
        );
        let _enter = startup_span.enter();

        tracing::info!("========== Agent Stream Bridge Starting ==========");
        tracing::info!(
            provider = %cli.provider,
            channel = %cli.channel,
            auto_allow = cli.yes,
            "Send configuration"
        );
        if cli.is_diagnostic() {
            tracing::info!(log_path = %cli.log_path().display(), "Diagnostic logging enabled");
        }
    }

    let config = cli.bridge_config();
    let (presenter, prompts) = ChannelPresenter::new();
    let bridge = SessionBridge::new(cli.provider, config, Arc::new(presenter));

    let permission_stop = CancellationToken::new();
    let poller = bridge
        .permission_file_channel()
        .spawn(permission_stop.clone());
    let answerer = tokio::spawn(answer_prompts(bridge.permissions().clone(), prompts, cli.yes));

    let (callback, updates) = ChannelCallback::new();
    let printer = tokio::spawn(print_updates(updates));
    let mut send = bridge.send(cli.channel.clone(), cli.to_request(), Arc::new(callback));

    let joined = tokio::select! {
        joined = &mut send => joined,
        () = shutdown.cancelled() => {
            tracing::info!(channel = %cli.channel, "Shutdown requested, interrupting send");
            bridge.interrupt(&cli.channel).await;
            send.await
        }
    };

    permission_stop.cancel();
    answerer.abort();
    let cleaned = bridge.shutdown().await;
    if cleaned > 0 {
        tracing::warn!(cleaned, "Terminated leftover agent processes");
    }
    drop(poller.await);
    drop(printer.await);

    let result = joined?;
    tracing::info!("========== Agent Stream Bridge Stopped ==========");
    report(&result)
}

fn report(result: &SessionResult) -> anyhow::Result<()> {
    if result.cancelled {
        eprintln!("Cancelled.");
        return Ok(());
    }
    match &result.error {
        Some(error) => Err(anyhow::anyhow!("{error}")),
        None => {
            if let Some(session_id) = &result.session_id {
                eprintln!("Session: {session_id}");
            }
            Ok(())
        }
    }
}

/// Stream decoded content to stdout
#[tracing::instrument(skip_all)]
async fn print_updates(mut updates: mpsc::UnboundedReceiver<BridgeUpdate>) {
    let mut stdout = tokio::io::stdout();
    let mut printed = String::new();

    while let Some(update) = updates.recv().await {
        let text = match update {
            BridgeUpdate::Event(DecodedEvent::ContentDelta(delta)) => delta,
            BridgeUpdate::Event(DecodedEvent::ContentChunk(chunk)) => {
                if printed.contains(chunk.as_str()) {
                    continue;
                }
                chunk
            }
            BridgeUpdate::Event(DecodedEvent::Thinking(thinking)) => {
                tracing::debug!(thinking = %thinking, "Agent thinking");
                continue;
            }
            BridgeUpdate::Event(_) => continue,
            BridgeUpdate::Error(_) => continue,
            BridgeUpdate::Complete(_) => "\n".to_string(),
        };

        printed.push_str(&text);
        if let Err(e) = write_flush(&mut stdout, &text).await {
            tracing::warn!(error = %e, "Failed to write to stdout");
            break;
        }
    }
}

async fn write_flush(stdout: &mut tokio::io::Stdout, text: &str) -> std::io::Result<()> {
    stdout.write_all(text.as_bytes()).await?;
    stdout.flush().await
}

/// Answer permission prompts from the terminal, or allow all with `--yes`
#[tracing::instrument(skip(rendezvous, prompts))]
async fn answer_prompts(
    rendezvous: PermissionRendezvous,
    mut prompts: mpsc::UnboundedReceiver<PermissionPrompt>,
    auto_allow: bool,
) {
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    while let Some(prompt) = prompts.recv().await {
        let title = prompt.title();
        let decision = if auto_allow {
            eprintln!("Allowed: {title}");
            PermissionDecision::Allow
        } else {
            eprint!("Permission requested: {title} [y]es / [a]lways / [n]o: ");
            match stdin.next_line().await {
                Ok(Some(answer)) => PermissionDecision::from_str(answer.trim()).unwrap_or_else(|_| {
                    eprintln!("Unrecognized answer, denying.");
                    PermissionDecision::Deny
                }),
                Ok(None) => PermissionDecision::Deny,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read permission answer");
                    PermissionDecision::Deny
                }
            }
        };

        if !rendezvous.resolve(&prompt.request_id, decision) {
            eprintln!("Permission request expired before it was answered.");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_env_filter_prefers_rust_log() {
        unsafe { std::env::set_var("RUST_LOG", "agent_bridge=trace") };
        let filter = build_env_filter(&Cli::default());
        unsafe { std::env::remove_var("RUST_LOG") };
        assert!(filter.to_string().contains("agent_bridge=trace"));
    }

    #[test]
    #[serial]
    fn test_env_filter_uses_cli_level() {
        unsafe { std::env::remove_var("RUST_LOG") };
        let cli = Cli {
            verbose: 2,
            ..Default::default()
        };
        let filter = build_env_filter(&cli);
        assert!(filter.to_string().contains("debug"));
    }

    #[test]
    fn test_report_outcomes() {
        assert!(report(&SessionResult {
            success: true,
            ..Default::default()
        })
        .is_ok());
        assert!(report(&SessionResult {
            cancelled: true,
            ..Default::default()
        })
        .is_ok());

        let err = report(&SessionResult::spawn_failed("boom")).unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }
}
