//! Command-line interface definitions
//!
//! Provides CLI argument parsing using clap for the agent bridge binary.

use std::path::PathBuf;

use clap::Parser;

use crate::types::{BridgeConfig, PermissionMode, Provider, SessionRequest};

/// Agent stream bridge - send one prompt to an agent process and stream the reply
#[derive(Parser, Debug, Clone)]
#[command(name = "agent-bridge")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable diagnostic mode (auto-log to temp file)
    #[arg(short, long)]
    pub diagnostic: bool,

    /// Log directory (implies diagnostic mode)
    #[arg(short = 'l', long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// Log file name (implies diagnostic mode)
    #[arg(short = 'f', long, value_name = "FILE")]
    pub log_file: Option<String>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    /// Note: RUST_LOG env var takes priority over this flag
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (only errors)
    /// Note: RUST_LOG env var takes priority over this flag
    #[arg(short, long)]
    pub quiet: bool,

    /// Agent provider (claude or codex)
    #[arg(short, long, default_value = "claude")]
    pub provider: Provider,

    /// Channel the send runs on
    #[arg(short, long, default_value = "default")]
    pub channel: String,

    /// Project directory for the agent
    #[arg(long, value_name = "DIR")]
    pub cwd: Option<PathBuf>,

    /// Resume an existing agent session
    #[arg(short, long, value_name = "ID")]
    pub session_id: Option<String>,

    /// Permission mode (default, acceptEdits, plan, bypassPermissions)
    #[arg(long, value_name = "MODE")]
    pub permission_mode: Option<PermissionMode>,

    /// Model to request
    #[arg(short, long)]
    pub model: Option<String>,

    /// Allow every permission request without asking
    #[arg(short, long)]
    pub yes: bool,

    /// Runtime executable used to launch the entry script
    #[arg(long, value_name = "PATH", env = "AGENT_BRIDGE_RUNTIME")]
    pub runtime: Option<PathBuf>,

    /// Directory containing the entry script
    #[arg(long, value_name = "DIR", env = "AGENT_BRIDGE_DIR")]
    pub bridge_dir: Option<PathBuf>,

    /// Prompt to send
    #[arg(value_name = "PROMPT", required = true)]
    pub prompt: Vec<String>,
}

#[allow(clippy::derivable_impls)]
impl Default for Cli {
    fn default() -> Self {
        Self {
            diagnostic: false,
            log_dir: None,
            log_file: None,
            verbose: 0,
            quiet: false,
            provider: Provider::default(),
            channel: "default".to_string(),
            cwd: None,
            session_id: None,
            permission_mode: None,
            model: None,
            yes: false,
            runtime: None,
            bridge_dir: None,
            prompt: Vec::new(),
        }
    }
}

impl Cli {
    /// Check if diagnostic mode is enabled (output to file)
    ///
    /// Returns true if `--diagnostic` is set, or if `--log-dir` or `--log-file` is specified.
    pub fn is_diagnostic(&self) -> bool {
        self.diagnostic || self.log_dir.is_some() || self.log_file.is_some()
    }

    /// Get the log level based on CLI arguments
    ///
    /// - `--quiet`: ERROR
    /// - default: WARN (stdout carries the reply, stderr stays readable)
    /// - `-v`: INFO
    /// - `-vv`: DEBUG
    /// - `-vvv` or more: TRACE
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else {
            match self.verbose {
                0 => tracing::Level::WARN,
                1 => tracing::Level::INFO,
                2 => tracing::Level::DEBUG,
                _ => tracing::Level::TRACE,
            }
        }
    }

    /// Get the log file path for diagnostic mode
    ///
    /// Uses the specified log directory and file name, or defaults to:
    /// - Directory: system temp directory
    /// - File: `agent-bridge-{timestamp}.log`
    pub fn log_path(&self) -> PathBuf {
        let dir = self
            .log_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);

        let filename = self.log_file.clone().unwrap_or_else(|| {
            let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
            format!("agent-bridge-{timestamp}.log")
        });

        dir.join(filename)
    }

    /// Prompt words joined into a single message
    pub fn prompt_text(&self) -> String {
        self.prompt.join(" ")
    }

    /// Bridge configuration: environment first, then command-line overrides
    pub fn bridge_config(&self) -> BridgeConfig {
        let mut config = BridgeConfig::from_env();
        if let Some(runtime) = &self.runtime {
            config.runtime = runtime.clone();
        }
        if let Some(dir) = &self.bridge_dir {
            config.bridge_dir = dir.clone();
        }
        config
    }

    pub fn to_request(&self) -> SessionRequest {
        let mut request = SessionRequest::new(self.prompt_text());
        request.cwd = self.cwd.clone();
        request.session_id = self.session_id.clone();
        request.permission_mode = self.permission_mode;
        request.model = self.model.clone();
        request
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_cli() {
        let cli = Cli::default();
        assert!(!cli.is_diagnostic());
        assert_eq!(cli.log_level(), tracing::Level::WARN);
        assert_eq!(cli.provider, Provider::Claude);
        assert_eq!(cli.channel, "default");
    }

    #[test]
    fn test_diagnostic_mode() {
        let cli = Cli {
            diagnostic: true,
            ..Default::default()
        };
        assert!(cli.is_diagnostic());
    }

    #[test]
    fn test_log_dir_implies_diagnostic() {
        let cli = Cli {
            log_dir: Some(PathBuf::from("/tmp")),
            ..Default::default()
        };
        assert!(cli.is_diagnostic());
    }

    #[test]
    fn test_log_file_implies_diagnostic() {
        let cli = Cli {
            log_file: Some("test.log".to_string()),
            ..Default::default()
        };
        assert!(cli.is_diagnostic());
    }

    #[test]
    fn test_log_levels() {
        let cli = Cli {
            quiet: true,
            ..Default::default()
        };
        assert_eq!(cli.log_level(), tracing::Level::ERROR);

        let cli = Cli {
            verbose: 1,
            ..Default::default()
        };
        assert_eq!(cli.log_level(), tracing::Level::INFO);

        let cli = Cli {
            verbose: 2,
            ..Default::default()
        };
        assert_eq!(cli.log_level(), tracing::Level::DEBUG);

        let cli = Cli {
            verbose: 3,
            ..Default::default()
        };
        assert_eq!(cli.log_level(), tracing::Level::TRACE);
    }

    #[test]
    fn test_log_path_custom_dir() {
        let cli = Cli {
            log_dir: Some(PathBuf::from("/var/log")),
            log_file: Some("test.log".to_string()),
            ..Default::default()
        };
        assert_eq!(cli.log_path(), PathBuf::from("/var/log/test.log"));
    }

    #[test]
    fn test_log_path_default_generates_timestamp() {
        let cli = Cli::default();
        let path = cli.log_path();

        assert!(path.starts_with(std::env::temp_dir()));

        let filename = path.file_name().unwrap().to_str().unwrap();
        assert!(filename.starts_with("agent-bridge-"));
        assert!(std::path::Path::new(filename)
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("log")));
    }

    #[test]
    fn test_parse_send_arguments() {
        let cli = Cli::try_parse_from([
            "agent-bridge",
            "--provider",
            "codex",
            "--channel",
            "tab-7",
            "--permission-mode",
            "plan",
            "-s",
            "sess-1",
            "-y",
            "fix",
            "the",
            "build",
        ])
        .unwrap();

        assert_eq!(cli.provider, Provider::Codex);
        assert_eq!(cli.channel, "tab-7");
        assert!(cli.yes);

        let request = cli.to_request();
        assert_eq!(request.message, "fix the build");
        assert_eq!(request.session_id.as_deref(), Some("sess-1"));
        assert_eq!(request.permission_mode, Some(PermissionMode::Plan));
        assert!(request.attachments.is_empty());
    }

    #[test]
    fn test_prompt_is_required() {
        assert!(Cli::try_parse_from(["agent-bridge"]).is_err());
    }

    #[test]
    fn test_unknown_provider_rejected() {
        assert!(Cli::try_parse_from(["agent-bridge", "--provider", "gpt", "hi"]).is_err());
    }
}
