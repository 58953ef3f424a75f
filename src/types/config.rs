//! Bridge configuration from environment variables

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default deadline for a permission decision
pub const DEFAULT_PERMISSION_TIMEOUT: Duration = Duration::from_secs(35);

/// Name of the shared scratch directory under the system temp dir
pub const SCRATCH_DIR_NAME: &str = "claude-agent-tmp";

/// Name of the permission IPC directory under the system temp dir
pub const PERMISSION_DIR_NAME: &str = "claude-permission";

/// Bridge configuration
///
/// Locates the agent runtime and entry script, and carries the opaque
/// provider credentials forwarded to every spawned process.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Runtime executable used to launch the entry script
    /// Environment variable: `AGENT_BRIDGE_RUNTIME`
    pub runtime: PathBuf,

    /// Directory containing the entry script; fallback working directory
    /// Environment variable: `AGENT_BRIDGE_DIR`
    pub bridge_dir: PathBuf,

    /// Entry script file name inside `bridge_dir`
    /// Environment variable: `AGENT_BRIDGE_SCRIPT`
    pub entry_script: String,

    /// Directory polled for permission request files
    /// Environment variable: `CLAUDE_PERMISSION_DIR`
    pub permission_dir: PathBuf,

    /// Deadline for a permission decision
    /// Environment variable: `AGENT_BRIDGE_PERMISSION_TIMEOUT_SECS`
    pub permission_timeout: Duration,

    /// Shared scratch directory for per-process marker files
    /// Environment variable: `AGENT_BRIDGE_SCRATCH_DIR`
    pub scratch_root: PathBuf,

    /// API base URL
    /// Environment variable: `ANTHROPIC_BASE_URL`
    pub base_url: Option<String>,

    /// API key
    /// Environment variable: `ANTHROPIC_API_KEY` (preferred) or `ANTHROPIC_AUTH_TOKEN` (legacy)
    pub api_key: Option<String>,

    /// Additional variables applied last to the child environment
    pub extra_env: HashMap<String, String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        let tmp = std::env::temp_dir();
        Self {
            runtime: PathBuf::from("node"),
            bridge_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            entry_script: "channel-manager.js".to_string(),
            permission_dir: tmp.join(PERMISSION_DIR_NAME),
            permission_timeout: DEFAULT_PERMISSION_TIMEOUT,
            scratch_root: tmp.join(SCRATCH_DIR_NAME),
            base_url: None,
            api_key: None,
            extra_env: HashMap::new(),
        }
    }
}

impl BridgeConfig {
    /// Create a configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables
    ///
    /// Unset or unparsable variables keep their defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(runtime) = env_non_empty("AGENT_BRIDGE_RUNTIME") {
            config.runtime = PathBuf::from(runtime);
        }
        if let Some(dir) = env_non_empty("AGENT_BRIDGE_DIR") {
            config.bridge_dir = PathBuf::from(dir);
        }
        if let Some(script) = env_non_empty("AGENT_BRIDGE_SCRIPT") {
            config.entry_script = script;
        }
        if let Some(dir) = env_non_empty("CLAUDE_PERMISSION_DIR") {
            config.permission_dir = PathBuf::from(dir);
        }
        if let Some(secs) = env_non_empty("AGENT_BRIDGE_PERMISSION_TIMEOUT_SECS")
            .and_then(|s| s.parse::<u64>().ok())
        {
            config.permission_timeout = Duration::from_secs(secs);
        }
        if let Some(dir) = env_non_empty("AGENT_BRIDGE_SCRATCH_DIR") {
            config.scratch_root = PathBuf::from(dir);
        }

        config.base_url = env_non_empty("ANTHROPIC_BASE_URL");
        // Prefer ANTHROPIC_API_KEY, fallback to ANTHROPIC_AUTH_TOKEN for compatibility
        config.api_key =
            env_non_empty("ANTHROPIC_API_KEY").or_else(|| env_non_empty("ANTHROPIC_AUTH_TOKEN"));

        config
    }

    pub fn with_runtime(mut self, runtime: impl Into<PathBuf>) -> Self {
        self.runtime = runtime.into();
        self
    }

    pub fn with_bridge_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.bridge_dir = dir.into();
        self
    }

    pub fn with_entry_script(mut self, script: impl Into<String>) -> Self {
        self.entry_script = script.into();
        self
    }

    pub fn with_permission_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.permission_dir = dir.into();
        self
    }

    pub fn with_permission_timeout(mut self, timeout: Duration) -> Self {
        self.permission_timeout = timeout;
        self
    }

    pub fn with_scratch_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_root = dir.into();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_env.insert(key.into(), value.into());
        self
    }

    /// Full path of the entry script
    pub fn entry_script_path(&self) -> PathBuf {
        self.bridge_dir.join(&self.entry_script)
    }

    /// Directory holding the runtime executable, when the runtime is a path
    pub fn runtime_dir(&self) -> Option<&Path> {
        self.runtime
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
    }

    /// Credential variables to pass to the agent process
    pub fn to_env_vars(&self) -> HashMap<String, String> {
        let mut env = HashMap::new();

        if let Some(ref url) = self.base_url {
            env.insert("ANTHROPIC_BASE_URL".to_string(), url.clone());
        }
        if let Some(ref key) = self.api_key {
            env.insert("ANTHROPIC_API_KEY".to_string(), key.clone());
        }

        env
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "AGENT_BRIDGE_RUNTIME",
        "AGENT_BRIDGE_DIR",
        "AGENT_BRIDGE_SCRIPT",
        "CLAUDE_PERMISSION_DIR",
        "AGENT_BRIDGE_PERMISSION_TIMEOUT_SECS",
        "AGENT_BRIDGE_SCRATCH_DIR",
        "ANTHROPIC_BASE_URL",
        "ANTHROPIC_API_KEY",
        "ANTHROPIC_AUTH_TOKEN",
    ];

    fn clear_vars() {
        for var in VARS {
            // SAFETY: serialized by #[serial], no other thread reads the environment
            unsafe { std::env::remove_var(var) };
        }
    }

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert_eq!(config.runtime, PathBuf::from("node"));
        assert_eq!(config.entry_script, "channel-manager.js");
        assert_eq!(config.permission_timeout, Duration::from_secs(35));
        assert!(config.scratch_root.ends_with(SCRATCH_DIR_NAME));
        assert!(config.to_env_vars().is_empty());
    }

    #[test]
    #[serial]
    fn test_from_env() {
        clear_vars();
        // SAFETY: serialized by #[serial]
        unsafe {
            std::env::set_var("AGENT_BRIDGE_RUNTIME", "/opt/node/bin/node");
            std::env::set_var("AGENT_BRIDGE_PERMISSION_TIMEOUT_SECS", "5");
            std::env::set_var("ANTHROPIC_AUTH_TOKEN", "legacy-token");
            std::env::set_var("ANTHROPIC_BASE_URL", "https://api.example.com");
        }

        let config = BridgeConfig::from_env();
        clear_vars();

        assert_eq!(config.runtime, PathBuf::from("/opt/node/bin/node"));
        assert_eq!(config.runtime_dir(), Some(Path::new("/opt/node/bin")));
        assert_eq!(config.permission_timeout, Duration::from_secs(5));
        assert_eq!(config.api_key.as_deref(), Some("legacy-token"));

        let env = config.to_env_vars();
        assert_eq!(env.get("ANTHROPIC_API_KEY").unwrap(), "legacy-token");
        assert_eq!(
            env.get("ANTHROPIC_BASE_URL").unwrap(),
            "https://api.example.com"
        );
    }

    #[test]
    #[serial]
    fn test_from_env_ignores_invalid_timeout() {
        clear_vars();
        // SAFETY: serialized by #[serial]
        unsafe { std::env::set_var("AGENT_BRIDGE_PERMISSION_TIMEOUT_SECS", "soon") };

        let config = BridgeConfig::from_env();
        clear_vars();

        assert_eq!(config.permission_timeout, DEFAULT_PERMISSION_TIMEOUT);
    }

    #[test]
    fn test_runtime_dir_for_bare_name() {
        let config = BridgeConfig::default();
        assert!(config.runtime_dir().is_none());
    }

    #[test]
    fn test_entry_script_path() {
        let config = BridgeConfig::new()
            .with_bridge_dir("/opt/bridge")
            .with_entry_script("main.js");
        assert_eq!(config.entry_script_path(), PathBuf::from("/opt/bridge/main.js"));
    }
}
