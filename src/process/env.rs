//! Environment for spawned agent processes

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::types::BridgeConfig;

/// Builds the variables layered over the inherited environment of an agent
/// process
#[derive(Debug)]
pub struct EnvironmentBuilder<'a> {
    config: &'a BridgeConfig,
    channel_id: Option<&'a str>,
    project_dir: Option<&'a Path>,
    scratch_dir: Option<&'a Path>,
}

impl<'a> EnvironmentBuilder<'a> {
    pub fn new(config: &'a BridgeConfig) -> Self {
        Self {
            config,
            channel_id: None,
            project_dir: None,
            scratch_dir: None,
        }
    }

    pub fn channel_id(mut self, channel_id: &'a str) -> Self {
        self.channel_id = Some(channel_id);
        self
    }

    pub fn project_dir(mut self, dir: &'a Path) -> Self {
        self.project_dir = Some(dir);
        self
    }

    pub fn scratch_dir(mut self, dir: &'a Path) -> Self {
        self.scratch_dir = Some(dir);
        self
    }

    pub fn build(&self) -> HashMap<String, String> {
        let mut env = HashMap::new();

        env.insert("CLAUDE_USE_STDIN".to_string(), "true".to_string());
        env.insert(
            "CLAUDE_PERMISSION_DIR".to_string(),
            self.config.permission_dir.to_string_lossy().into_owned(),
        );

        if let Some(dir) = self.scratch_dir {
            let dir = dir.to_string_lossy().into_owned();
            for key in ["TMPDIR", "TEMP", "TMP"] {
                env.insert(key.to_string(), dir.clone());
            }
        }

        if let Some(dir) = self.project_dir {
            env.insert(
                "PROJECT_PATH".to_string(),
                dir.to_string_lossy().into_owned(),
            );
        }

        if let Some(channel_id) = self.channel_id {
            env.insert("CLAUDE_CHANNEL_ID".to_string(), channel_id.to_string());
        }

        if let Some(path) = self.config.runtime_dir().and_then(prepend_to_path) {
            // Some Windows programs only read `Path`
            #[cfg(windows)]
            env.insert("Path".to_string(), path.clone());
            env.insert("PATH".to_string(), path);
        }

        if std::env::var_os("HOME").is_none_or(|home| home.is_empty()) {
            if let Some(home) = dirs::home_dir() {
                env.insert("HOME".to_string(), home.to_string_lossy().into_owned());
            }
        }

        env.extend(self.config.to_env_vars());
        env.extend(
            self.config
                .extra_env
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );

        env
    }
}

/// `PATH` with `dir` in front, or `None` if it is already present
fn prepend_to_path(dir: &Path) -> Option<String> {
    let current = std::env::var_os("PATH").unwrap_or_default();
    let mut paths: Vec<PathBuf> = std::env::split_paths(&current).collect();
    if paths.iter().any(|p| p == dir) {
        return None;
    }
    paths.insert(0, dir.to_path_buf());
    std::env::join_paths(paths)
        .ok()
        .map(|joined| joined.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_base_variables() {
        let config = BridgeConfig::new().with_permission_dir("/tmp/perm");
        let env = EnvironmentBuilder::new(&config)
            .channel_id("tab-1")
            .project_dir(Path::new("/work"))
            .scratch_dir(Path::new("/tmp/scratch"))
            .build();

        assert_eq!(env["CLAUDE_USE_STDIN"], "true");
        assert_eq!(env["CLAUDE_PERMISSION_DIR"], "/tmp/perm");
        assert_eq!(env["CLAUDE_CHANNEL_ID"], "tab-1");
        assert_eq!(env["PROJECT_PATH"], "/work");
        assert_eq!(env["TMPDIR"], "/tmp/scratch");
        assert_eq!(env["TEMP"], "/tmp/scratch");
        assert_eq!(env["TMP"], "/tmp/scratch");
    }

    #[test]
    #[serial]
    fn test_credentials_and_extra_env_applied_last() {
        let mut config = BridgeConfig::new().with_env("CLAUDE_USE_STDIN", "override");
        config.api_key = Some("secret".to_string());

        let env = EnvironmentBuilder::new(&config).build();

        assert_eq!(env["ANTHROPIC_API_KEY"], "secret");
        assert_eq!(env["CLAUDE_USE_STDIN"], "override");
        assert!(!env.contains_key("PROJECT_PATH"));
    }

    #[cfg(unix)]
    #[test]
    #[serial]
    fn test_runtime_dir_prepended_once() {
        let config = BridgeConfig::new().with_runtime("/opt/agent-runtime/bin/node");
        let env = EnvironmentBuilder::new(&config).build();
        assert!(env["PATH"].starts_with("/opt/agent-runtime/bin"));

        assert!(prepend_to_path(Path::new("/opt/agent-runtime/bin")).is_some());
        let current = std::env::var("PATH").unwrap_or_default();
        if let Some(first) = current.split(':').next().filter(|s| !s.is_empty()) {
            assert!(prepend_to_path(Path::new(first)).is_none());
        }
    }

    #[test]
    #[serial]
    fn test_bare_runtime_leaves_path_alone() {
        let config = BridgeConfig::new();
        let env = EnvironmentBuilder::new(&config).build();
        assert!(!env.contains_key("PATH"));
    }
}
