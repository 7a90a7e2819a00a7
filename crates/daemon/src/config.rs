//! Configuration management for the workscope daemon.
//!
//! Configuration is loaded from TOML files in the following locations
//! (in order):
//! 1. `$XDG_CONFIG_HOME/workscope/config.toml`
//! 2. `~/.config/workscope/config.toml`
//! 3. `./config.toml` (current directory, for development)

use std::path::PathBuf;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use workscope_core_state::{ClassificationRule, Project};

/// Main configuration structure for the daemon.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Daemon process configuration.
    pub daemon: DaemonConfig,
    /// Window-manager connection configuration.
    pub wm: WmConfig,
    /// Event buffer retention.
    pub events: EventsConfig,
    /// Layout restore behavior.
    pub restore: RestoreConfig,
    /// Project definitions.
    #[serde(default)]
    pub projects: Vec<ProjectConfig>,
    /// Classification rules, evaluated in priority then declaration order.
    #[serde(default)]
    pub rules: Vec<ClassificationRule>,
}

/// Daemon process configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Client IPC socket path. Defaults to the runtime directory.
    pub socket_path: Option<PathBuf>,

    /// Directory for persisted state, layouts and the event log.
    /// Defaults to the user data directory.
    pub state_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Peer UIDs allowed on the client socket, in addition to the daemon's
    /// own user.
    #[serde(default)]
    pub allowed_uids: Vec<u32>,

    /// Seconds between state/event-log checkpoints to disk.
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval_secs: u64,

    /// Seconds between periodic drift checks against the live WM tree.
    #[serde(default = "default_validate_interval")]
    pub validate_interval_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: None,
            state_dir: None,
            log_level: default_log_level(),
            allowed_uids: Vec::new(),
            checkpoint_interval_secs: default_checkpoint_interval(),
            validate_interval_secs: default_validate_interval(),
        }
    }
}

/// Window-manager connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WmConfig {
    /// WM IPC socket path. Falls back to `$WORKSCOPE_WM_SOCKET`, then to
    /// `wm.sock` in the runtime directory.
    pub socket_path: Option<PathBuf>,

    /// Seconds before an unanswered WM command counts as connection loss.
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// Reconnect backoff base in seconds.
    #[serde(default = "default_backoff_base")]
    pub backoff_base_secs: u64,

    /// Reconnect backoff cap in seconds.
    #[serde(default = "default_backoff_cap")]
    pub backoff_cap_secs: u64,
}

impl Default for WmConfig {
    fn default() -> Self {
        Self {
            socket_path: None,
            command_timeout_secs: default_command_timeout(),
            backoff_base_secs: default_backoff_base(),
            backoff_cap_secs: default_backoff_cap(),
        }
    }
}

/// Event buffer retention configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Maximum retained entries.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Maximum entry age in seconds; unset disables age pruning.
    #[serde(default)]
    pub max_age_secs: Option<u64>,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            max_age_secs: None,
        }
    }
}

/// Layout restore configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RestoreConfig {
    /// Seconds to wait for a launched placeholder's window to appear.
    #[serde(default = "default_correlation_timeout")]
    pub correlation_timeout_secs: u64,
}

impl Default for RestoreConfig {
    fn default() -> Self {
        Self {
            correlation_timeout_secs: default_correlation_timeout(),
        }
    }
}

/// A project definition as it appears in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Unique slug-form name.
    pub name: String,
    /// Project directory.
    pub directory: PathBuf,
    /// Window classes scoped to this project.
    #[serde(default)]
    pub window_classes: Vec<String>,
    /// Capture a layout automatically on clean shutdown.
    #[serde(default)]
    pub auto_save: bool,
    /// Layout restored when the project is brought up.
    #[serde(default)]
    pub default_layout: Option<String>,
}

impl From<ProjectConfig> for Project {
    fn from(config: ProjectConfig) -> Self {
        Project {
            name: config.name,
            directory: config.directory,
            window_classes: config.window_classes,
            auto_save: config.auto_save,
            default_layout: config.default_layout,
        }
    }
}

// Default value functions for serde

fn default_log_level() -> String {
    "info".to_string()
}

fn default_checkpoint_interval() -> u64 {
    60
}

fn default_validate_interval() -> u64 {
    300
}

fn default_command_timeout() -> u64 {
    3
}

fn default_backoff_base() -> u64 {
    1
}

fn default_backoff_cap() -> u64 {
    30
}

fn default_max_entries() -> usize {
    10_000
}

fn default_correlation_timeout() -> u64 {
    5
}

/// A clamped or suspicious config value, reported at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigWarning {
    pub field: String,
    pub message: String,
}

impl Config {
    /// Load configuration from standard locations, falling back to defaults
    /// when no file exists.
    pub fn load() -> Result<Self> {
        for path in config_paths() {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                return Self::load_from_path(&path);
            }
        }
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific path.
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Validate and clamp config values, returning warnings for anything
    /// adjusted or suspicious.
    pub fn validate(&mut self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.wm.backoff_base_secs == 0 {
            self.wm.backoff_base_secs = default_backoff_base();
            warnings.push(ConfigWarning {
                field: "wm.backoff_base_secs".to_string(),
                message: "must be at least 1, using default".to_string(),
            });
        }
        if self.wm.backoff_cap_secs < self.wm.backoff_base_secs {
            self.wm.backoff_cap_secs = self.wm.backoff_base_secs;
            warnings.push(ConfigWarning {
                field: "wm.backoff_cap_secs".to_string(),
                message: "below backoff base, clamped to base".to_string(),
            });
        }
        if self.wm.command_timeout_secs == 0 {
            self.wm.command_timeout_secs = default_command_timeout();
            warnings.push(ConfigWarning {
                field: "wm.command_timeout_secs".to_string(),
                message: "must be at least 1, using default".to_string(),
            });
        }
        if self.restore.correlation_timeout_secs == 0 {
            self.restore.correlation_timeout_secs = default_correlation_timeout();
            warnings.push(ConfigWarning {
                field: "restore.correlation_timeout_secs".to_string(),
                message: "must be at least 1, using default".to_string(),
            });
        }
        if self.events.max_entries == 0 {
            self.events.max_entries = default_max_entries();
            warnings.push(ConfigWarning {
                field: "events.max_entries".to_string(),
                message: "must be at least 1, using default".to_string(),
            });
        }

        let mut seen = std::collections::HashSet::new();
        for project in &self.projects {
            if !seen.insert(project.name.as_str()) {
                warnings.push(ConfigWarning {
                    field: "projects".to_string(),
                    message: format!("duplicate project name '{}'", project.name),
                });
            }
        }
        for rule in &self.rules {
            if rule.target != workscope_core_state::GLOBAL_PROJECT
                && !self.projects.iter().any(|p| p.name == rule.target)
            {
                warnings.push(ConfigWarning {
                    field: "rules".to_string(),
                    message: format!(
                        "rule '{}' targets unknown project '{}'",
                        rule.pattern, rule.target
                    ),
                });
            }
        }

        warnings
    }

    /// Resolved client socket path.
    pub fn socket_path(&self) -> PathBuf {
        self.daemon
            .socket_path
            .clone()
            .unwrap_or_else(workscope_ipc::default_socket_path)
    }

    /// Resolved state directory.
    pub fn state_dir(&self) -> PathBuf {
        self.daemon.state_dir.clone().unwrap_or_else(|| {
            ProjectDirs::from("", "", "workscope")
                .map(|dirs| dirs.data_dir().to_path_buf())
                .unwrap_or_else(|| PathBuf::from(".workscope"))
        })
    }

    /// Resolved WM socket path: config value, `$WORKSCOPE_WM_SOCKET`, then
    /// `wm.sock` next to the client socket.
    pub fn wm_socket_path(&self) -> PathBuf {
        if let Some(path) = &self.wm.socket_path {
            return path.clone();
        }
        if let Some(path) = std::env::var_os("WORKSCOPE_WM_SOCKET") {
            return PathBuf::from(path);
        }
        self.socket_path().with_file_name("wm.sock")
    }

    /// Projects converted to the core model.
    pub fn core_projects(&self) -> Vec<Project> {
        self.projects.iter().cloned().map(Project::from).collect()
    }
}

/// All possible config file paths in priority order.
pub fn config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Some(proj_dirs) = ProjectDirs::from("", "", "workscope") {
        paths.push(proj_dirs.config_dir().join("config.toml"));
    }

    if let Some(base) = directories::BaseDirs::new() {
        paths.push(
            base.home_dir()
                .join(".config")
                .join("workscope")
                .join("config.toml"),
        );
    }

    paths.push(PathBuf::from("config.toml"));
    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use workscope_core_state::{MatchField, PatternKind};

    #[test]
    fn default_config_is_sane() {
        let config = Config::default();
        assert_eq!(config.daemon.log_level, "info");
        assert_eq!(config.wm.backoff_base_secs, 1);
        assert_eq!(config.wm.backoff_cap_secs, 30);
        assert_eq!(config.wm.command_timeout_secs, 3);
        assert_eq!(config.restore.correlation_timeout_secs, 5);
        assert_eq!(config.events.max_entries, 10_000);
        assert!(config.projects.is_empty());
        assert!(config.rules.is_empty());
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [wm]
            command_timeout_secs = 10
            "#,
        )
        .unwrap();
        assert_eq!(config.wm.command_timeout_secs, 10);
        assert_eq!(config.wm.backoff_base_secs, 1); // default
        assert_eq!(config.daemon.checkpoint_interval_secs, 60); // default
    }

    #[test]
    fn full_config_parses() {
        let config: Config = toml::from_str(
            r#"
            [daemon]
            log_level = "debug"
            allowed_uids = [1000, 1001]
            checkpoint_interval_secs = 30

            [wm]
            socket_path = "/run/user/1000/niri.sock"
            backoff_base_secs = 2
            backoff_cap_secs = 60

            [events]
            max_entries = 500
            max_age_secs = 3600

            [restore]
            correlation_timeout_secs = 8

            [[projects]]
            name = "dev"
            directory = "/home/u/dev"
            window_classes = ["Ghostty"]
            auto_save = true
            default_layout = "main"

            [[rules]]
            pattern = "Ghostty"
            field = "class"
            kind = "exact"
            target = "dev"
            priority = 1

            [[rules]]
            pattern = ".*"
            kind = "regex"
            target = "global"
            priority = 99
            "#,
        )
        .unwrap();

        assert_eq!(config.daemon.allowed_uids, vec![1000, 1001]);
        assert_eq!(config.events.max_age_secs, Some(3600));
        assert_eq!(config.projects.len(), 1);
        assert!(config.projects[0].auto_save);
        assert_eq!(config.rules.len(), 2);
        assert_eq!(config.rules[0].field, MatchField::Class);
        assert_eq!(config.rules[0].kind, PatternKind::Exact);
        assert_eq!(config.rules[1].priority, 99);
    }

    #[test]
    fn validate_clamps_zero_values() {
        let mut config: Config = toml::from_str(
            r#"
            [wm]
            backoff_base_secs = 0
            command_timeout_secs = 0

            [events]
            max_entries = 0
            "#,
        )
        .unwrap();
        let warnings = config.validate();
        assert_eq!(warnings.len(), 3);
        assert_eq!(config.wm.backoff_base_secs, 1);
        assert_eq!(config.wm.command_timeout_secs, 3);
        assert_eq!(config.events.max_entries, 10_000);
    }

    #[test]
    fn validate_clamps_cap_below_base() {
        let mut config: Config = toml::from_str(
            r#"
            [wm]
            backoff_base_secs = 10
            backoff_cap_secs = 2
            "#,
        )
        .unwrap();
        config.validate();
        assert_eq!(config.wm.backoff_cap_secs, 10);
    }

    #[test]
    fn validate_reports_unknown_rule_targets_and_duplicates() {
        let mut config: Config = toml::from_str(
            r#"
            [[projects]]
            name = "dev"
            directory = "/home/u/dev"

            [[projects]]
            name = "dev"
            directory = "/home/u/dev2"

            [[rules]]
            pattern = "Slack"
            target = "chat"
            "#,
        )
        .unwrap();
        let warnings = config.validate();
        assert!(warnings.iter().any(|w| w.field == "projects"));
        assert!(warnings.iter().any(|w| w.field == "rules"));
    }

    #[test]
    fn global_rule_target_is_not_a_warning() {
        let mut config: Config = toml::from_str(
            r#"
            [[rules]]
            pattern = ".*"
            kind = "regex"
            target = "global"
            "#,
        )
        .unwrap();
        assert!(config.validate().is_empty());
    }

    #[test]
    fn config_paths_not_empty() {
        assert!(!config_paths().is_empty());
    }

    #[test]
    fn config_serialization_roundtrip() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.daemon.log_level, config.daemon.log_level);
        assert_eq!(parsed.wm.backoff_cap_secs, config.wm.backoff_cap_secs);
    }
}
