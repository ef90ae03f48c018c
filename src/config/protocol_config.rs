//! foldermail configuration file handling
//!
//! Loads and saves ~/.config/foldermail/config.yaml.

use crate::mail::{offset_hours, WaitOptions};
use crate::{FolderMailError, Result};
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Discovery wait settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitConfig {
    /// Seconds to wait for a counterpart message before giving up
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Milliseconds between mailbox scans
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_poll_interval_ms() -> u64 {
    1000
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// foldermail configuration
///
/// Represents the complete config.yaml: where the shared directory lives, who
/// this agent is, and how long to wait for the other side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Shared base directory holding inbox/ and outbox/
    pub base_dir: PathBuf,

    /// Agent name written into message headers (defaults to the role name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,

    /// Hours east of UTC for header timestamps
    #[serde(default = "default_offset_hours")]
    pub timestamp_offset_hours: i32,

    /// Length of the random task id suffix
    #[serde(default = "default_suffix_len")]
    pub task_suffix_len: usize,

    #[serde(default)]
    pub wait: WaitConfig,

    /// Remove orphaned temp files when a client starts
    #[serde(default = "default_true")]
    pub sweep_stale_temp: bool,

    /// Minimum age in seconds before a temp file counts as orphaned
    #[serde(default = "default_stale_temp_age")]
    pub stale_temp_age_secs: u64,
}

fn default_offset_hours() -> i32 {
    crate::mail::DEFAULT_OFFSET_HOURS
}

fn default_suffix_len() -> usize {
    2
}

fn default_true() -> bool {
    true
}

fn default_stale_temp_age() -> u64 {
    600
}

impl ProtocolConfig {
    /// Create a configuration for `base_dir` with defaults everywhere else
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            agent: None,
            timestamp_offset_hours: default_offset_hours(),
            task_suffix_len: default_suffix_len(),
            wait: WaitConfig::default(),
            sweep_stale_temp: default_true(),
            stale_temp_age_secs: default_stale_temp_age(),
        }
    }

    /// Load configuration from the default path (~/.config/foldermail/config.yaml)
    pub fn load_default() -> Result<Self> {
        Self::load(Self::default_path())
    }

    /// Load configuration from a specific path
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(FolderMailError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        tracing::info!(path = %path.display(), "Loading foldermail configuration");

        let content = fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;

        tracing::debug!(
            base_dir = %config.base_dir.display(),
            timeout_secs = config.wait.timeout_secs,
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    /// Save configuration to a specific path
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        tracing::info!(path = %path.display(), "Saving foldermail configuration");

        let yaml = serde_yaml::to_string(self)?;
        fs::write(path, yaml)?;

        Ok(())
    }

    /// Get the default config path (~/.config/foldermail/config.yaml)
    pub fn default_path() -> PathBuf {
        let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(".config");
        path.push("foldermail");
        path.push("config.yaml");
        path
    }

    /// Discovery settings as wait options
    pub fn wait_options(&self) -> WaitOptions {
        WaitOptions::new(
            Duration::from_secs(self.wait.timeout_secs),
            Duration::from_millis(self.wait.poll_interval_ms),
        )
    }

    /// Header timestamp offset
    pub fn offset(&self) -> Result<FixedOffset> {
        if !(-12..=14).contains(&self.timestamp_offset_hours) {
            return Err(FolderMailError::Config(format!(
                "timestamp_offset_hours out of range: {}",
                self.timestamp_offset_hours
            )));
        }
        Ok(offset_hours(self.timestamp_offset_hours))
    }

    pub fn stale_temp_age(&self) -> Duration {
        Duration::from_secs(self.stale_temp_age_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = ProtocolConfig::new("/shared/bridge");
        assert_eq!(config.timestamp_offset_hours, 9);
        assert_eq!(config.task_suffix_len, 2);
        assert_eq!(
            config.wait_options(),
            WaitOptions::new(Duration::from_secs(120), Duration::from_secs(1))
        );
        assert!(config.sweep_stale_temp);
        assert_eq!(config.stale_temp_age(), Duration::from_secs(600));
    }

    #[test]
    fn test_minimal_yaml_fills_defaults() {
        let config: ProtocolConfig = serde_yaml::from_str("base_dir: /shared/bridge\n").unwrap();
        assert_eq!(config, ProtocolConfig::new("/shared/bridge"));
    }

    #[test]
    fn test_partial_wait_section() {
        let yaml = "base_dir: /b\nagent: claude\nwait:\n  timeout_secs: 300\n";
        let config: ProtocolConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.agent.as_deref(), Some("claude"));
        assert_eq!(config.wait.timeout_secs, 300);
        assert_eq!(config.wait.poll_interval_ms, 1000);
    }

    #[test]
    fn test_save_and_load() {
        let mut config = ProtocolConfig::new("/shared/bridge");
        config.agent = Some("codex".to_string());
        config.timestamp_offset_hours = 0;

        let temp_file = NamedTempFile::new().unwrap();
        config.save(temp_file.path()).unwrap();

        let loaded = ProtocolConfig::load(temp_file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_missing_file() {
        let err = ProtocolConfig::load("/nonexistent/foldermail.yaml").unwrap_err();
        assert!(matches!(err, FolderMailError::Config(_)));
    }

    #[test]
    fn test_offset() {
        let mut config = ProtocolConfig::new("/b");
        assert_eq!(config.offset().unwrap().local_minus_utc(), 9 * 3600);

        config.timestamp_offset_hours = -5;
        assert_eq!(config.offset().unwrap().local_minus_utc(), -5 * 3600);

        config.timestamp_offset_hours = 20;
        assert!(config.offset().is_err());
    }

    #[test]
    fn test_default_path() {
        let path = ProtocolConfig::default_path();
        assert!(path.ends_with(".config/foldermail/config.yaml"));
    }
}
