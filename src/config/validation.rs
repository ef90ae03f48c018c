//! Configuration validation
//!
//! Checks a foldermail configuration for correctness:
//! - Base directory is set and is not a file
//! - Timestamp offset is a real UTC offset
//! - Wait and suffix settings are usable

use super::protocol_config::ProtocolConfig;
use crate::FolderMailError;

/// Longest task id suffix accepted
const MAX_SUFFIX_LEN: usize = 16;

/// Validation error details
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validation result
pub type ValidationResult = std::result::Result<(), Vec<ValidationError>>;

/// Validate a foldermail configuration, collecting every problem
pub fn validate_config(config: &ProtocolConfig) -> ValidationResult {
    let mut errors = Vec::new();

    if config.base_dir.as_os_str().is_empty() {
        errors.push(ValidationError::new("base_dir", "Base directory cannot be empty"));
    } else if config.base_dir.is_file() {
        errors.push(ValidationError::new(
            "base_dir",
            format!("{} is a file, not a directory", config.base_dir.display()),
        ));
    }

    if let Some(ref agent) = config.agent {
        if agent.trim().is_empty() {
            errors.push(ValidationError::new("agent", "Agent name cannot be blank"));
        } else if agent.contains(['\n', '\r']) {
            errors.push(ValidationError::new("agent", "Agent name must be a single line"));
        }
    }

    if !(-12..=14).contains(&config.timestamp_offset_hours) {
        errors.push(ValidationError::new(
            "timestamp_offset_hours",
            format!(
                "Offset {} is outside -12..=14",
                config.timestamp_offset_hours
            ),
        ));
    }

    if config.task_suffix_len == 0 || config.task_suffix_len > MAX_SUFFIX_LEN {
        errors.push(ValidationError::new(
            "task_suffix_len",
            format!("Suffix length must be between 1 and {}", MAX_SUFFIX_LEN),
        ));
    }

    if config.wait.poll_interval_ms == 0 {
        errors.push(ValidationError::new(
            "wait.poll_interval_ms",
            "Poll interval must be greater than 0",
        ));
    }

    if config.wait.poll_interval_ms > config.wait.timeout_secs.saturating_mul(1000)
        && config.wait.timeout_secs > 0
    {
        tracing::warn!(
            poll_interval_ms = config.wait.poll_interval_ms,
            timeout_secs = config.wait.timeout_secs,
            "Poll interval exceeds timeout; waits will scan only at start and deadline"
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate a configuration and fold the problems into one error
pub fn validate_config_result(config: &ProtocolConfig) -> crate::Result<()> {
    validate_config(config).map_err(|errors| {
        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        FolderMailError::Config(format!(
            "Configuration validation failed:\n  - {}",
            messages.join("\n  - ")
        ))
    })
}
