//! Configuration system
//!
//! Loads ~/.config/foldermail/config.yaml with support for:
//! - The shared base directory
//! - Agent name and header timestamp offset
//! - Discovery timeout and poll interval
//! - Stale temp file sweeping

mod protocol_config;
pub mod validation;

pub use protocol_config::{ProtocolConfig, WaitConfig};
pub use validation::{validate_config, validate_config_result, ValidationError};
