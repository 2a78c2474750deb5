//! Engine configuration via `ledgerwire.toml`
//!
//! Limits applied to untrusted payloads and switches for optional behaviour.
//! Every field has a default, so an empty file is a valid configuration.

use crate::error::{Result, SerializationError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Conventional config file name.
pub const CONFIG_FILE_NAME: &str = "ledgerwire.toml";

/// Engine configuration.
///
/// # Example
///
/// ```toml
/// max_envelope_bytes = 10485760
/// max_depth = 256
/// max_collection_len = 1000000
/// carpenter_enabled = true
/// object_references = true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializationConfig {
    /// Largest envelope accepted by the decoder.
    #[serde(default = "default_max_envelope_bytes")]
    pub max_envelope_bytes: usize,
    /// Deepest nesting of described values accepted by the decoder.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// Largest collection accepted by the decoder.
    #[serde(default = "default_max_collection_len")]
    pub max_collection_len: usize,
    /// Synthesize placeholder types for unknown schema entries.
    #[serde(default = "default_true")]
    pub carpenter_enabled: bool,
    /// Emit back-references for objects that appear more than once.
    #[serde(default = "default_true")]
    pub object_references: bool,
}

fn default_max_envelope_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_max_depth() -> usize {
    256
}

fn default_max_collection_len() -> usize {
    1_000_000
}

fn default_true() -> bool {
    true
}

impl Default for SerializationConfig {
    fn default() -> Self {
        SerializationConfig {
            max_envelope_bytes: default_max_envelope_bytes(),
            max_depth: default_max_depth(),
            max_collection_len: default_max_collection_len(),
            carpenter_enabled: true,
            object_references: true,
        }
    }
}

impl SerializationConfig {
    /// Reject limits that would make every payload fail.
    pub fn validate(&self) -> Result<()> {
        if self.max_depth == 0 {
            return Err(SerializationError::Config(
                "max_depth must be at least 1".to_string(),
            ));
        }
        if self.max_envelope_bytes < crate::envelope::MIN_ENVELOPE_SIZE {
            return Err(SerializationError::Config(format!(
                "max_envelope_bytes must be at least {}",
                crate::envelope::MIN_ENVELOPE_SIZE
            )));
        }
        Ok(())
    }

    /// Parse TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: SerializationConfig = toml::from_str(text)
            .map_err(|e| SerializationError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SerializationError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Serialize to TOML text.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| SerializationError::Config(format!("Failed to serialize config: {}", e)))
    }

    /// Default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# ledgerwire configuration
#
# Largest envelope the decoder accepts, in bytes (default: 10 MiB).
max_envelope_bytes = 10485760

# Deepest nesting of described values the decoder accepts (default: 256).
max_depth = 256

# Largest list, set, array or map the decoder accepts (default: 1000000).
max_collection_len = 1000000

# Synthesize placeholder types for schema entries unknown to this process.
# When false, payloads mentioning unknown types are rejected.
carpenter_enabled = true

# Write repeated objects once and refer back to them.
object_references = true
"#
    }
}
