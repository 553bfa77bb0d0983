//! Configuration loading
//!
//! Embedded defaults first, then optional files, then environment.

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use shellmux_tools::BashConfig;

/// Embedded default configuration (compiled into binary)
pub const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Bash tool settings
    #[serde(default)]
    pub bash: BashConfig,
}

/// Load configuration from files and environment
pub fn load_config() -> Result<AppConfig> {
    let config = Config::builder()
        .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
        .add_source(File::with_name("config/local").required(false))
        // SHELLMUX_BASH__DEFAULT_TIMEOUT_MS -> bash.default_timeout_ms
        .add_source(
            Environment::with_prefix("SHELLMUX")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    config
        .try_deserialize()
        .context("Failed to deserialize configuration")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_defaults_match_builtin_defaults() {
        let config: AppConfig = Config::builder()
            .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        let builtin = BashConfig::default();

        assert_eq!(config.bash.default_timeout_ms, builtin.default_timeout_ms);
        assert_eq!(config.bash.max_timeout_ms, builtin.max_timeout_ms);
        assert_eq!(config.bash.max_output_bytes, builtin.max_output_bytes);
        assert_eq!(config.bash.close_grace_ms, builtin.close_grace_ms);
        assert_eq!(config.bash.default_session_id, builtin.default_session_id);
    }

    #[test]
    fn test_partial_section_keeps_defaults() {
        let config: AppConfig = Config::builder()
            .add_source(File::from_str(
                "[bash]\ndefault_timeout_ms = 5000\n",
                FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.bash.default_timeout_ms, 5000);
        assert_eq!(config.bash.max_timeout_ms, BashConfig::default().max_timeout_ms);
    }
}
