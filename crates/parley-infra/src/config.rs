//! Configuration loader for Parley.
//!
//! Reads `config.toml` from the data directory (`~/.parley/` in production)
//! and deserializes it into [`MessagingConfig`]. Falls back to defaults when
//! the file is missing or malformed.

use std::path::{Path, PathBuf};

use parley_types::config::MessagingConfig;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "PARLEY_DATA_DIR";

/// The data directory: `PARLEY_DATA_DIR`, else `~/.parley`.
pub fn data_dir() -> PathBuf {
    match std::env::var(DATA_DIR_ENV) {
        Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".parley"),
    }
}

/// Load configuration from `{data_dir}/config.toml`.
///
/// - Missing file: [`MessagingConfig::default()`].
/// - Unreadable or unparsable file: logs a warning and returns the default.
/// - Otherwise the parsed config; fields absent from the file keep their defaults.
pub async fn load_config(data_dir: &Path) -> MessagingConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return MessagingConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return MessagingConfig::default();
        }
    };

    match toml::from_str::<MessagingConfig>(&content) {
        Ok(config) => sanitize(config),
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            MessagingConfig::default()
        }
    }
}

/// Keep page sizes usable even when the file sets nonsense.
fn sanitize(mut config: MessagingConfig) -> MessagingConfig {
    config.max_page_size = config.max_page_size.max(1);
    config.default_page_size = config.default_page_size.clamp(1, config.max_page_size);
    config.conflict_retry_attempts = config.conflict_retry_attempts.max(1);
    config.event_channel_capacity = config.event_channel_capacity.max(1);
    config
}
