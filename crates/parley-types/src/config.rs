//! Configuration types for the messaging core.
//!
//! `MessagingConfig` represents the top-level `config.toml` that controls
//! page sizes, preview length, and the bounded conflict retry.

use serde::{Deserialize, Serialize};

/// Top-level configuration for Parley.
///
/// Loaded from `~/.parley/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagingConfig {
    /// Page size used when a list request carries no limit.
    #[serde(default = "default_page_size")]
    pub default_page_size: u32,

    /// Larger page requests are clamped to this.
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,

    /// Length of the last-message preview, in characters.
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,

    /// Total attempts (first try included) for writes that hit a conflict.
    #[serde(default = "default_conflict_retry_attempts")]
    pub conflict_retry_attempts: u32,

    /// Backoff step between conflict retries, in milliseconds.
    #[serde(default = "default_conflict_retry_backoff_ms")]
    pub conflict_retry_backoff_ms: u64,

    /// Capacity of the notification broadcast channel.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Upper bound on the audit query limit.
    #[serde(default = "default_audit_query_max")]
    pub audit_query_max: u32,
}

fn default_page_size() -> u32 {
    20
}

fn default_max_page_size() -> u32 {
    100
}

fn default_preview_chars() -> usize {
    100
}

fn default_conflict_retry_attempts() -> u32 {
    3
}

fn default_conflict_retry_backoff_ms() -> u64 {
    25
}

fn default_event_channel_capacity() -> usize {
    1024
}

fn default_audit_query_max() -> u32 {
    500
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
            preview_chars: default_preview_chars(),
            conflict_retry_attempts: default_conflict_retry_attempts(),
            conflict_retry_backoff_ms: default_conflict_retry_backoff_ms(),
            event_channel_capacity: default_event_channel_capacity(),
            audit_query_max: default_audit_query_max(),
        }
    }
}
