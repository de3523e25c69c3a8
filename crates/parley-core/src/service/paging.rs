//! Page size resolution shared by the list operations.

use parley_types::config::MessagingConfig;
use parley_types::error::MessagingError;

/// Default and maximum page sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    pub default: u32,
    pub max: u32,
}

impl PageLimits {
    pub fn from_config(config: &MessagingConfig) -> Self {
        Self {
            default: config.default_page_size,
            max: config.max_page_size.max(1),
        }
    }

    /// Resolve a requested limit.
    ///
    /// Missing limits use the default, limits below 1 are rejected, and
    /// anything above the maximum is clamped.
    pub fn resolve(&self, requested: Option<i64>) -> Result<u32, MessagingError> {
        match requested {
            None => Ok(self.default.clamp(1, self.max)),
            Some(n) if n < 1 => Err(MessagingError::invalid(format!(
                "limit must be at least 1, got {n}"
            ))),
            Some(n) => Ok(u32::try_from(n).unwrap_or(u32::MAX).min(self.max)),
        }
    }
}

impl Default for PageLimits {
    fn default() -> Self {
        Self::from_config(&MessagingConfig::default())
    }
}
