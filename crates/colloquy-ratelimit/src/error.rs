use std::time::Duration;

use thiserror::Error;

/// Cooldown gate errors
#[derive(Debug, Error)]
pub enum RateLimitError {
    /// Configuration error
    #[error("rate limit configuration error: {0}")]
    Config(String),

    /// The provider was called too recently
    #[error("provider '{provider}' is cooling down for another {}s", .retry_after.as_secs_f64().ceil())]
    OnCooldown {
        /// Provider key that was checked
        provider: String,
        /// Time until the next call is permitted
        retry_after: Duration,
    },
}
