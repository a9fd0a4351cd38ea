#![allow(clippy::must_use_candidate)]

pub mod backend;
mod env;
mod loader;
pub mod rate_limit;
pub mod telemetry;

use serde::Deserialize;

pub use backend::*;
pub use loader::parse_duration;
pub use rate_limit::*;
pub use telemetry::{LogFormat, TelemetryConfig};

/// Top-level Colloquy configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Meeting backend connection
    #[serde(default)]
    pub backend: BackendConfig,
    /// Per-provider turn cooldowns
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Logging configuration
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}
