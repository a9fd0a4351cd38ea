use indexmap::IndexMap;
use serde::Deserialize;

/// Cooldown windows applied between turn starts, keyed by provider
///
/// ```toml
/// [rate_limit]
/// default_window = "5s"
///
/// [rate_limit.providers]
/// gemini = "10s"
/// ollama = "0s"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Window used for providers without an override
    #[serde(default = "default_window")]
    pub default_window: String,
    /// Per-provider window overrides
    #[serde(default)]
    pub providers: IndexMap<String, String>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            default_window: default_window(),
            providers: IndexMap::new(),
        }
    }
}

fn default_window() -> String {
    "5s".to_owned()
}
