use std::path::Path;
use std::time::Duration;

use crate::Config;

impl Config {
    /// Load configuration from a TOML file
    ///
    /// A missing file yields the defaults so the CLI works without any
    /// configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, placeholder expansion
    /// fails, TOML parsing fails, or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        Self::from_toml_str(&raw)
    }

    /// Parse configuration from TOML text
    ///
    /// # Errors
    ///
    /// Returns an error if placeholder expansion, parsing, or validation fails
    pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
        let expanded = crate::env::expand_env(raw).map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let config: Self = toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate that every duration parses and the backend URL is usable
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid setting
    pub fn validate(&self) -> anyhow::Result<()> {
        match self.backend.base_url.scheme() {
            "http" | "https" => {}
            other => anyhow::bail!("backend.base_url must use http or https, found '{other}'"),
        }

        parse_duration(&self.backend.connect_timeout)
            .map_err(|e| anyhow::anyhow!("backend.connect_timeout: {e}"))?;

        parse_duration(&self.rate_limit.default_window)
            .map_err(|e| anyhow::anyhow!("rate_limit.default_window: {e}"))?;

        for (provider, window) in &self.rate_limit.providers {
            parse_duration(window).map_err(|e| anyhow::anyhow!("rate_limit.providers.{provider}: {e}"))?;
        }

        Ok(())
    }
}

/// Parse a human duration such as `"5s"` or `"1m30s"`
///
/// # Errors
///
/// Returns a description of the parse failure
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    duration_str::parse(s).map_err(|e| format!("invalid duration '{s}': {e}"))
}
