use std::sync::RwLock;
use std::time::Duration;

use colloquy_config::RateLimitConfig;
use dashmap::DashMap;
use tokio::time::Instant;

use crate::error::RateLimitError;

/// Provider key used when a participant does not name one
pub const DEFAULT_PROVIDER: &str = "default";

/// Longest cooldown actually applied; larger windows are clamped to it
pub const MAX_WINDOW: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Timestamps of the last recorded call for one provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownEntry {
    /// When the most recent call was recorded
    pub last_call_at: Instant,
    /// Earliest instant at which a new call is permitted
    pub cooldown_until: Instant,
}

impl CooldownEntry {
    fn starting(now: Instant, window: Duration) -> Self {
        Self {
            last_call_at: now,
            cooldown_until: now + window.min(MAX_WINDOW),
        }
    }
}

/// Per-provider cooldown tracker on the monotonic clock
///
/// Providers never recorded are not on cooldown. Windows are plain
/// configuration and may change at any time; a change applies from the next
/// recorded call.
#[derive(Debug)]
pub struct CooldownGate {
    /// Provider -> last recorded call
    entries: DashMap<String, CooldownEntry>,
    /// Provider -> window override
    windows: DashMap<String, Duration>,
    default_window: RwLock<Duration>,
}

impl CooldownGate {
    /// Create a gate with a global default window and no overrides
    pub fn new(default_window: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            windows: DashMap::new(),
            default_window: RwLock::new(default_window),
        }
    }

    /// Create a gate from configuration
    pub fn from_config(config: &RateLimitConfig) -> Result<Self, RateLimitError> {
        let gate = Self::new(parse_duration(&config.default_window)?);

        for (provider, window) in &config.providers {
            gate.set_window(provider, parse_duration(window)?);
        }

        Ok(gate)
    }

    /// Window applied to `provider`, falling back to the default
    pub fn window(&self, provider: &str) -> Duration {
        self.windows
            .get(provider)
            .map_or_else(|| *self.default_window.read().unwrap_or_else(|e| e.into_inner()), |w| *w)
    }

    /// Override the window for one provider
    pub fn set_window(&self, provider: &str, window: Duration) {
        self.windows.insert(provider.to_owned(), window);
    }

    /// Change the fallback window
    pub fn set_default_window(&self, window: Duration) {
        *self.default_window.write().unwrap_or_else(|e| e.into_inner()) = window;
    }

    /// Stamp a call to `provider` now, starting a fresh cooldown
    pub fn record_call(&self, provider: &str) {
        let window = self.window(provider);
        let entry = CooldownEntry::starting(Instant::now(), window);

        tracing::debug!(provider = %provider, window_ms = window.as_millis(), "recorded provider call");

        self.entries.insert(provider.to_owned(), entry);
    }

    /// Whether a call to `provider` would currently be premature
    pub fn is_on_cooldown(&self, provider: &str) -> bool {
        self.entries
            .get(provider)
            .is_some_and(|entry| Instant::now() < entry.cooldown_until)
    }

    /// Time left on the cooldown, zero once it has elapsed
    pub fn remaining(&self, provider: &str) -> Duration {
        self.entries.get(provider).map_or(Duration::ZERO, |entry| {
            entry.cooldown_until.saturating_duration_since(Instant::now())
        })
    }

    /// Remaining cooldown rounded up to whole seconds, for countdown display
    pub fn remaining_secs(&self, provider: &str) -> u64 {
        let remaining = self.remaining(provider);
        let secs = remaining.as_secs();

        if remaining.subsec_nanos() > 0 { secs + 1 } else { secs }
    }

    /// Copy of the provider's entry, if a call was ever recorded
    pub fn entry(&self, provider: &str) -> Option<CooldownEntry> {
        self.entries.get(provider).map(|entry| *entry)
    }

    /// Check and record in one step
    ///
    /// Holding the entry across both steps means two callers racing for the
    /// same provider cannot both get through.
    pub fn try_acquire(&self, provider: &str) -> Result<(), RateLimitError> {
        let window = self.window(provider);
        let now = Instant::now();

        let mut entry = self
            .entries
            .entry(provider.to_owned())
            .or_insert(CooldownEntry::starting(now, Duration::ZERO));

        if now < entry.cooldown_until {
            return Err(RateLimitError::OnCooldown {
                provider: provider.to_owned(),
                retry_after: entry.cooldown_until - now,
            });
        }

        *entry = CooldownEntry::starting(now, window);
        Ok(())
    }
}

fn parse_duration(s: &str) -> Result<Duration, RateLimitError> {
    duration_str::parse(s).map_err(|e| RateLimitError::Config(format!("invalid duration '{s}': {e}")))
}
