#![allow(clippy::missing_errors_doc, clippy::must_use_candidate)]

//! Provider-keyed cooldowns between turn starts
//!
//! The gate never blocks anything by itself: callers ask
//! [`CooldownGate::is_on_cooldown`] before starting a turn and call
//! [`CooldownGate::record_call`] at the moment they commit to it

mod error;
mod gate;

pub use error::RateLimitError;
pub use gate::{CooldownEntry, CooldownGate, DEFAULT_PROVIDER, MAX_WINDOW};

use colloquy_config::RateLimitConfig;

/// Create a cooldown gate from configuration
pub fn create_cooldown_gate(config: &RateLimitConfig) -> Result<CooldownGate, RateLimitError> {
    CooldownGate::from_config(config)
}
