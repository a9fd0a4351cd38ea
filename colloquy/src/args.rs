use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

/// Colloquy meeting client
#[derive(Debug, Parser)]
#[command(name = "colloquy", about = "Stream multi-agent meeting turns from the command line")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "colloquy.toml", env = "COLLOQUY_CONFIG")]
    pub config: PathBuf,

    /// Override the backend API root, e.g. `http://localhost:8000/api`
    #[arg(long, env = "COLLOQUY_BACKEND_URL")]
    pub backend_url: Option<url::Url>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print a meeting with its participants and transcript
    Show {
        /// Meeting id
        meeting: String,
    },

    /// Post a plain user message
    Say {
        /// Meeting id
        meeting: String,
        /// Message text
        content: String,
    },

    /// Run participant turns one after another, streaming each to stdout
    Turn {
        /// Meeting id
        meeting: String,

        /// Participants to run, in order
        #[arg(required = true)]
        participants: Vec<String>,

        /// Cancel a turn that runs longer than this, e.g. `90s`
        #[arg(long, value_parser = colloquy_config::parse_duration)]
        timeout: Option<Duration>,

        /// Print the model's reasoning as it streams
        #[arg(long)]
        thinking: bool,
    },

    /// Print the cooldown window configured for a provider
    Cooldown {
        /// Provider key, e.g. `gemini`
        #[arg(default_value = colloquy_ratelimit::DEFAULT_PROVIDER)]
        provider: String,
    },
}
