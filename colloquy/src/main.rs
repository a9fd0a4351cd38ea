#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod args;
mod commands;
mod render;

use std::sync::Arc;

use args::{Args, Command};
use clap::Parser;
use colloquy_client::{HttpBackend, TurnCoordinator};
use colloquy_config::Config;
use commands::TurnOptions;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = Config::load(&args.config)?;
    if let Some(url) = args.backend_url {
        config.backend.base_url = url;
    }

    // Initialize telemetry
    colloquy_telemetry::init(&config.telemetry, "warn")?;

    tracing::debug!(
        config_path = %args.config.display(),
        backend = %config.backend.base_url,
        "starting colloquy"
    );

    let backend = Arc::new(HttpBackend::from_config(&config.backend)?);
    let gate = Arc::new(colloquy_ratelimit::create_cooldown_gate(&config.rate_limit)?);
    let coordinator = TurnCoordinator::new(backend, gate);

    // Ctrl-C cancels the running turn
    let shutdown = CancellationToken::new();
    let shutdown_clone = shutdown.clone();

    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown_clone.cancel();
    });

    match args.command {
        Command::Show { meeting } => commands::show(&coordinator, &meeting).await,
        Command::Say { meeting, content } => commands::say(&coordinator, &meeting, &content).await,
        Command::Turn {
            meeting,
            participants,
            timeout,
            thinking,
        } => {
            let options = TurnOptions {
                timeout,
                show_thinking: thinking,
            };
            commands::turns(&coordinator, &meeting, &participants, options, &shutdown).await
        }
        Command::Cooldown { provider } => {
            commands::cooldown(&coordinator, &provider);
            Ok(())
        }
    }
}

/// Wait for a shutdown signal (`SIGINT` or `SIGTERM`)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    tracing::info!("shutdown signal received");
}
