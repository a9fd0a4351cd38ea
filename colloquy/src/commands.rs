use std::io::{self, Write};
use std::pin::pin;
use std::time::Duration;

use anyhow::Context;
use colloquy_client::{TurnCoordinator, TurnUpdate};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::render::{TurnRenderer, write_meeting};

pub async fn show(coordinator: &TurnCoordinator, meeting_id: &str) -> anyhow::Result<()> {
    let meeting = coordinator
        .refresh(meeting_id)
        .await
        .with_context(|| format!("failed to load meeting '{meeting_id}'"))?;

    let mut out = io::stdout().lock();
    write_meeting(&mut out, &meeting)?;
    out.flush()?;

    Ok(())
}

pub async fn say(coordinator: &TurnCoordinator, meeting_id: &str, content: &str) -> anyhow::Result<()> {
    let message = coordinator
        .send_plain_message(meeting_id, content)
        .await
        .context("failed to post message")?;

    tracing::info!(meeting_id, message_id = %message.id, "message posted");
    println!("{}", message.id);

    Ok(())
}

pub fn cooldown(coordinator: &TurnCoordinator, provider: &str) {
    let window = coordinator.gate().window(provider);
    println!("{provider}: {}s between turns", window.as_secs_f64());
}

/// Options for a run of turns
#[derive(Debug, Clone, Copy)]
pub struct TurnOptions {
    pub timeout: Option<Duration>,
    pub show_thinking: bool,
}

/// Run each participant's turn in order
///
/// A participant whose provider is still cooling down is waited for rather
/// than skipped. Shutdown cancels the running turn and stops the run.
pub async fn turns(
    coordinator: &TurnCoordinator,
    meeting_id: &str,
    participants: &[String],
    options: TurnOptions,
    shutdown: &CancellationToken,
) -> anyhow::Result<()> {
    for participant_id in participants {
        if shutdown.is_cancelled() {
            break;
        }

        let provider = coordinator.provider_for(meeting_id, participant_id).await?;

        let wait = coordinator.remaining_cooldown(&provider);
        if !wait.is_zero() {
            tracing::info!(
                provider = %provider,
                remaining_secs = coordinator.gate().remaining_secs(&provider),
                "waiting for provider cooldown"
            );

            tokio::select! {
                () = shutdown.cancelled() => break,
                () = tokio::time::sleep(wait) => {}
            }
        }

        coordinator.record_provider_call(&provider);

        let completed = run_turn(coordinator, meeting_id, participant_id, options, shutdown).await?;
        if !completed {
            break;
        }
    }

    Ok(())
}

/// Stream one turn to stdout, returning whether it completed
async fn run_turn(
    coordinator: &TurnCoordinator,
    meeting_id: &str,
    participant_id: &str,
    options: TurnOptions,
    shutdown: &CancellationToken,
) -> anyhow::Result<bool> {
    let mut updates = coordinator.start_turn(meeting_id, participant_id).await?;
    let mut renderer = TurnRenderer::new(io::stdout(), options.show_thinking);

    let mut cancel_trigger = pin!(cancel_trigger(options.timeout, shutdown));
    let mut cancel_requested = false;

    loop {
        tokio::select! {
            update = updates.next() => {
                let Some(update) = update else {
                    anyhow::bail!("turn ended without a terminal update");
                };

                match update {
                    TurnUpdate::Progress(turn) => renderer.progress(&turn)?,
                    TurnUpdate::Reconciling => tracing::debug!(meeting_id, "turn complete, reconciling"),
                    TurnUpdate::Resolved(resolution) => {
                        renderer.resolved(resolution.message.as_ref())?;
                        return Ok(true);
                    }
                    TurnUpdate::Failed(e) => {
                        renderer.interrupted("failed")?;
                        return Err(e).context(format!("turn for participant '{participant_id}' failed"));
                    }
                    TurnUpdate::Cancelled => {
                        renderer.interrupted("cancelled")?;
                        return Ok(false);
                    }
                }
            }
            () = &mut cancel_trigger, if !cancel_requested => {
                cancel_requested = true;
                coordinator.cancel_turn(meeting_id);
            }
        }
    }
}

/// Resolves when the running turn should be abandoned
async fn cancel_trigger(timeout: Option<Duration>, shutdown: &CancellationToken) {
    let Some(timeout) = timeout else {
        return shutdown.cancelled().await;
    };

    tokio::select! {
        () = shutdown.cancelled() => {}
        () = tokio::time::sleep(timeout) => {
            tracing::warn!(timeout_secs = timeout.as_secs_f64(), "turn timed out, cancelling");
        }
    }
}
