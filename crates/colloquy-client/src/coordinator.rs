use std::sync::Arc;
use std::time::Duration;

use colloquy_ratelimit::{CooldownGate, DEFAULT_PROVIDER};
use dashmap::DashMap;

use crate::backend::MeetingBackend;
use crate::controller::{TurnController, TurnStream};
use crate::error::{ClientError, TurnError};
use crate::types::{Message, MeetingWithParticipants};

/// Entry point for callers juggling several meetings
///
/// Holds one [`TurnController`] per meeting id, created on first use, and
/// the process-wide cooldown gate. Meetings share no turn state.
pub struct TurnCoordinator {
    backend: Arc<dyn MeetingBackend>,
    /// Meeting id -> controller
    controllers: DashMap<String, TurnController>,
    gate: Arc<CooldownGate>,
}

impl std::fmt::Debug for TurnCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnCoordinator")
            .field("meetings", &self.controllers.len())
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}

impl TurnCoordinator {
    pub fn new(backend: Arc<dyn MeetingBackend>, gate: Arc<CooldownGate>) -> Self {
        Self {
            backend,
            controllers: DashMap::new(),
            gate,
        }
    }

    /// Controller for a meeting, created idle on first use
    pub fn controller(&self, meeting_id: &str) -> TurnController {
        self.controllers
            .entry(meeting_id.to_owned())
            .or_insert_with(|| TurnController::new(meeting_id, Arc::clone(&self.backend)))
            .clone()
    }

    /// Shared cooldown gate
    pub fn gate(&self) -> &Arc<CooldownGate> {
        &self.gate
    }

    /// Drop a meeting's controller and cached meeting, cancelling its turn
    ///
    /// Clones of the controller handed out earlier keep working on their
    /// own; the next use of `meeting_id` starts from a fresh, idle
    /// controller. Returns `false` for a meeting never used.
    pub fn forget(&self, meeting_id: &str) -> bool {
        let Some((_, controller)) = self.controllers.remove(meeting_id) else {
            return false;
        };

        if controller.cancel_turn() {
            tracing::debug!(meeting_id = %meeting_id, "cancelled turn of forgotten meeting");
        }

        true
    }

    // -- Turn operations --

    /// Start a turn in `meeting_id`; see [`TurnController::start_turn`]
    pub async fn start_turn(&self, meeting_id: &str, participant_id: &str) -> Result<TurnStream, TurnError> {
        self.controller(meeting_id).start_turn(participant_id).await
    }

    /// Cancel the running turn in `meeting_id`, if any
    pub fn cancel_turn(&self, meeting_id: &str) -> bool {
        self.controllers
            .get(meeting_id)
            .is_some_and(|controller| controller.cancel_turn())
    }

    /// Post a plain user message; never throttled
    pub async fn send_plain_message(&self, meeting_id: &str, content: &str) -> Result<Message, ClientError> {
        self.controller(meeting_id).send_plain_message(content).await
    }

    /// Cached authoritative meeting, if it was fetched before
    pub fn meeting(&self, meeting_id: &str) -> Option<Arc<MeetingWithParticipants>> {
        self.controllers.get(meeting_id).and_then(|controller| controller.meeting())
    }

    /// Fetch the authoritative meeting and cache it
    pub async fn refresh(&self, meeting_id: &str) -> Result<Arc<MeetingWithParticipants>, ClientError> {
        self.controller(meeting_id).refresh().await
    }

    /// Provider key that gates a participant's turns
    ///
    /// Uses the cached meeting when it knows the participant and fetches
    /// it otherwise. An empty provider maps to [`DEFAULT_PROVIDER`].
    pub async fn provider_for(&self, meeting_id: &str, participant_id: &str) -> Result<String, TurnError> {
        let controller = self.controller(meeting_id);

        let cached = controller
            .meeting()
            .and_then(|meeting| meeting.participant(participant_id).map(|p| p.provider_config.provider.clone()));

        let provider = match cached {
            Some(provider) => provider,
            None => controller
                .refresh()
                .await?
                .participant(participant_id)
                .map(|p| p.provider_config.provider.clone())
                .ok_or_else(|| TurnError::ParticipantNotFound(participant_id.to_owned()))?,
        };

        if provider.is_empty() {
            Ok(DEFAULT_PROVIDER.to_owned())
        } else {
            Ok(provider)
        }
    }

    // -- Cooldown operations --

    pub fn is_on_cooldown(&self, provider: &str) -> bool {
        self.gate.is_on_cooldown(provider)
    }

    pub fn remaining_cooldown(&self, provider: &str) -> Duration {
        self.gate.remaining(provider)
    }

    pub fn record_provider_call(&self, provider: &str) {
        self.gate.record_call(provider);
    }
}
