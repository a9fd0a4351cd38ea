use std::pin::{Pin, pin};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::task::{Context, Poll};

use colloquy_stream::{InFlightTurn, ParticipantSnapshot, Progress, StreamError, decode_frames, events};
use futures::stream::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::backend::MeetingBackend;
use crate::error::{ClientError, TurnError};
use crate::types::{Message, MeetingWithParticipants};

/// Externally visible state of a meeting's turn slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnPhase {
    /// No turn running; a new one may start
    Idle,
    /// A participant's response is streaming
    Active {
        /// Participant holding the turn
        participant_id: String,
    },
    /// The turn completed and the authoritative meeting is being fetched
    Reconciling {
        /// Participant whose turn completed
        participant_id: String,
    },
}

/// Outcome of a turn that completed and reconciled
#[derive(Debug, Clone)]
pub struct TurnResolution {
    /// The persisted message announced by `done`, if it carried an id
    pub message: Option<Message>,
    /// Meeting as persisted after the turn
    pub meeting: Arc<MeetingWithParticipants>,
}

/// One update published while a turn runs
#[derive(Debug)]
pub enum TurnUpdate {
    /// Snapshot of the in-flight message after an event was folded
    Progress(InFlightTurn),
    /// `done` arrived; fetching the authoritative meeting
    Reconciling,
    /// Terminal: the turn completed and the meeting was refreshed
    Resolved(TurnResolution),
    /// Terminal: the turn failed
    Failed(TurnError),
    /// Terminal: the turn was cancelled
    Cancelled,
}

impl TurnUpdate {
    /// Whether no further updates follow this one
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved(_) | Self::Failed(_) | Self::Cancelled)
    }
}

/// Updates of one turn, ending with a terminal update
#[derive(Debug)]
pub struct TurnStream {
    turn_id: u64,
    rx: mpsc::UnboundedReceiver<TurnUpdate>,
}

impl TurnStream {
    /// Identifier of this turn within its controller
    pub const fn turn_id(&self) -> u64 {
        self.turn_id
    }

    /// Drain remaining updates and return the turn's outcome
    ///
    /// # Errors
    ///
    /// Returns the turn's failure, or [`TurnError::Cancelled`]
    pub async fn finish(mut self) -> Result<TurnResolution, TurnError> {
        while let Some(update) = self.rx.recv().await {
            match update {
                TurnUpdate::Progress(_) | TurnUpdate::Reconciling => {}
                TurnUpdate::Resolved(resolution) => return Ok(resolution),
                TurnUpdate::Failed(e) => return Err(e),
                TurnUpdate::Cancelled => return Err(TurnError::Cancelled),
            }
        }

        Err(TurnError::Transport("turn ended without a terminal update".to_owned()))
    }
}

impl Stream for TurnStream {
    type Item = TurnUpdate;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

enum SlotState {
    Idle,
    Active {
        turn_id: u64,
        participant_id: String,
        cancel: CancellationToken,
    },
    Reconciling {
        turn_id: u64,
        participant_id: String,
        cancel: CancellationToken,
    },
}

impl SlotState {
    const fn turn_id(&self) -> Option<u64> {
        match self {
            Self::Idle => None,
            Self::Active { turn_id, .. } | Self::Reconciling { turn_id, .. } => Some(*turn_id),
        }
    }
}

struct Shared {
    slot: Mutex<SlotState>,
    meeting: RwLock<Option<Arc<MeetingWithParticipants>>>,
    next_turn_id: AtomicU64,
}

impl Shared {
    fn slot(&self) -> MutexGuard<'_, SlotState> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn cached_meeting(&self) -> Option<Arc<MeetingWithParticipants>> {
        self.meeting.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn store_meeting(&self, meeting: MeetingWithParticipants) -> Arc<MeetingWithParticipants> {
        let meeting = Arc::new(meeting);
        *self.meeting.write().unwrap_or_else(|e| e.into_inner()) = Some(Arc::clone(&meeting));
        meeting
    }

    /// Move `turn_id` from active to reconciling, if it still owns the slot
    fn begin_reconcile(&self, turn_id: u64) -> bool {
        let mut slot = self.slot();
        match std::mem::replace(&mut *slot, SlotState::Idle) {
            SlotState::Active {
                turn_id: current,
                participant_id,
                cancel,
            } if current == turn_id => {
                *slot = SlotState::Reconciling {
                    turn_id,
                    participant_id,
                    cancel,
                };
                true
            }
            other => {
                *slot = other;
                false
            }
        }
    }

    /// Return the slot to idle, if `turn_id` still owns it
    fn release(&self, turn_id: u64) {
        let mut slot = self.slot();
        if slot.turn_id() == Some(turn_id) {
            *slot = SlotState::Idle;
        }
    }
}

/// Frees the slot even if the turn task unwinds or is dropped
struct SlotGuard {
    shared: Arc<Shared>,
    turn_id: u64,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.shared.release(self.turn_id);
    }
}

/// Single-flight turn runner for one meeting
///
/// At most one participant turn is in flight at a time. Clones share the
/// same slot and cached meeting.
#[derive(Clone)]
pub struct TurnController {
    meeting_id: Arc<str>,
    backend: Arc<dyn MeetingBackend>,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for TurnController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnController")
            .field("meeting_id", &self.meeting_id)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

impl TurnController {
    /// Create an idle controller for a meeting
    pub fn new(meeting_id: impl Into<Arc<str>>, backend: Arc<dyn MeetingBackend>) -> Self {
        Self {
            meeting_id: meeting_id.into(),
            backend,
            shared: Arc::new(Shared {
                slot: Mutex::new(SlotState::Idle),
                meeting: RwLock::new(None),
                next_turn_id: AtomicU64::new(1),
            }),
        }
    }

    /// Meeting this controller drives
    pub fn meeting_id(&self) -> &str {
        &self.meeting_id
    }

    /// Current phase of the turn slot
    pub fn phase(&self) -> TurnPhase {
        match &*self.shared.slot() {
            SlotState::Idle => TurnPhase::Idle,
            SlotState::Active { participant_id, .. } => TurnPhase::Active {
                participant_id: participant_id.clone(),
            },
            SlotState::Reconciling { participant_id, .. } => TurnPhase::Reconciling {
                participant_id: participant_id.clone(),
            },
        }
    }

    /// Last authoritative meeting seen by this controller
    pub fn meeting(&self) -> Option<Arc<MeetingWithParticipants>> {
        self.shared.cached_meeting()
    }

    /// Fetch the authoritative meeting and cache it
    pub async fn refresh(&self) -> Result<Arc<MeetingWithParticipants>, ClientError> {
        let meeting = self.backend.get_meeting(&self.meeting_id).await?;
        Ok(self.shared.store_meeting(meeting))
    }

    /// Post a plain user message
    ///
    /// Independent of the turn slot: allowed while a turn is streaming.
    pub async fn send_plain_message(&self, content: &str) -> Result<Message, ClientError> {
        let message = self.backend.post_message(&self.meeting_id, content).await?;

        let mut cached = self.shared.meeting.write().unwrap_or_else(|e| e.into_inner());
        if let Some(meeting) = cached.as_mut() {
            Arc::make_mut(meeting).messages.push(message.clone());
        }

        Ok(message)
    }

    /// Start a turn for `participant_id`
    ///
    /// The slot is claimed before anything is awaited, so a concurrent start
    /// is rejected without opening a second stream.
    ///
    /// # Errors
    ///
    /// Returns [`TurnError::AlreadyActive`] if a turn is running,
    /// [`TurnError::ParticipantNotFound`] if the participant is not in the
    /// meeting, or [`TurnError::Backend`] if the meeting could not be fetched
    pub async fn start_turn(&self, participant_id: &str) -> Result<TurnStream, TurnError> {
        let turn_id = self.shared.next_turn_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();

        {
            let mut slot = self.shared.slot();
            match &*slot {
                SlotState::Idle => {}
                SlotState::Active { participant_id, .. } | SlotState::Reconciling { participant_id, .. } => {
                    tracing::debug!(meeting_id = %self.meeting_id, active = %participant_id, "rejecting concurrent turn");
                    return Err(TurnError::AlreadyActive {
                        participant_id: participant_id.clone(),
                    });
                }
            }

            *slot = SlotState::Active {
                turn_id,
                participant_id: participant_id.to_owned(),
                cancel: cancel.clone(),
            };
        }

        let guard = SlotGuard {
            shared: Arc::clone(&self.shared),
            turn_id,
        };

        let participant = self.resolve_participant(participant_id).await?;

        tracing::info!(
            meeting_id = %self.meeting_id,
            participant = %participant.name,
            turn_id,
            "starting turn"
        );

        let (tx, rx) = mpsc::unbounded_channel();

        let task = TurnTask {
            meeting_id: Arc::clone(&self.meeting_id),
            backend: Arc::clone(&self.backend),
            shared: Arc::clone(&self.shared),
            participant,
            cancel,
            tx,
            guard,
        };

        tokio::spawn(task.run());

        Ok(TurnStream { turn_id, rx })
    }

    /// Cancel the running turn, if any
    ///
    /// The slot is idle again when this returns; the turn's stream read is
    /// aborted and nothing it folded is kept. Returns `false` when no turn
    /// was running.
    pub fn cancel_turn(&self) -> bool {
        let previous = std::mem::replace(&mut *self.shared.slot(), SlotState::Idle);

        match previous {
            SlotState::Idle => false,
            SlotState::Active {
                turn_id,
                participant_id,
                cancel,
            }
            | SlotState::Reconciling {
                turn_id,
                participant_id,
                cancel,
            } => {
                cancel.cancel();
                tracing::info!(meeting_id = %self.meeting_id, participant_id = %participant_id, turn_id, "turn cancelled");
                true
            }
        }
    }

    async fn resolve_participant(&self, participant_id: &str) -> Result<ParticipantSnapshot, TurnError> {
        let cached = self
            .shared
            .cached_meeting()
            .and_then(|meeting| meeting.participant(participant_id).map(snapshot));

        if let Some(participant) = cached {
            return Ok(participant);
        }

        let meeting = self.refresh().await?;
        meeting
            .participant(participant_id)
            .map(snapshot)
            .ok_or_else(|| TurnError::ParticipantNotFound(participant_id.to_owned()))
    }
}

fn snapshot(participant: &crate::types::Participant) -> ParticipantSnapshot {
    ParticipantSnapshot {
        id: participant.id.clone(),
        name: participant.name.clone(),
        color: participant.color.clone(),
    }
}

/// Everything one spawned turn needs
struct TurnTask {
    meeting_id: Arc<str>,
    backend: Arc<dyn MeetingBackend>,
    shared: Arc<Shared>,
    participant: ParticipantSnapshot,
    cancel: CancellationToken,
    tx: mpsc::UnboundedSender<TurnUpdate>,
    guard: SlotGuard,
}

impl TurnTask {
    async fn run(self) {
        let outcome = tokio::select! {
            biased;
            () = self.cancel.cancelled() => None,
            outcome = self.drive() => Some(outcome),
        };

        // Free the slot before the terminal update goes out, so a caller
        // reacting to it can start the next turn right away
        let Self { tx, guard, participant, meeting_id, .. } = self;
        drop(guard);

        let update = match outcome {
            None => TurnUpdate::Cancelled,
            Some(Ok(resolution)) => {
                tracing::info!(meeting_id = %meeting_id, participant = %participant.name, "turn resolved");
                TurnUpdate::Resolved(resolution)
            }
            Some(Err(e)) => {
                tracing::warn!(meeting_id = %meeting_id, participant = %participant.name, error = %e, "turn failed");
                TurnUpdate::Failed(e)
            }
        };

        // The receiver may be gone; the turn has still run to its end
        let _ = tx.send(update);
    }

    fn publish(&self, update: TurnUpdate) {
        let _ = self.tx.send(update);
    }

    async fn drive(&self) -> Result<TurnResolution, TurnError> {
        let body = self
            .backend
            .open_turn(&self.meeting_id, &self.participant.id)
            .await
            .map_err(TurnError::Connect)?;

        let mut events = pin!(events(decode_frames(body)));
        let mut turn = InFlightTurn::new(self.participant.clone());

        while let Some(event) = events.next().await {
            let event = event.map_err(|StreamError::Transport(reason)| TurnError::Transport(reason))?;

            tracing::trace!(kind = %event.kind(), "folding event");

            let Ok(progress) = turn.apply(event) else {
                break;
            };

            self.publish(TurnUpdate::Progress(turn.clone()));

            match progress {
                Progress::Continue => {}
                Progress::Completed => return self.reconcile(&turn).await,
                Progress::Failed(reason) => return Err(TurnError::Upstream(reason)),
            }
        }

        Err(TurnError::Transport("stream ended before the turn completed".to_owned()))
    }

    async fn reconcile(&self, turn: &InFlightTurn) -> Result<TurnResolution, TurnError> {
        if !self.shared.begin_reconcile(self.guard.turn_id) {
            return Err(TurnError::Cancelled);
        }

        self.publish(TurnUpdate::Reconciling);

        let meeting = self
            .backend
            .get_meeting(&self.meeting_id)
            .await
            .map_err(TurnError::Reconciliation)?;

        let message = match turn.message_id.as_deref() {
            Some(id) => Some(
                meeting
                    .message(id)
                    .cloned()
                    .ok_or_else(|| TurnError::MissingMessage(id.to_owned()))?,
            ),
            None => None,
        };

        let meeting = self.shared.store_meeting(meeting);

        Ok(TurnResolution { message, meeting })
    }
}
