//! Mock meeting backend for integration tests
//!
//! Serves the three endpoints the client uses. Turn streams are scripted
//! per test and written chunk by chunk, so frames really arrive split

use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use bytes::Bytes;
use colloquy_client::{Meeting, MeetingStatus, MeetingWithParticipants, Message, Participant, ProviderConfig, SenderType};
use futures::stream::{self, BoxStream, StreamExt};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

/// Meeting id served by the mock
pub const MEETING_ID: &str = "m-1";

/// How a scripted stream ends after its chunks
#[derive(Debug, Clone, Copy)]
pub enum Ending {
    /// Close the body cleanly
    Close,
    /// Abort the connection mid-body
    Abort,
    /// Keep the connection open forever
    Hang,
}

/// Scripted answer to one turn request
#[derive(Debug, Clone)]
pub enum TurnScript {
    /// Stream these raw chunks
    Stream {
        chunks: Vec<Bytes>,
        ending: Ending,
        /// Message persisted when the turn is requested
        persist: Option<Message>,
    },
    /// Refuse the turn with a status and `detail`
    Reject { status: u16, detail: String },
}

impl TurnScript {
    /// One chunk per frame, closed cleanly
    pub fn frames(events: &[serde_json::Value]) -> Self {
        Self::Stream {
            chunks: events.iter().map(|event| Bytes::from(frame(event))).collect(),
            ending: Ending::Close,
            persist: None,
        }
    }

    /// Persist `message` when the turn is requested
    pub fn persisting(self, message: Message) -> Self {
        match self {
            Self::Stream { chunks, ending, .. } => Self::Stream {
                chunks,
                ending,
                persist: Some(message),
            },
            reject => reject,
        }
    }

    pub fn ending(self, ending: Ending) -> Self {
        match self {
            Self::Stream { chunks, persist, .. } => Self::Stream {
                chunks,
                ending,
                persist,
            },
            reject => reject,
        }
    }
}

/// Encode one event as an SSE frame the way the backend does
pub fn frame(event: &serde_json::Value) -> String {
    format!("data: {event}\r\n\r\n")
}

/// Mock backend listening on a random port
pub struct MockBackend {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockState>,
}

struct MockState {
    meeting: Mutex<MeetingWithParticipants>,
    scripts: Mutex<VecDeque<TurnScript>>,
    turn_requests: Mutex<Vec<String>>,
    meeting_fetches: AtomicU32,
    /// Number of meeting fetches to fail before succeeding
    fail_fetches: AtomicU32,
}

impl MockBackend {
    /// Start the mock server, returning immediately
    pub async fn start() -> anyhow::Result<Self> {
        let state = Arc::new(MockState {
            meeting: Mutex::new(sample_meeting()),
            scripts: Mutex::new(VecDeque::new()),
            turn_requests: Mutex::new(Vec::new()),
            meeting_fetches: AtomicU32::new(0),
            fail_fetches: AtomicU32::new(0),
        });

        let app = Router::new()
            .route("/api/meetings/{id}", routing::get(handle_get_meeting))
            .route("/api/meetings/{id}/message", routing::post(handle_post_message))
            .route("/api/meetings/{id}/turn/stream", routing::post(handle_turn_stream))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(Self { addr, shutdown, state })
    }

    /// API root for the client
    pub fn base_url(&self) -> String {
        format!("http://{}/api", self.addr)
    }

    /// Queue the answer to the next turn request
    pub fn script(&self, script: TurnScript) {
        self.state.scripts.lock().unwrap().push_back(script);
    }

    /// Fail the next `n` meeting fetches with 503
    pub fn fail_meeting_fetches(&self, n: u32) {
        self.state.fail_fetches.store(n, Ordering::SeqCst);
    }

    /// Participant ids of all turn requests, in order
    pub fn turn_requests(&self) -> Vec<String> {
        self.state.turn_requests.lock().unwrap().clone()
    }

    /// Number of meeting fetches received
    pub fn meeting_fetches(&self) -> u32 {
        self.state.meeting_fetches.load(Ordering::SeqCst)
    }

    /// Persisted messages
    pub fn messages(&self) -> Vec<Message> {
        self.state.meeting.lock().unwrap().messages.clone()
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

// -- Fixtures --

/// Meeting with a Gemini-backed analyst and a default-provider scribe
pub fn sample_meeting() -> MeetingWithParticipants {
    let participant = |id: &str, name: &str, provider: &str, color: &str| Participant {
        id: id.to_owned(),
        meeting_id: MEETING_ID.to_owned(),
        name: name.to_owned(),
        role: String::new(),
        system_prompt: String::new(),
        provider_config: ProviderConfig {
            provider: provider.to_owned(),
            ..ProviderConfig::default()
        },
        color: color.to_owned(),
        created_at: "2025-03-01T10:00:00".to_owned(),
    };

    MeetingWithParticipants {
        meeting: Meeting {
            id: MEETING_ID.to_owned(),
            user_id: None,
            name: "Launch review".to_owned(),
            agenda: "Go / no-go".to_owned(),
            status: MeetingStatus::Active,
            total_cost: 0.0,
            created_at: "2025-03-01T10:00:00".to_owned(),
        },
        participants: vec![
            participant("p-analyst", "Analyst", "gemini", "#10b981"),
            participant("p-scribe", "Scribe", "", "#6366f1"),
        ],
        messages: Vec::new(),
    }
}

/// AI message as the backend would persist it
pub fn ai_message(id: &str, participant_id: &str, content: &str) -> Message {
    Message {
        id: id.to_owned(),
        meeting_id: MEETING_ID.to_owned(),
        sender_type: SenderType::Ai,
        sender_id: Some(participant_id.to_owned()),
        sender_name: "Analyst".to_owned(),
        content: content.to_owned(),
        citations: Vec::new(),
        tool_artifacts: None,
        estimated_cost: 0.0001,
        created_at: "2025-03-01T10:05:00".to_owned(),
    }
}

// -- Handlers --

#[derive(Debug, Deserialize)]
struct TurnBody {
    participant_id: String,
}

#[derive(Debug, Deserialize)]
struct MessageBody {
    content: String,
}

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({"detail": "Meeting not found"})),
    )
        .into_response()
}

async fn handle_get_meeting(State(state): State<Arc<MockState>>, Path(id): Path<String>) -> Response {
    state.meeting_fetches.fetch_add(1, Ordering::SeqCst);

    if id != MEETING_ID {
        return not_found();
    }

    let remaining = state.fail_fetches.load(Ordering::SeqCst);
    if remaining > 0 {
        state.fail_fetches.fetch_sub(1, Ordering::SeqCst);
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({"detail": "database unavailable"})),
        )
            .into_response();
    }

    let meeting = state.meeting.lock().unwrap().clone();
    Json(meeting).into_response()
}

async fn handle_post_message(
    State(state): State<Arc<MockState>>,
    Path(id): Path<String>,
    Json(body): Json<MessageBody>,
) -> Response {
    if id != MEETING_ID {
        return not_found();
    }

    let mut meeting = state.meeting.lock().unwrap();
    let message = Message {
        id: format!("u-{}", meeting.messages.len() + 1),
        meeting_id: id,
        sender_type: SenderType::User,
        sender_id: None,
        sender_name: "User".to_owned(),
        content: body.content,
        citations: Vec::new(),
        tool_artifacts: None,
        estimated_cost: 0.0,
        created_at: "2025-03-01T10:04:00".to_owned(),
    };
    meeting.messages.push(message.clone());

    Json(message).into_response()
}

async fn handle_turn_stream(
    State(state): State<Arc<MockState>>,
    Path(id): Path<String>,
    Json(body): Json<TurnBody>,
) -> Response {
    if id != MEETING_ID {
        return not_found();
    }

    state.turn_requests.lock().unwrap().push(body.participant_id);

    let Some(script) = state.scripts.lock().unwrap().pop_front() else {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"detail": "no scripted turn"})),
        )
            .into_response();
    };

    match script {
        TurnScript::Reject { status, detail } => (
            StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            Json(serde_json::json!({ "detail": detail })),
        )
            .into_response(),
        TurnScript::Stream {
            chunks,
            ending,
            persist,
        } => {
            if let Some(message) = persist {
                state.meeting.lock().unwrap().messages.push(message);
            }

            Response::builder()
                .header(header::CONTENT_TYPE, "text/event-stream")
                .header(header::CACHE_CONTROL, "no-cache")
                .body(Body::from_stream(body_stream(chunks, ending)))
                .unwrap()
        }
    }
}

/// Write each chunk separately, then end as scripted
fn body_stream(chunks: Vec<Bytes>, ending: Ending) -> BoxStream<'static, Result<Bytes, io::Error>> {
    let chunks = stream::iter(chunks).then(|chunk| async move {
        tokio::time::sleep(Duration::from_millis(5)).await;
        Ok::<_, io::Error>(chunk)
    });

    match ending {
        Ending::Close => chunks.boxed(),
        Ending::Abort => chunks
            .chain(stream::once(async { Err(io::Error::other("mock connection reset")) }))
            .boxed(),
        Ending::Hang => chunks.chain(stream::pending()).boxed(),
    }
}
