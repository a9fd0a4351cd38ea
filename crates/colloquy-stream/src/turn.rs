use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::AccumulateError;
use crate::event::{Citation, StreamEvent};

/// Participant details captured when the turn starts
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParticipantSnapshot {
    pub id: String,
    pub name: String,
    /// Display color, e.g. `#6366f1`
    pub color: String,
}

/// A tool call made during the turn
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolInvocation {
    /// Tool name, the correlation key when no call id is sent
    pub name: String,
    pub arguments: Map<String, Value>,
    pub call_id: Option<String>,
    /// Output, set once when the matching result arrives
    pub result: Option<String>,
    /// True from the call until its result arrives
    pub executing: bool,
}

/// What a single applied event did to the turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    /// The turn is still streaming
    Continue,
    /// A `done` event ended the turn successfully
    Completed,
    /// An `error` event ended the turn
    Failed(String),
}

/// The locally folded, not yet authoritative message of a running turn
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InFlightTurn {
    pub participant: ParticipantSnapshot,
    /// Visible text, append-only
    pub text: String,
    /// Hidden reasoning, append-only
    pub thinking: String,
    pub tools: Vec<ToolInvocation>,
    pub citations: Vec<Citation>,
    /// Set by `done` or `error`; nothing changes afterwards
    pub complete: bool,
    /// Content of the `error` event, if the turn failed
    pub error: Option<String>,
    /// Id of the persisted message announced by `done`
    pub message_id: Option<String>,
    pub usage: Option<Value>,
}

impl InFlightTurn {
    /// Start an empty turn for a participant
    pub const fn new(participant: ParticipantSnapshot) -> Self {
        Self {
            participant,
            text: String::new(),
            thinking: String::new(),
            tools: Vec::new(),
            citations: Vec::new(),
            complete: false,
            error: None,
            message_id: None,
            usage: None,
        }
    }

    /// Fold a complete event sequence, stopping at the first terminal
    pub fn fold<I>(participant: ParticipantSnapshot, events: I) -> Self
    where
        I: IntoIterator<Item = StreamEvent>,
    {
        let mut turn = Self::new(participant);
        for event in events {
            if turn.apply(event).is_err() {
                break;
            }
        }
        turn
    }

    /// Apply one event
    ///
    /// Never blocks and never reorders: every event is folded in the order
    /// it is given.
    ///
    /// # Errors
    ///
    /// Returns [`AccumulateError::Terminal`] if the turn is already complete;
    /// the turn is left untouched
    pub fn apply(&mut self, event: StreamEvent) -> Result<Progress, AccumulateError> {
        if self.complete {
            return Err(AccumulateError::Terminal);
        }

        match event {
            StreamEvent::Text { content } => self.text.push_str(&content),
            StreamEvent::Thinking { content } => self.thinking.push_str(&content),
            StreamEvent::ToolCall {
                name,
                arguments,
                call_id,
            } => self.tools.push(ToolInvocation {
                name,
                arguments,
                call_id,
                result: None,
                executing: true,
            }),
            StreamEvent::ToolResult { name, result, call_id } => self.resolve_tool(&name, call_id.as_deref(), result),
            StreamEvent::Citation(citation) => self.citations.push(citation),
            StreamEvent::Done { message_id, usage } => {
                self.complete = true;
                self.message_id = message_id;
                self.usage = usage;
                return Ok(Progress::Completed);
            }
            StreamEvent::Error { content } => {
                self.complete = true;
                self.error = Some(content.clone());
                return Ok(Progress::Failed(content));
            }
        }

        Ok(Progress::Continue)
    }

    /// Attach a result to its invocation
    ///
    /// With a call id the match is exact. Without one the first unresolved
    /// invocation of that name wins; a tool invoked twice is therefore
    /// ambiguous on the wire and resolves in call order.
    ///
    /// The backend runs tools itself and may send a bare result with no call
    /// before it. Such a result, carrying no call id and matching nothing
    /// pending, is recorded as an already resolved invocation.
    fn resolve_tool(&mut self, name: &str, call_id: Option<&str>, result: String) {
        let target = self.tools.iter_mut().find(|tool| {
            tool.result.is_none()
                && match call_id {
                    Some(id) => tool.call_id.as_deref() == Some(id),
                    None => tool.name == name,
                }
        });

        match target {
            Some(tool) => {
                tool.result = Some(result);
                tool.executing = false;
            }
            None if call_id.is_none() => {
                tracing::debug!(tool = %name, "tool result without a call, recording as resolved");
                self.tools.push(ToolInvocation {
                    name: name.to_owned(),
                    arguments: Map::new(),
                    call_id: None,
                    result: Some(result),
                    executing: false,
                });
            }
            None => {
                tracing::warn!(
                    tool = %name,
                    call_id = ?call_id,
                    "tool result without a pending invocation, ignoring"
                );
            }
        }
    }

    /// Whether any tool is still waiting for its result
    pub fn has_pending_tools(&self) -> bool {
        self.tools.iter().any(|tool| tool.executing)
    }
}
