use std::str::FromStr;

use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ParseError, StreamError};
use crate::frame::Frame;

/// Kind tag carried in the `type` field of every event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumString, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum EventKind {
    Text,
    Thinking,
    ToolCall,
    ToolResult,
    Citation,
    Done,
    Error,
}

/// A source referenced by the participant's answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    /// Document or tool the reference came from
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

/// One typed event of a streamed turn
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Visible answer text
    Text {
        content: String,
    },
    /// Hidden reasoning text
    Thinking {
        content: String,
    },
    /// The participant invoked a tool
    ToolCall {
        name: String,
        arguments: Map<String, Value>,
        /// Correlation id, when the backend sends one
        call_id: Option<String>,
    },
    /// A tool invocation finished
    ToolResult {
        name: String,
        result: String,
        call_id: Option<String>,
    },
    /// A source reference
    Citation(Citation),
    /// The turn finished and was persisted
    Done {
        message_id: Option<String>,
        usage: Option<Value>,
    },
    /// The backend aborted the turn
    Error {
        content: String,
    },
}

impl StreamEvent {
    /// The wire kind of this event
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Text { .. } => EventKind::Text,
            Self::Thinking { .. } => EventKind::Thinking,
            Self::ToolCall { .. } => EventKind::ToolCall,
            Self::ToolResult { .. } => EventKind::ToolResult,
            Self::Citation(_) => EventKind::Citation,
            Self::Done { .. } => EventKind::Done,
            Self::Error { .. } => EventKind::Error,
        }
    }

    /// Whether this event ends the turn
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }
}

/// Flat wire shape; absent fields are simply omitted by the backend
#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    kind: String,
    content: Option<String>,
    tool_name: Option<String>,
    tool_arguments: Option<Map<String, Value>>,
    tool_result: Option<Value>,
    tool_call_id: Option<String>,
    citation_source: Option<String>,
    citation_title: Option<String>,
    citation_url: Option<String>,
    citation_snippet: Option<String>,
    message_id: Option<String>,
    usage: Option<Value>,
}

/// Parse one frame's JSON payload into an event
///
/// A payload that itself starts with `data:` is unwrapped once first; the
/// backend's last-resort error frame arrives wrapped twice.
///
/// # Errors
///
/// Returns [`ParseError::UnknownKind`] for unrecognised kinds and
/// [`ParseError::Malformed`] for invalid JSON or missing required fields
pub fn parse_event(data: &str) -> Result<StreamEvent, ParseError> {
    let raw: RawEvent =
        serde_json::from_str(unwrap_nested(data)).map_err(|e| ParseError::Malformed(e.to_string()))?;

    let kind = EventKind::from_str(&raw.kind).map_err(|_| ParseError::UnknownKind(raw.kind.clone()))?;

    let event = match kind {
        EventKind::Text => StreamEvent::Text {
            content: require(raw.content, kind, "content")?,
        },
        EventKind::Thinking => StreamEvent::Thinking {
            content: require(raw.content, kind, "content")?,
        },
        EventKind::ToolCall => StreamEvent::ToolCall {
            name: require(raw.tool_name, kind, "tool_name")?,
            arguments: raw.tool_arguments.unwrap_or_default(),
            call_id: raw.tool_call_id,
        },
        EventKind::ToolResult => StreamEvent::ToolResult {
            name: require(raw.tool_name, kind, "tool_name")?,
            result: match raw.tool_result {
                Some(Value::String(s)) => s,
                Some(Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            },
            call_id: raw.tool_call_id,
        },
        EventKind::Citation => StreamEvent::Citation(Citation {
            source: require(raw.citation_source, kind, "citation_source")?,
            title: raw.citation_title,
            url: raw.citation_url,
            snippet: raw.citation_snippet,
        }),
        EventKind::Done => StreamEvent::Done {
            message_id: raw.message_id,
            usage: raw.usage,
        },
        EventKind::Error => StreamEvent::Error {
            content: raw.content.unwrap_or_else(|| "unspecified upstream error".to_owned()),
        },
    };

    Ok(event)
}

fn unwrap_nested(data: &str) -> &str {
    match data.strip_prefix("data:") {
        Some(inner) => inner.strip_prefix(' ').unwrap_or(inner),
        None => data,
    }
}

fn require(value: Option<String>, kind: EventKind, field: &str) -> Result<String, ParseError> {
    value.ok_or_else(|| ParseError::Malformed(format!("{kind} event without '{field}'")))
}

/// Map a frame stream to events, dropping frames that fail to parse
///
/// Transport errors pass through untouched.
pub fn events<S>(frames: S) -> impl Stream<Item = Result<StreamEvent, StreamError>>
where
    S: Stream<Item = Result<Frame, StreamError>>,
{
    frames.filter_map(|frame| {
        let item = match frame {
            Err(e) => Some(Err(e)),
            Ok(frame) => match parse_event(&frame.data) {
                Ok(event) => Some(Ok(event)),
                Err(e) => {
                    tracing::warn!(error = %e, payload = %frame.data, "dropping unparsable frame");
                    None
                }
            },
        };

        std::future::ready(item)
    })
}
