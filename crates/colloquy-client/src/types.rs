use serde::{Deserialize, Serialize};

pub use colloquy_stream::Citation;

// -- Participants --

/// Which model provider answers for a participant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider key, empty for the backend's default provider
    #[serde(default)]
    pub provider: String,
    /// Model name, empty for the provider's default model
    #[serde(default)]
    pub model: String,
    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider: String::new(),
            model: String::new(),
            temperature: default_temperature(),
        }
    }
}

const fn default_temperature() -> f64 {
    0.7
}

/// An AI participant of a meeting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    pub meeting_id: String,
    pub name: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub provider_config: ProviderConfig,
    /// Display color, e.g. `#6366f1`
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default)]
    pub created_at: String,
}

fn default_color() -> String {
    "#6366f1".to_owned()
}

// -- Messages --

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderType {
    User,
    Ai,
    System,
}

/// A persisted meeting message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub meeting_id: String,
    pub sender_type: SenderType,
    /// Participant id for AI messages
    #[serde(default)]
    pub sender_id: Option<String>,
    pub sender_name: String,
    pub content: String,
    #[serde(default)]
    pub citations: Vec<Citation>,
    /// Tool calls recorded with the message
    #[serde(default)]
    pub tool_artifacts: Option<serde_json::Value>,
    #[serde(default)]
    pub estimated_cost: f64,
    #[serde(default)]
    pub created_at: String,
}

// -- Meetings --

/// Lifecycle state of a meeting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeetingStatus {
    #[default]
    Active,
    Archived,
}

/// Meeting metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meeting {
    pub id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub agenda: String,
    #[serde(default)]
    pub status: MeetingStatus,
    #[serde(default)]
    pub total_cost: f64,
    #[serde(default)]
    pub created_at: String,
}

/// Authoritative view of a meeting as persisted by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeetingWithParticipants {
    #[serde(flatten)]
    pub meeting: Meeting,
    #[serde(default)]
    pub participants: Vec<Participant>,
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl MeetingWithParticipants {
    /// Look up a participant by id
    pub fn participant(&self, id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == id)
    }

    /// Look up a message by id
    pub fn message(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }
}

// -- Request bodies --

/// Body of the turn stream request
#[derive(Debug, Clone, Serialize)]
pub struct TurnRequest<'a> {
    pub participant_id: &'a str,
}

/// Body of a plain user message
#[derive(Debug, Clone, Serialize)]
pub struct UserMessageRequest<'a> {
    pub content: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meeting_deserializes_from_backend_shape() {
        let meeting: MeetingWithParticipants = serde_json::from_value(serde_json::json!({
            "id": "m-1",
            "user_id": null,
            "name": "Roadmap",
            "agenda": "Q3 priorities",
            "status": "active",
            "total_cost": 0.012,
            "created_at": "2025-03-01T10:00:00.123456",
            "participants": [{
                "id": "p-1",
                "meeting_id": "m-1",
                "name": "Skeptic",
                "role": "Challenges assumptions",
                "system_prompt": "You are skeptical.",
                "provider_config": {"provider": "gemini", "model": "", "temperature": 0.3},
                "color": "#ef4444",
                "created_at": "2025-03-01T10:00:00"
            }],
            "messages": [{
                "id": "msg-1",
                "meeting_id": "m-1",
                "sender_type": "ai",
                "sender_id": "p-1",
                "sender_name": "Skeptic",
                "content": "Why now?",
                "citations": [{"source": "roadmap.pdf"}],
                "tool_artifacts": null,
                "estimated_cost": 0.0,
                "created_at": "2025-03-01T10:01:00"
            }]
        }))
        .unwrap();

        assert_eq!(meeting.meeting.name, "Roadmap");
        assert_eq!(meeting.participant("p-1").map(|p| p.provider_config.provider.as_str()), Some("gemini"));
        assert_eq!(meeting.message("msg-1").map(|m| m.sender_type), Some(SenderType::Ai));
        assert_eq!(meeting.messages[0].citations[0].source, "roadmap.pdf");
    }

    #[test]
    fn participant_defaults_fill_missing_fields() {
        let participant: Participant = serde_json::from_value(serde_json::json!({
            "id": "p-2",
            "meeting_id": "m-1",
            "name": "Scribe"
        }))
        .unwrap();

        assert_eq!(participant.color, "#6366f1");
        assert!(participant.provider_config.provider.is_empty());
        assert!((participant.provider_config.temperature - 0.7).abs() < f64::EPSILON);
    }
}
