/// Client-specific result type
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors talking to the meeting backend
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend returned a non-success status
    #[error("backend returned {status}: {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// `detail` from the error body, or the raw body
        message: String,
    },

    /// Response body did not have the expected shape
    #[error("failed to parse response: {0}")]
    Parse(String),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Why a turn could not start or did not resolve
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    /// Another participant is mid-turn in this meeting
    #[error("a turn is already active for participant '{participant_id}'")]
    AlreadyActive {
        /// Participant currently holding the turn
        participant_id: String,
    },

    /// The participant is not part of the meeting
    #[error("participant '{0}' not found in meeting")]
    ParticipantNotFound(String),

    /// The turn stream could not be opened
    #[error("failed to open turn stream: {0}")]
    Connect(#[source] ClientError),

    /// The stream broke or ended before a terminal event
    #[error("turn stream interrupted: {0}")]
    Transport(String),

    /// The backend reported an `error` event
    #[error("turn failed: {0}")]
    Upstream(String),

    /// The authoritative meeting could not be fetched after completion
    #[error("failed to reconcile completed turn: {0}")]
    Reconciliation(#[source] ClientError),

    /// The persisted message announced by `done` is missing from the meeting
    #[error("completed message '{0}' not present in refreshed meeting")]
    MissingMessage(String),

    /// The turn was cancelled by the caller
    #[error("turn cancelled")]
    Cancelled,

    /// Any other backend failure outside the stream itself
    #[error(transparent)]
    Backend(#[from] ClientError),
}
