/// Errors that end a frame or event stream
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// The byte source failed while the turn was streaming
    #[error("transport error: {0}")]
    Transport(String),
}

/// Why a single frame could not become an event
///
/// Never fatal: the frame is dropped and the stream continues.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// The `type` field holds a kind this client does not know
    #[error("unknown event kind '{0}'")]
    UnknownKind(String),

    /// The payload is not valid JSON or lacks a required field
    #[error("malformed event: {0}")]
    Malformed(String),
}

/// Misuse of a turn accumulator
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccumulateError {
    /// The turn already observed `done` or `error`
    #[error("turn is already complete")]
    Terminal,
}
