use std::fmt;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use colloquy_config::BackendConfig;
use futures::stream::{Stream, StreamExt};
use reqwest::header::ACCEPT;
use url::Url;

use crate::error::{ClientError, Result};
use crate::types::{Message, MeetingWithParticipants, TurnRequest, UserMessageRequest};

/// Raw body of a turn stream
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Operations the turn pipeline needs from the meeting backend
#[async_trait]
pub trait MeetingBackend: Send + Sync {
    /// Start a participant's turn and return the event-stream body
    ///
    /// Fails before any byte is produced if the request cannot be sent or
    /// the backend answers with a non-success status.
    async fn open_turn(&self, meeting_id: &str, participant_id: &str) -> Result<ByteStream>;

    /// Fetch the persisted meeting with participants and messages
    async fn get_meeting(&self, meeting_id: &str) -> Result<MeetingWithParticipants>;

    /// Persist a plain user message
    async fn post_message(&self, meeting_id: &str, content: &str) -> Result<Message>;
}

/// [`MeetingBackend`] over the meeting HTTP API
#[derive(Clone)]
pub struct HttpBackend {
    base_url: Url,
    http: reqwest::Client,
}

impl fmt::Debug for HttpBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpBackend")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HttpBackend {
    /// Create a backend pointing at the API root, e.g. `http://localhost:8000/api`
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(|e| ClientError::Config(format!("invalid base URL: {e}")))?;

        Ok(Self {
            base_url,
            http: reqwest::Client::new(),
        })
    }

    /// Create a backend from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the connect timeout is invalid or the HTTP
    /// client cannot be built
    pub fn from_config(config: &BackendConfig) -> Result<Self> {
        let connect_timeout: Duration =
            colloquy_config::parse_duration(&config.connect_timeout).map_err(ClientError::Config)?;

        // No overall timeout: a turn streams for as long as the model talks
        let http = reqwest::Client::builder().connect_timeout(connect_timeout).build()?;

        Ok(Self {
            base_url: config.base_url.clone(),
            http,
        })
    }

    /// API root this backend talks to
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }
}

#[async_trait]
impl MeetingBackend for HttpBackend {
    async fn open_turn(&self, meeting_id: &str, participant_id: &str) -> Result<ByteStream> {
        let url = make_url(&self.base_url, &["meetings", meeting_id, "turn", "stream"])?;

        tracing::debug!(%url, participant_id, "opening turn stream");

        let response = self
            .http
            .post(url)
            .header(ACCEPT, "text/event-stream")
            .json(&TurnRequest { participant_id })
            .send()
            .await?;

        let response = handle_error(response).await?;
        let body = response.bytes_stream().map(|chunk| chunk.map_err(ClientError::Http));

        Ok(Box::pin(body))
    }

    async fn get_meeting(&self, meeting_id: &str) -> Result<MeetingWithParticipants> {
        let url = make_url(&self.base_url, &["meetings", meeting_id])?;

        let response = self.http.get(url).send().await?;

        handle_error(response)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::Parse(format!("meeting: {e}")))
    }

    async fn post_message(&self, meeting_id: &str, content: &str) -> Result<Message> {
        let url = make_url(&self.base_url, &["meetings", meeting_id, "message"])?;

        let response = self
            .http
            .post(url)
            .json(&UserMessageRequest { content })
            .send()
            .await?;

        handle_error(response)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::Parse(format!("message: {e}")))
    }
}

// -- Helper functions --

/// Append path segments to the API root
fn make_url(base_url: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base_url.clone();
    url.path_segments_mut()
        .map_err(|()| ClientError::Config(format!("base URL cannot have a path: {base_url}")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Check an HTTP response for errors
async fn handle_error(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();

    Err(ClientError::Api {
        status: status.as_u16(),
        message: parse_error_body(&body),
    })
}

/// Extract the `detail` field of an error body, falling back to the raw text
fn parse_error_body(body: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(json) => match &json["detail"] {
            serde_json::Value::String(detail) => detail.clone(),
            serde_json::Value::Null => body.to_owned(),
            other => other.to_string(),
        },
        Err(_) => body.to_owned(),
    }
}
