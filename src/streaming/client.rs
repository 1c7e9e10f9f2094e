//! Chat-completions model client
//!
//! Talks to any OpenAI-compatible `/chat/completions` endpoint (DeepSeek by
//! default):
//! - POST with bearer auth from an environment variable
//! - Streaming via SSE `data:` lines, terminated by `[DONE]`
//! - Cancellation through a `CancellationToken`

use crate::cli::config::ModelConfig;
use crate::errors::{AgentError, Result};
use crate::streaming::sse::{SseDecoder, SseEvent};
use crate::tools::ToolSchema;
use crate::types::ChatMessage;
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Default API endpoint
pub const DEFAULT_BASE_URL: &str = "https://api.deepseek.com";

/// Default model
pub const DEFAULT_MODEL: &str = "deepseek-chat";

/// Default request timeout (2 minutes)
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Appended when tool use is disabled for a request
pub const PROSE_INSTRUCTION: &str = "Tool use is disabled for this reply. \
Answer in plain prose using the tool results above. Do not emit tool calls or raw JSON arguments.";

/// Stream event channel depth
const STREAM_CHANNEL_CAPACITY: usize = 64;

/// Model API failures
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    /// The caller cancelled the request; not a failure
    #[error("request cancelled")]
    Cancelled,

    #[error("{message}")]
    Api { message: String, status: Option<u16> },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Decode(String),
}

impl ModelError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ModelError::Cancelled)
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ModelError::Api { status, .. } => *status,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ModelError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => ModelError::Api {
                message: e.to_string(),
                status: Some(status.as_u16()),
            },
            None => ModelError::Transport(e.to_string()),
        }
    }
}

/// One request to the model
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolSchema>,
    pub tools_enabled: bool,
}

impl ChatRequest {
    /// Request offering the given tools
    pub fn with_tools(messages: Vec<ChatMessage>, tools: Vec<ToolSchema>) -> Self {
        Self {
            messages,
            tools,
            tools_enabled: true,
        }
    }

    /// Follow-up request with tool use disabled
    pub fn without_tools(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            tools: Vec::new(),
            tools_enabled: false,
        }
    }
}

/// Incremental output of a streaming request
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Newly generated content
    Delta(String),

    /// End of stream with the full text; `error` is set if it ended early
    Done {
        text: String,
        error: Option<ModelError>,
    },
}

/// Model API contract
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Non-streaming completion
    async fn complete(&self, request: &ChatRequest) -> std::result::Result<String, ModelError>;

    /// Streaming completion; the receiver always ends with `Done`
    async fn stream(
        &self,
        request: &ChatRequest,
        cancel: CancellationToken,
    ) -> std::result::Result<mpsc::Receiver<StreamEvent>, ModelError>;
}

/// HTTP client for OpenAI-compatible endpoints
#[derive(Debug, Clone)]
pub struct HttpModelClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl HttpModelClient {
    /// Create client with default endpoint and model, no credentials
    pub fn new() -> Result<Self> {
        Self::with_config(DEFAULT_BASE_URL, DEFAULT_MODEL, None, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Create client with custom configuration
    pub fn with_config(
        base_url: &str,
        model: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(AgentError::HttpError)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
        })
    }

    /// Build from the `[model]` config section, reading the key from its env var
    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty());
        if api_key.is_none() {
            warn!(env = %config.api_key_env, "no API key set; requests will be unauthenticated");
        }
        Self::with_config(
            &config.base_url,
            &config.model,
            api_key,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// JSON body for a request
    pub fn build_body(&self, request: &ChatRequest, stream: bool) -> Value {
        let mut messages = request.messages.clone();
        if !request.tools_enabled {
            messages.push(ChatMessage::system(PROSE_INSTRUCTION));
        }

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "stream": stream,
        });

        if request.tools_enabled && !request.tools.is_empty() {
            body["tools"] = Value::Array(
                request.tools.iter().map(ToolSchema::to_function_spec).collect(),
            );
        }
        body
    }

    async fn send(
        &self,
        request: &ChatRequest,
        stream: bool,
    ) -> std::result::Result<reqwest::Response, ModelError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut builder = self.client.post(&url).json(&self.build_body(request, stream));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        debug!(%url, messages = request.messages.len(), tools = request.tools_enabled, "sending chat request");
        let response = builder.send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Api {
                message: api_error_message(&body, status),
                status: Some(status),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl ModelClient for HttpModelClient {
    async fn complete(&self, request: &ChatRequest) -> std::result::Result<String, ModelError> {
        let response = self.send(request, false).await?;
        let completion: Completion = response
            .json()
            .await
            .map_err(|e| ModelError::Decode(e.to_string()))?;

        completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.unwrap_or_default())
            .ok_or_else(|| ModelError::Decode("response has no choices".to_string()))
    }

    async fn stream(
        &self,
        request: &ChatRequest,
        cancel: CancellationToken,
    ) -> std::result::Result<mpsc::Receiver<StreamEvent>, ModelError> {
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(ModelError::Cancelled),
            response = self.send(request, true) => response?,
        };

        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        tokio::spawn(pump_stream(response, tx, cancel));
        Ok(rx)
    }
}

/// Forward SSE content deltas until `[DONE]`, end of body, error or cancel
async fn pump_stream(
    response: reqwest::Response,
    tx: mpsc::Sender<StreamEvent>,
    cancel: CancellationToken,
) {
    let mut body = Box::pin(response.bytes_stream());
    let mut decoder = SseDecoder::new();
    let mut text = String::new();

    let error = loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => break Some(ModelError::Cancelled),
            chunk = body.next() => chunk,
        };

        let (events, body_ended) = match chunk {
            Some(Ok(bytes)) => match decoder.add_bytes(&bytes) {
                Ok(events) => (events, false),
                Err(e) => break Some(ModelError::Decode(e.to_string())),
            },
            Some(Err(e)) => break Some(ModelError::from(e)),
            // Body ended without [DONE]; flush any unterminated line
            None => (decoder.finish().into_iter().collect(), true),
        };

        match forward(events, &mut text, &tx).await {
            Forwarded::More if body_ended => break None,
            Forwarded::More => {}
            Forwarded::Finished => break None,
            Forwarded::Failed(e) => break Some(e),
            Forwarded::ReceiverGone => return,
        }
    };

    if let Some(e) = &error {
        debug!(error = %e, received = text.len(), "stream ended early");
    }
    let _ = tx.send(StreamEvent::Done { text, error }).await;
}

enum Forwarded {
    More,
    Finished,
    Failed(ModelError),
    ReceiverGone,
}

async fn forward(
    events: Vec<SseEvent>,
    text: &mut String,
    tx: &mpsc::Sender<StreamEvent>,
) -> Forwarded {
    for event in events {
        let payload = match event {
            SseEvent::Done => return Forwarded::Finished,
            SseEvent::Data(payload) => payload,
        };
        match decode_chunk(&payload) {
            Ok(Some(delta)) => {
                text.push_str(&delta);
                if tx.send(StreamEvent::Delta(delta)).await.is_err() {
                    return Forwarded::ReceiverGone;
                }
            }
            Ok(None) => {}
            Err(e) => return Forwarded::Failed(e),
        }
    }
    Forwarded::More
}

/// Content delta of one streamed chunk, if it carries any
fn decode_chunk(payload: &str) -> std::result::Result<Option<String>, ModelError> {
    let chunk: StreamChunk =
        serde_json::from_str(payload).map_err(|e| ModelError::Decode(e.to_string()))?;

    if let Some(error) = chunk.error {
        return Err(ModelError::Api {
            message: error.message,
            status: None,
        });
    }

    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|content| !content.is_empty()))
}

/// Human-readable message from an error response body
fn api_error_message(body: &str, status: u16) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .map(|parsed| parsed.error.message)
        .ok()
        .filter(|message| !message.is_empty())
        .or_else(|| Some(body.trim().to_string()).filter(|b| !b.is_empty()))
        .unwrap_or_else(|| format!("request failed with status {}", status))
}

/// Non-streaming response
#[derive(Debug, Deserialize)]
struct Completion {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

/// One SSE chunk of a streaming response
#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = HttpModelClient::new().unwrap();
        assert_eq!(client.model(), DEFAULT_MODEL);
        assert_eq!(client.base_url(), DEFAULT_BASE_URL);
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client =
            HttpModelClient::with_config("http://localhost:8000/v1/", "m", None, DEFAULT_REQUEST_TIMEOUT)
                .unwrap();
        assert_eq!(client.base_url(), "http://localhost:8000/v1");
    }

    #[test]
    fn test_body_with_tools() {
        let client = HttpModelClient::new().unwrap();
        let schema = ToolSchema::new("read_file", "Read a file", json!({"type": "object"}));
        let request = ChatRequest::with_tools(vec![ChatMessage::user("hi")], vec![schema]);

        let body = client.build_body(&request, true);
        assert_eq!(body["stream"], true);
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["tools"][0]["function"]["name"], "read_file");
    }

    #[test]
    fn test_body_without_tools_asks_for_prose() {
        let client = HttpModelClient::new().unwrap();
        let request = ChatRequest::without_tools(vec![ChatMessage::user("hi")]);

        let body = client.build_body(&request, true);
        assert!(body.get("tools").is_none());
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1]["role"], "system");
        assert_eq!(messages[1]["content"], PROSE_INSTRUCTION);
    }

    #[test]
    fn test_decode_chunk() {
        let delta = decode_chunk(r#"{"choices":[{"delta":{"content":"Hel"}}]}"#).unwrap();
        assert_eq!(delta.as_deref(), Some("Hel"));

        let role_only = decode_chunk(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#).unwrap();
        assert_eq!(role_only, None);

        let empty = decode_chunk(r#"{"choices":[]}"#).unwrap();
        assert_eq!(empty, None);

        assert!(matches!(decode_chunk("not json"), Err(ModelError::Decode(_))));
    }

    #[test]
    fn test_decode_chunk_error_payload() {
        let err = decode_chunk(r#"{"error":{"message":"overloaded"}}"#).unwrap_err();
        assert_eq!(err.to_string(), "overloaded");
        assert_eq!(err.status(), None);
    }

    #[test]
    fn test_api_error_message() {
        assert_eq!(
            api_error_message(r#"{"error":{"message":"bad key"}}"#, 401),
            "bad key"
        );
        assert_eq!(api_error_message("upstream down", 502), "upstream down");
        assert_eq!(api_error_message("", 500), "request failed with status 500");
    }

    #[test]
    fn test_model_error_classification() {
        assert!(ModelError::Cancelled.is_cancelled());
        let api = ModelError::Api {
            message: "nope".to_string(),
            status: Some(429),
        };
        assert!(!api.is_cancelled());
        assert_eq!(api.status(), Some(429));
        assert_eq!(ModelError::Transport("reset".to_string()).status(), None);
    }
}
