pub mod openai;

use async_trait::async_trait;
use futures::{ Future, Stream };
use serde::Deserialize;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::{ GenerationParams, LlmConfig, PromptMessage };
use self::openai::OpenAICompatClient;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")] Http(#[from] reqwest::Error),
    #[error("provider returned {status}: {body}")] Status {
        status: u16,
        body: String,
    },
    #[error("provider configuration error: {0}")] Config(String),
    #[error("provider stream ended abnormally: {0}")] Stream(String),
}

/// Lazy, finite, non-restartable sequence of generated text fragments.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send>>;

#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Opens a streaming completion for `messages`. Errors returned here happen
    /// before any fragment exists; errors yielded by the stream happen after.
    async fn stream_chat(
        &self,
        messages: Vec<PromptMessage>,
        params: &GenerationParams
    ) -> Result<TextStream, ProviderError>;

    fn get_model(&self) -> String;
    fn get_base_url(&self) -> String;
}

pub fn create_streaming_response<F, Fut>(response_fn: F) -> TextStream
    where
        F: FnOnce(mpsc::Sender<Result<String, ProviderError>>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static
{
    let (tx, rx) = mpsc::channel(32);

    tokio::spawn(async move {
        response_fn(tx).await;
    });

    Box::pin(ReceiverStream::new(rx))
}

pub fn new_client(config: &LlmConfig) -> Result<Arc<dyn ChatClient>, ProviderError> {
    let client = OpenAICompatClient::from_config(config)?;
    Ok(Arc::new(client))
}

#[derive(Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDelta>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum SseEvent {
    Fragment(String),
    /// Text that also carries the finish reason.
    Last(String),
    Done,
    Skip,
}

/// Interprets one line of an OpenAI-style event stream.
pub fn parse_sse_line(line: &str) -> Result<SseEvent, ProviderError> {
    let line = line.trim_end_matches('\r');
    let data = match line.strip_prefix("data:") {
        Some(data) => data.trim_start(),
        None => {
            return Ok(SseEvent::Skip);
        }
    };
    if data == "[DONE]" {
        return Ok(SseEvent::Done);
    }

    let resp: StreamResponse = serde_json
        ::from_str(data)
        .map_err(|e| ProviderError::Stream(format!("unparseable event '{}': {}", data, e)))?;

    if let Some(error) = resp.error {
        return Err(ProviderError::Stream(error_message(&error)));
    }

    let mut text = String::new();
    let mut finished = false;
    for choice in resp.choices.into_iter().take(1) {
        if let Some(content) = choice.delta.and_then(|d| d.content) {
            text.push_str(&content);
        }
        finished = choice.finish_reason.is_some();
    }

    if !text.is_empty() && finished {
        Ok(SseEvent::Last(text))
    } else if !text.is_empty() {
        Ok(SseEvent::Fragment(text))
    } else if finished {
        Ok(SseEvent::Done)
    } else {
        Ok(SseEvent::Skip)
    }
}

/// Providers send either `{"error": {"message": ..}}` or `{"error": "..."}`.
fn error_message(error: &serde_json::Value) -> String {
    match error {
        serde_json::Value::String(message) => message.clone(),
        other =>
            other
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::to_owned)
                .unwrap_or_else(|| other.to_string()),
    }
}

/// Reassembles lines from a byte stream whose chunk boundaries are arbitrary.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds `chunk` and returns every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            lines.push(String::from_utf8_lossy(&line[..line.len() - 1]).into_owned());
        }
        lines
    }

    /// Returns whatever is left once the byte stream has ended.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }
}
