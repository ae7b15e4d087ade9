use async_trait::async_trait;
use bytes::Bytes;
use futures::{ Stream, StreamExt };
use log::{ debug, warn };
use reqwest::Client as HttpClient;
use std::pin::Pin;

use super::ClientError;
use crate::models::chat::SendMessageRequest;

/// Raw response body, chunk by chunk, as the relay sent it.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ClientError>> + Send>>;

#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Sends one turn. `Err` means the relay never started streaming.
    async fn send(&self, request: &SendMessageRequest) -> Result<ByteStream, ClientError>;
}

pub struct HttpTransport {
    http: HttpClient,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(relay_url: &str) -> Result<Self, ClientError> {
        let http = HttpClient::builder().build()?;
        Ok(Self {
            http,
            endpoint: format!("{}/api/chat", relay_url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn send(&self, request: &SendMessageRequest) -> Result<ByteStream, ClientError> {
        debug!("POST {} ({} history messages)", self.endpoint, request.conversation_history.len());
        let resp = self.http.post(&self.endpoint).json(request).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!("Relay answered {}: {}", status, body);
            return Err(ClientError::Status { status: status.as_u16(), body });
        }

        Ok(Box::pin(resp.bytes_stream().map(|chunk| chunk.map_err(ClientError::from))))
    }
}
