use async_trait::async_trait;
use futures::StreamExt;
use log::{ debug, info, warn };
use reqwest::{ Client as HttpClient, header::{ HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION } };
use serde::Serialize;

use super::{ create_streaming_response, parse_sse_line, ChatClient, LineBuffer, ProviderError, SseEvent, TextStream };
use crate::llm::{ GenerationParams, LlmConfig, PromptMessage };

/// Client for any provider speaking the OpenAI chat-completions dialect
/// (Cerebras, OpenAI, Groq).
pub struct OpenAICompatClient {
    http: HttpClient,
    model: String,
    base_url: String,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<PromptMessage>,
    stream: bool,
    max_completion_tokens: u32,
    temperature: f32,
    top_p: f32,
}

impl OpenAICompatClient {
    pub fn new(api_key: &str, model: String, base_url: String) -> Result<Self, ProviderError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", api_key)).map_err(|e|
            ProviderError::Config(format!("Invalid API key format: {}", e))
        )?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let http = HttpClient::builder().default_headers(headers).build()?;

        Ok(Self { http, model, base_url })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, ProviderError> {
        let api_key = config.api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ProviderError::Config(format!("{} API key is required", config.llm_type)))?;

        let model = config.completion_model
            .clone()
            .unwrap_or_else(|| config.llm_type.default_model().to_string());
        let base_url = config.base_url
            .clone()
            .unwrap_or_else(|| config.llm_type.default_base_url().to_string());

        Self::new(api_key, model, base_url)
    }
}

#[async_trait]
impl ChatClient for OpenAICompatClient {
    async fn stream_chat(
        &self,
        messages: Vec<PromptMessage>,
        params: &GenerationParams
    ) -> Result<TextStream, ProviderError> {
        let model = if params.model.is_empty() { self.model.as_str() } else { params.model.as_str() };
        let req = ChatCompletionRequest {
            model,
            messages,
            stream: true,
            max_completion_tokens: params.max_completion_tokens,
            temperature: params.temperature,
            top_p: params.top_p,
        };

        info!("Starting completion stream to {} (model {}, {} messages)", self.base_url, model, req.messages.len());

        let resp = self.http.post(&self.base_url).json(&req).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!("Provider rejected completion request with {}: {}", status, body);
            return Err(ProviderError::Status { status: status.as_u16(), body });
        }

        let mut bytes = resp.bytes_stream();

        Ok(
            create_streaming_response(move |tx| async move {
                let mut lines = LineBuffer::new();
                loop {
                    let next = tokio::select! {
                        next = bytes.next() => next,
                        _ = tx.closed() => {
                            debug!("Completion consumer went away, dropping provider stream");
                            return;
                        }
                    };

                    let (pending, ended) = match next {
                        Some(Ok(chunk)) => (lines.push(&chunk), false),
                        Some(Err(e)) => {
                            let _ = tx.send(Err(ProviderError::Http(e))).await;
                            return;
                        }
                        None => (lines.finish().into_iter().collect::<Vec<_>>(), true),
                    };

                    for line in pending {
                        match parse_sse_line(&line) {
                            Ok(SseEvent::Fragment(text)) => {
                                if tx.send(Ok(text)).await.is_err() {
                                    debug!("Completion consumer went away, dropping provider stream");
                                    return;
                                }
                            }
                            Ok(SseEvent::Last(text)) => {
                                let _ = tx.send(Ok(text)).await;
                                return;
                            }
                            Ok(SseEvent::Done) => {
                                return;
                            }
                            Ok(SseEvent::Skip) => {}
                            Err(e) => {
                                warn!("Provider reported an error in its event stream: {}", e);
                                let _ = tx.send(Err(e)).await;
                                return;
                            }
                        }
                    }

                    if ended {
                        warn!("Provider event stream closed without a completion marker");
                        let _ = tx.send(Err(ProviderError::Stream("ended before completion".to_string()))).await;
                        return;
                    }
                }
            })
        )
    }

    fn get_model(&self) -> String {
        self.model.clone()
    }

    fn get_base_url(&self) -> String {
        self.base_url.clone()
    }
}
