use crate::config::prompt::build_prompt;
use crate::error::RelayError;
use crate::llm::chat::{ ChatClient, ProviderError };
use crate::llm::GenerationParams;
use crate::models::chat::SendMessageRequest;
use std::sync::Arc;
use axum::{
    body::{ Body, Bytes },
    extract::State,
    http::{ header, HeaderValue, StatusCode, Version },
    response::{ IntoResponse, Response },
    routing::{ get, post },
    Json,
    Router,
};
use futures::{ future, stream, StreamExt };
use serde::Serialize;
use tower_http::cors::{ Any, CorsLayer };
use log::{ debug, error, info };

#[derive(Clone)]
pub struct AppState {
    /// `None` when no provider credential was supplied at startup.
    pub chat_client: Option<Arc<dyn ChatClient>>,
    pub system_prompt: Arc<str>,
    pub params: GenerationParams,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    provider_configured: bool,
}

pub fn router(state: AppState, enable_cors: bool) -> Router {
    let mut app = Router::new()
        .route("/api/chat", post(chat_handler))
        .route("/api/health", get(health_handler))
        .with_state(state);

    if enable_cors {
        let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
        app = app.layer(cors);
    }

    app
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        provider_configured: state.chat_client.is_some(),
    })
}

async fn chat_handler(State(state): State<AppState>, version: Version, body: Bytes) -> Response {
    match relay_chat(state, body).await {
        Ok(body) => streaming_response(body, version),
        Err(e) => {
            error!("Chat API error: {}", e);
            e.into_response()
        }
    }
}

async fn relay_chat(state: AppState, body: Bytes) -> Result<Body, RelayError> {
    let client = state.chat_client.as_ref().ok_or(RelayError::Configuration)?;
    let request = SendMessageRequest::from_json(&body).map_err(RelayError::Validation)?;

    let prompt = build_prompt(&state.system_prompt, &request.conversation_history, &request.message);
    debug!("Relaying chat turn with {} prompt messages", prompt.len());

    let mut fragments = client.stream_chat(prompt, &state.params).await?;

    // Nothing is sent until the provider has produced something, so a failure
    // up to this point can still become a structured 500.
    let first = loop {
        match fragments.next().await {
            Some(Ok(text)) if text.is_empty() => {
                continue;
            }
            Some(Ok(text)) => {
                break text;
            }
            Some(Err(e)) => {
                return Err(e.into());
            }
            None => {
                info!("Provider finished without producing any text");
                return Err(ProviderError::Stream("provider returned no text".to_string()).into());
            }
        }
    };

    let relayed = stream
        ::once(future::ready(Ok::<String, ProviderError>(first)))
        .chain(fragments)
        .filter(|item| future::ready(!matches!(item, Ok(text) if text.is_empty())))
        .map(|item| {
            item.map(Bytes::from).map_err(|e| {
                error!("Provider failed mid-stream, terminating response: {}", e);
                e
            })
        });
    Ok(Body::from_stream(relayed))
}

fn streaming_response(body: Body, version: Version) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    // Connection-specific headers are forbidden from HTTP/2 on.
    if version == Version::HTTP_10 || version == Version::HTTP_11 {
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    }
    response
}
