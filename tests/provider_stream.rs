use ancient_traveler::config::prompt::SYSTEM_PROMPT;
use ancient_traveler::llm::chat::openai::OpenAICompatClient;
use ancient_traveler::llm::chat::{ ChatClient, ProviderError };
use ancient_traveler::llm::{ GenerationParams, PromptMessage };
use ancient_traveler::models::chat::ErrorBody;
use ancient_traveler::server::api::{ router, AppState };
use axum::body::{ Body, Bytes };
use axum::extract::State;
use axum::http::{ header, HeaderMap, Request, StatusCode };
use axum::response::{ IntoResponse, Response };
use axum::routing::post;
use axum::{ Json, Router };
use futures::{ stream, StreamExt };
use std::convert::Infallible;
use std::sync::{ Arc, Mutex };
use std::time::Duration;
use tokio::sync::oneshot;
use tower::ServiceExt;

#[derive(Clone, Default)]
struct Captured {
    body: Arc<Mutex<Option<serde_json::Value>>>,
    auth: Arc<Mutex<Option<String>>>,
}

/// Event stream cut at awkward places, the way a real socket delivers it.
const SSE_CHUNKS: &[&str] = &[
    "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
    "data: {\"choices\":[{\"delta\":{\"content\":\"Hail, \"}}]}\n\ndata: {\"choi",
    "ces\":[{\"delta\":{\"content\":\"seeker of \"}}]}\n\n",
    ": keep-alive\n\n",
    "data: {\"choices\":[{\"delta\":{\"content\":\"Ἀθῆναι.\"},\"finish_reason\":null}]}\n\n",
    "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
    "data: [DONE]\n\n",
];

async fn completions(
    State(captured): State<Captured>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>
) -> Response {
    *captured.auth.lock().unwrap() = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    *captured.body.lock().unwrap() = Some(body);

    let chunks = stream::iter(SSE_CHUNKS.iter().map(|c| Ok::<Bytes, Infallible>(Bytes::from_static(c.as_bytes()))));
    ([("content-type", "text/event-stream")], Body::from_stream(chunks)).into_response()
}

/// A 200 stream that reports a failure as an event instead of a status.
const ERROR_EVENT_CHUNKS: &[&str] = &[
    "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
    "data: {\"error\":{\"message\":\"rate limit exceeded\",\"type\":\"too_many_requests_error\"}}\n\n",
];

/// Text, then the connection closes with neither a finish reason nor `[DONE]`.
const CUT_SHORT_CHUNKS: &[&str] = &["data: {\"choices\":[{\"delta\":{\"content\":\"Hail\"}}]}\n\n"];

fn event_stream(chunks: &'static [&'static str]) -> Response {
    let chunks = stream::iter(chunks.iter().map(|c| Ok::<Bytes, Infallible>(Bytes::from_static(c.as_bytes()))));
    ([("content-type", "text/event-stream")], Body::from_stream(chunks)).into_response()
}

async fn rejecting() -> Response {
    (StatusCode::UNAUTHORIZED, "{\"message\":\"Wrong API Key\"}").into_response()
}

async fn spawn_provider(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/v1/chat/completions", addr)
}

#[tokio::test]
async fn parses_split_event_stream() {
    let captured = Captured::default();
    let url = spawn_provider(
        Router::new().route("/v1/chat/completions", post(completions)).with_state(captured.clone())
    ).await;

    let client = OpenAICompatClient::new("csk-test", "llama-3.3-70b".into(), url).unwrap();
    let prompt = vec![PromptMessage::system("persona"), PromptMessage::user("Greet me.")];
    let mut fragments = client.stream_chat(prompt, &GenerationParams::default()).await.unwrap();

    let mut collected = Vec::new();
    while let Some(fragment) = fragments.next().await {
        collected.push(fragment.unwrap());
    }
    assert_eq!(collected, vec!["Hail, ", "seeker of ", "Ἀθῆναι."]);

    let body = captured.body.lock().unwrap().clone().unwrap();
    assert_eq!(body["model"], "llama-3.3-70b");
    assert_eq!(body["stream"], true);
    assert_eq!(body["max_completion_tokens"], 2048);
    assert_eq!(body["top_p"], 1.0);
    assert_eq!(body["messages"].as_array().unwrap().len(), 2);
    assert_eq!(body["messages"][0]["role"], "system");
    assert_eq!(captured.auth.lock().unwrap().as_deref(), Some("Bearer csk-test"));
}

#[tokio::test]
async fn error_status_fails_before_streaming() {
    let url = spawn_provider(Router::new().route("/v1/chat/completions", post(rejecting))).await;

    let client = OpenAICompatClient::new("bad", "llama-3.3-70b".into(), url).unwrap();
    let result = client.stream_chat(vec![PromptMessage::user("hi")], &GenerationParams::default()).await;

    match result {
        Err(ProviderError::Status { status, body }) => {
            assert_eq!(status, 401);
            assert!(body.contains("Wrong API Key"));
        }
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("expected the provider to reject the request"),
    }
}

#[tokio::test]
async fn unreachable_provider_fails_before_streaming() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = OpenAICompatClient::new("csk-test", "m".into(), format!("http://{}/v1/chat/completions", addr)).unwrap();
    let result = client.stream_chat(vec![PromptMessage::user("hi")], &GenerationParams::default()).await;
    assert!(matches!(result, Err(ProviderError::Http(_))));
}

fn relay_for(url: String) -> Router {
    let client = OpenAICompatClient::new("csk-test", "llama-3.3-70b".into(), url).unwrap();
    router(
        AppState {
            chat_client: Some(Arc::new(client)),
            system_prompt: Arc::from(SYSTEM_PROMPT),
            params: GenerationParams::default(),
        },
        false
    )
}

fn rome_request() -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"message\":\"Tell me about Rome.\"}"))
        .unwrap()
}

async fn error_body(response: Response) -> ErrorBody {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn error_event_after_ok_status_is_a_stream_error() {
    let url = spawn_provider(
        Router::new().route(
            "/v1/chat/completions",
            post(|| async { event_stream(ERROR_EVENT_CHUNKS) })
        )
    ).await;

    let client = OpenAICompatClient::new("csk-test", "llama-3.3-70b".into(), url).unwrap();
    let mut fragments = client.stream_chat(vec![PromptMessage::user("hi")], &GenerationParams::default()).await.unwrap();

    match fragments.next().await {
        Some(Err(ProviderError::Stream(message))) => assert_eq!(message, "rate limit exceeded"),
        other => panic!("unexpected item: {:?}", other.map(|r| r.map_err(|e| e.to_string()))),
    }
    assert!(fragments.next().await.is_none());
}

#[tokio::test]
async fn relay_reports_error_event_as_structured_failure() {
    let url = spawn_provider(
        Router::new().route(
            "/v1/chat/completions",
            post(|| async { event_stream(ERROR_EVENT_CHUNKS) })
        )
    ).await;

    let response = relay_for(url).oneshot(rome_request()).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(error_body(response).await, ErrorBody {
        error: "Failed to process chat request".into(),
        message: "provider stream ended abnormally: rate limit exceeded".into(),
    });
}

#[tokio::test]
async fn stream_closed_without_completion_is_an_error() {
    let url = spawn_provider(
        Router::new().route(
            "/v1/chat/completions",
            post(|| async { event_stream(CUT_SHORT_CHUNKS) })
        )
    ).await;

    let client = OpenAICompatClient::new("csk-test", "llama-3.3-70b".into(), url).unwrap();
    let mut fragments = client.stream_chat(vec![PromptMessage::user("hi")], &GenerationParams::default()).await.unwrap();

    assert_eq!(fragments.next().await.unwrap().unwrap(), "Hail");
    match fragments.next().await {
        Some(Err(ProviderError::Stream(message))) => assert_eq!(message, "ended before completion"),
        other => panic!("unexpected item: {:?}", other.map(|r| r.map_err(|e| e.to_string()))),
    }
}

#[tokio::test]
async fn relay_reports_silent_cut_off_as_structured_failure() {
    let url = spawn_provider(
        Router::new().route(
            "/v1/chat/completions",
            post(|| async { event_stream(&["data: {\"choices\":[{\"delta\":{}}]}\n\n"]) })
        )
    ).await;

    let response = relay_for(url).oneshot(rome_request()).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(error_body(response).await.message, "provider stream ended abnormally: ended before completion");
}

/// Fires when the provider's response body is dropped, i.e. its connection went away.
struct Released(Option<oneshot::Sender<()>>);

impl Drop for Released {
    fn drop(&mut self) {
        if let Some(tx) = self.0.take() {
            let _ = tx.send(());
        }
    }
}

#[tokio::test]
async fn dropping_the_stream_releases_a_stalled_provider() {
    let (released_tx, released_rx) = oneshot::channel();
    let released = Arc::new(Mutex::new(Some(Released(Some(released_tx)))));

    let url = spawn_provider(
        Router::new().route(
            "/v1/chat/completions",
            post(move || {
                let released = released.lock().unwrap().take();
                async move {
                    let first = stream::once(async {
                        Ok::<Bytes, Infallible>(Bytes::from_static(b"data: {\"choices\":[{\"delta\":{\"content\":\"Hail\"}}]}\n\n"))
                    });
                    // Keep-alive comments forever, never any more text.
                    let pings = stream::unfold((), |_| async {
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Some((Ok::<Bytes, Infallible>(Bytes::from_static(b": ping\n\n")), ()))
                    });
                    let body = first.chain(pings).map(move |chunk| {
                        let _held = &released;
                        chunk
                    });
                    ([("content-type", "text/event-stream")], Body::from_stream(body)).into_response()
                }
            })
        )
    ).await;

    let client = OpenAICompatClient::new("csk-test", "llama-3.3-70b".into(), url).unwrap();
    let mut fragments = client.stream_chat(vec![PromptMessage::user("hi")], &GenerationParams::default()).await.unwrap();
    assert_eq!(fragments.next().await.unwrap().unwrap(), "Hail");
    drop(fragments);

    let outcome = tokio::time::timeout(Duration::from_secs(5), released_rx).await;
    assert!(matches!(outcome, Ok(Ok(()))), "provider connection was never released");
}
