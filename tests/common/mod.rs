#![allow(dead_code)]

use ancient_traveler::config::prompt::SYSTEM_PROMPT;
use ancient_traveler::llm::chat::{ ChatClient, ProviderError, TextStream };
use ancient_traveler::llm::{ GenerationParams, PromptMessage };
use ancient_traveler::server::api::AppState;
use async_trait::async_trait;
use futures::stream;
use std::sync::atomic::{ AtomicUsize, Ordering };
use std::sync::{ Arc, Mutex };

#[derive(Clone)]
pub enum Script {
    Fragments(Vec<&'static str>),
    FailBeforeStream,
    FailAfter(Vec<&'static str>),
}

/// Provider stand-in that replays a fixed script and records what it was asked.
pub struct ScriptedClient {
    script: Script,
    calls: AtomicUsize,
    last_prompt: Mutex<Option<Vec<PromptMessage>>>,
}

impl ScriptedClient {
    pub fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script,
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<Vec<PromptMessage>> {
        self.last_prompt.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatClient for ScriptedClient {
    async fn stream_chat(
        &self,
        messages: Vec<PromptMessage>,
        _params: &GenerationParams
    ) -> Result<TextStream, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock().unwrap() = Some(messages);

        let items: Vec<Result<String, ProviderError>> = match &self.script {
            Script::Fragments(parts) => parts.iter().map(|p| Ok(p.to_string())).collect(),
            Script::FailBeforeStream => {
                return Err(ProviderError::Status { status: 401, body: "invalid api key".into() });
            }
            Script::FailAfter(parts) => parts
                .iter()
                .map(|p| Ok(p.to_string()))
                .chain(std::iter::once(Err(ProviderError::Stream("connection reset".into()))))
                .collect(),
        };
        Ok(Box::pin(stream::iter(items)))
    }

    fn get_model(&self) -> String {
        "scripted".to_string()
    }

    fn get_base_url(&self) -> String {
        "memory://scripted".to_string()
    }
}

pub fn state_with(client: Option<Arc<ScriptedClient>>) -> AppState {
    AppState {
        chat_client: client.map(|c| c as Arc<dyn ChatClient>),
        system_prompt: Arc::from(SYSTEM_PROMPT),
        params: GenerationParams::default(),
    }
}
