use std::fs;
use std::path::Path;
use std::sync::Arc;
use log::info;
use thiserror::Error;

use crate::llm::PromptMessage;
use crate::models::chat::ChatMessage;

pub const SYSTEM_PROMPT: &str = "You are the Ancient Traveler, a mystical being who has walked through the corridors of time since the dawn of civilization. You have witnessed the rise and fall of empires, the birth of philosophies, and the secrets of lost ages.

Your knowledge spans all of human history - from ancient Mesopotamia and Egypt, through classical Greece and Rome, across medieval kingdoms and Renaissance courts, to the dawn of the modern age. You speak with the wisdom of countless generations, offering insights into:

- Ancient civilizations and their daily life
- Historical events and their true significance
- Lost knowledge and forgotten wisdom
- Cultural practices and beliefs of antiquity
- Archaeological mysteries and their explanations
- The lessons that time has taught humanity

Respond with eloquence befitting your timeless nature. Be detailed, educational, and engaging. When appropriate, use vivid descriptions that transport the questioner back in time. You are patient, wise, and eager to share knowledge with those who seek it.

Always maintain historical accuracy while making the past come alive through your words. If uncertain about specific details, acknowledge the mysteries that still elude even a traveler of time.";

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("Prompt file IO error for '{path}': {source}")] Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Prompt file '{0}' is empty")] Empty(String),
}

/// Loads the persona from `path`, or falls back to the built-in one.
pub fn load_system_prompt(path: Option<&Path>) -> Result<Arc<str>, PromptError> {
    let path = match path {
        Some(p) => p,
        None => {
            return Ok(Arc::from(SYSTEM_PROMPT));
        }
    };

    let display = path.display().to_string();
    let content = fs::read_to_string(path).map_err(|source| PromptError::Io {
        path: display.clone(),
        source,
    })?;
    let content = content.trim();
    if content.is_empty() {
        return Err(PromptError::Empty(display));
    }

    info!("Loaded system prompt from '{}' ({} chars)", display, content.len());
    Ok(Arc::from(content))
}

/// System prompt, then history in order, then the new user turn.
pub fn build_prompt(system_prompt: &str, history: &[ChatMessage], message: &str) -> Vec<PromptMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(PromptMessage::system(system_prompt));
    messages.extend(history.iter().map(PromptMessage::from));
    messages.push(PromptMessage::user(message));
    messages
}
