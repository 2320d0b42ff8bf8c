use crate::models::chat::{ Message, Role };
use std::error::Error;
use std::fmt;
use std::fs;
use std::sync::Arc;
use log::info;

/// Instruction injected in front of every conversation that does not bring
/// its own system message.
pub const SYSTEM_PROMPT: &str =
    "You are the official AI assistant for the Ahmedabad Municipal Corporation. Provide helpful, accurate, and concise information about municipal services, procedures, and facilities in Ahmedabad. Be polite and professional. If you don't know the answer to a specific query, suggest contacting the relevant department directly. Respond in English by default, but support Gujarati if the user asks in Gujarati.";

#[derive(Debug)]
pub enum PromptError {
    EmptyPrompt(String),
    IoError(std::io::Error),
}

impl fmt::Display for PromptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptError::EmptyPrompt(path) => write!(f, "System prompt file '{}' is empty", path),
            PromptError::IoError(e) => write!(f, "System prompt file IO error: {}", e),
        }
    }
}

impl Error for PromptError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PromptError::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PromptError {
    fn from(err: std::io::Error) -> Self {
        PromptError::IoError(err)
    }
}

/// Loads the system prompt, from `path` when given, otherwise the built-in one.
pub fn load_system_prompt(path: Option<&str>) -> Result<Arc<str>, PromptError> {
    let Some(path) = path else {
        return Ok(Arc::from(SYSTEM_PROMPT));
    };

    let content = fs::read_to_string(path)?;
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(PromptError::EmptyPrompt(path.to_string()));
    }
    info!("Loaded system prompt override from '{}' ({} chars)", path, trimmed.chars().count());
    Ok(Arc::from(trimmed))
}

/// Prepends a system message carrying `prompt` unless the conversation
/// already opens with one. Only the first message's role is looked at; the
/// caller's messages are passed through in order and untouched.
pub fn with_system_prompt(messages: Vec<Message>, prompt: &str) -> Vec<Message> {
    if messages.first().map(|m| m.role) == Some(Role::System) {
        return messages;
    }

    let mut out = Vec::with_capacity(messages.len() + 1);
    out.push(Message::system(prompt));
    out.extend(messages);
    out
}
