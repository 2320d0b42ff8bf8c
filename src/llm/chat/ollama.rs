use reqwest::Client as HttpClient;
use serde::{ Deserialize, Serialize };
use async_trait::async_trait;
use super::{ http_stream_generate, BoxError, ChatClient, LineEvent, TokenStream };
use crate::llm::{ LlmConfig, LlmType };
use crate::models::chat::Message;
use log::debug;
use rllm::builder::LLMBackend;

#[derive(Debug)]
pub struct OllamaClient {
    http: HttpClient,
    base_url: String,
    completion_model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage<'a>>,
    stream: bool,
}

#[derive(Serialize)]
struct OllamaMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct StreamResponse {
    #[serde(default)]
    message: Option<StreamMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct StreamMessage {
    #[serde(default)]
    content: String,
}

/// One NDJSON line of `/api/chat`.
pub(crate) fn parse_ndjson_line(line: &str) -> LineEvent {
    if line.trim().is_empty() {
        return LineEvent::Skip;
    }
    match serde_json::from_str::<StreamResponse>(line) {
        Ok(resp) => {
            if let Some(err) = resp.error {
                return LineEvent::Failed(err);
            }
            match resp.message {
                Some(msg) if !msg.content.is_empty() => LineEvent::Token(msg.content),
                _ if resp.done => LineEvent::Done,
                _ => LineEvent::Skip,
            }
        }
        Err(e) => {
            debug!("JSON parse error: {} for line: {}", e, line);
            LineEvent::Skip
        }
    }
}

impl OllamaClient {
    pub fn new(base_url: Option<String>, completion_model: Option<String>) -> Self {
        let model = completion_model.unwrap_or_else(|| "llama3.1".to_string());
        let url = base_url.unwrap_or_else(|| "http://localhost:11434".into());

        Self {
            http: HttpClient::new(),
            base_url: url,
            completion_model: model,
        }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, BoxError> {
        if config.llm_type != LlmType::Ollama {
            return Err("Invalid config type for OllamaClient".into());
        }

        Ok(Self::new(config.base_url.clone(), config.completion_model.clone()))
    }
}

#[async_trait]
impl ChatClient for OllamaClient {
    async fn stream_chat(&self, messages: &[Message]) -> Result<TokenStream, BoxError> {
        let url = format!("{}/api/chat", self.base_url.trim_end_matches('/'));
        let req = ChatRequest {
            model: &self.completion_model,
            messages: messages
                .iter()
                .map(|m| OllamaMessage { role: m.role.as_str(), content: &m.content })
                .collect(),
            stream: true,
        };
        Ok(http_stream_generate(self.http.post(&url).json(&req), parse_ndjson_line))
    }

    fn get_api_key(&self) -> String {
        "".to_string()
    }

    fn get_model(&self) -> String {
        self.completion_model.clone()
    }

    fn get_base_url(&self) -> Option<String> {
        Some(self.base_url.clone())
    }

    fn get_llm_backend(&self) -> LLMBackend {
        LLMBackend::Ollama
    }

    fn supports_native_streaming(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_message_chunks() {
        let line = r#"{"model":"llama3.1","message":{"role":"assistant","content":"Namaste"},"done":false}"#;
        assert_eq!(parse_ndjson_line(line), LineEvent::Token("Namaste".into()));
    }

    #[test]
    fn final_chunk_ends_stream() {
        let line = r#"{"model":"llama3.1","message":{"role":"assistant","content":""},"done":true}"#;
        assert_eq!(parse_ndjson_line(line), LineEvent::Done);
    }

    #[test]
    fn error_lines_fail_the_stream() {
        assert_eq!(
            parse_ndjson_line(r#"{"error":"model 'x' not found"}"#),
            LineEvent::Failed("model 'x' not found".into())
        );
    }

    #[test]
    fn defaults_to_local_daemon() {
        let client = OllamaClient::new(None, None);
        assert_eq!(client.get_base_url().as_deref(), Some("http://localhost:11434"));
        assert_eq!(client.get_model(), "llama3.1");
    }
}
