use async_trait::async_trait;
use log::debug;
use reqwest::{ Client as HttpClient, header::{ HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION } };
use serde::{ Deserialize, Serialize };

use super::{ http_stream_generate, BoxError, ChatClient, LineEvent, TokenStream };
use crate::llm::{ LlmConfig, LlmType };
use crate::models::chat::Message;
use rllm::builder::LLMBackend;

const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEEPSEEK_URL: &str = "https://api.deepseek.com/chat/completions";
const XAI_URL: &str = "https://api.x.ai/v1/chat/completions";
const GROQ_URL: &str = "https://api.groq.com/openai/v1/chat/completions";

/// Streaming client for OpenAI and the providers that speak its
/// `/chat/completions` dialect (DeepSeek, xAI, Groq). `base_url` is the full
/// completions endpoint.
pub struct OpenAIChatClient {
    http: HttpClient,
    api_key: String,
    model: String,
    base_url: String,
    backend: LLMBackend,
}

#[derive(Serialize)]
struct OpenAIMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct OpenAIChatRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAIMessage<'a>>,
    stream: bool,
}

#[derive(Deserialize)]
struct OpenAIStreamResponse {
    choices: Vec<OpenAIStreamChoice>,
}

#[derive(Deserialize)]
struct OpenAIStreamChoice {
    delta: OpenAIDelta,
    #[serde(rename = "finish_reason")]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIDelta {
    content: Option<String>,
}

fn provider_defaults(llm_type: LlmType) -> Option<(&'static str, &'static str, LLMBackend)> {
    match llm_type {
        LlmType::OpenAI => Some((OPENAI_URL, "gpt-4o", LLMBackend::OpenAI)),
        LlmType::DeepSeek => Some((DEEPSEEK_URL, "deepseek-chat", LLMBackend::DeepSeek)),
        LlmType::XAI => Some((XAI_URL, "grok-2-latest", LLMBackend::XAI)),
        LlmType::Groq => Some((GROQ_URL, "llama-3.3-70b-versatile", LLMBackend::Groq)),
        _ => None,
    }
}

/// One line of an SSE completion stream.
pub(crate) fn parse_sse_line(line: &str) -> LineEvent {
    let Some(data) = line.strip_prefix("data:") else {
        return LineEvent::Skip;
    };
    let data = data.trim_start();
    if data == "[DONE]" {
        return LineEvent::Done;
    }

    match serde_json::from_str::<OpenAIStreamResponse>(data) {
        Ok(stream_resp) => {
            let Some(choice) = stream_resp.choices.into_iter().next() else {
                return LineEvent::Skip;
            };
            match choice.delta.content {
                Some(content) if !content.is_empty() => LineEvent::Token(content),
                _ if choice.finish_reason.as_deref() == Some("stop") => LineEvent::Done,
                _ => LineEvent::Skip,
            }
        }
        Err(e) => {
            debug!("JSON parse error: {} for data: {}", e, data);
            LineEvent::Skip
        }
    }
}

impl OpenAIChatClient {
    pub fn new(
        api_key: String,
        model: String,
        base_url: String,
        backend: LLMBackend
    ) -> Result<Self, BoxError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key)).map_err(|e|
                format!("Invalid API key format: {}", e)
            )?
        );

        let http = HttpClient::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| Box::new(e) as BoxError)?;

        Ok(Self {
            http,
            api_key,
            model,
            base_url,
            backend,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, BoxError> {
        let (default_url, default_model, backend) = provider_defaults(
            config.llm_type
        ).ok_or_else(|| format!("{} is not an OpenAI-compatible provider", config.llm_type))?;

        let api_key = config.api_key
            .clone()
            .ok_or_else(|| format!("{} API key is required", config.llm_type))?;

        Self::new(
            api_key,
            config.completion_model.clone().unwrap_or_else(|| default_model.to_string()),
            config.base_url.clone().unwrap_or_else(|| default_url.to_string()),
            backend
        )
    }
}

#[async_trait]
impl ChatClient for OpenAIChatClient {
    async fn stream_chat(&self, messages: &[Message]) -> Result<TokenStream, BoxError> {
        let req = OpenAIChatRequest {
            model: &self.model,
            messages: messages
                .iter()
                .map(|m| OpenAIMessage { role: m.role.as_str(), content: &m.content })
                .collect(),
            stream: true,
        };
        let request = self.http.post(self.base_url.trim_end_matches('/')).json(&req);
        Ok(http_stream_generate(request, parse_sse_line))
    }

    fn supports_native_streaming(&self) -> bool {
        true
    }

    fn get_api_key(&self) -> String {
        self.api_key.clone()
    }

    fn get_model(&self) -> String {
        self.model.clone()
    }

    fn get_base_url(&self) -> Option<String> {
        Some(self.base_url.clone())
    }

    fn get_llm_backend(&self) -> LLMBackend {
        self.backend.clone()
    }
}
