use async_trait::async_trait;
use super::{ BoxError, ChatClient };
use crate::llm::{ LlmConfig, LlmType };
use rllm::builder::LLMBackend;

/// Providers reached through `rllm` without native token streaming. The
/// reply is fetched whole and handed on as one token.
pub struct BufferedChatClient {
    api_key: String,
    model: String,
    base_url: Option<String>,
    backend: LLMBackend,
}

impl BufferedChatClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, BoxError> {
        let (backend, default_model) = match config.llm_type {
            LlmType::Anthropic => (LLMBackend::Anthropic, "claude-3-5-sonnet-latest"),
            LlmType::Gemini => (LLMBackend::Google, "gemini-1.5-flash-latest"),
            other => {
                return Err(format!("{} is not served by the buffered client", other).into());
            }
        };
        let api_key = config.api_key
            .clone()
            .ok_or_else(|| format!("{} API key is required", config.llm_type))?;

        Ok(Self {
            api_key,
            model: config.completion_model.clone().unwrap_or_else(|| default_model.to_string()),
            base_url: config.base_url.clone(),
            backend,
        })
    }
}

#[async_trait]
impl ChatClient for BufferedChatClient {
    fn get_api_key(&self) -> String {
        self.api_key.clone()
    }

    fn get_model(&self) -> String {
        self.model.clone()
    }

    fn get_base_url(&self) -> Option<String> {
        self.base_url.clone()
    }

    fn get_llm_backend(&self) -> LLMBackend {
        self.backend.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gemini_uses_google_backend() {
        let config = LlmConfig {
            llm_type: LlmType::Gemini,
            api_key: Some("k".into()),
            ..LlmConfig::default()
        };
        let client = BufferedChatClient::from_config(&config).unwrap();
        assert_eq!(client.get_model(), "gemini-1.5-flash-latest");
        assert!(matches!(client.get_llm_backend(), LLMBackend::Google));
        assert!(!client.supports_native_streaming());
    }

    #[test]
    fn refuses_streaming_providers() {
        let config = LlmConfig {
            llm_type: LlmType::Ollama,
            ..LlmConfig::default()
        };
        assert!(BufferedChatClient::from_config(&config).is_err());
    }
}
