pub mod buffered;
pub mod ollama;
pub mod openai;

use async_trait::async_trait;
use futures::{ Stream, StreamExt, Future };
use log::debug;
use std::error::Error as StdError;
use std::pin::Pin;
use std::sync::Arc;
use super::{ LlmConfig, LlmType };
use self::buffered::BufferedChatClient;
use self::ollama::OllamaClient;
use self::openai::OpenAIChatClient;
use crate::codec::LineBuffer;
use crate::models::chat::{ Message, Role };
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use rllm::{
    builder::{ LLMBackend, LLMBuilder },
    chat::{ ChatMessage, ChatRole, MessageType },
};

pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Tokens of one reply, in arrival order.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, BoxError>> + Send>>;

const ERROR_BODY_LIMIT: usize = 512;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("provider returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("provider reported an error: {0}")]
    Provider(String),
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Sends the whole conversation and returns the reply as a token stream.
    /// Providers without native streaming answer with the full reply as a
    /// single token.
    async fn stream_chat(&self, messages: &[Message]) -> Result<TokenStream, BoxError> {
        buffered_chat_for_provider(self, messages).await
    }

    fn get_api_key(&self) -> String;
    fn get_model(&self) -> String;
    fn get_base_url(&self) -> Option<String>;
    fn get_llm_backend(&self) -> LLMBackend;
    fn supports_native_streaming(&self) -> bool {
        false
    }
}

fn to_rllm_messages(messages: &[Message]) -> (Option<String>, Vec<ChatMessage>) {
    let mut system = Vec::new();
    let mut chat = Vec::with_capacity(messages.len());
    for msg in messages {
        let role = match msg.role {
            Role::System => {
                system.push(msg.content.clone());
                continue;
            }
            Role::User => ChatRole::User,
            Role::Assistant => ChatRole::Assistant,
        };
        chat.push(ChatMessage {
            role,
            content: msg.content.clone(),
            message_type: MessageType::Text,
        });
    }
    let system = if system.is_empty() { None } else { Some(system.join("\n\n")) };
    (system, chat)
}

pub async fn buffered_chat_for_provider<T: ChatClient + ?Sized>(
    client: &T,
    messages: &[Message]
) -> Result<TokenStream, BoxError> {
    let api_key = client.get_api_key();
    let model = client.get_model();
    let base_url = client.get_base_url();
    let backend = client.get_llm_backend();
    let (system, chat_messages) = to_rllm_messages(messages);

    Ok(
        full_response_as_stream(move || async move {
            let mut builder = LLMBuilder::new()
                .backend(backend)
                .api_key(api_key)
                .model(&model)
                .stream(false);

            if let Some(url) = base_url {
                builder = builder.base_url(url);
            }
            if let Some(system) = system {
                builder = builder.system(system);
            }

            let provider = builder.build()?;

            provider
                .chat(&chat_messages).await
                .map_err(|e| Box::new(e) as _)
                .map(|resp| {
                    resp.text()
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| resp.to_string())
                })
        })
    )
}

pub fn create_streaming_response<F, Fut>(response_fn: F) -> TokenStream
    where
        F: FnOnce(mpsc::Sender<Result<String, BoxError>>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static
{
    let (tx, rx) = mpsc::channel(32);

    tokio::spawn(async move {
        response_fn(tx).await;
    });

    Box::pin(ReceiverStream::new(rx))
}

pub fn full_response_as_stream<F, Fut>(response_fn: F) -> TokenStream
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<String, BoxError>> + Send + 'static
{
    create_streaming_response(move |tx| async move {
        match response_fn().await {
            Ok(response) => {
                let _ = tx.send(Ok(response)).await;
            }
            Err(e) => {
                let _ = tx.send(Err(e)).await;
            }
        }
    })
}

pub fn new_client(config: &LlmConfig) -> Result<Arc<dyn ChatClient>, BoxError> {
    if config.llm_type.requires_api_key() && config.api_key.is_none() {
        return Err(format!("{} API key is required", config.llm_type).into());
    }

    let client: Arc<dyn ChatClient> = match config.llm_type {
        LlmType::Ollama => {
            let specific_client = OllamaClient::from_config(config)?;
            Arc::new(specific_client)
        }
        LlmType::OpenAI | LlmType::DeepSeek | LlmType::XAI | LlmType::Groq => {
            let specific_client = OpenAIChatClient::from_config(config)?;
            Arc::new(specific_client)
        }
        LlmType::Anthropic | LlmType::Gemini => {
            let specific_client = BufferedChatClient::from_config(config)?;
            Arc::new(specific_client)
        }
    };
    Ok(client)
}

/// What a provider's line parser made of one line of the response body.
#[derive(Debug, PartialEq, Eq)]
pub enum LineEvent {
    Token(String),
    Skip,
    Done,
    Failed(String),
}

/// Sends `request` and turns the line-oriented streaming body into tokens
/// using `line_parser`. Non-2xx answers surface as an [`UpstreamError::Status`]
/// item before any token.
pub fn http_stream_generate(
    request: reqwest::RequestBuilder,
    line_parser: fn(&str) -> LineEvent
) -> TokenStream {
    create_streaming_response(move |tx| async move {
        let resp = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                let _ = tx.send(Err(Box::new(e) as _)).await;
                return;
            }
        };

        let status = resp.status();
        if !status.is_success() {
            let mut body = resp.text().await.unwrap_or_default();
            if body.len() > ERROR_BODY_LIMIT {
                let mut cut = ERROR_BODY_LIMIT;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            let _ = tx.send(Err(Box::new(UpstreamError::Status { status, body }) as _)).await;
            return;
        }

        let mut lines = LineBuffer::new();
        let mut bytes = resp.bytes_stream();
        while let Some(chunk) = bytes.next().await {
            let buf = match chunk {
                Ok(buf) => buf,
                Err(e) => {
                    let _ = tx.send(Err(Box::new(e) as _)).await;
                    return;
                }
            };
            debug!("Provider raw chunk: {} bytes", buf.len());
            for line in lines.push(&buf) {
                if !forward_line(&tx, line_parser(&line)).await {
                    return;
                }
            }
        }
        if let Some(rest) = lines.finish() {
            forward_line(&tx, line_parser(&rest)).await;
        }
    })
}

/// Returns false once the stream should stop: finished, failed or receiver gone.
async fn forward_line(tx: &mpsc::Sender<Result<String, BoxError>>, event: LineEvent) -> bool {
    match event {
        LineEvent::Token(tok) => tx.send(Ok(tok)).await.is_ok(),
        LineEvent::Skip => true,
        LineEvent::Done => false,
        LineEvent::Failed(msg) => {
            let _ = tx.send(Err(Box::new(UpstreamError::Provider(msg)) as _)).await;
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn system_messages_are_lifted_out_for_rllm() {
        let (system, chat) = to_rllm_messages(
            &[Message::system("persona"), Message::user("Hi"), Message::assistant("Hello")]
        );
        assert_eq!(system.as_deref(), Some("persona"));
        assert_eq!(chat.len(), 2);
        assert_eq!(chat[0].content, "Hi");
        assert_eq!(chat[1].content, "Hello");
    }

    #[tokio::test]
    async fn full_response_arrives_as_single_token() {
        let mut stream = full_response_as_stream(|| async { Ok("whole reply".to_string()) });
        assert_eq!(stream.next().await.unwrap().unwrap(), "whole reply");
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn full_response_error_is_forwarded() {
        let mut stream = full_response_as_stream(|| async { Err::<String, BoxError>("boom".into()) });
        let err = stream.next().await.unwrap().unwrap_err();
        assert_eq!(err.to_string(), "boom");
        assert!(stream.next().await.is_none());
    }

    #[test]
    fn keyed_provider_without_key_is_rejected() {
        let config = LlmConfig { llm_type: LlmType::OpenAI, ..LlmConfig::default() };
        let err = new_client(&config).err().unwrap();
        assert_eq!(err.to_string(), "openai API key is required");
    }

    #[test]
    fn ollama_needs_no_key() {
        let config = LlmConfig { llm_type: LlmType::Ollama, ..LlmConfig::default() };
        let client = new_client(&config).unwrap();
        assert!(client.supports_native_streaming());
    }
}
