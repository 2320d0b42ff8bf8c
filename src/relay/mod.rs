//! Forwards a conversation to the configured provider and pumps the reply
//! back out as response frames.

use crate::codec::{ FinishReason, StreamPart, StreamProtocol };
use crate::config::prompt::with_system_prompt;
use crate::llm::chat::{ BoxError, ChatClient, TokenStream };
use crate::models::chat::Message;
use futures::StreamExt;
use log::{ info, warn };
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{ timeout_at, Instant };
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

pub const DEFAULT_MAX_DURATION: Duration = Duration::from_secs(60);

pub type BodyStream = ReceiverStream<Result<String, Infallible>>;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("upstream request failed: {0}")]
    Upstream(BoxError),
    #[error("maximum response duration of {}s exceeded", .0.as_secs())]
    DeadlineExceeded(Duration),
}

#[derive(Clone)]
pub struct Relay {
    client: Arc<dyn ChatClient>,
    system_prompt: Arc<str>,
    max_duration: Duration,
}

impl Relay {
    pub fn new(client: Arc<dyn ChatClient>, system_prompt: Arc<str>, max_duration: Duration) -> Self {
        Self { client, system_prompt, max_duration }
    }

    pub fn model(&self) -> String {
        self.client.get_model()
    }

    /// Injects the system prompt, opens the provider stream and waits for the
    /// first token, so a provider that fails outright can still be answered
    /// with an error status instead of a broken stream.
    pub async fn start(&self, messages: Vec<Message>) -> Result<PendingReply, RelayError> {
        let deadline = Instant::now() + self.max_duration;
        let messages = with_system_prompt(messages, &self.system_prompt);
        info!("Relaying {} messages to model {}", messages.len(), self.client.get_model());

        let mut tokens = timeout_at(deadline, self.client.stream_chat(&messages)).await
            .map_err(|_| RelayError::DeadlineExceeded(self.max_duration))?
            .map_err(RelayError::Upstream)?;

        let first = match timeout_at(deadline, tokens.next()).await {
            Ok(Some(Ok(token))) => Some(token),
            Ok(Some(Err(e))) => {
                return Err(RelayError::Upstream(e));
            }
            Ok(None) => None,
            Err(_) => {
                return Err(RelayError::DeadlineExceeded(self.max_duration));
            }
        };

        Ok(PendingReply {
            first,
            rest: tokens,
            deadline,
            max_duration: self.max_duration,
        })
    }
}

/// A provider stream that has produced its first item (or ended cleanly).
pub struct PendingReply {
    first: Option<String>,
    rest: TokenStream,
    deadline: Instant,
    max_duration: Duration,
}

fn frame(protocol: StreamProtocol, part: StreamPart) -> Option<String> {
    match (protocol, part) {
        (StreamProtocol::Data, part) => Some(part.encode()),
        (StreamProtocol::Text, StreamPart::Text(token)) => Some(token),
        (StreamProtocol::Text, _) => None,
    }
}

async fn emit(
    tx: &mpsc::Sender<Result<String, Infallible>>,
    protocol: StreamProtocol,
    part: StreamPart
) -> bool {
    match frame(protocol, part) {
        Some(chunk) => tx.send(Ok(chunk)).await.is_ok(),
        None => true,
    }
}

impl PendingReply {
    /// Spawns the pump that turns tokens into response frames. Tokens are
    /// forwarded as they arrive; the pump stops when the provider finishes,
    /// fails, runs past the deadline or the client goes away.
    pub fn into_body(self, protocol: StreamProtocol) -> BodyStream {
        let (tx, rx) = mpsc::channel(32);
        let PendingReply { first, mut rest, deadline, max_duration } = self;

        tokio::spawn(async move {
            let message_id = format!("msg-{}", Uuid::new_v4().simple());
            let started = std::time::Instant::now();
            let mut count = 0usize;

            if !emit(&tx, protocol, StreamPart::StartStep { message_id }).await {
                return;
            }
            if let Some(token) = first {
                count += 1;
                if !emit(&tx, protocol, StreamPart::Text(token)).await {
                    return;
                }
            }

            let failure = loop {
                match timeout_at(deadline, rest.next()).await {
                    Ok(Some(Ok(token))) => {
                        count += 1;
                        if !emit(&tx, protocol, StreamPart::Text(token)).await {
                            info!("Client disconnected after {} tokens", count);
                            return;
                        }
                    }
                    Ok(Some(Err(e))) => {
                        break Some(RelayError::Upstream(e));
                    }
                    Ok(None) => {
                        break None;
                    }
                    Err(_) => {
                        break Some(RelayError::DeadlineExceeded(max_duration));
                    }
                }
            };

            let finish_reason = match failure {
                None => {
                    info!("Reply finished: {} tokens in {:?}", count, started.elapsed());
                    FinishReason::Stop
                }
                Some(err) => {
                    warn!("Reply aborted after {} tokens: {}", count, err);
                    if !emit(&tx, protocol, StreamPart::Error(err.to_string())).await {
                        return;
                    }
                    FinishReason::Error
                }
            };

            let _ = emit(&tx, protocol, StreamPart::FinishStep {
                finish_reason,
                is_continued: false,
            }).await &&
                emit(&tx, protocol, StreamPart::FinishMessage { finish_reason }).await;
        });

        ReceiverStream::new(rx)
    }
}
