use crate::codec::{ LineBuffer, StreamPart, StreamProtocol, TextDecoder };
use crate::llm::chat::{ create_streaming_response, BoxError, TokenStream };
use crate::models::chat::ChatRequest;
use crate::server::api::{ ErrorBody, CHAT_PATH };
use futures::StreamExt;
use reqwest::Client as HttpClient;
use thiserror::Error;
use tokio::sync::mpsc;
use url::Url;

#[derive(Debug, Error)]
pub enum RelayClientError {
    #[error("invalid relay url '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("relay answered {status}: {message}")]
    Status {
        status: reqwest::StatusCode,
        message: String,
    },
    #[error("{0}")]
    Stream(String),
}

type TokenSender = mpsc::Sender<Result<String, BoxError>>;

/// Talks to the relay's chat endpoint and turns its streamed body back into tokens.
#[derive(Debug, Clone)]
pub struct RelayClient {
    http: HttpClient,
    endpoint: Url,
    protocol: StreamProtocol,
}

impl RelayClient {
    pub fn new(base_url: &str, protocol: StreamProtocol) -> Result<Self, RelayClientError> {
        let invalid = |source| RelayClientError::InvalidUrl { url: base_url.to_string(), source };
        let base = Url::parse(base_url).map_err(invalid)?;
        let mut endpoint = base.join(CHAT_PATH.trim_start_matches('/')).map_err(invalid)?;
        endpoint.query_pairs_mut().append_pair("protocol", protocol.as_str());

        Ok(Self {
            http: HttpClient::new(),
            endpoint,
            protocol,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub async fn send(&self, request: &ChatRequest) -> Result<TokenStream, BoxError> {
        let resp = self.http.post(self.endpoint.clone()).json(request).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let message = serde_json
                ::from_str::<ErrorBody>(&text)
                .map(|body| body.error)
                .unwrap_or(text);
            return Err(Box::new(RelayClientError::Status { status, message }));
        }

        let protocol = self.protocol;
        Ok(
            create_streaming_response(move |tx| async move {
                let bytes = resp.bytes_stream();
                match protocol {
                    StreamProtocol::Data => pump_data_stream(bytes, tx).await,
                    StreamProtocol::Text => pump_text_stream(bytes, tx).await,
                }
            })
        )
    }
}

/// Returns false when the stream is over, either finished or failed.
async fn forward_part(tx: &TokenSender, part: Result<Option<StreamPart>, BoxError>) -> bool {
    match part {
        Ok(Some(StreamPart::Text(token))) => tx.send(Ok(token)).await.is_ok(),
        Ok(Some(StreamPart::Error(message))) => {
            let _ = tx.send(Err(Box::new(RelayClientError::Stream(message)) as _)).await;
            false
        }
        Ok(Some(StreamPart::FinishMessage { .. })) => false,
        Ok(_) => true,
        Err(e) => {
            let _ = tx.send(Err(e)).await;
            false
        }
    }
}

async fn pump_data_stream<S, B>(bytes: S, tx: TokenSender)
    where S: futures::Stream<Item = Result<B, reqwest::Error>>, B: AsRef<[u8]>
{
    let mut bytes = std::pin::pin!(bytes);
    let mut lines = LineBuffer::new();
    while let Some(chunk) = bytes.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                let _ = tx.send(Err(Box::new(e) as _)).await;
                return;
            }
        };
        for line in lines.push(chunk.as_ref()) {
            let part = StreamPart::decode(&line).map_err(|e| Box::new(e) as BoxError);
            if !forward_part(&tx, part).await {
                return;
            }
        }
    }
    if let Some(rest) = lines.finish() {
        let part = StreamPart::decode(&rest).map_err(|e| Box::new(e) as BoxError);
        forward_part(&tx, part).await;
    }
}

async fn pump_text_stream<S, B>(bytes: S, tx: TokenSender)
    where S: futures::Stream<Item = Result<B, reqwest::Error>>, B: AsRef<[u8]>
{
    let mut bytes = std::pin::pin!(bytes);
    let mut decoder = TextDecoder::new();
    while let Some(chunk) = bytes.next().await {
        let text = match chunk {
            Ok(chunk) => decoder.push(chunk.as_ref()),
            Err(e) => {
                let _ = tx.send(Err(Box::new(e) as _)).await;
                return;
            }
        };
        if !text.is_empty() && tx.send(Ok(text)).await.is_err() {
            return;
        }
    }
    if let Some(rest) = decoder.finish() {
        let _ = tx.send(Ok(rest)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use pretty_assertions::assert_eq;

    fn chunks(parts: &[&'static str]) -> impl futures::Stream<Item = Result<&'static [u8], reqwest::Error>> + Unpin {
        stream::iter(parts.iter().map(|p| Ok(p.as_bytes())).collect::<Vec<_>>())
    }

    async fn drain(mut rx: mpsc::Receiver<Result<String, BoxError>>) -> Vec<Result<String, String>> {
        let mut out = Vec::new();
        while let Some(item) = rx.recv().await {
            out.push(item.map_err(|e| e.to_string()));
        }
        out
    }

    #[test]
    fn endpoint_carries_path_and_protocol() {
        let client = RelayClient::new("http://127.0.0.1:3000", StreamProtocol::Text).unwrap();
        assert_eq!(client.endpoint().as_str(), "http://127.0.0.1:3000/api/chat?protocol=text");

        let client = RelayClient::new("https://amc.example/assist/", StreamProtocol::Data).unwrap();
        assert_eq!(client.endpoint().as_str(), "https://amc.example/assist/api/chat?protocol=data");
    }

    #[test]
    fn rejects_unparseable_url() {
        let err = RelayClient::new("not a url", StreamProtocol::Data).unwrap_err();
        assert!(matches!(err, RelayClientError::InvalidUrl { .. }));
    }

    #[tokio::test]
    async fn data_frames_split_across_chunks_become_tokens() {
        let (tx, rx) = mpsc::channel(32);
        let body = chunks(&["f:{\"messageId\":\"m\"}\n0:\"Hel", "lo\"\n0:\" AMC\"\ne:{\"finishReason\":\"stop\"}\n", "d:{\"finishReason\":\"stop\"}\n"]);
        pump_data_stream(body, tx).await;
        assert_eq!(drain(rx).await, vec![Ok("Hello".to_string()), Ok(" AMC".to_string())]);
    }

    #[tokio::test]
    async fn error_frame_fails_the_stream() {
        let (tx, rx) = mpsc::channel(32);
        let body = chunks(&["0:\"Part\"\n3:\"upstream request failed: reset\"\n0:\"never\"\n"]);
        pump_data_stream(body, tx).await;
        assert_eq!(
            drain(rx).await,
            vec![Ok("Part".to_string()), Err("upstream request failed: reset".to_string())]
        );
    }

    #[tokio::test]
    async fn text_protocol_passes_bytes_through() {
        let (tx, rx) = mpsc::channel(32);
        let body = chunks(&["Hello", ", ", "world"]);
        pump_text_stream(body, tx).await;
        let joined: String = drain(rx).await.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(joined, "Hello, world");
    }
}
