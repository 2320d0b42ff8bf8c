//! Line-framed token stream spoken between the relay and its clients.
//!
//! Each frame is `<code>:<json>\n`. The codes match the AI SDK data stream
//! protocol so browser clients built on `useChat` can consume the relay
//! directly.

use serde::{ Deserialize, Serialize };
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const DATA_STREAM_HEADER: &str = "x-vercel-ai-data-stream";
pub const DATA_STREAM_VERSION: &str = "v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamProtocol {
    /// Framed parts (`0:"token"`, `3:"error"`, ...).
    #[default]
    Data,
    /// Raw token text, nothing else.
    Text,
}

impl StreamProtocol {
    /// Both wire formats go out as plain text; the data stream is told apart
    /// by its version header.
    pub const CONTENT_TYPE: &'static str = "text/plain; charset=utf-8";

    pub fn as_str(&self) -> &'static str {
        match self {
            StreamProtocol::Data => "data",
            StreamProtocol::Text => "text",
        }
    }

    /// Whether a failed or cut-off reply is marked on the wire. Raw text
    /// just ends, so a truncated reply looks complete.
    pub fn signals_failures(&self) -> bool {
        matches!(self, StreamProtocol::Data)
    }
}

impl fmt::Display for StreamProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid stream protocol '{0}' (expected 'data' or 'text')")]
pub struct ParseProtocolError(String);

impl FromStr for StreamProtocol {
    type Err = ParseProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "data" => Ok(StreamProtocol::Data),
            "text" => Ok(StreamProtocol::Text),
            _ => Err(ParseProtocolError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinishReason {
    Stop,
    Error,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartStepPayload {
    message_id: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FinishStepPayload {
    finish_reason: FinishReason,
    #[serde(default)]
    is_continued: bool,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FinishMessagePayload {
    finish_reason: FinishReason,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamPart {
    StartStep {
        message_id: String,
    },
    Text(String),
    Error(String),
    FinishStep {
        finish_reason: FinishReason,
        is_continued: bool,
    },
    FinishMessage {
        finish_reason: FinishReason,
    },
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("frame without type prefix: {0}")]
    MissingPrefix(String),
    #[error("invalid payload for frame '{code}': {source}")]
    Payload {
        code: String,
        #[source]
        source: serde_json::Error,
    },
}

impl StreamPart {
    fn code(&self) -> &'static str {
        match self {
            StreamPart::Text(_) => "0",
            StreamPart::Error(_) => "3",
            StreamPart::FinishStep { .. } => "e",
            StreamPart::StartStep { .. } => "f",
            StreamPart::FinishMessage { .. } => "d",
        }
    }

    fn payload(&self) -> Value {
        let value = match self {
            StreamPart::Text(text) | StreamPart::Error(text) => {
                return Value::String(text.clone());
            }
            StreamPart::StartStep { message_id } =>
                serde_json::to_value(StartStepPayload { message_id: message_id.clone() }),
            StreamPart::FinishStep { finish_reason, is_continued } =>
                serde_json::to_value(FinishStepPayload {
                    finish_reason: *finish_reason,
                    is_continued: *is_continued,
                }),
            StreamPart::FinishMessage { finish_reason } =>
                serde_json::to_value(FinishMessagePayload { finish_reason: *finish_reason }),
        };
        value.unwrap_or(Value::Null)
    }

    /// One newline-terminated frame.
    pub fn encode(&self) -> String {
        format!("{}:{}\n", self.code(), self.payload())
    }

    /// Parses a single frame (without its trailing newline). Blank lines and
    /// frame codes this crate does not produce yield `Ok(None)`.
    pub fn decode(line: &str) -> Result<Option<StreamPart>, DecodeError> {
        let line = line.trim_end();
        if line.is_empty() {
            return Ok(None);
        }
        let (code, payload) = line
            .split_once(':')
            .ok_or_else(|| DecodeError::MissingPrefix(line.to_string()))?;

        let payload_err = |source| DecodeError::Payload { code: code.to_string(), source };

        let part = match code {
            "0" => StreamPart::Text(serde_json::from_str(payload).map_err(payload_err)?),
            "3" => StreamPart::Error(serde_json::from_str(payload).map_err(payload_err)?),
            "f" => {
                let p: StartStepPayload = serde_json::from_str(payload).map_err(payload_err)?;
                StreamPart::StartStep { message_id: p.message_id }
            }
            "e" => {
                let p: FinishStepPayload = serde_json::from_str(payload).map_err(payload_err)?;
                StreamPart::FinishStep {
                    finish_reason: p.finish_reason,
                    is_continued: p.is_continued,
                }
            }
            "d" => {
                let p: FinishMessagePayload = serde_json::from_str(payload).map_err(payload_err)?;
                StreamPart::FinishMessage { finish_reason: p.finish_reason }
            }
            _ => {
                return Ok(None);
            }
        };
        Ok(Some(part))
    }
}
