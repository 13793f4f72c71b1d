/// Streaming chat completions
///
/// [`ChatUpstream`] turns a conversation into a stream of text deltas.
/// [`OpenAiChat`] implements it against the OpenAI chat completions API with
/// `stream: true`, decoding the upstream Server-Sent Events body with
/// [`SseLineDecoder`].
///
/// Dropping the returned stream drops the HTTP response body, which closes
/// the upstream connection.

use crate::config::OpenAiConfig;
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default OpenAI API origin
pub const OPENAI_API_URL: &str = "https://api.openai.com";

/// Marker that ends an OpenAI event stream
const DONE_MARKER: &str = "[DONE]";

/// Chat upstream failure
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Chat request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Chat upstream returned status {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Malformed chat chunk: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Stream of incremental text deltas
pub type DeltaStream = BoxStream<'static, Result<String, ChatError>>;

/// One conversation turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Source of streamed chat completions
#[async_trait]
pub trait ChatUpstream: Send + Sync {
    /// Starts a completion
    ///
    /// # Errors
    ///
    /// Fails if the request cannot be started; failures after the first
    /// byte arrive as `Err` items on the stream
    async fn stream(&self, messages: Vec<ChatMessage>) -> Result<DeltaStream, ChatError>;
}

/// Incremental decoder for a `text/event-stream` body
///
/// Accepts arbitrary byte chunks and returns the `data:` payloads of every
/// complete line. Handles lines split across chunks and `\r\n` endings,
/// skips blank lines, comments and other fields, and stops at
/// `data: [DONE]`.
#[derive(Debug, Default)]
pub struct SseLineDecoder {
    pending: Vec<u8>,
    done: bool,
}

impl SseLineDecoder {
    /// Feeds one chunk and returns the data payloads it completed
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut payloads = Vec::new();
        if self.done {
            return payloads;
        }

        self.pending.extend_from_slice(chunk);

        while let Some(newline) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);

            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.strip_prefix(' ').unwrap_or(data);

            if data == DONE_MARKER {
                self.done = true;
                self.pending.clear();
                break;
            }
            payloads.push(data.to_string());
        }

        payloads
    }

    /// Whether the end marker has been seen
    pub fn is_done(&self) -> bool {
        self.done
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

/// Extracts the text delta from one upstream chunk, if any
fn chunk_content(data: &str) -> Result<Option<String>, serde_json::Error> {
    let chunk: CompletionChunk = serde_json::from_str(data)?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|content| !content.is_empty()))
}

/// OpenAI chat completions client
#[derive(Clone)]
pub struct OpenAiChat {
    client: reqwest::Client,
    base_url: String,
    config: OpenAiConfig,
}

impl OpenAiChat {
    pub fn new(client: reqwest::Client, config: OpenAiConfig) -> Self {
        Self {
            client,
            base_url: OPENAI_API_URL.to_string(),
            config,
        }
    }
}

#[async_trait]
impl ChatUpstream for OpenAiChat {
    async fn stream(&self, messages: Vec<ChatMessage>) -> Result<DeltaStream, ChatError> {
        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&CompletionRequest {
                model: &self.config.model,
                messages: &messages,
                stream: true,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let mut body = response.bytes_stream();
        let deltas = async_stream::stream! {
            let mut decoder = SseLineDecoder::default();

            while let Some(chunk) = body.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield Err(ChatError::Http(e));
                        return;
                    }
                };

                for data in decoder.push(&chunk) {
                    match chunk_content(&data) {
                        Ok(Some(content)) => yield Ok(content),
                        Ok(None) => {}
                        Err(e) => {
                            yield Err(ChatError::Decode(e));
                            return;
                        }
                    }
                }

                if decoder.is_done() {
                    break;
                }
            }
        };

        Ok(deltas.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoder_handles_split_lines() {
        let mut decoder = SseLineDecoder::default();

        assert!(decoder.push(b"data: {\"a\"").is_empty());
        assert_eq!(decoder.push(b":1}\n\n"), vec![r#"{"a":1}"#.to_string()]);
    }

    #[test]
    fn test_decoder_handles_crlf_comments_and_other_fields() {
        let mut decoder = SseLineDecoder::default();
        let payloads = decoder.push(b": keep-alive\r\nevent: message\r\ndata: one\r\n\r\ndata:two\r\n");
        assert_eq!(payloads, vec!["one".to_string(), "two".to_string()]);
    }

    #[test]
    fn test_decoder_stops_at_done() {
        let mut decoder = SseLineDecoder::default();
        let payloads = decoder.push(b"data: first\ndata: [DONE]\ndata: after\n");
        assert_eq!(payloads, vec!["first".to_string()]);
        assert!(decoder.is_done());
        assert!(decoder.push(b"data: more\n").is_empty());
    }

    #[test]
    fn test_decoder_keeps_multibyte_text_split_across_chunks() {
        let mut decoder = SseLineDecoder::default();
        let line = "data: 台灣\n".as_bytes();
        let (head, tail) = line.split_at(8);

        assert!(decoder.push(head).is_empty());
        assert_eq!(decoder.push(tail), vec!["台灣".to_string()]);
    }

    #[test]
    fn test_chunk_content() {
        let data = r#"{"choices":[{"delta":{"content":"Hi"},"finish_reason":null}]}"#;
        assert_eq!(chunk_content(data).unwrap().as_deref(), Some("Hi"));

        let role_only = r#"{"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert_eq!(chunk_content(role_only).unwrap(), None);

        let finished = r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#;
        assert_eq!(chunk_content(finished).unwrap(), None);

        assert!(chunk_content("not json").is_err());
    }
}
