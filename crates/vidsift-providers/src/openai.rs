use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::ProviderError;
use crate::stream::{parse_sse_line, SseParsed, StreamEvent};

/// Chat model used for answering and summarisation.
pub const CHAT_MODEL: &str = "gpt-4o-mini";
/// Sampling temperature for grounded answers.
const TEMPERATURE: f64 = 0.3;
/// Output token budget per completion.
const MAX_OUTPUT_TOKENS: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One turn of conversation history sent to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

/// Streaming chat-completions client.
pub struct LlmClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl LlmClient {
    pub fn new(api_key: String, base_url: String) -> Self {
        Self {
            client: crate::streaming_http_client(),
            api_key,
            base_url,
        }
    }

    /// Send a non-streaming completion and wait for the full response.
    pub async fn complete(
        &self,
        system: &str,
        messages: &[ChatTurn],
    ) -> Result<String, ProviderError> {
        let body = build_request_body(system, messages, false);
        let url = format!("{}/v1/chat/completions", self.base_url);

        debug!(model = CHAT_MODEL, "sending completion request");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        if let Some(err) = error_for_status(&resp) {
            let _ = resp.text().await;
            return Err(err);
        }

        let api_resp: ApiResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        Ok(api_resp
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }

    /// Stream a completion, forwarding deltas through `tx`. Dropping the
    /// receiver stops consumption and closes the upstream connection.
    pub async fn stream(
        &self,
        system: &str,
        messages: &[ChatTurn],
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), ProviderError> {
        let body = build_request_body(system, messages, true);
        let url = format!("{}/v1/chat/completions", self.base_url);

        debug!(model = CHAT_MODEL, "sending streaming completion request");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        if let Some(err) = error_for_status(&resp) {
            let text = resp.text().await.unwrap_or_default();
            warn!(body = %text, "streaming completion refused");
            return Err(err);
        }

        process_stream(resp, tx).await;
        Ok(())
    }
}

fn error_for_status(resp: &reqwest::Response) -> Option<ProviderError> {
    let status = resp.status().as_u16();
    if status == 429 {
        let retry = resp
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(|s| s * 1000)
            .unwrap_or(5000);
        return Some(ProviderError::RateLimited {
            retry_after_ms: retry,
        });
    }
    if !resp.status().is_success() {
        return Some(ProviderError::Api {
            status,
            message: format!("chat completion failed with status {status}"),
        });
    }
    None
}

fn build_request_body(system: &str, messages: &[ChatTurn], stream: bool) -> serde_json::Value {
    let mut msgs = vec![serde_json::json!({
        "role": "system",
        "content": system,
    })];
    for m in messages {
        msgs.push(serde_json::json!({
            "role": m.role,
            "content": m.content,
        }));
    }
    serde_json::json!({
        "model": CHAT_MODEL,
        "messages": msgs,
        "temperature": TEMPERATURE,
        "max_tokens": MAX_OUTPUT_TOKENS,
        "stream": stream,
    })
}

/// Parse the streaming SSE response and emit StreamEvents. Each data line
/// carries a JSON delta object; `data: [DONE]` signals end of stream.
async fn process_stream(resp: reqwest::Response, tx: mpsc::Sender<StreamEvent>) {
    use futures_util::StreamExt;

    let mut line_buf = String::new();
    let mut byte_stream = resp.bytes_stream();

    while let Some(chunk) = byte_stream.next().await {
        let chunk = match chunk {
            Ok(c) => c,
            Err(e) => {
                let _ = tx
                    .send(StreamEvent::Error {
                        message: e.to_string(),
                    })
                    .await;
                return;
            }
        };

        let text = match std::str::from_utf8(&chunk) {
            Ok(t) => t,
            Err(_) => continue,
        };

        line_buf.push_str(text);
        let lines: Vec<&str> = line_buf.split('\n').collect();
        let (complete, remainder) = lines.split_at(lines.len() - 1);
        let remainder = remainder.first().unwrap_or(&"").to_string();

        for line in complete {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(SseParsed::Data(data)) = parse_sse_line(line) {
                if data.trim() == "[DONE]" {
                    break;
                }

                if let Ok(chunk_resp) = serde_json::from_str::<StreamChunk>(&data) {
                    for choice in &chunk_resp.choices {
                        if let Some(content) = &choice.delta.content {
                            if !content.is_empty()
                                && tx
                                    .send(StreamEvent::TextDelta {
                                        text: content.clone(),
                                    })
                                    .await
                                    .is_err()
                            {
                                // Receiver dropped — the caller cancelled.
                                return;
                            }
                        }
                    }
                }
            }
        }

        line_buf = remainder;
    }

    let _ = tx.send(StreamEvent::Done).await;
}

#[derive(Deserialize)]
struct ApiResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ApiMessage,
}

#[derive(Deserialize)]
struct ApiMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_carries_model_and_sampling() {
        let body = build_request_body(
            "be helpful",
            &[ChatTurn {
                role: Role::User,
                content: "hi".to_string(),
            }],
            true,
        );
        assert_eq!(body["model"], CHAT_MODEL);
        assert_eq!(body["temperature"], 0.3);
        assert_eq!(body["max_tokens"], 1000);
        assert_eq!(body["stream"], true);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "user");
    }

    #[test]
    fn stream_chunk_delta_parses() {
        let data = r#"{"choices":[{"delta":{"content":"Hel"}}]}"#;
        let chunk: StreamChunk = serde_json::from_str(data).expect("parse");
        assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("Hel"));
    }
}
