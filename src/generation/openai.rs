//! Streaming backend for OpenAI-compatible chat completions.
//!
//! Sends the history with a system instruction carrying the context and
//! `stream: true`, then decodes the server-sent-events body into plain text
//! fragments.
//!
//! # Wire format
//!
//! ```text
//! data: {"choices":[{"delta":{"content":"Hel"}}]}
//!
//! data: {"choices":[{"delta":{"content":"lo"}}]}
//!
//! data: [DONE]
//! ```
//!
//! Events are framed by `eventsource-stream`. Events without text and
//! events whose data fails to parse are dropped. Any request or transport failure is
//! logged and replaced by the apology fragments.

use anyhow::Result;
use async_trait::async_trait;
use eventsource_stream::{EventStreamError, Eventsource};
use futures::StreamExt;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error};

use super::{apologize, system_prompt, FragmentSink, GenerationError, GenerationGateway};
use crate::config::GenerationConfig;
use crate::models::{Message, Role};

/// Data of the event that ends a completion stream.
const DONE: &str = "[DONE]";

pub struct OpenAIGateway {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    temperature: f64,
    max_tokens: u32,
}

impl OpenAIGateway {
    /// Creates the backend from configuration.
    ///
    /// # Errors
    ///
    /// Fails if the API key environment variable is unset or the HTTP client
    /// cannot be built.
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = config.api_key().ok_or_else(|| {
            anyhow::anyhow!("{} environment variable not set", config.api_key_env)
        })?;

        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        Ok(Self {
            client: builder.build()?,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    async fn stream_completion(
        &self,
        messages: &[Message],
        context: &str,
        sink: &FragmentSink,
    ) -> Result<(), GenerationError> {
        let system = system_prompt(context);
        let body = build_request(
            &self.model,
            &system,
            messages,
            self.temperature,
            self.max_tokens,
        );

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let mut events = response.bytes_stream().eventsource();
        while let Some(event) = events.next().await {
            let event = event.map_err(|e| match e {
                EventStreamError::Transport(e) => GenerationError::Request(e),
                other => GenerationError::Backend(other.to_string()),
            })?;
            if event.data == DONE {
                break;
            }
            let Some(text) = delta_text(&event.data) else {
                continue;
            };
            if !sink.send(text).await {
                debug!("Fragment consumer closed, abandoning upstream stream");
                return Ok(());
            }
        }
        Ok(())
    }
}

fn build_request<'a>(
    model: &'a str,
    system: &'a str,
    messages: &'a [Message],
    temperature: f64,
    max_tokens: u32,
) -> ChatRequest<'a> {
    let mut chat = Vec::with_capacity(messages.len() + 1);
    chat.push(ChatMessage {
        role: "system",
        content: system,
    });
    chat.extend(messages.iter().map(|m| ChatMessage {
        role: match m.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        },
        content: &m.content,
    }));

    ChatRequest {
        model,
        messages: chat,
        stream: true,
        temperature,
        max_tokens,
    }
}

#[async_trait]
impl GenerationGateway for OpenAIGateway {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(
        &self,
        messages: &[Message],
        context: &str,
        sink: FragmentSink,
    ) -> Result<(), GenerationError> {
        if let Err(e) = self.stream_completion(messages, context, &sink).await {
            error!(model = %self.model, error = %e, "LLM streaming error");
            apologize(&sink).await;
        }
        Ok(())
    }
}

/// Extracts the text delta from one event's data, dropping records that
/// carry none or fail to parse.
fn delta_text(data: &str) -> Option<String> {
    match serde_json::from_str::<serde_json::Value>(data) {
        Ok(json) => json
            .pointer("/choices/0/delta/content")
            .and_then(|c| c.as_str())
            .filter(|c| !c.is_empty())
            .map(str::to_string),
        Err(e) => {
            debug!(error = %e, "Dropping malformed stream record");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(content: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({ "choices": [{ "delta": { "content": content } }] })
        )
    }

    /// Frames `chunks` with the event-source decoder and collects the deltas.
    async fn decode(chunks: Vec<String>) -> Vec<String> {
        let events: Vec<_> = futures::stream::iter(
            chunks
                .into_iter()
                .map(|c| Ok::<_, std::convert::Infallible>(c.into_bytes())),
        )
        .eventsource()
        .collect()
        .await;

        events
            .into_iter()
            .map(|e| e.unwrap().data)
            .take_while(|data| data != DONE)
            .filter_map(|data| delta_text(&data))
            .collect()
    }

    #[test]
    fn test_delta_text() {
        assert_eq!(
            delta_text(r#"{"choices":[{"delta":{"content":"Hel"}}]}"#),
            Some("Hel".to_string())
        );
        assert_eq!(delta_text(r#"{"choices":[{"delta":{}}]}"#), None);
        assert_eq!(delta_text(r#"{"choices":[{"delta":{"content":""}}]}"#), None);
        assert_eq!(delta_text("{not json"), None);
    }

    #[tokio::test]
    async fn test_decodes_deltas_in_order() {
        let body = format!("{}{}data: [DONE]\n\n{}", record("Hel"), record("lo"), record("late"));
        assert_eq!(decode(vec![body]).await, vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn test_record_split_across_chunks() {
        let body = record("split here");
        let (head, tail) = body.split_at(12);
        assert_eq!(
            decode(vec![head.to_string(), tail.to_string()]).await,
            vec!["split here"]
        );
    }

    #[tokio::test]
    async fn test_malformed_and_empty_records_are_dropped() {
        let body = format!(
            ": keep-alive\n\ndata: {{not json\n\n{}data: {{\"choices\":[{{\"delta\":{{}}}}]}}\n\n{}",
            record(""),
            record("ok")
        );
        assert_eq!(decode(vec![body]).await, vec!["ok"]);
    }

    #[tokio::test]
    async fn test_crlf_lines() {
        let body = record("x").replace('\n', "\r\n");
        assert_eq!(decode(vec![body]).await, vec!["x"]);
    }

    #[test]
    fn test_request_puts_system_first() {
        let messages = vec![
            Message::user("hi"),
            Message::assistant("hello"),
            Message::user("refund?"),
        ];
        let request = build_request("gpt-3.5-turbo", "SYS", &messages, 0.7, 500);
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["stream"], true);
        assert_eq!(json["max_tokens"], 500);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][0]["content"], "SYS");
        assert_eq!(json["messages"][2]["role"], "assistant");
        assert_eq!(json["messages"][3]["content"], "refund?");
    }
}
