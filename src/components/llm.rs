//! LLM capability and the OpenAI-compatible streaming client
//!
//! The dialog engine consumes replies as a lazy stream. Plain chat yields
//! string chunks; function-calling chat yields [`LlmEvent`]s so tool-call
//! deltas and content are distinguishable at the boundary regardless of how
//! the provider frames them.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use futures::channel::mpsc;
use futures::stream::BoxStream;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};

use crate::config::ModuleConfig;
use crate::session::dialogue::Message;
use crate::tools::FunctionSchema;

/// One unit of a function-calling response stream
#[derive(Debug, Clone)]
pub enum LlmEvent {
    /// Plain content text
    Content(String),
    /// A fragment of the first tool call: any field may be absent in a
    /// given delta, arguments accumulate across deltas
    ToolCallDelta {
        id: Option<String>,
        name: Option<String>,
        arguments: Option<String>,
    },
}

pub type ChunkStream = BoxStream<'static, Result<String>>;
pub type EventStream = BoxStream<'static, Result<LlmEvent>>;

/// Large-language-model capability
#[async_trait]
pub trait Llm: Send + Sync {
    /// Stream a plain chat completion as content chunks
    async fn response(&self, session_id: &str, dialogue: Vec<Message>) -> Result<ChunkStream>;

    /// Stream a completion that may call the given functions
    async fn response_with_functions(
        &self,
        session_id: &str,
        dialogue: Vec<Message>,
        functions: Vec<FunctionSchema>,
    ) -> Result<EventStream>;
}

/// Shared handle to a swappable LLM
pub type LlmHandle = Arc<dyn Llm>;

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [FunctionSchema]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<DeltaToolCall>>,
}

#[derive(Debug, Deserialize)]
struct DeltaToolCall {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<DeltaFunction>,
}

#[derive(Debug, Deserialize)]
struct DeltaFunction {
    #[serde(default)]
    name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_arguments")]
    arguments: Option<String>,
}

/// Arguments may arrive as a JSON string or a raw object depending on the
/// model; normalize to a string.
fn deserialize_arguments<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

/// Parse one SSE `data:` payload into events.
///
/// Tool-call deltas are emitted before content from the same payload so the
/// speak gate closes before that content is seen.
fn delta_events(data: &str) -> Vec<LlmEvent> {
    let mut events = Vec::new();
    let Ok(parsed) = serde_json::from_str::<StreamResponse>(data) else {
        return events;
    };
    let Some(choice) = parsed.choices.into_iter().next() else {
        return events;
    };
    if let Some(calls) = choice.delta.tool_calls {
        if let Some(first) = calls.into_iter().next() {
            let (name, arguments) = match first.function {
                Some(f) => (f.name, f.arguments),
                None => (None, None),
            };
            events.push(LlmEvent::ToolCallDelta {
                id: first.id,
                name,
                arguments,
            });
        }
    }
    if let Some(content) = choice.delta.content {
        if !content.is_empty() {
            events.push(LlmEvent::Content(content));
        }
    }
    events
}

/// Chat client for any OpenAI-compatible `/chat/completions` endpoint
pub struct OpenAiLlm {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiLlm {
    pub fn new(base_url: &str, api_key: Option<String>, model: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
        }
    }

    /// Build from a named module block (`url`, `api_key`, `model_name`)
    pub fn from_module_config(name: &str, cfg: &ModuleConfig) -> Result<Self> {
        let base_url = cfg
            .str_option("url")
            .or_else(|| cfg.str_option("base_url"))
            .with_context(|| format!("LLM module '{name}' is missing 'url'"))?;
        let api_key = cfg.str_option("api_key").map(|s| s.to_string());
        let model = cfg
            .str_option("model_name")
            .or_else(|| cfg.str_option("model"))
            .with_context(|| format!("LLM module '{name}' is missing 'model_name'"))?;
        Ok(Self::new(base_url, api_key, model))
    }

    async fn stream_events(
        &self,
        dialogue: Vec<Message>,
        functions: Option<Vec<FunctionSchema>>,
    ) -> Result<EventStream> {
        let request = ChatRequest {
            model: &self.model,
            messages: &dialogue,
            stream: true,
            tools: functions.as_deref(),
            tool_choice: functions.as_ref().map(|_| "auto"),
        };

        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder
            .send()
            .await
            .context("Failed to send streaming request to LLM provider")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("LLM streaming API error ({status}): {body}");
        }

        let (tx, rx) = mpsc::unbounded();
        tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            let mut buffer = String::new();
            while let Some(chunk) = stream.next().await {
                let chunk = match chunk {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let _ = tx.unbounded_send(Err(
                            anyhow::Error::new(e).context("Failed to read stream chunk")
                        ));
                        return;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(pos) = buffer.find("\n\n") {
                    let event_str = buffer[..pos].to_string();
                    buffer = buffer[pos + 2..].to_string();
                    for line in event_str.lines() {
                        let Some(data) = line.strip_prefix("data: ") else {
                            continue;
                        };
                        if data == "[DONE]" {
                            continue;
                        }
                        for event in delta_events(data) {
                            if tx.unbounded_send(Ok(event)).is_err() {
                                return;
                            }
                        }
                    }
                }
            }
        });

        Ok(rx.boxed())
    }
}

#[async_trait]
impl Llm for OpenAiLlm {
    async fn response(&self, session_id: &str, dialogue: Vec<Message>) -> Result<ChunkStream> {
        debug!(
            "LLM request for session {}: {} messages",
            session_id,
            dialogue.len()
        );
        let events = self.stream_events(dialogue, None).await?;
        let chunks = events.filter_map(|event| async move {
            match event {
                Ok(LlmEvent::Content(text)) => Some(Ok(text)),
                Ok(LlmEvent::ToolCallDelta { .. }) => {
                    error!("Unexpected tool-call delta in plain chat stream");
                    None
                }
                Err(e) => Some(Err(e)),
            }
        });
        Ok(chunks.boxed())
    }

    async fn response_with_functions(
        &self,
        session_id: &str,
        dialogue: Vec<Message>,
        functions: Vec<FunctionSchema>,
    ) -> Result<EventStream> {
        debug!(
            "LLM function-calling request for session {}: {} messages, {} functions",
            session_id,
            dialogue.len(),
            functions.len()
        );
        let functions = if functions.is_empty() {
            None
        } else {
            Some(functions)
        };
        self.stream_events(dialogue, functions).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_events_content() {
        let data = r#"{"choices":[{"delta":{"content":"你好"}}]}"#;
        let events = delta_events(data);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], LlmEvent::Content(t) if t == "你好"));
    }

    #[test]
    fn test_delta_events_tool_call() {
        let data = r#"{"choices":[{"delta":{"tool_calls":[{"id":"t1","function":{"name":"get_weather","arguments":"{\"city\":"}}]}}]}"#;
        let events = delta_events(data);
        assert_eq!(events.len(), 1);
        match &events[0] {
            LlmEvent::ToolCallDelta { id, name, arguments } => {
                assert_eq!(id.as_deref(), Some("t1"));
                assert_eq!(name.as_deref(), Some("get_weather"));
                assert_eq!(arguments.as_deref(), Some("{\"city\":"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_delta_with_both_puts_tool_call_first() {
        let data = r#"{"choices":[{"delta":{"content":"x","tool_calls":[{"id":"t1"}]}}]}"#;
        let events = delta_events(data);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], LlmEvent::ToolCallDelta { .. }));
        assert!(matches!(&events[1], LlmEvent::Content(t) if t == "x"));
    }

    #[test]
    fn test_object_arguments_normalized_to_string() {
        let data = r#"{"choices":[{"delta":{"tool_calls":[{"function":{"arguments":{"a":1}}}]}}]}"#;
        let events = delta_events(data);
        match &events[0] {
            LlmEvent::ToolCallDelta { arguments, .. } => {
                assert_eq!(arguments.as_deref(), Some(r#"{"a":1}"#));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_malformed_data_ignored() {
        assert!(delta_events("not json").is_empty());
        assert!(delta_events(r#"{"choices":[]}"#).is_empty());
    }

    #[test]
    fn test_from_module_config_requires_url() {
        let cfg = ModuleConfig::default();
        assert!(OpenAiLlm::from_module_config("main", &cfg).is_err());
    }
}
