//! Conversation memory capability
//!
//! Queried before each LLM call for a summary of prior conversations and
//! written once at teardown with the finished dialogue.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::components::llm::LlmHandle;
use crate::session::dialogue::{Message, Role};

/// Conversation memory capability
#[async_trait]
pub trait Memory: Send + Sync {
    /// Bind the store to a device and the LLM used for summarization
    async fn init_memory(&self, device_id: &str, llm: LlmHandle);

    /// Retrieve a summary relevant to the query; empty when nothing is known
    async fn query_memory(&self, query: &str) -> Result<String>;

    /// Persist the finished dialogue
    async fn save_memory(&self, dialogue: &[Message]) -> Result<()>;
}

/// Shared handle to a swappable memory store
pub type MemoryHandle = Arc<dyn Memory>;

/// Memory disabled: remembers nothing
pub struct NoMemory;

#[async_trait]
impl Memory for NoMemory {
    async fn init_memory(&self, _device_id: &str, _llm: LlmHandle) {}

    async fn query_memory(&self, _query: &str) -> Result<String> {
        Ok(String::new())
    }

    async fn save_memory(&self, _dialogue: &[Message]) -> Result<()> {
        Ok(())
    }
}

/// In-process store that keeps an LLM-generated summary per device
pub struct SummaryMemory {
    state: Mutex<SummaryState>,
}

#[derive(Default)]
struct SummaryState {
    device_id: Option<String>,
    llm: Option<LlmHandle>,
    summary: Option<String>,
}

impl SummaryMemory {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SummaryState::default()),
        }
    }
}

impl Default for SummaryMemory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Memory for SummaryMemory {
    async fn init_memory(&self, device_id: &str, llm: LlmHandle) {
        let mut state = self.state.lock().await;
        state.device_id = Some(device_id.to_string());
        state.llm = Some(llm);
    }

    async fn query_memory(&self, _query: &str) -> Result<String> {
        let state = self.state.lock().await;
        Ok(state.summary.clone().unwrap_or_default())
    }

    async fn save_memory(&self, dialogue: &[Message]) -> Result<()> {
        let llm = {
            let state = self.state.lock().await;
            state.llm.clone()
        };
        let Some(llm) = llm else {
            debug!("Memory not initialized, skipping save");
            return Ok(());
        };

        let transcript: String = dialogue
            .iter()
            .filter(|m| matches!(m.role, Role::User | Role::Assistant))
            .filter_map(|m| {
                let content = m.content.as_deref()?;
                let tag = match m.role {
                    Role::User => "user",
                    _ => "assistant",
                };
                Some(format!("{tag}: {content}\n"))
            })
            .collect();
        if transcript.is_empty() {
            return Ok(());
        }

        let prompt = format!(
            "Summarize the facts about the user worth remembering from this \
             conversation, in a few short lines.\n\n{transcript}"
        );
        use futures_util::StreamExt;
        let mut stream = llm
            .response("memory-save", vec![Message::user(prompt)])
            .await?;
        let mut summary = String::new();
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(text) => summary.push_str(&text),
                Err(e) => {
                    warn!("Memory summarization failed mid-stream: {e}");
                    break;
                }
            }
        }
        if !summary.is_empty() {
            let mut state = self.state.lock().await;
            state.summary = Some(summary);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_no_memory_is_empty() {
        let memory = NoMemory;
        assert_eq!(memory.query_memory("anything").await.unwrap(), "");
        assert!(memory.save_memory(&[]).await.is_ok());
    }

    #[tokio::test]
    async fn test_summary_memory_save_without_init_is_noop() {
        let memory = SummaryMemory::new();
        memory
            .save_memory(&[Message::user("hi"), Message::assistant("hello")])
            .await
            .unwrap();
        assert_eq!(memory.query_memory("hi").await.unwrap(), "");
    }
}
