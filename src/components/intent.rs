//! Intent-recognition capability
//!
//! The configured backend decides how user utterances are interpreted:
//! `nointent` goes straight to chat, `intent_llm` hands utterances to an
//! external classifier backed by a (possibly dedicated) LLM, and
//! `function_call` routes the whole conversation through the
//! function-calling dialog path.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::components::llm::LlmHandle;

/// Configured intent backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentKind {
    NoIntent,
    IntentLlm,
    FunctionCall,
}

impl IntentKind {
    pub fn parse(kind: &str) -> Self {
        match kind {
            "intent_llm" => Self::IntentLlm,
            "function_call" => Self::FunctionCall,
            _ => Self::NoIntent,
        }
    }
}

/// Intent-recognition capability
#[async_trait]
pub trait Intent: Send + Sync {
    /// Swap the LLM used for classification
    async fn set_llm(&self, llm: LlmHandle);
}

/// Shared handle to a swappable intent recognizer
pub type IntentHandle = Arc<dyn Intent>;

/// Pass-through recognizer: everything is plain conversation
pub struct NoIntent;

#[async_trait]
impl Intent for NoIntent {
    async fn set_llm(&self, _llm: LlmHandle) {}
}

/// Recognizer backed by an LLM; the classifier itself lives outside the
/// session core and reads the current handle through [`LlmIntent::llm`]
pub struct LlmIntent {
    llm: RwLock<Option<LlmHandle>>,
}

impl LlmIntent {
    pub fn new() -> Self {
        Self {
            llm: RwLock::new(None),
        }
    }

    /// The LLM the classifier should use, once configured
    pub async fn llm(&self) -> Option<LlmHandle> {
        self.llm.read().await.clone()
    }
}

impl Default for LlmIntent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Intent for LlmIntent {
    async fn set_llm(&self, llm: LlmHandle) {
        *self.llm.write().await = Some(llm);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::OpenAiLlm;

    #[test]
    fn test_kind_parse() {
        assert_eq!(IntentKind::parse("nointent"), IntentKind::NoIntent);
        assert_eq!(IntentKind::parse("intent_llm"), IntentKind::IntentLlm);
        assert_eq!(IntentKind::parse("function_call"), IntentKind::FunctionCall);
        assert_eq!(IntentKind::parse("bogus"), IntentKind::NoIntent);
    }

    #[tokio::test]
    async fn test_set_llm_replaces_handle() {
        let intent = LlmIntent::new();
        assert!(intent.llm().await.is_none());
        intent
            .set_llm(Arc::new(OpenAiLlm::new("http://llm", None, "m")))
            .await;
        assert!(intent.llm().await.is_some());
    }
}
