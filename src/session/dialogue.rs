//! Role-tagged dialogue log
//!
//! Holds the message history sent to the LLM. The log is append-only for
//! user/assistant/tool messages; the single system message at the head is
//! updated in place when the prompt changes. Messages serialize directly in
//! the chat-completion wire shape.

use serde::{Deserialize, Serialize};

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool call issued by the assistant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallDescriptor {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub function: ToolCallFunction,
    #[serde(default)]
    pub index: u32,
}

/// Name and serialized JSON arguments of a tool call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallFunction {
    pub name: String,
    pub arguments: String,
}

impl ToolCallDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: "function".to_string(),
            function: ToolCallFunction {
                name: name.into(),
                arguments: arguments.into(),
            },
            index: 0,
        }
    }
}

/// One dialogue entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallDescriptor>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Assistant message carrying a tool-call descriptor instead of content
    pub fn assistant_tool_call(descriptor: ToolCallDescriptor) -> Self {
        Self {
            role: Role::Assistant,
            content: None,
            tool_calls: Some(vec![descriptor]),
            tool_call_id: None,
        }
    }

    /// Tool reply matching a previously issued tool-call id
    pub fn tool_reply(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

/// Ordered dialogue log
#[derive(Debug, Default)]
pub struct Dialogue {
    messages: Vec<Message>,
}

impl Dialogue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message, preserving insertion order
    pub fn put(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Replace the head system message, or insert one if absent
    pub fn update_system_message(&mut self, prompt: &str) {
        match self.messages.first_mut() {
            Some(head) if head.role == Role::System => {
                head.content = Some(prompt.to_string());
            }
            _ => self.messages.insert(0, Message::system(prompt)),
        }
    }

    /// The raw dialogue, in insertion order
    pub fn llm_dialogue(&self) -> Vec<Message> {
        self.messages.clone()
    }

    /// The dialogue with the retrieved memory summary folded into the
    /// system context
    pub fn llm_dialogue_with_memory(&self, memory: &str) -> Vec<Message> {
        if memory.is_empty() {
            return self.llm_dialogue();
        }
        let mut messages = self.messages.clone();
        let note = format!("Relevant memory from previous conversations:\n{memory}");
        match messages.first_mut() {
            Some(head) if head.role == Role::System => {
                let base = head.content.clone().unwrap_or_default();
                head.content = Some(format!("{base}\n\n{note}"));
            }
            _ => messages.insert(0, Message::system(note)),
        }
        messages
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
