//! Local function-calling tools
//!
//! The dialog engine hands completed tool calls either to the remote-tool
//! manager or to the local [`FunctionHandler`] registry defined here. Every
//! invocation yields an [`ActionResponse`] telling the engine whether to
//! speak a canned reply, feed the result back into the LLM, or report a
//! failure.

pub mod remote;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};

/// What the engine should do with a tool result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Speak `response` directly
    Response,
    /// Feed `result` back into the LLM for a follow-up reply
    ReqLlm,
    /// The named function does not exist
    NotFound,
    /// The call failed
    Error,
    /// Nothing to do
    None,
}

/// Result of one tool invocation
#[derive(Debug, Clone)]
pub struct ActionResponse {
    pub action: Action,
    /// Raw tool output, for REQLLM / error paths
    pub result: Option<String>,
    /// Canned reply, for the RESPONSE path
    pub response: Option<String>,
}

impl ActionResponse {
    pub fn response(text: impl Into<String>) -> Self {
        Self {
            action: Action::Response,
            result: None,
            response: Some(text.into()),
        }
    }

    pub fn req_llm(result: impl Into<String>) -> Self {
        Self {
            action: Action::ReqLlm,
            result: Some(result.into()),
            response: None,
        }
    }

    pub fn not_found(result: impl Into<String>) -> Self {
        Self {
            action: Action::NotFound,
            result: Some(result.into()),
            response: None,
        }
    }

    pub fn error(result: impl Into<String>) -> Self {
        Self {
            action: Action::Error,
            result: Some(result.into()),
            response: None,
        }
    }
}

/// A completed tool call extracted from the LLM stream
#[derive(Debug, Clone)]
pub struct FunctionCallData {
    pub name: String,
    pub id: String,
    /// Serialized JSON arguments
    pub arguments: String,
}

/// Function schema in the chat-completion `tools` wire shape
#[derive(Debug, Clone, Serialize)]
pub struct FunctionSchema {
    #[serde(rename = "type")]
    kind: &'static str,
    function: FunctionSpec,
}

#[derive(Debug, Clone, Serialize)]
struct FunctionSpec {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

impl FunctionSchema {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            kind: "function",
            function: FunctionSpec {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.function.name
    }
}

/// One locally registered function
#[async_trait]
pub trait FunctionTool: Send + Sync {
    fn schema(&self) -> FunctionSchema;
    async fn call(&self, arguments: serde_json::Value) -> Result<ActionResponse>;
}

/// Registry of local functions exposed to the LLM
pub struct FunctionHandler {
    tools: HashMap<String, Arc<dyn FunctionTool>>,
}

impl FunctionHandler {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Registry pre-loaded with the built-in functions
    pub fn with_builtins() -> Self {
        let mut handler = Self::new();
        handler.register(Arc::new(GetTime));
        handler
    }

    pub fn register(&mut self, tool: Arc<dyn FunctionTool>) {
        self.tools.insert(tool.schema().name().to_string(), tool);
    }

    /// Schemas of every registered function
    pub fn get_functions(&self) -> Vec<FunctionSchema> {
        self.tools.values().map(|t| t.schema()).collect()
    }

    /// Dispatch a completed tool call to the registered function
    pub async fn handle_llm_function_call(&self, call: &FunctionCallData) -> ActionResponse {
        let Some(tool) = self.tools.get(&call.name) else {
            return ActionResponse::not_found(format!("Function '{}' does not exist", call.name));
        };
        let arguments: serde_json::Value = if call.arguments.trim().is_empty() {
            serde_json::Value::Object(Default::default())
        } else {
            match serde_json::from_str(&call.arguments) {
                Ok(v) => v,
                Err(e) => {
                    error!("Failed to parse arguments for '{}': {e}", call.name);
                    return ActionResponse::error(format!(
                        "Invalid arguments for '{}'",
                        call.name
                    ));
                }
            }
        };
        info!("Invoking function '{}'", call.name);
        match tool.call(arguments).await {
            Ok(response) => response,
            Err(e) => {
                error!("Function '{}' failed: {e}", call.name);
                ActionResponse::error(format!("Function '{}' failed", call.name))
            }
        }
    }
}

impl Default for FunctionHandler {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// Built-in: current date and time
struct GetTime;

#[async_trait]
impl FunctionTool for GetTime {
    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new(
            "get_time",
            "Get the current date and time",
            serde_json::json!({ "type": "object", "properties": {} }),
        )
    }

    async fn call(&self, _arguments: serde_json::Value) -> Result<ActionResponse> {
        let now = chrono::Local::now();
        Ok(ActionResponse::response(format!(
            "It is {} right now.",
            now.format("%H:%M on %A, %B %e")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl FunctionTool for Echo {
        fn schema(&self) -> FunctionSchema {
            FunctionSchema::new(
                "echo",
                "Echo the input back",
                serde_json::json!({
                    "type": "object",
                    "properties": { "text": { "type": "string" } }
                }),
            )
        }

        async fn call(&self, arguments: serde_json::Value) -> Result<ActionResponse> {
            let text = arguments["text"].as_str().unwrap_or_default();
            Ok(ActionResponse::req_llm(text.to_string()))
        }
    }

    #[tokio::test]
    async fn test_dispatch_to_registered_function() {
        let mut handler = FunctionHandler::new();
        handler.register(Arc::new(Echo));
        let call = FunctionCallData {
            name: "echo".to_string(),
            id: "t1".to_string(),
            arguments: r#"{"text":"北京天气"}"#.to_string(),
        };
        let result = handler.handle_llm_function_call(&call).await;
        assert_eq!(result.action, Action::ReqLlm);
        assert_eq!(result.result.as_deref(), Some("北京天气"));
    }

    #[tokio::test]
    async fn test_unknown_function_is_not_found() {
        let handler = FunctionHandler::new();
        let call = FunctionCallData {
            name: "missing".to_string(),
            id: "t1".to_string(),
            arguments: "{}".to_string(),
        };
        let result = handler.handle_llm_function_call(&call).await;
        assert_eq!(result.action, Action::NotFound);
    }

    #[tokio::test]
    async fn test_malformed_arguments_are_error() {
        let mut handler = FunctionHandler::new();
        handler.register(Arc::new(Echo));
        let call = FunctionCallData {
            name: "echo".to_string(),
            id: "t1".to_string(),
            arguments: "not json".to_string(),
        };
        let result = handler.handle_llm_function_call(&call).await;
        assert_eq!(result.action, Action::Error);
    }

    #[test]
    fn test_schema_wire_shape() {
        let schema = FunctionSchema::new("f", "desc", serde_json::json!({}));
        let json = serde_json::to_value(&schema).unwrap();
        assert_eq!(json["type"], "function");
        assert_eq!(json["function"]["name"], "f");
    }

    #[tokio::test]
    async fn test_builtin_get_time() {
        let handler = FunctionHandler::with_builtins();
        assert_eq!(handler.get_functions().len(), 1);
        let call = FunctionCallData {
            name: "get_time".to_string(),
            id: "t1".to_string(),
            arguments: String::new(),
        };
        let result = handler.handle_llm_function_call(&call).await;
        assert_eq!(result.action, Action::Response);
        assert!(result.response.is_some());
    }
}
