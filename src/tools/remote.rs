//! Remote tool manager
//!
//! Fronts external tool servers whose tools the LLM can call by name. Tool
//! names are registered once at `initialize_servers` time so membership
//! checks on the hot path are a set lookup. Results come back as a list of
//! typed content parts; only text parts are consumed.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{error, info, warn};

use crate::tools::FunctionSchema;

/// One typed part of a remote tool result
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentPart {
    Text {
        text: String,
    },
    Image {
        #[serde(default)]
        data: String,
    },
    #[serde(other)]
    Other,
}

/// Structured result of one remote tool invocation
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolCallResult {
    #[serde(default)]
    pub content: Vec<ContentPart>,
    #[serde(default)]
    pub is_error: bool,
}

impl ToolCallResult {
    /// Join the text parts, ignoring images and unknown parts
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

/// A connected remote tool server
#[async_trait]
pub trait RemoteToolBackend: Send + Sync {
    /// Tools this server offers
    async fn list_tools(&self) -> Result<Vec<FunctionSchema>>;

    /// Invoke a tool by name
    async fn execute(&self, name: &str, arguments: serde_json::Value) -> Result<ToolCallResult>;

    /// Release the server connection
    async fn shutdown(&self) -> Result<()>;
}

/// Registry of remote tool servers and the tools they expose
pub struct RemoteToolManager {
    backends: RwLock<Vec<Arc<dyn RemoteToolBackend>>>,
    /// tool name -> index into `backends`
    registry: RwLock<HashMap<String, usize>>,
    schemas: RwLock<Vec<FunctionSchema>>,
}

impl RemoteToolManager {
    pub fn new() -> Self {
        Self {
            backends: RwLock::new(Vec::new()),
            registry: RwLock::new(HashMap::new()),
            schemas: RwLock::new(Vec::new()),
        }
    }

    /// Add a server before initialization
    pub fn add_backend(&self, backend: Arc<dyn RemoteToolBackend>) {
        self.backends.write().expect("backends lock").push(backend);
    }

    /// Query every server for its tools and build the name registry.
    /// A failing server is logged and skipped; the rest still register.
    pub async fn initialize_servers(&self) -> Result<()> {
        let backends: Vec<_> = self.backends.read().expect("backends lock").clone();
        let mut registry = HashMap::new();
        let mut schemas = Vec::new();
        for (index, backend) in backends.iter().enumerate() {
            match backend.list_tools().await {
                Ok(tools) => {
                    for schema in tools {
                        registry.insert(schema.name().to_string(), index);
                        schemas.push(schema);
                    }
                }
                Err(e) => {
                    error!("Remote tool server {index} failed to list tools: {e}");
                }
            }
        }
        info!("Registered {} remote tools", registry.len());
        *self.registry.write().expect("registry lock") = registry;
        *self.schemas.write().expect("schemas lock") = schemas;
        Ok(())
    }

    /// Whether the name belongs to a registered remote tool
    pub fn is_mcp_tool(&self, name: &str) -> bool {
        self.registry.read().expect("registry lock").contains_key(name)
    }

    /// Schemas of every registered remote tool
    pub fn function_schemas(&self) -> Vec<FunctionSchema> {
        self.schemas.read().expect("schemas lock").clone()
    }

    /// Invoke a registered remote tool
    pub async fn execute_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<ToolCallResult> {
        let backend = {
            let registry = self.registry.read().expect("registry lock");
            let Some(&index) = registry.get(name) else {
                bail!("Remote tool '{name}' is not registered");
            };
            self.backends.read().expect("backends lock")[index].clone()
        };
        backend.execute(name, arguments).await
    }

    /// Shut down every server
    pub async fn cleanup_all(&self) {
        let backends: Vec<_> = {
            let mut guard = self.backends.write().expect("backends lock");
            std::mem::take(&mut *guard)
        };
        for backend in backends {
            if let Err(e) = backend.shutdown().await {
                warn!("Remote tool server shutdown failed: {e}");
            }
        }
        self.registry.write().expect("registry lock").clear();
        self.schemas.write().expect("schemas lock").clear();
    }
}

impl Default for RemoteToolManager {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct RemoteToolListing {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    parameters: Option<serde_json::Value>,
}

/// JSON-over-HTTP tool server client
pub struct HttpToolBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpToolBackend {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl RemoteToolBackend for HttpToolBackend {
    async fn list_tools(&self) -> Result<Vec<FunctionSchema>> {
        let listings: Vec<RemoteToolListing> = self
            .client
            .get(format!("{}/tools", self.base_url))
            .send()
            .await
            .context("Failed to reach tool server")?
            .error_for_status()
            .context("Tool server rejected listing request")?
            .json()
            .await
            .context("Failed to parse tool listing")?;
        Ok(listings
            .into_iter()
            .map(|t| {
                let parameters = t
                    .parameters
                    .unwrap_or_else(|| serde_json::json!({ "type": "object" }));
                FunctionSchema::new(t.name, t.description, parameters)
            })
            .collect())
    }

    async fn execute(&self, name: &str, arguments: serde_json::Value) -> Result<ToolCallResult> {
        let result: ToolCallResult = self
            .client
            .post(format!("{}/tools/{}", self.base_url, name))
            .json(&arguments)
            .send()
            .await
            .with_context(|| format!("Failed to invoke remote tool '{name}'"))?
            .error_for_status()
            .with_context(|| format!("Remote tool '{name}' returned an error status"))?
            .json()
            .await
            .with_context(|| format!("Failed to parse result of remote tool '{name}'"))?;
        Ok(result)
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeBackend;

    #[async_trait]
    impl RemoteToolBackend for FakeBackend {
        async fn list_tools(&self) -> Result<Vec<FunctionSchema>> {
            Ok(vec![FunctionSchema::new(
                "get_weather",
                "Weather lookup",
                serde_json::json!({ "type": "object" }),
            )])
        }

        async fn execute(
            &self,
            _name: &str,
            _arguments: serde_json::Value,
        ) -> Result<ToolCallResult> {
            Ok(ToolCallResult {
                content: vec![
                    ContentPart::Text {
                        text: "北京:晴,21°C".to_string(),
                    },
                    ContentPart::Image {
                        data: String::new(),
                    },
                ],
                is_error: false,
            })
        }

        async fn shutdown(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_registration_and_lookup() {
        let manager = RemoteToolManager::new();
        manager.add_backend(Arc::new(FakeBackend));
        manager.initialize_servers().await.unwrap();
        assert!(manager.is_mcp_tool("get_weather"));
        assert!(!manager.is_mcp_tool("get_news"));
        assert_eq!(manager.function_schemas().len(), 1);
    }

    #[tokio::test]
    async fn test_execute_collects_text_parts_only() {
        let manager = RemoteToolManager::new();
        manager.add_backend(Arc::new(FakeBackend));
        manager.initialize_servers().await.unwrap();
        let result = manager
            .execute_tool("get_weather", serde_json::json!({ "city": "北京" }))
            .await
            .unwrap();
        assert_eq!(result.text(), "北京:晴,21°C");
    }

    #[tokio::test]
    async fn test_cleanup_clears_registry() {
        let manager = RemoteToolManager::new();
        manager.add_backend(Arc::new(FakeBackend));
        manager.initialize_servers().await.unwrap();
        manager.cleanup_all().await;
        assert!(!manager.is_mcp_tool("get_weather"));
        assert!(manager.function_schemas().is_empty());
    }

    #[test]
    fn test_content_part_parsing_ignores_unknown() {
        let raw = r#"{"content":[{"type":"text","text":"ok"},{"type":"audio"}],"is_error":false}"#;
        let result: ToolCallResult = serde_json::from_str(raw).unwrap();
        assert_eq!(result.text(), "ok");
        assert_eq!(result.content.len(), 2);
    }
}
