//! Configuration management
//!
//! Loads the YAML server configuration and exposes the per-module selection
//! maps used to construct VAD/ASR/LLM/TTS/Memory/Intent components. A subset
//! of the file can be overridden per device by the manage API at session
//! start (see [`PrivateConfig`]).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Listen address settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Device authentication settings
    #[serde(default)]
    pub auth: AuthConfig,
    /// System prompt for the assistant
    #[serde(default = "default_prompt")]
    pub prompt: String,
    /// Welcome object sent on connect; `session_id` is injected into a clone
    #[serde(default = "default_welcome")]
    pub welcome: serde_json::Value,
    /// Commands that end the conversation (consumed by the text handler)
    #[serde(default)]
    pub exit_commands: Vec<String>,
    /// Seconds of silence before the idle watcher closes the session
    /// (a 60 s grace period is always added on top)
    #[serde(default = "default_no_voice_time")]
    pub close_connection_no_voice_time: u64,
    /// Per-segment synthesis timeout in seconds
    #[serde(default = "default_tts_timeout")]
    pub tts_timeout: u64,
    /// Fetch per-device configuration from the manage API at session start
    #[serde(default)]
    pub read_config_from_api: bool,
    /// Manage API endpoint (used when `read_config_from_api` is set)
    #[serde(default)]
    pub manager_api: ManagerApiConfig,
    /// Remove synthesized audio artifacts after playback
    #[serde(default = "default_true")]
    pub delete_audio: bool,
    /// Base URLs of remote tool servers exposed to the LLM
    #[serde(default)]
    pub remote_tools: Vec<String>,
    /// Which named module block to use for each component kind
    #[serde(default)]
    pub selected_module: SelectedModules,
    /// Named module blocks, keyed by module name
    #[serde(rename = "VAD", default)]
    pub vad: HashMap<String, ModuleConfig>,
    #[serde(rename = "ASR", default)]
    pub asr: HashMap<String, ModuleConfig>,
    #[serde(rename = "LLM", default)]
    pub llm: HashMap<String, ModuleConfig>,
    #[serde(rename = "TTS", default)]
    pub tts: HashMap<String, ModuleConfig>,
    #[serde(rename = "Memory", default)]
    pub memory: HashMap<String, ModuleConfig>,
    #[serde(rename = "Intent", default)]
    pub intent: HashMap<String, ModuleConfig>,
}

fn default_prompt() -> String {
    "You are a friendly voice assistant. Keep replies short and conversational; \
     they will be spoken aloud."
        .to_string()
}

fn default_welcome() -> serde_json::Value {
    serde_json::json!({
        "type": "hello",
        "transport": "websocket",
        "audio_params": { "sample_rate": 16000 }
    })
}

fn default_no_voice_time() -> u64 {
    120
}

fn default_tts_timeout() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            prompt: default_prompt(),
            welcome: default_welcome(),
            exit_commands: Vec::new(),
            close_connection_no_voice_time: default_no_voice_time(),
            tts_timeout: default_tts_timeout(),
            read_config_from_api: false,
            manager_api: ManagerApiConfig::default(),
            delete_audio: true,
            remote_tools: Vec::new(),
            selected_module: SelectedModules::default(),
            vad: HashMap::new(),
            asr: HashMap::new(),
            llm: HashMap::new(),
            tts: HashMap::new(),
            memory: HashMap::new(),
            intent: HashMap::new(),
        }
    }
}

/// Listen address settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Device authentication settings
///
/// Devices present a static bearer token; known device ids may bypass the
/// token check entirely.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Accepted bearer tokens
    #[serde(default)]
    pub tokens: Vec<String>,
    /// Device ids accepted without a token
    #[serde(default)]
    pub allowed_devices: Vec<String>,
}

/// Manage API endpoint settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManagerApiConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub secret: String,
}

/// Module selection: which named block each component kind uses
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SelectedModules {
    #[serde(rename = "VAD", default)]
    pub vad: Option<String>,
    #[serde(rename = "ASR", default)]
    pub asr: Option<String>,
    #[serde(rename = "LLM", default)]
    pub llm: Option<String>,
    #[serde(rename = "TTS", default)]
    pub tts: Option<String>,
    #[serde(rename = "Memory", default)]
    pub memory: Option<String>,
    #[serde(rename = "Intent", default)]
    pub intent: Option<String>,
}

/// One named module block: a `type` discriminator plus free-form options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleConfig {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(flatten)]
    pub options: HashMap<String, serde_yaml::Value>,
}

impl ModuleConfig {
    /// Read a string option by key
    pub fn str_option(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(|v| v.as_str())
    }

    /// Read a float option by key
    pub fn f64_option(&self, key: &str) -> Option<f64> {
        self.options.get(key).and_then(|v| v.as_f64())
    }

    /// The `type` discriminator, falling back to the block's own name
    pub fn kind_or<'a>(&'a self, name: &'a str) -> &'a str {
        self.kind.as_deref().unwrap_or(name)
    }
}

/// Per-device configuration overlay returned by the manage API.
///
/// Only the blocks present here are re-initialized; everything else keeps
/// the server-wide configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PrivateConfig {
    #[serde(default)]
    pub selected_module: SelectedModules,
    #[serde(rename = "VAD", default)]
    pub vad: Option<HashMap<String, ModuleConfig>>,
    #[serde(rename = "ASR", default)]
    pub asr: Option<HashMap<String, ModuleConfig>>,
    #[serde(rename = "LLM", default)]
    pub llm: Option<HashMap<String, ModuleConfig>>,
    #[serde(rename = "TTS", default)]
    pub tts: Option<HashMap<String, ModuleConfig>>,
    #[serde(rename = "Memory", default)]
    pub memory: Option<HashMap<String, ModuleConfig>>,
    #[serde(rename = "Intent", default)]
    pub intent: Option<HashMap<String, ModuleConfig>>,
    #[serde(default)]
    pub prompt: Option<String>,
    /// Forced to the server-wide value after fetch
    #[serde(default)]
    pub delete_audio: Option<bool>,
}

impl Config {
    /// Load configuration from an explicit path or the default locations
    /// (`./config.yaml`, then the platform config directory).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::find_default() {
                Some(p) => p,
                None => return Ok(Self::default()),
            },
        };
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    fn find_default() -> Option<PathBuf> {
        let local = PathBuf::from("config.yaml");
        if local.exists() {
            return Some(local);
        }
        let dir = dirs::config_dir()?.join("voxlink").join("config.yaml");
        if dir.exists() {
            return Some(dir);
        }
        None
    }

    /// Longest configured exit command, in characters
    pub fn max_cmd_length(&self) -> usize {
        self.exit_commands
            .iter()
            .map(|c| c.chars().count())
            .max()
            .unwrap_or(0)
    }

    /// Selected block name and config for a component kind, if configured
    pub fn selected<'a>(
        &self,
        selection: &'a Option<String>,
        blocks: &'a HashMap<String, ModuleConfig>,
    ) -> Option<(&'a str, &'a ModuleConfig)> {
        let name = selection.as_deref()?;
        blocks.get(name).map(|cfg| (name, cfg))
    }

    /// Merge the per-device overlay into this configuration.
    ///
    /// Returns which component kinds were overridden and therefore need
    /// re-initialization.
    pub fn apply_private_overrides(&mut self, private: &PrivateConfig) -> OverriddenModules {
        let mut touched = OverriddenModules::default();
        if let Some(blocks) = &private.vad {
            self.vad.extend(blocks.clone());
            if private.selected_module.vad.is_some() {
                self.selected_module.vad = private.selected_module.vad.clone();
            }
            touched.vad = true;
        }
        if let Some(blocks) = &private.asr {
            self.asr.extend(blocks.clone());
            if private.selected_module.asr.is_some() {
                self.selected_module.asr = private.selected_module.asr.clone();
            }
            touched.asr = true;
        }
        if let Some(blocks) = &private.llm {
            self.llm.extend(blocks.clone());
            if private.selected_module.llm.is_some() {
                self.selected_module.llm = private.selected_module.llm.clone();
            }
            touched.llm = true;
        }
        if let Some(blocks) = &private.tts {
            self.tts.extend(blocks.clone());
            if private.selected_module.tts.is_some() {
                self.selected_module.tts = private.selected_module.tts.clone();
            }
            touched.tts = true;
        }
        if let Some(blocks) = &private.memory {
            self.memory.extend(blocks.clone());
            if private.selected_module.memory.is_some() {
                self.selected_module.memory = private.selected_module.memory.clone();
            }
            touched.memory = true;
        }
        if let Some(blocks) = &private.intent {
            self.intent.extend(blocks.clone());
            if private.selected_module.intent.is_some() {
                self.selected_module.intent = private.selected_module.intent.clone();
            }
            touched.intent = true;
        }
        touched
    }
}

/// Which component kinds a private overlay touched
#[derive(Debug, Clone, Copy, Default)]
pub struct OverriddenModules {
    pub vad: bool,
    pub asr: bool,
    pub llm: bool,
    pub tts: bool,
    pub memory: bool,
    pub intent: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.close_connection_no_voice_time, 120);
        assert_eq!(config.tts_timeout, 10);
        assert!(config.delete_audio);
        assert!(!config.read_config_from_api);
    }

    #[test]
    fn test_parse_yaml() {
        let raw = r#"
server:
  host: 127.0.0.1
  port: 8100
prompt: "be brief"
exit_commands: ["再见", "退下"]
close_connection_no_voice_time: 90
remote_tools:
  - "http://tools.internal:7010"
selected_module:
  LLM: main
  TTS: speech
LLM:
  main:
    type: openai
    url: "http://localhost:11434/v1"
    model_name: qwen2.5
TTS:
  speech:
    type: http
    url: "http://localhost:3001"
    voice: af_heart
"#;
        let config: Config = serde_yaml::from_str(raw).unwrap();
        assert_eq!(config.server.port, 8100);
        assert_eq!(config.max_cmd_length(), 2);
        assert_eq!(config.remote_tools, vec!["http://tools.internal:7010"]);
        let (name, llm) = config
            .selected(&config.selected_module.llm, &config.llm)
            .unwrap();
        assert_eq!(name, "main");
        assert_eq!(llm.kind_or(name), "openai");
        assert_eq!(llm.str_option("model_name"), Some("qwen2.5"));
    }

    #[test]
    fn test_private_overlay_marks_touched_modules() {
        let mut config = Config::default();
        let raw = r#"
selected_module:
  TTS: premium
TTS:
  premium:
    type: http
    url: "http://tts.internal"
prompt: "custom persona"
"#;
        let private: PrivateConfig = serde_yaml::from_str(raw).unwrap();
        let touched = config.apply_private_overrides(&private);
        assert!(touched.tts);
        assert!(!touched.llm);
        assert_eq!(config.selected_module.tts.as_deref(), Some("premium"));
        assert!(config.tts.contains_key("premium"));
    }

    #[test]
    fn test_missing_selection_yields_none() {
        let config = Config::default();
        assert!(config
            .selected(&config.selected_module.llm, &config.llm)
            .is_none());
    }
}
