//! Voxlink - real-time voice-assistant session server
//!
//! Embedded clients open a WebSocket and stream microphone audio. Each
//! connection gets its own session orchestrator that detects speech,
//! transcribes it, consults an LLM (optionally calling tools), synthesizes
//! the reply, and streams audio back - while the user may interrupt
//! mid-reply.
//!
//! # Example
//!
//! ```ignore
//! use voxlink::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load(None)?;
//!     voxlink::server::start(config).await
//! }
//! ```

pub mod components;
pub mod config;
pub mod handlers;
pub mod server;
pub mod session;
pub mod tools;
