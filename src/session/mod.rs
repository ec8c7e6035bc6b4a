//! Per-connection session orchestrator
//!
//! One [`Session`] is created for every accepted WebSocket. It resolves the
//! device identity, authenticates, sends the welcome frame, then runs four
//! long-lived tasks next to the router: the outbound sender, the TTS worker,
//! the playback worker, and the idle-timeout watcher. All outbound traffic
//! funnels through a single mpsc channel so workers never touch the socket
//! directly.

pub mod dialogue;
pub mod engine;
pub mod idle;
pub mod playback;
pub mod segment;
pub mod speak;
pub mod tts_worker;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use axum::http::HeaderMap;
use futures_util::{SinkExt, StreamExt};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::components::ComponentHandles;
use crate::config::{Config, PrivateConfig};
use crate::handlers::{DeviceProtocol, FrameHandler};
use crate::server::manage_api::{ManageApiClient, ManageApiError};
use crate::server::ServerState;
use crate::tools::remote::{HttpToolBackend, RemoteToolManager};
use crate::tools::FunctionHandler;

use dialogue::Dialogue;
use speak::SpeakState;

/// Parallel synthesis slots per session
const TTS_POOL_SLOTS: usize = 10;
/// Queue capacity for the TTS and playback stages
const QUEUE_CAPACITY: usize = 128;

/// Frame on its way to the client
#[derive(Debug)]
pub enum OutboundFrame {
    Text(String),
    Binary(Vec<u8>),
    Close,
}

/// A queued synthesis job, resolving to `(artifact, text, text index)`
#[derive(Debug)]
pub struct TtsJob {
    pub handle: JoinHandle<(Option<PathBuf>, String, usize)>,
}

/// One synthesized segment ready for in-order delivery
#[derive(Debug)]
pub struct AudioDelivery {
    pub frames: Vec<Vec<u8>>,
    pub text: String,
    pub text_index: usize,
}

/// Why the router should stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    IdleTimeout,
    AfterChat,
}

/// How the client signals utterance boundaries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenMode {
    Auto,
    Manual,
}

impl ListenMode {
    pub fn parse(mode: &str) -> Self {
        match mode {
            "manual" => Self::Manual,
            _ => Self::Auto,
        }
    }
}

/// Audio-ingress bookkeeping used by the default audio handler
#[derive(Debug, Default)]
pub struct AudioIngress {
    pub buffer: Vec<i16>,
    pub have_voice: bool,
    pub voice_stop: bool,
    pub silent_frames: u32,
}

impl AudioIngress {
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.have_voice = false;
        self.voice_stop = false;
        self.silent_frames = 0;
    }
}

/// Receiver ends of the session's channels; the caller wires them to the
/// socket and the workers
pub struct SessionChannels {
    pub tts_rx: mpsc::Receiver<TtsJob>,
    pub playback_rx: mpsc::Receiver<AudioDelivery>,
    pub outbound_rx: mpsc::Receiver<OutboundFrame>,
    pub close_rx: mpsc::Receiver<CloseReason>,
}

/// State owned by one client connection
pub struct Session {
    pub session_id: String,
    pub device_id: String,
    pub client_id: Option<String>,
    pub client_addr: SocketAddr,
    pub config: std::sync::RwLock<Config>,
    pub prompt: std::sync::RwLock<String>,
    pub need_bind: AtomicBool,
    pub bind_code: std::sync::RwLock<Option<String>>,
    pub components: Arc<ComponentHandles>,
    pub dialogue: tokio::sync::Mutex<Dialogue>,
    pub speak: Arc<SpeakState>,
    pub stop: Arc<AtomicBool>,
    pub listen_mode: std::sync::RwLock<ListenMode>,
    pub close_after_chat: AtomicBool,
    pub use_function_call: AtomicBool,
    pub exit_commands: Vec<String>,
    pub max_cmd_length: usize,
    pub audio: tokio::sync::Mutex<AudioIngress>,
    pub remote_tools: Arc<RemoteToolManager>,
    pub tts_timeout: Duration,
    pub idle_timeout: Duration,

    tts_tx: mpsc::Sender<TtsJob>,
    playback_tx: mpsc::Sender<AudioDelivery>,
    outbound_tx: mpsc::Sender<OutboundFrame>,
    close_tx: mpsc::Sender<CloseReason>,
    tts_limiter: Arc<Semaphore>,
    func_handler: std::sync::RwLock<Option<Arc<FunctionHandler>>>,
    idle_handle: std::sync::Mutex<Option<JoinHandle<()>>>,
    worker_handles: std::sync::Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl Session {
    /// Create a session and hand back the channel receivers for wiring
    pub fn new(
        config: Config,
        device_id: String,
        client_id: Option<String>,
        client_addr: SocketAddr,
        components: Arc<ComponentHandles>,
    ) -> (Arc<Self>, SessionChannels) {
        let (tts_tx, tts_rx) = mpsc::channel(QUEUE_CAPACITY);
        let (playback_tx, playback_rx) = mpsc::channel(QUEUE_CAPACITY);
        let (outbound_tx, outbound_rx) = mpsc::channel(QUEUE_CAPACITY);
        let (close_tx, close_rx) = mpsc::channel(4);

        let mut dialogue = Dialogue::new();
        dialogue.update_system_message(&config.prompt);

        let exit_commands = config.exit_commands.clone();
        let max_cmd_length = config.max_cmd_length();
        let tts_timeout = Duration::from_secs(config.tts_timeout);
        let idle_timeout = Duration::from_secs(config.close_connection_no_voice_time + 60);
        let prompt = config.prompt.clone();

        let session = Arc::new(Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            device_id,
            client_id,
            client_addr,
            config: std::sync::RwLock::new(config),
            prompt: std::sync::RwLock::new(prompt),
            need_bind: AtomicBool::new(false),
            bind_code: std::sync::RwLock::new(None),
            components,
            dialogue: tokio::sync::Mutex::new(dialogue),
            speak: Arc::new(SpeakState::new()),
            stop: Arc::new(AtomicBool::new(false)),
            listen_mode: std::sync::RwLock::new(ListenMode::Auto),
            close_after_chat: AtomicBool::new(false),
            use_function_call: AtomicBool::new(false),
            exit_commands,
            max_cmd_length,
            audio: tokio::sync::Mutex::new(AudioIngress::default()),
            remote_tools: Arc::new(RemoteToolManager::new()),
            tts_timeout,
            idle_timeout,
            tts_tx,
            playback_tx,
            outbound_tx,
            close_tx,
            tts_limiter: Arc::new(Semaphore::new(TTS_POOL_SLOTS)),
            func_handler: std::sync::RwLock::new(None),
            idle_handle: std::sync::Mutex::new(None),
            worker_handles: std::sync::Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        });

        let channels = SessionChannels {
            tts_rx,
            playback_rx,
            outbound_rx,
            close_rx,
        };
        (session, channels)
    }

    /// Handles of the spawned workers, for joining in tests and teardown
    pub fn take_worker_handles(&self) -> Vec<JoinHandle<()>> {
        std::mem::take(&mut *self.worker_handles.lock().expect("worker handles lock"))
    }

    /// Send the configured welcome object with the session id injected.
    /// The welcome is cloned per send so reconnects never see a stale id.
    pub async fn send_welcome(&self) {
        let mut welcome = self.config.read().expect("config lock").welcome.clone();
        if let Some(obj) = welcome.as_object_mut() {
            obj.insert(
                "session_id".to_string(),
                serde_json::Value::String(self.session_id.clone()),
            );
        }
        let frame = welcome.to_string();
        if self.outbound_tx.send(OutboundFrame::Text(frame)).await.is_err() {
            warn!("Failed to send welcome frame, channel closed");
        }
    }

    /// Send a JSON text frame to the client
    pub async fn send_json(&self, value: serde_json::Value) {
        let _ = self
            .outbound_tx
            .send(OutboundFrame::Text(value.to_string()))
            .await;
    }

    /// Send one encoded audio frame to the client
    pub async fn send_audio_frame(&self, frame: Vec<u8>) -> bool {
        self.outbound_tx
            .send(OutboundFrame::Binary(frame))
            .await
            .is_ok()
    }

    /// The `{"type":"tts","state":"stop"}` recovery frame
    pub fn tts_stop_frame(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "tts",
            "state": "stop",
            "session_id": self.session_id,
        })
    }

    pub(crate) fn outbound(&self) -> mpsc::Sender<OutboundFrame> {
        self.outbound_tx.clone()
    }

    pub(crate) fn playback(&self) -> mpsc::Sender<AudioDelivery> {
        self.playback_tx.clone()
    }

    pub fn func_handler(&self) -> Option<Arc<FunctionHandler>> {
        self.func_handler.read().expect("func handler lock").clone()
    }

    pub fn set_func_handler(&self, handler: Arc<FunctionHandler>) {
        *self.func_handler.write().expect("func handler lock") = Some(handler);
    }

    /// Update the system prompt in place
    pub async fn change_system_prompt(&self, prompt: &str) {
        *self.prompt.write().expect("prompt lock") = prompt.to_string();
        self.dialogue.lock().await.update_system_message(prompt);
    }

    /// Restart the inactivity countdown; called for every inbound frame
    pub fn reset_idle_watcher(&self) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        let mut slot = self.idle_handle.lock().expect("idle handle lock");
        if let Some(handle) = slot.take() {
            handle.abort();
        }
        *slot = Some(idle::spawn_idle_watcher(
            self.idle_timeout,
            self.stop.clone(),
            self.close_tx.clone(),
        ));
    }

    /// Record a segment and queue its synthesis, preserving emission order
    pub async fn enqueue_segment(&self, text: String, text_index: usize) {
        self.speak.record_first_last_text(&text, text_index);
        let tts = self.components.tts();
        let limiter = self.tts_limiter.clone();
        let handle = tokio::spawn(async move {
            let _permit = match limiter.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return (None, text, text_index),
            };
            if text.is_empty() {
                info!("Skipping synthesis, segment text is empty");
                return (None, text, text_index);
            }
            match tts.to_tts(&text).await {
                Ok(Some(path)) => {
                    debug!("TTS artifact ready: {}", path.display());
                    (Some(path), text, text_index)
                }
                Ok(None) => {
                    error!("TTS produced no artifact for: {text}");
                    (None, text, text_index)
                }
                Err(e) => {
                    error!("TTS failed for segment {text_index}: {e}");
                    (None, text, text_index)
                }
            }
        });
        if self.tts_tx.send(TtsJob { handle }).await.is_err() {
            warn!("TTS queue closed, dropping segment {text_index}");
        }
    }

    /// Clear the audio-ingress state between utterances
    pub async fn reset_vad_states(&self) {
        self.audio.lock().await.reset();
        debug!("VAD states reset");
    }

    /// Fetch the per-device overlay, capturing bind requirements instead of
    /// failing the session. Returns `None` when the manage API is disabled.
    pub async fn initialize_private_config(&self) -> Option<PrivateConfig> {
        let (enabled, manager_api, delete_audio) = {
            let config = self.config.read().expect("config lock");
            (
                config.read_config_from_api,
                config.manager_api.clone(),
                config.delete_audio,
            )
        };
        if !enabled {
            return None;
        }
        let client = ManageApiClient::new(&manager_api);
        let started = std::time::Instant::now();
        let mut private = match client
            .fetch_private_config(&self.device_id, self.client_id.as_deref())
            .await
        {
            Ok(private) => {
                info!(
                    "Fetched private config in {:.2}s",
                    started.elapsed().as_secs_f64()
                );
                private
            }
            Err(ManageApiError::DeviceNotFound) => {
                self.need_bind.store(true, Ordering::SeqCst);
                PrivateConfig::default()
            }
            Err(ManageApiError::DeviceBind { bind_code }) => {
                self.need_bind.store(true, Ordering::SeqCst);
                *self.bind_code.write().expect("bind code lock") = Some(bind_code);
                PrivateConfig::default()
            }
            Err(e) => {
                error!("Private config fetch failed: {e}");
                self.need_bind.store(true, Ordering::SeqCst);
                PrivateConfig::default()
            }
        };
        private.delete_audio = Some(delete_audio);

        // TTS and prompt take effect before the workers start; the rest is
        // re-initialized asynchronously
        if private.tts.is_some() {
            let cfg = {
                let mut config = self.config.write().expect("config lock");
                if let Some(blocks) = &private.tts {
                    config.tts.extend(blocks.clone());
                }
                if private.selected_module.tts.is_some() {
                    config.selected_module.tts = private.selected_module.tts.clone();
                }
                config.clone()
            };
            if let Some((name, tts_cfg)) = cfg.selected(&cfg.selected_module.tts, &cfg.tts) {
                match crate::components::build_tts(name, tts_cfg, delete_audio) {
                    Ok(handle) => self.components.set_tts(handle),
                    Err(e) => error!("Private TTS initialization failed: {e}"),
                }
            }
        }
        if let Some(prompt) = private.prompt.take() {
            self.change_system_prompt(&prompt).await;
        }
        Some(private)
    }

    /// Persist the dialogue, then release every session resource
    pub async fn save_and_close(&self) {
        // stop first so no engine task appends while memory reads the log
        self.stop.store(true, Ordering::SeqCst);
        let dialogue = self.dialogue.lock().await.llm_dialogue();
        if let Err(e) = self.components.memory().save_memory(&dialogue).await {
            error!("Failed to save memory: {e}");
        }
        self.close().await;
    }

    /// Idempotent teardown: cancel the idle watcher, release remote tools,
    /// raise the stop signal, and close the channel. The workers observe the
    /// stop signal within one poll interval and drain their queues.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.idle_handle.lock().expect("idle handle lock").take() {
            handle.abort();
        }
        self.remote_tools.cleanup_all().await;
        self.stop.store(true, Ordering::SeqCst);
        let _ = self.outbound_tx.try_send(OutboundFrame::Close);
        info!("Session {} resources released", self.session_id);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Spawn the TTS and playback workers
pub fn spawn_workers(
    session: &Arc<Session>,
    tts_rx: mpsc::Receiver<TtsJob>,
    playback_rx: mpsc::Receiver<AudioDelivery>,
) {
    let mut handles = session
        .worker_handles
        .lock()
        .expect("worker handles lock");
    handles.push(tokio::spawn(tts_worker::run_tts_worker(
        session.clone(),
        tts_rx,
    )));
    handles.push(tokio::spawn(playback::run_playback_worker(
        session.clone(),
        playback_rx,
    )));
}

/// Route an utterance into the dialog engine on its own task so the router
/// keeps receiving frames (and barge-in stays possible)
pub fn start_chat(session: &Arc<Session>, text: String) {
    let session = session.clone();
    tokio::spawn(async move {
        if session.use_function_call.load(Ordering::SeqCst) {
            engine::chat_with_function_calling(&session, &text, false).await;
        } else {
            engine::chat(&session, &text).await;
        }
        if session.close_after_chat.load(Ordering::SeqCst) {
            let _ = session.close_tx.send(CloseReason::AfterChat).await;
        }
    });
}

/// Run one final reply, then close the connection
pub fn chat_and_close(session: &Arc<Session>, text: String) {
    session.close_after_chat.store(true, Ordering::SeqCst);
    start_chat(session, text);
}

/// Resolve `device-id` / `client-id` from the headers, falling back to the
/// URL query string
pub fn resolve_identity(
    headers: &HeaderMap,
    query: Option<&str>,
) -> Option<(String, Option<String>)> {
    let header = |key: &str| {
        headers
            .get(key)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string())
    };
    if let Some(device_id) = header("device-id") {
        return Some((device_id, header("client-id")));
    }
    let query = query?;
    let mut device_id = None;
    let mut client_id = None;
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        match key.as_ref() {
            "device-id" => device_id = Some(value.into_owned()),
            "client-id" => client_id = Some(value.into_owned()),
            _ => {}
        }
    }
    device_id.map(|id| (id, client_id))
}

/// Best-effort locale info derived from the client address; only public
/// addresses produce anything
pub fn lookup_client_locale(ip: IpAddr) -> Option<String> {
    let public = match ip {
        IpAddr::V4(v4) => {
            !(v4.is_private()
                || v4.is_loopback()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast())
        }
        IpAddr::V6(v6) => !(v6.is_loopback() || v6.is_unspecified()),
    };
    if public {
        Some(format!("ip:{ip}"))
    } else {
        None
    }
}

/// Asynchronous half of component initialization: apply the private overlay,
/// bind memory and intent, and fold the client locale into the prompt
pub async fn initialize_components(session: Arc<Session>, private: Option<PrivateConfig>) {
    if let Some(private) = &private {
        let mut touched = {
            let mut config = session.config.write().expect("config lock");
            config.apply_private_overrides(private)
        };
        // TTS was already swapped synchronously before worker startup
        touched.tts = false;
        let config = session.config.read().expect("config lock").clone();
        if let Err(e) = session.components.reinitialize(&config, touched) {
            error!("Component re-initialization failed: {e}");
        }
    }

    session
        .components
        .memory()
        .init_memory(&session.device_id, session.components.llm())
        .await;

    initialize_intent(&session).await;

    if let Some(info) = lookup_client_locale(session.client_addr.ip()) {
        info!("Client locale info: {info}");
        let prompt = {
            let current = session.prompt.read().expect("prompt lock");
            format!("{current}\nuser location:{info}")
        };
        session.change_system_prompt(&prompt).await;
    }
}

/// Set up the intent backend, the function registry, and the remote tools
async fn initialize_intent(session: &Arc<Session>) {
    use crate::components::{build_llm, IntentKind};

    let config = session.config.read().expect("config lock").clone();
    let Some((name, intent_cfg)) =
        config.selected(&config.selected_module.intent, &config.intent)
    else {
        return;
    };
    let kind = IntentKind::parse(intent_cfg.kind_or(name));
    if kind == IntentKind::FunctionCall {
        session.use_function_call.store(true, Ordering::SeqCst);
    }
    if kind == IntentKind::NoIntent {
        return;
    }
    if kind == IntentKind::IntentLlm {
        let dedicated = intent_cfg
            .str_option("llm")
            .and_then(|llm_name| config.llm.get(llm_name).map(|cfg| (llm_name, cfg)));
        let llm = match dedicated {
            Some((llm_name, llm_cfg)) => match build_llm(llm_name, llm_cfg) {
                Ok(handle) => {
                    info!("Dedicated intent LLM: {llm_name}");
                    handle
                }
                Err(e) => {
                    error!("Dedicated intent LLM construction failed: {e}");
                    session.components.llm()
                }
            },
            None => {
                info!("Using the primary LLM for intent recognition");
                session.components.llm()
            }
        };
        session.components.intent().set_llm(llm).await;
    }

    session.set_func_handler(Arc::new(FunctionHandler::with_builtins()));
    for url in &config.remote_tools {
        session
            .remote_tools
            .add_backend(Arc::new(HttpToolBackend::new(url)));
    }
    if let Err(e) = session.remote_tools.initialize_servers().await {
        error!("Remote tool initialization failed: {e}");
    }
}

/// Entry point: run one accepted socket to completion
pub async fn handle_connection(
    socket: WebSocket,
    addr: SocketAddr,
    headers: HeaderMap,
    query: Option<String>,
    state: ServerState,
) {
    let Some((device_id, client_id)) = resolve_identity(&headers, query.as_deref()) else {
        error!("Unable to resolve device-id from headers or query parameters");
        return;
    };
    if let Err(e) = state.auth.authenticate(&headers, &device_id) {
        error!("Authentication failed for {device_id}: {e}");
        return;
    }
    info!("{addr} connected as device {device_id}");

    let components = match ComponentHandles::from_config(&state.config) {
        Ok(components) => Arc::new(components),
        Err(e) => {
            error!("Component construction failed: {e}");
            return;
        }
    };

    let (session, channels) = Session::new(
        (*state.config).clone(),
        device_id,
        client_id,
        addr,
        components,
    );

    let (ws_tx, mut ws_rx) = socket.split();
    let sender = tokio::spawn(run_sender(ws_tx, channels.outbound_rx));

    session.reset_idle_watcher();
    session.send_welcome().await;

    let private = session.initialize_private_config().await;
    {
        let session = session.clone();
        tokio::spawn(async move {
            initialize_components(session, private).await;
        });
    }

    spawn_workers(&session, channels.tts_rx, channels.playback_rx);

    let handler = DeviceProtocol::new();
    let mut close_rx = channels.close_rx;
    loop {
        tokio::select! {
            inbound = ws_rx.next() => match inbound {
                Some(Ok(message)) => {
                    session.reset_idle_watcher();
                    match message {
                        WsMessage::Text(text) => {
                            if let Err(e) = handler.handle_text(&session, text.as_str()).await {
                                error!("Text handler error: {e}");
                            }
                        }
                        WsMessage::Binary(data) => {
                            if let Err(e) = handler.handle_audio(&session, &data).await {
                                error!("Audio handler error: {e}");
                            }
                        }
                        WsMessage::Close(_) => {
                            info!("Client closed the connection");
                            break;
                        }
                        _ => {}
                    }
                }
                Some(Err(e)) => {
                    error!("WebSocket error: {e}");
                    break;
                }
                None => {
                    info!("Client disconnected");
                    break;
                }
            },
            reason = close_rx.recv() => {
                match reason {
                    Some(CloseReason::IdleTimeout) => info!("Idle timeout, closing session"),
                    Some(CloseReason::AfterChat) => info!("Closing session after final reply"),
                    None => {}
                }
                break;
            }
        }
    }

    session.save_and_close().await;
    let _ = tokio::time::timeout(Duration::from_secs(2), sender).await;
    for handle in session.take_worker_handles() {
        let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;
    }
}

async fn run_sender(
    mut ws_tx: futures_util::stream::SplitSink<WebSocket, WsMessage>,
    mut rx: mpsc::Receiver<OutboundFrame>,
) {
    while let Some(frame) = rx.recv().await {
        let result = match frame {
            OutboundFrame::Text(text) => ws_tx.send(WsMessage::Text(text.into())).await,
            OutboundFrame::Binary(data) => ws_tx.send(WsMessage::Binary(data.into())).await,
            OutboundFrame::Close => {
                let _ = ws_tx.send(WsMessage::Close(None)).await;
                break;
            }
        };
        if result.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_identity_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("device-id", "aa:bb".parse().unwrap());
        headers.insert("client-id", "c-1".parse().unwrap());
        let (device, client) = resolve_identity(&headers, None).unwrap();
        assert_eq!(device, "aa:bb");
        assert_eq!(client.as_deref(), Some("c-1"));
    }

    #[test]
    fn test_resolve_identity_from_query() {
        let headers = HeaderMap::new();
        let (device, client) =
            resolve_identity(&headers, Some("device-id=aa%3Abb&client-id=c-1")).unwrap();
        assert_eq!(device, "aa:bb");
        assert_eq!(client.as_deref(), Some("c-1"));
    }

    #[test]
    fn test_resolve_identity_missing_is_none() {
        let headers = HeaderMap::new();
        assert!(resolve_identity(&headers, Some("foo=bar")).is_none());
        assert!(resolve_identity(&headers, None).is_none());
    }

    #[test]
    fn test_listen_mode_parse() {
        assert_eq!(ListenMode::parse("manual"), ListenMode::Manual);
        assert_eq!(ListenMode::parse("auto"), ListenMode::Auto);
        assert_eq!(ListenMode::parse("anything"), ListenMode::Auto);
    }

    #[test]
    fn test_locale_lookup_skips_private_addresses() {
        assert!(lookup_client_locale("127.0.0.1".parse().unwrap()).is_none());
        assert!(lookup_client_locale("192.168.1.10".parse().unwrap()).is_none());
        assert!(lookup_client_locale("8.8.8.8".parse().unwrap()).is_some());
    }
}
