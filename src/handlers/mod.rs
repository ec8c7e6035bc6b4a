//! Inbound frame handlers and the audio send routine
//!
//! The session core routes frames here without inspecting them. The shipped
//! [`DeviceProtocol`] implements the embedded-device message protocol: JSON
//! control frames on the text channel, raw PCM on the binary channel. The
//! audio ingress path owns barge-in detection; the send routine owns the
//! start / sentence_start / stop framing around each segment.

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::session::{AudioDelivery, ListenMode, Session};

/// Consecutive silent frames that end an utterance
const SILENCE_FRAMES_FOR_EOS: u32 = 15;
/// Minimum utterance length worth transcribing (0.3 s at 16 kHz)
const MIN_UTTERANCE_SAMPLES: usize = 4800;
/// Pacing interval between outbound audio frames
const FRAME_INTERVAL: Duration = Duration::from_millis(60);

/// Handler seam for inbound client frames
#[async_trait]
pub trait FrameHandler: Send + Sync {
    async fn handle_text(&self, session: &Arc<Session>, text: &str) -> Result<()>;
    async fn handle_audio(&self, session: &Arc<Session>, data: &[u8]) -> Result<()>;
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ClientMessage {
    #[serde(rename = "hello")]
    Hello,
    #[serde(rename = "listen")]
    Listen {
        #[serde(default)]
        state: String,
        #[serde(default)]
        mode: Option<String>,
        #[serde(default)]
        text: Option<String>,
    },
    #[serde(rename = "abort")]
    Abort,
    #[serde(rename = "ping")]
    Ping,
}

/// The embedded-device message protocol
pub struct DeviceProtocol;

impl DeviceProtocol {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DeviceProtocol {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FrameHandler for DeviceProtocol {
    async fn handle_text(&self, session: &Arc<Session>, text: &str) -> Result<()> {
        let message: ClientMessage = match serde_json::from_str(text) {
            Ok(message) => message,
            Err(e) => {
                debug!("Unparseable client frame: {e}");
                return Ok(());
            }
        };
        match message {
            ClientMessage::Hello => {
                session.send_welcome().await;
            }
            ClientMessage::Listen { state, mode, text } => {
                if let Some(mode) = mode {
                    *session.listen_mode.write().expect("listen mode lock") =
                        ListenMode::parse(&mode);
                }
                match state.as_str() {
                    "start" => session.reset_vad_states().await,
                    "stop" => finalize_utterance(session).await,
                    "detect" => {
                        if let Some(text) = text {
                            dispatch_utterance(session, text);
                        }
                    }
                    other => debug!("Ignoring listen state '{other}'"),
                }
            }
            ClientMessage::Abort => {
                info!("Client aborted the reply");
                session.speak.abort();
                session.speak.clear_speak_status();
                session.send_json(session.tts_stop_frame()).await;
            }
            ClientMessage::Ping => {}
        }
        Ok(())
    }

    async fn handle_audio(&self, session: &Arc<Session>, data: &[u8]) -> Result<()> {
        let samples: Vec<i16> = data
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        if samples.is_empty() {
            return Ok(());
        }

        let vad = session.components.vad();
        let is_speech = vad.is_speech(&samples);

        // speech over an active reply is a barge-in
        if is_speech && session.speak.is_speaking() {
            info!("Barge-in detected, aborting reply");
            session.speak.abort();
        }
        if !session.speak.is_receiving() {
            return Ok(());
        }

        // in manual mode the client marks the end of the utterance itself
        // with a listen-stop frame; silence never ends it
        let manual =
            *session.listen_mode.read().expect("listen mode lock") == ListenMode::Manual;
        let ready = {
            let mut audio = session.audio.lock().await;
            if is_speech {
                audio.have_voice = true;
                audio.silent_frames = 0;
                audio.buffer.extend_from_slice(&samples);
                None
            } else if audio.have_voice {
                audio.buffer.extend_from_slice(&samples);
                audio.silent_frames += 1;
                let silence_eos = !manual && audio.silent_frames >= SILENCE_FRAMES_FOR_EOS;
                if (silence_eos || audio.voice_stop)
                    && audio.buffer.len() > MIN_UTTERANCE_SAMPLES
                {
                    let pcm = std::mem::take(&mut audio.buffer);
                    audio.reset();
                    Some(pcm)
                } else {
                    None
                }
            } else {
                None
            }
        };

        if let Some(pcm) = ready {
            transcribe_and_chat(session, pcm).await;
        }
        Ok(())
    }
}

/// Force end-of-utterance (manual listen mode)
async fn finalize_utterance(session: &Arc<Session>) {
    let pcm = {
        let mut audio = session.audio.lock().await;
        audio.voice_stop = true;
        if audio.buffer.len() > MIN_UTTERANCE_SAMPLES {
            let pcm = std::mem::take(&mut audio.buffer);
            audio.reset();
            Some(pcm)
        } else {
            None
        }
    };
    if let Some(pcm) = pcm {
        transcribe_and_chat(session, pcm).await;
    }
}

async fn transcribe_and_chat(session: &Arc<Session>, pcm: Vec<i16>) {
    session.speak.set_receiving(false);
    let asr = session.components.asr();
    match asr.transcribe(&pcm).await {
        Ok(text) if !text.is_empty() => {
            info!("Transcription: {text}");
            dispatch_utterance(session, text);
        }
        Ok(_) => {
            debug!("Empty transcription, resuming listening");
            session.speak.set_receiving(true);
        }
        Err(e) => {
            error!("Transcription failed: {e}");
            session.speak.set_receiving(true);
        }
    }
}

/// Route recognized text into the dialog engine, honoring exit commands
fn dispatch_utterance(session: &Arc<Session>, text: String) {
    let trimmed = text.trim();
    if trimmed.chars().count() <= session.max_cmd_length
        && session.exit_commands.iter().any(|cmd| cmd == trimmed)
    {
        info!("Exit command received: {trimmed}");
        crate::session::chat_and_close(session, text);
    } else {
        crate::session::start_chat(session, text);
    }
}

/// Deliver one synthesized segment: emit the start frame for the first
/// segment of a reply, a sentence_start frame, the audio frames paced at
/// real time, and the stop frame once the final segment has played.
pub async fn send_audio_message(session: &Arc<Session>, item: AudioDelivery) -> Result<()> {
    let speak = &session.speak;
    if item.text_index as i64 == speak.first_index() {
        session
            .send_json(serde_json::json!({
                "type": "tts",
                "state": "start",
                "session_id": session.session_id,
            }))
            .await;
    }
    session
        .send_json(serde_json::json!({
            "type": "tts",
            "state": "sentence_start",
            "text": item.text,
            "index": item.text_index,
            "session_id": session.session_id,
        }))
        .await;

    for frame in item.frames {
        if speak.is_aborted() || session.stop.load(Ordering::SeqCst) {
            break;
        }
        if !session.send_audio_frame(frame).await {
            anyhow::bail!("outbound channel closed");
        }
        tokio::time::sleep(FRAME_INTERVAL).await;
    }

    if item.text_index as i64 == speak.last_index() && speak.llm_finished() {
        session.send_json(session.tts_stop_frame()).await;
        speak.clear_speak_status();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_parse() {
        let m: ClientMessage =
            serde_json::from_str(r#"{"type":"listen","state":"detect","text":"你好"}"#).unwrap();
        match m {
            ClientMessage::Listen { state, text, .. } => {
                assert_eq!(state, "detect");
                assert_eq!(text.as_deref(), Some("你好"));
            }
            other => panic!("unexpected message: {other:?}"),
        }
        assert!(matches!(
            serde_json::from_str::<ClientMessage>(r#"{"type":"abort"}"#).unwrap(),
            ClientMessage::Abort
        ));
    }

    #[test]
    fn test_unknown_type_fails_parse() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"selfie"}"#).is_err());
    }
}
