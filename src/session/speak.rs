//! Speak-status tracking and barge-in flag
//!
//! Plain atomics shared between the router task, the dialog engine, and the
//! TTS/playback workers. Indices use -1 as the "not speaking" sentinel.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use tracing::{debug, info};

/// Per-reply speaking state
#[derive(Debug)]
pub struct SpeakState {
    /// Set by the audio handler when the user talks over the reply
    client_abort: AtomicBool,
    /// Whether the server is accepting new utterances
    asr_server_receive: AtomicBool,
    /// Whether the dialog engine has finished emitting segments
    llm_finished: AtomicBool,
    tts_first_text_index: AtomicI64,
    tts_last_text_index: AtomicI64,
}

impl Default for SpeakState {
    fn default() -> Self {
        Self {
            client_abort: AtomicBool::new(false),
            asr_server_receive: AtomicBool::new(true),
            llm_finished: AtomicBool::new(true),
            tts_first_text_index: AtomicI64::new(-1),
            tts_last_text_index: AtomicI64::new(-1),
        }
    }
}

impl SpeakState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset to the idle state: accepting utterances, no active reply
    pub fn clear_speak_status(&self) {
        debug!("Clearing server speak status");
        self.asr_server_receive.store(true, Ordering::SeqCst);
        self.tts_first_text_index.store(-1, Ordering::SeqCst);
        self.tts_last_text_index.store(-1, Ordering::SeqCst);
    }

    /// Record a newly emitted segment's index
    pub fn record_first_last_text(&self, text: &str, text_index: usize) {
        let index = text_index as i64;
        if self
            .tts_first_text_index
            .compare_exchange(-1, index, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            info!("First sentence of reply: {}", text);
        }
        self.tts_last_text_index.store(index, Ordering::SeqCst);
    }

    pub fn first_index(&self) -> i64 {
        self.tts_first_text_index.load(Ordering::SeqCst)
    }

    pub fn last_index(&self) -> i64 {
        self.tts_last_text_index.load(Ordering::SeqCst)
    }

    /// Whether a reply is currently being spoken
    pub fn is_speaking(&self) -> bool {
        self.first_index() != -1
    }

    pub fn abort(&self) {
        self.client_abort.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.client_abort.load(Ordering::SeqCst)
    }

    pub fn reset_abort(&self) {
        self.client_abort.store(false, Ordering::SeqCst);
    }

    pub fn set_receiving(&self, receiving: bool) {
        self.asr_server_receive.store(receiving, Ordering::SeqCst);
    }

    pub fn is_receiving(&self) -> bool {
        self.asr_server_receive.load(Ordering::SeqCst)
    }

    pub fn set_llm_finished(&self, finished: bool) {
        self.llm_finished.store(finished, Ordering::SeqCst);
    }

    pub fn llm_finished(&self) -> bool {
        self.llm_finished.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_index_set_once() {
        let speak = SpeakState::new();
        assert!(!speak.is_speaking());
        speak.record_first_last_text("第一句", 1);
        speak.record_first_last_text("第二句", 2);
        assert_eq!(speak.first_index(), 1);
        assert_eq!(speak.last_index(), 2);
        assert!(speak.is_speaking());
    }

    #[test]
    fn test_clear_resets_indices_and_receive() {
        let speak = SpeakState::new();
        speak.set_receiving(false);
        speak.record_first_last_text("x", 3);
        speak.clear_speak_status();
        assert_eq!(speak.first_index(), -1);
        assert_eq!(speak.last_index(), -1);
        assert!(speak.is_receiving());
    }

    #[test]
    fn test_abort_roundtrip() {
        let speak = SpeakState::new();
        assert!(!speak.is_aborted());
        speak.abort();
        assert!(speak.is_aborted());
        speak.reset_abort();
        assert!(!speak.is_aborted());
    }

    #[test]
    fn test_record_after_clear_starts_fresh_reply() {
        let speak = SpeakState::new();
        speak.record_first_last_text("a", 1);
        speak.clear_speak_status();
        speak.record_first_last_text("b", 1);
        assert_eq!(speak.first_index(), 1);
    }
}
