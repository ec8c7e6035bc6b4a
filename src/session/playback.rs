//! In-order audio delivery
//!
//! Pops synthesized segments FIFO and waits for each send to finish before
//! pulling the next, preserving order and backpressure against the client.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, error};

use crate::handlers::send_audio_message;
use crate::session::{AudioDelivery, Session};

const POLL_INTERVAL: Duration = Duration::from_secs(1);

pub async fn run_playback_worker(session: Arc<Session>, mut rx: mpsc::Receiver<AudioDelivery>) {
    while !session.stop.load(Ordering::SeqCst) {
        let item = match timeout(POLL_INTERVAL, rx.recv()).await {
            Err(_) => continue,
            Ok(None) => break,
            Ok(Some(item)) => item,
        };
        let text = item.text.clone();
        if let Err(e) = send_audio_message(&session, item).await {
            error!("Audio delivery error for '{text}': {e}");
        }
    }
    while rx.try_recv().is_ok() {}
    debug!("Playback worker stopped");
}
