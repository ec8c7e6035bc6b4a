//! Ordered TTS consumption
//!
//! A single worker awaits queued synthesis jobs strictly in text-index
//! order, so a slow job head-of-line blocks the segments behind it: the
//! client must hear sentence N before sentence N+1. The 1-second receive
//! poll keeps the stop signal observable between jobs.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, error};

use crate::session::{AudioDelivery, OutboundFrame, Session, TtsJob};

const POLL_INTERVAL: Duration = Duration::from_secs(1);

pub async fn run_tts_worker(session: Arc<Session>, mut rx: mpsc::Receiver<TtsJob>) {
    while !session.stop.load(Ordering::SeqCst) {
        let job = match timeout(POLL_INTERVAL, rx.recv()).await {
            Err(_) => continue,
            Ok(None) => break,
            Ok(Some(job)) => job,
        };
        if let Err(e) = process_job(&session, job).await {
            // resynchronize the client rather than die: clear the speak
            // state and announce the end of the utterance
            error!("TTS task processing error: {e}");
            session.speak.clear_speak_status();
            let frame = session.tts_stop_frame().to_string();
            if session
                .outbound()
                .send(OutboundFrame::Text(frame))
                .await
                .is_err()
            {
                break;
            }
        }
    }
    drain_jobs(&mut rx);
    debug!("TTS worker stopped");
}

/// Await one job, convert its artifact, and hand the frames to playback.
/// Per-job failures are logged and skipped; only a broken playback queue is
/// escalated to the caller.
async fn process_job(session: &Arc<Session>, mut job: TtsJob) -> anyhow::Result<()> {
    debug!("Processing TTS task");
    let (artifact, text, text_index) =
        match timeout(session.tts_timeout, &mut job.handle).await {
            Err(_) => {
                error!("TTS timed out");
                job.handle.abort();
                return Ok(());
            }
            Ok(Err(e)) => {
                error!("TTS job failed to complete: {e}");
                return Ok(());
            }
            Ok(Ok(result)) => result,
        };

    let mut frames = Vec::new();
    if text.is_empty() {
        error!("TTS error at segment {text_index}: text is empty");
    } else if let Some(path) = &artifact {
        if path.exists() {
            let tts = session.components.tts();
            match tts.audio_to_opus_data(path) {
                Ok((converted, duration)) => {
                    debug!(
                        "Converted artifact for segment {text_index}: {} frames, {duration:.2}s",
                        converted.len()
                    );
                    frames = converted;
                }
                Err(e) => error!("Artifact conversion failed for segment {text_index}: {e}"),
            }
        } else {
            error!("TTS artifact missing: {}", path.display());
        }
    } else {
        error!("TTS error, no artifact for segment {text_index}: {text}");
    }

    if !frames.is_empty() && !session.speak.is_aborted() {
        if session
            .playback()
            .send(AudioDelivery {
                frames,
                text,
                text_index,
            })
            .await
            .is_err()
        {
            anyhow::bail!("playback queue closed");
        }
    }

    if let Some(path) = artifact {
        if session.components.tts().delete_audio_file() && path.exists() {
            if let Err(e) = std::fs::remove_file(&path) {
                error!("Failed to remove artifact {}: {e}", path.display());
            }
        }
    }
    Ok(())
}

/// Abort and discard everything still queued
fn drain_jobs(rx: &mut mpsc::Receiver<TtsJob>) {
    while let Ok(job) = rx.try_recv() {
        job.handle.abort();
    }
}
