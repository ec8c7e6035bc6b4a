//! Idle-timeout watcher
//!
//! A single sleep armed per inbound frame: the router aborts the previous
//! watcher and spawns a fresh one on every message, so the countdown only
//! completes after genuine inactivity.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::session::CloseReason;

pub fn spawn_idle_watcher(
    timeout: Duration,
    stop: Arc<AtomicBool>,
    close_tx: mpsc::Sender<CloseReason>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        if stop.load(Ordering::SeqCst) {
            return;
        }
        info!("No activity for {}s, closing session", timeout.as_secs());
        if close_tx.send(CloseReason::IdleTimeout).await.is_err() {
            error!("Idle watcher could not reach the router");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_watcher_fires_after_timeout() {
        let stop = Arc::new(AtomicBool::new(false));
        let (tx, mut rx) = mpsc::channel(1);
        spawn_idle_watcher(Duration::from_millis(20), stop, tx);
        let reason = tokio::time::timeout(Duration::from_millis(500), rx.recv())
            .await
            .expect("watcher should fire")
            .expect("channel open");
        assert_eq!(reason, CloseReason::IdleTimeout);
    }

    #[tokio::test]
    async fn test_watcher_respects_stop_signal() {
        let stop = Arc::new(AtomicBool::new(true));
        let (tx, mut rx) = mpsc::channel(1);
        let handle = spawn_idle_watcher(Duration::from_millis(10), stop, tx);
        handle.await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_abort_cancels_watcher() {
        let stop = Arc::new(AtomicBool::new(false));
        let (tx, mut rx) = mpsc::channel(1);
        let handle = spawn_idle_watcher(Duration::from_millis(30), stop, tx);
        handle.abort();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(rx.try_recv().is_err());
    }
}
