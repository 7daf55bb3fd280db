//! Scoped typing indicator.
//!
//! [`TypingGuard`] shows "typing…" to a peer and keeps it alive until
//! [`finish`](TypingGuard::finish) sends the cancel action. The indicator is
//! cosmetic: every failure here is logged and swallowed.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::transport::{ChatAction, Peer, Request, Transport};

// ─── TypingGuard ─────────────────────────────────────────────────────────────

/// Keeps the action alive by re-sending it every `refresh` (the backend
/// drops the indicator after ~5 s).
pub struct TypingGuard {
    transport: Arc<dyn Transport>,
    peer:      Peer,
    stop:      Arc<Notify>,
    task:      Option<JoinHandle<()>>,
}

impl TypingGuard {
    /// Send the typing action to `peer` and keep refreshing it.
    pub async fn start(transport: Arc<dyn Transport>, peer: Peer, refresh: Duration) -> Self {
        // Send once immediately so the indicator appears without delay.
        set_typing(transport.as_ref(), &peer, ChatAction::Typing).await;

        let stop  = Arc::new(Notify::new());
        let stop2 = stop.clone();
        let t     = transport.clone();
        let p     = peer.clone();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(refresh) => {
                        if !set_typing(t.as_ref(), &p, ChatAction::Typing).await {
                            break;
                        }
                    }
                    _ = stop2.notified() => break,
                }
            }
        });

        Self { transport, peer, stop, task: Some(task) }
    }

    /// Stop refreshing and send the cancel action, waiting for it to land.
    pub async fn finish(mut self) {
        self.stop.notify_one();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        set_typing(self.transport.as_ref(), &self.peer, ChatAction::Cancel).await;
    }
}

impl Drop for TypingGuard {
    fn drop(&mut self) {
        // Only reached without `finish`: stop the refresher, the backend
        // expires the indicator on its own.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Returns `false` if the action could not be delivered.
async fn set_typing(transport: &dyn Transport, peer: &Peer, action: ChatAction) -> bool {
    let req = Request::SetTyping { peer: peer.clone(), action };
    match transport.call(req).await {
        Ok(_)  => true,
        Err(e) => {
            tracing::warn!("[courier] typing indicator ({action:?}) failed: {e}");
            false
        }
    }
}
