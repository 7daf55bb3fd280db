//! Behavioral scheduler: typing, jittered waits and the send itself.
//!
//! One [`Scheduler::deliver`] call is self-contained; nothing paces distinct
//! recipients against each other. Waits race the process-wide shutdown
//! token. Before the send call that aborts the dispatch; after it, only the
//! trailing wait is abandoned and the result is still returned.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rand::rngs::StdRng;
use tokio_util::sync::CancellationToken;

use crate::errors::{Error, InvocationError};
use crate::pacing::{Pacing, SendPlan};
use crate::transport::{OutgoingMessage, Peer, Request, Response, SentMessage, Transport};
use crate::typing_guard::TypingGuard;

/// Per-send options.
#[derive(Clone, Debug)]
pub struct SendOptions {
    /// Show "typing…" before sending (default: `true`).
    pub simulate_typing: bool,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self { simulate_typing: true }
    }
}

pub struct Scheduler {
    pacing:   Pacing,
    rng:      Mutex<StdRng>,
    shutdown: CancellationToken,
}

impl Scheduler {
    pub fn new(pacing: Pacing, rng: StdRng, shutdown: CancellationToken) -> Self {
        Self { pacing, rng: Mutex::new(rng), shutdown }
    }

    pub fn pacing(&self) -> &Pacing {
        &self.pacing
    }

    /// Draw the random choices for one send.
    pub fn plan(&self, text: &str, simulate_typing: bool) -> SendPlan {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        self.pacing.plan(text, simulate_typing, &mut *rng)
    }

    /// Run the full typing → wait → send → wait sequence for one message.
    pub async fn deliver(
        &self,
        transport: &Arc<dyn Transport>,
        peer:      Peer,
        text:      &str,
        options:   &SendOptions,
    ) -> Result<SentMessage, Error> {
        let plan = self.plan(text, options.simulate_typing);
        tracing::debug!(
            "[courier] plan: typing={:?} pre={:?} post={:?} no_webpage={} silent={}",
            plan.typing, plan.pre_send, plan.post_send, plan.no_webpage, plan.silent,
        );

        if let Some(hold) = plan.typing {
            let guard = TypingGuard::start(transport.clone(), peer.clone(), self.pacing.typing_refresh).await;
            let held  = self.pause(hold).await;
            guard.finish().await;
            held?;
        }

        self.pause(plan.pre_send).await?;

        let req = Request::SendMessage(OutgoingMessage {
            peer,
            text:       text.to_string(),
            no_webpage: plan.no_webpage,
            silent:     plan.silent,
            random_id:  plan.random_id,
        });
        let sent = match transport.call(req).await? {
            Response::Sent(m) => m,
            _ => return Err(InvocationError::UnexpectedResponse("messages.sendMessage").into()),
        };

        if self.pause(plan.post_send).await.is_err() {
            tracing::debug!("[courier] shutdown during post-send wait, message {} already sent", sent.id);
        }
        Ok(sent)
    }

    async fn pause(&self, d: Duration) -> Result<(), Error> {
        tokio::select! {
            _ = tokio::time::sleep(d)     => Ok(()),
            _ = self.shutdown.cancelled() => Err(Error::ShuttingDown),
        }
    }
}
