//! # courier-client
//!
//! Outbound message dispatch that paces itself like a person at a keyboard.
//!
//! ## Features
//! - User login (phone + code + 2FA) as an explicit state machine
//! - Per-recipient sliding-window rate limit (30 sends / hour by default)
//! - Typing indicator, jittered pre/post-send waits, randomized send flags
//! - Stable per-process device fingerprint
//! - Classified errors: flood-wait, bans, bad codes, unknown recipients
//! - Pluggable session storage for the transport
//!
//! The wire protocol is not part of this crate: plug one in through the
//! [`Transport`] trait.

#![deny(unsafe_code)]

mod errors;
pub mod auth;
pub mod pacing;
pub mod profile;
pub mod rate_limit;
pub mod scheduler;
pub mod session_backend;
pub mod transport;
pub mod typing_guard;

pub use auth::{LoginToken, PasswordToken, PendingVerification, SessionState, SignInOutcome};
pub use errors::{Error, InvocationError, RpcError, FLOOD_WAIT_FALLBACK_SECS};
pub use pacing::{Pacing, SendPlan};
pub use profile::Profile;
pub use rate_limit::{RateLimitConfig, RateLimitResult, RateLimiter};
pub use scheduler::SendOptions;
pub use session_backend::{InMemoryStore, SessionStore};
pub use transport::{Account, ChatAction, OutgoingMessage, Peer, Request, Response, SentMessage, Transport};
pub use typing_guard::TypingGuard;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio_util::sync::CancellationToken;

use auth::Authenticator;
use scheduler::Scheduler;

// ─── PeerCache ────────────────────────────────────────────────────────────────

/// Username → peer, so repeat sends skip `contacts.resolveUsername`.
#[derive(Default)]
struct PeerCache {
    by_username: HashMap<String, Peer>,
}

// ─── Config ───────────────────────────────────────────────────────────────────

/// Configuration for [`Courier::new`].
#[derive(Clone)]
pub struct Config {
    pub api_id:        i32,
    pub api_hash:      String,
    pub rate_limit:    RateLimitConfig,
    pub pacing:        Pacing,
    /// Seed for every random draw (fingerprint, delays, flags). `None`
    /// seeds from OS entropy.
    pub seed:          Option<u64>,
    /// Where the transport keeps its session material (default: in memory).
    pub session_store: Arc<dyn SessionStore>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_id:        0,
            api_hash:      String::new(),
            rate_limit:    RateLimitConfig::default(),
            pacing:        Pacing::default(),
            seed:          None,
            session_store: Arc::new(InMemoryStore::new()),
        }
    }
}

// ─── Status / SendReport ──────────────────────────────────────────────────────

/// Snapshot returned by [`Courier::status`].
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Status {
    pub state:         SessionState,
    pub profile:       Profile,
    pub account:       Option<Account>,
    pub last_activity: Option<DateTime<Utc>>,
}

/// Result of a successful [`Courier::send_message`].
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SendReport {
    pub message_id: i32,
    pub peer:       Peer,
    pub sent_at:    DateTime<Utc>,
}

// ─── Courier ──────────────────────────────────────────────────────────────────

struct CourierInner {
    transport:     Arc<dyn Transport>,
    session_store: Arc<dyn SessionStore>,
    profile:       Profile,
    auth:          Authenticator,
    limiter:       RateLimiter,
    scheduler:     Scheduler,
    peer_cache:    Mutex<PeerCache>,
    last_activity: Mutex<Option<DateTime<Utc>>>,
    shutdown:      CancellationToken,
}

/// The dispatch orchestrator. Cheap to clone (internally Arc-wrapped).
///
/// Build one per process with [`Courier::new`], hand clones to request
/// handlers, and call [`Courier::shutdown`] on the way out.
#[derive(Clone)]
pub struct Courier {
    inner: Arc<CourierInner>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Courier {
    pub fn new(config: Config, transport: Arc<dyn Transport>) -> Self {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None       => StdRng::from_entropy(),
        };
        let profile  = Profile::generate(&mut rng);
        let shutdown = CancellationToken::new();

        tracing::info!(
            "[courier] Profile: {} / {} / app {} (store: {})",
            profile.device_model, profile.system_version, profile.app_version,
            config.session_store.name(),
        );

        let auth = Authenticator::new(transport.clone(), config.api_id, config.api_hash, profile.clone());
        let scheduler = Scheduler::new(config.pacing, rng, shutdown.clone());

        Self {
            inner: Arc::new(CourierInner {
                transport,
                session_store: config.session_store,
                profile,
                auth,
                limiter: RateLimiter::new(config.rate_limit),
                scheduler,
                peer_cache: Mutex::new(PeerCache::default()),
                last_activity: Mutex::new(None),
                shutdown,
            }),
        }
    }

    // ── Lifecycle ──────────────────────────────────────────────────────────

    /// Probe for an existing session. [`Error::AuthRequired`] means a login
    /// is needed; it is not fatal.
    pub async fn initialize(&self) -> Result<Account, Error> {
        self.ensure_running()?;
        self.inner.auth.initialize().await
    }

    /// Pure snapshot of the session state, fingerprint and activity.
    pub fn status(&self) -> Status {
        Status {
            state:         self.inner.auth.state(),
            profile:       self.inner.profile.clone(),
            account:       self.inner.auth.account(),
            last_activity: *lock(&self.inner.last_activity),
        }
    }

    pub fn profile(&self) -> &Profile {
        &self.inner.profile
    }

    pub fn session_store(&self) -> Arc<dyn SessionStore> {
        self.inner.session_store.clone()
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.inner.limiter
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Abandon pending waits, then release limiter, cache and session
    /// memory. Sends already on the wire complete; logins still in flight
    /// end with [`Error::ShuttingDown`]. A durable session store keeps its
    /// contents (see [`SessionStore::release`]). Safe to call repeatedly.
    pub fn shutdown(&self) {
        if self.inner.shutdown.is_cancelled() {
            return;
        }
        self.inner.shutdown.cancel();
        self.inner.limiter.clear();
        lock(&self.inner.peer_cache).by_username.clear();
        self.inner.auth.close();
        if let Err(e) = self.inner.session_store.release() {
            tracing::warn!("[courier] Failed to release {} session store: {e}", self.inner.session_store.name());
        }
        tracing::info!("[courier] Shut down ✓");
    }

    // ── Auth ───────────────────────────────────────────────────────────────

    pub async fn request_code(&self, phone: &str) -> Result<LoginToken, Error> {
        self.ensure_running()?;
        self.inner.auth.request_code(phone).await
    }

    pub async fn sign_in(&self, phone: &str, token: &LoginToken, code: &str) -> Result<SignInOutcome, Error> {
        self.ensure_running()?;
        self.inner.auth.sign_in(phone, token, code).await
    }

    pub async fn check_password(&self, token: &PasswordToken, password: &str) -> Result<Account, Error> {
        self.ensure_running()?;
        self.inner.auth.check_password(token, password).await
    }

    pub async fn sign_out(&self) -> Result<bool, Error> {
        self.ensure_running()?;
        let known = self.inner.auth.sign_out().await?;
        lock(&self.inner.peer_cache).by_username.clear();
        Ok(known)
    }

    // ── Messaging ──────────────────────────────────────────────────────────

    /// Send `message` to `target` (`@username`, `username`, a t.me link,
    /// a numeric user id, or `me`).
    ///
    /// Never retries: flood-wait and ban errors come back classified.
    pub async fn send_message(
        &self,
        target:  &str,
        message: &str,
        options: &SendOptions,
    ) -> Result<SendReport, Error> {
        self.ensure_running()?;
        if message.trim().is_empty() {
            return Err(Error::EmptyMessage);
        }
        if self.inner.auth.state() != SessionState::Authenticated {
            self.inner.auth.initialize().await?;
        }

        let key = normalize_target(target);
        if key.is_empty() {
            return Err(Error::RecipientNotFound(target.to_string()));
        }
        if let RateLimitResult::Limited { retry_after } = self.inner.limiter.check(&key) {
            let retry_after_seconds = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            tracing::info!("[courier] {key}: rate limited, retry in {retry_after_seconds}s");
            return Err(Error::RateLimited { retry_after_seconds });
        }

        let result = async {
            let peer = self.resolve(&key, target).await?;
            let sent = self.inner.scheduler
                .deliver(&self.inner.transport, peer.clone(), message, options)
                .await?;
            Ok::<_, Error>((peer, sent))
        }.await;

        let (peer, sent) = match result {
            Ok(v) => v,
            Err(Error::AuthRequired) => {
                self.inner.auth.session_lost();
                return Err(Error::AuthRequired);
            }
            Err(e) => return Err(e),
        };

        let now = Utc::now();
        *lock(&self.inner.last_activity) = Some(now);
        tracing::info!("[courier] Sent message {} to {key} ✓", sent.id);
        Ok(SendReport { message_id: sent.id, peer, sent_at: now })
    }

    /// Resolve a normalized key to a routable peer.
    async fn resolve(&self, key: &str, target: &str) -> Result<Peer, Error> {
        if key == "me" || key == "self" {
            return Ok(Peer::SelfUser);
        }
        if let Ok(id) = key.parse::<i64>() {
            return Ok(Peer::User { id, access_hash: 0 });
        }
        if let Some(peer) = lock(&self.inner.peer_cache).by_username.get(key) {
            return Ok(peer.clone());
        }

        let req = Request::ResolveUsername { username: key.to_string() };
        let peer = match self.inner.transport.call(req).await {
            Ok(Response::ResolvedPeer(Some(p))) => p,
            Ok(Response::ResolvedPeer(None)) => return Err(Error::RecipientNotFound(target.to_string())),
            Ok(_) => return Err(InvocationError::UnexpectedResponse("contacts.resolveUsername").into()),
            Err(e) if e.is("USERNAME_NOT_OCCUPIED") || e.is("USERNAME_INVALID") => {
                return Err(Error::RecipientNotFound(target.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        lock(&self.inner.peer_cache).by_username.insert(key.to_string(), peer.clone());
        Ok(peer)
    }

    fn ensure_running(&self) -> Result<(), Error> {
        if self.inner.shutdown.is_cancelled() {
            Err(Error::ShuttingDown)
        } else {
            Ok(())
        }
    }
}

/// Rate-limiter partition key for a target: trimmed, without the `@` marker
/// or a `t.me/` link prefix, lowercased.
pub fn normalize_target(target: &str) -> String {
    let mut t = target.trim();
    for prefix in ["https://", "http://"] {
        t = t.strip_prefix(prefix).unwrap_or(t);
    }
    for prefix in ["t.me/", "telegram.me/"] {
        t = t.strip_prefix(prefix).unwrap_or(t);
    }
    t.trim_start_matches('@').trim_end_matches('/').to_lowercase()
}
