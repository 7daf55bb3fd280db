//! Per-recipient sliding-window send limiter.
//!
//! Each key keeps the instants of its admitted sends inside the trailing
//! window. A check evicts expired instants, then either records `now` or
//! refuses. Refusals record nothing, so hammering a full window never
//! extends it. Every [`SWEEP_EVERY`] checks, windows that have fully
//! expired are dropped from the map.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

/// Rate limit configuration.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum admitted sends per key inside the window.
    pub max_sends: usize,
    /// Trailing window length.
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_sends: 30,
            window: Duration::from_secs(3600),
        }
    }
}

/// Result of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitResult {
    Allowed,
    Limited {
        /// Time until the oldest entry leaves the window.
        retry_after: Duration,
    },
}

impl RateLimitResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Checks between two sweeps of expired windows.
pub const SWEEP_EVERY: usize = 1024;

type Window = Arc<Mutex<VecDeque<Instant>>>;

/// Sliding-window counter keyed by normalized recipient.
#[derive(Debug, Default)]
pub struct RateLimiter {
    config:  RateLimitConfig,
    windows: Mutex<HashMap<String, Window>>,
    checks:  AtomicUsize,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn evict(entries: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&oldest) = entries.front() {
        if now.saturating_duration_since(oldest) >= window {
            entries.pop_front();
        } else {
            break;
        }
    }
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self { config, windows: Mutex::new(HashMap::new()), checks: AtomicUsize::new(0) }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Admit a send for `key` now. `false` means the window is full.
    pub fn admit(&self, key: &str) -> bool {
        self.check(key).is_allowed()
    }

    /// Like [`admit`](Self::admit), but reports how long until a slot frees.
    pub fn check(&self, key: &str) -> RateLimitResult {
        self.check_at(key, Instant::now())
    }

    /// Check against an explicit clock reading. `now` must not go backwards
    /// for a given key.
    pub fn check_at(&self, key: &str, now: Instant) -> RateLimitResult {
        if self.checks.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            self.prune_at(now);
        }

        let window = self.window(key);
        let mut entries = lock(&window);
        evict(&mut entries, now, self.config.window);

        if entries.len() >= self.config.max_sends {
            let oldest = entries.front().copied().unwrap_or(now);
            let retry_after = self.config.window
                .saturating_sub(now.saturating_duration_since(oldest));
            tracing::debug!("[courier] rate limit hit for {key} ({} in window)", entries.len());
            return RateLimitResult::Limited { retry_after };
        }

        entries.push_back(now);
        RateLimitResult::Allowed
    }

    /// Admitted sends currently held for `key` (expired ones included until
    /// the next check evicts them).
    pub fn recorded(&self, key: &str) -> usize {
        let windows = lock(&self.windows);
        windows.get(key).map(|w| lock(w).len()).unwrap_or(0)
    }

    /// Number of keys with a window in memory.
    pub fn tracked_keys(&self) -> usize {
        lock(&self.windows).len()
    }

    /// Drop windows with nothing left inside the trailing window as of
    /// `now`. Returns how many keys were released.
    ///
    /// A window another check is still holding is skipped: it cannot be
    /// dropped without losing that check's record.
    pub fn prune_at(&self, now: Instant) -> usize {
        let mut windows = lock(&self.windows);
        let before = windows.len();
        windows.retain(|_, w| {
            if Arc::strong_count(w) > 1 {
                return true;
            }
            let mut entries = lock(&**w);
            evict(&mut entries, now, self.config.window);
            !entries.is_empty()
        });
        let released = before - windows.len();
        if released > 0 {
            tracing::debug!("[courier] rate limiter released {released} idle key(s)");
        }
        released
    }

    /// Drop every window. Used on shutdown.
    pub fn clear(&self) {
        lock(&self.windows).clear();
    }

    // The map lock is held only long enough to fetch the key's window, so
    // checks on different keys never wait on each other.
    fn window(&self, key: &str) -> Window {
        lock(&self.windows)
            .entry(key.to_string())
            .or_default()
            .clone()
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
