//! Error types for courier-client.
//!
//! Three layers: [`RpcError`] is what the backend said, [`InvocationError`]
//! is anything that went wrong talking to the transport, and [`Error`] is the
//! classified outcome handed to callers of [`crate::Courier`].

use std::{fmt, io};

use crate::auth::SessionState;

/// Wait applied when a flood-wait error carries no usable number.
pub const FLOOD_WAIT_FALLBACK_SECS: u64 = 60;

// ─── RpcError ─────────────────────────────────────────────────────────────────

/// An error returned by the backend in response to a call.
///
/// Numeric values are stripped from the name and placed in [`RpcError::value`].
///
/// # Example
/// `FLOOD_WAIT_30` → `RpcError { code: 420, name: "FLOOD_WAIT", value: Some(30) }`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RpcError {
    /// HTTP-like status code.
    pub code: i32,
    /// Error name in SCREAMING_SNAKE_CASE with digits removed.
    pub name: String,
    /// Numeric suffix extracted from the name, if any.
    pub value: Option<u32>,
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RPC {}: {}", self.code, self.name)?;
        if let Some(v) = self.value {
            write!(f, " (value: {v})")?;
        }
        Ok(())
    }
}

impl std::error::Error for RpcError {}

impl RpcError {
    /// Parse a raw backend message like `"FLOOD_WAIT_30"` into an `RpcError`.
    pub fn from_telegram(code: i32, message: &str) -> Self {
        if let Some(idx) = message.rfind('_') {
            let suffix = &message[idx + 1..];
            if !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_digit()) {
                if let Ok(v) = suffix.parse::<u32>() {
                    let name = message[..idx].to_string();
                    return Self { code, name, value: Some(v) };
                }
            }
        }
        Self { code, name: message.to_string(), value: None }
    }

    /// Match on the error name, with optional wildcard prefix/suffix `'*'`.
    ///
    /// # Examples
    /// - `err.is("FLOOD_WAIT")` — exact match
    /// - `err.is("PHONE_CODE_*")` — starts-with match
    /// - `err.is("*_INVALID")` — ends-with match
    pub fn is(&self, pattern: &str) -> bool {
        if let Some(prefix) = pattern.strip_suffix('*') {
            self.name.starts_with(prefix)
        } else if let Some(suffix) = pattern.strip_prefix('*') {
            self.name.ends_with(suffix)
        } else {
            self.name == pattern
        }
    }

    /// The raw machine-readable code as the backend sent it.
    pub fn raw_name(&self) -> String {
        match self.value {
            Some(v) => format!("{}_{v}", self.name),
            None    => self.name.clone(),
        }
    }

    /// Returns the cooldown in seconds if this is a flood-wait class error.
    ///
    /// A flood error whose number is missing or unparsable still yields
    /// [`FLOOD_WAIT_FALLBACK_SECS`].
    pub fn flood_wait_seconds(&self) -> Option<u64> {
        let flood = self.name.starts_with("FLOOD_WAIT")
            || self.name.starts_with("FLOOD_PREMIUM_WAIT")
            || self.name.starts_with("SLOWMODE_WAIT");
        if !flood {
            return None;
        }
        Some(self.value.map(u64::from).unwrap_or(FLOOD_WAIT_FALLBACK_SECS))
    }

    /// The session is unknown to the backend and must log in again.
    pub fn is_unauthorized(&self) -> bool {
        self.is("AUTH_KEY_UNREGISTERED") || self.is("SESSION_REVOKED") || self.code == 401
    }

    /// The account has been deactivated or its number banned.
    pub fn is_banned(&self) -> bool {
        self.is("USER_DEACTIVATED_BAN") || self.is("PHONE_NUMBER_BANNED") || self.is("USER_DEACTIVATED")
    }
}

// ─── InvocationError ──────────────────────────────────────────────────────────

/// Anything that can go wrong while calling the transport.
#[derive(Debug)]
pub enum InvocationError {
    /// The backend rejected the request.
    Rpc(RpcError),
    /// Network / I/O failure below the RPC boundary.
    Io(io::Error),
    /// The transport answered with a response that does not fit the request.
    UnexpectedResponse(&'static str),
    /// The request was dropped (e.g. transport shut down).
    Dropped,
}

impl fmt::Display for InvocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rpc(e)                => write!(f, "{e}"),
            Self::Io(e)                 => write!(f, "I/O error: {e}"),
            Self::UnexpectedResponse(m) => write!(f, "unexpected response to {m}"),
            Self::Dropped               => write!(f, "request dropped"),
        }
    }
}

impl std::error::Error for InvocationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Rpc(e) => Some(e),
            Self::Io(e)  => Some(e),
            _            => None,
        }
    }
}

impl From<io::Error> for InvocationError {
    fn from(e: io::Error) -> Self { Self::Io(e) }
}

impl From<RpcError> for InvocationError {
    fn from(e: RpcError) -> Self { Self::Rpc(e) }
}

impl InvocationError {
    /// Returns `true` if this is the named RPC error (supports `'*'` wildcards).
    pub fn is(&self, pattern: &str) -> bool {
        match self {
            Self::Rpc(e) => e.is(pattern),
            _            => false,
        }
    }

    /// If this is a flood-wait class error, returns how many seconds to wait.
    pub fn flood_wait_seconds(&self) -> Option<u64> {
        match self {
            Self::Rpc(e) => e.flood_wait_seconds(),
            _            => None,
        }
    }

    pub fn rpc(&self) -> Option<&RpcError> {
        match self {
            Self::Rpc(e) => Some(e),
            _            => None,
        }
    }
}

// ─── Error ────────────────────────────────────────────────────────────────────

/// Classified error returned by every [`crate::Courier`] operation.
#[derive(Debug)]
pub enum Error {
    /// No valid session; log in with a code first.
    AuthRequired,
    /// The operation is not legal in the current session state.
    InvalidState { operation: &'static str, state: SessionState },
    /// The login code (or its handle) was wrong. Retry with another code.
    InvalidCode,
    /// The login code expired. Request a new one.
    CodeExpired,
    /// The second-factor password was wrong.
    InvalidPassword,
    /// The phone number has no account yet.
    SignUpRequired,
    /// The local per-recipient limiter refused the send.
    RateLimited { retry_after_seconds: u64 },
    /// The backend imposed a cooldown.
    FloodWait { seconds: u64, rpc: RpcError },
    /// The target does not resolve to any peer.
    RecipientNotFound(String),
    /// The account is banned or deactivated.
    AccountBanned(RpcError),
    /// Refusing to send empty text.
    EmptyMessage,
    /// The courier has been shut down.
    ShuttingDown,
    /// Any other collaborator failure, with its original code attached.
    Collaborator(InvocationError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AuthRequired                     => write!(f, "authentication required"),
            Self::InvalidState { operation, state } => write!(f, "{operation} is not allowed while {state}"),
            Self::InvalidCode                      => write!(f, "invalid login code"),
            Self::CodeExpired                      => write!(f, "login code expired — request a new one"),
            Self::InvalidPassword                  => write!(f, "invalid 2FA password"),
            Self::SignUpRequired                   => write!(f, "sign up required — use the official app"),
            Self::RateLimited { retry_after_seconds } =>
                write!(f, "rate limited, retry in {retry_after_seconds}s"),
            Self::FloodWait { seconds, .. }        => write!(f, "flood wait, retry in {seconds}s"),
            Self::RecipientNotFound(t)             => write!(f, "recipient not found: {t}"),
            Self::AccountBanned(e)                 => write!(f, "account banned ({e})"),
            Self::EmptyMessage                     => write!(f, "message text is empty"),
            Self::ShuttingDown                     => write!(f, "courier is shutting down"),
            Self::Collaborator(e)                  => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::FloodWait { rpc, .. } => Some(rpc),
            Self::AccountBanned(e)      => Some(e),
            Self::Collaborator(e)       => Some(e),
            _                           => None,
        }
    }
}

impl From<InvocationError> for Error {
    /// Classify a collaborator failure. Codes with a dedicated variant map to
    /// it; everything else is passed through untouched.
    fn from(e: InvocationError) -> Self {
        let InvocationError::Rpc(rpc) = e else {
            return Self::Collaborator(e);
        };
        if let Some(seconds) = rpc.flood_wait_seconds() {
            return Self::FloodWait { seconds, rpc };
        }
        if rpc.is_banned() {
            return Self::AccountBanned(rpc);
        }
        if rpc.is_unauthorized() {
            return Self::AuthRequired;
        }
        Self::Collaborator(InvocationError::Rpc(rpc))
    }
}

impl Error {
    /// The backend's machine-readable code behind this error, if any.
    pub fn code(&self) -> Option<String> {
        match self {
            Self::FloodWait { rpc, .. } | Self::AccountBanned(rpc) => Some(rpc.raw_name()),
            Self::Collaborator(e) => e.rpc().map(RpcError::raw_name),
            _ => None,
        }
    }

    /// `true` when retrying the same call later can succeed without operator
    /// intervention.
    pub fn is_retryable(&self) -> bool {
        matches!(self,
            Self::RateLimited { .. } | Self::FloodWait { .. } | Self::InvalidCode)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_suffix_is_split_off() {
        let e = RpcError::from_telegram(420, "FLOOD_WAIT_30");
        assert_eq!(e.name, "FLOOD_WAIT");
        assert_eq!(e.value, Some(30));
        assert_eq!(e.flood_wait_seconds(), Some(30));
        assert_eq!(e.raw_name(), "FLOOD_WAIT_30");
    }

    #[test]
    fn flood_wait_without_number_falls_back() {
        let e = RpcError::from_telegram(420, "FLOOD_WAIT_X");
        assert_eq!(e.flood_wait_seconds(), Some(FLOOD_WAIT_FALLBACK_SECS));
        let e = RpcError::from_telegram(420, "FLOOD_WAIT");
        assert_eq!(e.flood_wait_seconds(), Some(60));
    }

    #[test]
    fn wildcard_matching() {
        let e = RpcError::from_telegram(400, "PHONE_CODE_EXPIRED");
        assert!(e.is("PHONE_CODE_*"));
        assert!(e.is("*_EXPIRED"));
        assert!(!e.is("PHONE_CODE"));
        assert_eq!(e.flood_wait_seconds(), None);
    }

    #[test]
    fn classification() {
        let flood = Error::from(InvocationError::Rpc(RpcError::from_telegram(420, "FLOOD_WAIT_12")));
        assert!(matches!(flood, Error::FloodWait { seconds: 12, .. }));
        assert_eq!(flood.code().as_deref(), Some("FLOOD_WAIT_12"));

        let ban = Error::from(InvocationError::Rpc(RpcError::from_telegram(403, "USER_DEACTIVATED_BAN")));
        assert!(matches!(ban, Error::AccountBanned(_)));

        let unreg = Error::from(InvocationError::Rpc(RpcError::from_telegram(401, "AUTH_KEY_UNREGISTERED")));
        assert!(matches!(unreg, Error::AuthRequired));

        let other = Error::from(InvocationError::Rpc(RpcError::from_telegram(400, "PEER_ID_INVALID")));
        assert_eq!(other.code().as_deref(), Some("PEER_ID_INVALID"));
        assert!(!other.is_retryable());
    }
}
