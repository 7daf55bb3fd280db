//! Login lifecycle: `Unauthenticated → CodeSent → Authenticated`.
//!
//! Transitions are serialized by an async mutex held across the backend
//! call, so two concurrent `request_code`/`sign_in` calls run one after the
//! other and the second sees the first one's outcome. The observable state
//! lives behind a separate sync lock written once per transition, which
//! keeps [`Authenticator::state`] non-blocking and never torn. After
//! [`Authenticator::close`] no transition lands, even one whose backend call
//! was already in flight.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::errors::{Error, InvocationError};
use crate::profile::Profile;
use crate::transport::{Account, Request, Response, Transport};

// ─── SessionState ─────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum SessionState {
    Unauthenticated,
    CodeSent,
    Authenticated,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unauthenticated => "unauthenticated",
            Self::CodeSent        => "waiting for the login code",
            Self::Authenticated   => "authenticated",
        })
    }
}

// ─── Tokens ───────────────────────────────────────────────────────────────────

/// Handle returned by [`Authenticator::request_code`]; pass it back to
/// [`Authenticator::sign_in`] with the received code.
///
/// An outer layer can hand the parts to a remote caller and rebuild the
/// handle with [`LoginToken::new`] on the way back.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoginToken {
    phone:           String,
    phone_code_hash: String,
}

impl LoginToken {
    pub fn new(phone: impl Into<String>, phone_code_hash: impl Into<String>) -> Self {
        Self { phone: phone.into(), phone_code_hash: phone_code_hash.into() }
    }

    pub fn phone(&self) -> &str { &self.phone }

    pub fn phone_code_hash(&self) -> &str { &self.phone_code_hash }
}

/// 2FA challenge returned in [`SignInOutcome::PasswordRequired`].
///
/// Pass to [`Authenticator::check_password`] together with the password.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PasswordToken {
    phone: String,
}

impl PasswordToken {
    pub fn phone(&self) -> &str { &self.phone }
}

/// Successful results of [`Authenticator::sign_in`].
#[derive(Debug)]
pub enum SignInOutcome {
    SignedIn(Account),
    /// The account has a second factor. State stays `CodeSent`.
    PasswordRequired(PasswordToken),
}

// ─── AuthState ────────────────────────────────────────────────────────────────

/// Outstanding code request. Only exists inside [`AuthState::CodeSent`].
#[derive(Clone, Debug)]
pub struct PendingVerification {
    pub phone:           String,
    pub phone_code_hash: String,
    pub requested_at:    DateTime<Utc>,
}

#[derive(Clone, Debug)]
enum AuthState {
    Unauthenticated,
    CodeSent(PendingVerification),
    Authenticated(Account),
}

impl AuthState {
    fn kind(&self) -> SessionState {
        match self {
            Self::Unauthenticated  => SessionState::Unauthenticated,
            Self::CodeSent(_)      => SessionState::CodeSent,
            Self::Authenticated(_) => SessionState::Authenticated,
        }
    }
}

// ─── Authenticator ────────────────────────────────────────────────────────────

pub struct Authenticator {
    transport: Arc<dyn Transport>,
    api_id:    i32,
    api_hash:  String,
    profile:   Profile,
    connected: AtomicBool,
    closed:    AtomicBool,
    op:        Mutex<()>,
    state:     RwLock<AuthState>,
}

impl Authenticator {
    pub fn new(transport: Arc<dyn Transport>, api_id: i32, api_hash: String, profile: Profile) -> Self {
        Self {
            transport,
            api_id,
            api_hash,
            profile,
            connected: AtomicBool::new(false),
            closed:    AtomicBool::new(false),
            op:        Mutex::new(()),
            state:     RwLock::new(AuthState::Unauthenticated),
        }
    }

    pub fn state(&self) -> SessionState {
        self.read().kind()
    }

    pub fn account(&self) -> Option<Account> {
        match &*self.read() {
            AuthState::Authenticated(a) => Some(a.clone()),
            _ => None,
        }
    }

    pub fn pending(&self) -> Option<PendingVerification> {
        match &*self.read() {
            AuthState::CodeSent(p) => Some(p.clone()),
            _ => None,
        }
    }

    // ── Probe ──────────────────────────────────────────────────────────────

    /// Check whether the transport already holds a valid session.
    ///
    /// Returns [`Error::AuthRequired`] (state untouched) when it does not.
    pub async fn initialize(&self) -> Result<Account, Error> {
        let _op = self.op.lock().await;
        if let AuthState::Authenticated(a) = &*self.read() {
            return Ok(a.clone());
        }
        self.ensure_connection().await?;

        match self.transport.call(Request::GetMe).await {
            Ok(Response::User(account)) => {
                tracing::info!("[courier] Session restored ✓  ({})", account.display_name());
                self.set(AuthState::Authenticated(account.clone()))?;
                Ok(account)
            }
            Ok(_) => Err(InvocationError::UnexpectedResponse("users.getUsers").into()),
            Err(e) => {
                let e = Error::from(e);
                if matches!(e, Error::AuthRequired) {
                    tracing::info!("[courier] No active session, login required");
                }
                Err(e)
            }
        }
    }

    // ── Login ──────────────────────────────────────────────────────────────

    /// Ask the backend to send a login code. Calling it again while a code
    /// is pending re-sends and replaces the pending verification.
    pub async fn request_code(&self, phone: &str) -> Result<LoginToken, Error> {
        let _op = self.op.lock().await;
        let state = self.state();
        if state == SessionState::Authenticated {
            return Err(Error::InvalidState { operation: "request_code", state });
        }
        self.ensure_connection().await?;

        let phone = phone.trim().to_string();
        let req = Request::SendCode {
            phone:    phone.clone(),
            api_id:   self.api_id,
            api_hash: self.api_hash.clone(),
        };
        let phone_code_hash = match self.transport.call(req).await? {
            Response::SentCode { phone_code_hash } => phone_code_hash,
            _ => return Err(InvocationError::UnexpectedResponse("auth.sendCode").into()),
        };

        self.set(AuthState::CodeSent(PendingVerification {
            phone:           phone.clone(),
            phone_code_hash: phone_code_hash.clone(),
            requested_at:    Utc::now(),
        }))?;
        tracing::info!("[courier] Login code sent");
        Ok(LoginToken { phone, phone_code_hash })
    }

    /// Complete sign-in with the code sent to the phone.
    pub async fn sign_in(&self, phone: &str, token: &LoginToken, code: &str) -> Result<SignInOutcome, Error> {
        let _op = self.op.lock().await;
        let pending = self.pending_for("sign_in")?;

        let phone = phone.trim();
        if pending.phone != phone
            || token.phone != pending.phone
            || token.phone_code_hash != pending.phone_code_hash
        {
            tracing::debug!("[courier] sign_in handle does not match the pending request");
            return Err(Error::InvalidCode);
        }

        let req = Request::SignIn {
            phone:           pending.phone.clone(),
            phone_code_hash: pending.phone_code_hash.clone(),
            code:            code.trim().to_string(),
        };
        match self.transport.call(req).await {
            Ok(Response::Authorization(account)) => {
                tracing::info!("[courier] Signed in ✓  Welcome, {}!", account.display_name());
                self.set(AuthState::Authenticated(account.clone()))?;
                Ok(SignInOutcome::SignedIn(account))
            }
            Ok(Response::SignUpRequired) => Err(Error::SignUpRequired),
            Ok(_) => Err(InvocationError::UnexpectedResponse("auth.signIn").into()),
            Err(e) if e.is("SESSION_PASSWORD_NEEDED") => {
                tracing::info!("[courier] 2FA password required");
                Ok(SignInOutcome::PasswordRequired(PasswordToken { phone: pending.phone }))
            }
            Err(e) if e.is("PHONE_CODE_EXPIRED") => Err(Error::CodeExpired),
            Err(e) if e.is("PHONE_CODE_*")       => Err(Error::InvalidCode),
            Err(e) => Err(e.into()),
        }
    }

    /// Complete 2FA login. The collaborator derives the SRP proof.
    pub async fn check_password(&self, token: &PasswordToken, password: &str) -> Result<Account, Error> {
        let _op = self.op.lock().await;
        let pending = self.pending_for("check_password")?;
        if token.phone != pending.phone {
            tracing::debug!("[courier] check_password token does not match the pending request");
            return Err(Error::InvalidPassword);
        }

        let req = Request::CheckPassword { password: password.to_string() };
        match self.transport.call(req).await {
            Ok(Response::Authorization(account)) => {
                tracing::info!("[courier] 2FA ✓  Welcome, {}!", account.display_name());
                self.set(AuthState::Authenticated(account.clone()))?;
                Ok(account)
            }
            Ok(_) => Err(InvocationError::UnexpectedResponse("auth.checkPassword").into()),
            Err(e) if e.is("PASSWORD_HASH_INVALID") => Err(Error::InvalidPassword),
            Err(e) => Err(e.into()),
        }
    }

    /// Log out. Returns `false` if the backend had already forgotten the
    /// session; the local state ends up `Unauthenticated` either way.
    pub async fn sign_out(&self) -> Result<bool, Error> {
        let _op = self.op.lock().await;
        let known = match self.transport.call(Request::LogOut).await {
            Ok(_) => true,
            Err(InvocationError::Rpc(e)) if e.is_unauthorized() => false,
            Err(e) => return Err(e.into()),
        };
        self.set(AuthState::Unauthenticated)?;
        tracing::info!("[courier] Signed out ✓");
        Ok(known)
    }

    /// The backend revoked the session mid-flight. Drop back to
    /// `Unauthenticated` so the next dispatch probes again.
    pub fn session_lost(&self) {
        let mut state = self.write();
        if matches!(*state, AuthState::Authenticated(_)) {
            tracing::warn!("[courier] Session revoked by the backend");
            *state = AuthState::Unauthenticated;
        }
    }

    /// Forget everything and refuse later transitions. Used on shutdown.
    pub fn close(&self) {
        let mut state = self.write();
        self.closed.store(true, Ordering::Release);
        *state = AuthState::Unauthenticated;
        self.connected.store(false, Ordering::Release);
    }

    // ── Internals ──────────────────────────────────────────────────────────

    async fn ensure_connection(&self) -> Result<(), Error> {
        if self.connected.load(Ordering::Acquire) {
            return Ok(());
        }
        let req = Request::InitConnection { api_id: self.api_id, profile: self.profile.clone() };
        self.transport.call(req).await?;
        tracing::info!(
            "[courier] initConnection ✓  ({}, {}, app {})",
            self.profile.device_model, self.profile.system_version, self.profile.app_version,
        );
        self.connected.store(true, Ordering::Release);
        Ok(())
    }

    fn pending_for(&self, operation: &'static str) -> Result<PendingVerification, Error> {
        match &*self.read() {
            AuthState::CodeSent(p) => Ok(p.clone()),
            other => Err(Error::InvalidState { operation, state: other.kind() }),
        }
    }

    /// Publish a transition. Checked under the state lock, so nothing
    /// lands after [`close`](Self::close).
    fn set(&self, next: AuthState) -> Result<(), Error> {
        let mut state = self.write();
        if self.closed.load(Ordering::Acquire) {
            tracing::debug!("[courier] auth: dropping {} after shutdown", next.kind());
            return Err(Error::ShuttingDown);
        }
        tracing::debug!("[courier] auth: {} → {}", state.kind(), next.kind());
        *state = next;
        Ok(())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, AuthState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, AuthState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}
