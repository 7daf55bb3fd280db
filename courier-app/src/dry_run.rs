//! Offline backend: logs every call and answers like a cooperative server.
//!
//! Login state lives in the courier's [`SessionStore`], the same way a real
//! transport keeps its auth key there. With the in-memory store `shutdown`
//! logs it out; with `sqlite-session` the login survives a restart.

use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};

use async_trait::async_trait;
use courier_client::{
    Account, InvocationError, Peer, Request, Response, RpcError, SentMessage, SessionStore, Transport,
};

const AUTH_KEY: &str = "dry_run.auth_key";
const PHONE:    &str = "dry_run.phone";

pub struct DryRunTransport {
    store:    Arc<dyn SessionStore>,
    code:     String,
    password: Option<String>,
    next_id:  AtomicI32,
}

impl DryRunTransport {
    pub fn new(store: Arc<dyn SessionStore>, code: String, password: Option<String>) -> Self {
        Self { store, code, password, next_id: AtomicI32::new(1) }
    }

    fn account(&self) -> Result<Account, InvocationError> {
        let phone = self.store.get(PHONE)?.unwrap_or_default();
        Ok(Account {
            id:         stable_id(&phone),
            first_name: Some("Dry".into()),
            last_name:  Some("Run".into()),
            username:   None,
        })
    }

    fn authorize(&self) -> Result<Response, InvocationError> {
        let key = format!("{:016x}", stable_id(&self.store.get(PHONE)?.unwrap_or_default()));
        self.store.set(AUTH_KEY, &key)?;
        Ok(Response::Authorization(self.account()?))
    }

    fn logged_in(&self) -> Result<bool, InvocationError> {
        Ok(self.store.get(AUTH_KEY)?.is_some())
    }
}

fn err(code: i32, name: &str) -> InvocationError {
    InvocationError::Rpc(RpcError::from_telegram(code, name))
}

/// FNV-1a, so the same username always resolves to the same id.
fn stable_id(s: &str) -> i64 {
    let mut h: u64 = 0xcbf2_9ce4_8422_2325;
    for b in s.bytes() {
        h ^= u64::from(b);
        h = h.wrapping_mul(0x0100_0000_01b3);
    }
    (h >> 1) as i64
}

fn valid_username(name: &str) -> bool {
    name.len() >= 4
        && name.len() <= 32
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[async_trait]
impl Transport for DryRunTransport {
    async fn call(&self, request: Request) -> Result<Response, InvocationError> {
        tracing::info!("[dry-run] → {}", request.method());
        match request {
            Request::InitConnection { profile, .. } => {
                tracing::debug!("[dry-run] client: {profile:?}");
                Ok(Response::Done)
            }
            Request::GetMe => {
                if self.logged_in()? { Ok(Response::User(self.account()?)) }
                else { Err(err(401, "AUTH_KEY_UNREGISTERED")) }
            }
            Request::SendCode { phone, .. } => {
                if !phone.starts_with('+') || phone.len() < 8 {
                    return Err(err(400, "PHONE_NUMBER_INVALID"));
                }
                self.store.set(PHONE, &phone)?;
                Ok(Response::SentCode { phone_code_hash: format!("{:x}", stable_id(&phone)) })
            }
            Request::SignIn { code, .. } => {
                if code != self.code {
                    return Err(err(400, "PHONE_CODE_INVALID"));
                }
                if self.password.is_some() {
                    return Err(err(401, "SESSION_PASSWORD_NEEDED"));
                }
                self.authorize()
            }
            Request::CheckPassword { password } => {
                if self.password.as_deref() != Some(password.as_str()) {
                    return Err(err(400, "PASSWORD_HASH_INVALID"));
                }
                self.authorize()
            }
            Request::LogOut => {
                let known = self.logged_in()?;
                self.store.delete(AUTH_KEY)?;
                if known { Ok(Response::Done) } else { Err(err(401, "AUTH_KEY_UNREGISTERED")) }
            }
            Request::ResolveUsername { username } => {
                if !valid_username(&username) {
                    return Err(err(400, "USERNAME_INVALID"));
                }
                let id = stable_id(&username);
                Ok(Response::ResolvedPeer(Some(Peer::User { id, access_hash: id.rotate_left(17) })))
            }
            Request::SetTyping { peer, action } => {
                tracing::info!("[dry-run]   {action:?} → {}", peer.id());
                Ok(Response::Done)
            }
            Request::SendMessage(msg) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                tracing::info!(
                    "[dry-run]   #{id} → {} (silent={}, no_webpage={}): {}",
                    msg.peer.id(), msg.silent, msg.no_webpage, msg.text,
                );
                Ok(Response::Sent(SentMessage { id, date: chrono::Utc::now().timestamp() }))
            }
        }
    }
}
