//! The RPC boundary.
//!
//! Everything below [`Transport::call`] (handshake, encryption, framing,
//! serialization) belongs to the collaborator. The core only speaks the
//! typed [`Request`] / [`Response`] pairs defined here.

use async_trait::async_trait;

use crate::errors::InvocationError;
use crate::profile::Profile;

// ─── Peer ─────────────────────────────────────────────────────────────────────

/// A routable chat reference, as returned by username resolution.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Peer {
    /// The logged-in account itself (Saved Messages).
    SelfUser,
    User    { id: i64, access_hash: i64 },
    Chat    { id: i64 },
    Channel { id: i64, access_hash: i64 },
}

impl Peer {
    pub fn id(&self) -> i64 {
        match self {
            Self::SelfUser                 => 0,
            Self::User { id, .. }
            | Self::Chat { id }
            | Self::Channel { id, .. }     => *id,
        }
    }
}

// ─── Account ──────────────────────────────────────────────────────────────────

/// The logged-in user, as reported by the identity probe or sign-in.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Account {
    pub id:         i64,
    pub first_name: Option<String>,
    pub last_name:  Option<String>,
    pub username:   Option<String>,
}

impl Account {
    /// "First Last", falling back to `@username`, then `(unknown)`.
    pub fn display_name(&self) -> String {
        let name = format!("{} {}",
            self.first_name.as_deref().unwrap_or(""),
            self.last_name.as_deref().unwrap_or(""))
            .trim().to_string();
        if !name.is_empty() {
            return name;
        }
        match &self.username {
            Some(u) => format!("@{u}"),
            None    => "(unknown)".into(),
        }
    }
}

// ─── Messages ─────────────────────────────────────────────────────────────────

/// Chat action shown to the other side.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatAction {
    Typing,
    Cancel,
}

/// A fully parameterized outgoing text message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub peer:       Peer,
    pub text:       String,
    pub no_webpage: bool,
    pub silent:     bool,
    /// Client-chosen correlation id; the backend deduplicates on it.
    pub random_id:  i64,
}

/// What the backend reports back for a delivered message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentMessage {
    pub id:   i32,
    /// Unix timestamp assigned by the backend.
    pub date: i64,
}

// ─── Request / Response ───────────────────────────────────────────────────────

/// Every call the core makes across the RPC boundary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Request {
    /// Announce the client fingerprint. Sent once per process before any
    /// other call.
    InitConnection { api_id: i32, profile: Profile },
    /// Identity probe for the current session.
    GetMe,
    SendCode       { phone: String, api_id: i32, api_hash: String },
    SignIn         { phone: String, phone_code_hash: String, code: String },
    /// Second factor. The SRP proof is computed by the collaborator.
    CheckPassword  { password: String },
    LogOut,
    ResolveUsername { username: String },
    SetTyping      { peer: Peer, action: ChatAction },
    SendMessage(OutgoingMessage),
}

impl Request {
    /// Backend method name, for logs and stubs.
    pub fn method(&self) -> &'static str {
        match self {
            Self::InitConnection { .. }  => "initConnection",
            Self::GetMe                  => "users.getUsers",
            Self::SendCode { .. }        => "auth.sendCode",
            Self::SignIn { .. }          => "auth.signIn",
            Self::CheckPassword { .. }   => "auth.checkPassword",
            Self::LogOut                 => "auth.logOut",
            Self::ResolveUsername { .. } => "contacts.resolveUsername",
            Self::SetTyping { .. }       => "messages.setTyping",
            Self::SendMessage(_)         => "messages.sendMessage",
        }
    }
}

/// Typed results. Each request expects exactly one variant back.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Response {
    /// Acknowledged with no payload (`InitConnection`, `SetTyping`, `LogOut`).
    Done,
    /// `GetMe`.
    User(Account),
    /// `SendCode`.
    SentCode { phone_code_hash: String },
    /// `SignIn` / `CheckPassword` success.
    Authorization(Account),
    /// `SignIn` for a phone number with no account.
    SignUpRequired,
    /// `ResolveUsername`. `None` when the name maps to nothing.
    ResolvedPeer(Option<Peer>),
    /// `SendMessage`.
    Sent(SentMessage),
}

// ─── Transport ────────────────────────────────────────────────────────────────

/// The protocol collaborator. Implementations own the connection and any
/// session material they keep in a [`crate::SessionStore`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn call(&self, request: Request) -> Result<Response, InvocationError>;
}
