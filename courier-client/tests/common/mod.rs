#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use courier_client::{
    Account, ChatAction, Config, Courier, InvocationError, Pacing, Peer, Request, Response, RpcError,
    SentMessage, Transport,
};

type Handler = dyn Fn(&Request) -> Result<Response, InvocationError> + Send + Sync;

/// Scripted transport: answers through a closure and records every request.
pub struct StubTransport {
    handler: Box<Handler>,
    calls:   Mutex<Vec<Request>>,
    delays:  Mutex<HashMap<&'static str, Duration>>,
}

impl StubTransport {
    pub fn new(handler: impl Fn(&Request) -> Result<Response, InvocationError> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            calls:   Mutex::new(Vec::new()),
            delays:  Mutex::new(HashMap::new()),
        })
    }

    /// Make every later `method` call take `d` before answering.
    pub fn delay(&self, method: &'static str, d: Duration) {
        self.delays.lock().unwrap().insert(method, d);
    }

    /// A backend with a live session that knows `@alice` and `@bob`.
    pub fn signed_in() -> Arc<Self> {
        Self::new(backend(true))
    }

    /// A backend with no session; `12345` is the valid login code.
    pub fn fresh() -> Arc<Self> {
        Self::new(backend(false))
    }

    pub fn calls(&self) -> Vec<Request> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, method: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|r| r.method() == method).count()
    }

    pub fn methods(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().iter().map(Request::method).collect()
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn call(&self, request: Request) -> Result<Response, InvocationError> {
        self.calls.lock().unwrap().push(request.clone());
        let delay = self.delays.lock().unwrap().get(request.method()).copied();
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        (self.handler)(&request)
    }
}

pub fn rpc(code: i32, message: &str) -> InvocationError {
    InvocationError::Rpc(RpcError::from_telegram(code, message))
}

pub fn owner() -> Account {
    Account {
        id:         1000,
        first_name: Some("Owner".into()),
        last_name:  None,
        username:   Some("owner".into()),
    }
}

pub fn alice() -> Peer {
    Peer::User { id: 42, access_hash: 4242 }
}

/// Default answers for every request. `authorized` decides the identity
/// probe; `SignIn` flips nothing, each test scripts what it needs.
pub fn backend(authorized: bool) -> impl Fn(&Request) -> Result<Response, InvocationError> + Send + Sync {
    let next_id = Arc::new(AtomicI32::new(1));
    move |req: &Request| match req {
        Request::InitConnection { .. } => Ok(Response::Done),
        Request::GetMe if authorized   => Ok(Response::User(owner())),
        Request::GetMe                 => Err(rpc(401, "AUTH_KEY_UNREGISTERED")),
        Request::SendCode { .. }       => Ok(Response::SentCode { phone_code_hash: "hash-1".into() }),
        Request::SignIn { code, .. } if code == "12345" => Ok(Response::Authorization(owner())),
        Request::SignIn { .. }         => Err(rpc(400, "PHONE_CODE_INVALID")),
        Request::CheckPassword { .. }  => Err(rpc(400, "PASSWORD_HASH_INVALID")),
        Request::LogOut                => Ok(Response::Done),
        Request::ResolveUsername { username } => match username.as_str() {
            "alice" => Ok(Response::ResolvedPeer(Some(alice()))),
            "bob"   => Ok(Response::ResolvedPeer(Some(Peer::User { id: 43, access_hash: 4343 }))),
            "ghost" => Ok(Response::ResolvedPeer(None)),
            _       => Err(rpc(400, "USERNAME_NOT_OCCUPIED")),
        },
        Request::SetTyping { .. }      => Ok(Response::Done),
        Request::SendMessage(_)        => Ok(Response::Sent(SentMessage {
            id:   next_id.fetch_add(1, Ordering::SeqCst),
            date: 1_700_000_000,
        })),
    }
}

pub fn courier(transport: Arc<StubTransport>) -> Courier {
    let config = Config {
        api_id:   1,
        api_hash: "hash".into(),
        seed:     Some(7),
        ..Config::default()
    };
    Courier::new(config, transport)
}

/// Pacing with every wait at zero, for tests on a real clock.
pub fn instant_pacing() -> Pacing {
    Pacing {
        pre_send:    Duration::ZERO..=Duration::ZERO,
        post_send:   Duration::ZERO..=Duration::ZERO,
        jitter:      Duration::ZERO,
        delay_floor: Duration::ZERO,
        ..Pacing::default()
    }
}

pub fn typing_actions(calls: &[Request]) -> Vec<ChatAction> {
    calls.iter().filter_map(|r| match r {
        Request::SetTyping { action, .. } => Some(*action),
        _ => None,
    }).collect()
}
