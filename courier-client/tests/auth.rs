mod common;

use std::time::Duration;

use common::*;
use courier_client::{Error, LoginToken, Request, Response, SessionState, SignInOutcome};

#[tokio::test]
async fn initialize_without_session_requires_auth() {
    let t = StubTransport::fresh();
    let c = courier(t.clone());

    let err = c.initialize().await.unwrap_err();
    assert!(matches!(err, Error::AuthRequired), "{err:?}");
    assert_eq!(c.status().state, SessionState::Unauthenticated);
    assert_eq!(t.methods(), ["initConnection", "users.getUsers"]);

    match &t.calls()[0] {
        Request::InitConnection { api_id, profile } => {
            assert_eq!(*api_id, 1);
            assert_eq!(profile, c.profile());
        }
        other => panic!("expected initConnection, got {other:?}"),
    }
}

#[tokio::test]
async fn initialize_restores_session_once() {
    let t = StubTransport::signed_in();
    let c = courier(t.clone());

    let (a, b) = tokio::join!(c.initialize(), c.initialize());
    assert_eq!(a.unwrap(), owner());
    assert_eq!(b.unwrap(), owner());
    assert_eq!(t.count("users.getUsers"), 1);
    assert_eq!(t.count("initConnection"), 1);

    let status = c.status();
    assert_eq!(status.state, SessionState::Authenticated);
    assert_eq!(status.account, Some(owner()));
}

#[tokio::test]
async fn other_probe_failures_propagate() {
    let t = StubTransport::new(|req| match req {
        Request::GetMe => Err(rpc(500, "INTERNAL_SERVER_ERROR")),
        _ => Ok(Response::Done),
    });
    let c = courier(t);
    let err = c.initialize().await.unwrap_err();
    assert_eq!(err.code().as_deref(), Some("INTERNAL_SERVER_ERROR"));
    assert_eq!(c.status().state, SessionState::Unauthenticated);
}

#[tokio::test]
async fn sign_in_requires_a_pending_code() {
    let t = StubTransport::fresh();
    let c = courier(t.clone());
    let token = LoginToken::new("+100", "hash-1");

    let err = c.sign_in("+100", &token, "12345").await.unwrap_err();
    assert!(matches!(err, Error::InvalidState { state: SessionState::Unauthenticated, .. }));
    assert!(t.calls().is_empty());
    assert_eq!(c.status().state, SessionState::Unauthenticated);
}

#[tokio::test]
async fn sign_in_rejected_once_authenticated() {
    let t = StubTransport::signed_in();
    let c = courier(t.clone());
    c.initialize().await.unwrap();
    let before = t.calls().len();

    let token = LoginToken::new("+100", "hash-1");
    let err = c.sign_in("+100", &token, "12345").await.unwrap_err();
    assert!(matches!(err, Error::InvalidState { state: SessionState::Authenticated, .. }));
    assert_eq!(t.calls().len(), before);

    let err = c.request_code("+100").await.unwrap_err();
    assert!(matches!(err, Error::InvalidState { .. }));
    assert_eq!(c.status().state, SessionState::Authenticated);
}

#[tokio::test]
async fn mismatched_handle_is_an_invalid_code() {
    let t = StubTransport::fresh();
    let c = courier(t.clone());

    let token = c.request_code("+100").await.unwrap();
    assert_eq!(token.phone_code_hash(), "hash-1");
    assert_eq!(c.status().state, SessionState::CodeSent);

    let forged = LoginToken::new("+100", "some-other-hash");
    let err = c.sign_in("+100", &forged, "12345").await.unwrap_err();
    assert!(matches!(err, Error::InvalidCode));
    assert_eq!(c.status().state, SessionState::CodeSent);
    assert_eq!(t.count("auth.signIn"), 0);
}

#[tokio::test]
async fn wrong_code_then_right_code() {
    let t = StubTransport::fresh();
    let c = courier(t.clone());
    let token = c.request_code(" +100 ").await.unwrap();
    assert_eq!(token.phone(), "+100");

    let err = c.sign_in("+100", &token, "00000").await.unwrap_err();
    assert!(matches!(err, Error::InvalidCode));
    assert!(err.is_retryable());
    assert_eq!(c.status().state, SessionState::CodeSent);

    match c.sign_in("+100", &token, "12345").await.unwrap() {
        SignInOutcome::SignedIn(a) => assert_eq!(a, owner()),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(c.status().state, SessionState::Authenticated);
}

#[tokio::test]
async fn expired_code_stays_code_sent_and_can_resend() {
    let t = StubTransport::new(|req| match req {
        Request::SignIn { .. } => Err(rpc(400, "PHONE_CODE_EXPIRED")),
        Request::SendCode { .. } => Ok(Response::SentCode { phone_code_hash: "hash-1".into() }),
        _ => Ok(Response::Done),
    });
    let c = courier(t.clone());
    let token = c.request_code("+100").await.unwrap();

    let err = c.sign_in("+100", &token, "12345").await.unwrap_err();
    assert!(matches!(err, Error::CodeExpired));
    assert_eq!(c.status().state, SessionState::CodeSent);

    c.request_code("+100").await.unwrap();
    assert_eq!(t.count("auth.sendCode"), 2);
    assert_eq!(c.status().state, SessionState::CodeSent);
}

#[tokio::test]
async fn two_factor_branch() {
    let base = backend(false);
    let t = StubTransport::new(move |req| match req {
        Request::SignIn { .. } => Err(rpc(401, "SESSION_PASSWORD_NEEDED")),
        Request::CheckPassword { password } if password == "hunter2" => Ok(Response::Authorization(owner())),
        other => base(other),
    });
    let c = courier(t.clone());
    let token = c.request_code("+100").await.unwrap();

    let pw = match c.sign_in("+100", &token, "12345").await.unwrap() {
        SignInOutcome::PasswordRequired(pw) => pw,
        other => panic!("expected 2FA, got {other:?}"),
    };
    assert_eq!(pw.phone(), "+100");
    assert_eq!(c.status().state, SessionState::CodeSent);

    let err = c.check_password(&pw, "wrong").await.unwrap_err();
    assert!(matches!(err, Error::InvalidPassword));
    assert_eq!(c.status().state, SessionState::CodeSent);

    let account = c.check_password(&pw, "hunter2").await.unwrap();
    assert_eq!(account, owner());
    assert_eq!(c.status().state, SessionState::Authenticated);
}

#[tokio::test]
async fn sign_up_required_is_classified() {
    let t = StubTransport::new(|req| match req {
        Request::SendCode { .. } => Ok(Response::SentCode { phone_code_hash: "h".into() }),
        Request::SignIn { .. } => Ok(Response::SignUpRequired),
        _ => Ok(Response::Done),
    });
    let c = courier(t);
    let token = c.request_code("+100").await.unwrap();
    let err = c.sign_in("+100", &token, "1").await.unwrap_err();
    assert!(matches!(err, Error::SignUpRequired));
}

#[tokio::test]
async fn sign_out_returns_to_unauthenticated() {
    let t = StubTransport::signed_in();
    let c = courier(t.clone());
    c.initialize().await.unwrap();

    assert!(c.sign_out().await.unwrap());
    assert_eq!(c.status().state, SessionState::Unauthenticated);
    assert_eq!(c.status().account, None);
}

#[tokio::test]
async fn password_token_for_another_phone_is_rejected() {
    let base = backend(false);
    let t = StubTransport::new(move |req| match req {
        Request::SignIn { .. } => Err(rpc(401, "SESSION_PASSWORD_NEEDED")),
        other => base(other),
    });
    let c = courier(t.clone());
    let token = c.request_code("+100").await.unwrap();
    let pw = match c.sign_in("+100", &token, "12345").await.unwrap() {
        SignInOutcome::PasswordRequired(pw) => pw,
        other => panic!("expected 2FA, got {other:?}"),
    };

    // A resend for another number replaces the pending request.
    c.request_code("+200").await.unwrap();
    let err = c.check_password(&pw, "hunter2").await.unwrap_err();
    assert!(matches!(err, Error::InvalidPassword), "{err:?}");
    assert_eq!(t.count("auth.checkPassword"), 0);
    assert_eq!(c.status().state, SessionState::CodeSent);
}

#[tokio::test(start_paused = true)]
async fn resend_and_sign_in_are_serialized() {
    let t = StubTransport::fresh();
    let c = courier(t.clone());
    let token = c.request_code("+100").await.unwrap();

    // The resend holds the transition while its backend call is slow; the
    // sign-in queued behind it sees the refreshed pending request.
    t.delay("auth.sendCode", Duration::from_secs(1));
    let (resent, signed) = tokio::join!(
        c.request_code("+100"),
        c.sign_in("+100", &token, "12345"),
    );
    assert_eq!(resent.unwrap(), token);
    assert!(matches!(signed.unwrap(), SignInOutcome::SignedIn(_)));
    assert_eq!(c.status().state, SessionState::Authenticated);
}

#[tokio::test(start_paused = true)]
async fn request_code_queued_behind_sign_in_is_rejected() {
    let t = StubTransport::fresh();
    let c = courier(t.clone());
    let token = c.request_code("+100").await.unwrap();

    t.delay("auth.signIn", Duration::from_secs(1));
    let (signed, resent) = tokio::join!(
        c.sign_in("+100", &token, "12345"),
        c.request_code("+100"),
    );
    assert!(matches!(signed.unwrap(), SignInOutcome::SignedIn(_)));
    assert!(matches!(resent.unwrap_err(), Error::InvalidState { state: SessionState::Authenticated, .. }));
    assert_eq!(c.status().state, SessionState::Authenticated);
    assert_eq!(t.count("auth.sendCode"), 1);
}

#[tokio::test(start_paused = true)]
async fn shutdown_during_sign_in_lands_nothing() {
    let t = StubTransport::fresh();
    let c = courier(t.clone());
    let token = c.request_code("+100").await.unwrap();
    t.delay("auth.signIn", Duration::from_secs(1));

    let task = {
        let c = c.clone();
        tokio::spawn(async move { c.sign_in("+100", &token, "12345").await })
    };
    for _ in 0..100 {
        if t.count("auth.signIn") > 0 {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(t.count("auth.signIn"), 1);

    c.shutdown();
    let err = task.await.unwrap().unwrap_err();
    assert!(matches!(err, Error::ShuttingDown), "{err:?}");
    let status = c.status();
    assert_eq!(status.state, SessionState::Unauthenticated);
    assert_eq!(status.account, None);
}
