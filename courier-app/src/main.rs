//! courier-app: interactive operator console for courier-client.
//!
//! Drives the whole dispatch pipeline (login, pacing, rate limiting)
//! against an offline dry-run backend. Configure through the environment or
//! a `.env` file:
//!
//! | Variable                   | Default |
//! |----------------------------|---------|
//! | `COURIER_API_ID`           | `0`     |
//! | `COURIER_API_HASH`         | empty   |
//! | `COURIER_SEED`             | random  |
//! | `COURIER_RATE_CEILING`     | `30`    |
//! | `COURIER_RATE_WINDOW_SECS` | `3600`  |
//! | `COURIER_DRY_RUN_CODE`     | `12345` |
//! | `COURIER_DRY_RUN_PASSWORD` | unset   |
//! | `COURIER_SESSION_DB`       | `courier.session.db` (`sqlite-session` only) |
//!
//! Run with logging:
//!   RUST_LOG=courier_client=debug,courier_app=info cargo run -p courier-app

mod dry_run;

use std::sync::Arc;
use std::time::Duration;

use courier_client::{
    Config, Courier, Error, LoginToken, PasswordToken, RateLimitConfig, SendOptions, SessionStore,
    SignInOutcome,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::OnceCell;
use tokio::task::JoinSet;

use dry_run::DryRunTransport;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("courier_client=info,courier_app=info"),
    ).init();

    if let Err(e) = run().await {
        eprintln!("\n✗ {e}");
        std::process::exit(1);
    }
}

// ─── Configuration ────────────────────────────────────────────────────────────

struct AppConfig {
    api_id:           i32,
    api_hash:         String,
    seed:             Option<u64>,
    rate_limit:       RateLimitConfig,
    dry_run_code:     String,
    dry_run_password: Option<String>,
    #[cfg_attr(not(feature = "sqlite-session"), allow(dead_code))]
    session_db:       String,
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>, BoxError>
where
    T::Err: std::fmt::Display,
{
    match env_opt(name) {
        Some(v) => v.trim().parse().map(Some).map_err(|e| format!("{name}: {e}").into()),
        None    => Ok(None),
    }
}

impl AppConfig {
    fn from_env() -> Result<Self, BoxError> {
        // Real environment variables win over `.env`.
        let _ = dotenvy::dotenv();

        let defaults = RateLimitConfig::default();
        Ok(Self {
            api_id:   env_parse("COURIER_API_ID")?.unwrap_or(0),
            api_hash: env_opt("COURIER_API_HASH").unwrap_or_default(),
            seed:     env_parse("COURIER_SEED")?,
            rate_limit: RateLimitConfig {
                max_sends: env_parse("COURIER_RATE_CEILING")?.unwrap_or(defaults.max_sends),
                window: env_parse("COURIER_RATE_WINDOW_SECS")?
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.window),
            },
            dry_run_code:     env_opt("COURIER_DRY_RUN_CODE").unwrap_or_else(|| "12345".into()),
            dry_run_password: env_opt("COURIER_DRY_RUN_PASSWORD"),
            session_db:       env_opt("COURIER_SESSION_DB").unwrap_or_else(|| "courier.session.db".into()),
        })
    }

    fn session_store(&self) -> Result<Arc<dyn SessionStore>, BoxError> {
        #[cfg(feature = "sqlite-session")]
        {
            Ok(Arc::new(courier_client::session_backend::SqliteStore::new(&self.session_db)?))
        }
        #[cfg(not(feature = "sqlite-session"))]
        {
            Ok(Arc::new(courier_client::InMemoryStore::new()))
        }
    }
}

// ─── Agent ────────────────────────────────────────────────────────────────────

/// Owns the process-wide [`Courier`], built on first use.
struct Agent {
    config:  AppConfig,
    courier: OnceCell<Courier>,
}

impl Agent {
    fn new(config: AppConfig) -> Self {
        Self { config, courier: OnceCell::new() }
    }

    async fn courier(&self) -> Result<&Courier, BoxError> {
        self.courier.get_or_try_init(|| async { self.build() }).await
    }

    fn build(&self) -> Result<Courier, BoxError> {
        let store = self.config.session_store()?;
        let transport = Arc::new(DryRunTransport::new(
            store.clone(),
            self.config.dry_run_code.clone(),
            self.config.dry_run_password.clone(),
        ));
        let config = Config {
            api_id:        self.config.api_id,
            api_hash:      self.config.api_hash.clone(),
            rate_limit:    self.config.rate_limit.clone(),
            seed:          self.config.seed,
            session_store: store,
            ..Config::default()
        };
        Ok(Courier::new(config, transport))
    }

    fn shutdown(&self) {
        if let Some(c) = self.courier.get() {
            c.shutdown();
        }
    }
}

// ─── Console ──────────────────────────────────────────────────────────────────

enum Login {
    Idle,
    AwaitingCode { phone: String, token: LoginToken },
    AwaitingPassword(PasswordToken),
}

const HELP: &str = "\
Commands:
  status                      show session state and fingerprint
  init                        probe for an existing session
  login <phone>               request a login code
  code <code>                 complete login with the received code
  password <password>         complete 2FA login
  send <target> <text>        send with typing simulation
  send! <target> <text>       send without typing simulation
  logout                      sign out
  quit                        shut down (Ctrl+C works too)";

async fn run() -> Result<(), BoxError> {
    let agent = Arc::new(Agent::new(AppConfig::from_env()?));

    match agent.courier().await?.initialize().await {
        Ok(account) => println!("✅ Already logged in as {}", account.display_name()),
        Err(Error::AuthRequired) => println!("🔑 Not logged in — use `login <phone>`"),
        Err(e) => return Err(e.into()),
    }
    println!("{HELP}\n");

    let mut login = Login::Idle;
    let mut sends = JoinSet::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => match line? {
                Some(l) => l,
                None    => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        };
        // Reap finished sends so the set does not grow forever.
        while sends.try_join_next().is_some() {}

        let line = line.trim();
        let (cmd, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();
        let courier = agent.courier().await?.clone();

        match cmd {
            "" => {}
            "help" => println!("{HELP}"),
            "quit" | "exit" => break,
            "status" => println!("{}", serde_json::to_string_pretty(&courier.status())?),
            "init" => match courier.initialize().await {
                Ok(a)  => println!("✅ Logged in as {}", a.display_name()),
                Err(e) => println!("✗ {e}"),
            },
            "login" => match courier.request_code(rest).await {
                Ok(token) => {
                    println!("📱 Code sent to {rest}");
                    login = Login::AwaitingCode { phone: rest.to_string(), token };
                }
                Err(e) => println!("✗ {e}"),
            },
            "code" => {
                let Login::AwaitingCode { phone, token } = &login else {
                    println!("✗ no login in progress — use `login <phone>` first");
                    continue;
                };
                match courier.sign_in(phone, token, rest).await {
                    Ok(SignInOutcome::SignedIn(a)) => {
                        println!("✅ Signed in as {}", a.display_name());
                        login = Login::Idle;
                    }
                    Ok(SignInOutcome::PasswordRequired(pw)) => {
                        println!("🔐 2FA enabled — use `password <password>`");
                        login = Login::AwaitingPassword(pw);
                    }
                    Err(e) => println!("✗ {e}"),
                }
            }
            "password" => {
                let Login::AwaitingPassword(pw) = &login else {
                    println!("✗ no 2FA challenge pending");
                    continue;
                };
                match courier.check_password(pw, rest).await {
                    Ok(a) => {
                        println!("✅ 2FA complete — signed in as {}", a.display_name());
                        login = Login::Idle;
                    }
                    Err(e) => println!("✗ {e}"),
                }
            }
            "send" | "send!" => {
                let Some((target, text)) = rest.split_once(' ') else {
                    println!("✗ usage: {cmd} <target> <text>");
                    continue;
                };
                let options = SendOptions { simulate_typing: cmd == "send" };
                let (target, text) = (target.to_string(), text.to_string());
                // Each dispatch runs on its own task; the console stays responsive.
                sends.spawn(async move {
                    match courier.send_message(&target, &text, &options).await {
                        Ok(r)  => println!("💬 Sent #{} to {target}", r.message_id),
                        Err(e) => match e.code() {
                            Some(code) => println!("✗ {target}: {e} [{code}]"),
                            None       => println!("✗ {target}: {e}"),
                        },
                    }
                });
            }
            "logout" => match courier.sign_out().await {
                Ok(_)  => { println!("👋 Signed out"); login = Login::Idle; }
                Err(e) => println!("✗ {e}"),
            },
            other => println!("✗ unknown command `{other}` — try `help`"),
        }
    }

    agent.shutdown();
    if !sends.is_empty() {
        println!("⏳ Waiting for {} in-flight send(s) …", sends.len());
        while sends.join_next().await.is_some() {}
    }
    println!("👋 Bye");
    Ok(())
}
