//! Tether demo CLI.
//!
//! Wires the communication layer end to end against stdout collaborators:
//! the alert and cache-invalidation receivers print what a real UI would
//! render, the connectivity indicator follows the channel's watch channel,
//! and a forced logout ends the session the way a router redirect would.
//!
//! Commands: `login <email>`, `status`, `watch`, `logout`.

use std::env;
use std::io::{self, IsTerminal, Write};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use tokio::sync::mpsc;
use tracing::warn;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use tether_auth::{ApiClient, AuthEvent, CredentialStore, RefreshCoordinator, build_http_client};
use tether_channel::{ChannelManager, Collaborators, ReconnectPolicy, TokenSource, WsTransport};
use tether_config::TetherConfig;
use tether_types::ConnectionState;

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("warn"))
        .unwrap_or_else(|_| EnvFilter::new("error"));

    // Diagnostics go to stderr; stdout is the product surface.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(env_filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = TetherConfig::load()?;
    config.validate()?;

    let mut args = env::args().skip(1);
    match args.next().as_deref() {
        Some("login") => {
            let email = args.next().context("usage: tether login <email>")?;
            login(&config, &email).await
        }
        Some("status") => status(&config),
        Some("watch") => watch(&config).await,
        Some("logout") => logout(&config).await,
        Some(other) => bail!("unknown command `{other}`\n{USAGE}"),
        None => {
            println!("{USAGE}");
            Ok(())
        }
    }
}

const USAGE: &str = "usage: tether <command>

commands:
  login <email>   sign in and store the session
  status          show the stored session
  watch           follow live notifications until Ctrl-C
  logout          end the session";

fn open_store(config: &TetherConfig) -> Arc<CredentialStore> {
    match config.session_path() {
        Some(path) => Arc::new(CredentialStore::open(path)),
        None => {
            warn!("No home directory; the session will not survive this process");
            Arc::new(CredentialStore::in_memory())
        }
    }
}

fn build_api(
    config: &TetherConfig,
    store: Arc<CredentialStore>,
) -> Result<(ApiClient, RefreshCoordinator, mpsc::UnboundedReceiver<AuthEvent>)> {
    let http = build_http_client(config.server.request_timeout())
        .context("failed to build the HTTP client")?;
    let (coordinator, auth_events) =
        RefreshCoordinator::new(http.clone(), &config.server.base_url, Arc::clone(&store));
    let api = ApiClient::new(http, &config.server.base_url, store, coordinator.clone());
    Ok((api, coordinator, auth_events))
}

async fn login(config: &TetherConfig, email: &str) -> Result<()> {
    let (api, _coordinator, _auth_events) = build_api(config, open_store(config))?;
    let password = prompt_password()?;
    let user = api
        .login(email, &password)
        .await
        .context("sign-in failed")?;
    println!("Signed in as {} <{}> ({})", user.display_name, user.email, user.role.as_str());
    Ok(())
}

fn status(config: &TetherConfig) -> Result<()> {
    let store = open_store(config);
    let Some(user) = store.current_user() else {
        println!("Not signed in.");
        return Ok(());
    };
    let credential = store.get().context("session file lost its credential")?;
    println!("Signed in as {} <{}> ({})", user.display_name, user.email, user.role.as_str());
    if store.is_expired(Utc::now()) {
        println!("Access token expired at {}; it will refresh on the next call.", credential.expires_at);
    } else {
        println!("Access token valid until {}.", credential.expires_at);
    }
    Ok(())
}

async fn logout(config: &TetherConfig) -> Result<()> {
    let (api, _coordinator, _auth_events) = build_api(config, open_store(config))?;
    api.logout().await.context("logout failed")?;
    println!("Signed out.");
    Ok(())
}

async fn watch(config: &TetherConfig) -> Result<()> {
    let store = open_store(config);
    if store.current_user().is_none() {
        bail!("not signed in; run `tether login <email>` first");
    }
    let (_api, coordinator, mut auth_events) = build_api(config, Arc::clone(&store))?;

    // Watching issues no HTTP traffic of its own, so an expired access
    // token would never trip the interceptor; renew it up front instead of
    // letting the channel spend its reconnect budget on a stale token.
    if store.is_expired(Utc::now())
        && let Err(err) = coordinator.fresh_access_token().await
    {
        bail!("session refresh failed ({err}); sign in again");
    }

    let tokens: Arc<dyn TokenSource> = {
        let store = Arc::clone(&store);
        Arc::new(move || store.get().map(|credential| credential.access_token))
    };
    let transport = Arc::new(WsTransport::new(config.server.handshake_timeout()));
    let policy = ReconnectPolicy {
        max_attempts: config.reconnect.max_attempts,
        interval: config.reconnect.interval(),
    };
    let (manager, collaborators) =
        ChannelManager::new(transport, config.server.channel_url.clone(), tokens, policy);
    let Collaborators {
        registry,
        mut alerts,
        mut invalidations,
    } = collaborators;

    let handle = manager.spawn();
    let mut status = handle.status();
    handle.connect();
    println!("Watching for notifications; Ctrl-C to stop.");

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for Ctrl-C")?;
                handle.disconnect();
                println!("Stopped.");
                return Ok(());
            }
            changed = status.changed() => {
                if changed.is_err() {
                    bail!("channel task ended unexpectedly");
                }
                let state = *status.borrow_and_update();
                println!("[connection] {}", state.as_str());
                if state == ConnectionState::Failed {
                    println!("Live updates are unavailable; everything else keeps working.");
                }
            }
            Some(alert) = alerts.recv() => {
                println!(
                    "[{}] {}: {} ({} unread)",
                    alert.severity.as_str(),
                    alert.title,
                    alert.message,
                    registry.unread_count(),
                );
            }
            Some(keys) = invalidations.recv() => {
                let keys: Vec<&str> = keys.iter().map(|key| key.as_str()).collect();
                println!("[cache] refresh {}", keys.join(", "));
            }
            Some(event) = auth_events.recv() => match event {
                AuthEvent::CredentialRotated => handle.credential_rotated(),
                AuthEvent::ForcedLogout { reason } => {
                    handle.disconnect();
                    bail!("session ended ({reason}); sign in again");
                }
            },
        }
    }
}

/// Read the password from stdin. When stdin is not a terminal (scripts,
/// tests) the prompt is skipped and the first line is taken as-is.
fn prompt_password() -> Result<String> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        print!("Password: ");
        io::stdout().flush()?;
    }
    let mut line = String::new();
    stdin
        .read_line(&mut line)
        .context("failed to read the password")?;
    let password = line.trim_end_matches(['\r', '\n']);
    if password.is_empty() {
        bail!("empty password");
    }
    Ok(password.to_owned())
}
