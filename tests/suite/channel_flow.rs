//! Refresh coordinator driving the channel manager, the way the binary
//! wires them: rotation events re-handshake with the new token, a forced
//! logout tears the channel down.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use wiremock::MockServer;

use tether_auth::{AuthEvent, CredentialStore, RefreshCoordinator, RefreshError, build_http_client};
use tether_channel::memory::memory_transport;
use tether_channel::{ChannelHandle, ChannelManager, ReconnectPolicy, TokenSource};
use tether_types::ConnectionState;
use tether_types::wire::ClientMessage;

use crate::common::{mount_refresh_ok, mount_refresh_rejected, stale_session};

fn store_tokens(store: &Arc<CredentialStore>) -> Arc<dyn TokenSource> {
    let store = Arc::clone(store);
    Arc::new(move || store.get().map(|credential| credential.access_token))
}

fn coordinator(
    server_uri: &str,
    store: &Arc<CredentialStore>,
) -> (RefreshCoordinator, mpsc::UnboundedReceiver<AuthEvent>) {
    let http = build_http_client(Duration::from_secs(5)).expect("client builds");
    RefreshCoordinator::new(http, server_uri, Arc::clone(store))
}

async fn wait_for_state(handle: &ChannelHandle, wanted: ConnectionState) {
    let mut status = handle.status();
    tokio::time::timeout(
        Duration::from_secs(5),
        status.wait_for(|state| *state == wanted),
    )
    .await
    .expect("state not reached in time")
    .expect("channel task gone");
}

#[tokio::test]
async fn rotation_after_refresh_reconnects_with_the_new_token() {
    let server = MockServer::start().await;
    mount_refresh_ok(&server, "acc-2", 1).await;

    let store = Arc::new(CredentialStore::in_memory());
    store.set_session(stale_session("acc-stale", "ref-1")).unwrap();
    let (coordinator, mut auth_events) = coordinator(&server.uri(), &store);

    let (transport, mut control) = memory_transport();
    let (manager, _collaborators) = ChannelManager::new(
        Arc::new(transport),
        "mem://channel",
        store_tokens(&store),
        ReconnectPolicy::default(),
    );
    let handle = manager.spawn();
    handle.connect();

    let mut session = control.accepted().await.unwrap();
    assert_eq!(session.token, "acc-stale");
    assert_eq!(
        session.sent().await,
        Some(ClientMessage::RequestInitialNotifications)
    );
    wait_for_state(&handle, ConnectionState::Connected).await;

    assert_eq!(coordinator.fresh_access_token().await.unwrap(), "acc-2");
    assert_eq!(auth_events.recv().await, Some(AuthEvent::CredentialRotated));
    handle.credential_rotated();

    let replacement = control.accepted().await.unwrap();
    assert_eq!(replacement.token, "acc-2");
    wait_for_state(&handle, ConnectionState::Connected).await;
}

// The watch command issues no HTTP traffic of its own, so nothing would
// ever trip the interceptor on its behalf; the binary renews an expired
// credential up front and must therefore handshake with the fresh token,
// not burn reconnect attempts on the stale one.
#[tokio::test]
async fn expired_session_is_renewed_before_the_first_handshake() {
    let server = MockServer::start().await;
    mount_refresh_ok(&server, "acc-2", 1).await;

    let store = Arc::new(CredentialStore::in_memory());
    store.set_session(stale_session("acc-stale", "ref-1")).unwrap();
    let (coordinator, mut auth_events) = coordinator(&server.uri(), &store);

    if store.is_expired(chrono::Utc::now()) {
        coordinator.fresh_access_token().await.unwrap();
    }
    assert_eq!(auth_events.recv().await, Some(AuthEvent::CredentialRotated));

    let (transport, mut control) = memory_transport();
    let (manager, _collaborators) = ChannelManager::new(
        Arc::new(transport),
        "mem://channel",
        store_tokens(&store),
        ReconnectPolicy::default(),
    );
    let handle = manager.spawn();
    handle.connect();

    let session = control.accepted().await.unwrap();
    assert_eq!(session.token, "acc-2");
    wait_for_state(&handle, ConnectionState::Connected).await;
    assert_eq!(control.connect_count(), 1);

    // The rotation already happened before connect; forwarding it to the
    // channel, as the binary does, must not trigger a second handshake.
    handle.credential_rotated();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(control.connect_count(), 1);
    assert!(session.is_open());
}

#[tokio::test]
async fn forced_logout_tears_the_channel_down() {
    let server = MockServer::start().await;
    mount_refresh_rejected(&server, 401).await;

    let store = Arc::new(CredentialStore::in_memory());
    store.set_session(stale_session("acc-stale", "ref-1")).unwrap();
    let (coordinator, mut auth_events) = coordinator(&server.uri(), &store);

    let (transport, mut control) = memory_transport();
    let (manager, _collaborators) = ChannelManager::new(
        Arc::new(transport),
        "mem://channel",
        store_tokens(&store),
        ReconnectPolicy::default(),
    );
    let handle = manager.spawn();
    handle.connect();
    let _session = control.accepted().await.unwrap();
    wait_for_state(&handle, ConnectionState::Connected).await;

    assert_eq!(
        coordinator.fresh_access_token().await.unwrap_err(),
        RefreshError::Rejected { status: 401 }
    );
    assert!(matches!(
        auth_events.recv().await,
        Some(AuthEvent::ForcedLogout { .. })
    ));
    assert!(store.get().is_none());

    // The routing collaborator reacts by disconnecting, as the binary does.
    handle.disconnect();
    wait_for_state(&handle, ConnectionState::Disconnected).await;
}
