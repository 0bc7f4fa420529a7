//! End-to-end auth flows over a file-backed credential store.
//!
//! The per-crate tests pin the interceptor and coordinator contracts against
//! an in-memory store; these pin what the pieces guarantee together, session
//! file included.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tether_auth::{
    ApiClient, ApiError, AuthEvent, CredentialStore, RefreshCoordinator, build_http_client,
};

use crate::common::{mount_refresh_ok, mount_refresh_rejected, stale_session};

fn build_api(
    server_uri: &str,
    store: Arc<CredentialStore>,
) -> (ApiClient, mpsc::UnboundedReceiver<AuthEvent>) {
    let http = build_http_client(Duration::from_secs(5)).expect("client builds");
    let (coordinator, auth_events) =
        RefreshCoordinator::new(http.clone(), server_uri, Arc::clone(&store));
    (
        ApiClient::new(http, server_uri, store, coordinator),
        auth_events,
    )
}

async fn mount_protected(server: &MockServer, token: &str, status: u16, times: u64) {
    let template = if status == 200 {
        ResponseTemplate::new(200).set_body_json(serde_json::json!([{ "id": 7 }]))
    } else {
        ResponseTemplate::new(status)
    };
    Mock::given(method("GET"))
        .and(path("/tasks"))
        .and(header("authorization", format!("Bearer {token}").as_str()))
        .respond_with(template)
        .expect(times)
        .mount(server)
        .await;
}

#[tokio::test]
async fn renewed_credential_survives_a_restart() {
    let server = MockServer::start().await;
    mount_protected(&server, "acc-stale", 401, 1).await;
    mount_refresh_ok(&server, "acc-2", 1).await;
    mount_protected(&server, "acc-2", 200, 1).await;

    let dir = tempfile::tempdir().unwrap();
    let session_path = dir.path().join("session.json");
    let store = Arc::new(CredentialStore::open(session_path.clone()));
    store.set_session(stale_session("acc-stale", "ref-1")).unwrap();

    let (api, _auth_events) = build_api(&server.uri(), store);
    let tasks: serde_json::Value = api.get_json("/tasks").await.unwrap();
    assert_eq!(tasks[0]["id"], 7);

    // A fresh process sees the rotated token, refresh token intact.
    let reopened = CredentialStore::open(session_path);
    let credential = reopened.get().unwrap();
    assert_eq!(credential.access_token, "acc-2");
    assert_eq!(credential.refresh_token, "ref-1");
}

#[tokio::test]
async fn failed_refresh_clears_the_session_file_and_forces_logout() {
    let server = MockServer::start().await;
    mount_protected(&server, "acc-stale", 401, 1).await;
    mount_refresh_rejected(&server, 401).await;

    let dir = tempfile::tempdir().unwrap();
    let session_path = dir.path().join("session.json");
    let store = Arc::new(CredentialStore::open(session_path.clone()));
    store.set_session(stale_session("acc-stale", "ref-1")).unwrap();

    let (api, mut auth_events) = build_api(&server.uri(), Arc::clone(&store));
    let outcome = api.get_json::<serde_json::Value>("/tasks").await;
    assert!(matches!(outcome.unwrap_err(), ApiError::RefreshFailed(_)));

    assert!(matches!(
        auth_events.recv().await,
        Some(AuthEvent::ForcedLogout { .. })
    ));
    assert!(store.get().is_none());
    assert!(!session_path.exists());
    assert!(CredentialStore::open(session_path).get().is_none());
}

#[tokio::test]
async fn three_concurrent_calls_share_one_refresh_and_all_succeed() {
    let server = MockServer::start().await;
    mount_protected(&server, "acc-stale", 401, 3).await;
    mount_refresh_ok(&server, "acc-2", 1).await;
    mount_protected(&server, "acc-2", 200, 3).await;

    let dir = tempfile::tempdir().unwrap();
    let session_path = dir.path().join("session.json");
    let store = Arc::new(CredentialStore::open(session_path.clone()));
    store.set_session(stale_session("acc-stale", "ref-1")).unwrap();

    let (api, _auth_events) = build_api(&server.uri(), store);
    let (a, b, c) = tokio::join!(
        api.get_json::<serde_json::Value>("/tasks"),
        api.get_json::<serde_json::Value>("/tasks"),
        api.get_json::<serde_json::Value>("/tasks"),
    );
    a.unwrap();
    b.unwrap();
    c.unwrap();

    assert_eq!(
        CredentialStore::open(session_path).get().unwrap().access_token,
        "acc-2"
    );
}
