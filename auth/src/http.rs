//! Authenticated HTTP plumbing.
//!
//! [`ApiClient`] owns the retry-once rule for protected calls: a 401 asks
//! the [`RefreshCoordinator`] for a fresh token and re-issues the request
//! exactly once. A second 401 means the renewed credential is no good
//! either and the caller sees [`ApiError::AuthExpired`]. Timeouts and
//! transport failures never engage the refresh path. Requests are built by
//! a closure so the retry can construct a genuinely fresh request instead
//! of replaying a consumed one.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::StatusCode;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};

use tether_types::UserRecord;
use tether_types::wire::{LoginRequest, LoginResponse};

use crate::refresh::{RefreshCoordinator, RefreshError};
use crate::store::{CredentialStore, StoreError};

/// Cap on how much of an error response body is kept for diagnostics.
const MAX_ERROR_BODY_BYTES: usize = 32 * 1024;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ApiError {
    /// The retried call was rejected again; the session is unusable.
    #[error("session expired; sign in again")]
    AuthExpired,
    #[error("session refresh failed: {0}")]
    RefreshFailed(#[from] RefreshError),
    #[error("request failed: {0}")]
    Network(#[source] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to decode response body: {0}")]
    Decode(#[source] reqwest::Error),
    #[error(transparent)]
    Session(#[from] StoreError),
}

/// Shared client with bounded timeouts for talking to the API server.
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(CONNECT_TIMEOUT)
        .redirect(reqwest::redirect::Policy::none())
        .build()
}

/// HTTP front door for the API server. Cheap to clone.
#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    store: Arc<CredentialStore>,
    coordinator: RefreshCoordinator,
}

impl ApiClient {
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        store: Arc<CredentialStore>,
        coordinator: RefreshCoordinator,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            store,
            coordinator,
        }
    }

    /// GET a protected endpoint and decode its JSON body. `path` is
    /// relative to the base URL and starts with a slash.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = self.endpoint(path);
        let response = self.send_with_reauth(|| self.client.get(&url)).await?;
        let response = expect_success(response).await?;
        response.json().await.map_err(ApiError::Decode)
    }

    /// POST a JSON body to a protected endpoint and decode the response.
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.endpoint(path);
        let response = self
            .send_with_reauth(|| self.client.post(&url).json(body))
            .await?;
        let response = expect_success(response).await?;
        response.json().await.map_err(ApiError::Decode)
    }

    /// Exchange credentials for a session. Bypasses the reauth path; a 401
    /// here means the password was wrong, not that a refresh is due.
    pub async fn login(&self, email: &str, password: &str) -> Result<UserRecord, ApiError> {
        let body = LoginRequest {
            email: email.to_owned(),
            password: password.to_owned(),
        };
        let response = self
            .client
            .post(self.endpoint("/auth/login"))
            .json(&body)
            .send()
            .await
            .map_err(ApiError::Network)?;
        let response = expect_success(response).await?;
        let login: LoginResponse = response.json().await.map_err(ApiError::Decode)?;

        let session = login.into_session(Utc::now());
        let user = session.user.clone();
        self.store.set_session(session)?;
        Ok(user)
    }

    /// Ends the session. The server call is best-effort; the local session
    /// is cleared regardless of whether the server heard about it.
    pub async fn logout(&self) -> Result<(), ApiError> {
        if let Some(credential) = self.store.get() {
            let request = self
                .client
                .post(self.endpoint("/auth/logout"))
                .bearer_auth(&credential.access_token);
            if let Err(err) = request.send().await {
                warn!("Logout request failed: {err}");
            }
        }
        self.store.clear()?;
        Ok(())
    }

    async fn send_with_reauth<F>(&self, build_request: F) -> Result<reqwest::Response, ApiError>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut token = self.store.get().map(|credential| credential.access_token);
        let mut attempted_refresh = false;

        loop {
            let mut request = build_request();
            if let Some(token) = &token {
                request = request.bearer_auth(token);
            }
            let response = request.send().await.map_err(ApiError::Network)?;
            if response.status() != StatusCode::UNAUTHORIZED {
                return Ok(response);
            }
            if attempted_refresh {
                return Err(ApiError::AuthExpired);
            }
            attempted_refresh = true;
            debug!("Request rejected with 401; renewing credentials");
            token = Some(self.coordinator.fresh_access_token().await?);
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

/// Passes successful responses through; turns anything else into
/// [`ApiError::Status`] with a capped copy of the body.
pub async fn expect_success(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ApiError::Status {
        status: status.as_u16(),
        body: truncate_body(body),
    })
}

fn truncate_body(mut body: String) -> String {
    if body.len() > MAX_ERROR_BODY_BYTES {
        let mut cut = MAX_ERROR_BODY_BYTES;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    body
}
