//! Shared test utilities and fixtures
//!
//! Common infrastructure for integration tests.

#![allow(dead_code)]

use chrono::{TimeDelta, Utc};
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tether_types::{Credential, Role, StoredSession, UserRecord};

/// A member-role user for seeding sessions.
pub fn member() -> UserRecord {
    UserRecord {
        id: Uuid::new_v4(),
        email: "ana@example.com".into(),
        display_name: "Ana".into(),
        role: Role::Member,
    }
}

/// A session whose access token expired half a minute ago.
pub fn stale_session(access: &str, refresh: &str) -> StoredSession {
    StoredSession {
        credential: Credential::new(access, refresh, Utc::now() - TimeDelta::seconds(30)),
        user: member(),
    }
}

/// Mount `/auth/refresh` returning `access` and expect exactly `times` calls.
pub async fn mount_refresh_ok(server: &MockServer, access: &str, times: u64) {
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "accessToken": access,
            "expiresIn": 900,
        })))
        .expect(times)
        .mount(server)
        .await;
}

/// Mount `/auth/refresh` rejecting every call with the given status.
pub async fn mount_refresh_rejected(server: &MockServer, status: u16) {
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(status))
        .expect(1)
        .mount(server)
        .await;
}
