//! Wire-format types for the auth endpoints and the push channel.
//!
//! HTTP bodies and channel frames both use camelCase field names; channel
//! frames are tagged by a `type` field with kebab-case values.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::notify::RawEvent;
use crate::{Credential, StoredSession, UserRecord};

// ============================================================================
// Auth Endpoint Bodies
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Access-token lifetime in seconds.
    pub expires_in: i64,
    pub user: UserRecord,
}

impl LoginResponse {
    /// Build the durable session this response establishes, anchored at `now`.
    #[must_use]
    pub fn into_session(self, now: DateTime<Utc>) -> StoredSession {
        StoredSession {
            credential: Credential::new(
                self.access_token,
                self.refresh_token,
                now + TimeDelta::seconds(self.expires_in),
            ),
            user: self.user,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub access_token: String,
    /// Access-token lifetime in seconds.
    pub expires_in: i64,
}

impl RefreshResponse {
    /// Absolute expiry of the renewed access token, anchored at `now`.
    #[must_use]
    pub fn expires_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + TimeDelta::seconds(self.expires_in)
    }
}

// ============================================================================
// Channel Frames
// ============================================================================

/// Client-to-server channel messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Ask for the notification snapshot after a successful handshake.
    RequestInitialNotifications,
    MarkAsRead { id: Uuid },
    MarkAllAsRead,
}

impl ClientMessage {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Error)]
pub enum WireError {
    #[error("malformed channel frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("channel frame has no type tag")]
    MissingTag,
}

/// A decoded server-to-client frame.
///
/// The snapshot frame is handled structurally here because it is the one
/// frame the channel manager treats as state sync rather than a fresh event.
/// Every other frame, recognized kind or not, is passed on as a [`RawEvent`].
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// `initial-notifications`: the full snapshot sent after connect.
    Snapshot(Vec<RawEvent>),
    /// Any other frame, keyed by its `type` tag.
    Event(RawEvent),
}

impl InboundFrame {
    pub fn parse(text: &str) -> Result<Self, WireError> {
        let value: Value = serde_json::from_str(text)?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(WireError::MissingTag)?;

        if kind == "initial-notifications" {
            let items = match value.get("items") {
                Some(items) => serde_json::from_value(items.clone())?,
                None => Vec::new(),
            };
            return Ok(Self::Snapshot(items));
        }

        Ok(Self::Event(serde_json::from_value(value)?))
    }
}

// ============================================================================
// Tests
// ============================================================================
