//! Notification domain types: raw inbound events, classified payloads, and
//! the side-effect plan vocabulary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ============================================================================
// Raw Inbound Events
// ============================================================================

/// An inbound channel event before classification.
///
/// Everything beyond the common fields is kept in `extras` so unrecognized
/// kinds lose nothing on the way to the fallback path. Snapshot items reuse
/// this shape; live events simply arrive with `read` absent (false).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub read: bool,
    #[serde(flatten)]
    pub extras: serde_json::Map<String, Value>,
}

impl RawEvent {
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: None,
            title: None,
            message: None,
            timestamp: None,
            read: false,
            extras: serde_json::Map::new(),
        }
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extras.insert(key.into(), value.into());
        self
    }

    /// Fetch an extra field as text. Non-string scalars are rendered as JSON;
    /// explicit nulls count as absent.
    #[must_use]
    pub fn extra_str(&self, key: &str) -> Option<String> {
        match self.extras.get(key)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

// ============================================================================
// Classified Notifications
// ============================================================================

/// Discriminant for the closed set of recognized notification kinds.
///
/// `Unknown` is the fallback for wire kinds outside the set; it is never
/// produced by [`NotificationKind::parse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    Assignment,
    StatusChange,
    DeadlineReminder,
    System,
    TaskCompleted,
    TaskStarted,
    TaskRejected,
    TaskApproved,
    UserConnected,
    UserDisconnected,
    Unknown,
}

impl NotificationKind {
    /// Parse a wire kind. Returns `None` for anything outside the closed set.
    #[must_use]
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "assignment" => Some(Self::Assignment),
            "status-change" => Some(Self::StatusChange),
            "deadline-reminder" => Some(Self::DeadlineReminder),
            "system" => Some(Self::System),
            "task-completed" => Some(Self::TaskCompleted),
            "task-started" => Some(Self::TaskStarted),
            "task-rejected" => Some(Self::TaskRejected),
            "task-approved" => Some(Self::TaskApproved),
            "user-connected" => Some(Self::UserConnected),
            "user-disconnected" => Some(Self::UserDisconnected),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Assignment => "assignment",
            Self::StatusChange => "status-change",
            Self::DeadlineReminder => "deadline-reminder",
            Self::System => "system",
            Self::TaskCompleted => "task-completed",
            Self::TaskStarted => "task-started",
            Self::TaskRejected => "task-rejected",
            Self::TaskApproved => "task-approved",
            Self::UserConnected => "user-connected",
            Self::UserDisconnected => "user-disconnected",
            Self::Unknown => "unknown",
        }
    }
}

/// Typed notification content.
///
/// One variant per recognized kind plus an explicit `Unknown` fallback that
/// preserves the original kind, title, and message verbatim. Untyped payload
/// shapes never travel past the classifier boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationPayload {
    Assignment {
        title: String,
        message: String,
        task_id: Option<String>,
    },
    StatusChange {
        title: String,
        message: String,
        task_id: Option<String>,
        status: Option<String>,
    },
    DeadlineReminder {
        title: String,
        message: String,
        task_id: Option<String>,
        due_at: Option<String>,
    },
    System {
        title: String,
        message: String,
    },
    TaskCompleted {
        title: String,
        message: String,
        activity_title: Option<String>,
    },
    TaskStarted {
        title: String,
        message: String,
        activity_title: Option<String>,
    },
    TaskRejected {
        title: String,
        message: String,
        activity_title: Option<String>,
        reason: Option<String>,
    },
    TaskApproved {
        title: String,
        message: String,
        activity_title: Option<String>,
    },
    UserConnected {
        title: String,
        message: String,
        user_name: Option<String>,
    },
    UserDisconnected {
        title: String,
        message: String,
        user_name: Option<String>,
    },
    Unknown {
        kind: String,
        title: String,
        message: String,
    },
}

impl NotificationPayload {
    #[must_use]
    pub const fn kind(&self) -> NotificationKind {
        match self {
            Self::Assignment { .. } => NotificationKind::Assignment,
            Self::StatusChange { .. } => NotificationKind::StatusChange,
            Self::DeadlineReminder { .. } => NotificationKind::DeadlineReminder,
            Self::System { .. } => NotificationKind::System,
            Self::TaskCompleted { .. } => NotificationKind::TaskCompleted,
            Self::TaskStarted { .. } => NotificationKind::TaskStarted,
            Self::TaskRejected { .. } => NotificationKind::TaskRejected,
            Self::TaskApproved { .. } => NotificationKind::TaskApproved,
            Self::UserConnected { .. } => NotificationKind::UserConnected,
            Self::UserDisconnected { .. } => NotificationKind::UserDisconnected,
            Self::Unknown { .. } => NotificationKind::Unknown,
        }
    }

    #[must_use]
    pub fn title(&self) -> &str {
        match self {
            Self::Assignment { title, .. }
            | Self::StatusChange { title, .. }
            | Self::DeadlineReminder { title, .. }
            | Self::System { title, .. }
            | Self::TaskCompleted { title, .. }
            | Self::TaskStarted { title, .. }
            | Self::TaskRejected { title, .. }
            | Self::TaskApproved { title, .. }
            | Self::UserConnected { title, .. }
            | Self::UserDisconnected { title, .. }
            | Self::Unknown { title, .. } => title,
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Assignment { message, .. }
            | Self::StatusChange { message, .. }
            | Self::DeadlineReminder { message, .. }
            | Self::System { message, .. }
            | Self::TaskCompleted { message, .. }
            | Self::TaskStarted { message, .. }
            | Self::TaskRejected { message, .. }
            | Self::TaskApproved { message, .. }
            | Self::UserConnected { message, .. }
            | Self::UserDisconnected { message, .. }
            | Self::Unknown { message, .. } => message,
        }
    }
}

/// A classified notification held by the registry.
///
/// Ordered most-recent-first in the registry; mutated only by `read` flips.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub id: Uuid,
    pub payload: NotificationPayload,
    pub timestamp: DateTime<Utc>,
    pub read: bool,
}

impl Notification {
    #[must_use]
    pub const fn kind(&self) -> NotificationKind {
        self.payload.kind()
    }

    #[must_use]
    pub fn title(&self) -> &str {
        self.payload.title()
    }

    #[must_use]
    pub fn message(&self) -> &str {
        self.payload.message()
    }
}

// ============================================================================
// Side-Effect Plan Vocabulary
// ============================================================================

/// Severity attached to an alert request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Success,
    Warning,
    Error,
}

impl AlertSeverity {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier for a cached dataset that must be refreshed after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheKey {
    Tasks,
    Activities,
    Dashboard,
    Reports,
    Team,
}

impl CacheKey {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tasks => "tasks",
            Self::Activities => "activities",
            Self::Dashboard => "dashboard",
            Self::Reports => "reports",
            Self::Team => "team",
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Side effects owed for one classified event: an optional alert plus the
/// cache keys to invalidate. A pure function of kind, not of payload content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidationPlan {
    pub alert: Option<AlertSeverity>,
    pub keys: &'static [CacheKey],
}

impl InvalidationPlan {
    pub const EMPTY: Self = Self {
        alert: None,
        keys: &[],
    };

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.alert.is_none() && self.keys.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_event_captures_unknown_fields_in_extras() {
        let event: RawEvent = serde_json::from_value(serde_json::json!({
            "type": "task-completed",
            "activityTitle": "X",
        }))
        .unwrap();
        assert_eq!(event.kind, "task-completed");
        assert_eq!(event.extra_str("activityTitle").as_deref(), Some("X"));
        assert!(!event.read);
        assert!(event.id.is_none());
    }

    #[test]
    fn raw_event_extra_str_renders_scalars() {
        let event = RawEvent::new("status-change")
            .with_extra("taskId", 42)
            .with_extra("gone", Value::Null);
        assert_eq!(event.extra_str("taskId").as_deref(), Some("42"));
        assert_eq!(event.extra_str("gone"), None);
        assert_eq!(event.extra_str("missing"), None);
    }

    #[test]
    fn raw_event_round_trips_type_tag() {
        let event = RawEvent::new("assignment").with_title("New task");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json.get("type").and_then(Value::as_str), Some("assignment"));
        let back: RawEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn kind_parse_covers_the_closed_set_only() {
        for kind in [
            "assignment",
            "status-change",
            "deadline-reminder",
            "system",
            "task-completed",
            "task-started",
            "task-rejected",
            "task-approved",
            "user-connected",
            "user-disconnected",
        ] {
            let parsed = NotificationKind::parse(kind).unwrap();
            assert_eq!(parsed.as_str(), kind);
        }
        assert_eq!(NotificationKind::parse("budget-alert"), None);
        assert_eq!(NotificationKind::parse("unknown"), None);
    }

    #[test]
    fn payload_accessors_reach_every_variant() {
        let payload = NotificationPayload::TaskRejected {
            title: "Rejected".into(),
            message: "needs rework".into(),
            activity_title: Some("Q3 report".into()),
            reason: None,
        };
        assert_eq!(payload.kind(), NotificationKind::TaskRejected);
        assert_eq!(payload.title(), "Rejected");
        assert_eq!(payload.message(), "needs rework");

        let fallback = NotificationPayload::Unknown {
            kind: "budget-alert".into(),
            title: "Budget".into(),
            message: "over".into(),
        };
        assert_eq!(fallback.kind(), NotificationKind::Unknown);
        assert_eq!(fallback.title(), "Budget");
    }

    #[test]
    fn empty_plan_has_no_effects() {
        assert!(InvalidationPlan::EMPTY.is_empty());
        assert!(InvalidationPlan::EMPTY.alert.is_none());
        assert!(InvalidationPlan::EMPTY.keys.is_empty());
    }

    #[test]
    fn cache_key_wire_names_are_stable() {
        assert_eq!(CacheKey::Tasks.to_string(), "tasks");
        assert_eq!(CacheKey::Activities.as_str(), "activities");
        assert_eq!(
            serde_json::to_string(&CacheKey::Dashboard).unwrap(),
            "\"dashboard\""
        );
    }
}
