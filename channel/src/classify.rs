//! Classification of raw channel events.
//!
//! `classify` is total: every [`RawEvent`] becomes a typed notification plus
//! the side effects owed for it, with unrecognized kinds routed through the
//! `Unknown` fallback instead of being dropped or erroring.

use chrono::Utc;
use uuid::Uuid;

use tether_types::{
    AlertSeverity, InvalidationPlan, Notification, NotificationKind, NotificationPayload, RawEvent,
};

/// Generic carrier frames use this tag; they classify like `system`.
const GENERIC_KIND: &str = "notification";

/// Outcome of classifying one raw event.
#[derive(Debug, Clone)]
pub struct Classified {
    pub notification: Notification,
    pub plan: InvalidationPlan,
}

/// Classify a raw event into a typed notification plus its side-effect plan.
///
/// Missing ids are minted, missing timestamps default to now, and missing
/// titles and messages are synthesized per kind so downstream consumers
/// never see holes.
#[must_use]
pub fn classify(event: &RawEvent) -> Classified {
    let payload = payload_for(event);
    let plan = plan_for(payload.kind());
    Classified {
        notification: Notification {
            id: event.id.unwrap_or_else(Uuid::new_v4),
            payload,
            timestamp: event.timestamp.unwrap_or_else(Utc::now),
            read: event.read,
        },
        plan,
    }
}

/// The fixed side-effect table: alert severity and caches to refresh, by
/// kind alone.
#[must_use]
pub const fn plan_for(kind: NotificationKind) -> InvalidationPlan {
    use tether_types::CacheKey::{Activities, Dashboard, Reports, Tasks, Team};

    match kind {
        NotificationKind::Assignment => InvalidationPlan {
            alert: Some(AlertSeverity::Info),
            keys: &[Tasks, Dashboard],
        },
        NotificationKind::StatusChange | NotificationKind::TaskStarted => InvalidationPlan {
            alert: Some(AlertSeverity::Info),
            keys: &[Tasks, Activities, Dashboard],
        },
        NotificationKind::DeadlineReminder => InvalidationPlan {
            alert: Some(AlertSeverity::Warning),
            keys: &[Tasks, Dashboard],
        },
        NotificationKind::System => InvalidationPlan {
            alert: Some(AlertSeverity::Info),
            keys: &[],
        },
        NotificationKind::TaskCompleted | NotificationKind::TaskApproved => InvalidationPlan {
            alert: Some(AlertSeverity::Success),
            keys: &[Tasks, Activities, Dashboard, Reports],
        },
        NotificationKind::TaskRejected => InvalidationPlan {
            alert: Some(AlertSeverity::Error),
            keys: &[Tasks, Activities, Dashboard],
        },
        NotificationKind::UserConnected | NotificationKind::UserDisconnected => InvalidationPlan {
            alert: Some(AlertSeverity::Info),
            keys: &[Team],
        },
        NotificationKind::Unknown => InvalidationPlan::EMPTY,
    }
}

fn payload_for(event: &RawEvent) -> NotificationPayload {
    let kind = match NotificationKind::parse(&event.kind) {
        Some(kind) => kind,
        None if event.kind == GENERIC_KIND => NotificationKind::System,
        None => {
            return NotificationPayload::Unknown {
                kind: event.kind.clone(),
                title: event
                    .title
                    .clone()
                    .unwrap_or_else(|| default_title(NotificationKind::Unknown).to_owned()),
                message: event.message.clone().unwrap_or_default(),
            };
        }
    };

    let title = event
        .title
        .clone()
        .unwrap_or_else(|| default_title(kind).to_owned());
    let message = event
        .message
        .clone()
        .unwrap_or_else(|| default_message(kind, event));

    match kind {
        NotificationKind::Assignment => NotificationPayload::Assignment {
            title,
            message,
            task_id: event.extra_str("taskId"),
        },
        NotificationKind::StatusChange => NotificationPayload::StatusChange {
            title,
            message,
            task_id: event.extra_str("taskId"),
            status: event.extra_str("status"),
        },
        NotificationKind::DeadlineReminder => NotificationPayload::DeadlineReminder {
            title,
            message,
            task_id: event.extra_str("taskId"),
            due_at: event.extra_str("dueAt"),
        },
        NotificationKind::System => NotificationPayload::System { title, message },
        NotificationKind::TaskCompleted => NotificationPayload::TaskCompleted {
            title,
            message,
            activity_title: event.extra_str("activityTitle"),
        },
        NotificationKind::TaskStarted => NotificationPayload::TaskStarted {
            title,
            message,
            activity_title: event.extra_str("activityTitle"),
        },
        NotificationKind::TaskRejected => NotificationPayload::TaskRejected {
            title,
            message,
            activity_title: event.extra_str("activityTitle"),
            reason: event.extra_str("reason"),
        },
        NotificationKind::TaskApproved => NotificationPayload::TaskApproved {
            title,
            message,
            activity_title: event.extra_str("activityTitle"),
        },
        NotificationKind::UserConnected => NotificationPayload::UserConnected {
            title,
            message,
            user_name: event.extra_str("userName"),
        },
        NotificationKind::UserDisconnected => NotificationPayload::UserDisconnected {
            title,
            message,
            user_name: event.extra_str("userName"),
        },
        // parse() never yields Unknown.
        NotificationKind::Unknown => NotificationPayload::Unknown {
            kind: event.kind.clone(),
            title,
            message,
        },
    }
}

const fn default_title(kind: NotificationKind) -> &'static str {
    match kind {
        NotificationKind::Assignment => "New assignment",
        NotificationKind::StatusChange => "Task status updated",
        NotificationKind::DeadlineReminder => "Deadline approaching",
        NotificationKind::System => "System notice",
        NotificationKind::TaskCompleted => "Task completed",
        NotificationKind::TaskStarted => "Task started",
        NotificationKind::TaskRejected => "Task rejected",
        NotificationKind::TaskApproved => "Task approved",
        NotificationKind::UserConnected => "Teammate online",
        NotificationKind::UserDisconnected => "Teammate offline",
        NotificationKind::Unknown => "Notification",
    }
}

/// Events that name an activity read better when the synthesized message
/// carries it; everything else falls back to an empty message.
fn default_message(kind: NotificationKind, event: &RawEvent) -> String {
    match kind {
        NotificationKind::TaskCompleted
        | NotificationKind::TaskStarted
        | NotificationKind::TaskRejected
        | NotificationKind::TaskApproved => event.extra_str("activityTitle").unwrap_or_default(),
        _ => String::new(),
    }
}
