//! Wire-to-registry notification flow: JSON frames exactly as the server
//! sends them, through parsing, classification, dispatch, and read state.

use uuid::Uuid;

use tether_channel::registry::NotificationRegistry;
use tether_channel::{SideEffects, classify};
use tether_types::wire::{ClientMessage, InboundFrame};
use tether_types::{AlertSeverity, CacheKey, NotificationKind};

fn event_frame(json: &str) -> tether_types::RawEvent {
    match InboundFrame::parse(json).unwrap() {
        InboundFrame::Event(event) => event,
        InboundFrame::Snapshot(_) => panic!("expected an event frame"),
    }
}

#[test]
fn task_completed_frame_lands_unread_with_task_cache_keys() {
    let (registry, _acks) = NotificationRegistry::new();
    let (effects, mut receivers) = SideEffects::new();

    let event = event_frame(r#"{"type":"task-completed","activityTitle":"Quarterly report"}"#);
    let classified = classify(&event);
    effects.dispatch(&classified.notification, classified.plan);
    registry.ingest(classified.notification);

    assert_eq!(registry.len(), 1);
    assert_eq!(registry.unread_count(), 1);
    assert_eq!(
        registry.notifications()[0].kind(),
        NotificationKind::TaskCompleted
    );

    let alert = receivers.alerts.try_recv().unwrap();
    assert_eq!(alert.severity, AlertSeverity::Success);
    assert_eq!(alert.title, "Task completed");
    let keys = receivers.invalidations.try_recv().unwrap();
    assert!(keys.contains(&CacheKey::Tasks));
    assert!(keys.contains(&CacheKey::Reports));
}

#[test]
fn unknown_frame_is_preserved_verbatim_with_no_side_effects() {
    let (registry, _acks) = NotificationRegistry::new();
    let (effects, mut receivers) = SideEffects::new();

    let event = event_frame(r#"{"type":"budget-alert","title":"Budget","message":"90% spent"}"#);
    let classified = classify(&event);
    effects.dispatch(&classified.notification, classified.plan);
    registry.ingest(classified.notification);

    assert_eq!(registry.unread_count(), 1);
    let stored = &registry.notifications()[0];
    assert_eq!(stored.kind(), NotificationKind::Unknown);
    assert_eq!(stored.title(), "Budget");
    assert_eq!(stored.message(), "90% spent");
    assert!(receivers.alerts.try_recv().is_err());
    assert!(receivers.invalidations.try_recv().is_err());
}

#[test]
fn snapshot_frame_hydrates_with_read_state() {
    let frame = InboundFrame::parse(
        r#"{
            "type": "initial-notifications",
            "items": [
                {"type": "assignment", "title": "Review the numbers", "read": true},
                {"type": "system", "title": "Maintenance tonight"}
            ]
        }"#,
    )
    .unwrap();
    let InboundFrame::Snapshot(items) = frame else {
        panic!("expected a snapshot frame");
    };

    let (registry, _acks) = NotificationRegistry::new();
    registry.hydrate(items.iter().map(|item| classify(item).notification).collect());

    assert_eq!(registry.len(), 2);
    assert_eq!(registry.unread_count(), 1);
}

#[test]
fn mark_all_is_idempotent_and_acks_once() {
    let (registry, mut acks) = NotificationRegistry::new();
    for kind in ["assignment", "system", "deadline-reminder"] {
        registry.ingest(classify(&tether_types::RawEvent::new(kind)).notification);
    }
    assert_eq!(registry.unread_count(), 3);

    registry.mark_all_as_read();
    assert_eq!(registry.unread_count(), 0);
    assert_eq!(acks.try_recv(), Ok(ClientMessage::MarkAllAsRead));

    registry.mark_all_as_read();
    assert_eq!(registry.unread_count(), 0);
    assert!(acks.try_recv().is_err());
}

#[test]
fn mark_as_read_on_a_missing_id_is_silent() {
    let (registry, mut acks) = NotificationRegistry::new();
    registry.ingest(classify(&tether_types::RawEvent::new("assignment")).notification);

    registry.mark_as_read(Uuid::new_v4());
    assert_eq!(registry.unread_count(), 1);
    assert!(acks.try_recv().is_err());

    let known = registry.notifications()[0].id;
    registry.mark_as_read(known);
    assert_eq!(registry.unread_count(), 0);
    assert_eq!(acks.try_recv(), Ok(ClientMessage::MarkAsRead { id: known }));

    // A second flip of the same entry stays silent.
    registry.mark_as_read(known);
    assert!(acks.try_recv().is_err());
}
