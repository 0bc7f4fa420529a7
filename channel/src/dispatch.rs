//! Side-effect dispatch to the embedding application.
//!
//! The channel crate never draws toasts or touches caches itself. Each
//! classified event's plan is turned into messages on unbounded channels:
//! alert requests on one, cache-invalidation batches on the other. Dropped
//! receivers silently disable their effect.

use tokio::sync::mpsc;

use tether_types::{AlertSeverity, CacheKey, InvalidationPlan, Notification};

/// One alert the application should show the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertRequest {
    pub severity: AlertSeverity,
    pub title: String,
    pub message: String,
}

/// Sender half, owned by the channel manager.
#[derive(Clone)]
pub struct SideEffects {
    alerts: mpsc::UnboundedSender<AlertRequest>,
    invalidations: mpsc::UnboundedSender<Vec<CacheKey>>,
}

/// Receiver half, handed to the embedding application.
pub struct SideEffectReceivers {
    pub alerts: mpsc::UnboundedReceiver<AlertRequest>,
    pub invalidations: mpsc::UnboundedReceiver<Vec<CacheKey>>,
}

impl SideEffects {
    #[must_use]
    pub fn new() -> (Self, SideEffectReceivers) {
        let (alerts, alerts_rx) = mpsc::unbounded_channel();
        let (invalidations, invalidations_rx) = mpsc::unbounded_channel();
        (
            Self {
                alerts,
                invalidations,
            },
            SideEffectReceivers {
                alerts: alerts_rx,
                invalidations: invalidations_rx,
            },
        )
    }

    /// Send whatever the plan owes for this notification. An empty plan
    /// sends nothing at all.
    pub fn dispatch(&self, notification: &Notification, plan: InvalidationPlan) {
        if let Some(severity) = plan.alert {
            let _ = self.alerts.send(AlertRequest {
                severity,
                title: notification.title().to_owned(),
                message: notification.message().to_owned(),
            });
        }
        if !plan.keys.is_empty() {
            let _ = self.invalidations.send(plan.keys.to_vec());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tether_types::NotificationPayload;
    use uuid::Uuid;

    fn sample(payload: NotificationPayload) -> Notification {
        Notification {
            id: Uuid::new_v4(),
            payload,
            timestamp: Utc::now(),
            read: false,
        }
    }

    #[test]
    fn full_plan_sends_alert_and_keys() {
        let (effects, mut receivers) = SideEffects::new();
        let notification = sample(NotificationPayload::TaskCompleted {
            title: "Task completed".into(),
            message: "Quarterly report".into(),
            activity_title: Some("Quarterly report".into()),
        });

        effects.dispatch(
            &notification,
            InvalidationPlan {
                alert: Some(AlertSeverity::Success),
                keys: &[CacheKey::Tasks, CacheKey::Reports],
            },
        );

        let alert = receivers.alerts.try_recv().unwrap();
        assert_eq!(alert.severity, AlertSeverity::Success);
        assert_eq!(alert.title, "Task completed");
        assert_eq!(alert.message, "Quarterly report");
        assert_eq!(
            receivers.invalidations.try_recv().unwrap(),
            vec![CacheKey::Tasks, CacheKey::Reports]
        );
    }

    #[test]
    fn empty_plan_sends_nothing() {
        let (effects, mut receivers) = SideEffects::new();
        let notification = sample(NotificationPayload::Unknown {
            kind: "budget-alert".into(),
            title: "Budget".into(),
            message: String::new(),
        });

        effects.dispatch(&notification, InvalidationPlan::EMPTY);
        assert!(receivers.alerts.try_recv().is_err());
        assert!(receivers.invalidations.try_recv().is_err());
    }

    #[test]
    fn alert_without_keys_skips_the_invalidation_channel() {
        let (effects, mut receivers) = SideEffects::new();
        let notification = sample(NotificationPayload::System {
            title: "System notice".into(),
            message: "maintenance tonight".into(),
        });

        effects.dispatch(
            &notification,
            InvalidationPlan {
                alert: Some(AlertSeverity::Info),
                keys: &[],
            },
        );
        assert!(receivers.alerts.try_recv().is_ok());
        assert!(receivers.invalidations.try_recv().is_err());
    }

    #[test]
    fn dropped_receivers_are_tolerated() {
        let (effects, receivers) = SideEffects::new();
        drop(receivers);

        let notification = sample(NotificationPayload::System {
            title: "System notice".into(),
            message: String::new(),
        });
        effects.dispatch(
            &notification,
            InvalidationPlan {
                alert: Some(AlertSeverity::Info),
                keys: &[CacheKey::Team],
            },
        );
    }
}
