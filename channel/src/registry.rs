//! Ordered notification state with read tracking.
//!
//! The registry is the single owner of notification state. Handles are cheap
//! clones over shared state; all methods are synchronous and safe to call
//! from any task. Read acknowledgements go out on an unbounded channel that
//! the channel manager forwards to the server while connected.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use uuid::Uuid;

use tether_types::Notification;
use tether_types::wire::ClientMessage;

/// Shared, clonable notification store. Most recent first.
#[derive(Clone)]
pub struct NotificationRegistry {
    items: Arc<Mutex<Vec<Notification>>>,
    acks: mpsc::UnboundedSender<ClientMessage>,
}

impl NotificationRegistry {
    /// Returns the registry plus the receiver for its outbound
    /// acknowledgements.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ClientMessage>) {
        let (acks, acks_rx) = mpsc::unbounded_channel();
        (
            Self {
                items: Arc::new(Mutex::new(Vec::new())),
                acks,
            },
            acks_rx,
        )
    }

    /// Record a fresh notification at the front.
    pub fn ingest(&self, notification: Notification) {
        self.lock().insert(0, notification);
    }

    /// Replace the whole list with snapshot contents. Emits nothing; this is
    /// state sync, not user action.
    pub fn hydrate(&self, notifications: Vec<Notification>) {
        *self.lock() = notifications;
    }

    /// Flip one notification to read. Unknown ids are ignored, and the
    /// acknowledgement goes out only when the flag actually flipped.
    pub fn mark_as_read(&self, id: Uuid) {
        let flipped = {
            let mut items = self.lock();
            match items.iter_mut().find(|item| item.id == id) {
                Some(item) if !item.read => {
                    item.read = true;
                    true
                }
                _ => false,
            }
        };
        if flipped {
            let _ = self.acks.send(ClientMessage::MarkAsRead { id });
        }
    }

    /// Flip every notification to read. One batched acknowledgement, and
    /// only when at least one entry flipped; calling this twice in a row
    /// sends nothing the second time.
    pub fn mark_all_as_read(&self) {
        let flipped_any = {
            let mut items = self.lock();
            let mut flipped = false;
            for item in items.iter_mut() {
                flipped |= !item.read;
                item.read = true;
            }
            flipped
        };
        if flipped_any {
            let _ = self.acks.send(ClientMessage::MarkAllAsRead);
        }
    }

    #[must_use]
    pub fn unread_count(&self) -> usize {
        self.lock().iter().filter(|item| !item.read).count()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy of the current list, most recent first.
    #[must_use]
    pub fn notifications(&self) -> Vec<Notification> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Notification>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
