//! Resource-change notifications
//!
//! Stores publish a `ResourceNotification` after every successful mutation;
//! listeners subscribe through the `NotificationBus`. Delivery is
//! at-least-once from the consumer's point of view: the same resource may be
//! announced many times, and consumers must re-read and re-validate state
//! rather than trust the notification itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::model::{ResourceId, ResourceKind};

/// What happened to a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

/// A single resource-change notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceNotification {
    /// Unique message identifier (for log correlation)
    pub message_id: Uuid,
    /// Resource that changed
    pub resource_id: ResourceId,
    /// Shape of the resource that changed
    pub kind: ResourceKind,
    /// Type of change
    pub change: ChangeKind,
    /// When the change was committed
    pub timestamp: DateTime<Utc>,
}

impl ResourceNotification {
    pub fn new(resource_id: ResourceId, kind: ResourceKind, change: ChangeKind) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            resource_id,
            kind,
            change,
            timestamp: Utc::now(),
        }
    }
}

/// Distribution bus for resource-change notifications
///
/// Uses tokio::broadcast internally:
/// - Non-blocking publish (slow subscribers don't block stores)
/// - Multiple concurrent subscribers
/// - Lagged subscribers are told how many notifications they missed
///
/// # Examples
///
/// ```
/// use deposit_common::events::{ChangeKind, NotificationBus, ResourceNotification};
/// use deposit_common::{ResourceId, ResourceKind};
///
/// let bus = NotificationBus::new(100);
/// let mut rx = bus.subscribe();
///
/// bus.publish_lossy(ResourceNotification::new(
///     ResourceId::from("http://localhost/fcrepo/deposits/1"),
///     ResourceKind::Deposit,
///     ChangeKind::Modified,
/// ));
///
/// let received = rx.try_recv().unwrap();
/// assert_eq!(received.kind, ResourceKind::Deposit);
/// ```
#[derive(Clone)]
pub struct NotificationBus {
    tx: broadcast::Sender<ResourceNotification>,
    capacity: usize,
}

impl NotificationBus {
    /// Creates a new bus buffering up to `capacity` notifications per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future notifications
    pub fn subscribe(&self) -> broadcast::Receiver<ResourceNotification> {
        self.tx.subscribe()
    }

    /// Publish a notification to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn publish(
        &self,
        notification: ResourceNotification,
    ) -> Result<usize, broadcast::error::SendError<ResourceNotification>> {
        self.tx.send(notification)
    }

    /// Publish, ignoring the absence of subscribers
    pub fn publish_lossy(&self, notification: ResourceNotification) {
        let _ = self.tx.send(notification);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
