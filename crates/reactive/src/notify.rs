//! Notifications collected during a mutation.
//!
//! A mutation first brings every affected view to its final state and only
//! then runs user callbacks. While the cascade runs, each view event is
//! recorded as a `Notification` in a `NotificationQueue`; the queue is handed
//! back to the database, which dispatches it in order with no borrow held.

use crate::delta::DeltaKind;
use livedb_core::{ObjectId, Row, ViewId};

/// One event that a view's callbacks must see.
#[derive(Clone, Debug)]
pub struct Notification {
    /// View whose callbacks fire
    pub view: ViewId,
    pub kind: DeltaKind,
    /// Id the view knows the object by
    pub id: ObjectId,
    /// Object state as seen by the view (mapped output below a map)
    pub row: Row,
}

/// Ordered queue of pending notifications.
#[derive(Debug, Default)]
pub struct NotificationQueue {
    pending: Vec<Notification>,
}

impl NotificationQueue {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a notification.
    pub fn push(&mut self, view: ViewId, kind: DeltaKind, id: ObjectId, row: Row) {
        self.pending.push(Notification { view, kind, id, row });
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl IntoIterator for NotificationQueue {
    type Item = Notification;
    type IntoIter = std::vec::IntoIter<Notification>;

    fn into_iter(self) -> Self::IntoIter {
        self.pending.into_iter()
    }
}
