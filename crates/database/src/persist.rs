//! Persistence hooks and snapshots.
//!
//! The database does not store anything on disk. It tells an external
//! collaborator which objects need saving, and can export or re-import its
//! content as a [`Snapshot`].

use livedb_core::{ObjectId, Row};
use serde::{Deserialize, Serialize};

/// Collaborator told about objects that need to reach durable storage.
///
/// Hooks run after the mutation's callbacks and cannot veto anything.
pub trait Persistence {
    /// The object was created, or changed with saving requested.
    fn needs_save(&self, row: &Row);

    /// The object was removed from the store.
    fn removed(&self, _id: ObjectId) {}
}

/// Pending persistence work produced by one mutation.
#[derive(Clone, Debug)]
pub(crate) enum SaveAction {
    Save(Row),
    Removed(ObjectId),
}

impl SaveAction {
    pub fn apply(self, hook: &dyn Persistence) {
        match self {
            SaveAction::Save(row) => hook.needs_save(&row),
            SaveAction::Removed(id) => hook.removed(id),
        }
    }
}

/// Content of a store: its objects in store order plus the id high-water mark.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub last_id: ObjectId,
    pub rows: Vec<Row>,
}

impl Snapshot {
    /// Largest id that must never be handed out again.
    pub fn high_water_mark(&self) -> ObjectId {
        self.rows
            .iter()
            .map(Row::id)
            .max()
            .map_or(self.last_id, |max| max.max(self.last_id))
    }
}
