//! Database configuration.

use livedb_core::ObjectId;

/// Settings fixed when a [`Database`](crate::Database) is created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// Reject mutations issued from a thread other than the creating one.
    pub enforce_db_thread: bool,
    /// First id handed out by the store's allocator.
    pub first_id: ObjectId,
    /// Report newly inserted objects to the persistence hook.
    pub save_on_create: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            enforce_db_thread: true,
            first_id: 1,
            save_on_create: true,
        }
    }
}

impl DatabaseConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_first_id(mut self, first_id: ObjectId) -> Self {
        self.first_id = first_id;
        self
    }

    pub fn with_thread_check(mut self, enforce: bool) -> Self {
        self.enforce_db_thread = enforce;
        self
    }

    pub fn with_save_on_create(mut self, save: bool) -> Self {
        self.save_on_create = save;
        self
    }
}
