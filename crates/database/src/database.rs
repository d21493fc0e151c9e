//! Database - main entry point for livedb.
//!
//! This module provides the `Database` handle, which owns the store (the
//! root view) and every view and index derived from it. Handles are cheap
//! clones of one shared engine.

use crate::config::DatabaseConfig;
use crate::engine::{Cascade, Engine, Placement};
use crate::persist::{Persistence, Snapshot};
use crate::recompute::Recompute;
use crate::view::View;
use livedb_core::{Error, ObjectId, Result, Row, Value, ROOT_VIEW};
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;
use tracing::{debug, trace, warn};

/// The object store.
///
/// Provides methods for:
/// - Creating, inserting and removing objects
/// - Signalling object changes to every view
/// - Recomputing views whose predicates depend on outside state
/// - Persistence hooks and snapshots
///
/// Every mutation runs to completion (all views updated) before any callback
/// fires. Callbacks may call back into the database. Predicates,
/// comparators, key functions and mappers must not.
#[derive(Clone)]
pub struct Database {
    engine: Rc<RefCell<Engine>>,
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let engine = self.engine.borrow();
        f.debug_struct("Database")
            .field("objects", &engine.objects.len())
            .field("views", &engine.views.len())
            .field("indexes", &engine.indexes.len())
            .finish()
    }
}

impl Database {
    /// Creates a new, empty database with the default configuration.
    pub fn new() -> Self {
        Self::with_config(DatabaseConfig::default())
    }

    pub fn with_config(config: DatabaseConfig) -> Self {
        debug!(first_id = config.first_id, "database created");
        Self {
            engine: Rc::new(RefCell::new(Engine::new(config))),
        }
    }

    pub(crate) fn engine(&self) -> Ref<'_, Engine> {
        self.engine.borrow()
    }

    pub(crate) fn engine_mut(&self) -> RefMut<'_, Engine> {
        self.engine.borrow_mut()
    }

    pub(crate) fn same_as(&self, other: &Database) -> bool {
        Rc::ptr_eq(&self.engine, &other.engine)
    }

    pub fn config(&self) -> DatabaseConfig {
        self.engine().config.clone()
    }

    /// The store itself, as a view.
    pub fn root(&self) -> View {
        View::new(self.clone(), ROOT_VIEW)
    }

    /// Fails with `Error::WrongThread` outside the thread that created the
    /// database.
    pub fn confirm_db_thread(&self) -> Result<()> {
        self.engine().confirm_thread()
    }

    // ---- objects -----------------------------------------------------------

    /// The most recently allocated object id.
    pub fn last_id(&self) -> ObjectId {
        self.engine().ids.last_id()
    }

    /// Makes sure ids handed out from now on are greater than `id`.
    pub fn set_next_id_at_least(&self, id: ObjectId) {
        self.engine_mut().ids.bump_past(id);
    }

    /// Allocates an id and builds a row without inserting it.
    pub fn detached(&self, values: Vec<Value>) -> Row {
        let id = self.engine_mut().ids.next_id();
        Row::new(id, values)
    }

    /// Creates an object at the end of the store and returns its id.
    pub fn create(&self, values: Vec<Value>) -> Result<ObjectId> {
        self.confirm_db_thread()?;
        let row = self.detached(values);
        let id = row.id();
        self.add(row)?;
        Ok(id)
    }

    /// Inserts a detached row at the end of the store.
    pub fn add(&self, row: Row) -> Result<()> {
        self.insert(row, Placement::Append)
    }

    /// Inserts before the store cursor; appends when the cursor is not on an object.
    pub fn add_before_cursor(&self, row: Row) -> Result<()> {
        self.insert(row, Placement::BeforeCursor)
    }

    /// Inserts after the store cursor; prepends when the cursor is not on an object.
    pub fn add_after_cursor(&self, row: Row) -> Result<()> {
        self.insert(row, Placement::AfterCursor)
    }

    fn insert(&self, row: Row, placement: Placement) -> Result<()> {
        let cx = self.engine_mut().insert(row, placement)?;
        self.dispatch(cx);
        Ok(())
    }

    /// Removes an object from the store and every view.
    pub fn remove(&self, id: ObjectId) -> Result<()> {
        let cx = self.engine_mut().remove(id)?;
        self.dispatch(cx);
        Ok(())
    }

    /// Removes the object under the store cursor.
    pub fn remove_current(&self) -> Result<()> {
        let cx = self.engine_mut().remove_current()?;
        self.dispatch(cx);
        Ok(())
    }

    /// Mutates an object in place without telling any view.
    ///
    /// Follow up with [`signal_change`](Self::signal_change) to propagate.
    pub fn modify<R, F>(&self, id: ObjectId, f: F) -> Result<R>
    where
        F: FnOnce(&mut Row) -> R,
    {
        self.engine_mut().modify(id, f)
    }

    /// Tells every view that an object changed.
    ///
    /// Registered constraints are checked first; a rejected object is not
    /// propagated.
    pub fn signal_change(&self, id: ObjectId, needs_save: bool) -> Result<()> {
        let cx = self.engine_mut().signal_change(id, needs_save)?;
        self.dispatch(cx);
        Ok(())
    }

    /// Applies `f` to a copy of the object, validates the copy, commits it and
    /// signals the change (with saving).
    pub fn update<F>(&self, id: ObjectId, f: F) -> Result<()>
    where
        F: FnOnce(&mut Row),
    {
        let cx = self.engine_mut().update(id, f)?;
        self.dispatch(cx);
        Ok(())
    }

    pub fn get_object_by_id(&self, id: ObjectId) -> Result<Row> {
        self.engine()
            .objects
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found(id))
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.engine().objects.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.engine().objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ---- recompute ---------------------------------------------------------

    /// Re-evaluates every view from scratch.
    pub fn recompute_filters(&self) -> Result<()> {
        self.root().recompute_filters()
    }

    /// Re-sorts `view` and the resorting views below it.
    pub fn recompute_sort(&self, view: &View) -> Result<()> {
        if !self.same_as(view.database()) {
            return Err(Error::invalid_operation("view belongs to another database"));
        }
        self.recompute(view.id(), Recompute::Sort)
    }

    pub(crate) fn recompute(&self, view: livedb_core::ViewId, mode: Recompute) -> Result<()> {
        let cx = self.engine_mut().recompute(view, mode)?;
        self.dispatch(cx);
        Ok(())
    }

    // ---- hooks -------------------------------------------------------------

    /// Registers a validation run before objects are inserted or changed.
    pub fn add_constraint<F>(&self, name: impl Into<String>, check: F)
    where
        F: Fn(&Row) -> bool + 'static,
    {
        self.engine_mut().add_constraint(name.into(), Rc::new(check));
    }

    pub fn set_persistence(&self, hook: Rc<dyn Persistence>) {
        self.engine_mut().persistence = Some(hook);
    }

    pub fn clear_persistence(&self) {
        self.engine_mut().persistence = None;
    }

    pub fn snapshot(&self) -> Snapshot {
        self.engine().snapshot()
    }

    /// Re-populates the store from a snapshot.
    ///
    /// The id allocator is moved past every restored id first, then each row
    /// is appended (views and callbacks see it, the persistence hook does
    /// not), and finally `on_restore` runs once per restored row.
    pub fn restore<F>(&self, snapshot: Snapshot, mut on_restore: F) -> Result<()>
    where
        F: FnMut(&Database, &Row),
    {
        self.confirm_db_thread()?;
        self.set_next_id_at_least(snapshot.high_water_mark());

        let mut restored = Vec::with_capacity(snapshot.rows.len());
        for row in snapshot.rows {
            if self.contains(row.id()) {
                warn!(id = row.id(), "restored object already present, skipping");
                continue;
            }
            let id = row.id();
            let cx = self.engine_mut().restore_row(row)?;
            self.dispatch(cx);
            restored.push(id);
        }
        debug!(count = restored.len(), last_id = self.last_id(), "store restored");

        for id in restored {
            if let Ok(row) = self.get_object_by_id(id) {
                on_restore(self, &row);
            }
        }
        Ok(())
    }

    /// Delivers the callbacks and persistence work of a finished mutation.
    ///
    /// Mutations made by a callback are queued behind the cascade being
    /// delivered, so every view reports events in the order they happened.
    pub(crate) fn dispatch(&self, cx: Cascade) {
        {
            let mut engine = self.engine_mut();
            engine.deferred.push_back(cx);
            if engine.dispatching {
                return;
            }
            engine.dispatching = true;
        }
        let _guard = DispatchGuard(self);
        loop {
            let next = self.engine_mut().deferred.pop_front();
            let Some(cx) = next else {
                break;
            };
            self.deliver(cx);
        }
    }

    fn deliver(&self, cx: Cascade) {
        let Cascade { queue, saves, .. } = cx;
        if queue.is_empty() && saves.is_empty() {
            return;
        }
        trace!(notifications = queue.len(), saves = saves.len(), "delivering cascade");
        for note in queue {
            let callbacks = self.engine().callbacks_for(note.view, note.kind);
            if callbacks.is_empty() {
                continue;
            }
            let placed = note.kind.is_add() && self.engine_mut().place_cursor_after(note.view, note.id);
            for callback in &callbacks {
                callback(&note.row, note.id);
            }
            if placed {
                self.engine_mut().restore_cursor(note.view);
            }
        }

        if saves.is_empty() {
            return;
        }
        let hook = self.engine().persistence.clone();
        if let Some(hook) = hook {
            for action in saves {
                action.apply(hook.as_ref());
            }
        }
    }
}

/// Ends a dispatch, also when a callback panics.
struct DispatchGuard<'a>(&'a Database);

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut engine) = self.0.engine.try_borrow_mut() {
            engine.dispatching = false;
            engine.deferred.clear();
        }
    }
}

thread_local! {
    static DEFAULT_DATABASE: RefCell<Option<Database>> = const { RefCell::new(None) };
}

/// The database shared by code running on this thread, created on first use.
pub fn default_database() -> Database {
    DEFAULT_DATABASE.with(|db| db.borrow_mut().get_or_insert_with(Database::new).clone())
}

/// Drops this thread's default database; the next call to
/// [`default_database`] starts from an empty one.
pub fn reset_default_database() {
    DEFAULT_DATABASE.with(|db| *db.borrow_mut() = None);
}
