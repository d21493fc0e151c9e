//! View handles.
//!
//! A `View` is a lightweight handle (database + arena id) to one derived
//! sequence. All state lives in the database; cloning a handle does not
//! copy the view.

use crate::database::Database;
use crate::index::IndexSpec;
use crate::operator::{Mapper, Predicate, ViewKind};
use crate::recompute::Recompute;
use crate::sort::SortOrder;
use livedb_core::{Error, IndexId, ObjectId, Result, Row, Value, ViewId};
use livedb_reactive::{CallbackId, DeltaKind};
use std::fmt;
use std::rc::Rc;

/// Handle to a view of a [`Database`].
///
/// Every view keeps its own cursor (with a save stack), its own callbacks
/// and the views and indexes built on top of it.
#[derive(Clone)]
pub struct View {
    db: Database,
    id: ViewId,
}

impl PartialEq for View {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.db.same_as(&other.db)
    }
}

impl Eq for View {}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let engine = self.db.engine();
        let state = engine.views.get(self.id as usize);
        f.debug_struct("View")
            .field("id", &self.id)
            .field("kind", &state.map(|s| s.op.kind()))
            .field("len", &state.map(|s| s.seq.len()))
            .field("linked", &state.is_some_and(|s| s.linked))
            .finish()
    }
}

impl View {
    pub(crate) fn new(db: Database, id: ViewId) -> Self {
        Self { db, id }
    }

    #[inline]
    pub fn id(&self) -> ViewId {
        self.id
    }

    #[inline]
    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn kind(&self) -> ViewKind {
        self.db.engine().views[self.id as usize].op.kind()
    }

    /// Returns false once the view has been unlinked.
    pub fn is_linked(&self) -> bool {
        self.db.engine().views[self.id as usize].linked
    }

    // ---- reads -------------------------------------------------------------

    pub fn len(&self) -> usize {
        self.db.engine().views[self.id as usize].seq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The object at position `n`, as this view sees it.
    pub fn get(&self, n: usize) -> Option<Row> {
        let engine = self.db.engine();
        let id = engine.views[self.id as usize].seq.get(n)?;
        engine.view_row(self.id, id).cloned()
    }

    pub fn ids(&self) -> Vec<ObjectId> {
        self.db.engine().views[self.id as usize].seq.ids().to_vec()
    }

    /// Snapshot of the members in view order.
    pub fn rows(&self) -> Vec<Row> {
        let engine = self.db.engine();
        engine.views[self.id as usize]
            .seq
            .ids()
            .iter()
            .filter_map(|id| engine.view_row(self.id, *id).cloned())
            .collect()
    }

    pub fn iter(&self) -> std::vec::IntoIter<Row> {
        self.rows().into_iter()
    }

    pub fn get_object_by_id(&self, id: ObjectId) -> Result<Row> {
        let engine = self.db.engine();
        if !engine.views[self.id as usize].seq.contains(id) {
            return Err(Error::not_found(id));
        }
        engine
            .view_row(self.id, id)
            .cloned()
            .ok_or_else(|| Error::not_found(id))
    }

    pub fn id_exists(&self, id: ObjectId) -> bool {
        self.db.engine().views[self.id as usize].seq.contains(id)
    }

    /// The id following `id` in this view, `None` at the end.
    pub fn get_next_id(&self, id: ObjectId) -> Result<Option<ObjectId>> {
        let engine = self.db.engine();
        let seq = &engine.views[self.id as usize].seq;
        let pos = seq.position(id).ok_or_else(|| Error::not_found(id))?;
        Ok(seq.get(pos + 1))
    }

    /// The id preceding `id` in this view, `None` at the start.
    pub fn get_prev_id(&self, id: ObjectId) -> Result<Option<ObjectId>> {
        let engine = self.db.engine();
        let seq = &engine.views[self.id as usize].seq;
        let pos = seq.position(id).ok_or_else(|| Error::not_found(id))?;
        Ok(pos.checked_sub(1).and_then(|prev| seq.get(prev)))
    }

    // ---- cursor ------------------------------------------------------------

    fn current_row(&self) -> Option<Row> {
        let engine = self.db.engine();
        let id = engine.views[self.id as usize].seq.current()?;
        engine.view_row(self.id, id).cloned()
    }

    /// The object under the cursor; `None` before the first `get_next`.
    pub fn cur(&self) -> Option<Row> {
        self.current_row()
    }

    pub fn get_current_id(&self) -> Option<ObjectId> {
        self.db.engine().views[self.id as usize].seq.current()
    }

    /// Advances the cursor. Returns `None` (and parks the cursor past the
    /// end) after the last object.
    pub fn get_next(&self) -> Option<Row> {
        self.db.engine_mut().views[self.id as usize].seq.advance();
        self.current_row()
    }

    /// Moves the cursor back. From past the end this yields the last object.
    pub fn get_prev(&self) -> Option<Row> {
        self.db.engine_mut().views[self.id as usize].seq.retreat();
        self.current_row()
    }

    pub fn reset_cursor(&self) {
        self.db.engine_mut().views[self.id as usize].seq.reset();
    }

    pub fn save_cursor(&self) {
        self.db.engine_mut().views[self.id as usize].seq.save_cursor();
    }

    pub fn restore_cursor(&self) -> Result<()> {
        if self.db.engine_mut().views[self.id as usize].seq.restore_cursor() {
            Ok(())
        } else {
            Err(Error::EmptyCursorStack)
        }
    }

    pub fn move_cursor_to_id(&self, id: ObjectId) -> Result<()> {
        if self.db.engine_mut().views[self.id as usize].seq.move_to(id) {
            Ok(())
        } else {
            Err(Error::not_found(id))
        }
    }

    // ---- operators ---------------------------------------------------------

    fn child(&self, view: ViewId) -> View {
        View::new(self.db.clone(), view)
    }

    /// Members of this view for which `predicate` holds, in this view's order.
    pub fn filter<F>(&self, predicate: F) -> Result<View>
    where
        F: Fn(&Row) -> bool + 'static,
    {
        let predicate: Predicate = Rc::new(predicate);
        let view = self.db.engine_mut().create_filter(self.id, Some(predicate), None)?;
        Ok(self.child(view))
    }

    /// Filter and sort in one view.
    pub fn filter_sorted<F, C>(&self, predicate: F, less: C, resort: bool) -> Result<View>
    where
        F: Fn(&Row) -> bool + 'static,
        C: Fn(&Row, &Row) -> bool + 'static,
    {
        let predicate: Predicate = Rc::new(predicate);
        let order = SortOrder::new(Rc::new(less), resort);
        let view = self
            .db
            .engine_mut()
            .create_filter(self.id, Some(predicate), Some(order))?;
        Ok(self.child(view))
    }

    /// This view's members ordered by `less` ("sorts before").
    ///
    /// With `resort` the view repositions members whenever they change;
    /// without it the order is only re-established by an explicit recompute.
    pub fn sort<C>(&self, less: C, resort: bool) -> Result<View>
    where
        C: Fn(&Row, &Row) -> bool + 'static,
    {
        let order = SortOrder::new(Rc::new(less), resort);
        let view = self.db.engine_mut().create_filter(self.id, None, Some(order))?;
        Ok(self.child(view))
    }

    /// One derived row per member, in this view's order.
    ///
    /// Derived rows are computed when a member enters the view and on
    /// [`recompute_filters`](Self::recompute_filters); changes to the member
    /// are forwarded as change events without deriving again.
    pub fn map<F>(&self, f: F) -> Result<View>
    where
        F: Fn(&Row) -> Row + 'static,
    {
        let mapper: Mapper = Rc::new(f);
        let view = self.db.engine_mut().create_map(self.id, mapper)?;
        Ok(self.child(view))
    }

    // ---- indexes -----------------------------------------------------------

    pub fn create_index(&self, spec: IndexSpec) -> Result<IndexId> {
        self.db.engine_mut().create_index(self.id, spec)
    }

    /// A new view over the members whose key includes `key`.
    ///
    /// Each call creates a separate view with its own cursor and callbacks.
    pub fn filter_with_index(&self, index: IndexId, key: impl Into<Value>) -> Result<View> {
        let view = self
            .db
            .engine_mut()
            .create_bucket_view(self.id, index, key.into())?;
        Ok(self.child(view))
    }

    /// The first member with `key`, if any.
    pub fn get_item_with_index(&self, index: IndexId, key: impl Into<Value>) -> Result<Option<Row>> {
        self.db.engine().item_with_index(self.id, index, &key.into())
    }

    /// The `n`th member across all buckets, taken in key order.
    pub fn nth_item_with_index(&self, index: IndexId, n: usize) -> Result<Option<Row>> {
        self.db.engine().nth_item_with_index(self.id, index, n)
    }

    /// Points this index view at another key.
    pub fn change_index_value(&self, index: IndexId, key: impl Into<Value>) -> Result<()> {
        let cx = self.db.engine_mut().change_index_value(self.id, index, key.into())?;
        self.db.dispatch(cx);
        Ok(())
    }

    // ---- callbacks ---------------------------------------------------------

    fn register<F>(&self, kind: DeltaKind, callback: F) -> CallbackId
    where
        F: Fn(&Row, ObjectId) + 'static,
    {
        self.db.engine_mut().views[self.id as usize]
            .callbacks
            .register(kind, callback)
    }

    /// Runs `callback` after an object enters this view. While it runs the
    /// cursor sits just past the new object.
    pub fn add_add_callback<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(&Row, ObjectId) + 'static,
    {
        self.register(DeltaKind::Add, callback)
    }

    pub fn add_remove_callback<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(&Row, ObjectId) + 'static,
    {
        self.register(DeltaKind::Remove, callback)
    }

    pub fn add_change_callback<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(&Row, ObjectId) + 'static,
    {
        self.register(DeltaKind::Change, callback)
    }

    pub fn remove_callback(&self, id: CallbackId) -> bool {
        self.db.engine_mut().views[self.id as usize]
            .callbacks
            .unregister(id)
    }

    // ---- teardown and recompute --------------------------------------------

    /// Stops all further updates to this view. Its last content stays
    /// readable.
    pub fn unlink(&self) -> Result<()> {
        self.db.engine_mut().unlink(self.id)
    }

    /// Unlinks `child`, which must have been built from this view.
    pub fn remove_view(&self, child: &View) -> Result<()> {
        if !self.db.same_as(&child.db) {
            return Err(Error::invalid_operation("view belongs to another database"));
        }
        self.db.engine_mut().remove_view(self.id, child.id)
    }

    /// Rebuilds this view and everything below it from scratch.
    pub fn recompute_filters(&self) -> Result<()> {
        self.db.recompute(self.id, Recompute::Full)
    }

    /// Re-sorts this view and the resorting views below it.
    pub fn recompute_sort(&self) -> Result<()> {
        self.db.recompute(self.id, Recompute::Sort)
    }
}

impl IntoIterator for &View {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
