//! The database engine: object table, view arena and index registry.
//!
//! The engine owns all state and performs every mutation in full before
//! returning a [`Cascade`] describing the callbacks and persistence work the
//! mutation produced. It never calls user callbacks itself; the
//! [`Database`](crate::Database) handle dispatches them once its borrow of
//! the engine is released.

use crate::config::DatabaseConfig;
use crate::index::{IndexSpec, IndexState};
use crate::operator::{Mapper, Operator, Predicate, ViewState};
use crate::persist::{Persistence, SaveAction, Snapshot};
use crate::sequence::{Cursor, Sequence};
use crate::sort::{stable_sort_by, SortOrder};
use hashbrown::HashMap;
use livedb_core::{Error, IdAllocator, IndexId, ObjectId, Result, Row, Value, ViewId, ROOT_VIEW};
use livedb_reactive::{Callback, DeltaKind, NotificationQueue};
use std::collections::VecDeque;
use std::rc::Rc;
use std::thread::{self, ThreadId};
use tracing::debug;

/// Named validation run before a row is committed.
pub(crate) struct Constraint {
    name: String,
    check: Rc<dyn Fn(&Row) -> bool>,
}

/// Where a new object lands in the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Placement {
    Append,
    BeforeCursor,
    AfterCursor,
}

/// Effects of one mutation still to be delivered.
#[derive(Debug, Default)]
pub(crate) struct Cascade {
    pub queue: NotificationQueue,
    pub saves: Vec<SaveAction>,
    /// Rows that may have left their table, dropped once the cascade is done.
    pub purge: Vec<(ViewId, ObjectId)>,
}

/// One membership event travelling from a view to the views derived from it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Step {
    Added { id: ObjectId, at: usize },
    Removed { id: ObjectId },
    Changed { id: ObjectId },
}

pub(crate) fn lookup<'a>(
    objects: &'a HashMap<ObjectId, Row>,
    views: &'a [ViewState],
    source: ViewId,
    id: ObjectId,
) -> Option<&'a Row> {
    if source == ROOT_VIEW {
        objects.get(&id)
    } else {
        views.get(source as usize).and_then(|v| v.mapped.get(&id))
    }
}

pub(crate) struct Engine {
    pub config: DatabaseConfig,
    pub ids: IdAllocator,
    pub objects: HashMap<ObjectId, Row>,
    pub views: Vec<ViewState>,
    pub indexes: Vec<IndexState>,
    pub constraints: Vec<Constraint>,
    pub persistence: Option<Rc<dyn Persistence>>,
    /// Set while the outermost dispatch is delivering callbacks.
    pub dispatching: bool,
    /// Cascades produced by callbacks, delivered in order once the current one finishes.
    pub deferred: VecDeque<Cascade>,
    owner: ThreadId,
}

impl Engine {
    pub fn new(config: DatabaseConfig) -> Self {
        let root = ViewState::new(Operator::Root, None, ROOT_VIEW, Sequence::new());
        Self {
            ids: IdAllocator::new(config.first_id),
            config,
            objects: HashMap::new(),
            views: vec![root],
            indexes: Vec::new(),
            constraints: Vec::new(),
            persistence: None,
            dispatching: false,
            deferred: VecDeque::new(),
            owner: thread::current().id(),
        }
    }

    pub fn confirm_thread(&self) -> Result<()> {
        if self.config.enforce_db_thread && thread::current().id() != self.owner {
            return Err(Error::WrongThread);
        }
        Ok(())
    }

    pub fn view(&self, view: ViewId) -> Result<&ViewState> {
        self.views
            .get(view as usize)
            .ok_or_else(|| Error::invalid_operation(format!("unknown view {view}")))
    }

    /// The view, provided it still receives updates.
    pub fn linked(&self, view: ViewId) -> Result<&ViewState> {
        let state = self.view(view)?;
        if !state.linked {
            return Err(Error::unlinked(view));
        }
        Ok(state)
    }

    #[inline]
    pub fn row(&self, source: ViewId, id: ObjectId) -> Option<&Row> {
        lookup(&self.objects, &self.views, source, id)
    }

    /// The row `view` sees for `id`.
    pub fn view_row(&self, view: ViewId, id: ObjectId) -> Option<&Row> {
        let source = self.views.get(view as usize)?.source;
        self.row(source, id)
    }

    /// "`a` sorts before `b`" as seen through `source`.
    pub fn less(&self, source: ViewId, order: &SortOrder, a: ObjectId, b: ObjectId) -> bool {
        match (self.row(source, a), self.row(source, b)) {
            (Some(a), Some(b)) => (order.less)(a, b),
            _ => false,
        }
    }

    /// `less` with ties broken by position in `base`, the order a stable
    /// sort of `base` produces.
    pub fn sorts_before(&self, source: ViewId, order: &SortOrder, base: &Sequence, a: ObjectId, b: ObjectId) -> bool {
        let (Some(row_a), Some(row_b)) = (self.row(source, a), self.row(source, b)) else {
            return false;
        };
        if (order.less)(row_a, row_b) {
            return true;
        }
        if (order.less)(row_b, row_a) {
            return false;
        }
        matches!((base.position(a), base.position(b)), (Some(x), Some(y)) if x < y)
    }

    pub fn check_constraints(&self, row: &Row) -> Result<()> {
        for constraint in &self.constraints {
            if !(constraint.check)(row) {
                debug!(id = row.id(), constraint = %constraint.name, "constraint rejected object");
                return Err(Error::constraint(constraint.name.clone(), row.id()));
            }
        }
        Ok(())
    }

    pub fn add_constraint(&mut self, name: String, check: Rc<dyn Fn(&Row) -> bool>) {
        self.constraints.push(Constraint { name, check });
    }

    /// Drops rows that left their table during the cascade.
    pub fn settle(&mut self, cx: &mut Cascade) {
        for (view, id) in cx.purge.drain(..) {
            let Some(state) = self.views.get_mut(view as usize) else {
                continue;
            };
            if state.seq.contains(id) {
                continue;
            }
            if view == ROOT_VIEW {
                self.objects.remove(&id);
            } else {
                state.mapped.remove(&id);
            }
        }
    }

    // ---- store -------------------------------------------------------------

    pub fn insert(&mut self, row: Row, placement: Placement) -> Result<Cascade> {
        let save = self.config.save_on_create;
        self.insert_row(row, placement, save)
    }

    /// Appends a row loaded from a snapshot without requesting a save.
    pub fn restore_row(&mut self, row: Row) -> Result<Cascade> {
        self.insert_row(row, Placement::Append, false)
    }

    fn insert_row(&mut self, row: Row, placement: Placement, save: bool) -> Result<Cascade> {
        self.confirm_thread()?;
        let id = row.id();
        if self.objects.contains_key(&id) {
            return Err(Error::duplicate(id));
        }
        self.check_constraints(&row)?;
        self.ids.bump_past(id);

        let root = &self.views[ROOT_VIEW as usize].seq;
        let pos = match (placement, root.cursor()) {
            (Placement::Append, _) => root.len(),
            (Placement::BeforeCursor, Cursor::At(c)) => c,
            (Placement::BeforeCursor, _) => root.len(),
            (Placement::AfterCursor, Cursor::At(c)) => c + 1,
            (Placement::AfterCursor, _) => 0,
        };

        let mut cx = Cascade::default();
        if save {
            cx.saves.push(SaveAction::Save(row.clone()));
        }
        self.objects.insert(id, row);
        self.view_insert(ROOT_VIEW, pos, id, &mut cx);
        self.settle(&mut cx);
        Ok(cx)
    }

    pub fn remove(&mut self, id: ObjectId) -> Result<Cascade> {
        self.confirm_thread()?;
        if !self.views[ROOT_VIEW as usize].seq.contains(id) {
            return Err(Error::not_found(id));
        }
        let mut cx = Cascade::default();
        self.view_remove(ROOT_VIEW, id, &mut cx);
        cx.saves.push(SaveAction::Removed(id));
        self.settle(&mut cx);
        Ok(cx)
    }

    pub fn remove_current(&mut self) -> Result<Cascade> {
        let id = self.views[ROOT_VIEW as usize]
            .seq
            .current()
            .ok_or(Error::CursorNotSet)?;
        self.remove(id)
    }

    pub fn modify<R, F>(&mut self, id: ObjectId, f: F) -> Result<R>
    where
        F: FnOnce(&mut Row) -> R,
    {
        self.confirm_thread()?;
        let row = self.objects.get_mut(&id).ok_or_else(|| Error::not_found(id))?;
        Ok(f(row))
    }

    pub fn signal_change(&mut self, id: ObjectId, needs_save: bool) -> Result<Cascade> {
        self.confirm_thread()?;
        let row = self.objects.get(&id).ok_or_else(|| Error::not_found(id))?;
        self.check_constraints(row)?;
        Ok(self.changed(id, needs_save))
    }

    /// Applies `f` to a copy of the row, validates the copy, then commits it.
    pub fn update<F>(&mut self, id: ObjectId, f: F) -> Result<Cascade>
    where
        F: FnOnce(&mut Row),
    {
        self.confirm_thread()?;
        let mut candidate = self
            .objects
            .get(&id)
            .ok_or_else(|| Error::not_found(id))?
            .clone();
        f(&mut candidate);
        self.check_constraints(&candidate)?;
        self.objects.insert(id, candidate);
        Ok(self.changed(id, true))
    }

    fn changed(&mut self, id: ObjectId, needs_save: bool) -> Cascade {
        let mut cx = Cascade::default();
        if let Some(row) = self.objects.get_mut(&id) {
            row.increment_version();
            if needs_save {
                cx.saves.push(SaveAction::Save(row.clone()));
            }
        }
        self.view_change(ROOT_VIEW, id, &mut cx);
        self.settle(&mut cx);
        cx
    }

    pub fn snapshot(&self) -> Snapshot {
        let rows = self.views[ROOT_VIEW as usize]
            .seq
            .ids()
            .iter()
            .filter_map(|id| self.objects.get(id).cloned())
            .collect();
        Snapshot {
            last_id: self.ids.last_id(),
            rows,
        }
    }

    // ---- views -------------------------------------------------------------

    fn push_view(&mut self, state: ViewState) -> ViewId {
        let id = self.views.len() as ViewId;
        self.views.push(state);
        id
    }

    pub fn create_filter(
        &mut self,
        parent: ViewId,
        predicate: Option<Predicate>,
        order: Option<SortOrder>,
    ) -> Result<ViewId> {
        self.confirm_thread()?;
        let source = self.linked(parent)?.source;
        let mut ids: Vec<ObjectId> = self.views[parent as usize]
            .seq
            .ids()
            .iter()
            .copied()
            .filter(|id| match &predicate {
                Some(p) => self.row(source, *id).is_some_and(|row| p(row)),
                None => true,
            })
            .collect();
        if let Some(order) = &order {
            stable_sort_by(&mut ids, |a, b| self.less(source, order, *a, *b));
        }

        let op = Operator::Filter { predicate, order };
        let kind = op.kind();
        let view = self.push_view(ViewState::new(op, Some(parent), source, Sequence::from_ids(ids)));
        self.views[parent as usize].children.push(view);
        debug!(view, parent, ?kind, "view created");
        Ok(view)
    }

    pub fn create_map(&mut self, parent: ViewId, mapper: Mapper) -> Result<ViewId> {
        self.confirm_thread()?;
        let parent_source = self.linked(parent)?.source;
        let ids = self.views[parent as usize].seq.ids().to_vec();
        let mapped: HashMap<ObjectId, Row> = ids
            .iter()
            .filter_map(|id| self.row(parent_source, *id).map(|row| (*id, mapper(row))))
            .collect();

        let view = self.views.len() as ViewId;
        let mut state = ViewState::new(Operator::Map(mapper), Some(parent), view, Sequence::from_ids(ids));
        state.mapped = mapped;
        self.push_view(state);
        self.views[parent as usize].children.push(view);
        debug!(view, parent, "map view created");
        Ok(view)
    }

    pub fn unlink(&mut self, view: ViewId) -> Result<()> {
        self.confirm_thread()?;
        if view == ROOT_VIEW {
            return Err(Error::invalid_operation("the root view cannot be unlinked"));
        }
        let state = self.linked(view)?;
        let parent = state.parent;
        let bucket = match &state.op {
            Operator::Bucket { index, key } => Some((*index, key.clone())),
            _ => None,
        };

        let state = &mut self.views[view as usize];
        state.linked = false;
        state.callbacks.clear();
        match (bucket, parent) {
            (Some((index, key)), _) => self.indexes[index as usize].unregister_view(&key, view),
            (None, Some(parent)) => self.views[parent as usize].children.retain(|c| *c != view),
            (None, None) => {}
        }
        debug!(view, "view unlinked");
        Ok(())
    }

    pub fn remove_view(&mut self, parent: ViewId, child: ViewId) -> Result<()> {
        if self.view(child)?.parent != Some(parent) {
            return Err(Error::invalid_operation(format!(
                "view {child} is not derived from view {parent}"
            )));
        }
        self.unlink(child)
    }

    // ---- indexes -----------------------------------------------------------

    pub fn create_index(&mut self, view: ViewId, spec: IndexSpec) -> Result<IndexId> {
        self.confirm_thread()?;
        let source = self.linked(view)?.source;
        let owner_ids = self.views[view as usize].seq.ids().to_vec();

        let mut index = IndexState::new(view, spec);
        for id in &owner_ids {
            if let Some(row) = self.row(source, *id) {
                let keys = index.key.extract(row);
                index.keys.insert(*id, keys);
            }
        }
        index.fill_buckets(&owner_ids);
        index.sort_buckets(|id| self.row(source, id));

        let id = self.indexes.len() as IndexId;
        debug!(index = id, view, buckets = index.buckets.len(), "index created");
        self.indexes.push(index);
        self.views[view as usize].indexes.push(id);
        Ok(id)
    }

    /// The index, provided it was created on `view`.
    pub fn owned_index(&self, view: ViewId, index: IndexId) -> Result<&IndexState> {
        self.indexes
            .get(index as usize)
            .filter(|ix| ix.owner == view)
            .ok_or(Error::UnknownIndex { index })
    }

    pub fn create_bucket_view(&mut self, view: ViewId, index: IndexId, key: Value) -> Result<ViewId> {
        self.confirm_thread()?;
        let source = self.linked(view)?.source;
        let ids = self.owned_index(view, index)?.bucket_ids(&key).to_vec();

        let op = Operator::Bucket {
            index,
            key: key.clone(),
        };
        let bucket_view = self.push_view(ViewState::new(op, Some(view), source, Sequence::from_ids(ids)));
        self.indexes[index as usize].register_view(key, bucket_view);
        debug!(view = bucket_view, index, "index view created");
        Ok(bucket_view)
    }

    pub fn item_with_index(&self, view: ViewId, index: IndexId, key: &Value) -> Result<Option<Row>> {
        let first = self
            .owned_index(view, index)?
            .buckets
            .get(key)
            .and_then(Sequence::first);
        Ok(first.and_then(|id| self.view_row(view, id)).cloned())
    }

    pub fn nth_item_with_index(&self, view: ViewId, index: IndexId, n: usize) -> Result<Option<Row>> {
        let nth = self
            .owned_index(view, index)?
            .buckets
            .values()
            .flat_map(|bucket| bucket.ids().iter().copied())
            .nth(n);
        Ok(nth.and_then(|id| self.view_row(view, id)).cloned())
    }

    /// Points a bucket view at another key: every old member is removed,
    /// then every member of the new bucket is added.
    pub fn change_index_value(&mut self, view: ViewId, index: IndexId, key: Value) -> Result<Cascade> {
        self.confirm_thread()?;
        let old_key = match &self.linked(view)?.op {
            Operator::Bucket { index: own, key } if *own == index => key.clone(),
            Operator::Bucket { .. } => return Err(Error::UnknownIndex { index }),
            _ => return Err(Error::NotIndexView { view }),
        };

        let mut cx = Cascade::default();
        let old_ids = self.views[view as usize].seq.ids().to_vec();
        for id in old_ids {
            self.view_remove(view, id, &mut cx);
        }

        let ix = &mut self.indexes[index as usize];
        ix.unregister_view(&old_key, view);
        ix.register_view(key.clone(), view);
        let new_ids = ix.bucket_ids(&key).to_vec();
        if let Operator::Bucket { key: current, .. } = &mut self.views[view as usize].op {
            *current = key;
        }
        for (pos, id) in new_ids.into_iter().enumerate() {
            self.view_insert(view, pos, id, &mut cx);
        }
        self.settle(&mut cx);
        Ok(cx)
    }

    // ---- dispatch support --------------------------------------------------

    /// Callbacks of `kind` on `view`, empty if the view was unlinked.
    pub fn callbacks_for(&self, view: ViewId, kind: DeltaKind) -> Vec<Callback> {
        match self.views.get(view as usize) {
            Some(state) if state.linked => state.callbacks.callbacks(kind),
            _ => Vec::new(),
        }
    }

    pub fn place_cursor_after(&mut self, view: ViewId, id: ObjectId) -> bool {
        self.views
            .get_mut(view as usize)
            .is_some_and(|state| state.seq.place_after(id))
    }

    pub fn restore_cursor(&mut self, view: ViewId) {
        if let Some(state) = self.views.get_mut(view as usize) {
            state.seq.restore_cursor();
        }
    }
}
