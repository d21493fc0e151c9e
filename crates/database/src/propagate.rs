//! Incremental maintenance of derived views.
//!
//! A membership event on a view is applied to the view's indexes (and their
//! bucket views), then to each child view, depth first. Every view that
//! changes records a notification and forwards its own event, so by the time
//! the cascade returns every view reflects the mutation.

use crate::engine::{Cascade, Engine, Step};
use crate::index::KeySet;
use crate::operator::{follow_position, Operator};
use crate::sequence::Sequence;
use crate::sort::{insertion_point, out_of_place, SortOrder};
use livedb_core::{IndexId, ObjectId, Value, ViewId};
use livedb_reactive::DeltaKind;
use tracing::trace;

impl Engine {
    pub(crate) fn notify(&self, cx: &mut Cascade, view: ViewId, kind: DeltaKind, id: ObjectId) {
        let state = &self.views[view as usize];
        if !state.callbacks.listens(kind) {
            return;
        }
        if let Some(row) = self.row(state.source, id) {
            trace!(view, %kind, id, "queued notification");
            cx.queue.push(view, kind, id, row.clone());
        }
    }

    pub(crate) fn propagate(&mut self, view: ViewId, step: Step, cx: &mut Cascade) {
        trace!(view, ?step, "propagate");
        let indexes = self.views[view as usize].indexes.clone();
        for index in indexes {
            self.index_step(index, step, cx);
        }
        let children = self.views[view as usize].children.clone();
        for child in children {
            self.child_step(child, step, cx);
        }
    }

    pub(crate) fn view_insert(&mut self, view: ViewId, pos: usize, id: ObjectId, cx: &mut Cascade) {
        let at = self.views[view as usize].seq.insert(pos, id);
        self.notify(cx, view, DeltaKind::Add, id);
        self.propagate(view, Step::Added { id, at }, cx);
    }

    pub(crate) fn view_remove(&mut self, view: ViewId, id: ObjectId, cx: &mut Cascade) -> bool {
        if self.views[view as usize].seq.remove(id).is_none() {
            return false;
        }
        self.notify(cx, view, DeltaKind::Remove, id);
        cx.purge.push((view, id));
        self.propagate(view, Step::Removed { id }, cx);
        true
    }

    pub(crate) fn view_change(&mut self, view: ViewId, id: ObjectId, cx: &mut Cascade) {
        self.notify(cx, view, DeltaKind::Change, id);
        self.propagate(view, Step::Changed { id }, cx);
    }

    fn child_step(&mut self, child: ViewId, step: Step, cx: &mut Cascade) {
        match step {
            Step::Added { id, at } => self.child_added(child, id, at, cx),
            Step::Removed { id } => {
                self.view_remove(child, id, cx);
            }
            Step::Changed { id } => self.child_changed(child, id, cx),
        }
    }

    fn child_added(&mut self, child: ViewId, id: ObjectId, at: usize, cx: &mut Cascade) {
        let state = &self.views[child as usize];
        match &state.op {
            Operator::Map(mapper) => {
                let Some(parent) = state.parent else {
                    return;
                };
                let parent_source = self.views[parent as usize].source;
                let Some(mapped) = self.row(parent_source, id).map(|row| mapper(row)) else {
                    return;
                };
                self.views[child as usize].mapped.insert(id, mapped);
                self.view_insert(child, at, id, cx);
            }
            Operator::Filter { .. } => {
                if self.admits(child, id) {
                    let pos = self.insert_position(child, id, at);
                    self.view_insert(child, pos, id, cx);
                }
            }
            Operator::Root | Operator::Bucket { .. } => {}
        }
    }

    fn child_changed(&mut self, child: ViewId, id: ObjectId, cx: &mut Cascade) {
        let was = self.views[child as usize].seq.contains(id);
        match &self.views[child as usize].op {
            // Mapped rows are not re-derived on change; only recompute does that.
            Operator::Map(_) => {
                if was {
                    self.view_change(child, id, cx);
                }
            }
            Operator::Filter { .. } => match (was, self.admits(child, id)) {
                (true, true) => self.member_changed(child, id, cx),
                (true, false) => {
                    self.view_remove(child, id, cx);
                }
                (false, true) => {
                    let at = self.parent_position(child, id);
                    let pos = self.insert_position(child, id, at);
                    self.view_insert(child, pos, id, cx);
                }
                (false, false) => {}
            },
            Operator::Root | Operator::Bucket { .. } => {}
        }
    }

    /// A member changed and stays: repositions it when a resorting order no
    /// longer holds, otherwise forwards the change.
    fn member_changed(&mut self, view: ViewId, id: ObjectId, cx: &mut Cascade) {
        let order = self.views[view as usize]
            .op
            .order()
            .filter(|order| order.resort)
            .cloned();
        if let Some(order) = order {
            if self.is_out_of_place(view, id, &order) {
                self.view_remove(view, id, cx);
                let pos = self.sorted_position(view, id, &order);
                self.view_insert(view, pos, id, cx);
                return;
            }
        }
        self.view_change(view, id, cx);
    }

    pub(crate) fn admits(&self, view: ViewId, id: ObjectId) -> bool {
        let state = &self.views[view as usize];
        let Operator::Filter { predicate, .. } = &state.op else {
            return false;
        };
        match (self.row(state.source, id), predicate) {
            (Some(row), Some(predicate)) => predicate(row),
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    fn parent_position(&self, view: ViewId, id: ObjectId) -> usize {
        let Some(parent) = self.views[view as usize].parent else {
            return 0;
        };
        let seq = &self.views[parent as usize].seq;
        seq.position(id).unwrap_or(seq.len())
    }

    fn insert_position(&self, view: ViewId, id: ObjectId, parent_at: usize) -> usize {
        let state = &self.views[view as usize];
        if let Some(order) = state.op.order() {
            return self.sorted_position(view, id, order);
        }
        if matches!(state.op, Operator::Map(_)) {
            return parent_at;
        }
        let Some(parent) = state.parent else {
            return state.seq.len();
        };
        follow_position(
            self.views[parent as usize].seq.ids(),
            parent_at,
            state.seq.len(),
            |other| state.seq.position(other),
        )
    }

    /// The sequence ties in `view` are ordered by: its parent's.
    fn tie_base(&self, view: ViewId) -> Option<&Sequence> {
        let parent = self.views[view as usize].parent?;
        Some(&self.views[parent as usize].seq)
    }

    fn sorted_position(&self, view: ViewId, id: ObjectId, order: &SortOrder) -> usize {
        let state = &self.views[view as usize];
        let Some(base) = self.tie_base(view) else {
            return state.seq.len();
        };
        insertion_point(state.seq.ids(), |other| {
            self.sorts_before(state.source, order, base, id, *other)
        })
    }

    fn is_out_of_place(&self, view: ViewId, id: ObjectId, order: &SortOrder) -> bool {
        let state = &self.views[view as usize];
        let (Some(pos), Some(base)) = (state.seq.position(id), self.tie_base(view)) else {
            return false;
        };
        out_of_place(state.seq.ids(), pos, |a, b| {
            self.sorts_before(state.source, order, base, *a, *b)
        })
    }

    // ---- indexes -----------------------------------------------------------

    fn extract_keys(&self, index: IndexId, id: ObjectId) -> KeySet {
        let ix = &self.indexes[index as usize];
        self.view_row(ix.owner, id)
            .map(|row| ix.key.extract(row))
            .unwrap_or_default()
    }

    fn index_step(&mut self, index: IndexId, step: Step, cx: &mut Cascade) {
        match step {
            Step::Added { id, at } => {
                let keys = self.extract_keys(index, id);
                self.indexes[index as usize].keys.insert(id, keys.clone());
                for key in keys {
                    self.bucket_insert(index, key, id, Some(at), cx);
                }
            }
            Step::Removed { id } => {
                let Some(keys) = self.indexes[index as usize].keys.remove(&id) else {
                    return;
                };
                for key in &keys {
                    self.bucket_remove(index, key, id, cx);
                }
            }
            Step::Changed { id } => {
                let new = self.extract_keys(index, id);
                let old = self.indexes[index as usize]
                    .keys
                    .insert(id, new.clone())
                    .unwrap_or_default();
                for key in old.iter().filter(|key| !new.contains(key)) {
                    self.bucket_remove(index, key, id, cx);
                }
                for key in old.iter().filter(|key| new.contains(key)) {
                    self.bucket_changed(index, key, id, cx);
                }
                for key in new.iter().filter(|key| !old.contains(key)) {
                    self.bucket_insert(index, key.clone(), id, None, cx);
                }
            }
        }
    }

    fn bucket_sorted_position(&self, index: IndexId, key: &Value, id: ObjectId, order: &SortOrder) -> usize {
        let ix = &self.indexes[index as usize];
        let owner = &self.views[ix.owner as usize];
        insertion_point(ix.bucket_ids(key), |other| {
            self.sorts_before(owner.source, order, &owner.seq, id, *other)
        })
    }

    fn bucket_insert(&mut self, index: IndexId, key: Value, id: ObjectId, at: Option<usize>, cx: &mut Cascade) {
        let ix = &self.indexes[index as usize];
        let pos = match ix.order.clone() {
            Some(order) => self.bucket_sorted_position(index, &key, id, &order),
            None => {
                let owner = &self.views[ix.owner as usize].seq;
                let at = at
                    .or_else(|| owner.position(id))
                    .unwrap_or(owner.len());
                ix.follow_position(&key, owner.ids(), at)
            }
        };

        let ix = &mut self.indexes[index as usize];
        let pos = ix.buckets.entry(key.clone()).or_default().insert(pos, id);
        for view in ix.views_for(&key) {
            self.view_insert(view, pos, id, cx);
        }
    }

    fn bucket_remove(&mut self, index: IndexId, key: &Value, id: ObjectId, cx: &mut Cascade) {
        let ix = &mut self.indexes[index as usize];
        let Some(bucket) = ix.buckets.get_mut(key) else {
            return;
        };
        bucket.remove(id);
        if bucket.is_empty() {
            ix.buckets.remove(key);
        }
        for view in ix.views_for(key) {
            self.view_remove(view, id, cx);
        }
    }

    fn bucket_changed(&mut self, index: IndexId, key: &Value, id: ObjectId, cx: &mut Cascade) {
        let ix = &self.indexes[index as usize];
        let views = ix.views_for(key);
        let order = ix.order.clone().filter(|order| order.resort);

        if let Some(order) = order {
            let owner = &self.views[ix.owner as usize];
            let ids = ix.bucket_ids(key);
            let moved = ids.iter().position(|x| *x == id).is_some_and(|pos| {
                out_of_place(ids, pos, |a, b| self.sorts_before(owner.source, &order, &owner.seq, *a, *b))
            });
            if moved {
                if let Some(bucket) = self.indexes[index as usize].buckets.get_mut(key) {
                    bucket.remove(id);
                }
                let pos = self.bucket_sorted_position(index, key, id, &order);
                let pos = match self.indexes[index as usize].buckets.get_mut(key) {
                    Some(bucket) => bucket.insert(pos, id),
                    None => return,
                };
                for view in views {
                    self.view_remove(view, id, cx);
                    self.view_insert(view, pos, id, cx);
                }
                return;
            }
        }

        for view in views {
            if self.views[view as usize].seq.contains(id) {
                self.view_change(view, id, cx);
            }
        }
    }
}
