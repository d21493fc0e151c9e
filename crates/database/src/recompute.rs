//! Explicit recomputation of derived views.
//!
//! Incremental maintenance only reacts to signalled changes. When a
//! predicate, comparator or key function starts answering differently
//! without any object changing (it depends on outside state), the affected
//! subtree is rebuilt from scratch here. Rebuilding reports membership
//! differences as add and remove events; reordering alone is silent.

use crate::engine::{lookup, Cascade, Engine};
use crate::index::KeySet;
use crate::operator::{Mapper, Operator};
use crate::sort::{stable_sort_by, SortOrder};
use hashbrown::HashMap;
use livedb_core::{IndexId, ObjectId, Result, Row, ViewId};
use livedb_reactive::{ChangeSet, DeltaKind};
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Recompute {
    /// Re-evaluate predicates, keys and mapped values; re-sort every sorted view.
    Full,
    /// Re-sort the target; below it only resorting views re-sort.
    Sort,
}

enum Rebuild {
    Keep,
    Map(Mapper),
    Filter(Option<SortOrder>),
}

impl Engine {
    pub(crate) fn recompute(&mut self, target: ViewId, mode: Recompute) -> Result<Cascade> {
        self.confirm_thread()?;
        self.linked(target)?;
        debug!(view = target, ?mode, "recompute");
        let mut cx = Cascade::default();
        self.rebuild(target, mode, true, &mut cx);
        self.settle(&mut cx);
        Ok(cx)
    }

    fn rebuild(&mut self, view: ViewId, mode: Recompute, explicit: bool, cx: &mut Cascade) {
        if let Some(ids) = self.recomputed_ids(view, mode, explicit) {
            self.replace_sequence(view, ids, cx);
        }
        self.rebuild_dependents(view, mode, cx);
    }

    fn rebuild_dependents(&mut self, view: ViewId, mode: Recompute, cx: &mut Cascade) {
        let indexes = self.views[view as usize].indexes.clone();
        for index in indexes {
            self.rebuild_index(index, mode, cx);
        }
        let children = self.views[view as usize].children.clone();
        for child in children {
            self.rebuild(child, mode, false, cx);
        }
    }

    /// New content of `view`, or `None` when it is not derived from its
    /// parent's sequence (root and index views).
    fn recomputed_ids(&mut self, view: ViewId, mode: Recompute, explicit: bool) -> Option<Vec<ObjectId>> {
        let state = &self.views[view as usize];
        let parent = state.parent?;
        let plan = match &state.op {
            Operator::Map(mapper) => Rebuild::Map(mapper.clone()),
            Operator::Filter { order, .. } => Rebuild::Filter(order.clone()),
            Operator::Root | Operator::Bucket { .. } => Rebuild::Keep,
        };
        let parent_ids = self.views[parent as usize].seq.ids().to_vec();

        match plan {
            Rebuild::Keep => None,
            Rebuild::Map(mapper) => {
                if mode == Recompute::Full {
                    let parent_source = self.views[parent as usize].source;
                    let derived: Vec<(ObjectId, Row)> = parent_ids
                        .iter()
                        .filter_map(|id| self.row(parent_source, *id).map(|row| (*id, mapper(row))))
                        .collect();
                    self.views[view as usize].mapped.extend(derived);
                }
                Some(parent_ids)
            }
            Rebuild::Filter(order) => {
                let state = &self.views[view as usize];
                let mut ids: Vec<ObjectId> = match mode {
                    Recompute::Full => parent_ids
                        .into_iter()
                        .filter(|id| self.admits(view, *id))
                        .collect(),
                    Recompute::Sort => parent_ids
                        .into_iter()
                        .filter(|id| state.seq.contains(*id))
                        .collect(),
                };
                match order {
                    Some(order) if mode == Recompute::Full || explicit || order.resort => {
                        let source = state.source;
                        stable_sort_by(&mut ids, |a, b| self.less(source, &order, *a, *b));
                    }
                    // static order survives a sort-only pass untouched
                    Some(_) => ids = state.seq.ids().to_vec(),
                    None => {}
                }
                Some(ids)
            }
        }
    }

    fn rebuild_index(&mut self, index: IndexId, mode: Recompute, cx: &mut Cascade) {
        let owner = self.indexes[index as usize].owner;
        let owner_ids = self.views[owner as usize].seq.ids().to_vec();
        let source = self.views[owner as usize].source;

        if mode == Recompute::Full {
            let ix = &self.indexes[index as usize];
            let keys: HashMap<ObjectId, KeySet> = owner_ids
                .iter()
                .filter_map(|id| self.row(source, *id).map(|row| (*id, ix.key.extract(row))))
                .collect();
            self.indexes[index as usize].keys = keys;
        }

        let objects = &self.objects;
        let views = &self.views;
        let ix = &mut self.indexes[index as usize];
        match ix.order.as_ref().map(|order| order.resort) {
            None => ix.fill_buckets(&owner_ids),
            Some(resort) if mode == Recompute::Full || resort => {
                ix.fill_buckets(&owner_ids);
                ix.sort_buckets(|id| lookup(objects, views, source, id));
            }
            Some(_) => {}
        }

        for (key, view) in self.indexes[index as usize].all_views() {
            let ids = self.indexes[index as usize].bucket_ids(&key).to_vec();
            self.replace_sequence(view, ids, cx);
            self.rebuild_dependents(view, mode, cx);
        }
    }

    /// Swaps in a rebuilt sequence and reports membership differences.
    fn replace_sequence(&mut self, view: ViewId, ids: Vec<ObjectId>, cx: &mut Cascade) {
        let diff = ChangeSet::diff(self.views[view as usize].seq.ids(), &ids);
        self.views[view as usize].seq.replace(ids);
        if diff.is_empty() {
            return;
        }
        for id in diff.removed {
            self.notify(cx, view, DeltaKind::Remove, id);
            cx.purge.push((view, id));
        }
        for id in diff.added {
            self.notify(cx, view, DeltaKind::Add, id);
        }
    }
}
