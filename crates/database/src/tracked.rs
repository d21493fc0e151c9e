//! Explicitly ordered id lists over a view.
//!
//! A `TrackedIdList` keeps a user-defined order of object ids (a playlist,
//! a tab order) and exposes the tracked objects as a view sorted by that
//! order. Reordering goes through the normal change path, so the view's
//! observers see every moved object leave and re-enter once.

use crate::operator::Predicate;
use crate::view::View;
use hashbrown::{HashMap, HashSet};
use livedb_core::{Error, ObjectId, Result, Row};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::debug;

#[derive(Default)]
struct Tracking {
    order: Vec<ObjectId>,
    positions: HashMap<ObjectId, usize>,
    /// Ids temporarily hidden from the view while they move.
    detached: HashSet<ObjectId>,
    filter: Option<Predicate>,
}

impl Tracking {
    fn reindex(&mut self) {
        self.positions = self
            .order
            .iter()
            .enumerate()
            .map(|(pos, id)| (*id, pos))
            .collect();
    }

    fn admits(&self, row: &Row) -> bool {
        let id = row.id();
        self.positions.contains_key(&id)
            && !self.detached.contains(&id)
            && self.filter.as_ref().map_or(true, |f| f(row))
    }

    fn position(&self, id: ObjectId) -> usize {
        self.positions.get(&id).copied().unwrap_or(usize::MAX)
    }
}

/// Ordered list of ids over a source view.
pub struct TrackedIdList {
    source: View,
    tracking: Rc<RefCell<Tracking>>,
    view: View,
}

impl TrackedIdList {
    /// Tracks `ids` (duplicates dropped) in the given order.
    pub fn new(source: &View, ids: impl IntoIterator<Item = ObjectId>) -> Result<Self> {
        let mut tracking = Tracking::default();
        let mut seen = HashSet::new();
        tracking.order = ids.into_iter().filter(|id| seen.insert(*id)).collect();
        tracking.reindex();
        let tracking = Rc::new(RefCell::new(tracking));

        let admits = tracking.clone();
        let order = tracking.clone();
        let view = source.filter_sorted(
            move |row| admits.borrow().admits(row),
            move |a, b| {
                let order = order.borrow();
                order.position(a.id()) < order.position(b.id())
            },
            true,
        )?;
        debug!(view = view.id(), tracked = tracking.borrow().order.len(), "tracked id list created");

        Ok(Self {
            source: source.clone(),
            tracking,
            view,
        })
    }

    /// The tracked objects present in the source, in list order.
    pub fn view(&self) -> &View {
        &self.view
    }

    pub fn len(&self) -> usize {
        self.tracking.borrow().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ids(&self) -> Vec<ObjectId> {
        self.tracking.borrow().order.clone()
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.tracking.borrow().positions.contains_key(&id)
    }

    pub fn position(&self, id: ObjectId) -> Option<usize> {
        self.tracking.borrow().positions.get(&id).copied()
    }

    fn signal(&self, id: ObjectId) -> Result<()> {
        let db = self.source.database();
        if db.contains(id) {
            db.signal_change(id, false)?;
        }
        Ok(())
    }

    /// Adds `id` at the end.
    ///
    /// Without `send_signal_change` the view picks the id up with the
    /// object's next change, which suits ids whose object is about to be
    /// created.
    pub fn append_id(&self, id: ObjectId, send_signal_change: bool) -> Result<()> {
        {
            let mut tracking = self.tracking.borrow_mut();
            if tracking.positions.contains_key(&id) {
                return Err(Error::invalid_operation(format!("id {id} is already tracked")));
            }
            let pos = tracking.order.len();
            tracking.order.push(id);
            tracking.positions.insert(id, pos);
        }
        if send_signal_change {
            self.signal(id)?;
        }
        Ok(())
    }

    pub fn remove_id(&self, id: ObjectId) -> Result<()> {
        {
            let mut tracking = self.tracking.borrow_mut();
            if !tracking.positions.contains_key(&id) {
                return Err(Error::not_found(id));
            }
            tracking.order.retain(|x| *x != id);
            tracking.reindex();
        }
        self.signal(id)
    }

    /// Moves `id` to `pos` in the list (clamped to the end).
    pub fn move_id(&self, id: ObjectId, pos: usize) -> Result<()> {
        if !self.contains(id) {
            return Err(Error::not_found(id));
        }
        self.reorder(&[id], |order| {
            order.retain(|x| *x != id);
            let pos = pos.min(order.len());
            order.insert(pos, id);
        })
    }

    /// Moves `ids` in front of `anchor`, or to the end when `anchor` is
    /// `None`. The moved ids keep their current relative order.
    pub fn move_id_list(&self, ids: &[ObjectId], anchor: Option<ObjectId>) -> Result<()> {
        let moved: HashSet<ObjectId> = ids.iter().copied().collect();
        if let Some(missing) = ids.iter().find(|id| !self.contains(**id)) {
            return Err(Error::not_found(*missing));
        }
        if let Some(anchor) = anchor {
            if moved.contains(&anchor) {
                return Err(Error::invalid_operation("anchor cannot be one of the moved ids"));
            }
            if !self.contains(anchor) {
                return Err(Error::not_found(anchor));
            }
        }

        self.reorder(ids, |order| {
            let (moving, mut rest): (Vec<ObjectId>, Vec<ObjectId>) =
                order.iter().partition(|id| moved.contains(*id));
            let at = anchor
                .and_then(|anchor| rest.iter().position(|x| *x == anchor))
                .unwrap_or(rest.len());
            rest.splice(at..at, moving);
            *order = rest;
        })
    }

    /// Hides moved ids, applies the new order, then shows them again, so the
    /// view removes and re-adds each of them exactly once.
    fn reorder<F>(&self, ids: &[ObjectId], apply: F) -> Result<()>
    where
        F: FnOnce(&mut Vec<ObjectId>),
    {
        self.tracking.borrow_mut().detached.extend(ids.iter().copied());
        for id in ids {
            self.signal(*id)?;
        }
        {
            let mut tracking = self.tracking.borrow_mut();
            apply(&mut tracking.order);
            tracking.reindex();
            tracking.detached.clear();
        }
        for id in ids {
            self.signal(*id)?;
        }
        Ok(())
    }

    /// Restricts the view to tracked objects matching `filter`.
    pub fn set_filter<F>(&self, filter: F) -> Result<()>
    where
        F: Fn(&Row) -> bool + 'static,
    {
        self.tracking.borrow_mut().filter = Some(Rc::new(filter));
        self.view.recompute_filters()
    }

    pub fn clear_filter(&self) -> Result<()> {
        self.tracking.borrow_mut().filter = None;
        self.view.recompute_filters()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    fn setup(n: usize) -> (Database, Vec<ObjectId>) {
        let db = Database::new();
        let ids = (0..n).map(|_| db.create(vec![]).unwrap()).collect();
        (db, ids)
    }

    #[test]
    fn test_initial_order() {
        let (db, ids) = setup(3);
        let list = TrackedIdList::new(&db.root(), [ids[2], ids[0], ids[2]]).unwrap();
        assert_eq!(list.ids(), vec![ids[2], ids[0]]);
        assert_eq!(list.view().ids(), vec![ids[2], ids[0]]);
        assert_eq!(list.position(ids[0]), Some(1));
        assert!(!list.contains(ids[1]));
    }

    #[test]
    fn test_append_without_signal_waits_for_change() {
        let (db, ids) = setup(2);
        let list = TrackedIdList::new(&db.root(), []).unwrap();
        list.append_id(ids[1], false).unwrap();
        assert!(list.view().is_empty());
        db.signal_change(ids[1], false).unwrap();
        assert_eq!(list.view().ids(), vec![ids[1]]);

        list.append_id(ids[0], true).unwrap();
        assert_eq!(list.view().ids(), vec![ids[1], ids[0]]);
        assert!(list.append_id(ids[0], true).is_err());
    }

    #[test]
    fn test_remove_id() {
        let (db, ids) = setup(3);
        let list = TrackedIdList::new(&db.root(), ids.clone()).unwrap();
        list.remove_id(ids[1]).unwrap();
        assert_eq!(list.view().ids(), vec![ids[0], ids[2]]);
        assert_eq!(list.position(ids[2]), Some(1));
        assert!(list.remove_id(ids[1]).unwrap_err().is_not_found());
    }

    #[test]
    fn test_move_id_clamps() {
        let (db, ids) = setup(3);
        let list = TrackedIdList::new(&db.root(), ids.clone()).unwrap();
        list.move_id(ids[0], 10).unwrap();
        assert_eq!(list.ids(), vec![ids[1], ids[2], ids[0]]);
        assert_eq!(list.view().ids(), list.ids());
    }

    #[test]
    fn test_move_id_list_rejects_bad_anchor() {
        let (db, ids) = setup(3);
        let list = TrackedIdList::new(&db.root(), ids[..2].to_vec()).unwrap();
        assert!(list.move_id_list(&[ids[0]], Some(ids[0])).is_err());
        assert!(list.move_id_list(&[ids[0]], Some(ids[2])).unwrap_err().is_not_found());
        assert!(list.move_id_list(&[ids[2]], None).unwrap_err().is_not_found());
        assert_eq!(list.ids(), ids[..2].to_vec());
    }

    #[test]
    fn test_filter() {
        let (db, ids) = setup(4);
        let list = TrackedIdList::new(&db.root(), ids.clone()).unwrap();
        list.set_filter(|row| row.id() % 2 == 0).unwrap();
        assert_eq!(list.view().ids(), vec![ids[1], ids[3]]);
        list.clear_filter().unwrap();
        assert_eq!(list.view().len(), 4);
    }
}
