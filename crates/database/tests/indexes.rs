//! Integration tests for indexes and index views.

use livedb::{Database, Error, IndexSpec, ObjectId, Row, Value, View};
use proptest::prelude::*;
use proptest::strategy::ValueTree;
use proptest::test_runner::TestRunner;
use std::cell::Cell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

#[derive(Clone, Default)]
struct Counts {
    adds: Rc<Cell<usize>>,
    removes: Rc<Cell<usize>>,
    changes: Rc<Cell<usize>>,
}

impl Counts {
    fn attach(&self, view: &View) {
        let adds = self.adds.clone();
        view.add_add_callback(move |_, _| adds.set(adds.get() + 1));
        let removes = self.removes.clone();
        view.add_remove_callback(move |_, _| removes.set(removes.get() + 1));
        let changes = self.changes.clone();
        view.add_change_callback(move |_, _| changes.set(changes.get() + 1));
    }

    fn get(&self) -> (usize, usize, usize) {
        (self.adds.get(), self.removes.get(), self.changes.get())
    }
}

fn create_objects(db: &Database, count: usize) -> Vec<ObjectId> {
    (0..count).map(|_| db.create(vec![]).unwrap()).collect()
}

fn mod_key(modulus: u64) -> IndexSpec {
    IndexSpec::single(move |row| Value::Int64((row.id() % modulus) as i64))
}

fn by_id(a: &Row, b: &Row) -> bool {
    a.id() < b.id()
}

fn value(row: &Row) -> i64 {
    row.get_i64(0).unwrap_or_default()
}

#[test]
fn test_basic_index_filter() {
    let db = Database::new();
    let root = db.root();
    create_objects(&db, 100);
    let mod10 = root.create_index(mod_key(10)).unwrap();
    let filtered = root.filter_with_index(mod10, 0i64).unwrap();
    assert_eq!(filtered.len(), 10);

    create_objects(&db, 50);
    assert_eq!(filtered.len(), 15);
    for i in 0..10i64 {
        let row = root.get_item_with_index(mod10, i).unwrap().unwrap();
        assert_eq!((row.id() % 10) as i64, i);
    }
    assert!(root.get_item_with_index(mod10, 10i64).unwrap().is_none());
    let fallback = root
        .get_item_with_index(mod10, -1i64)
        .unwrap()
        .map_or(123123, |row| row.id());
    assert_eq!(fallback, 123123);

    let counts = Counts::default();
    counts.attach(&filtered);
    create_objects(&db, 50);
    assert_eq!(counts.get(), (5, 0, 0));
    assert!(filtered.iter().all(|row| row.id() % 10 == 0));

    db.remove(filtered.get(0).unwrap().id()).unwrap();
    assert_eq!(filtered.len(), 19);
    assert_eq!(counts.get(), (5, 1, 0));
    db.signal_change(filtered.get(0).unwrap().id(), false).unwrap();
    assert_eq!(counts.get(), (5, 1, 1));

    let kept = filtered.get(0).unwrap().id();
    root.remove_view(&filtered).unwrap();
    create_objects(&db, 50);
    db.signal_change(kept, false).unwrap();
    db.remove(kept).unwrap();
    assert_eq!(counts.get(), (5, 1, 1));
}

#[test]
fn test_index_changes() {
    let db = Database::new();
    let root = db.root();
    let foo = db.create(vec![Value::from("blue")]).unwrap();
    db.create(vec![Value::from("red")]).unwrap();
    let baz = db.create(vec![Value::from("red")]).unwrap();

    let color = root
        .create_index(IndexSpec::single(|row| row.get(0).cloned().unwrap_or(Value::Null)))
        .unwrap();
    let blue = root.filter_with_index(color, "blue").unwrap();
    let red = root.filter_with_index(color, "red").unwrap();
    assert_eq!((blue.len(), red.len()), (1, 2));

    db.update(baz, |row| row.set(0, "blue")).unwrap();
    assert_eq!((blue.len(), red.len()), (2, 1));

    // Moving into a bucket nobody has looked at yet.
    db.update(foo, |row| row.set(0, "green")).unwrap();
    let green = root.filter_with_index(color, "green").unwrap();
    assert_eq!((blue.len(), red.len(), green.len()), (1, 1, 1));
}

#[test]
fn test_key_change_moves_between_buckets() {
    let db = Database::new();
    let root = db.root();
    let id = db.create(vec![Value::Int64(1)]).unwrap();
    let index = root
        .create_index(IndexSpec::single(|row| Value::Int64(value(row))))
        .unwrap();
    let (one, two) = (
        root.filter_with_index(index, 1i64).unwrap(),
        root.filter_with_index(index, 2i64).unwrap(),
    );
    let (from, to) = (Counts::default(), Counts::default());
    from.attach(&one);
    to.attach(&two);

    db.update(id, |row| row.set(0, 2i64)).unwrap();
    assert_eq!(from.get(), (0, 1, 0));
    assert_eq!(to.get(), (1, 0, 0));
    assert_eq!(two.ids(), vec![id]);
}

#[test]
fn test_remove_indexed_views() {
    let db = Database::new();
    let root = db.root();
    create_objects(&db, 100);
    let mod10 = root.create_index(mod_key(10)).unwrap();
    let views: Vec<View> = (0..10i64)
        .map(|i| root.filter_with_index(mod10, i).unwrap())
        .collect();
    for view in &views[..5] {
        root.remove_view(view).unwrap();
    }
    for view in &views[5..] {
        view.unlink().unwrap();
    }
    create_objects(&db, 10);
    assert!(views.iter().all(|view| view.len() == 10 && !view.is_linked()));
}

#[test]
fn test_recompute_index() {
    let shift = Rc::new(Cell::new(0u64));
    let db = Database::new();
    let root = db.root();
    create_objects(&db, 100);
    let s = shift.clone();
    let mod10 = root
        .create_index(IndexSpec::single(move |row| Value::Int64(((row.id() + s.get()) % 10) as i64)))
        .unwrap();
    create_objects(&db, 50);
    let filtered = root.filter_with_index(mod10, 0i64).unwrap();
    create_objects(&db, 50);
    assert_eq!(filtered.len(), 20);

    db.remove(filtered.get(0).unwrap().id()).unwrap();
    assert_eq!(filtered.len(), 19);

    shift.set(1);
    db.recompute_filters().unwrap();
    assert_eq!(filtered.len(), 20);
    assert!(filtered.iter().all(|row| (row.id() + 1) % 10 == 0));
}

#[test]
fn test_large_set() {
    let db = Database::new();
    let root = db.root();
    let mod100 = root.create_index(mod_key(100)).unwrap();
    create_objects(&db, 10_000);
    let filtered = root
        .filter_with_index(mod100, 0i64)
        .unwrap()
        .sort(by_id, false)
        .unwrap();
    assert_eq!(filtered.len(), 100);
    assert_eq!(filtered.get(0).map(|r| r.id()), Some(100));
}

#[test]
fn test_sorted_index() {
    let db = Database::new();
    let root = db.root();
    let mod10 = root
        .create_index(mod_key(10).sorted(|a, b| value(a) < value(b), true))
        .unwrap();
    for v in 0..100 {
        db.create(vec![Value::Int64(v)]).unwrap();
    }
    let is_sorted = |view: &View| {
        let values: Vec<i64> = view.iter().map(|r| value(&r)).collect();
        values.windows(2).all(|w| w[0] < w[1])
    };

    let filtered = root.filter_with_index(mod10, 0i64).unwrap();
    assert_eq!(filtered.len(), 10);
    assert!(is_sorted(&filtered));

    let first = filtered.get(0).unwrap().id();
    let second = filtered.get(1).unwrap().id();
    db.modify(first, |row| row.set(0, 1000i64)).unwrap();
    db.modify(second, |row| row.set(0, -1000i64)).unwrap();
    assert!(!is_sorted(&filtered));

    db.signal_change(first, false).unwrap();
    db.signal_change(second, false).unwrap();
    assert!(is_sorted(&filtered));

    let fresh = root.filter_with_index(mod10, 0i64).unwrap();
    assert_eq!(fresh.len(), 10);
    assert!(is_sorted(&fresh));
}

#[test]
fn test_sorted_bucket_ties_follow_owner_order() {
    let db = Database::new();
    let root = db.root();
    let a = db.create(vec![Value::Int64(5), Value::Int64(0)]).unwrap();
    let b = db.create(vec![Value::Int64(5), Value::Int64(0)]).unwrap();
    let flag = IndexSpec::single(|row| row.get(1).cloned().unwrap_or(Value::Null));
    let index = root
        .create_index(flag.sorted(|a, b| value(a) < value(b), true))
        .unwrap();
    let flagged = root.filter_with_index(index, 1i64).unwrap();

    for id in [b, a] {
        db.update(id, |row| row.set(1, 1i64)).unwrap();
    }
    assert_eq!(flagged.ids(), vec![a, b]);

    let fresh = root
        .create_index(
            IndexSpec::single(|row| row.get(1).cloned().unwrap_or(Value::Null))
                .sorted(|a, b| value(a) < value(b), false),
        )
        .unwrap();
    assert_eq!(root.filter_with_index(fresh, 1i64).unwrap().ids(), flagged.ids());
}

#[test]
fn test_change_index_value() {
    let db = Database::new();
    let root = db.root();
    create_objects(&db, 100);
    let mod10 = root.create_index(mod_key(10).sorted(by_id, true)).unwrap();
    let filtered = root.filter_with_index(mod10, 0i64).unwrap();
    let counts = Counts::default();
    counts.attach(&filtered);

    filtered.change_index_value(mod10, 1i64).unwrap();
    assert_eq!(filtered.len(), 10);
    assert_eq!(counts.get(), (10, 10, 0));

    let zeros = root.filter_with_index(mod10, 0i64).unwrap();
    let ones = root.filter_with_index(mod10, 1i64).unwrap();
    assert_eq!(filtered.ids(), ones.ids());
    assert!(filtered.ids().iter().zip(zeros.ids()).all(|(a, b)| *a != b));

    create_objects(&db, 100);
    assert_eq!(filtered.len(), 20);
    assert_eq!(counts.get(), (20, 10, 0));

    filtered.change_index_value(mod10, 0i64).unwrap();
    assert_eq!(filtered.ids(), zeros.ids());
    assert_eq!(filtered.len(), 20);
    assert_eq!(counts.get(), (40, 30, 0));

    root.remove_view(&filtered).unwrap();
    create_objects(&db, 100);
    assert_eq!(counts.get(), (40, 30, 0));
}

#[test]
fn test_change_index_value_rejects_other_views() {
    let db = Database::new();
    let root = db.root();
    let first = root.create_index(mod_key(2)).unwrap();
    let second = root.create_index(mod_key(3)).unwrap();
    let bucket = root.filter_with_index(first, 0i64).unwrap();

    assert_eq!(
        root.change_index_value(first, 1i64).unwrap_err(),
        Error::NotIndexView { view: root.id() }
    );
    assert_eq!(
        bucket.change_index_value(second, 1i64).unwrap_err(),
        Error::UnknownIndex { index: second }
    );

    let other = root.filter(|_| true).unwrap();
    assert_eq!(
        other.filter_with_index(first, 0i64).unwrap_err(),
        Error::UnknownIndex { index: first }
    );
    assert!(other.get_item_with_index(first, 0i64).is_err());
}

#[test]
fn test_nth_item_with_index() {
    let db = Database::new();
    let root = db.root();
    create_objects(&db, 6);
    let parity = root.create_index(mod_key(2)).unwrap();

    // Buckets in key order: 0 -> [2, 4, 6], 1 -> [1, 3, 5].
    let nth: Vec<ObjectId> = (0..6)
        .map(|n| root.nth_item_with_index(parity, n).unwrap().unwrap().id())
        .collect();
    assert_eq!(nth, vec![2, 4, 6, 1, 3, 5]);
    assert!(root.nth_item_with_index(parity, 6).unwrap().is_none());
}

#[test]
fn test_index_on_derived_view() {
    let db = Database::new();
    let root = db.root();
    for v in 0..10 {
        db.create(vec![Value::Int64(v)]).unwrap();
    }
    let doubled = root
        .map(|row| Row::new(row.id(), vec![Value::Int64(value(row) * 2)]))
        .unwrap();
    let large = doubled.filter(|row| value(row) >= 10).unwrap();
    let by_tens = large
        .create_index(IndexSpec::single(|row| Value::Int64(value(row) / 10)))
        .unwrap();
    let ones = large.filter_with_index(by_tens, 1i64).unwrap();
    let values: Vec<i64> = ones.iter().map(|r| value(&r)).collect();
    assert_eq!(values, vec![10, 12, 14, 16, 18]);

    db.create(vec![Value::Int64(7)]).unwrap();
    assert_eq!(ones.len(), 6);
}

fn random_keys() -> impl Strategy<Value = BTreeSet<i64>> {
    prop::collection::btree_set(0i64..=10, 0..=4)
}

/// Draws from `strategy` with a deterministic generator.
fn draw<S: Strategy>(runner: &mut TestRunner, strategy: &S) -> S::Value {
    strategy
        .new_tree(runner)
        .expect("strategy draws a value")
        .current()
}

fn keyed_row(keys: &BTreeSet<i64>) -> Vec<Value> {
    keys.iter().map(|k| Value::Int64(*k)).collect()
}

struct MultiIndexFixture {
    db: Database,
    index: livedb::IndexId,
    keys: BTreeMap<ObjectId, BTreeSet<i64>>,
    views: BTreeMap<i64, View>,
    runner: TestRunner,
}

impl MultiIndexFixture {
    fn new() -> Self {
        let db = Database::new();
        let mut runner = TestRunner::deterministic();
        let mut keys = BTreeMap::new();
        for _ in 0..20 {
            let set = draw(&mut runner, &random_keys());
            let id = db.create(keyed_row(&set)).unwrap();
            keys.insert(id, set);
        }
        let index = db
            .root()
            .create_index(IndexSpec::multi(|row| row.values().to_vec()))
            .unwrap();
        let views = (0..=10i64)
            .map(|k| (k, db.root().filter_with_index(index, k).unwrap()))
            .collect();
        Self {
            db,
            index,
            keys,
            views,
            runner,
        }
    }

    fn check_views(&self) {
        for key in 0..=10i64 {
            let goal: BTreeSet<ObjectId> = self
                .keys
                .iter()
                .filter(|(_, set)| set.contains(&key))
                .map(|(id, _)| *id)
                .collect();
            let kept: BTreeSet<ObjectId> = self.views[&key].ids().into_iter().collect();
            let fresh: BTreeSet<ObjectId> = self
                .db
                .root()
                .filter_with_index(self.index, key)
                .unwrap()
                .ids()
                .into_iter()
                .collect();
            assert_eq!(kept, goal, "bucket {key}");
            assert_eq!(fresh, goal, "bucket {key}");
        }
    }

    fn rekey(&mut self, id: ObjectId) -> (BTreeSet<i64>, BTreeSet<i64>) {
        let new = draw(&mut self.runner, &random_keys());
        let values = keyed_row(&new);
        self.db.modify(id, |row| *row.values_mut() = values).unwrap();
        self.db.signal_change(id, false).unwrap();
        let old = self.keys.insert(id, new.clone()).unwrap_or_default();
        (old, new)
    }
}

#[test]
fn test_multi_index_initial_views() {
    MultiIndexFixture::new().check_views();
}

#[test]
fn test_multi_index_remove() {
    let mut fixture = MultiIndexFixture::new();
    while let Some((id, _)) = fixture.keys.pop_last() {
        fixture.db.remove(id).unwrap();
        fixture.check_views();
    }
}

#[test]
fn test_multi_index_change() {
    let mut fixture = MultiIndexFixture::new();
    for round in 0..3 {
        let ids: Vec<ObjectId> = fixture.keys.keys().copied().collect();
        for id in ids {
            fixture.rekey(id);
            fixture.check_views();
        }
        assert_eq!(fixture.db.len(), 20, "round {round}");
    }
}

#[test]
fn test_multi_index_callbacks() {
    let mut fixture = MultiIndexFixture::new();
    let counts = Counts::default();
    counts.attach(&fixture.views[&0]);

    let mut goal = (0, 0, 0);
    let ids: Vec<ObjectId> = fixture.keys.keys().copied().collect();
    for id in ids {
        let (old, new) = fixture.rekey(id);
        match (old.contains(&0), new.contains(&0)) {
            (false, true) => goal.0 += 1,
            (true, false) => goal.1 += 1,
            (true, true) => goal.2 += 1,
            (false, false) => {}
        }
        assert_eq!(counts.get(), goal);
    }
}
