//! Indexes: objects of a view grouped into buckets by key.
//!
//! An index partitions the members of its owner view by the value(s) of a
//! key function. A multi-valued key function puts one object into several
//! buckets. The last computed keys of every object are cached so that a
//! change can be resolved against the object's pre-change keys.

use crate::operator::follow_position;
use crate::sequence::Sequence;
use crate::sort::{stable_sort_by, Comparator, SortOrder};
use hashbrown::HashMap;
use livedb_core::{ObjectId, Row, Value, ViewId};
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Keys of one object. Most objects have one or two.
pub(crate) type KeySet = SmallVec<[Value; 2]>;

/// Key extraction of an index.
#[derive(Clone)]
pub enum IndexKey {
    /// One key per object.
    Single(Rc<dyn Fn(&Row) -> Value>),
    /// Any number of keys per object; duplicates are ignored.
    Multi(Rc<dyn Fn(&Row) -> Vec<Value>>),
}

impl IndexKey {
    pub(crate) fn extract(&self, row: &Row) -> KeySet {
        match self {
            IndexKey::Single(f) => {
                let mut keys = KeySet::new();
                keys.push(f(row));
                keys
            }
            IndexKey::Multi(f) => {
                let mut keys = KeySet::new();
                for key in f(row) {
                    if !keys.contains(&key) {
                        keys.push(key);
                    }
                }
                keys
            }
        }
    }
}

/// Definition of an index, passed to [`View::create_index`](crate::View::create_index).
///
/// ```rust
/// use livedb::{IndexSpec, Value};
///
/// let by_color = IndexSpec::single(|row| row.get(0).cloned().unwrap_or(Value::Null));
/// let by_tag = IndexSpec::multi(|row| row.values()[1..].to_vec())
///     .sorted(|a, b| a.get_i64(0) < b.get_i64(0), true);
/// # let _ = (by_color, by_tag);
/// ```
#[derive(Clone)]
pub struct IndexSpec {
    pub(crate) key: IndexKey,
    pub(crate) order: Option<SortOrder>,
}

impl IndexSpec {
    pub fn single<F>(key: F) -> Self
    where
        F: Fn(&Row) -> Value + 'static,
    {
        Self {
            key: IndexKey::Single(Rc::new(key)),
            order: None,
        }
    }

    pub fn multi<F>(keys: F) -> Self
    where
        F: Fn(&Row) -> Vec<Value> + 'static,
    {
        Self {
            key: IndexKey::Multi(Rc::new(keys)),
            order: None,
        }
    }

    /// Keeps every bucket ordered by `less`. With `resort`, a member whose
    /// change breaks the order is moved (as a remove then add).
    pub fn sorted<F>(mut self, less: F, resort: bool) -> Self
    where
        F: Fn(&Row, &Row) -> bool + 'static,
    {
        let less: Comparator = Rc::new(less);
        self.order = Some(SortOrder::new(less, resort));
        self
    }
}

pub(crate) struct IndexState {
    pub owner: ViewId,
    pub key: IndexKey,
    pub order: Option<SortOrder>,
    /// Last computed keys of every member of the owner view.
    pub keys: HashMap<ObjectId, KeySet>,
    /// Non-empty buckets in key order.
    pub buckets: BTreeMap<Value, Sequence>,
    /// Live bucket views per key.
    pub views: BTreeMap<Value, Vec<ViewId>>,
}

impl IndexState {
    pub fn new(owner: ViewId, spec: IndexSpec) -> Self {
        Self {
            owner,
            key: spec.key,
            order: spec.order,
            keys: HashMap::new(),
            buckets: BTreeMap::new(),
            views: BTreeMap::new(),
        }
    }

    pub fn bucket_ids(&self, key: &Value) -> &[ObjectId] {
        self.buckets.get(key).map_or(&[], |b| b.ids())
    }

    /// Rebuilds every bucket from the cached keys, in owner order.
    pub fn fill_buckets(&mut self, owner_ids: &[ObjectId]) {
        let mut buckets: BTreeMap<Value, Vec<ObjectId>> = BTreeMap::new();
        for id in owner_ids {
            if let Some(keys) = self.keys.get(id) {
                for key in keys {
                    buckets.entry(key.clone()).or_default().push(*id);
                }
            }
        }
        self.buckets = buckets
            .into_iter()
            .map(|(key, ids)| (key, Sequence::from_ids(ids)))
            .collect();
    }

    /// Sorts every bucket by the index comparator, reading rows through `row`.
    pub fn sort_buckets<'a, R>(&mut self, row: R)
    where
        R: Fn(ObjectId) -> Option<&'a Row>,
    {
        let Some(order) = self.order.clone() else {
            return;
        };
        for bucket in self.buckets.values_mut() {
            let mut ids = bucket.ids().to_vec();
            stable_sort_by(&mut ids, |a, b| match (row(*a), row(*b)) {
                (Some(a), Some(b)) => (order.less)(a, b),
                _ => false,
            });
            bucket.replace(ids);
        }
    }

    /// Unsorted insertion point of `id` into bucket `key`, given its position
    /// in the owner view.
    pub fn follow_position(&self, key: &Value, owner_ids: &[ObjectId], at: usize) -> usize {
        let Some(bucket) = self.buckets.get(key) else {
            return 0;
        };
        follow_position(owner_ids, at, bucket.len(), |id| {
            let in_bucket = self.keys.get(&id).is_some_and(|keys| keys.contains(key));
            if in_bucket {
                bucket.position(id)
            } else {
                None
            }
        })
    }

    pub fn register_view(&mut self, key: Value, view: ViewId) {
        self.views.entry(key).or_default().push(view);
    }

    pub fn unregister_view(&mut self, key: &Value, view: ViewId) {
        if let Some(views) = self.views.get_mut(key) {
            views.retain(|v| *v != view);
            if views.is_empty() {
                self.views.remove(key);
            }
        }
    }

    pub fn views_for(&self, key: &Value) -> Vec<ViewId> {
        self.views.get(key).cloned().unwrap_or_default()
    }

    /// All live bucket views with their keys, in key order.
    pub fn all_views(&self) -> Vec<(Value, ViewId)> {
        self.views
            .iter()
            .flat_map(|(key, views)| views.iter().map(move |v| (key.clone(), *v)))
            .collect()
    }
}
