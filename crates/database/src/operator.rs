//! View operators and per-view state.
//!
//! Views live in the database's arena, addressed by `ViewId`. Each entry
//! records how the view derives from its parent (`Operator`), its current
//! members (`Sequence`), its callbacks and the views and indexes that
//! derive from it in turn.

use crate::sequence::Sequence;
use crate::sort::SortOrder;
use hashbrown::HashMap;
use livedb_core::{IndexId, ObjectId, Row, Value, ViewId};
use livedb_reactive::CallbackRegistry;
use std::rc::Rc;

/// Membership predicate of a filter view.
pub type Predicate = Rc<dyn Fn(&Row) -> bool>;

/// Derivation function of a map view.
pub type Mapper = Rc<dyn Fn(&Row) -> Row>;

pub(crate) enum Operator {
    /// The store itself.
    Root,
    /// Filter, sort, or both. A sort is a filter without predicate.
    Filter {
        predicate: Option<Predicate>,
        order: Option<SortOrder>,
    },
    /// 1:1 derived values in parent order.
    Map(Mapper),
    /// Sub-view over one bucket of an index.
    Bucket { index: IndexId, key: Value },
}

/// What kind of view a handle refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViewKind {
    Root,
    Filter,
    Sort,
    SortedFilter,
    Map,
    Index,
}

impl Operator {
    pub fn kind(&self) -> ViewKind {
        match self {
            Operator::Root => ViewKind::Root,
            Operator::Filter { predicate: Some(_), order: None } => ViewKind::Filter,
            Operator::Filter { predicate: None, .. } => ViewKind::Sort,
            Operator::Filter { predicate: Some(_), order: Some(_) } => ViewKind::SortedFilter,
            Operator::Map(_) => ViewKind::Map,
            Operator::Bucket { .. } => ViewKind::Index,
        }
    }

    pub fn order(&self) -> Option<&SortOrder> {
        match self {
            Operator::Filter { order, .. } => order.as_ref(),
            _ => None,
        }
    }
}

pub(crate) struct ViewState {
    pub op: Operator,
    pub parent: Option<ViewId>,
    /// View whose row table holds the values this view sees: the root, or the
    /// nearest map at or above this view.
    pub source: ViewId,
    pub children: Vec<ViewId>,
    pub indexes: Vec<IndexId>,
    pub seq: Sequence,
    /// Derived rows of a map view, keyed by source object id.
    pub mapped: HashMap<ObjectId, Row>,
    pub callbacks: CallbackRegistry,
    pub linked: bool,
}

impl ViewState {
    pub fn new(op: Operator, parent: Option<ViewId>, source: ViewId, seq: Sequence) -> Self {
        Self {
            op,
            parent,
            source,
            children: Vec::new(),
            indexes: Vec::new(),
            seq,
            mapped: HashMap::new(),
            callbacks: CallbackRegistry::new(),
            linked: true,
        }
    }
}

/// Position for a member of an unsorted derived sequence that just appeared
/// at `at` in its parent: right after its nearest preceding parent item that
/// is also a member.
pub(crate) fn follow_position<F>(parent: &[ObjectId], at: usize, len: usize, mut position_of: F) -> usize
where
    F: FnMut(ObjectId) -> Option<usize>,
{
    if len == 0 {
        return 0;
    }
    if at + 1 >= parent.len() {
        return len;
    }
    parent[..at.min(parent.len())]
        .iter()
        .rev()
        .find_map(|&id| position_of(id))
        .map_or(0, |pos| pos + 1)
}
