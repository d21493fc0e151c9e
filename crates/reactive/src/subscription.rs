//! Callback registration for views.
//!
//! Each view owns one `CallbackRegistry`. Callbacks are kept in registration
//! order, which is the order they fire in.

use crate::delta::DeltaKind;
use livedb_core::{ObjectId, Row};
use std::rc::Rc;

/// Unique identifier for a registered callback, scoped to its view.
pub type CallbackId = u64;

/// Callback invoked with the affected object and its id.
///
/// For views below a map the row is the mapped output and the id is the id of
/// the source object it was derived from.
pub type Callback = Rc<dyn Fn(&Row, ObjectId)>;

struct Registration {
    id: CallbackId,
    kind: DeltaKind,
    callback: Callback,
}

/// Manages the add, remove and change callbacks of one view.
pub struct CallbackRegistry {
    registrations: Vec<Registration>,
    /// Next callback ID to assign
    next_id: CallbackId,
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CallbackRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            registrations: Vec::new(),
            next_id: 1,
        }
    }

    /// Registers `callback` for events of `kind`.
    ///
    /// Returns the ID that can be used to remove the callback again.
    pub fn register<F>(&mut self, kind: DeltaKind, callback: F) -> CallbackId
    where
        F: Fn(&Row, ObjectId) + 'static,
    {
        let id = self.next_id;
        self.next_id += 1;
        self.registrations.push(Registration {
            id,
            kind,
            callback: Rc::new(callback),
        });
        id
    }

    /// Removes a callback by ID.
    ///
    /// Returns true if the callback was found and removed.
    pub fn unregister(&mut self, id: CallbackId) -> bool {
        let before = self.registrations.len();
        self.registrations.retain(|r| r.id != id);
        self.registrations.len() != before
    }

    /// Returns the callbacks for `kind` in registration order.
    ///
    /// The callbacks are cloned out so the caller can invoke them after
    /// releasing any borrow of the registry's owner.
    pub fn callbacks(&self, kind: DeltaKind) -> Vec<Callback> {
        self.registrations
            .iter()
            .filter(|r| r.kind == kind)
            .map(|r| r.callback.clone())
            .collect()
    }

    /// Returns true if at least one callback listens for `kind`.
    pub fn listens(&self, kind: DeltaKind) -> bool {
        self.registrations.iter().any(|r| r.kind == kind)
    }

    /// Drops every callback, releasing whatever they captured.
    pub fn clear(&mut self) {
        self.registrations.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use livedb_core::Value;
    use std::cell::RefCell;

    fn make_row(id: u64, value: i64) -> Row {
        Row::new(id, vec![Value::Int64(id as i64), Value::Int64(value)])
    }

    #[test]
    fn test_register_assigns_ids() {
        let mut registry = CallbackRegistry::new();

        let id1 = registry.register(DeltaKind::Add, |_, _| {});
        let id2 = registry.register(DeltaKind::Remove, |_, _| {});

        assert_eq!(id1, 1);
        assert_eq!(id2, 2);
        assert!(registry.listens(DeltaKind::Add));
        assert!(registry.listens(DeltaKind::Remove));
    }

    #[test]
    fn test_unregister() {
        let mut registry = CallbackRegistry::new();

        let id = registry.register(DeltaKind::Change, |_, _| {});
        assert!(registry.listens(DeltaKind::Change));

        assert!(registry.unregister(id));
        assert!(!registry.listens(DeltaKind::Change));

        assert!(!registry.unregister(id)); // Already removed
    }

    #[test]
    fn test_callbacks_filtered_by_kind() {
        let mut registry = CallbackRegistry::new();
        registry.register(DeltaKind::Add, |_, _| {});
        registry.register(DeltaKind::Add, |_, _| {});
        registry.register(DeltaKind::Remove, |_, _| {});

        assert_eq!(registry.callbacks(DeltaKind::Add).len(), 2);
        assert_eq!(registry.callbacks(DeltaKind::Remove).len(), 1);
        assert!(registry.callbacks(DeltaKind::Change).is_empty());
    }

    #[test]
    fn test_callbacks_fire_in_registration_order() {
        let mut registry = CallbackRegistry::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        for tag in 0..3 {
            let log = log.clone();
            registry.register(DeltaKind::Add, move |_, id| log.borrow_mut().push((tag, id)));
        }

        let row = make_row(7, 10);
        for callback in registry.callbacks(DeltaKind::Add) {
            callback(&row, row.id());
        }

        assert_eq!(*log.borrow(), vec![(0, 7), (1, 7), (2, 7)]);
    }

    #[test]
    fn test_clear() {
        let mut registry = CallbackRegistry::new();
        registry.register(DeltaKind::Add, |_, _| {});
        registry.register(DeltaKind::Change, |_, _| {});

        registry.clear();
        assert!(!registry.listens(DeltaKind::Add));
        assert!(!registry.listens(DeltaKind::Change));
    }
}
