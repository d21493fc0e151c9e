//! Object rows and id allocation.
//!
//! A `Row` is the stored state of one object: its id, a version counter bumped
//! on every signalled change, and its positional field values.

use crate::types::ObjectId;
use crate::value::Value;
use serde::{Deserialize, Serialize};

/// Hands out object ids for one store.
///
/// Ids grow monotonically and are never reused. After a restore the allocator
/// is bumped past every restored id.
#[derive(Clone, Debug)]
pub struct IdAllocator {
    next: ObjectId,
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new(1)
    }
}

impl IdAllocator {
    /// Creates an allocator whose first id is `first`.
    pub fn new(first: ObjectId) -> Self {
        Self { next: first }
    }

    /// Allocates the next id.
    pub fn next_id(&mut self) -> ObjectId {
        let id = self.next;
        self.next += 1;
        id
    }

    /// Returns the most recently allocated id, or the id before the first one
    /// when nothing was allocated yet.
    #[inline]
    pub fn last_id(&self) -> ObjectId {
        self.next.saturating_sub(1)
    }

    /// Makes sure every future id is greater than `id`.
    pub fn bump_past(&mut self, id: ObjectId) {
        self.next = self.next.max(id.saturating_add(1));
    }
}

/// The stored state of one object.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Row {
    /// Unique identifier for this object.
    id: ObjectId,
    /// Version number for change detection. Incremented on each signalled change.
    version: u64,
    /// Field values, indexed by position.
    values: Vec<Value>,
}

impl Row {
    /// Creates a new row with the given ID and values.
    /// Version defaults to 1 for new rows.
    pub fn new(id: ObjectId, values: Vec<Value>) -> Self {
        Self { id, version: 1, values }
    }

    /// Returns the object ID.
    #[inline]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Returns the version number.
    #[inline]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Increments the version number and returns the new value.
    #[inline]
    pub fn increment_version(&mut self) -> u64 {
        self.version = self.version.wrapping_add(1);
        self.version
    }

    #[inline]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    #[inline]
    pub fn values_mut(&mut self) -> &mut Vec<Value> {
        &mut self.values
    }

    /// Gets the value of field `index`.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Gets field `index` as an integer, if it holds one.
    pub fn get_i64(&self, index: usize) -> Option<i64> {
        self.get(index).and_then(Value::as_i64)
    }

    /// Gets field `index` as a string slice, if it holds one.
    pub fn get_str(&self, index: usize) -> Option<&str> {
        self.get(index).and_then(Value::as_str)
    }

    /// Sets the value of field `index`, growing the row with nulls if needed.
    pub fn set(&mut self, index: usize, value: impl Into<Value>) {
        if index >= self.values.len() {
            self.values.resize(index + 1, Value::Null);
        }
        self.values[index] = value.into();
    }

    /// Returns the number of fields in this row.
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl PartialEq for Row {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.values == other.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_new() {
        let row = Row::new(1, vec![Value::Int64(42), Value::String("Alice".into())]);
        assert_eq!(row.id(), 1);
        assert_eq!(row.version(), 1);
        assert_eq!(row.len(), 2);
    }

    #[test]
    fn test_row_get_value() {
        let row = Row::new(1, vec![Value::Int64(1), Value::String("Alice".into())]);
        assert_eq!(row.get(0), Some(&Value::Int64(1)));
        assert_eq!(row.get_i64(0), Some(1));
        assert_eq!(row.get_str(1), Some("Alice"));
        assert_eq!(row.get(2), None);
    }

    #[test]
    fn test_row_set_grows() {
        let mut row = Row::new(1, vec![Value::Int64(1)]);
        row.set(0, 100i64);
        assert_eq!(row.get_i64(0), Some(100));
        row.set(3, "x");
        assert_eq!(row.len(), 4);
        assert_eq!(row.get(2), Some(&Value::Null));
        assert_eq!(row.get_str(3), Some("x"));
    }

    #[test]
    fn test_row_equality_ignores_version() {
        let row1 = Row::new(1, vec![Value::Int64(42)]);
        let mut row2 = Row::new(1, vec![Value::Int64(42)]);
        row2.increment_version();
        let row3 = Row::new(2, vec![Value::Int64(42)]);
        assert_eq!(row1, row2);
        assert_ne!(row1, row3);
    }

    #[test]
    fn test_row_version() {
        let mut row = Row::new(1, vec![]);
        assert_eq!(row.version(), 1);
        assert_eq!(row.increment_version(), 2);
        assert_eq!(row.version(), 2);
    }

    #[test]
    fn test_allocator_monotonic() {
        let mut ids = IdAllocator::default();
        assert_eq!(ids.last_id(), 0);
        assert_eq!(ids.next_id(), 1);
        assert_eq!(ids.next_id(), 2);
        assert_eq!(ids.last_id(), 2);
    }

    #[test]
    fn test_allocator_bump_past() {
        let mut ids = IdAllocator::new(10);
        ids.bump_past(40);
        assert_eq!(ids.next_id(), 41);
        // never moves backwards
        ids.bump_past(5);
        assert_eq!(ids.next_id(), 42);
    }

    #[test]
    fn test_row_serde() {
        let row = Row::new(7, vec![Value::Int64(3), Value::from("red")]);
        let json = serde_json::to_string(&row).unwrap();
        let back: Row = serde_json::from_str(&json).unwrap();
        assert_eq!(back, row);
        assert_eq!(back.version(), 1);
    }
}
