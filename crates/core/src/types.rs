//! Identifier and value-kind definitions shared by every livedb crate.

/// Unique identifier of an object tracked by a store.
///
/// Ids are handed out by an [`IdAllocator`](crate::IdAllocator), grow
/// monotonically and are never reused after the object is removed.
pub type ObjectId = u64;

/// Handle of a view inside a database's view arena. The root view is `0`.
pub type ViewId = u32;

/// Handle of an index created on a view.
pub type IndexId = u32;

/// The root view of every database.
pub const ROOT_VIEW: ViewId = 0;

/// Kind of a [`Value`](crate::Value), also used for cross-kind ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ValueKind {
    Null,
    Boolean,
    Int64,
    Float64,
    String,
    Bytes,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_ordering() {
        assert!(ValueKind::Null < ValueKind::Boolean);
        assert!(ValueKind::Int64 < ValueKind::Float64);
        assert!(ValueKind::String < ValueKind::Bytes);
    }
}
