//! Kinds of view events.

use core::fmt;

/// What happened to an object from a view's point of view.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeltaKind {
    /// The object entered the view.
    Add,
    /// The object left the view.
    Remove,
    /// The object stayed in the view but its state changed.
    Change,
}

impl DeltaKind {
    #[inline]
    pub fn is_add(&self) -> bool {
        matches!(self, DeltaKind::Add)
    }
}

impl fmt::Display for DeltaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeltaKind::Add => "add",
            DeltaKind::Remove => "remove",
            DeltaKind::Change => "change",
        };
        f.write_str(name)
    }
}
