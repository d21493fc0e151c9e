//! Error types for livedb.

use crate::types::{IndexId, ObjectId, ViewId};

/// Result type alias for livedb operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Error types for store and view operations.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The object is not in the store or view.
    #[error("object {id} not found")]
    ObjectNotFound { id: ObjectId },
    /// The cursor sits on one of the null sentinels.
    #[error("cursor is not positioned on an object")]
    CursorNotSet,
    /// `restore_cursor` without a matching `save_cursor`.
    #[error("no saved cursor to restore")]
    EmptyCursorStack,
    /// The object is already tracked by the store.
    #[error("object {id} is already in the store")]
    DuplicateId { id: ObjectId },
    /// A registered constraint rejected the object.
    #[error("constraint `{constraint}` rejected object {id}")]
    ConstraintViolation { constraint: String, id: ObjectId },
    /// The database was used from a thread other than the one that created it.
    #[error("database used outside its owning thread")]
    WrongThread,
    /// The view has been unlinked from its parent.
    #[error("view {view} has been unlinked")]
    UnlinkedView { view: ViewId },
    /// The index does not exist or belongs to another view.
    #[error("index {index} is not defined on this view")]
    UnknownIndex { index: IndexId },
    /// The view was not created with `filter_with_index`.
    #[error("view {view} is not an index view")]
    NotIndexView { view: ViewId },
    /// Invalid operation.
    #[error("invalid operation: {message}")]
    InvalidOperation { message: String },
}

impl Error {
    /// Creates an object not found error.
    pub fn not_found(id: ObjectId) -> Self {
        Error::ObjectNotFound { id }
    }

    /// Creates a duplicate id error.
    pub fn duplicate(id: ObjectId) -> Self {
        Error::DuplicateId { id }
    }

    /// Creates a constraint violation error.
    pub fn constraint(constraint: impl Into<String>, id: ObjectId) -> Self {
        Error::ConstraintViolation {
            constraint: constraint.into(),
            id,
        }
    }

    /// Creates an unlinked view error.
    pub fn unlinked(view: ViewId) -> Self {
        Error::UnlinkedView { view }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Error::InvalidOperation {
            message: message.into(),
        }
    }

    /// True for errors meaning "there is no such object here", whether the
    /// id is unknown or the cursor points at nothing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::ObjectNotFound { .. } | Error::CursorNotSet)
    }
}
