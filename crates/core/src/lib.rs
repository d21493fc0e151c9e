//! livedb Core - value, row and error types for the livedb object store.
//!
//! This crate provides the foundational types shared by the livedb crates:
//!
//! - `Value`: A totally ordered, hashable field value (usable as an index key)
//! - `Row`: The stored state of one object: id, version and field values
//! - `IdAllocator`: Monotonic, never-reused object id source
//! - `ObjectId`, `ViewId`, `IndexId`: Handle types
//! - `Error`: Error types for store and view operations
//!
//! # Example
//!
//! ```rust
//! use livedb_core::{IdAllocator, Row, Value};
//!
//! let mut ids = IdAllocator::default();
//! let row = Row::new(ids.next_id(), vec![Value::from("blue"), Value::Int64(3)]);
//!
//! assert_eq!(row.id(), 1);
//! assert_eq!(row.get_str(0), Some("blue"));
//! ```

mod error;
mod row;
mod types;
mod value;

pub use error::{Error, Result};
pub use row::{IdAllocator, Row};
pub use types::{IndexId, ObjectId, ValueKind, ViewId, ROOT_VIEW};
pub use value::Value;
