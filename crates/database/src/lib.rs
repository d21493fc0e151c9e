//! livedb - a reactive in-memory object database.
//!
//! Objects live in a store and are observed through views: filters, sorts,
//! maps and index buckets derived from the store or from other views. Views
//! are kept up to date incrementally as objects are added, removed and
//! changed, and report every membership event to registered callbacks.
//!
//! # Core Components
//!
//! - `Database`: The store, mutations, recompute and persistence hooks
//! - `View`: Handle to a derived sequence with its own cursor and callbacks
//! - `IndexSpec`: Key function (single or multi-valued) and bucket ordering
//! - `TrackedIdList`: User-ordered id list exposed as a sorted view
//!
//! # Example
//!
//! ```rust
//! use livedb::{Database, Value};
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! let db = Database::new();
//! let large = db.root().filter(|row| row.get_i64(0).unwrap_or(0) > 10).unwrap();
//!
//! let added = Rc::new(Cell::new(0));
//! let counter = added.clone();
//! large.add_add_callback(move |_, _| counter.set(counter.get() + 1));
//!
//! let id = db.create(vec![Value::Int64(5)]).unwrap();
//! assert!(large.is_empty());
//!
//! db.update(id, |row| row.set(0, 50i64)).unwrap();
//! assert_eq!(large.ids(), vec![id]);
//! assert_eq!(added.get(), 1);
//! ```

pub mod config;
pub mod database;
mod engine;
pub mod index;
mod operator;
pub mod persist;
mod propagate;
mod recompute;
mod sequence;
mod sort;
pub mod tracked;
pub mod view;

pub use config::DatabaseConfig;
pub use database::{default_database, reset_default_database, Database};
pub use index::{IndexKey, IndexSpec};
pub use operator::{Mapper, Predicate, ViewKind};
pub use persist::{Persistence, Snapshot};
pub use sort::Comparator;
pub use tracked::TrackedIdList;
pub use view::View;

pub use livedb_core::{Error, IndexId, ObjectId, Result, Row, Value, ViewId};
pub use livedb_reactive::{CallbackId, DeltaKind};
