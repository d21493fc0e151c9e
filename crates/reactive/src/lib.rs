//! livedb Reactive - change events and callback plumbing for livedb views.
//!
//! Every view in a livedb database reports the effect of a mutation as a
//! sequence of add, remove and change events. This crate holds the pieces
//! that carry those events to user code:
//!
//! - `DeltaKind`: The three kinds of view events
//! - `CallbackRegistry`: Per-view callbacks, kept in registration order
//! - `Notification`, `NotificationQueue`: Events collected while a mutation
//!   cascades through the view graph, dispatched once the cascade is done
//! - `ChangeSet`: Membership difference between two states of a view
//!
//! # Example
//!
//! ```rust
//! use livedb_reactive::{CallbackRegistry, DeltaKind};
//! use livedb_core::{Row, Value};
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! let mut registry = CallbackRegistry::new();
//! let seen = Rc::new(Cell::new(0));
//! let seen_clone = seen.clone();
//! registry.register(DeltaKind::Add, move |_row, _id| seen_clone.set(seen_clone.get() + 1));
//!
//! let row = Row::new(1, vec![Value::Int64(10)]);
//! for callback in registry.callbacks(DeltaKind::Add) {
//!     callback(&row, row.id());
//! }
//! assert_eq!(seen.get(), 1);
//! ```

pub mod change_set;
pub mod delta;
pub mod notify;
pub mod subscription;

pub use change_set::ChangeSet;
pub use delta::DeltaKind;
pub use notify::{Notification, NotificationQueue};
pub use subscription::{Callback, CallbackId, CallbackRegistry};
