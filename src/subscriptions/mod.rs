//! Update-subscription registry.
//!
//! Independently mounted consumers (dashboard widgets, list pages) register
//! a callback under a key of their choosing and are told which kind of
//! entity changed whenever a relevant server event arrives:
//!
//! ```ignore
//! let registry = UpdateRegistry::new();
//! registry.register("task-list", |kind| {
//!     if kind == EntityKind::Task {
//!         // refetch tasks
//!     }
//! })?;
//!
//! registry.broadcast(EntityKind::Task);
//! registry.unregister("task-list");
//! ```

mod manager;
mod types;

pub use manager::UpdateRegistry;
pub use types::{BroadcastReport, DuplicatePolicy, Registration, UpdateCallback};
