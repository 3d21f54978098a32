//! Subscription types for update fan-out.

use crate::types::EntityKind;
use std::sync::Arc;

/// Callback invoked with the kind of entity that changed.
pub type UpdateCallback = Arc<dyn Fn(EntityKind) + Send + Sync>;

/// What to do when a key is registered while already present.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// Replace the old callback silently (debug log only).
    Replace,
    /// Replace the old callback and log a warning.
    #[default]
    Warn,
    /// Keep the old callback and return an error.
    Reject,
}

/// Outcome of a successful registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Registration {
    Inserted,
    Replaced,
}

/// Result of one broadcast pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Callbacks that ran to completion.
    pub delivered: usize,
    /// Keys whose callback panicked.
    pub failed: Vec<String>,
}

impl BroadcastReport {
    /// Total callbacks invoked, including failed ones.
    pub fn invoked(&self) -> usize {
        self.delivered + self.failed.len()
    }
}
