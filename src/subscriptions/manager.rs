//! Keyed registry of update callbacks.

use crate::error::{RealtimeError, Result};
use crate::types::EntityKind;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

use super::types::{BroadcastReport, DuplicatePolicy, Registration, UpdateCallback};

/// Process-wide registry of "data changed" callbacks.
///
/// Each consumer registers under a key it chooses and removes itself on
/// teardown. Callbacks filter on the entity kind themselves.
pub struct UpdateRegistry {
    entries: RwLock<HashMap<String, UpdateCallback>>,
    policy: DuplicatePolicy,
}

impl UpdateRegistry {
    pub fn new() -> Self {
        Self::with_policy(DuplicatePolicy::default())
    }

    pub fn with_policy(policy: DuplicatePolicy) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            policy,
        }
    }

    /// Insert or replace the callback for `key`, subject to the duplicate policy.
    pub fn register<F>(&self, key: impl Into<String>, callback: F) -> Result<Registration>
    where
        F: Fn(EntityKind) + Send + Sync + 'static,
    {
        self.register_arc(key, Arc::new(callback))
    }

    /// Same as [`register`](Self::register) for an already shared callback.
    pub fn register_arc(&self, key: impl Into<String>, callback: UpdateCallback) -> Result<Registration> {
        let key = key.into();
        let mut entries = self.entries.write();

        if entries.contains_key(&key) {
            match self.policy {
                DuplicatePolicy::Reject => {
                    warn!(key = %key, "rejected duplicate update subscription");
                    return Err(RealtimeError::DuplicateSubscription(key));
                }
                DuplicatePolicy::Warn => {
                    warn!(key = %key, "replacing existing update subscription");
                }
                DuplicatePolicy::Replace => {
                    debug!(key = %key, "replacing existing update subscription");
                }
            }
            entries.insert(key, callback);
            return Ok(Registration::Replaced);
        }

        debug!(key = %key, "registered update subscription");
        entries.insert(key, callback);
        Ok(Registration::Inserted)
    }

    /// Remove the callback for `key`. Returns false if it was not present.
    pub fn unregister(&self, key: &str) -> bool {
        let removed = self.entries.write().remove(key).is_some();
        if removed {
            debug!(key = %key, "unregistered update subscription");
        }
        removed
    }

    /// Invoke every registered callback with `kind`.
    ///
    /// Callbacks are cloned out of the lock first, so a callback may
    /// register or unregister without deadlocking. A panicking callback is
    /// logged and does not stop the others.
    pub fn broadcast(&self, kind: EntityKind) -> BroadcastReport {
        let targets: Vec<(String, UpdateCallback)> = self
            .entries
            .read()
            .iter()
            .map(|(key, cb)| (key.clone(), Arc::clone(cb)))
            .collect();

        let mut report = BroadcastReport::default();
        for (key, callback) in targets {
            match catch_unwind(AssertUnwindSafe(|| callback(kind))) {
                Ok(()) => report.delivered += 1,
                Err(payload) => {
                    error!(
                        key = %key,
                        kind = %kind,
                        reason = %panic_message(payload.as_ref()),
                        "update callback panicked"
                    );
                    report.failed.push(key);
                }
            }
        }

        trace!(kind = %kind, delivered = report.delivered, "broadcast complete");
        report
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Registered keys, in no particular order.
    pub fn keys(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    /// Drop every registration.
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl Default for UpdateRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, impl Fn(EntityKind) + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        (count, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_register_unregister() {
        let registry = UpdateRegistry::new();
        let (_, cb) = counter();

        assert_eq!(registry.register("a", cb).unwrap(), Registration::Inserted);
        assert_eq!(registry.len(), 1);
        assert!(registry.unregister("a"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unregister_missing_is_noop() {
        let registry = UpdateRegistry::new();
        assert!(!registry.unregister("nobody"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_reregister_replaces() {
        let registry = UpdateRegistry::new();
        let (first, cb1) = counter();
        let (second, cb2) = counter();

        registry.register("widget", cb1).unwrap();
        assert_eq!(registry.register("widget", cb2).unwrap(), Registration::Replaced);
        assert_eq!(registry.len(), 1);

        registry.broadcast(EntityKind::Task);
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reject_policy_keeps_original() {
        let registry = UpdateRegistry::with_policy(DuplicatePolicy::Reject);
        let (first, cb1) = counter();
        let (second, cb2) = counter();

        registry.register("widget", cb1).unwrap();
        let result = registry.register("widget", cb2);
        assert!(matches!(result, Err(RealtimeError::DuplicateSubscription(k)) if k == "widget"));

        registry.broadcast(EntityKind::Team);
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_broadcast_passes_kind() {
        let registry = UpdateRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        registry
            .register("list", move |kind| s.lock().push(kind))
            .unwrap();

        registry.broadcast(EntityKind::Team);
        registry.broadcast(EntityKind::Generic);
        assert_eq!(*seen.lock(), vec![EntityKind::Team, EntityKind::Generic]);
    }

    #[test]
    fn test_panicking_callback_is_isolated() {
        let registry = UpdateRegistry::new();
        let (a, cb_a) = counter();
        let (c, cb_c) = counter();

        registry.register("a", cb_a).unwrap();
        registry
            .register("b", |_| panic!("widget exploded"))
            .unwrap();
        registry.register("c", cb_c).unwrap();

        let report = registry.broadcast(EntityKind::Task);
        assert_eq!(report.delivered, 2);
        assert_eq!(report.failed, vec!["b".to_string()]);
        assert_eq!(report.invoked(), 3);
        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(c.load(Ordering::SeqCst), 1);

        // Still registered and still isolated next time.
        let report = registry.broadcast(EntityKind::Task);
        assert_eq!(report.delivered, 2);
    }

    #[test]
    fn test_callback_may_unregister_itself() {
        let registry = Arc::new(UpdateRegistry::new());
        let r = Arc::clone(&registry);
        registry
            .register("once", move |_| {
                r.unregister("once");
            })
            .unwrap();

        let report = registry.broadcast(EntityKind::Task);
        assert_eq!(report.delivered, 1);
        assert!(!registry.contains("once"));
        assert_eq!(registry.broadcast(EntityKind::Task).invoked(), 0);
    }
}
