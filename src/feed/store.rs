//! Bounded, most-recent-first notification feed.

use crate::types::{NotificationId, NotificationInput, NotificationRecord};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

use super::sound::{SoundCue, TerminalBell};

/// Default number of notifications kept.
pub const DEFAULT_FEED_CAPACITY: usize = 20;

/// Feed configuration.
#[derive(Clone, Debug)]
pub struct FeedConfig {
    /// Max records kept; older ones are evicted.
    /// Default: 20
    pub capacity: usize,

    /// Whether new notifications play a sound.
    pub sound_enabled: bool,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_FEED_CAPACITY,
            sound_enabled: true,
        }
    }
}

/// Point-in-time copy of the feed for rendering.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedSnapshot {
    pub notifications: Vec<NotificationRecord>,
    pub unread_count: usize,
}

struct FeedState {
    records: VecDeque<NotificationRecord>,
    unread: usize,
}

/// In-memory notification feed with read/unread accounting.
///
/// `unread` is maintained incrementally on every mutation and always equals
/// the number of records with `read == false`.
pub struct NotificationFeed {
    state: RwLock<FeedState>,
    capacity: usize,
    sound_enabled: AtomicBool,
    sound: Box<dyn SoundCue>,
}

impl NotificationFeed {
    /// Create a feed that rings the terminal bell.
    pub fn new(config: FeedConfig) -> Self {
        Self::with_sound(config, Box::new(TerminalBell))
    }

    /// Create a feed with a custom sound cue.
    pub fn with_sound(config: FeedConfig, sound: Box<dyn SoundCue>) -> Self {
        let capacity = config.capacity.max(1);
        Self {
            state: RwLock::new(FeedState {
                records: VecDeque::with_capacity(capacity),
                unread: 0,
            }),
            capacity,
            sound_enabled: AtomicBool::new(config.sound_enabled),
            sound,
        }
    }

    /// Prepend a new notification, evicting the oldest beyond capacity.
    pub fn add(&self, input: NotificationInput) -> NotificationRecord {
        let record = input.into_record();

        {
            let mut state = self.state.write();
            state.records.push_front(record.clone());
            state.unread += 1;

            while state.records.len() > self.capacity {
                if let Some(evicted) = state.records.pop_back() {
                    if !evicted.read {
                        state.unread -= 1;
                    }
                    debug!(id = %evicted.id, "evicted notification");
                }
            }
        }

        if self.sound_enabled.load(Ordering::Relaxed) {
            self.play_sound();
        }

        record
    }

    /// Mark one notification read. Returns true only if it was unread.
    pub fn mark_read(&self, id: NotificationId) -> bool {
        let mut state = self.state.write();
        let hit = state
            .records
            .iter_mut()
            .find(|r| r.id == id && !r.read)
            .map(|r| r.read = true)
            .is_some();

        if hit {
            state.unread = state.unread.saturating_sub(1);
        }
        hit
    }

    /// Mark every notification read.
    pub fn mark_all_read(&self) {
        let mut state = self.state.write();
        for record in state.records.iter_mut() {
            record.read = true;
        }
        state.unread = 0;
    }

    /// Remove every notification.
    pub fn clear(&self) {
        let mut state = self.state.write();
        state.records.clear();
        state.unread = 0;
    }

    pub fn snapshot(&self) -> FeedSnapshot {
        let state = self.state.read();
        FeedSnapshot {
            notifications: state.records.iter().cloned().collect(),
            unread_count: state.unread,
        }
    }

    pub fn unread_count(&self) -> usize {
        self.state.read().unread
    }

    pub fn len(&self) -> usize {
        self.state.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn get(&self, id: NotificationId) -> Option<NotificationRecord> {
        self.state.read().records.iter().find(|r| r.id == id).cloned()
    }

    pub fn sound_enabled(&self) -> bool {
        self.sound_enabled.load(Ordering::Relaxed)
    }

    pub fn set_sound_enabled(&self, enabled: bool) {
        self.sound_enabled.store(enabled, Ordering::Relaxed);
    }

    fn play_sound(&self) {
        match catch_unwind(AssertUnwindSafe(|| self.sound.play())) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(error = %e, "notification sound failed"),
            Err(_) => debug!("notification sound panicked"),
        }
    }
}

impl Default for NotificationFeed {
    fn default() -> Self {
        Self::new(FeedConfig::default())
    }
}
